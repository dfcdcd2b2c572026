// models.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "poll_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PollType {
    Single,
    Multiple,
    Rating,
    YesNo,
}

impl PollType {
    /// Whether a ballot on this poll may name more than one choice.
    pub fn allows_multiple_selection(self) -> bool {
        matches!(self, PollType::Multiple)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "poll_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PollStatus {
    Draft,
    Active,
    Expired,
    Closed,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Poll {
    pub id: i64,
    pub slug: String,
    pub title: String,
    pub description: String,
    pub creator_id: Uuid,
    pub poll_type: PollType,
    pub status: PollStatus,
    pub is_active: bool,
    pub allow_multiple_votes: bool,
    pub require_login: bool,
    pub show_results: bool,
    pub allow_anonymous: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub total_votes: i32,
    pub unique_voters: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Choice {
    pub id: i64,
    pub poll_id: i64,
    pub text: String,
    pub description: String,
    pub votes: i32,
    pub position: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Vote {
    pub id: i64,
    pub poll_id: i64,
    pub choice_id: i64,
    pub voter_id: Option<Uuid>,
    pub voter_ip: String,
    pub voter_session: String,
    pub user_agent: String,
    pub voted_at: DateTime<Utc>,
    pub is_valid: bool,
    pub flagged_reason: String,
}

/// Account row owned by the upstream auth layer, extended with quota fields.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub is_premium: bool,
    pub premium_until: Option<DateTime<Utc>>,
    pub polls_created: i32,
    pub date_joined: DateTime<Utc>,
}

/// Who is submitting a ballot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Voter {
    Registered(Uuid),
    Anonymous { ip: String, session_key: String },
}

impl Voter {
    pub fn user_id(&self) -> Option<Uuid> {
        match self {
            Voter::Registered(id) => Some(*id),
            Voter::Anonymous { .. } => None,
        }
    }
}

/// A poll ready to be inserted, choices included.
#[derive(Debug, Clone)]
pub struct NewPoll {
    pub slug: String,
    pub title: String,
    pub description: String,
    pub creator_id: Uuid,
    pub poll_type: PollType,
    pub status: PollStatus,
    pub is_active: bool,
    pub allow_multiple_votes: bool,
    pub require_login: bool,
    pub show_results: bool,
    pub allow_anonymous: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub choices: Vec<String>,
}

/// Validated ballot handed to the store for the transactional write.
#[derive(Debug, Clone)]
pub struct Ballot {
    pub poll_id: i64,
    pub choice_ids: Vec<i64>,
    pub voter: Voter,
    pub voter_ip: String,
    pub voter_session: String,
    pub user_agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BallotReceipt {
    pub vote_ids: Vec<i64>,
    pub first_vote: bool,
    pub total_votes: i32,
    pub unique_voters: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct PollDetail {
    #[serde(flatten)]
    pub poll: Poll,
    pub can_vote: bool,
    pub choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
pub struct CreatePollRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_poll_type")]
    pub poll_type: PollType,
    /// One choice per line.
    pub choices: String,
    pub expires_in_days: Option<i64>,
    #[serde(default)]
    pub allow_multiple_votes: bool,
    #[serde(default)]
    pub require_login: bool,
    #[serde(default = "default_true")]
    pub show_results: bool,
    #[serde(default = "default_true")]
    pub allow_anonymous: bool,
}

#[derive(Debug, Deserialize)]
pub struct QuickPollRequest {
    pub question: String,
    #[serde(default = "default_quick_type")]
    pub poll_type: PollType,
    pub option_1: Option<String>,
    pub option_2: Option<String>,
    pub option_3: Option<String>,
    pub expires_in_hours: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdatePollRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub is_active: Option<bool>,
    pub show_results: Option<bool>,
    /// `Some(None)` clears the expiry.
    #[serde(default, deserialize_with = "double_option::deserialize")]
    pub expires_at: Option<Option<DateTime<Utc>>>,
}

#[derive(Debug, Deserialize)]
pub struct VoteRequest {
    pub choices: Vec<i64>,
}

/// Form-encoded vote from the plain HTML page; one choice per post.
#[derive(Debug, Deserialize)]
pub struct VoteForm {
    pub choice: i64,
}

#[derive(Debug, Serialize)]
pub struct ChoiceResult {
    pub id: i64,
    pub text: String,
    pub votes: i32,
    pub vote_percentage: f64,
}

#[derive(Debug, Serialize)]
pub struct PollResults {
    pub slug: String,
    pub title: String,
    pub poll_type: PollType,
    pub status: PollStatus,
    pub total_votes: i32,
    pub unique_voters: i32,
    pub choices: Vec<ChoiceResult>,
}

#[derive(Debug, Serialize)]
pub struct PollStats {
    pub slug: String,
    pub status: PollStatus,
    pub total_votes: i32,
    pub unique_voters: i32,
    pub can_vote: bool,
    pub is_expired: bool,
    pub days_remaining: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ShareLinks {
    pub vote_url: String,
    pub results_url: String,
    pub whatsapp_url: String,
}

#[derive(Debug, Serialize)]
pub struct AccountSummary {
    #[serde(flatten)]
    pub user: User,
    pub is_premium_active: bool,
    pub can_create_poll: bool,
    /// `None` means unlimited.
    pub polls_remaining: Option<i32>,
}

fn default_poll_type() -> PollType {
    PollType::Single
}

fn default_quick_type() -> PollType {
    PollType::YesNo
}

fn default_true() -> bool {
    true
}

mod double_option {
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
    where
        T: Deserialize<'de>,
        D: Deserializer<'de>,
    {
        Option::<T>::deserialize(deserializer).map(Some)
    }
}
