//! Persistence seam for polls, choices, votes and accounts.
//!
//! Every backend must apply a ballot atomically: the duplicate check, the
//! vote rows and the counter updates either all land or none do.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{Ballot, BallotReceipt, Choice, NewPoll, Poll, User, Vote};

#[async_trait]
pub trait PollStore: Send + Sync {
    fn backend_tag(&self) -> &'static str;

    async fn ping(&self) -> Result<(), StoreError>;

    async fn find_user(&self, id: Uuid) -> Result<Option<User>, StoreError>;

    async fn slug_exists(&self, slug: &str) -> Result<bool, StoreError>;

    /// Inserts the poll with its choices and bumps the creator's
    /// `polls_created`, all in one transaction. The creator's existing polls
    /// are counted under a lock on the creator, and the insert fails with
    /// [`StoreError::QuotaExceeded`] once `poll_limit` polls exist.
    async fn insert_poll(&self, poll: NewPoll, poll_limit: i64) -> Result<Poll, StoreError>;

    async fn find_poll(&self, slug: &str) -> Result<Option<Poll>, StoreError>;

    /// Newest first.
    async fn list_polls_by_creator(&self, creator_id: Uuid) -> Result<Vec<Poll>, StoreError>;

    /// Ordered by display position.
    async fn list_choices(&self, poll_id: i64) -> Result<Vec<Choice>, StoreError>;

    /// Newest first.
    async fn list_votes(&self, poll_id: i64) -> Result<Vec<Vote>, StoreError>;

    /// Persists the editable fields of `poll` (title, description, status,
    /// flags, expiry) and returns the stored row. Counters are never written
    /// here.
    async fn save_poll(&self, poll: &Poll) -> Result<Poll, StoreError>;

    async fn delete_poll(&self, poll_id: i64) -> Result<(), StoreError>;

    /// Records one ballot. Votability and the duplicate-vote guard are
    /// evaluated again inside the transaction so concurrent ballots from the
    /// same identity cannot both succeed.
    async fn record_ballot(
        &self,
        ballot: Ballot,
        now: DateTime<Utc>,
    ) -> Result<BallotReceipt, StoreError>;
}
