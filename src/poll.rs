// src/poll.rs
use chrono::{DateTime, Utc};
use url::{form_urlencoded, Url};
use uuid::Uuid;

use crate::models::{
    AccountSummary, Choice, ChoiceResult, Poll, PollResults, PollStats, PollStatus, ShareLinks,
    User,
};

pub const SLUG_LEN: usize = 8;
const SLUG_ALPHABET: &[u8; 36] = b"abcdefghijklmnopqrstuvwxyz0123456789";

impl Poll {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| now > at)
    }

    pub fn can_vote(&self, now: DateTime<Utc>) -> bool {
        self.is_active && !self.is_expired(now) && self.status == PollStatus::Active
    }

    pub fn days_remaining(&self, now: DateTime<Utc>) -> Option<i64> {
        self.expires_at
            .map(|at| (at - now).num_days().max(0))
    }

    /// Expiry rule applied whenever a poll is saved.
    pub fn apply_expiry(&mut self, now: DateTime<Utc>) {
        if self.is_expired(now) {
            self.status = PollStatus::Expired;
            self.is_active = false;
        }
    }

    pub fn stats(&self, now: DateTime<Utc>) -> PollStats {
        PollStats {
            slug: self.slug.clone(),
            status: self.status,
            total_votes: self.total_votes,
            unique_voters: self.unique_voters,
            can_vote: self.can_vote(now),
            is_expired: self.is_expired(now),
            days_remaining: self.days_remaining(now),
        }
    }

    pub fn results(&self, choices: &[Choice]) -> PollResults {
        PollResults {
            slug: self.slug.clone(),
            title: self.title.clone(),
            poll_type: self.poll_type,
            status: self.status,
            total_votes: self.total_votes,
            unique_voters: self.unique_voters,
            choices: choices
                .iter()
                .map(|choice| ChoiceResult {
                    id: choice.id,
                    text: choice.text.clone(),
                    votes: choice.votes,
                    vote_percentage: choice.vote_percentage(self.total_votes),
                })
                .collect(),
        }
    }

    pub fn share_links(&self, base_url: &str) -> Result<ShareLinks, url::ParseError> {
        let base = Url::parse(base_url)?;
        let vote_url = base.join(&format!("vote/{}", self.slug))?.to_string();
        let results_url = base
            .join(&format!("api/polls/{}/results", self.slug))?
            .to_string();

        // Percent-encoded with spaces as %20, never `+`.
        let message = format!("🗳️ Vote on: {}\n{}", self.title, vote_url);
        let text = form_urlencoded::byte_serialize(message.as_bytes())
            .collect::<String>()
            .replace('+', "%20");

        Ok(ShareLinks {
            vote_url,
            results_url,
            whatsapp_url: format!("https://wa.me/?text={text}"),
        })
    }
}

impl Choice {
    /// Share of the poll's votes to one decimal place. Ties round to even,
    /// so 6.25 becomes 6.2.
    pub fn vote_percentage(&self, poll_total: i32) -> f64 {
        if poll_total == 0 {
            return 0.0;
        }
        (f64::from(self.votes) * 1000.0 / f64::from(poll_total)).round_ties_even() / 10.0
    }
}

impl User {
    pub fn is_premium_active(&self, now: DateTime<Utc>) -> bool {
        self.is_premium && self.premium_until.map_or(true, |until| now < until)
    }

    pub fn can_create_poll(&self, now: DateTime<Utc>) -> bool {
        self.is_premium_active(now) || self.polls_created < 1
    }

    /// `None` when the account is unlimited.
    pub fn polls_remaining(&self, now: DateTime<Utc>) -> Option<i32> {
        if self.is_premium_active(now) {
            None
        } else {
            Some((1 - self.polls_created).max(0))
        }
    }

    pub fn summary(self, now: DateTime<Utc>) -> AccountSummary {
        AccountSummary {
            is_premium_active: self.is_premium_active(now),
            can_create_poll: self.can_create_poll(now),
            polls_remaining: self.polls_remaining(now),
            user: self,
        }
    }
}

/// Random share slug drawn from `[a-z0-9]`.
pub fn generate_slug() -> String {
    // The low 64 bits of a v4 uuid hold 62 random bits.
    let mut bits = Uuid::new_v4().as_u128() as u64;
    (0..SLUG_LEN)
        .map(|_| {
            let c = SLUG_ALPHABET[(bits % 36) as usize] as char;
            bits /= 36;
            c
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use crate::models::PollType;

    pub fn poll(now: DateTime<Utc>) -> Poll {
        Poll {
            id: 1,
            slug: "abcd1234".to_string(),
            title: "Best editor?".to_string(),
            description: String::new(),
            creator_id: Uuid::nil(),
            poll_type: PollType::Single,
            status: PollStatus::Active,
            is_active: true,
            allow_multiple_votes: false,
            require_login: false,
            show_results: true,
            allow_anonymous: true,
            created_at: now,
            updated_at: now,
            expires_at: None,
            total_votes: 0,
            unique_voters: 0,
        }
    }

    pub fn user(now: DateTime<Utc>, premium: bool) -> User {
        User {
            id: Uuid::new_v4(),
            email: "someone@example.com".to_string(),
            is_premium: premium,
            premium_until: None,
            polls_created: 0,
            date_joined: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures;
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_can_vote_requires_active_unexpired_and_status() {
        let now = Utc::now();
        let mut poll = fixtures::poll(now);
        assert!(poll.can_vote(now));

        poll.status = PollStatus::Draft;
        assert!(!poll.can_vote(now));

        poll.status = PollStatus::Active;
        poll.is_active = false;
        assert!(!poll.can_vote(now));

        poll.is_active = true;
        poll.expires_at = Some(now - Duration::minutes(1));
        assert!(!poll.can_vote(now));
    }

    #[test]
    fn test_apply_expiry_marks_poll_expired() {
        let now = Utc::now();
        let mut poll = fixtures::poll(now);
        poll.expires_at = Some(now - Duration::hours(2));
        poll.apply_expiry(now);
        assert_eq!(poll.status, PollStatus::Expired);
        assert!(!poll.is_active);

        let mut open = fixtures::poll(now);
        open.expires_at = Some(now + Duration::hours(2));
        open.apply_expiry(now);
        assert_eq!(open.status, PollStatus::Active);
    }

    #[test]
    fn test_days_remaining_clamps_at_zero() {
        let now = Utc::now();
        let mut poll = fixtures::poll(now);
        assert_eq!(poll.days_remaining(now), None);

        poll.expires_at = Some(now + Duration::days(3) + Duration::hours(1));
        assert_eq!(poll.days_remaining(now), Some(3));

        poll.expires_at = Some(now - Duration::days(3));
        assert_eq!(poll.days_remaining(now), Some(0));
    }

    #[test]
    fn test_vote_percentage_rounds_to_one_decimal() {
        let now = Utc::now();
        let choice = Choice {
            id: 1,
            poll_id: 1,
            text: "a".to_string(),
            description: String::new(),
            votes: 1,
            position: 0,
            is_active: true,
            created_at: now,
        };
        assert_eq!(choice.vote_percentage(0), 0.0);
        assert_eq!(choice.vote_percentage(3), 33.3);
        assert_eq!(choice.vote_percentage(1), 100.0);
        assert_eq!(choice.vote_percentage(16), 6.2);

        let three = Choice { votes: 3, ..choice };
        assert_eq!(three.vote_percentage(16), 18.8);
        assert_eq!(three.vote_percentage(8), 37.5);
    }

    #[test]
    fn test_premium_expiry_and_quota() {
        let now = Utc::now();
        let mut user = fixtures::user(now, false);
        assert!(user.can_create_poll(now));
        assert_eq!(user.polls_remaining(now), Some(1));

        user.polls_created = 1;
        assert!(!user.can_create_poll(now));
        assert_eq!(user.polls_remaining(now), Some(0));

        user.is_premium = true;
        assert!(user.can_create_poll(now));
        assert_eq!(user.polls_remaining(now), None);

        user.premium_until = Some(now - Duration::days(1));
        assert!(!user.is_premium_active(now));
        assert!(!user.can_create_poll(now));
    }

    #[test]
    fn test_share_links_encode_message() {
        let now = Utc::now();
        let poll = fixtures::poll(now);
        let links = poll.share_links("https://polls.example.com/").unwrap();
        assert_eq!(links.vote_url, "https://polls.example.com/vote/abcd1234");
        assert_eq!(
            links.results_url,
            "https://polls.example.com/api/polls/abcd1234/results"
        );
        assert!(links.whatsapp_url.starts_with("https://wa.me/?text="));
        assert!(links.whatsapp_url.contains("Vote%20on%3A%20Best%20editor%3F%0A"));
        assert!(!links.whatsapp_url.contains('+'));
    }

    #[test]
    fn test_generate_slug_shape() {
        let slugs: Vec<String> = (0..64).map(|_| generate_slug()).collect();
        for slug in &slugs {
            assert_eq!(slug.len(), SLUG_LEN);
            assert!(slug
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
        }
        // Letters past `f` show up, so the whole alphabet is in play.
        assert!(slugs.iter().flat_map(|slug| slug.chars()).any(|c| c > 'f'));
    }
}
