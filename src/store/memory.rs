use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::PollStore;
use crate::error::StoreError;
use crate::models::{Ballot, BallotReceipt, Choice, NewPoll, Poll, User, Vote, Voter};

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    polls: BTreeMap<i64, Poll>,
    choices: BTreeMap<i64, Choice>,
    votes: Vec<Vote>,
    next_id: i64,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn prior_votes(&self, poll_id: i64, voter: &Voter) -> usize {
        self.votes
            .iter()
            .filter(|vote| vote.poll_id == poll_id)
            .filter(|vote| match voter {
                Voter::Registered(id) => vote.voter_id == Some(*id),
                Voter::Anonymous { ip, session_key } => {
                    vote.voter_id.is_none()
                        && &vote.voter_ip == ip
                        && &vote.voter_session == session_key
                }
            })
            .count()
    }
}

/// In-process store with the same semantics as [`super::PgStore`]. A single
/// mutex over all tables stands in for the database transaction.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accounts are provisioned by the auth layer; this seeds one directly.
    pub async fn insert_user(&self, user: User) {
        self.tables.lock().await.users.insert(user.id, user);
    }

    #[cfg(test)]
    pub(crate) async fn set_choice_active(&self, choice_id: i64, active: bool) {
        if let Some(choice) = self.tables.lock().await.choices.get_mut(&choice_id) {
            choice.is_active = active;
        }
    }
}

#[async_trait]
impl PollStore for MemoryStore {
    fn backend_tag(&self) -> &'static str {
        "memory"
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn find_user(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.tables.lock().await.users.get(&id).cloned())
    }

    async fn slug_exists(&self, slug: &str) -> Result<bool, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables.polls.values().any(|poll| poll.slug == slug))
    }

    async fn insert_poll(&self, new: NewPoll, poll_limit: i64) -> Result<Poll, StoreError> {
        let mut tables = self.tables.lock().await;
        let now = Utc::now();

        if !tables.users.contains_key(&new.creator_id) {
            return Err(StoreError::NotFound);
        }
        let existing = tables
            .polls
            .values()
            .filter(|poll| poll.creator_id == new.creator_id)
            .count() as i64;
        if existing >= poll_limit {
            return Err(StoreError::QuotaExceeded);
        }

        let creator = tables
            .users
            .get_mut(&new.creator_id)
            .ok_or(StoreError::NotFound)?;
        creator.polls_created += 1;

        let poll = Poll {
            id: tables.next_id(),
            slug: new.slug,
            title: new.title,
            description: new.description,
            creator_id: new.creator_id,
            poll_type: new.poll_type,
            status: new.status,
            is_active: new.is_active,
            allow_multiple_votes: new.allow_multiple_votes,
            require_login: new.require_login,
            show_results: new.show_results,
            allow_anonymous: new.allow_anonymous,
            created_at: now,
            updated_at: now,
            expires_at: new.expires_at,
            total_votes: 0,
            unique_voters: 0,
        };

        for (position, text) in new.choices.into_iter().enumerate() {
            let id = tables.next_id();
            tables.choices.insert(
                id,
                Choice {
                    id,
                    poll_id: poll.id,
                    text,
                    description: String::new(),
                    votes: 0,
                    position: position as i32,
                    is_active: true,
                    created_at: now,
                },
            );
        }

        tables.polls.insert(poll.id, poll.clone());
        Ok(poll)
    }

    async fn find_poll(&self, slug: &str) -> Result<Option<Poll>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables.polls.values().find(|poll| poll.slug == slug).cloned())
    }

    async fn list_polls_by_creator(&self, creator_id: Uuid) -> Result<Vec<Poll>, StoreError> {
        let tables = self.tables.lock().await;
        let mut polls: Vec<Poll> = tables
            .polls
            .values()
            .filter(|poll| poll.creator_id == creator_id)
            .cloned()
            .collect();
        polls.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(polls)
    }

    async fn list_choices(&self, poll_id: i64) -> Result<Vec<Choice>, StoreError> {
        let tables = self.tables.lock().await;
        let mut choices: Vec<Choice> = tables
            .choices
            .values()
            .filter(|choice| choice.poll_id == poll_id)
            .cloned()
            .collect();
        choices.sort_by_key(|choice| (choice.position, choice.id));
        Ok(choices)
    }

    async fn list_votes(&self, poll_id: i64) -> Result<Vec<Vote>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .votes
            .iter()
            .rev()
            .filter(|vote| vote.poll_id == poll_id)
            .cloned()
            .collect())
    }

    async fn save_poll(&self, poll: &Poll) -> Result<Poll, StoreError> {
        let mut tables = self.tables.lock().await;
        let stored = tables.polls.get_mut(&poll.id).ok_or(StoreError::NotFound)?;
        stored.title = poll.title.clone();
        stored.description = poll.description.clone();
        stored.status = poll.status;
        stored.is_active = poll.is_active;
        stored.show_results = poll.show_results;
        stored.expires_at = poll.expires_at;
        stored.updated_at = Utc::now();
        Ok(stored.clone())
    }

    async fn delete_poll(&self, poll_id: i64) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().await;
        tables.polls.remove(&poll_id).ok_or(StoreError::NotFound)?;
        tables.choices.retain(|_, choice| choice.poll_id != poll_id);
        tables.votes.retain(|vote| vote.poll_id != poll_id);
        Ok(())
    }

    async fn record_ballot(
        &self,
        ballot: Ballot,
        now: DateTime<Utc>,
    ) -> Result<BallotReceipt, StoreError> {
        let mut tables = self.tables.lock().await;

        let poll = tables
            .polls
            .get(&ballot.poll_id)
            .ok_or(StoreError::NotFound)?;
        if !poll.can_vote(now) {
            return Err(StoreError::PollClosed);
        }
        let allow_multiple_votes = poll.allow_multiple_votes;

        let prior = tables.prior_votes(ballot.poll_id, &ballot.voter);
        if prior > 0 && !allow_multiple_votes {
            return Err(StoreError::AlreadyVoted);
        }

        // Validate every row before touching anything so a failure leaves no trace.
        for choice_id in &ballot.choice_ids {
            match tables.choices.get(choice_id) {
                Some(choice) if choice.poll_id == ballot.poll_id && choice.is_active => {}
                _ => return Err(StoreError::NotFound),
            }
            if let Voter::Registered(user_id) = ballot.voter {
                let duplicate = tables.votes.iter().any(|vote| {
                    vote.poll_id == ballot.poll_id
                        && vote.choice_id == *choice_id
                        && vote.voter_id == Some(user_id)
                });
                if duplicate {
                    return Err(StoreError::AlreadyVoted);
                }
            }
        }

        let mut vote_ids = Vec::with_capacity(ballot.choice_ids.len());
        for choice_id in &ballot.choice_ids {
            let id = tables.next_id();
            tables.votes.push(Vote {
                id,
                poll_id: ballot.poll_id,
                choice_id: *choice_id,
                voter_id: ballot.voter.user_id(),
                voter_ip: ballot.voter_ip.clone(),
                voter_session: ballot.voter_session.clone(),
                user_agent: ballot.user_agent.clone(),
                voted_at: now,
                is_valid: true,
                flagged_reason: String::new(),
            });
            if let Some(choice) = tables.choices.get_mut(choice_id) {
                choice.votes += 1;
            }
            vote_ids.push(id);
        }

        let first_vote = prior == 0;
        let poll = tables
            .polls
            .get_mut(&ballot.poll_id)
            .ok_or(StoreError::NotFound)?;
        poll.total_votes += vote_ids.len() as i32;
        if first_vote {
            poll.unique_voters += 1;
        }

        Ok(BallotReceipt {
            vote_ids,
            first_vote,
            total_votes: poll.total_votes,
            unique_voters: poll.unique_voters,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PollStatus, PollType};
    use crate::poll::fixtures;
    use std::sync::Arc;

    fn new_poll(creator_id: Uuid, slug: String) -> NewPoll {
        NewPoll {
            slug,
            title: "Lunch spot?".to_string(),
            description: String::new(),
            creator_id,
            poll_type: PollType::Single,
            status: PollStatus::Active,
            is_active: true,
            allow_multiple_votes: false,
            require_login: false,
            show_results: true,
            allow_anonymous: true,
            expires_at: None,
            choices: vec!["Tacos".to_string(), "Ramen".to_string()],
        }
    }

    #[tokio::test]
    async fn test_concurrent_creations_respect_poll_limit() {
        let store = Arc::new(MemoryStore::new());
        let user = fixtures::user(Utc::now(), false);
        store.insert_user(user.clone()).await;

        let tasks: Vec<_> = (0..16)
            .map(|i| {
                let store = Arc::clone(&store);
                let new = new_poll(user.id, format!("race{i:04}"));
                tokio::spawn(async move { store.insert_poll(new, 1).await })
            })
            .collect();

        let mut created = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => created += 1,
                Err(err) => assert!(matches!(err, StoreError::QuotaExceeded)),
            }
        }
        assert_eq!(created, 1);

        let stored = store.find_user(user.id).await.unwrap().unwrap();
        assert_eq!(stored.polls_created, 1);
        assert_eq!(store.list_polls_by_creator(user.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_insert_poll_requires_known_creator() {
        let store = MemoryStore::new();
        let result = store.insert_poll(new_poll(Uuid::new_v4(), "nobody01".to_string()), 1).await;
        assert!(matches!(result, Err(StoreError::NotFound)));
    }

    #[tokio::test]
    async fn test_inactive_choice_leaves_no_trace() {
        let store = MemoryStore::new();
        let user = fixtures::user(Utc::now(), true);
        store.insert_user(user.clone()).await;
        let poll = store
            .insert_poll(new_poll(user.id, "inact001".to_string()), 50)
            .await
            .unwrap();
        let choices = store.list_choices(poll.id).await.unwrap();
        store.set_choice_active(choices[1].id, false).await;

        let ballot = Ballot {
            poll_id: poll.id,
            choice_ids: vec![choices[1].id],
            voter: Voter::Registered(user.id),
            voter_ip: "203.0.113.7".to_string(),
            voter_session: String::new(),
            user_agent: String::new(),
        };
        let result = store.record_ballot(ballot, Utc::now()).await;
        assert!(matches!(result, Err(StoreError::NotFound)));

        assert!(store.list_votes(poll.id).await.unwrap().is_empty());
        let poll = store.find_poll("inact001").await.unwrap().unwrap();
        assert_eq!(poll.total_votes, 0);
        assert_eq!(poll.unique_voters, 0);
    }
}
