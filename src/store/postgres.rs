use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::PollStore;
use crate::error::StoreError;
use crate::models::{Ballot, BallotReceipt, Choice, NewPoll, Poll, User, Vote, Voter};

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn prior_votes(
        tx: &mut Transaction<'_, Postgres>,
        poll_id: i64,
        voter: &Voter,
    ) -> Result<i64, sqlx::Error> {
        match voter {
            Voter::Registered(user_id) => {
                sqlx::query_scalar("SELECT COUNT(*) FROM votes WHERE poll_id = $1 AND voter_id = $2")
                    .bind(poll_id)
                    .bind(user_id)
                    .fetch_one(&mut **tx)
                    .await
            }
            Voter::Anonymous { ip, session_key } => {
                sqlx::query_scalar(
                    r#"
                    SELECT COUNT(*) FROM votes
                    WHERE poll_id = $1 AND voter_id IS NULL
                      AND voter_ip = $2 AND voter_session = $3
                    "#,
                )
                .bind(poll_id)
                .bind(ip)
                .bind(session_key)
                .fetch_one(&mut **tx)
                .await
            }
        }
    }
}

fn unique_violation_as_duplicate(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::AlreadyVoted,
        _ => StoreError::Database(err),
    }
}

#[async_trait]
impl PollStore for PgStore {
    fn backend_tag(&self) -> &'static str {
        "postgres"
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn find_user(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn slug_exists(&self, slug: &str) -> Result<bool, StoreError> {
        let exists = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM polls WHERE slug = $1)")
            .bind(slug)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }

    async fn insert_poll(&self, new: NewPoll, poll_limit: i64) -> Result<Poll, StoreError> {
        let mut tx = self.pool.begin().await?;

        // Creations by the same user queue on this lock, so each one counts
        // the polls committed before it.
        sqlx::query("SELECT id FROM users WHERE id = $1 FOR UPDATE")
            .bind(new.creator_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(StoreError::NotFound)?;

        let existing: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM polls WHERE creator_id = $1")
            .bind(new.creator_id)
            .fetch_one(&mut *tx)
            .await?;
        if existing >= poll_limit {
            return Err(StoreError::QuotaExceeded);
        }

        let poll = sqlx::query_as::<_, Poll>(
            r#"
            INSERT INTO polls (
                slug, title, description, creator_id, poll_type, status, is_active,
                allow_multiple_votes, require_login, show_results, allow_anonymous, expires_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING *
            "#,
        )
        .bind(&new.slug)
        .bind(&new.title)
        .bind(&new.description)
        .bind(new.creator_id)
        .bind(new.poll_type)
        .bind(new.status)
        .bind(new.is_active)
        .bind(new.allow_multiple_votes)
        .bind(new.require_login)
        .bind(new.show_results)
        .bind(new.allow_anonymous)
        .bind(new.expires_at)
        .fetch_one(&mut *tx)
        .await?;

        for (position, text) in new.choices.iter().enumerate() {
            sqlx::query("INSERT INTO choices (poll_id, text, position) VALUES ($1, $2, $3)")
                .bind(poll.id)
                .bind(text)
                .bind(position as i32)
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query("UPDATE users SET polls_created = polls_created + 1 WHERE id = $1")
            .bind(new.creator_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(poll)
    }

    async fn find_poll(&self, slug: &str) -> Result<Option<Poll>, StoreError> {
        let poll = sqlx::query_as::<_, Poll>("SELECT * FROM polls WHERE slug = $1")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?;
        Ok(poll)
    }

    async fn list_polls_by_creator(&self, creator_id: Uuid) -> Result<Vec<Poll>, StoreError> {
        let polls = sqlx::query_as::<_, Poll>(
            "SELECT * FROM polls WHERE creator_id = $1 ORDER BY created_at DESC, id DESC",
        )
        .bind(creator_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(polls)
    }

    async fn list_choices(&self, poll_id: i64) -> Result<Vec<Choice>, StoreError> {
        let choices = sqlx::query_as::<_, Choice>(
            "SELECT * FROM choices WHERE poll_id = $1 ORDER BY position, id",
        )
        .bind(poll_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(choices)
    }

    async fn list_votes(&self, poll_id: i64) -> Result<Vec<Vote>, StoreError> {
        let votes = sqlx::query_as::<_, Vote>(
            "SELECT * FROM votes WHERE poll_id = $1 ORDER BY voted_at DESC, id DESC",
        )
        .bind(poll_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(votes)
    }

    async fn save_poll(&self, poll: &Poll) -> Result<Poll, StoreError> {
        sqlx::query_as::<_, Poll>(
            r#"
            UPDATE polls
            SET title = $2, description = $3, status = $4, is_active = $5,
                show_results = $6, expires_at = $7, updated_at = now()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(poll.id)
        .bind(&poll.title)
        .bind(&poll.description)
        .bind(poll.status)
        .bind(poll.is_active)
        .bind(poll.show_results)
        .bind(poll.expires_at)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound)
    }

    async fn delete_poll(&self, poll_id: i64) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM polls WHERE id = $1")
            .bind(poll_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn record_ballot(
        &self,
        ballot: Ballot,
        now: DateTime<Utc>,
    ) -> Result<BallotReceipt, StoreError> {
        let mut tx = self.pool.begin().await?;

        // Row lock serializes ballots on the same poll for the rest of the transaction.
        let poll = sqlx::query_as::<_, Poll>("SELECT * FROM polls WHERE id = $1 FOR UPDATE")
            .bind(ballot.poll_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(StoreError::NotFound)?;
        if !poll.can_vote(now) {
            return Err(StoreError::PollClosed);
        }

        let prior = Self::prior_votes(&mut tx, poll.id, &ballot.voter).await?;
        if prior > 0 && !poll.allow_multiple_votes {
            return Err(StoreError::AlreadyVoted);
        }

        let mut vote_ids = Vec::with_capacity(ballot.choice_ids.len());
        for choice_id in &ballot.choice_ids {
            let bumped = sqlx::query(
                "UPDATE choices SET votes = votes + 1 WHERE id = $1 AND poll_id = $2 AND is_active",
            )
            .bind(choice_id)
            .bind(poll.id)
            .execute(&mut *tx)
            .await?;
            if bumped.rows_affected() != 1 {
                return Err(StoreError::NotFound);
            }

            let vote_id: i64 = sqlx::query_scalar(
                r#"
                INSERT INTO votes (poll_id, choice_id, voter_id, voter_ip, voter_session, user_agent, voted_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                RETURNING id
                "#,
            )
            .bind(poll.id)
            .bind(choice_id)
            .bind(ballot.voter.user_id())
            .bind(&ballot.voter_ip)
            .bind(&ballot.voter_session)
            .bind(&ballot.user_agent)
            .bind(now)
            .fetch_one(&mut *tx)
            .await
            .map_err(unique_violation_as_duplicate)?;
            vote_ids.push(vote_id);
        }

        let first_vote = prior == 0;
        let (total_votes, unique_voters): (i32, i32) = sqlx::query_as(
            r#"
            UPDATE polls
            SET total_votes = total_votes + $2,
                unique_voters = unique_voters + $3
            WHERE id = $1
            RETURNING total_votes, unique_voters
            "#,
        )
        .bind(poll.id)
        .bind(vote_ids.len() as i32)
        .bind(i32::from(first_vote))
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(BallotReceipt {
            vote_ids,
            first_vote,
            total_votes,
            unique_voters,
        })
    }
}
