// src/db.rs
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use std::time::Duration;

pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<Pool<Postgres>, sqlx::Error> {
    tracing::info!("Initializing database connection pool...");

    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(3))
        .connect(database_url)
        .await?;

    sqlx::query("SELECT 1").execute(&pool).await?;
    tracing::info!("Database connection pool initialized");

    Ok(pool)
}

pub async fn run_migrations(pool: &Pool<Postgres>) -> Result<(), sqlx::Error> {
    tracing::info!("Running database migrations...");

    sqlx::query(
        r#"
        DO $$ BEGIN
            CREATE TYPE poll_type AS ENUM ('single', 'multiple', 'rating', 'yes_no');
        EXCEPTION WHEN duplicate_object THEN NULL;
        END $$
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        DO $$ BEGIN
            CREATE TYPE poll_status AS ENUM ('draft', 'active', 'expired', 'closed');
        EXCEPTION WHEN duplicate_object THEN NULL;
        END $$
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id UUID PRIMARY KEY,
            email TEXT UNIQUE NOT NULL,
            is_premium BOOLEAN NOT NULL DEFAULT false,
            premium_until TIMESTAMPTZ,
            polls_created INTEGER NOT NULL DEFAULT 0,
            date_joined TIMESTAMPTZ NOT NULL DEFAULT now()
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS polls (
            id BIGSERIAL PRIMARY KEY,
            slug VARCHAR(50) UNIQUE NOT NULL,
            title VARCHAR(200) NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            creator_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            poll_type poll_type NOT NULL DEFAULT 'single',
            status poll_status NOT NULL DEFAULT 'draft',
            is_active BOOLEAN NOT NULL DEFAULT true,
            allow_multiple_votes BOOLEAN NOT NULL DEFAULT false,
            require_login BOOLEAN NOT NULL DEFAULT false,
            show_results BOOLEAN NOT NULL DEFAULT true,
            allow_anonymous BOOLEAN NOT NULL DEFAULT true,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            expires_at TIMESTAMPTZ,
            total_votes INTEGER NOT NULL DEFAULT 0,
            unique_voters INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS choices (
            id BIGSERIAL PRIMARY KEY,
            poll_id BIGINT NOT NULL REFERENCES polls(id) ON DELETE CASCADE,
            text VARCHAR(200) NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            votes INTEGER NOT NULL DEFAULT 0,
            position INTEGER NOT NULL DEFAULT 0,
            is_active BOOLEAN NOT NULL DEFAULT true,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS votes (
            id BIGSERIAL PRIMARY KEY,
            poll_id BIGINT NOT NULL REFERENCES polls(id) ON DELETE CASCADE,
            choice_id BIGINT NOT NULL REFERENCES choices(id) ON DELETE CASCADE,
            voter_id UUID REFERENCES users(id) ON DELETE SET NULL,
            voter_ip TEXT NOT NULL,
            voter_session VARCHAR(40) NOT NULL DEFAULT '',
            user_agent TEXT NOT NULL DEFAULT '',
            voted_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            is_valid BOOLEAN NOT NULL DEFAULT true,
            flagged_reason VARCHAR(100) NOT NULL DEFAULT ''
        )
        "#,
    )
    .execute(pool)
    .await?;

    // A registered voter holds at most one row per choice; the per-poll rule
    // for single-vote polls is enforced under the poll row lock.
    sqlx::query(
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS unique_registered_user_vote
            ON votes (poll_id, voter_id, choice_id) WHERE voter_id IS NOT NULL
        "#,
    )
    .execute(pool)
    .await?;

    for index in [
        "CREATE INDEX IF NOT EXISTS idx_polls_creator_created ON polls (creator_id, created_at DESC)",
        "CREATE INDEX IF NOT EXISTS idx_polls_status_active ON polls (status, is_active)",
        "CREATE INDEX IF NOT EXISTS idx_choices_poll_position ON choices (poll_id, position)",
        "CREATE INDEX IF NOT EXISTS idx_votes_poll_voted ON votes (poll_id, voted_at DESC)",
        "CREATE INDEX IF NOT EXISTS idx_votes_ip_poll ON votes (voter_ip, poll_id)",
        "CREATE INDEX IF NOT EXISTS idx_votes_voter_poll ON votes (voter_id, poll_id)",
    ] {
        sqlx::query(index).execute(pool).await?;
    }

    tracing::info!("Database migrations completed");
    Ok(())
}
