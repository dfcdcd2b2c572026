//! Poll SaaS backend: poll management, vote intake with duplicate-vote
//! protection, and results.

pub mod config;
pub mod db;
pub mod error;
pub mod extract;
pub mod forms;
pub mod handlers;
pub mod identity;
pub mod logging;
pub mod models;
pub mod poll;
pub mod routes;
pub mod services;
pub mod store;

use std::sync::Arc;

use config::Config;
use store::{MemoryStore, PgStore, PollStore};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn PollStore>,
    pub config: Arc<Config>,
}

/// PostgreSQL when `DATABASE_URL` is set, otherwise the in-memory store.
pub async fn build_store(config: &Config) -> Result<Arc<dyn PollStore>, sqlx::Error> {
    match &config.database_url {
        Some(url) => {
            let pool = db::create_pool(url, config.db_max_connections).await?;
            db::run_migrations(&pool).await?;
            Ok(Arc::new(PgStore::new(pool)))
        }
        None => {
            tracing::warn!("DATABASE_URL not set; using the in-memory store, data is lost on exit");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}
