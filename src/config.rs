use std::{env, fmt::Display, str::FromStr};

use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// Absent means the in-memory store.
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    /// Always ends with `/` so share links can be joined onto it.
    pub public_base_url: String,
    pub allowed_origins: Vec<String>,
}

impl Config {
    pub fn load() -> Self {
        Self {
            host: try_load("HOST", "0.0.0.0"),
            port: try_load("PORT", "3030"),
            database_url: env::var("DATABASE_URL").ok().filter(|url| !url.is_empty()),
            db_max_connections: try_load("DB_MAX_CONNECTIONS", "5"),
            public_base_url: with_trailing_slash(try_load(
                "PUBLIC_BASE_URL",
                "http://localhost:3030",
            )),
            allowed_origins: env::var("ALLOWED_ORIGINS")
                .map(|origins| {
                    origins
                        .split(',')
                        .map(|origin| origin.trim().to_string())
                        .filter(|origin| !origin.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3030,
            database_url: None,
            db_max_connections: 5,
            public_base_url: "http://localhost:3030/".to_string(),
            allowed_origins: Vec::new(),
        }
    }
}

fn with_trailing_slash(mut url: String) -> String {
    if !url.ends_with('/') {
        url.push('/');
    }
    url
}

fn try_load<T: FromStr>(key: &str, default: &str) -> T
where
    T::Err: Display,
{
    env::var(key)
        .unwrap_or_else(|_| {
            info!("{key} not set, using default: {default}");
            default.to_string()
        })
        .parse()
        .map_err(|e| {
            warn!("Invalid {key} value: {e}");
        })
        .expect("Environment misconfigured!")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trailing_slash_is_added_once() {
        assert_eq!(with_trailing_slash("http://a.test".to_string()), "http://a.test/");
        assert_eq!(with_trailing_slash("http://a.test/".to_string()), "http://a.test/");
    }

    #[test]
    fn test_default_config_uses_memory_store() {
        let config = Config::default();
        assert!(config.database_url.is_none());
        assert!(config.public_base_url.ends_with('/'));
    }
}
