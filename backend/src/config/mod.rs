//! Application configuration management

use std::env;

use anyhow::{Context, Result};

use crate::query::QueryLimits;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// SQLite database URL or path.
    /// Prefers DATABASE_PATH, falls back to DATABASE_URL
    pub database_url: String,

    /// Connection pool size
    pub max_connections: u32,

    /// Pagination and filter bounds applied by the mediator
    pub limits: QueryLimits,

    /// Attempts for read-only requests failing with an unavailable backend
    pub retry_attempts: u32,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from any key lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = QueryLimits::default();

        let database_url = lookup("DATABASE_PATH")
            .or_else(|| lookup("DATABASE_URL"))
            .unwrap_or_else(|| "./data/zoneminder.db".to_string());

        let max_connections = lookup("DATABASE_MAX_CONNECTIONS")
            .unwrap_or_else(|| "10".to_string())
            .parse()
            .context("Invalid DATABASE_MAX_CONNECTIONS")?;

        let limits = QueryLimits {
            default_page_size: parse_or(&lookup, "ZM_DEFAULT_PAGE_SIZE", defaults.default_page_size)?,
            max_page_size: parse_or(&lookup, "ZM_MAX_PAGE_SIZE", defaults.max_page_size)?,
            max_skip: parse_or(&lookup, "ZM_MAX_SKIP", defaults.max_skip)?,
            max_filter_depth: parse_or(&lookup, "ZM_MAX_FILTER_DEPTH", defaults.max_filter_depth)?,
        };
        if limits.default_page_size > limits.max_page_size {
            anyhow::bail!(
                "ZM_DEFAULT_PAGE_SIZE ({}) exceeds ZM_MAX_PAGE_SIZE ({})",
                limits.default_page_size,
                limits.max_page_size
            );
        }

        Ok(Self {
            database_url: sqlite_url(&database_url),
            max_connections,
            limits,
            retry_attempts: parse_or(&lookup, "ZM_RETRY_ATTEMPTS", 3)?,
        })
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().with_context(|| format!("Invalid {}", key)),
        None => Ok(default),
    }
}

/// A bare path becomes a `sqlite://` URL
fn sqlite_url(raw: &str) -> String {
    if raw.starts_with("sqlite:") {
        raw.to_string()
    } else {
        format!("sqlite://{}", raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]).unwrap();
        assert_eq!(config.database_url, "sqlite://./data/zoneminder.db");
        assert_eq!(config.max_connections, 10);
        assert_eq!(config.limits, QueryLimits::default());
        assert_eq!(config.retry_attempts, 3);
    }

    #[test]
    fn test_database_path_wins() {
        let config = config(&[
            ("DATABASE_PATH", "/var/lib/zm.db"),
            ("DATABASE_URL", "sqlite::memory:"),
        ])
        .unwrap();
        assert_eq!(config.database_url, "sqlite:///var/lib/zm.db");
    }

    #[test]
    fn test_limits_override_and_errors() {
        let limits = config(&[("ZM_MAX_PAGE_SIZE", "50"), ("ZM_DEFAULT_PAGE_SIZE", "20")])
            .unwrap()
            .limits;
        assert_eq!(limits.max_page_size, 50);
        assert_eq!(limits.default_page_size, 20);

        assert!(config(&[("ZM_MAX_SKIP", "lots")]).is_err());
        assert!(config(&[("ZM_DEFAULT_PAGE_SIZE", "5000")]).is_err());
    }
}
