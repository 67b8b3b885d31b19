use crate::utils::RetryConfig;

// ============================================================================
// Configuration - environment driven
// ============================================================================
//
// DATABASE_URL        Postgres connection string (required)
// ES_EVENTS_TABLE     events table, optionally schema qualified (es_events)
// ES_MAX_CONNECTIONS  pool size (5)
// ES_RETRY_ATTEMPTS   attempts per command on concurrency conflicts (3)
//
// ============================================================================

pub const DEFAULT_EVENTS_TABLE: &str = "es_events";
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value {value:?} for {key}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub events_table: String,
    pub max_connections: u32,
    pub retry: RetryConfig,
}

impl AppConfig {
    /// Loads `.env` if present, then reads the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Err(e) = dotenvy::dotenv() {
            if !e.not_found() {
                tracing::warn!(error = %e, "Ignoring unreadable .env file");
            }
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL")
            .filter(|url| !url.trim().is_empty())
            .ok_or(ConfigError::Missing("DATABASE_URL"))?;

        let events_table = lookup("ES_EVENTS_TABLE").unwrap_or_else(|| DEFAULT_EVENTS_TABLE.to_string());
        let max_connections = parse_or(&lookup, "ES_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS)?;
        let retry_attempts = parse_or(&lookup, "ES_RETRY_ATTEMPTS", DEFAULT_RETRY_ATTEMPTS)?;

        Ok(Self {
            database_url,
            events_table,
            max_connections,
            retry: RetryConfig::default().with_max_attempts(retry_attempts),
        })
    }
}

fn parse_or<F>(lookup: &F, key: &'static str, default: u32) -> Result<u32, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::from_lookup(lookup(&[("DATABASE_URL", "postgres://localhost/es")])).unwrap();
        assert_eq!(config.database_url, "postgres://localhost/es");
        assert_eq!(config.events_table, DEFAULT_EVENTS_TABLE);
        assert_eq!(config.max_connections, DEFAULT_MAX_CONNECTIONS);
        assert_eq!(config.retry.max_attempts, DEFAULT_RETRY_ATTEMPTS);
    }

    #[test]
    fn test_overrides() {
        let config = AppConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://db/es"),
            ("ES_EVENTS_TABLE", "billing.payment_events"),
            ("ES_MAX_CONNECTIONS", "20"),
            ("ES_RETRY_ATTEMPTS", "0"),
        ]))
        .unwrap();
        assert_eq!(config.events_table, "billing.payment_events");
        assert_eq!(config.max_connections, 20);
        assert_eq!(config.retry.max_attempts, 1);
    }

    #[test]
    fn test_missing_database_url() {
        let result = AppConfig::from_lookup(lookup(&[("DATABASE_URL", "  ")]));
        assert!(matches!(result, Err(ConfigError::Missing("DATABASE_URL"))));
    }

    #[test]
    fn test_invalid_number() {
        let result = AppConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://db/es"),
            ("ES_MAX_CONNECTIONS", "many"),
        ]));
        assert!(matches!(result, Err(ConfigError::Invalid { key: "ES_MAX_CONNECTIONS", .. })));
    }
}
