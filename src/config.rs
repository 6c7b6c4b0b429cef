//! Process configuration read from the environment (after `.env` is loaded).

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;

use crate::session::{DEFAULT_ELECTION_BUDGET, DEFAULT_WINDOW_SECS};
use crate::sse::DEFAULT_CAPACITY;

/// Admin token used when running against the in-memory store without one set.
pub const DEV_ADMIN_TOKEN: &str = "admin";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{name} is required when {reason}")]
    Missing { name: &'static str, reason: &'static str },
    #[error("{name} has an invalid value {value:?}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    /// `None` runs against the in-memory store.
    pub database_url: Option<String>,
    pub listen_addr: SocketAddr,
    pub admin_token: String,
    pub voting_window_secs: u32,
    pub election_vote_budget: i64,
    pub broadcast_capacity: usize,
    pub sse_keepalive_secs: u64,
    pub session_inactivity_secs: i64,
    /// JSON file with shareholders and subjects loaded into the in-memory store.
    pub seed_file: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let database_url = get("DATABASE_URL");
        let admin_token = match (get("ADMIN_TOKEN"), &database_url) {
            (Some(token), _) => token,
            (None, None) => DEV_ADMIN_TOKEN.to_string(),
            (None, Some(_)) => {
                return Err(ConfigError::Missing {
                    name: "ADMIN_TOKEN",
                    reason: "DATABASE_URL is set",
                });
            }
        };

        Ok(Config {
            listen_addr: parse_or(&get, "LISTEN_ADDR", SocketAddr::from(([0, 0, 0, 0], 8080)))?,
            admin_token,
            voting_window_secs: parse_or(&get, "VOTING_WINDOW_SECS", DEFAULT_WINDOW_SECS)?,
            election_vote_budget: parse_or(&get, "ELECTION_VOTE_BUDGET", DEFAULT_ELECTION_BUDGET)?,
            broadcast_capacity: parse_or(&get, "BROADCAST_CAPACITY", DEFAULT_CAPACITY)?,
            sse_keepalive_secs: parse_or(&get, "SSE_KEEPALIVE_SECS", 30)?,
            session_inactivity_secs: parse_or(&get, "SESSION_INACTIVITY_SECS", 3600)?,
            seed_file: get("SEED_FILE").map(PathBuf::from),
            database_url,
        })
    }
}

fn parse_or<T, G>(get: &G, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(name) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_run_in_memory() {
        let config = config(&[]).unwrap();

        assert!(config.database_url.is_none());
        assert_eq!(config.admin_token, DEV_ADMIN_TOKEN);
        assert_eq!(config.listen_addr.port(), 8080);
        assert_eq!(config.voting_window_secs, 60);
        assert_eq!(config.election_vote_budget, 3);
        assert_eq!(config.broadcast_capacity, 256);
        assert_eq!(config.sse_keepalive_secs, 30);
        assert!(config.seed_file.is_none());
    }

    #[test]
    fn postgres_mode_requires_an_admin_token() {
        let err = config(&[("DATABASE_URL", "postgres://localhost/agm")]).unwrap_err();
        assert!(matches!(err, ConfigError::Missing { name: "ADMIN_TOKEN", .. }));

        let config = config(&[
            ("DATABASE_URL", "postgres://localhost/agm"),
            ("ADMIN_TOKEN", "s3cret"),
        ])
        .unwrap();
        assert!(config.database_url.is_some());
        assert_eq!(config.admin_token, "s3cret");
    }

    #[test]
    fn overrides_are_parsed() {
        let config = config(&[
            ("LISTEN_ADDR", "127.0.0.1:3000"),
            ("VOTING_WINDOW_SECS", "90"),
            ("ELECTION_VOTE_BUDGET", "5"),
            ("SEED_FILE", "seed.json"),
        ])
        .unwrap();

        assert_eq!(config.listen_addr, "127.0.0.1:3000".parse().unwrap());
        assert_eq!(config.voting_window_secs, 90);
        assert_eq!(config.election_vote_budget, 5);
        assert_eq!(config.seed_file, Some(PathBuf::from("seed.json")));
    }

    #[test]
    fn malformed_numbers_are_rejected() {
        let err = config(&[("VOTING_WINDOW_SECS", "soon")]).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid { name: "VOTING_WINDOW_SECS", .. }
        ));
    }
}
