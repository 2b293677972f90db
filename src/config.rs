use std::{env, fmt::Display, str::FromStr};

use thiserror::Error;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_SECRET: &str = "jwtsecret";
const DEFAULT_LOG_FILTER: &str = "info";

/// Cheapest cost bcrypt accepts; keeps hashing fast in tests.
pub const TEST_BCRYPT_COST: u32 = 4;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid {key} value {value:?}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_path: String,
    pub jwt_secret: String,
    pub token_ttl_secs: u64,
    pub bcrypt_cost: u32,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        let jwt_secret = try_load("JWT_SECRET", DEFAULT_SECRET)?;
        if jwt_secret == DEFAULT_SECRET {
            warn!("JWT_SECRET is the built-in default, tokens are forgeable");
        }

        Ok(Self {
            host: try_load("HOST", "0.0.0.0")?,
            port: try_load("PORT", "5000")?,
            database_path: try_load("DATABASE_PATH", "bookreviews.db")?,
            jwt_secret,
            token_ttl_secs: try_load("TOKEN_TTL_SECS", "3600")?,
            bcrypt_cost: try_load("BCRYPT_COST", &bcrypt::DEFAULT_COST.to_string())?,
        })
    }

    /// In-memory store, throwaway secret and the cheapest hash cost.
    pub fn for_tests() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            database_path: ":memory:".into(),
            jwt_secret: "test-secret".into(),
            token_ttl_secs: 3600,
            bcrypt_cost: TEST_BCRYPT_COST,
        }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Log filter from a `RUST_LOG`-style directive, falling back to `info`
/// when it is unset or unparsable.
pub fn log_filter(directive: Option<String>) -> EnvFilter {
    directive
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_FILTER))
}

fn try_load<T: FromStr>(key: &'static str, default: &str) -> Result<T, ConfigError>
where
    T::Err: Display,
{
    let value = env::var(key).unwrap_or_else(|_| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });

    match value.parse() {
        Ok(parsed) => Ok(parsed),
        Err(e) => {
            warn!("Invalid {key} value: {e}");
            Err(ConfigError::Invalid {
                key,
                reason: e.to_string(),
                value,
            })
        }
    }
}
