use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use mongodb::{error::Error as DbError, Client as MongoClient, Database};
use serde::Deserialize;
use thiserror::Error;

use crate::model::mongodb::ensure_indexes_exist;

/// Default config file, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "Reconciler.toml";

/// Prefix of the environment variables that override the config file.
pub const ENV_PREFIX: &str = "RECONCILER_";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load config: {0}")]
    Load(#[from] figment::Error),
    #[error("Invalid config value for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Application configuration, derived from the defaults, `Reconciler.toml`
/// and `RECONCILER_*` environment variables, in increasing precedence.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // secrets
    db_uri: String,
    // non-secrets
    db_name: String,
    period_secs: u64,
    max_concurrent_elections: usize,
}

impl Config {
    /// The built-in defaults. There is no default for `db_uri`.
    pub fn defaults() -> Figment {
        Figment::new()
            .merge(Serialized::default("db_name", "elections"))
            .merge(Serialized::default("period_secs", 5))
            .merge(Serialized::default("max_concurrent_elections", 8))
    }

    /// The full provider stack, reading the given TOML file if it exists.
    pub fn figment(path: impl AsRef<Path>) -> Figment {
        Self::defaults()
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX))
    }

    /// Load and validate the config from the given file and the environment.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_figment(Self::figment(path))
    }

    pub fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let config: Self = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.db_uri.trim().is_empty() {
            return Err(ConfigError::Invalid {
                key: "db_uri",
                reason: "must not be empty".to_string(),
            });
        }
        if self.period_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "period_secs",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.max_concurrent_elections == 0 {
            return Err(ConfigError::Invalid {
                key: "max_concurrent_elections",
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    /// MongoDB connection string.
    pub fn db_uri(&self) -> &str {
        &self.db_uri
    }

    /// Name of the database holding the election collections.
    pub fn db_name(&self) -> &str {
        &self.db_name
    }

    /// Seconds between the start of consecutive reconciliation passes.
    pub fn period_secs(&self) -> u64 {
        self.period_secs
    }

    /// Override the period, e.g. from the command line.
    pub fn set_period_secs(&mut self, period_secs: u64) -> Result<(), ConfigError> {
        if period_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "period_secs",
                reason: "must be greater than zero".to_string(),
            });
        }
        self.period_secs = period_secs;
        Ok(())
    }

    /// How many elections a pass works on at once.
    pub fn max_concurrent_elections(&self) -> usize {
        self.max_concurrent_elections
    }
}

/// Connect to the configured database and make sure the required indexes exist.
pub async fn connect(config: &Config) -> Result<Database, DbError> {
    info!("Connecting to database {}...", config.db_name());
    let client = MongoClient::with_uri_str(config.db_uri()).await?;
    let db = client.database(config.db_name());
    ensure_indexes_exist(&db).await?;
    info!("...database connection online!");
    Ok(db)
}

/// A freshly named database on the server at `DB_URI`.
/// Use a random name to avoid collisions between tests.
#[cfg(test)]
pub async fn test_database() -> Database {
    let db_uri =
        std::env::var("DB_URI").unwrap_or_else(|_| "mongodb://localhost:27017".to_string());
    let client = MongoClient::with_uri_str(&db_uri).await.unwrap();
    let random: u32 = rand::random();
    let db = client.database(&format!("test{random}"));
    info!("Using database {}", db.name());
    ensure_indexes_exist(&db).await.unwrap();
    db
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply() {
        let config =
            Config::from_figment(Config::defaults().merge(("db_uri", "mongodb://db:27017")))
                .unwrap();
        assert_eq!(config.db_uri(), "mongodb://db:27017");
        assert_eq!(config.db_name(), "elections");
        assert_eq!(config.period_secs(), 5);
        assert_eq!(config.max_concurrent_elections(), 8);
    }

    #[test]
    fn later_providers_override() {
        let figment = Config::defaults()
            .merge(("db_uri", "mongodb://db:27017"))
            .merge(("db_name", "staging"))
            .merge(("period_secs", 30));
        let mut config = Config::from_figment(figment).unwrap();
        assert_eq!(config.db_name(), "staging");
        assert_eq!(config.period_secs(), 30);

        config.set_period_secs(2).unwrap();
        assert_eq!(config.period_secs(), 2);
        assert!(config.set_period_secs(0).is_err());
    }

    #[test]
    fn db_uri_is_required() {
        assert!(matches!(
            Config::from_figment(Config::defaults()),
            Err(ConfigError::Load(_))
        ));
    }

    #[test]
    fn zero_values_are_rejected() {
        let base = Config::defaults().merge(("db_uri", "mongodb://db:27017"));
        for key in ["period_secs", "max_concurrent_elections"] {
            let result = Config::from_figment(base.clone().merge((key, 0)));
            match result {
                Err(ConfigError::Invalid { key: bad, .. }) => assert_eq!(bad, key),
                other => panic!("expected invalid {key}, got {other:?}"),
            }
        }
    }
}
