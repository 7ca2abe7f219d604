//! Configuration for labnote.
//!
//! Configuration is loaded from environment variables (`LABNOTE_*` prefixed,
//! plus the conventional `DATABASE_URL`) and handed explicitly to whatever
//! needs it. Nothing in the pipeline reads ambient settings.
//!
//! ```rust,no_run
//! use labnote_core::config::LabnoteConfig;
//!
//! let config = LabnoteConfig::from_env();
//! config.validate().expect("invalid configuration");
//! ```

use std::env;
use std::fmt;
use std::str::FromStr;

use chrono::format::{Item, StrftimeItems};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::defaults;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid database engine: {0}")]
    InvalidEngine(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Relational engine backing the storage port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseEngine {
    #[default]
    Postgres,
    MySql,
}

impl FromStr for DatabaseEngine {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(Self::Postgres),
            "mysql" | "mariadb" => Ok(Self::MySql),
            _ => Err(ConfigError::InvalidEngine(s.to_string())),
        }
    }
}

impl fmt::Display for DatabaseEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Postgres => write!(f, "postgres"),
            Self::MySql => write!(f, "mysql"),
        }
    }
}

/// Database connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub engine: DatabaseEngine,
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            engine: DatabaseEngine::default(),
            url: defaults::DATABASE_URL.to_string(),
            max_connections: defaults::DB_MAX_CONNECTIONS,
        }
    }
}

impl DatabaseConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.url.is_empty() {
            return Err(ConfigError::Validation(
                "database url cannot be empty".to_string(),
            ));
        }

        let expected_scheme = match self.engine {
            DatabaseEngine::Postgres => ["postgres://", "postgresql://"],
            DatabaseEngine::MySql => ["mysql://", "mariadb://"],
        };
        if !expected_scheme.iter().any(|s| self.url.starts_with(s)) {
            return Err(ConfigError::Validation(format!(
                "database url for {} must start with {}",
                self.engine, expected_scheme[0]
            )));
        }

        if self.max_connections == 0 {
            return Err(ConfigError::Validation(
                "max_connections must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

/// Input formats for the Date and Time table cells (chrono syntax).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateTimeFormats {
    pub date: String,
    pub time: String,
}

impl Default for DateTimeFormats {
    fn default() -> Self {
        Self {
            date: defaults::DATE_FORMAT.to_string(),
            time: defaults::TIME_FORMAT.to_string(),
        }
    }
}

impl DateTimeFormats {
    pub fn new(date: impl Into<String>, time: impl Into<String>) -> Self {
        Self {
            date: date.into(),
            time: time.into(),
        }
    }

    /// Format used to parse `"<date> <time>"`.
    pub fn combined(&self) -> String {
        format!("{} {}", self.date, self.time)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        for (name, fmt) in [("date", &self.date), ("time", &self.time)] {
            if fmt.trim().is_empty() {
                return Err(ConfigError::Validation(format!(
                    "{} format cannot be empty",
                    name
                )));
            }
            if StrftimeItems::new(fmt).any(|item| matches!(item, Item::Error)) {
                return Err(ConfigError::Validation(format!(
                    "{} format is not a valid strftime pattern: {}",
                    name, fmt
                )));
            }
        }
        Ok(())
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LabnoteConfig {
    pub database: DatabaseConfig,
    pub formats: DateTimeFormats,
}

impl LabnoteConfig {
    /// Build configuration from environment variables, falling back to
    /// [`defaults`] for anything unset or unparsable.
    pub fn from_env() -> Self {
        let engine = env::var("LABNOTE_DB_ENGINE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or_default();

        let database = DatabaseConfig {
            engine,
            url: env::var("DATABASE_URL").unwrap_or_else(|_| defaults::DATABASE_URL.to_string()),
            max_connections: env::var("LABNOTE_DB_MAX_CONNECTIONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults::DB_MAX_CONNECTIONS),
        };

        let formats = DateTimeFormats {
            date: env::var("LABNOTE_DATE_FORMAT")
                .unwrap_or_else(|_| defaults::DATE_FORMAT.to_string()),
            time: env::var("LABNOTE_TIME_FORMAT")
                .unwrap_or_else(|_| defaults::TIME_FORMAT.to_string()),
        };

        debug!(
            subsystem = "config",
            engine = %database.engine,
            date_format = %formats.date,
            time_format = %formats.time,
            "Configuration loaded from environment"
        );

        Self { database, formats }
    }

    /// Validate every section.
    pub fn validate(&self) -> ConfigResult<()> {
        self.database.validate()?;
        self.formats.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_from_str() {
        assert_eq!("postgres".parse::<DatabaseEngine>().unwrap(), DatabaseEngine::Postgres);
        assert_eq!("PostgreSQL".parse::<DatabaseEngine>().unwrap(), DatabaseEngine::Postgres);
        assert_eq!("mysql".parse::<DatabaseEngine>().unwrap(), DatabaseEngine::MySql);
        assert_eq!("MariaDB".parse::<DatabaseEngine>().unwrap(), DatabaseEngine::MySql);
        assert!(matches!(
            "sqlite".parse::<DatabaseEngine>(),
            Err(ConfigError::InvalidEngine(_))
        ));
    }

    #[test]
    fn test_engine_display_round_trips() {
        for engine in [DatabaseEngine::Postgres, DatabaseEngine::MySql] {
            assert_eq!(engine.to_string().parse::<DatabaseEngine>().unwrap(), engine);
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        LabnoteConfig::default().validate().unwrap();
    }

    #[test]
    fn test_database_url_must_match_engine() {
        let config = DatabaseConfig {
            engine: DatabaseEngine::MySql,
            url: "postgres://localhost/labnote".to_string(),
            max_connections: 1,
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("mysql://"));
    }

    #[test]
    fn test_zero_connections_rejected() {
        let config = DatabaseConfig {
            max_connections: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_combined_format() {
        let formats = DateTimeFormats::new("%d.%m.%Y", "%H:%M:%S");
        assert_eq!(formats.combined(), "%d.%m.%Y %H:%M:%S");
    }

    #[test]
    fn test_invalid_strftime_rejected() {
        let formats = DateTimeFormats::new("%Y-%m-%Q", "%H:%M");
        assert!(formats.validate().is_err());

        let formats = DateTimeFormats::new("%Y-%m-%d", "  ");
        assert!(formats.validate().is_err());
    }

    #[test]
    fn test_deserialize_engine() {
        #[derive(Deserialize)]
        struct Test {
            engine: DatabaseEngine,
        }
        let test: Test = serde_json::from_str(r#"{"engine":"mysql"}"#).unwrap();
        assert_eq!(test.engine, DatabaseEngine::MySql);
    }
}
