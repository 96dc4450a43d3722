//! Configuration management for the gate server.
//!
//! Loads configuration from environment variables (and `.env`, via `dotenvy`
//! in the binary) with sensible defaults. Unlike a missing variable, a
//! present but malformed one is an error: a gate that silently falls back to
//! the wrong time zone admits people on the wrong day.

use chrono::NaiveDate;
use chrono_tz::Tz;
use gatepass_core::calendar::EventCalendar;
use gatepass_core::registration::RegistrationPolicy;
use gatepass_runtime::RetryPolicy;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while reading configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A variable is set but cannot be parsed.
    #[error("Invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        /// Variable name
        key: &'static str,
        /// Raw value
        value: String,
        /// Why it was rejected
        reason: String,
    },

    /// A variable required by the selected setup is not set.
    #[error("Missing required variable {0}")]
    Missing(&'static str),
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server configuration
    pub server: ServerConfig,
    /// Group store configuration
    pub storage: StorageConfig,
    /// Event calendar and registration rules
    pub event: EventConfig,
    /// Commit-conflict retry configuration
    pub retry: RetryConfig,
}

/// Server configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to bind to
    pub port: u16,
    /// How long in-flight requests may run after a shutdown signal
    pub shutdown_timeout: Duration,
}

/// Which group store backs the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    /// Process memory; state is lost on restart
    Memory,
    /// `PostgreSQL`
    Postgres,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "postgres" | "postgresql" => Ok(Self::Postgres),
            other => Err(format!("expected `memory` or `postgres`, got `{other}`")),
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageConfig {
    /// Selected backend
    pub backend: StoreBackend,
    /// `PostgreSQL` connection URL (required for the postgres backend)
    pub database_url: Option<String>,
    /// Maximum number of connections in the pool
    pub max_connections: u32,
    /// Connection acquire timeout
    pub connect_timeout: Duration,
}

/// Event configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventConfig {
    /// Time zone "today" is computed in
    pub timezone: Tz,
    /// First segment of every ticket code
    pub code_prefix: String,
    /// Days registrations may select (empty means any day)
    pub days: Vec<NaiveDate>,
    /// Maximum companions per registration
    pub max_companions: u32,
    /// Mark remaining members entered when a group hits capacity
    pub capacity_cleanup: bool,
}

impl EventConfig {
    /// Calendar for the engine.
    #[must_use]
    pub fn calendar(&self) -> EventCalendar {
        EventCalendar::new(self.timezone).with_event_days(self.days.iter().copied())
    }

    /// Registration rules for the engine.
    #[must_use]
    pub fn registration_policy(&self) -> RegistrationPolicy {
        RegistrationPolicy {
            code_prefix: self.code_prefix.clone(),
            max_companions: self.max_companions,
            calendar: self.calendar(),
        }
    }
}

/// Retry configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    /// Attempts per scan, first included
    pub max_attempts: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Upper bound on any retry delay
    pub max_delay: Duration,
}

impl RetryConfig {
    /// Retry policy for the engine.
    #[must_use]
    pub const fn policy(&self) -> RetryPolicy {
        RetryPolicy::new()
            .with_max_attempts(self.max_attempts)
            .with_initial_delay(self.initial_delay)
            .with_max_delay(self.max_delay)
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a variable is malformed or the postgres
    /// backend is selected without `DATABASE_URL`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// See [`Config::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(lookup);

        let storage = StorageConfig {
            backend: vars.parse("GATE_STORE", StoreBackend::Memory)?,
            database_url: vars.get("DATABASE_URL"),
            max_connections: vars.parse("DATABASE_MAX_CONNECTIONS", 10)?,
            connect_timeout: Duration::from_secs(vars.parse("DATABASE_CONNECT_TIMEOUT", 30)?),
        };
        if storage.backend == StoreBackend::Postgres && storage.database_url.is_none() {
            return Err(ConfigError::Missing("DATABASE_URL"));
        }

        Ok(Self {
            server: ServerConfig {
                host: vars.get("GATE_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                port: vars.parse("GATE_PORT", 8080)?,
                shutdown_timeout: Duration::from_secs(vars.parse("GATE_SHUTDOWN_TIMEOUT", 30)?),
            },
            storage,
            event: EventConfig {
                timezone: vars.parse("EVENT_TIMEZONE", Tz::UTC)?,
                code_prefix: vars
                    .get("EVENT_CODE_PREFIX")
                    .unwrap_or_else(|| "GJ25".to_string()),
                days: vars.event_days("EVENT_DAYS")?,
                max_companions: vars.parse("EVENT_MAX_COMPANIONS", 10)?,
                capacity_cleanup: vars.parse("GATE_CAPACITY_CLEANUP", true)?,
            },
            retry: RetryConfig {
                max_attempts: vars.parse("GATE_RETRY_MAX_ATTEMPTS", 5)?,
                initial_delay: Duration::from_millis(
                    vars.parse("GATE_RETRY_INITIAL_DELAY_MS", 5)?,
                ),
                max_delay: Duration::from_millis(vars.parse("GATE_RETRY_MAX_DELAY_MS", 200)?),
            },
        })
    }
}

/// Variable lookup; blank values count as unset.
struct Vars<F>(F);

impl<F> Vars<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parse<T>(&self, key: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: ToString,
    {
        match self.get(key) {
            None => Ok(default),
            Some(value) => value.parse().map_err(|e: T::Err| ConfigError::Invalid {
                key,
                reason: e.to_string(),
                value,
            }),
        }
    }

    /// Comma-separated ISO dates.
    fn event_days(&self, key: &'static str) -> Result<Vec<NaiveDate>, ConfigError> {
        let Some(raw) = self.get(key) else {
            return Ok(Vec::new());
        };
        raw.split(',')
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(|d| {
                NaiveDate::parse_from_str(d, "%Y-%m-%d").map_err(|e| ConfigError::Invalid {
                    key,
                    value: d.to_string(),
                    reason: e.to_string(),
                })
            })
            .collect()
    }
}
