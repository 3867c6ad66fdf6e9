//! Option set describing one connection target.
//!
//! [`DbOptions`] is a partial set built with chained setters. Several of them
//! can be folded together with [`DbOptions::merge`], where the last non-empty
//! value of each field wins. [`DbOptions::build`] then fills in defaults and
//! validates once, producing an immutable [`DbConfig`].

use std::{str::FromStr, time::Duration};

use log::LevelFilter;
use poolkit_core::Settings;
use serde::{Deserialize, Serialize};

use crate::{dialect::Dialect, error::ConnectionError};

pub const DEFAULT_TIMEZONE: &str = "UTC";
pub const DEFAULT_MAX_IDLE_CONNS: u32 = 10;
pub const DEFAULT_MAX_OPEN_CONNS: u32 = 100;
pub const DEFAULT_CONN_MAX_LIFETIME: Duration = Duration::from_secs(30 * 60);
pub const DEFAULT_CONN_MAX_IDLE_TIME: Duration = Duration::from_secs(30 * 60);
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Statements slower than this are reported at `warn`.
pub const SLOW_STATEMENT_THRESHOLD: Duration = Duration::from_secs(1);

/// Verbosity of the statement logging done by the database driver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Silent,
    Error,
    Warn,
    #[default]
    Info,
}

impl LogLevel {
    /// Level every executed statement is logged at.
    pub fn statements(self) -> LevelFilter {
        match self {
            LogLevel::Info => LevelFilter::Info,
            _ => LevelFilter::Off,
        }
    }

    /// Level statements above [`SLOW_STATEMENT_THRESHOLD`] are logged at.
    pub fn slow_statements(self) -> LevelFilter {
        match self {
            LogLevel::Info | LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Error | LogLevel::Silent => LevelFilter::Off,
        }
    }
}

impl FromStr for LogLevel {
    type Err = ConnectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "silent" => Ok(LogLevel::Silent),
            "error" => Ok(LogLevel::Error),
            "warn" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            _ => Err(ConnectionError::InvalidLogLevel(s.to_owned())),
        }
    }
}

/// Pool limits applied once, when the pool is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSettings {
    /// Only honored by custom backends. The sqlx and bb8 pools of
    /// [`DefaultBackend`](crate::DefaultBackend) cannot cap idle connections
    /// and bound them with `conn_max_idle_time` instead.
    pub max_idle_conns: u32,
    pub max_open_conns: u32,
    pub conn_max_lifetime: Duration,
    pub conn_max_idle_time: Duration,
}

/// How often and how patiently a first connection is attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_RETRY_ATTEMPTS,
            delay: DEFAULT_RETRY_DELAY,
        }
    }
}

/// Partial option set. Unset fields are filled in by [`DbOptions::build`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DbOptions {
    dialect: Option<Dialect>,
    database_name: Option<String>,
    host: Option<String>,
    port: Option<u16>,
    user: Option<String>,
    password: Option<String>,
    timezone: Option<String>,
    max_idle_conns: Option<u32>,
    max_open_conns: Option<u32>,
    conn_max_lifetime: Option<Duration>,
    conn_max_idle_time: Option<Duration>,
    log_level: Option<LogLevel>,
    retry_attempts: Option<u32>,
    retry_delay: Option<Duration>,
}

impl DbOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = Some(dialect);
        self
    }

    pub fn database_name(mut self, name: impl Into<String>) -> Self {
        self.database_name = Some(name.into());
        self
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Overrides the dialect's default port. `0` is rejected for network dialects.
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn timezone(mut self, timezone: impl Into<String>) -> Self {
        self.timezone = Some(timezone.into());
        self
    }

    /// Cap on idle connections, handed to the backend in [`PoolSettings`].
    /// [`DefaultBackend`](crate::DefaultBackend) does not enforce it; set
    /// [`conn_max_idle_time`](Self::conn_max_idle_time) to release idle
    /// connections there.
    pub fn max_idle_conns(mut self, max: u32) -> Self {
        self.max_idle_conns = Some(max);
        self
    }

    pub fn max_open_conns(mut self, max: u32) -> Self {
        self.max_open_conns = Some(max);
        self
    }

    pub fn conn_max_lifetime(mut self, lifetime: Duration) -> Self {
        self.conn_max_lifetime = Some(lifetime);
        self
    }

    pub fn conn_max_idle_time(mut self, idle_time: Duration) -> Self {
        self.conn_max_idle_time = Some(idle_time);
        self
    }

    pub fn log_level(mut self, level: LogLevel) -> Self {
        self.log_level = Some(level);
        self
    }

    pub fn retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = Some(attempts);
        self
    }

    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = Some(delay);
        self
    }

    /// Fold several partial sets into one. For every field the last set that
    /// supplies a value wins; empty strings count as unset.
    pub fn merge<I>(sets: I) -> Self
    where
        I: IntoIterator<Item = DbOptions>,
    {
        sets.into_iter().fold(Self::default(), |acc, next| acc.overlay(next))
    }

    fn overlay(self, next: DbOptions) -> Self {
        Self {
            dialect: next.dialect.or(self.dialect),
            database_name: non_empty(next.database_name).or(self.database_name),
            host: non_empty(next.host).or(self.host),
            port: next.port.or(self.port),
            user: non_empty(next.user).or(self.user),
            password: non_empty(next.password).or(self.password),
            timezone: non_empty(next.timezone).or(self.timezone),
            max_idle_conns: next.max_idle_conns.or(self.max_idle_conns),
            max_open_conns: next.max_open_conns.or(self.max_open_conns),
            conn_max_lifetime: next.conn_max_lifetime.or(self.conn_max_lifetime),
            conn_max_idle_time: next.conn_max_idle_time.or(self.conn_max_idle_time),
            log_level: next.log_level.or(self.log_level),
            retry_attempts: next.retry_attempts.or(self.retry_attempts),
            retry_delay: next.retry_delay.or(self.retry_delay),
        }
    }

    /// Apply defaults and validate.
    ///
    /// Reports every missing mandatory field at once rather than stopping at
    /// the first one.
    pub fn build(self) -> Result<DbConfig, ConnectionError> {
        let database_name = non_empty(self.database_name);
        let host = non_empty(self.host);
        let user = non_empty(self.user);

        let mut missing = Vec::new();

        if self.dialect.is_none() {
            missing.push("dialect");
        }
        if database_name.is_none() {
            missing.push("database name");
        }

        let port = match self.dialect {
            Some(dialect) => self.port.unwrap_or(dialect.default_port()),
            None => self.port.unwrap_or_default(),
        };

        if self.dialect.is_some_and(|dialect| !dialect.is_embedded()) {
            if host.is_none() {
                missing.push("host");
            }
            if port == 0 {
                missing.push("port");
            }
            if user.is_none() {
                missing.push("user");
            }
        }

        let (Some(dialect), Some(database_name), true) =
            (self.dialect, database_name, missing.is_empty())
        else {
            return Err(ConnectionError::MissingOptions(missing));
        };

        Ok(DbConfig {
            dialect,
            database_name,
            host: host.unwrap_or_default(),
            port,
            user: user.unwrap_or_default(),
            password: self.password.unwrap_or_default(),
            timezone: non_empty(self.timezone).unwrap_or_else(|| DEFAULT_TIMEZONE.to_owned()),
            max_idle_conns: self.max_idle_conns.unwrap_or(DEFAULT_MAX_IDLE_CONNS),
            max_open_conns: self.max_open_conns.unwrap_or(DEFAULT_MAX_OPEN_CONNS),
            conn_max_lifetime: self.conn_max_lifetime.unwrap_or(DEFAULT_CONN_MAX_LIFETIME),
            conn_max_idle_time: self.conn_max_idle_time.unwrap_or(DEFAULT_CONN_MAX_IDLE_TIME),
            log_level: self.log_level.unwrap_or_default(),
            retry: RetryPolicy {
                attempts: self.retry_attempts.unwrap_or(DEFAULT_RETRY_ATTEMPTS),
                delay: self.retry_delay.unwrap_or(DEFAULT_RETRY_DELAY),
            },
        })
    }
}

impl TryFrom<&Settings> for DbOptions {
    type Error = ConnectionError;

    fn try_from(settings: &Settings) -> Result<Self, Self::Error> {
        let mut options = DbOptions {
            database_name: settings.database_name.clone(),
            host: settings.host.clone(),
            port: settings.port,
            user: settings.user.clone(),
            password: settings.password.clone(),
            timezone: settings.timezone.clone(),
            max_idle_conns: settings.max_idle_conns,
            max_open_conns: settings.max_open_conns,
            conn_max_lifetime: settings.conn_max_lifetime_secs.map(Duration::from_secs),
            conn_max_idle_time: settings.conn_max_idle_time_secs.map(Duration::from_secs),
            retry_attempts: settings.retry_attempts,
            retry_delay: settings.retry_delay_ms.map(Duration::from_millis),
            ..DbOptions::default()
        };

        if let Some(name) = &settings.dialect {
            options.dialect = Some(name.parse()?);
        }
        if let Some(level) = &settings.log_level {
            options.log_level = Some(level.parse()?);
        }

        Ok(options)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.is_empty())
}

/// Validated, immutable description of one connection target.
#[derive(Clone, PartialEq, Eq)]
pub struct DbConfig {
    dialect: Dialect,
    database_name: String,
    host: String,
    port: u16,
    user: String,
    password: String,
    timezone: String,
    max_idle_conns: u32,
    max_open_conns: u32,
    conn_max_lifetime: Duration,
    conn_max_idle_time: Duration,
    log_level: LogLevel,
    retry: RetryPolicy,
}

impl DbConfig {
    /// Merge the given partial sets and validate the result.
    pub fn from_options<I>(sets: I) -> Result<Self, ConnectionError>
    where
        I: IntoIterator<Item = DbOptions>,
    {
        DbOptions::merge(sets).build()
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn database_name(&self) -> &str {
        &self.database_name
    }

    /// Empty for the embedded dialect.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// `0` for the embedded dialect.
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn timezone(&self) -> &str {
        &self.timezone
    }

    pub fn log_level(&self) -> LogLevel {
        self.log_level
    }

    pub fn pool_settings(&self) -> PoolSettings {
        PoolSettings {
            max_idle_conns: self.max_idle_conns,
            max_open_conns: self.max_open_conns,
            conn_max_lifetime: self.conn_max_lifetime,
            conn_max_idle_time: self.conn_max_idle_time,
        }
    }

    pub fn retry(&self) -> RetryPolicy {
        self.retry
    }
}

impl std::fmt::Debug for DbConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbConfig")
            .field("dialect", &self.dialect)
            .field("database_name", &self.database_name)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("timezone", &self.timezone)
            .field("max_idle_conns", &self.max_idle_conns)
            .field("max_open_conns", &self.max_open_conns)
            .field("conn_max_lifetime", &self.conn_max_lifetime)
            .field("conn_max_idle_time", &self.conn_max_idle_time)
            .field("log_level", &self.log_level)
            .field("retry", &self.retry)
            .finish()
    }
}
