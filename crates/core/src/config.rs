use std::str::FromStr;

use serde::Deserialize;

/// Database target settings loaded from environment variables.
///
/// Every field is optional; unset fields fall back to the defaults of the
/// connection layer once the settings are turned into an option set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Settings {
    /// Dialect name (`sqlite3`, `mssql`, `mysql` or `postgres`).
    pub dialect: Option<String>,

    pub database_name: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,

    /// Session timezone, only used by Postgres.
    pub timezone: Option<String>,

    pub max_idle_conns: Option<u32>,
    pub max_open_conns: Option<u32>,
    pub conn_max_lifetime_secs: Option<u64>,
    pub conn_max_idle_time_secs: Option<u64>,

    /// Statement log verbosity (`silent`, `error`, `warn` or `info`).
    pub log_level: Option<String>,

    pub retry_attempts: Option<u32>,
    pub retry_delay_ms: Option<u64>,
}

impl Settings {
    /// Load settings from environment variables (with optional `.env` file).
    pub fn from_env() -> eyre::Result<Self> {
        dotenvy::dotenv().ok();

        let settings = Self {
            dialect: var("DB_DIALECT"),
            database_name: var("DB_NAME"),
            host: var("DB_HOST"),
            port: parsed("DB_PORT")?,
            user: var("DB_USER"),
            password: var("DB_PASSWORD"),
            timezone: var("DB_TIMEZONE"),
            max_idle_conns: parsed("DB_MAX_IDLE_CONNS")?,
            max_open_conns: parsed("DB_MAX_OPEN_CONNS")?,
            conn_max_lifetime_secs: parsed("DB_CONN_MAX_LIFETIME_SECS")?,
            conn_max_idle_time_secs: parsed("DB_CONN_MAX_IDLE_TIME_SECS")?,
            log_level: var("DB_LOG_LEVEL"),
            retry_attempts: parsed("DB_RETRY_ATTEMPTS")?,
            retry_delay_ms: parsed("DB_RETRY_DELAY_MS")?,
        };

        tracing::debug!(
            dialect = ?settings.dialect,
            host = ?settings.host,
            database = ?settings.database_name,
            "Loaded database settings"
        );
        Ok(settings)
    }
}

fn var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.is_empty())
}

fn parsed<T>(key: &str) -> eyre::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match var(key) {
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|e| eyre::eyre!("invalid value for {key}: {e}")),
        None => Ok(None),
    }
}
