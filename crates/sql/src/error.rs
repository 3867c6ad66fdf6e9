use std::sync::Arc;

use poolkit_core::AppError;
use thiserror::Error;

/// Error returned by a driver while opening a pool.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Everything that can go wrong while describing or opening a database target.
///
/// Cloneable so that callers waiting on the same failed connect all receive it.
#[derive(Debug, Clone, Error)]
pub enum ConnectionError {
    /// One or more mandatory options were not supplied. Lists all of them.
    #[error("missing mandatory options: {}", .0.join(", "))]
    MissingOptions(Vec<&'static str>),

    #[error("unsupported dialect: {0}")]
    UnsupportedDialect(String),

    #[error("invalid log level: {0}")]
    InvalidLogLevel(String),

    /// The retry budget was exhausted; `source` is the last failure.
    #[error("could not establish a connection after {attempts} attempts: {source}")]
    Connect {
        attempts: u32,
        #[source]
        source: Arc<dyn std::error::Error + Send + Sync + 'static>,
    },

    /// The backend reported success but handed back a pool that is already closed.
    #[error("database pool unavailable after open")]
    PoolUnavailable,
}

impl From<ConnectionError> for AppError {
    fn from(err: ConnectionError) -> Self {
        match err {
            ConnectionError::MissingOptions(_)
            | ConnectionError::UnsupportedDialect(_)
            | ConnectionError::InvalidLogLevel(_) => AppError::Config(err.to_string()),
            ConnectionError::Connect { .. } | ConnectionError::PoolUnavailable => {
                AppError::Database(err.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_options_lists_every_field() {
        let err = ConnectionError::MissingOptions(vec!["dialect", "database name"]);
        assert_eq!(
            err.to_string(),
            "missing mandatory options: dialect, database name"
        );
    }

    #[test]
    fn converts_into_app_error() {
        let err: AppError = ConnectionError::UnsupportedDialect("oracle".into()).into();
        assert!(matches!(err, AppError::Config(msg) if msg.contains("oracle")));

        let err: AppError = ConnectionError::Connect {
            attempts: 3,
            source: Arc::new(sqlx::Error::PoolTimedOut),
        }
        .into();
        assert!(matches!(err, AppError::Database(msg) if msg.contains("after 3 attempts")));
    }
}
