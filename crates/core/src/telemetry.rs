use eyre::{Result, WrapErr};
use tracing_subscriber::{EnvFilter, fmt};

use crate::config::Settings;

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins when set. Otherwise everything logs at `info` and the
/// driver's statement logs, which arrive through the `log` facade under the
/// `sqlx` target, follow `DB_LOG_LEVEL`. Fails if a subscriber is already
/// installed or the level is not a valid filter.
pub fn init(settings: &Settings) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_directives(settings))
            .wrap_err("invalid DB_LOG_LEVEL")?,
    };

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(|e| eyre::eyre!("failed to install tracing subscriber: {e}"))
}

fn default_directives(settings: &Settings) -> String {
    let sqlx = match settings.log_level.as_deref().map(str::to_ascii_lowercase) {
        None => "info".to_owned(),
        Some(level) if level == "silent" => "off".to_owned(),
        Some(level) => level,
    };
    format!("info,sqlx={sqlx}")
}
