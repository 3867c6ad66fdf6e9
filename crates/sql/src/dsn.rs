//! Maps a validated [`DbConfig`] to the dialect's connection string and to
//! the typed connect options the driver opens pools from.

use sqlx::{
    ConnectOptions,
    mysql::MySqlConnectOptions,
    postgres::{PgConnectOptions, PgSslMode},
    sqlite::SqliteConnectOptions,
};
use tiberius::{AuthMethod, Config};
use url::form_urlencoded;

use crate::{
    dialect::Dialect,
    options::{DbConfig, SLOW_STATEMENT_THRESHOLD},
};

/// Render the connection string for `config`.
///
/// Only the SQL Server password is percent-escaped, since that DSN is a URL;
/// the MySQL and Postgres templates interpolate it verbatim.
pub fn dsn(config: &DbConfig) -> String {
    match config.dialect() {
        Dialect::Sqlite => format!("{}.db", config.database_name()),
        Dialect::SqlServer => {
            let password: String =
                form_urlencoded::byte_serialize(config.password().as_bytes()).collect();
            format!(
                "sqlserver://{}:{}@{}:{}?database={}",
                config.user(),
                password,
                config.host(),
                config.port(),
                config.database_name()
            )
        }
        Dialect::MySql => format!(
            "{}:{}@tcp({}:{})/{}?charset=utf8mb4&parseTime=True&loc=Local",
            config.user(),
            config.password(),
            config.host(),
            config.port(),
            config.database_name()
        ),
        Dialect::Postgres => format!(
            "host={} user={} password={} dbname={} port={} sslmode=disable TimeZone={}",
            config.host(),
            config.user(),
            config.password(),
            config.database_name(),
            config.port(),
            config.timezone()
        ),
    }
}

/// Dialect-specific handle a backend opens a pool from.
#[derive(Debug, Clone)]
pub enum Connector {
    Sqlite(SqliteConnectOptions),
    MySql(MySqlConnectOptions),
    Postgres(PgConnectOptions),
    SqlServer(Config),
}

impl Connector {
    pub fn new(config: &DbConfig) -> Self {
        let level = config.log_level();

        match config.dialect() {
            Dialect::Sqlite => Connector::Sqlite(
                SqliteConnectOptions::new()
                    .filename(dsn(config))
                    .create_if_missing(true)
                    .log_statements(level.statements())
                    .log_slow_statements(level.slow_statements(), SLOW_STATEMENT_THRESHOLD),
            ),
            Dialect::MySql => Connector::MySql(
                MySqlConnectOptions::new()
                    .host(config.host())
                    .port(config.port())
                    .username(config.user())
                    .password(config.password())
                    .database(config.database_name())
                    .charset("utf8mb4")
                    .log_statements(level.statements())
                    .log_slow_statements(level.slow_statements(), SLOW_STATEMENT_THRESHOLD),
            ),
            Dialect::Postgres => Connector::Postgres(
                PgConnectOptions::new()
                    .host(config.host())
                    .port(config.port())
                    .username(config.user())
                    .password(config.password())
                    .database(config.database_name())
                    .ssl_mode(PgSslMode::Disable)
                    .options([("TimeZone", config.timezone())])
                    .log_statements(level.statements())
                    .log_slow_statements(level.slow_statements(), SLOW_STATEMENT_THRESHOLD),
            ),
            Dialect::SqlServer => Connector::SqlServer(sql_server_config(config)),
        }
    }

    pub fn dialect(&self) -> Dialect {
        match self {
            Connector::Sqlite(_) => Dialect::Sqlite,
            Connector::MySql(_) => Dialect::MySql,
            Connector::Postgres(_) => Dialect::Postgres,
            Connector::SqlServer(_) => Dialect::SqlServer,
        }
    }
}

// The server certificate is trusted as is, matching the DSN, which sets no
// encryption parameters.
fn sql_server_config(config: &DbConfig) -> Config {
    let mut tds = Config::new();
    tds.host(config.host());
    tds.port(config.port());
    tds.database(config.database_name());
    tds.authentication(AuthMethod::sql_server(config.user(), config.password()));
    tds.trust_cert();
    tds
}
