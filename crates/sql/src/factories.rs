//! Shorthands that bind a dialect and its mandatory fields.
//!
//! Caller options are merged over the fixed fields, so they may replace e.g.
//! the host, but the dialect always stays the one the factory is named after.

use crate::{
    connection::Connection,
    dialect::Dialect,
    error::ConnectionError,
    options::{DbConfig, DbOptions},
};

pub fn new_connection(dialect: Dialect, options: DbOptions) -> Result<Connection, ConnectionError> {
    Connection::from_config(bind(dialect, DbOptions::new(), options)?)
}

pub fn sqlite(database_name: &str, options: DbOptions) -> Result<Connection, ConnectionError> {
    let fixed = DbOptions::new().database_name(database_name);
    Connection::from_config(bind(Dialect::Sqlite, fixed, options)?)
}

/// The pool is opened through tiberius and bb8.
pub fn sql_server(
    host: &str,
    database_name: &str,
    user: &str,
    password: &str,
    options: DbOptions,
) -> Result<Connection, ConnectionError> {
    network(Dialect::SqlServer, host, database_name, user, password, options)
}

pub fn mysql(
    host: &str,
    database_name: &str,
    user: &str,
    password: &str,
    options: DbOptions,
) -> Result<Connection, ConnectionError> {
    network(Dialect::MySql, host, database_name, user, password, options)
}

pub fn postgres(
    host: &str,
    database_name: &str,
    user: &str,
    password: &str,
    options: DbOptions,
) -> Result<Connection, ConnectionError> {
    network(Dialect::Postgres, host, database_name, user, password, options)
}

fn network(
    dialect: Dialect,
    host: &str,
    database_name: &str,
    user: &str,
    password: &str,
    options: DbOptions,
) -> Result<Connection, ConnectionError> {
    let fixed = DbOptions::new()
        .host(host)
        .database_name(database_name)
        .user(user)
        .password(password);
    Connection::from_config(bind(dialect, fixed, options)?)
}

fn bind(dialect: Dialect, fixed: DbOptions, options: DbOptions) -> Result<DbConfig, ConnectionError> {
    DbConfig::from_options([fixed, options, DbOptions::new().dialect(dialect)])
}
