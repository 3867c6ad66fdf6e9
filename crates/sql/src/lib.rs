//! Typed database targets and lazily opened, shared connection pools.
//!
//! Describe a target with [`DbOptions`], hand it to [`Connection::new`] (or one
//! of the [`factories`]) and call [`Connection::get_connection`] wherever a
//! pool is needed. The first call opens the pool, retrying a few times;
//! every later call returns the same pool.

pub mod backend;
pub mod connection;
pub mod dialect;
pub mod dsn;
pub mod error;
pub mod factories;
pub mod mssql;
pub mod options;
pub mod pagination;

pub use backend::{Backend, DbPool, DefaultBackend, PoolHandle};
pub use connection::{Connection, retry_connection};
pub use dialect::{Dialect, DialectInfo};
pub use dsn::{Connector, dsn};
pub use error::{BoxError, ConnectionError};
pub use mssql::MssqlPool;
pub use options::{DbConfig, DbOptions, LogLevel, PoolSettings, RetryPolicy};
pub use pagination::{Page, paginate};
