use async_trait::async_trait;
use sqlx::{Database, MySqlPool, PgPool, SqlitePool, pool::PoolOptions};

use crate::{
    dialect::Dialect, dsn::Connector, error::BoxError, mssql::MssqlPool, options::PoolSettings,
};

/// A pool handle returned by a [`Backend`].
#[async_trait]
pub trait PoolHandle: Clone + Send + Sync + 'static {
    fn is_closed(&self) -> bool;

    /// Close every connection of the pool. Idempotent.
    async fn close(&self);
}

/// The library that actually opens database pools.
#[async_trait]
pub trait Backend: Send + Sync + 'static {
    type Pool: PoolHandle;

    /// Whether this backend can open pools for `dialect`.
    fn supports(&self, dialect: Dialect) -> bool;

    /// Open a pool with `settings` applied at creation.
    async fn open(
        &self,
        connector: &Connector,
        settings: &PoolSettings,
    ) -> Result<Self::Pool, BoxError>;
}

/// A pool opened by [`DefaultBackend`].
#[derive(Debug, Clone)]
pub enum DbPool {
    Sqlite(SqlitePool),
    MySql(MySqlPool),
    Postgres(PgPool),
    SqlServer(MssqlPool),
}

impl DbPool {
    pub fn dialect(&self) -> Dialect {
        match self {
            DbPool::Sqlite(_) => Dialect::Sqlite,
            DbPool::MySql(_) => Dialect::MySql,
            DbPool::Postgres(_) => Dialect::Postgres,
            DbPool::SqlServer(_) => Dialect::SqlServer,
        }
    }

    pub fn as_sqlite(&self) -> Option<&SqlitePool> {
        match self {
            DbPool::Sqlite(pool) => Some(pool),
            _ => None,
        }
    }

    pub fn as_mysql(&self) -> Option<&MySqlPool> {
        match self {
            DbPool::MySql(pool) => Some(pool),
            _ => None,
        }
    }

    pub fn as_postgres(&self) -> Option<&PgPool> {
        match self {
            DbPool::Postgres(pool) => Some(pool),
            _ => None,
        }
    }

    pub fn as_sql_server(&self) -> Option<&MssqlPool> {
        match self {
            DbPool::SqlServer(pool) => Some(pool),
            _ => None,
        }
    }

    /// Number of connections currently open, idle or in use.
    pub fn size(&self) -> u32 {
        match self {
            DbPool::Sqlite(pool) => pool.size(),
            DbPool::MySql(pool) => pool.size(),
            DbPool::Postgres(pool) => pool.size(),
            DbPool::SqlServer(pool) => pool.size(),
        }
    }
}

#[async_trait]
impl PoolHandle for DbPool {
    fn is_closed(&self) -> bool {
        match self {
            DbPool::Sqlite(pool) => pool.is_closed(),
            DbPool::MySql(pool) => pool.is_closed(),
            DbPool::Postgres(pool) => pool.is_closed(),
            DbPool::SqlServer(pool) => pool.is_closed(),
        }
    }

    async fn close(&self) {
        match self {
            DbPool::Sqlite(pool) => pool.close().await,
            DbPool::MySql(pool) => pool.close().await,
            DbPool::Postgres(pool) => pool.close().await,
            DbPool::SqlServer(pool) => pool.close(),
        }
    }
}

/// Opens SQLite, MySQL and Postgres pools through sqlx, and SQL Server
/// pools through tiberius and bb8.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultBackend;

#[async_trait]
impl Backend for DefaultBackend {
    type Pool = DbPool;

    fn supports(&self, _: Dialect) -> bool {
        true
    }

    async fn open(
        &self,
        connector: &Connector,
        settings: &PoolSettings,
    ) -> Result<DbPool, BoxError> {
        let pool = match connector {
            Connector::Sqlite(options) => DbPool::Sqlite(
                pool_options(settings)
                    .connect_with(options.clone())
                    .await?,
            ),
            Connector::MySql(options) => DbPool::MySql(
                pool_options(settings)
                    .connect_with(options.clone())
                    .await?,
            ),
            Connector::Postgres(options) => DbPool::Postgres(
                pool_options(settings)
                    .connect_with(options.clone())
                    .await?,
            ),
            Connector::SqlServer(config) => {
                DbPool::SqlServer(MssqlPool::open(config, settings).await?)
            }
        };
        Ok(pool)
    }
}

// sqlx has no cap on idle connections; they are reaped by `idle_timeout`
// instead. `max_idle_conns` only matters to custom backends.
fn pool_options<DB: Database>(settings: &PoolSettings) -> PoolOptions<DB> {
    PoolOptions::new()
        .max_connections(settings.max_open_conns)
        .idle_timeout(settings.conn_max_idle_time)
        .max_lifetime(settings.conn_max_lifetime)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn default_backend_supports_every_dialect() {
        assert!(Dialect::ALL.into_iter().all(|d| DefaultBackend.supports(d)));
    }

    #[test]
    fn pool_options_apply_settings() {
        let settings = PoolSettings {
            max_idle_conns: 2,
            max_open_conns: 7,
            conn_max_lifetime: Duration::from_secs(60),
            conn_max_idle_time: Duration::from_secs(30),
        };

        let options: PoolOptions<sqlx::Sqlite> = pool_options(&settings);
        assert_eq!(options.get_max_connections(), 7);
        assert_eq!(options.get_idle_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(options.get_max_lifetime(), Some(Duration::from_secs(60)));
    }

    #[tokio::test]
    async fn sql_server_open_reports_driver_error() {
        let config = crate::options::DbOptions::new()
            .dialect(Dialect::SqlServer)
            .host("127.0.0.1")
            .port(1)
            .user("sa")
            .database_name("test")
            .build()
            .unwrap();

        let settings = config.pool_settings();
        let err = DefaultBackend
            .open(&Connector::new(&config), &settings)
            .await
            .unwrap_err();
        assert!(!err.to_string().is_empty());
    }
}
