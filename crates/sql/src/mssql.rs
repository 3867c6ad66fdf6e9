//! SQL Server pools, built on tiberius connections managed by bb8.

use std::sync::Arc;

use bb8::{ManageConnection, Pool, PooledConnection, RunError};
use bb8_tiberius::ConnectionManager;
use parking_lot::RwLock;
use tiberius::Config;

use crate::{error::BoxError, options::PoolSettings};

/// A bb8 pool of SQL Server connections.
///
/// bb8 pools cannot be closed in place, so closing drops the inner pool and
/// every later checkout fails.
#[derive(Clone)]
pub struct MssqlPool {
    inner: Arc<RwLock<Option<Pool<ConnectionManager>>>>,
}

impl MssqlPool {
    /// Verify that one connection can be made, then build the pool with
    /// `settings` applied.
    pub(crate) async fn open(config: &Config, settings: &PoolSettings) -> Result<Self, BoxError> {
        let manager = ConnectionManager::new(config.clone());
        manager.connect().await?;

        // bb8 has no cap on idle connections either; `idle_timeout` reaps them.
        let pool = Pool::builder()
            .max_size(settings.max_open_conns.max(1))
            .idle_timeout(Some(settings.conn_max_idle_time))
            .max_lifetime(Some(settings.conn_max_lifetime))
            .build_unchecked(manager);

        Ok(Self {
            inner: Arc::new(RwLock::new(Some(pool))),
        })
    }

    /// Check out a connection.
    pub async fn get(
        &self,
    ) -> Result<PooledConnection<'static, ConnectionManager>, RunError<bb8_tiberius::Error>> {
        let pool = self.inner.read().clone();
        match pool {
            Some(pool) => pool.get_owned().await,
            None => Err(RunError::TimedOut),
        }
    }

    /// Number of connections currently open, idle or in use.
    pub fn size(&self) -> u32 {
        self.inner
            .read()
            .as_ref()
            .map_or(0, |pool| pool.state().connections)
    }

    pub fn is_closed(&self) -> bool {
        self.inner.read().is_none()
    }

    pub fn close(&self) {
        self.inner.write().take();
    }
}

impl std::fmt::Debug for MssqlPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MssqlPool")
            .field("size", &self.size())
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tiberius::AuthMethod;

    use super::*;

    fn settings() -> PoolSettings {
        PoolSettings {
            max_idle_conns: 1,
            max_open_conns: 2,
            conn_max_lifetime: Duration::from_secs(60),
            conn_max_idle_time: Duration::from_secs(30),
        }
    }

    #[tokio::test]
    async fn unreachable_server_fails_to_open() {
        let mut config = Config::new();
        config.host("127.0.0.1");
        config.port(1);
        config.authentication(AuthMethod::sql_server("sa", ""));
        config.trust_cert();

        assert!(MssqlPool::open(&config, &settings()).await.is_err());
    }
}
