use std::{
    future::Future,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use tokio::sync::{Mutex, OnceCell};

use crate::{
    backend::{Backend, DefaultBackend, PoolHandle},
    dsn::Connector,
    error::{BoxError, ConnectionError},
    options::{DbConfig, DbOptions, RetryPolicy},
};

/// A database target whose pool is opened on first use.
///
/// The pool is created at most once per `Connection`, even when several tasks
/// ask for it at the same time; every caller then shares that pool.
///
/// Callers that arrive while an attempt is running wait for it and share its
/// outcome, failure included. A failed attempt leaves the handle unconnected,
/// so a call made after it has finished starts a fresh one.
pub struct Connection<B: Backend = DefaultBackend> {
    config: DbConfig,
    connector: Connector,
    backend: B,
    pool: OnceCell<B::Pool>,
    failed_attempts: AtomicU64,
    last_error: Mutex<Option<ConnectionError>>,
}

impl Connection<DefaultBackend> {
    /// Validate `options` and prepare a connection backed by sqlx.
    pub fn new(options: DbOptions) -> Result<Self, ConnectionError> {
        Self::from_config(options.build()?)
    }

    pub fn from_config(config: DbConfig) -> Result<Self, ConnectionError> {
        Self::with_backend(config, DefaultBackend)
    }
}

impl<B: Backend> Connection<B> {
    /// Prepare a connection that opens its pool through `backend`.
    pub fn with_backend(config: DbConfig, backend: B) -> Result<Self, ConnectionError> {
        let dialect = config.dialect();
        if !backend.supports(dialect) {
            return Err(ConnectionError::UnsupportedDialect(dialect.to_string()));
        }

        Ok(Self {
            connector: Connector::new(&config),
            config,
            backend,
            pool: OnceCell::new(),
            failed_attempts: AtomicU64::new(0),
            last_error: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &DbConfig {
        &self.config
    }

    pub fn connector(&self) -> &Connector {
        &self.connector
    }

    /// Whether the pool has been opened.
    pub fn is_connected(&self) -> bool {
        self.pool.initialized()
    }

    /// Return the shared pool, opening it first if needed.
    pub async fn get_connection(&self) -> Result<&B::Pool, ConnectionError> {
        if let Some(pool) = self.pool.get() {
            return Ok(pool);
        }

        let seen = self.failed_attempts.load(Ordering::Acquire);
        let mut last_error = self.last_error.lock().await;

        if let Some(pool) = self.pool.get() {
            return Ok(pool);
        }
        // An attempt failed while we were waiting for it.
        if self.failed_attempts.load(Ordering::Acquire) != seen {
            if let Some(err) = last_error.as_ref() {
                return Err(err.clone());
            }
        }

        match self.connect().await {
            Ok(pool) => {
                *last_error = None;
                Ok(self.pool.get_or_init(move || async move { pool }).await)
            }
            Err(err) => {
                *last_error = Some(err.clone());
                self.failed_attempts.fetch_add(1, Ordering::Release);
                Err(err)
            }
        }
    }

    /// Close the pool if it was opened. The handle stays connected to the
    /// closed pool; it is never reopened.
    pub async fn close(&self) {
        if let Some(pool) = self.pool.get() {
            pool.close().await;
            tracing::info!(dialect = %self.config.dialect(), "Database pool closed");
        }
    }

    async fn connect(&self) -> Result<B::Pool, ConnectionError> {
        let settings = self.config.pool_settings();

        let pool = retry_connection(self.config.retry(), || {
            self.backend.open(&self.connector, &settings)
        })
        .await?;

        if pool.is_closed() {
            return Err(ConnectionError::PoolUnavailable);
        }

        tracing::info!(
            dialect = %self.config.dialect(),
            database = self.config.database_name(),
            max_open = settings.max_open_conns,
            "Database pool ready"
        );
        Ok(pool)
    }
}

impl<B: Backend> std::fmt::Debug for Connection<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("config", &self.config)
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

/// Call `connect` until it succeeds or `policy.attempts` calls have failed,
/// sleeping `policy.delay` between attempts. A budget of zero still makes
/// one attempt.
pub async fn retry_connection<T, E, F, Fut>(
    policy: RetryPolicy,
    mut connect: F,
) -> Result<T, ConnectionError>
where
    E: Into<BoxError>,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;

    loop {
        match connect().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt >= attempts => {
                let source: BoxError = e.into();
                return Err(ConnectionError::Connect {
                    attempts,
                    source: Arc::from(source),
                });
            }
            Err(e) => {
                let e: BoxError = e.into();
                tracing::warn!(
                    attempt,
                    attempts,
                    delay = ?policy.delay,
                    error = %e,
                    "Connection attempt failed, retrying"
                );
                tokio::time::sleep(policy.delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            Arc, Mutex,
            atomic::{AtomicBool, AtomicU32, Ordering},
        },
        time::Duration,
    };

    use async_trait::async_trait;

    use super::*;
    use crate::{
        dialect::Dialect,
        options::{DbOptions, PoolSettings},
    };

    #[derive(Debug, Clone)]
    struct MockPool {
        id: u32,
        closed: Arc<AtomicBool>,
    }

    #[async_trait]
    impl PoolHandle for MockPool {
        fn is_closed(&self) -> bool {
            self.closed.load(Ordering::SeqCst)
        }

        async fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct MockBackend {
        calls: AtomicU32,
        failures: u32,
        hand_out_closed: bool,
        open_delay: Duration,
        settings: Mutex<Vec<PoolSettings>>,
    }

    #[async_trait]
    impl Backend for MockBackend {
        type Pool = MockPool;

        fn supports(&self, _: Dialect) -> bool {
            true
        }

        async fn open(
            &self,
            _: &Connector,
            settings: &PoolSettings,
        ) -> Result<MockPool, BoxError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::time::sleep(self.open_delay).await;

            if call <= self.failures {
                return Err(sqlx::Error::PoolTimedOut.into());
            }

            self.settings.lock().unwrap().push(*settings);
            Ok(MockPool {
                id: call,
                closed: Arc::new(AtomicBool::new(self.hand_out_closed)),
            })
        }
    }

    fn config() -> DbConfig {
        DbOptions::new()
            .dialect(Dialect::Postgres)
            .host("localhost")
            .user("user")
            .password("password")
            .database_name("test")
            .max_idle_conns(1)
            .max_open_conns(4)
            .conn_max_lifetime(Duration::from_secs(20 * 60))
            .conn_max_idle_time(Duration::from_secs(10 * 60))
            .build()
            .unwrap()
    }

    fn policy() -> RetryPolicy {
        RetryPolicy {
            attempts: 3,
            delay: Duration::from_secs(2),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retry_succeeds_after_failures() {
        let calls = AtomicU32::new(0);

        let value = retry_connection(policy(), || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(sqlx::Error::PoolTimedOut)
            } else {
                Ok("pool")
            }
        })
        .await
        .unwrap();

        assert_eq!(value, "pool");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_gives_up_after_budget() {
        let calls = AtomicU32::new(0);
        let started = tokio::time::Instant::now();

        let err = retry_connection(policy(), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(sqlx::Error::PoolTimedOut)
        })
        .await
        .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match err {
            ConnectionError::Connect { attempts, source } => {
                assert_eq!(attempts, 3);
                assert!(matches!(
                    source.downcast_ref::<sqlx::Error>(),
                    Some(sqlx::Error::PoolTimedOut)
                ));
            }
            other => panic!("unexpected error {other:?}"),
        }
        // Two waits between three attempts.
        assert_eq!(started.elapsed(), Duration::from_secs(4));
    }

    #[tokio::test]
    async fn retry_does_not_wait_on_success() {
        let value = retry_connection(
            RetryPolicy {
                attempts: 0,
                delay: Duration::from_secs(3600),
            },
            || async { Ok::<_, sqlx::Error>(7) },
        )
        .await
        .unwrap();

        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn get_connection_memoizes() {
        let conn = Connection::with_backend(config(), MockBackend::default()).unwrap();
        assert!(!conn.is_connected());

        let first = conn.get_connection().await.unwrap().id;
        let second = conn.get_connection().await.unwrap().id;

        assert_eq!(first, second);
        assert!(conn.is_connected());
        assert_eq!(conn.backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn pool_settings_applied_once() {
        let conn = Connection::with_backend(config(), MockBackend::default()).unwrap();
        conn.get_connection().await.unwrap();
        conn.get_connection().await.unwrap();

        let applied = conn.backend.settings.lock().unwrap().clone();
        assert_eq!(
            applied,
            [PoolSettings {
                max_idle_conns: 1,
                max_open_conns: 4,
                conn_max_lifetime: Duration::from_secs(20 * 60),
                conn_max_idle_time: Duration::from_secs(10 * 60),
            }]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_callers_share_one_open() {
        let backend = MockBackend {
            open_delay: Duration::from_millis(50),
            ..MockBackend::default()
        };
        let conn = Arc::new(Connection::with_backend(config(), backend).unwrap());

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let conn = Arc::clone(&conn);
                tokio::spawn(async move { conn.get_connection().await.map(|pool| pool.id) })
            })
            .collect();

        let mut ids = Vec::new();
        for task in tasks {
            ids.push(task.await.unwrap().unwrap());
        }

        assert_eq!(conn.backend.calls.load(Ordering::SeqCst), 1);
        assert!(ids.iter().all(|&id| id == ids[0]));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_connect_is_not_memoized() {
        let backend = MockBackend {
            failures: 3,
            ..MockBackend::default()
        };
        let conn = Connection::with_backend(config(), backend).unwrap();

        let err = conn.get_connection().await.unwrap_err();
        assert!(matches!(err, ConnectionError::Connect { attempts: 3, .. }));
        assert!(!conn.is_connected());

        // The budget is spent again on the next call, which now succeeds.
        let pool = conn.get_connection().await.unwrap();
        assert_eq!(pool.id, 4);
        assert_eq!(conn.backend.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_callers_share_one_failed_attempt() {
        let backend = MockBackend {
            failures: u32::MAX,
            ..MockBackend::default()
        };
        let conn = Arc::new(Connection::with_backend(config(), backend).unwrap());
        let started = tokio::time::Instant::now();

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let conn = Arc::clone(&conn);
                tokio::spawn(async move { conn.get_connection().await.map(|pool| pool.id) })
            })
            .collect();

        for task in tasks {
            let err = task.await.unwrap().unwrap_err();
            assert!(matches!(err, ConnectionError::Connect { attempts: 3, .. }));
        }

        // One retry budget for all eight callers.
        assert_eq!(conn.backend.calls.load(Ordering::SeqCst), 3);
        assert_eq!(started.elapsed(), Duration::from_secs(4));
        assert!(!conn.is_connected());

        // A call made afterwards starts over.
        conn.get_connection().await.unwrap_err();
        assert_eq!(conn.backend.calls.load(Ordering::SeqCst), 6);
    }

    #[tokio::test]
    async fn closed_pool_is_reported() {
        let backend = MockBackend {
            hand_out_closed: true,
            ..MockBackend::default()
        };
        let conn = Connection::with_backend(config(), backend).unwrap();

        let err = conn.get_connection().await.unwrap_err();
        assert!(matches!(err, ConnectionError::PoolUnavailable));
        assert!(!conn.is_connected());
        assert_eq!(conn.backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn close_keeps_the_same_pool() {
        let conn = Connection::with_backend(config(), MockBackend::default()).unwrap();
        conn.close().await;

        let pool = conn.get_connection().await.unwrap().clone();
        conn.close().await;

        assert!(pool.is_closed());
        assert_eq!(conn.get_connection().await.unwrap().id, pool.id);
        assert_eq!(conn.backend.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn default_backend_accepts_sql_server() {
        let config = DbOptions::new()
            .dialect(Dialect::SqlServer)
            .host("localhost")
            .user("sa")
            .database_name("test")
            .build()
            .unwrap();

        let conn = Connection::from_config(config).unwrap();
        assert!(matches!(conn.connector(), Connector::SqlServer(_)));
        assert!(!conn.is_connected());
    }

    struct NoSqlServer;

    #[async_trait]
    impl Backend for NoSqlServer {
        type Pool = MockPool;

        fn supports(&self, dialect: Dialect) -> bool {
            dialect != Dialect::SqlServer
        }

        async fn open(&self, _: &Connector, _: &PoolSettings) -> Result<MockPool, BoxError> {
            Err("unreachable".into())
        }
    }

    #[test]
    fn unsupported_dialect_fails_construction() {
        let config = DbOptions::new()
            .dialect(Dialect::SqlServer)
            .host("localhost")
            .user("sa")
            .database_name("test")
            .build()
            .unwrap();

        let err = Connection::with_backend(config, NoSqlServer).unwrap_err();
        assert!(matches!(err, ConnectionError::UnsupportedDialect(name) if name == "mssql"));
    }

    #[test]
    fn missing_options_fail_construction() {
        let err = Connection::new(DbOptions::new()).unwrap_err();
        assert!(matches!(err, ConnectionError::MissingOptions(_)));
    }
}
