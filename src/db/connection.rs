//! Connection Manager
//!
//! Owns the single backing-store handle. The handle is opened lazily, retried
//! with a fixed backoff, and pinged before every guarded call.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::context::OpContext;
use crate::db::backend::{Connector, Handle};
use crate::db::memory::{MemoryConnector, MemoryServer, MEMORY_SCHEME};
use crate::db::mongo::{is_mongo_uri, MongoConnector};
use crate::error::{Result, StoreError};

// == Settings ==
/// Retry and timeout tuning for the connection manager.
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    pub uri: Option<String>,
    /// Attempts per acquire, at least 1
    pub max_retries: u32,
    pub backoff: Duration,
    /// Bound on each attempt and on each store call
    pub timeout: Duration,
}

impl ConnectionSettings {
    /// Builds settings from the service configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            uri: config.connection_uri()?,
            max_retries: config.max_retries.max(1),
            backoff: config.retry_backoff(),
            timeout: config.connect_timeout(),
        })
    }

    /// Connector matching the URI scheme.
    ///
    /// `mongodb://` and `mongodb+srv://` go to the MongoDB driver; no URI or a
    /// `memory://` URI gets a fresh in-process store.
    pub fn connector(&self) -> Result<Arc<dyn Connector>> {
        match self.uri.as_deref() {
            Some(uri) if is_mongo_uri(uri) => {
                info!("Using MongoDB backing store");
                Ok(Arc::new(MongoConnector::new(self.timeout)))
            }
            None => {
                info!("Using in-process backing store");
                Ok(Arc::new(MemoryConnector::new(MemoryServer::new())))
            }
            Some(uri) if uri.starts_with(MEMORY_SCHEME) => {
                info!("Using in-process backing store");
                Ok(Arc::new(MemoryConnector::new(MemoryServer::new())))
            }
            Some(uri) => Err(StoreError::Config(format!(
                "unsupported connection URI scheme: {}",
                uri.split("://").next().unwrap_or(uri)
            ))),
        }
    }
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            uri: None,
            max_retries: 3,
            backoff: Duration::from_millis(200),
            timeout: Duration::from_millis(2000),
        }
    }
}

// == Health ==
/// Result of [`ConnectionManager::health_check`].
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct HealthReport {
    pub ok: bool,
    pub round_trip_ms: Option<f64>,
    pub error: Option<String>,
}

// == State ==
#[derive(Default)]
struct ConnectionState {
    handle: Option<Handle>,
    /// Bumped every time a new handle is installed
    generation: u64,
    last_error: Option<String>,
    /// Outcome of the most recent exhausted retry sequence
    last_failure: Option<StoreError>,
}

// == Connection Manager ==
/// Produces a live handle to the backing store.
///
/// Reconnection is single-flight: the state mutex is held for the whole retry
/// sequence, so callers arriving during an outage wait for that sequence and
/// reuse its outcome (the new handle, or its `Connection` error) instead of
/// starting their own.
pub struct ConnectionManager {
    connector: Arc<dyn Connector>,
    settings: ConnectionSettings,
    state: Mutex<ConnectionState>,
    /// Completed retry sequences, readable without the state lock
    sequences: AtomicU64,
}

impl ConnectionManager {
    pub fn new(connector: Arc<dyn Connector>, settings: ConnectionSettings) -> Self {
        Self {
            connector,
            settings,
            state: Mutex::new(ConnectionState::default()),
            sequences: AtomicU64::new(0),
        }
    }

    pub fn settings(&self) -> &ConnectionSettings {
        &self.settings
    }

    /// True when a handle is currently held (it may still be stale).
    pub async fn is_connected(&self) -> bool {
        self.state.lock().await.handle.is_some()
    }

    /// Cause of the most recent failed connection or ping.
    pub async fn last_error(&self) -> Option<String> {
        self.state.lock().await.last_error.clone()
    }

    // == Acquire ==
    /// Returns the current handle, connecting first if there is none.
    ///
    /// Makes up to `max_retries` attempts separated by `backoff`; each attempt
    /// connects and pings within `timeout`. Exhaustion yields
    /// `StoreError::Connection` and nothing retries it further.
    pub async fn acquire(&self, ctx: &OpContext) -> Result<Handle> {
        let seen = self.sequences.load(Ordering::SeqCst);
        let mut state = self.state.lock().await;
        if let Some(handle) = &state.handle {
            return Ok(handle.clone());
        }
        // A retry sequence finished while we waited for the lock: share its outcome.
        if self.sequences.load(Ordering::SeqCst) != seen {
            if let Some(err) = &state.last_failure {
                return Err(err.clone());
            }
        }

        let max = self.settings.max_retries.max(1);
        let mut last_cause = String::new();
        for attempt in 1..=max {
            info!("Connecting to backing store (attempt {}/{})", attempt, max);
            match self.try_connect(ctx).await {
                Ok(handle) => {
                    state.generation += 1;
                    state.handle = Some(handle.clone());
                    state.last_error = None;
                    state.last_failure = None;
                    self.sequences.fetch_add(1, Ordering::SeqCst);
                    info!("Backing store connection established and verified");
                    return Ok(handle);
                }
                Err(err @ StoreError::Cancelled(_)) => return Err(err),
                Err(err) => {
                    warn!("Connection attempt {} failed: {}", attempt, err);
                    last_cause = err.to_string();
                    state.last_error = Some(last_cause.clone());
                }
            }
            if attempt < max {
                ctx.sleep("connect backoff", self.settings.backoff).await?;
            }
        }

        let err = StoreError::Connection {
            attempts: max,
            cause: last_cause,
        };
        state.last_failure = Some(err.clone());
        self.sequences.fetch_add(1, Ordering::SeqCst);
        Err(err)
    }

    /// One bounded connect-and-ping attempt.
    async fn try_connect(&self, ctx: &OpContext) -> Result<Handle> {
        let uri = self.settings.uri.as_deref();
        ctx.bound("connect", self.settings.timeout, async {
            let handle = self.connector.connect(uri).await?;
            handle.ping().await?;
            Ok(handle)
        })
        .await
    }

    // == Guarded Call ==
    /// Runs `op` against a handle verified live just beforehand.
    ///
    /// A failed ping discards the handle and reconnects before `op` runs;
    /// `op` itself is not retried. `op` is bounded by the call timeout.
    pub async fn guarded_call<T, F, Fut>(&self, ctx: &OpContext, op: F) -> Result<T>
    where
        F: FnOnce(Handle) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let handle = self.live_handle(ctx).await?;
        ctx.bound("store call", self.settings.timeout, op(handle))
            .await
    }

    async fn live_handle(&self, ctx: &OpContext) -> Result<Handle> {
        let current = {
            let state = self.state.lock().await;
            let lease = state.handle.clone().map(|handle| (state.generation, handle));
            lease
        };

        if let Some((generation, handle)) = current {
            let ping = ctx
                .bound("ping", self.settings.timeout, handle.ping())
                .await;
            match ping {
                Ok(()) => return Ok(handle),
                Err(err @ StoreError::Cancelled(_)) => return Err(err),
                Err(err) => {
                    warn!("Liveness ping failed, reconnecting: {}", err);
                    self.discard(generation, err.to_string()).await;
                }
            }
        }

        self.acquire(ctx).await
    }

    /// Drops the handle if it is still the one from `generation`.
    async fn discard(&self, generation: u64, cause: String) {
        let mut state = self.state.lock().await;
        if state.generation == generation && state.handle.is_some() {
            state.handle = None;
            state.last_error = Some(cause);
        } else {
            debug!("Stale handle already replaced by another caller");
        }
    }

    // == Health Check ==
    /// Read-only connectivity diagnostic.
    ///
    /// Failures leave the connection state untouched. When no handle is held a
    /// single unretried attempt is made and its handle kept only on success.
    pub async fn health_check(&self, ctx: &OpContext) -> HealthReport {
        let started = Instant::now();
        // A reconnect in progress holds the lock; do not wait past the timeout.
        let current = ctx
            .bound("health check", self.settings.timeout, async {
                Ok(self.state.lock().await.handle.clone())
            })
            .await;

        let outcome = match current {
            Err(err) => Err(err),
            Ok(Some(handle)) => {
                ctx.bound("ping", self.settings.timeout, handle.ping())
                    .await
            }
            Ok(None) => match self.try_connect(ctx).await {
                Ok(handle) => {
                    let mut state = self.state.lock().await;
                    if state.handle.is_none() {
                        state.generation += 1;
                        state.handle = Some(handle);
                        state.last_error = None;
                    }
                    Ok(())
                }
                Err(err) => Err(err),
            },
        };

        match outcome {
            Ok(()) => HealthReport {
                ok: true,
                round_trip_ms: Some(started.elapsed().as_secs_f64() * 1000.0),
                error: None,
            },
            Err(err) => HealthReport {
                ok: false,
                round_trip_ms: None,
                error: Some(err.to_string()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(server: &Arc<MemoryServer>, retries: u32, backoff_ms: u64) -> ConnectionManager {
        ConnectionManager::new(
            Arc::new(MemoryConnector::new(server.clone())),
            ConnectionSettings {
                uri: None,
                max_retries: retries,
                backoff: Duration::from_millis(backoff_ms),
                timeout: Duration::from_millis(500),
            },
        )
    }

    #[tokio::test]
    async fn test_acquire_is_lazy_and_idempotent() {
        let server = MemoryServer::new();
        let conn = manager(&server, 3, 10);
        assert!(!conn.is_connected().await);
        assert_eq!(server.connect_attempts(), 0);

        let ctx = OpContext::background();
        conn.acquire(&ctx).await.unwrap();
        conn.acquire(&ctx).await.unwrap();

        assert!(conn.is_connected().await);
        assert_eq!(server.connect_attempts(), 1);
    }

    #[tokio::test]
    async fn test_acquire_exhausts_retries_with_backoff() {
        let server = MemoryServer::new();
        server.set_available(false);
        let conn = manager(&server, 3, 50);

        let result = conn.acquire(&OpContext::background()).await;
        match result {
            Err(StoreError::Connection { attempts, cause }) => {
                assert_eq!(attempts, 3);
                assert!(cause.contains("unavailable"));
            }
            other => panic!("expected connection error, got {:?}", other.map(|_| ())),
        }

        let times = server.connect_times();
        assert_eq!(times.len(), 3);
        for pair in times.windows(2) {
            assert!(pair[1].duration_since(pair[0]) >= Duration::from_millis(50));
        }
        assert!(conn.last_error().await.is_some());
    }

    #[tokio::test]
    async fn test_acquire_recovers_midway() {
        let server = MemoryServer::new();
        server.set_available(false);
        let conn = Arc::new(manager(&server, 5, 40));

        let flip = server.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(60)).await;
            flip.set_available(true);
        });

        conn.acquire(&OpContext::background()).await.unwrap();
        let attempts = server.connect_attempts();
        assert!(attempts >= 2 && attempts <= 5, "attempts = {}", attempts);
        assert!(conn.last_error().await.is_none());
    }

    #[tokio::test]
    async fn test_guarded_call_replaces_stale_handle() {
        let server = MemoryServer::new();
        let conn = manager(&server, 3, 10);
        let ctx = OpContext::background();

        conn.acquire(&ctx).await.unwrap();
        server.restart();

        let pinged = conn
            .guarded_call(&ctx, |handle| async move { handle.ping().await })
            .await;
        assert!(pinged.is_ok());
        assert_eq!(server.connect_attempts(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_retry_sequence() {
        let server = MemoryServer::new();
        server.set_available(false);
        let conn = Arc::new(manager(&server, 2, 30));

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let conn = conn.clone();
            tasks.push(tokio::spawn(async move {
                conn.acquire(&OpContext::background()).await.is_err()
            }));
        }
        for task in tasks {
            assert!(task.await.unwrap());
        }

        // Callers queued behind the first retry sequence reuse its failure.
        assert_eq!(server.connect_attempts(), 2);
    }

    #[tokio::test]
    async fn test_waiters_reuse_handle_after_recovery() {
        let server = MemoryServer::new();
        server.set_latency(Duration::from_millis(30));
        let conn = Arc::new(manager(&server, 3, 10));

        let mut tasks = Vec::new();
        for _ in 0..6 {
            let conn = conn.clone();
            tasks.push(tokio::spawn(async move {
                conn.acquire(&OpContext::background()).await.is_ok()
            }));
        }
        for task in tasks {
            assert!(task.await.unwrap());
        }
        assert_eq!(server.connect_attempts(), 1);
    }

    #[tokio::test]
    async fn test_health_check_does_not_mutate_on_failure() {
        let server = MemoryServer::new();
        let conn = manager(&server, 3, 10);
        let ctx = OpContext::background();
        conn.acquire(&ctx).await.unwrap();

        server.set_available(false);
        let report = conn.health_check(&ctx).await;
        assert!(!report.ok);
        assert!(report.round_trip_ms.is_none());
        assert!(report.error.is_some());

        // Handle kept and no error recorded.
        assert!(conn.is_connected().await);
        assert!(conn.last_error().await.is_none());
        assert_eq!(server.connect_attempts(), 1);
    }

    #[tokio::test]
    async fn test_health_check_without_handle_single_attempt() {
        let server = MemoryServer::new();
        server.set_available(false);
        let conn = manager(&server, 3, 10);

        let report = conn.health_check(&OpContext::background()).await;
        assert!(!report.ok);
        assert_eq!(server.connect_attempts(), 1);
        assert!(!conn.is_connected().await);

        server.set_available(true);
        let report = conn.health_check(&OpContext::background()).await;
        assert!(report.ok);
        assert!(report.round_trip_ms.is_some());
        assert!(conn.is_connected().await);
    }

    #[tokio::test]
    async fn test_cancel_during_backoff() {
        let server = MemoryServer::new();
        server.set_available(false);
        let conn = manager(&server, 5, 5_000);

        let ctx = OpContext::background();
        let token = ctx.token().clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            token.cancel();
        });

        let started = Instant::now();
        let result = conn.acquire(&ctx).await;
        assert!(matches!(result, Err(StoreError::Cancelled(_))));
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(server.connect_attempts(), 1);
    }

    fn settings_for(uri: Option<&str>) -> ConnectionSettings {
        ConnectionSettings {
            uri: uri.map(str::to_string),
            ..ConnectionSettings::default()
        }
    }

    #[tokio::test]
    async fn test_connector_selected_by_scheme() {
        for uri in [None, Some("memory://local")] {
            let settings = settings_for(uri);
            let connector = settings.connector().unwrap();
            let handle = connector.connect(settings.uri.as_deref()).await.unwrap();
            handle.ping().await.unwrap();
        }

        // The driver connector is chosen; it refuses anything but a mongo URI.
        let mongo = settings_for(Some("mongodb://localhost:27017/geo"))
            .connector()
            .unwrap();
        assert!(matches!(
            mongo.connect(Some("memory://")).await,
            Err(StoreError::Config(_))
        ));
        assert!(settings_for(Some("mongodb+srv://u:p@cluster0.example.net/"))
            .connector()
            .is_ok());
    }

    #[test]
    fn test_unknown_scheme_is_config_error() {
        let result = settings_for(Some("redis://localhost")).connector();
        match result {
            Err(StoreError::Config(msg)) => assert!(msg.contains("redis")),
            _ => panic!("expected config error"),
        }
    }

    #[tokio::test]
    async fn test_slow_connect_hits_timeout() {
        let server = MemoryServer::new();
        server.set_latency(Duration::from_millis(300));
        let conn = ConnectionManager::new(
            Arc::new(MemoryConnector::new(server.clone())),
            ConnectionSettings {
                uri: None,
                max_retries: 2,
                backoff: Duration::from_millis(10),
                timeout: Duration::from_millis(50),
            },
        );

        match conn.acquire(&OpContext::background()).await {
            Err(StoreError::Connection { attempts, cause }) => {
                assert_eq!(attempts, 2);
                assert!(cause.contains("Timed out"));
            }
            other => panic!("expected connection error, got {:?}", other.map(|_| ())),
        }
    }
}
