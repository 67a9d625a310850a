//! Resilient Connection Manager
//!
//! `ConnectionManager` owns at most one live backend handle, lazily acquired
//! on first use. Queries run through a retry loop that backs off exponentially
//! on transient failures, a keepalive task probes the handle when it sits
//! idle, and `cleanup` tears everything down so a later query starts fresh.
//!
//! The manager is a cheap-clone wrapper over shared state; every clone
//! observes the same handle, health, and statistics.

pub mod health;
mod keepalive;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Instant as StdInstant;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::backend::{BackendError, BackendHandle, QueryBackend, Row, SqlValue};
use crate::config::ManagerConfig;
use crate::error::{ConnectionError, ManagerError, QueryError};

pub use health::{HealthSnapshot, HealthStatus, QueryStats};

/// Resilient single-handle connection manager.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<ManagerInner>,
}

pub(crate) struct ManagerInner {
    backend: Arc<dyn QueryBackend>,
    database_url: String,
    config: ManagerConfig,
    state: StdMutex<ManagerState>,
    // Serializes handle acquisition; waiters reuse the fresh handle.
    init_lock: AsyncMutex<()>,
    keepalive: StdMutex<Option<JoinHandle<()>>>,
    total_queries: AtomicU64,
    total_failures: AtomicU64,
    total_probes: AtomicU64,
    created_at: StdInstant,
}

struct ManagerState {
    handle: Option<Arc<dyn BackendHandle>>,
    is_active: bool,
    consecutive_errors: u32,
    last_activity: Option<Instant>,
    last_activity_at: Option<DateTime<Utc>>,
    // Bumped by every finished acquisition so waiters can tell whether one
    // completed while they were queued on the init lock.
    init_epoch: u64,
    last_init_error: Option<BackendError>,
}

impl ManagerState {
    fn touch(&mut self) {
        self.last_activity = Some(Instant::now());
        self.last_activity_at = Some(Utc::now());
    }

    fn mark_success(&mut self) {
        self.is_active = true;
        self.consecutive_errors = 0;
        self.touch();
    }

    fn mark_failure(&mut self) {
        self.consecutive_errors += 1;
    }

    fn deactivate(&mut self) -> Option<Arc<dyn BackendHandle>> {
        self.is_active = false;
        self.handle.take()
    }
}

impl ConnectionManager {
    /// Create a manager over the given backend. No handle is acquired until
    /// the first query.
    pub fn new(
        backend: Arc<dyn QueryBackend>,
        database_url: impl Into<String>,
        config: ManagerConfig,
    ) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                backend,
                database_url: database_url.into(),
                config,
                state: StdMutex::new(ManagerState {
                    handle: None,
                    is_active: false,
                    consecutive_errors: 0,
                    last_activity: None,
                    last_activity_at: None,
                    init_epoch: 0,
                    last_init_error: None,
                }),
                init_lock: AsyncMutex::new(()),
                keepalive: StdMutex::new(None),
                total_queries: AtomicU64::new(0),
                total_failures: AtomicU64::new(0),
                total_probes: AtomicU64::new(0),
                created_at: StdInstant::now(),
            }),
        }
    }

    /// Create a manager with the default configuration.
    pub fn with_defaults(backend: Arc<dyn QueryBackend>, database_url: impl Into<String>) -> Self {
        Self::new(backend, database_url, ManagerConfig::default())
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.inner.config
    }

    /// Execute a query, retrying transient failures with exponential backoff.
    ///
    /// `text` must be non-empty. A failure that the retry policy absorbed is
    /// invisible to the caller; an exhausted or fatal failure surfaces as a
    /// typed error and deactivates the handle.
    pub async fn query(&self, text: &str, params: &[SqlValue]) -> Result<Vec<Row>, ManagerError> {
        if text.trim().is_empty() {
            return Err(ManagerError::EmptyQuery);
        }

        self.inner.total_queries.fetch_add(1, Ordering::Relaxed);

        let mut attempt: u32 = 0;
        loop {
            let handle = match ManagerInner::ensure_active(&self.inner).await {
                Ok(handle) => handle,
                Err(e) => {
                    self.inner.total_failures.fetch_add(1, Ordering::Relaxed);
                    return Err(ManagerError::Connection(e));
                }
            };

            {
                let mut state = self.inner.lock_state();
                state.touch();
            }

            let result = tokio::time::timeout(
                self.inner.config.query_timeout(),
                handle.fetch_all(text, params),
            )
            .await
            .unwrap_or_else(|_| {
                Err(BackendError::timeout(format!(
                    "attempt exceeded {}ms",
                    self.inner.config.query_timeout_ms
                )))
            });

            match result {
                Ok(rows) => {
                    self.inner.lock_state().mark_success();
                    return Ok(rows);
                }
                Err(err) => {
                    self.inner.lock_state().mark_failure();

                    if err.is_retryable() && attempt < self.inner.config.max_retries {
                        let delay = self.inner.config.retry_delay(attempt);
                        tracing::warn!(
                            "Query attempt {} failed ({}), retrying in {:?}",
                            attempt + 1,
                            err,
                            delay
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                        continue;
                    }

                    let stale = self.inner.lock_state().deactivate();
                    self.inner.total_failures.fetch_add(1, Ordering::Relaxed);
                    tracing::error!(
                        "Query failed after {} attempt(s): {}",
                        attempt + 1,
                        err
                    );

                    // Refresh the handle in the background; the error return
                    // must not wait on a reconnect.
                    let inner = Arc::clone(&self.inner);
                    tokio::spawn(async move {
                        if let Some(old) = stale {
                            old.close().await;
                        }
                        let _ = ManagerInner::ensure_active(&inner).await;
                    });

                    return Err(ManagerError::Query(QueryError {
                        attempts: attempt + 1,
                        retried: attempt > 0,
                        source: err,
                    }));
                }
            }
        }
    }

    /// Point-in-time health snapshot.
    pub fn health(&self) -> HealthSnapshot {
        let state = self.inner.lock_state();
        HealthSnapshot {
            is_active: state.is_active && state.handle.is_some(),
            consecutive_errors: state.consecutive_errors,
            last_activity_at: state.last_activity_at,
        }
    }

    /// Process-lifetime query statistics.
    pub fn stats(&self) -> QueryStats {
        QueryStats {
            total_queries: self.inner.total_queries.load(Ordering::Relaxed),
            total_failures: self.inner.total_failures.load(Ordering::Relaxed),
            total_probes: self.inner.total_probes.load(Ordering::Relaxed),
            created_at: self.inner.created_at,
        }
    }

    /// Stop the keepalive task and release the handle. Idempotent; the next
    /// query re-initializes from scratch.
    pub async fn cleanup(&self) {
        let task = self.inner.lock_keepalive().take();
        if let Some(task) = task {
            task.abort();
        }

        let handle = self.inner.lock_state().deactivate();
        if let Some(handle) = handle {
            handle.close().await;
            tracing::info!("Database handle released");
        }
    }
}

impl ManagerInner {
    fn lock_state(&self) -> std::sync::MutexGuard<'_, ManagerState> {
        // Recover the guard even if a holder panicked.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_keepalive(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        self.keepalive.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Return the live handle, acquiring one if necessary.
    ///
    /// At most one acquisition is in flight; concurrent callers wait and
    /// reuse the handle the winner produced.
    pub(crate) async fn ensure_active(
        inner: &Arc<Self>,
    ) -> Result<Arc<dyn BackendHandle>, ConnectionError> {
        if let Some(handle) = inner.active_handle() {
            return Ok(handle);
        }

        let observed_epoch = inner.lock_state().init_epoch;
        let _guard = inner.init_lock.lock().await;

        // Re-check: another caller may have connected while we waited.
        if let Some(handle) = inner.active_handle() {
            return Ok(handle);
        }

        // An acquisition finished while we were queued and failed; share its
        // outcome instead of dialing again.
        {
            let state = inner.lock_state();
            if state.init_epoch != observed_epoch {
                if let Some(err) = state.last_init_error.clone() {
                    return Err(ConnectionError::new(err));
                }
            }
        }

        let started = StdInstant::now();
        let connected = tokio::time::timeout(
            inner.config.connect_timeout(),
            inner.backend.connect(&inner.database_url, &inner.config),
        )
        .await
        .unwrap_or_else(|_| {
            Err(BackendError::timeout(format!(
                "handle acquisition exceeded {}ms",
                inner.config.connect_timeout_ms
            )))
        });

        match connected {
            Ok(handle) => {
                {
                    let mut state = inner.lock_state();
                    state.handle = Some(Arc::clone(&handle));
                    state.init_epoch += 1;
                    state.last_init_error = None;
                    state.mark_success();
                }
                Self::start_keepalive(inner);
                tracing::info!("Database handle acquired in {:?}", started.elapsed());
                Ok(handle)
            }
            Err(err) => {
                {
                    let mut state = inner.lock_state();
                    state.deactivate();
                    state.init_epoch += 1;
                    state.last_init_error = Some(err.clone());
                    state.mark_failure();
                }
                tracing::error!("Failed to acquire database handle: {}", err);
                Err(ConnectionError::new(err))
            }
        }
    }

    fn active_handle(&self) -> Option<Arc<dyn BackendHandle>> {
        let state = self.lock_state();
        if state.is_active {
            state.handle.clone()
        } else {
            None
        }
    }

    fn start_keepalive(inner: &Arc<Self>) {
        let mut slot = inner.lock_keepalive();
        if slot.is_none() {
            *slot = Some(keepalive::spawn(inner));
        }
    }

    /// One keepalive tick: probe the handle if it has been idle past the
    /// threshold, reconnect if the probe fails.
    pub(crate) async fn keepalive_tick(inner: &Arc<Self>) {
        let (handle, idle) = {
            let state = inner.lock_state();
            let idle = state.last_activity.map(|at| at.elapsed());
            (state.handle.clone(), idle)
        };

        let Some(handle) = handle else {
            let _ = Self::ensure_active(inner).await;
            return;
        };

        match idle {
            Some(idle) if idle < inner.config.inactivity_threshold() => return,
            _ => {}
        }

        inner.total_probes.fetch_add(1, Ordering::Relaxed);
        let probed = tokio::time::timeout(inner.config.query_timeout(), handle.ping())
            .await
            .unwrap_or_else(|_| {
                Err(BackendError::timeout(format!(
                    "probe exceeded {}ms",
                    inner.config.query_timeout_ms
                )))
            });

        match probed {
            Ok(()) => {
                inner.lock_state().mark_success();
                tracing::debug!("Keepalive probe succeeded");
            }
            Err(err) => {
                let stale = {
                    let mut state = inner.lock_state();
                    state.mark_failure();
                    state.deactivate()
                };
                tracing::warn!("Keepalive probe failed: {}", err);
                if let Some(stale) = stale {
                    stale.close().await;
                }
                let _ = Self::ensure_active(inner).await;
            }
        }
    }
}

impl Drop for ManagerInner {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.keepalive.lock() {
            if let Some(task) = slot.take() {
                task.abort();
            }
        }
    }
}
