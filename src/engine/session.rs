// ABOUTME: SyncSession - remote connection lifecycle, schema bootstrap, scheduling
// ABOUTME: Owns the single-flight guard, connectivity state, and periodic timer

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use tokio::task::JoinHandle;

use super::orchestrator::{self, SyncSummary};
use super::statements;
use crate::registry;
use crate::store::{PostgresStore, Store};

/// Default interval between scheduled sync passes.
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(3600);

/// Lifecycle of the remote connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    /// No remote connection string configured; sync is disabled.
    Unconfigured = 0,
    /// Configured but not yet (or no longer) connected.
    Disconnected = 1,
    /// Connection attempt in progress.
    Connecting = 2,
    /// Remote reachable and schema bootstrapped; passes may run.
    Connected = 3,
}

impl ConnectionState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => ConnectionState::Disconnected,
            2 => ConnectionState::Connecting,
            3 => ConnectionState::Connected,
            _ => ConnectionState::Unconfigured,
        }
    }
}

/// Process-wide sync session.
///
/// Constructed once at startup and explicitly torn down; everything that used
/// to be tempting as module-level mutable state (connection handle, in-flight
/// flag, timer) lives here instead.
pub struct SyncSession {
    local: Arc<dyn Store>,
    remote_url: Option<String>,
    remote: tokio::sync::Mutex<Option<Arc<dyn Store>>>,
    state: AtomicU8,
    syncing: AtomicBool,
    local_ready: AtomicBool,
    remote_ready: AtomicBool,
    scheduler: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl SyncSession {
    /// Create a session that will lazily connect to `remote_url` on first
    /// use. A `None` url disables the subsystem: passes report
    /// [`Outcome::Disabled`](super::orchestrator::Outcome::Disabled) and no
    /// work happens.
    pub fn new(local: Arc<dyn Store>, remote_url: Option<String>) -> Self {
        let state = if remote_url.is_some() {
            ConnectionState::Disconnected
        } else {
            ConnectionState::Unconfigured
        };
        Self {
            local,
            remote_url,
            remote: tokio::sync::Mutex::new(None),
            state: AtomicU8::new(state as u8),
            syncing: AtomicBool::new(false),
            local_ready: AtomicBool::new(false),
            remote_ready: AtomicBool::new(false),
            scheduler: std::sync::Mutex::new(None),
        }
    }

    /// Create a session with an already-constructed remote store.
    ///
    /// The engine is agnostic to what backs either side; embedders and tests
    /// use this to run the full engine over two embedded stores.
    pub fn with_remote_store(local: Arc<dyn Store>, remote: Arc<dyn Store>) -> Self {
        Self {
            local,
            remote_url: None,
            remote: tokio::sync::Mutex::new(Some(remote)),
            state: AtomicU8::new(ConnectionState::Connected as u8),
            syncing: AtomicBool::new(false),
            local_ready: AtomicBool::new(false),
            remote_ready: AtomicBool::new(false),
            scheduler: std::sync::Mutex::new(None),
        }
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    /// Connectivity flag for the UI layer.
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Establish the remote connection (if needed) without running a pass.
    pub async fn connect(&self) -> Result<()> {
        self.ensure_remote().await.map(|_| ())
    }

    /// Run one synchronization pass.
    ///
    /// Single-flight: a pass triggered while another is running is rejected
    /// (reported as [`Outcome::Busy`](super::orchestrator::Outcome::Busy)),
    /// never queued. An unconfigured session reports `Disabled` with no side
    /// effects; a connection failure reports `Failed` and flips the
    /// connectivity flag until a later attempt succeeds.
    pub async fn sync_now(&self) -> SyncSummary {
        let configured = self.remote_url.is_some() || self.remote.lock().await.is_some();
        if !configured {
            tracing::debug!("Sync requested but no remote is configured; skipping");
            return SyncSummary::disabled();
        }

        if self.syncing.swap(true, Ordering::SeqCst) {
            tracing::warn!("Sync pass already in progress; rejecting trigger");
            return SyncSummary::busy();
        }

        let summary = self.run_guarded().await;
        self.syncing.store(false, Ordering::SeqCst);
        summary
    }

    async fn run_guarded(&self) -> SyncSummary {
        if let Err(e) = self.ensure_local_schema().await {
            tracing::error!("Local schema bootstrap failed: {:?}", e);
            return SyncSummary::failed(&e);
        }
        let remote = match self.ensure_remote().await {
            Ok(remote) => remote,
            Err(e) => {
                tracing::error!("Remote connection failed: {:?}", e);
                return SyncSummary::failed(&e);
            }
        };
        orchestrator::run_pass(self.local.as_ref(), remote.as_ref()).await
    }

    /// Ensure the local store carries every registry table plus the tombstone
    /// table. The desktop app normally owns the local schema; this keeps the
    /// CLI working against a fresh database file.
    pub async fn ensure_local_schema(&self) -> Result<()> {
        if self.local_ready.load(Ordering::SeqCst) {
            return Ok(());
        }
        bootstrap(self.local.as_ref())
            .await
            .context("Failed to bootstrap local schema")?;
        self.local_ready.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn ensure_remote(&self) -> Result<Arc<dyn Store>> {
        let mut guard = self.remote.lock().await;

        if let Some(remote) = guard.as_ref() {
            if !self.remote_ready.load(Ordering::SeqCst) {
                bootstrap(remote.as_ref())
                    .await
                    .context("Failed to bootstrap remote schema")?;
                self.remote_ready.store(true, Ordering::SeqCst);
                self.set_state(ConnectionState::Connected);
            }
            return Ok(remote.clone());
        }

        let url = self
            .remote_url
            .as_deref()
            .ok_or_else(|| anyhow!("Remote sync is not configured"))?;

        self.set_state(ConnectionState::Connecting);
        tracing::info!("Connecting to remote sync database");

        let store: Arc<dyn Store> = match PostgresStore::connect(url).await {
            Ok(store) => Arc::new(store),
            Err(e) => {
                self.set_state(ConnectionState::Disconnected);
                return Err(e);
            }
        };

        if let Err(e) = bootstrap(store.as_ref()).await {
            self.set_state(ConnectionState::Disconnected);
            return Err(e).context("Failed to bootstrap remote schema");
        }

        self.remote_ready.store(true, Ordering::SeqCst);
        self.set_state(ConnectionState::Connected);
        *guard = Some(store.clone());
        tracing::info!("Remote sync database connected and schema verified");
        Ok(store)
    }

    /// Start the recurring sync timer. The first pass fires immediately
    /// (startup sync), then every `every` thereafter. No-op if the scheduler
    /// is already running.
    pub fn start_scheduler(self: &Arc<Self>, every: Duration) {
        let mut guard = self
            .scheduler
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if guard.is_some() {
            tracing::warn!("Sync scheduler already running");
            return;
        }

        tracing::info!("Starting sync scheduler (every {:?})", every);
        let session = Arc::clone(self);
        *guard = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let summary = session.sync_now().await;
                if summary.errors.is_empty() {
                    tracing::info!(
                        "Scheduled sync: {:?} ({} pulled, {} pushed, {} deleted)",
                        summary.outcome,
                        summary.pulled,
                        summary.pushed,
                        summary.deleted
                    );
                } else {
                    tracing::warn!(
                        "Scheduled sync: {:?} with {} errors",
                        summary.outcome,
                        summary.errors.len()
                    );
                }
            }
        }));
    }

    /// Tear the session down: cancel the timer and drop the remote handle.
    pub async fn shutdown(&self) {
        if let Some(handle) = self
            .scheduler
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
        {
            handle.abort();
        }
        *self.remote.lock().await = None;
        self.remote_ready.store(false, Ordering::SeqCst);
        if self.state() != ConnectionState::Unconfigured {
            self.set_state(ConnectionState::Disconnected);
        }
        tracing::info!("Sync session shut down");
    }
}

/// Idempotent schema bootstrap for one store.
///
/// `CREATE TABLE IF NOT EXISTS` for the tombstone table and every registry
/// table, then the additive column probes. A probe failing because the
/// column already exists is expected and swallowed; any other DDL failure is
/// fatal to establishing the session.
pub async fn bootstrap(store: &dyn Store) -> Result<()> {
    let dialect = store.dialect();

    store
        .execute(&statements::create_tombstone_table(dialect), &[])
        .await
        .context("Failed to create tombstone table")?;

    for spec in registry::registry() {
        store
            .execute(&statements::create_table(spec, dialect), &[])
            .await
            .with_context(|| format!("Failed to create table '{}'", spec.name))?;
    }

    for (table, column, ty) in statements::ADDITIVE_MIGRATIONS {
        let sql = statements::add_column(table, column, *ty, dialect);
        if let Err(e) = store.execute(&sql, &[]).await {
            if is_duplicate_column(&e) {
                tracing::debug!("Column {}.{} already exists", table, column);
            } else {
                return Err(e)
                    .with_context(|| format!("Failed to add column {}.{}", table, column));
            }
        } else {
            tracing::info!("Added missing column {}.{}", table, column);
        }
    }

    Ok(())
}

fn is_duplicate_column(err: &anyhow::Error) -> bool {
    let msg = format!("{:#}", err).to_lowercase();
    msg.contains("duplicate column") || msg.contains("already exists")
}
