//! The sync engine: replays the queue against the remote.

use crate::config::SyncConfig;
use crate::connectivity::Connectivity;
use crate::error::{RemoteError, SyncError, SyncResult};
use crate::notify::{Notice, Notifier};
use crate::queue::{OperationQueue, QueueHealth};
use crate::remote::{OrgContext, RemoteStore};
use hsesync_model::{now_millis, OperationKind, PendingOperation};
use hsesync_store::LocalStore;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// What the engine is doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// No flush in progress.
    Idle,
    /// A flush is replaying operations.
    Syncing,
}

impl SyncState {
    /// Returns true while a flush runs.
    pub fn is_active(&self) -> bool {
        matches!(self, SyncState::Syncing)
    }
}

/// Why a flush did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The device is offline.
    Offline,
    /// Another flush is already running.
    InFlight,
}

/// Counts of one completed flush.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Operations in the snapshot.
    pub attempted: usize,
    /// Operations the remote accepted and that left the queue.
    pub succeeded: usize,
    /// Operations that failed and stay queued.
    pub failed: usize,
    /// Ids of the failed operations, in replay order.
    pub failed_ids: Vec<String>,
    /// Wall time of the flush.
    pub duration: Duration,
}

/// Result of a flush request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Nothing was attempted.
    Skipped(SkipReason),
    /// The snapshot was replayed (possibly empty).
    Completed(FlushReport),
}

impl FlushOutcome {
    /// The report of a completed flush.
    pub fn report(&self) -> Option<&FlushReport> {
        match self {
            FlushOutcome::Completed(report) => Some(report),
            FlushOutcome::Skipped(_) => None,
        }
    }

    /// True if the flush was skipped.
    pub fn is_skipped(&self) -> bool {
        matches!(self, FlushOutcome::Skipped(_))
    }
}

/// Statistics about flushes since the engine was created.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Flushes that ran to completion.
    pub flushes_completed: u64,
    /// Flushes skipped because offline or already running.
    pub flushes_skipped: u64,
    /// Flushes aborted by an error.
    pub flushes_failed: u64,
    /// Operations replayed.
    pub operations_attempted: u64,
    /// Operations the remote accepted.
    pub operations_succeeded: u64,
    /// Operations the remote rejected.
    pub operations_failed: u64,
    /// Completion time of the last flush.
    pub last_flush_time: Option<Instant>,
    /// Last error message.
    pub last_error: Option<String>,
}

struct Inner {
    config: SyncConfig,
    queue: OperationQueue,
    remote: Arc<dyn RemoteStore>,
    connectivity: Arc<dyn Connectivity>,
    notifier: Arc<dyn Notifier>,
    in_flight: AtomicBool,
    state: watch::Sender<SyncState>,
    stats: RwLock<SyncStats>,
}

struct Worker {
    handle: JoinHandle<()>,
    shutdown: watch::Sender<bool>,
}

/// Replays pending operations against the remote.
///
/// Owned by the composition root and shared via `Arc`. [`SyncEngine::start`]
/// runs a background loop that flushes on a timer and when connectivity
/// returns; [`SyncEngine::flush_now`] flushes on demand.
///
/// A flush lists the queue once, resolves the user and organization, then
/// replays the operations one at a time in queue order. A rejected
/// operation is logged, counted and kept for the next flush; the rest still
/// run. Only one flush runs at a time. A flush requested while another runs,
/// or while offline, is skipped, not queued.
pub struct SyncEngine {
    inner: Arc<Inner>,
    worker: Mutex<Option<Worker>>,
}

impl SyncEngine {
    /// Creates an engine over `store`, which must have the queue partitions.
    pub fn new(
        config: SyncConfig,
        store: Arc<LocalStore>,
        remote: Arc<dyn RemoteStore>,
        connectivity: Arc<dyn Connectivity>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let (state, _) = watch::channel(SyncState::Idle);
        Self {
            inner: Arc::new(Inner {
                config,
                queue: OperationQueue::new(store),
                remote,
                connectivity,
                notifier,
                in_flight: AtomicBool::new(false),
                state,
                stats: RwLock::new(SyncStats::default()),
            }),
            worker: Mutex::new(None),
        }
    }

    /// The configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    /// The queue the engine replays.
    pub fn queue(&self) -> &OperationQueue {
        &self.inner.queue
    }

    /// The store behind the queue.
    pub fn store(&self) -> &Arc<LocalStore> {
        self.inner.queue.store()
    }

    /// True while the host reports connectivity.
    pub fn is_online(&self) -> bool {
        self.inner.connectivity.is_online()
    }

    /// Gets the current state.
    pub fn state(&self) -> SyncState {
        *self.inner.state.borrow()
    }

    /// A receiver that sees every state change.
    pub fn subscribe_state(&self) -> watch::Receiver<SyncState> {
        self.inner.state.subscribe()
    }

    /// Gets the current stats.
    pub fn stats(&self) -> SyncStats {
        self.inner.stats.read().clone()
    }

    /// Queue size, oldest age and worst retry count.
    ///
    /// # Errors
    ///
    /// Fails if the store is unavailable.
    pub fn queue_health(&self) -> SyncResult<QueueHealth> {
        self.inner.queue.health(now_millis())
    }

    /// True while the background loop runs.
    pub fn is_running(&self) -> bool {
        self.worker
            .lock()
            .as_ref()
            .is_some_and(|worker| !worker.handle.is_finished())
    }

    /// Replays the queue now.
    ///
    /// # Errors
    ///
    /// - [`SyncError::NotAuthenticated`] or
    ///   [`SyncError::ContextResolutionFailed`] if the flush was aborted
    ///   before replay; the queue is untouched
    /// - [`SyncError::StorageUnavailable`] if the store failed mid-flush
    pub async fn flush_now(&self) -> SyncResult<FlushOutcome> {
        self.inner.flush().await
    }

    /// Starts a flush in the background and returns immediately.
    ///
    /// Returns false when there is no tokio runtime to run it on.
    pub fn request_flush(&self) -> bool {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!("no runtime, flush left for the next tick");
            return false;
        };
        let inner = Arc::clone(&self.inner);
        runtime.spawn(async move { inner.flush_logged("request").await });
        true
    }

    /// Starts the background loop on the current tokio runtime.
    ///
    /// # Errors
    ///
    /// [`SyncError::AlreadyRunning`], [`SyncError::NoRuntime`], or
    /// [`SyncError::InvalidConfig`] for a zero flush interval.
    pub fn start(&self) -> SyncResult<()> {
        let mut worker = self.worker.lock();
        if worker
            .as_ref()
            .is_some_and(|worker| !worker.handle.is_finished())
        {
            return Err(SyncError::AlreadyRunning);
        }
        if self.inner.config.flush_interval.is_zero() {
            return Err(SyncError::InvalidConfig(
                "flush interval must be greater than zero".into(),
            ));
        }
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| SyncError::NoRuntime)?;

        // Subscribe now so changes made before the task first runs are seen.
        let online = self.inner.connectivity.subscribe();
        let was_online = *online.borrow();
        let (shutdown, shutdown_rx) = watch::channel(false);
        let handle = runtime.spawn(run(Arc::clone(&self.inner), online, was_online, shutdown_rx));
        *worker = Some(Worker { handle, shutdown });
        info!(interval = ?self.inner.config.flush_interval, "sync engine started");
        Ok(())
    }

    /// Stops the background loop.
    ///
    /// Waits for a flush in progress to finish; nothing is cancelled
    /// mid-replay.
    pub async fn stop(&self) {
        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            worker.shutdown.send_replace(true);
            if let Err(e) = worker.handle.await {
                error!(error = %e, "sync loop ended abnormally");
            }
        }
        let mut state = self.inner.state.subscribe();
        let _ = state.wait_for(|s| *s == SyncState::Idle).await;
        info!("sync engine stopped");
    }
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("config", &self.inner.config)
            .field("state", &self.state())
            .field("running", &self.is_running())
            .finish()
    }
}

/// Clears the in-flight flag when a flush ends, however it ends.
struct FlushGuard<'a> {
    inner: &'a Inner,
}

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        self.inner.state.send_replace(SyncState::Idle);
        self.inner.in_flight.store(false, Ordering::SeqCst);
    }
}

impl Inner {
    async fn flush(&self) -> SyncResult<FlushOutcome> {
        if !self.connectivity.is_online() {
            debug!("offline, flush skipped");
            self.stats.write().flushes_skipped += 1;
            return Ok(FlushOutcome::Skipped(SkipReason::Offline));
        }
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("flush already in flight, skipped");
            self.stats.write().flushes_skipped += 1;
            return Ok(FlushOutcome::Skipped(SkipReason::InFlight));
        }
        self.state.send_replace(SyncState::Syncing);
        let _guard = FlushGuard { inner: self };

        let start = Instant::now();
        let result = self.replay().await;
        let mut stats = self.stats.write();
        match result {
            Ok(mut report) => {
                report.duration = start.elapsed();
                stats.flushes_completed += 1;
                stats.operations_attempted += report.attempted as u64;
                stats.operations_succeeded += report.succeeded as u64;
                stats.operations_failed += report.failed as u64;
                stats.last_flush_time = Some(Instant::now());
                Ok(FlushOutcome::Completed(report))
            }
            Err(e) => {
                stats.flushes_failed += 1;
                stats.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    async fn replay(&self) -> SyncResult<FlushReport> {
        let pending = self.queue.list_unsynced()?;
        if pending.is_empty() {
            return Ok(FlushReport::default());
        }

        let identity = match self.remote.current_identity().await {
            Ok(Some(identity)) => identity,
            Ok(None) => return Err(SyncError::NotAuthenticated("no signed-in user".into())),
            Err(e) => return Err(SyncError::NotAuthenticated(e.to_string())),
        };
        let context = match self.remote.lookup_context(&identity).await {
            Ok(Some(context)) => context,
            Ok(None) => {
                return Err(SyncError::ContextResolutionFailed(format!(
                    "user {} has no organization",
                    identity.user_id
                )))
            }
            Err(e) => return Err(SyncError::ContextResolutionFailed(e.to_string())),
        };

        info!(pending = pending.len(), "replaying queue");
        let mut report = FlushReport {
            attempted: pending.len(),
            ..FlushReport::default()
        };
        for op in &pending {
            match self.dispatch(op, &context).await {
                Ok(()) => {
                    self.queue.mark_synced(&op.id)?;
                    report.succeeded += 1;
                }
                Err(source) => {
                    let message = source.to_string();
                    let retryable = source.is_retryable();
                    let err = SyncError::RemoteOperationFailed {
                        op_id: op.id.clone(),
                        collection: op.collection,
                        kind: op.kind,
                        source,
                    };
                    warn!(error = %err, retryable, "operation stays queued");
                    let attempt = self.queue.record_failure(&op.id, &message)?;
                    debug!(op_id = %op.id, attempts = attempt.attempts, "attempt recorded");
                    self.stats.write().last_error = Some(err.to_string());
                    report.failed += 1;
                    report.failed_ids.push(op.id.clone());
                }
            }
        }

        info!(
            attempted = report.attempted,
            succeeded = report.succeeded,
            failed = report.failed,
            "flush complete"
        );
        self.notifier.notify(Notice::Synced {
            count: report.attempted,
        });
        Ok(report)
    }

    async fn dispatch(
        &self,
        op: &PendingOperation,
        context: &OrgContext,
    ) -> Result<(), RemoteError> {
        let org_field = self.config.organization_field.as_str();
        let org = Value::String(context.organization_id.clone());
        match op.kind {
            OperationKind::Insert => {
                let mut record = op.payload.clone();
                record.insert(org_field, org);
                self.remote.create(op.collection, record).await.map(|_| ())
            }
            OperationKind::Update => {
                let id = record_id(op)?;
                let mut patch = op.payload.without_id();
                patch.insert(org_field, org);
                self.remote.update(op.collection, id, patch).await
            }
            OperationKind::Delete => {
                let id = record_id(op)?;
                self.remote.delete(op.collection, id).await
            }
        }
    }

    async fn flush_logged(&self, trigger: &'static str) {
        match self.flush().await {
            Ok(FlushOutcome::Completed(report)) if report.attempted > 0 => {
                debug!(trigger, ?report, "flush finished");
            }
            Ok(_) => {}
            Err(e) if e.is_abort() => warn!(trigger, error = %e, "flush aborted"),
            Err(e) => error!(trigger, error = %e, "flush failed"),
        }
    }
}

fn record_id(op: &PendingOperation) -> Result<&str, RemoteError> {
    op.record_id()
        .ok_or_else(|| RemoteError::InvalidRequest(format!("operation {} has no record id", op.id)))
}

async fn run(
    inner: Arc<Inner>,
    mut online: watch::Receiver<bool>,
    mut was_online: bool,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut watching = true;

    let mut ticker = tokio::time::interval(inner.config.flush_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // The first tick completes immediately.
    ticker.tick().await;

    if inner.config.flush_on_start {
        inner.flush_logged("start").await;
    }

    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            _ = ticker.tick() => inner.flush_logged("timer").await,
            changed = online.changed(), if watching => {
                if changed.is_err() {
                    debug!("connectivity source closed");
                    watching = false;
                    continue;
                }
                let now_online = *online.borrow_and_update();
                if now_online == was_online {
                    continue;
                }
                was_online = now_online;
                if now_online {
                    inner.notifier.notify(Notice::Reconnected);
                    if inner.config.flush_on_reconnect {
                        inner.flush_logged("reconnect").await;
                    }
                } else {
                    inner.notifier.notify(Notice::WentOffline);
                }
            }
        }
    }
    debug!("sync loop exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectivity::ConnectivityMonitor;
    use crate::notify::RecordingNotifier;
    use crate::open_store_in_memory;
    use crate::remote::MockRemote;
    use hsesync_model::{Collection, Document};
    use serde_json::json;

    struct Fixture {
        engine: SyncEngine,
        remote: Arc<MockRemote>,
        online: Arc<ConnectivityMonitor>,
        notices: Arc<RecordingNotifier>,
    }

    fn fixture() -> Fixture {
        let remote = Arc::new(MockRemote::new());
        let online = Arc::new(ConnectivityMonitor::new(true));
        let notices = Arc::new(RecordingNotifier::new());
        let engine = SyncEngine::new(
            SyncConfig::default(),
            Arc::new(open_store_in_memory().unwrap()),
            remote.clone(),
            online.clone(),
            notices.clone(),
        );
        Fixture {
            engine,
            remote,
            online,
            notices,
        }
    }

    fn insert(f: &Fixture, id: &str) -> PendingOperation {
        f.engine
            .queue()
            .enqueue(
                Collection::Incidents,
                OperationKind::Insert,
                Document::from_value(json!({"id": id, "type": "near_miss"})).unwrap(),
            )
            .unwrap()
    }

    #[tokio::test]
    async fn empty_queue_completes_without_notice() {
        let f = fixture();
        let outcome = f.engine.flush_now().await.unwrap();
        assert_eq!(outcome, FlushOutcome::Completed(FlushReport::default()));
        assert!(f.notices.notices().is_empty());
        assert_eq!(f.engine.stats().flushes_completed, 1);
    }

    #[tokio::test]
    async fn update_sends_patch_without_id() {
        let f = fixture();
        f.engine
            .queue()
            .enqueue(
                Collection::CorrectiveActions,
                OperationKind::Update,
                Document::from_value(json!({"id": "ca-1", "status": "done"})).unwrap(),
            )
            .unwrap();
        f.engine.flush_now().await.unwrap();

        match &f.remote.calls()[0] {
            crate::remote::RemoteCall::Update { id, patch, .. } => {
                assert_eq!(id, "ca-1");
                assert_eq!(
                    patch.clone().into_value(),
                    json!({"status": "done", "organization_id": "org-1"})
                );
            }
            other => panic!("unexpected call {other:?}"),
        }
    }

    #[tokio::test]
    async fn failure_message_is_recorded() {
        let f = fixture();
        let op = insert(&f, "bad");
        f.remote.fail_record("bad");

        let report = f.engine.flush_now().await.unwrap().report().cloned().unwrap();
        assert_eq!(report.failed_ids, vec![op.id.clone()]);
        let attempt = f.engine.queue().attempts(&op.id).unwrap().unwrap();
        assert!(attempt.last_error.contains("HTTP 500"));
        assert!(f.engine.stats().last_error.unwrap().contains("bad"));
    }

    #[tokio::test]
    async fn stats_accumulate() {
        let f = fixture();
        insert(&f, "a");
        insert(&f, "b");
        f.remote.fail_record("b");
        f.engine.flush_now().await.unwrap();
        f.online.set_online(false);
        f.engine.flush_now().await.unwrap();

        let stats = f.engine.stats();
        assert_eq!(stats.flushes_completed, 1);
        assert_eq!(stats.flushes_skipped, 1);
        assert_eq!(stats.operations_attempted, 2);
        assert_eq!(stats.operations_succeeded, 1);
        assert_eq!(stats.operations_failed, 1);
        assert!(stats.last_flush_time.is_some());
    }

    #[tokio::test]
    async fn start_twice_is_rejected() {
        let f = fixture();
        f.engine.start().unwrap();
        assert!(f.engine.is_running());
        assert!(matches!(f.engine.start(), Err(SyncError::AlreadyRunning)));
        f.engine.stop().await;
        assert!(!f.engine.is_running());
        f.engine.start().unwrap();
        f.engine.stop().await;
    }

    #[test]
    fn start_needs_a_runtime() {
        let f = fixture();
        assert!(matches!(f.engine.start(), Err(SyncError::NoRuntime)));
        assert!(!f.engine.request_flush());
    }

    #[tokio::test]
    async fn zero_interval_is_rejected_before_spawning() {
        let engine = SyncEngine::new(
            SyncConfig::default().with_flush_interval(Duration::ZERO),
            Arc::new(open_store_in_memory().unwrap()),
            Arc::new(MockRemote::new()),
            Arc::new(ConnectivityMonitor::new(true)),
            Arc::new(RecordingNotifier::new()),
        );
        let err = engine.start().unwrap_err();
        assert!(matches!(err, SyncError::InvalidConfig(_)));
        assert!(err.to_string().contains("flush interval"));
        assert!(!engine.is_running());
    }

    #[tokio::test]
    async fn flush_error_lands_in_stats() {
        let f = fixture();
        insert(&f, "a");
        f.remote.set_identity(None);
        let err = f.engine.flush_now().await.unwrap_err();
        assert!(matches!(err, SyncError::NotAuthenticated(_)));
        assert_eq!(f.engine.stats().flushes_failed, 1);
        assert_eq!(f.engine.state(), SyncState::Idle);
    }
}
