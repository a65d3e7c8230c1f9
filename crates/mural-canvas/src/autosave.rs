//! AutoSave Controller
//!
//! Decides when and whether to persist the canvas. Debounces bursts of
//! mutations into a single save, retries transient network failures with
//! a fixed delay, and turns version conflicts into an explicit two-choice
//! resolution instead of overwriting anyone's work silently.
//!
//! The debounce timer is a single replaceable scheduled task: each new
//! mutation cancels and reschedules it, so at most one flush is pending
//! per quiet window and it always reflects the latest state. An in-flight
//! save is never cancelled by new edits; a request sequence number
//! discards responses that arrive after a newer request was issued.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::project::CanvasProject;
use crate::store::{CanvasStore, SaveStatus};
use crate::transport::{SaveOutcome, SaveRequest, SaveTransport, TransportError};

/// Tuning knobs for the autosave loop.
#[derive(Debug, Clone)]
pub struct AutoSaveConfig {
    /// Quiet window before a flush is issued
    pub debounce: Duration,
    /// Total attempts for a transiently failing save, initial try
    /// included
    pub max_attempts: u32,
    /// Fixed delay between attempts
    pub retry_delay: Duration,
}

impl Default for AutoSaveConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(1500),
            max_attempts: 3,
            retry_delay: Duration::from_secs(2),
        }
    }
}

impl AutoSaveConfig {
    /// Create the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the debounce window.
    #[must_use]
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Set the total attempt count, initial try included.
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Set the delay between attempts.
    #[must_use]
    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }
}

/// Errors surfaced by explicit save calls.
#[derive(Debug, Error)]
pub enum AutoSaveError {
    /// Transient failures exhausted the retry budget.
    #[error("save failed after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        /// Attempts made
        attempts: u32,
        /// Last transport error
        last_error: String,
    },

    /// The server refused the payload; retrying cannot succeed.
    #[error("save rejected: {0}")]
    Rejected(String),

    /// A conflict is pending and must be resolved first.
    #[error("a version conflict is awaiting resolution")]
    ConflictPending,

    /// A resolution was requested but no conflict is pending.
    #[error("no conflict to resolve")]
    NoConflict,

    /// Snapshot serialization failed.
    #[error("snapshot serialization failed: {0}")]
    Serialization(String),
}

struct Shared<T> {
    store: Arc<RwLock<CanvasStore>>,
    transport: T,
    config: AutoSaveConfig,
    /// Pending debounce timer; a new mutation replaces it. The task
    /// clears its own slot before flushing so that cancellation can only
    /// hit the sleep, never an in-flight save.
    timer: Mutex<Option<JoinHandle<()>>>,
    /// Serialized form of the last successfully persisted snapshot.
    last_sent: Mutex<Option<String>>,
    /// Authoritative server state captured on conflict.
    conflict: Mutex<Option<CanvasProject>>,
    /// Monotonic request sequence; responses older than the latest
    /// issued request are discarded.
    seq: AtomicU64,
}

/// Debounced, retrying save loop for one [`CanvasStore`].
pub struct AutoSaveController<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for AutoSaveController<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: SaveTransport + 'static> AutoSaveController<T> {
    /// Create a controller for a store and transport.
    #[must_use]
    pub fn new(store: Arc<RwLock<CanvasStore>>, transport: T, config: AutoSaveConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                store,
                transport,
                config,
                timer: Mutex::new(None),
                last_sent: Mutex::new(None),
                conflict: Mutex::new(None),
                seq: AtomicU64::new(0),
            }),
        }
    }

    /// The store this controller saves.
    #[must_use]
    pub fn store(&self) -> Arc<RwLock<CanvasStore>> {
        Arc::clone(&self.shared.store)
    }

    /// Whether a version conflict is awaiting resolution.
    #[must_use]
    pub fn conflict_pending(&self) -> bool {
        self.shared.conflict.lock().unwrap().is_some()
    }

    /// The server state captured on conflict, for the resolution UI.
    #[must_use]
    pub fn conflict_snapshot(&self) -> Option<CanvasProject> {
        self.shared.conflict.lock().unwrap().clone()
    }

    /// Note a store mutation: cancel any pending timer and schedule a
    /// flush after the quiet window. While a conflict is pending the
    /// debounce cycle stays disarmed.
    pub fn on_mutation(&self) {
        if self.conflict_pending() {
            return;
        }
        let shared = Arc::clone(&self.shared);
        let debounce = self.shared.config.debounce;
        let task = tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            // Leave the timer slot before flushing: a later mutation may
            // only cancel the sleep, never an in-flight save.
            *shared.timer.lock().unwrap() = None;
            if let Err(e) = shared.flush().await {
                debug!(error = %e, "debounced save failed");
            }
        });
        let mut timer = self.shared.timer.lock().unwrap();
        if let Some(previous) = timer.replace(task) {
            previous.abort();
        }
    }

    /// Save immediately, bypassing the debounce window.
    pub async fn save_now(&self) -> Result<(), AutoSaveError> {
        if let Some(previous) = self.shared.timer.lock().unwrap().take() {
            previous.abort();
        }
        self.shared.flush().await
    }

    /// Best-effort fire-and-forget flush for page/tab close. No
    /// acknowledgment is awaited.
    pub fn flush_detached(&self) {
        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            if let Err(e) = shared.flush().await {
                debug!(error = %e, "best-effort flush failed");
            }
        });
    }

    /// Resolve a pending conflict by discarding local edits and adopting
    /// the server state.
    pub async fn resolve_keep_server(&self) -> Result<(), AutoSaveError> {
        let latest = self
            .shared
            .conflict
            .lock()
            .unwrap()
            .take()
            .ok_or(AutoSaveError::NoConflict)?;

        let mut store = self.shared.store.write().await;
        store.adopt_remote(latest.elements, latest.viewport, latest.version);
        let serialized = serde_json::to_string(&store.snapshot())
            .map_err(|e| AutoSaveError::Serialization(e.to_string()))?;
        *self.shared.last_sent.lock().unwrap() = Some(serialized);
        Ok(())
    }

    /// Resolve a pending conflict by keeping local edits: adopt the
    /// server's version as the new expected version and resubmit
    /// immediately. This is a user-consented overwrite of the other
    /// writer's state.
    pub async fn resolve_keep_local(&self) -> Result<(), AutoSaveError> {
        let latest = self
            .shared
            .conflict
            .lock()
            .unwrap()
            .take()
            .ok_or(AutoSaveError::NoConflict)?;

        {
            let mut store = self.shared.store.write().await;
            store.adopt_remote_version(latest.version);
            store.set_save_status(SaveStatus::Idle);
        }
        // Force the resubmit even though the payload matches what was
        // last attempted.
        *self.shared.last_sent.lock().unwrap() = None;
        self.shared.flush().await
    }
}

impl<T: SaveTransport> Shared<T> {
    async fn flush(&self) -> Result<(), AutoSaveError> {
        if self.conflict.lock().unwrap().is_some() {
            return Err(AutoSaveError::ConflictPending);
        }

        let (project_id, snapshot, expected_version) = {
            let store = self.store.read().await;
            (store.project_id(), store.snapshot(), store.version())
        };

        let serialized = serde_json::to_string(&snapshot)
            .map_err(|e| AutoSaveError::Serialization(e.to_string()))?;
        if self.last_sent.lock().unwrap().as_deref() == Some(serialized.as_str()) {
            debug!(%project_id, "snapshot unchanged, skipping save");
            return Ok(());
        }

        let seq = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        self.store.write().await.set_save_status(SaveStatus::Saving);

        let request = SaveRequest {
            elements: snapshot.elements,
            viewport: snapshot.viewport,
            title: snapshot.title,
            expected_version,
        };

        let mut attempt = 0;
        let outcome = loop {
            attempt += 1;
            match self.transport.save(project_id, request.clone()).await {
                Ok(outcome) => break Ok(outcome),
                Err(e) if e.is_transient() && attempt < self.config.max_attempts => {
                    warn!(
                        %project_id,
                        attempt,
                        max_attempts = self.config.max_attempts,
                        error = %e,
                        "save failed, retrying"
                    );
                    tokio::time::sleep(self.config.retry_delay).await;
                }
                Err(e) => break Err(e),
            }
        };

        if seq != self.seq.load(Ordering::SeqCst) {
            debug!(%project_id, seq, "discarding stale save response");
            return Ok(());
        }

        match outcome {
            Ok(SaveOutcome::Saved(project)) => {
                let mut store = self.store.write().await;
                // Reconcile against current state: if nothing changed
                // while the save was in flight, adopt the server payload
                // wholesale (it may have rewritten inline images to
                // durable URLs). If edits accumulated, only the version
                // advances and the next cycle sends the newer state.
                let unchanged = serde_json::to_string(&store.snapshot())
                    .map(|now| now == serialized)
                    .unwrap_or(false);
                if unchanged {
                    store.adopt_remote(project.elements, project.viewport, project.version);
                    let adopted = serde_json::to_string(&store.snapshot())
                        .map_err(|e| AutoSaveError::Serialization(e.to_string()))?;
                    *self.last_sent.lock().unwrap() = Some(adopted);
                } else {
                    store.adopt_remote_version(project.version);
                    *self.last_sent.lock().unwrap() = Some(serialized);
                }
                Ok(())
            }
            Ok(SaveOutcome::Conflict(latest)) => {
                warn!(
                    %project_id,
                    expected_version,
                    latest_version = latest.version,
                    "version conflict, autosave halted until resolved"
                );
                *self.conflict.lock().unwrap() = Some(latest);
                self.store.write().await.set_save_status(SaveStatus::Conflict);
                Ok(())
            }
            Err(TransportError::Network(message)) => {
                error!(%project_id, attempts = attempt, "save retries exhausted");
                self.store.write().await.set_save_status(SaveStatus::Error);
                Err(AutoSaveError::RetriesExhausted {
                    attempts: attempt,
                    last_error: message,
                })
            }
            Err(TransportError::Rejected { code, message }) => {
                error!(%project_id, %code, %message, "save rejected");
                self.store.write().await.set_save_status(SaveStatus::Error);
                Err(AutoSaveError::Rejected(format!("{code}: {message}")))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::CanvasElement;
    use crate::project::CanvasProject;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use uuid::Uuid;

    /// Scripted server double: echoes the request as a successful save
    /// unless a response override is queued.
    struct FakeTransport {
        calls: Mutex<Vec<SaveRequest>>,
        script: Mutex<VecDeque<ScriptedResponse>>,
    }

    enum ScriptedResponse {
        NetworkError,
        Conflict(CanvasProject),
        /// Echo the request as saved, but only after the given delay.
        DelayedEcho(Duration),
    }

    impl FakeTransport {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                script: Mutex::new(VecDeque::new()),
            })
        }

        fn queue(&self, response: ScriptedResponse) {
            self.script.lock().unwrap().push_back(response);
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }

        fn last_call(&self) -> SaveRequest {
            self.calls.lock().unwrap().last().cloned().unwrap()
        }

        fn echo(project_id: Uuid, request: &SaveRequest) -> CanvasProject {
            let mut project = CanvasProject::new("user1", request.title.clone()).with_id(project_id);
            project.elements = request.elements.clone();
            project.viewport = request.viewport;
            project.version = request.expected_version + 1;
            project
        }
    }

    #[async_trait]
    impl SaveTransport for Arc<FakeTransport> {
        async fn save(
            &self,
            project_id: Uuid,
            request: SaveRequest,
        ) -> Result<SaveOutcome, TransportError> {
            self.calls.lock().unwrap().push(request.clone());
            let scripted = self.script.lock().unwrap().pop_front();
            match scripted {
                Some(ScriptedResponse::NetworkError) => {
                    Err(TransportError::Network("connection reset".into()))
                }
                Some(ScriptedResponse::Conflict(latest)) => Ok(SaveOutcome::Conflict(latest)),
                Some(ScriptedResponse::DelayedEcho(delay)) => {
                    tokio::time::sleep(delay).await;
                    Ok(SaveOutcome::Saved(FakeTransport::echo(project_id, &request)))
                }
                None => Ok(SaveOutcome::Saved(FakeTransport::echo(project_id, &request))),
            }
        }
    }

    fn test_store() -> Arc<RwLock<CanvasStore>> {
        Arc::new(RwLock::new(CanvasStore::from_project(CanvasProject::new(
            "user1", "Test",
        ))))
    }

    fn controller(
        store: Arc<RwLock<CanvasStore>>,
        transport: Arc<FakeTransport>,
    ) -> AutoSaveController<Arc<FakeTransport>> {
        AutoSaveController::new(store, transport, AutoSaveConfig::default())
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_of_mutations_coalesces_to_one_save() {
        let store = test_store();
        let transport = FakeTransport::new();
        let autosave = controller(Arc::clone(&store), Arc::clone(&transport));

        for i in 0..5 {
            store
                .write()
                .await
                .add_element(CanvasElement::text(format!("e{i}"), 0.0, 0.0));
            autosave.on_mutation();
        }

        tokio::time::sleep(Duration::from_millis(1600)).await;
        settle().await;

        assert_eq!(transport.call_count(), 1);
        // The one request carries the state after the last mutation
        assert_eq!(transport.last_call().elements.len(), 5);
        assert_eq!(store.read().await.save_status(), SaveStatus::Saved);
        assert_eq!(store.read().await.version(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unchanged_snapshot_skips_network_call() {
        let store = test_store();
        let transport = FakeTransport::new();
        let autosave = controller(Arc::clone(&store), Arc::clone(&transport));

        store
            .write()
            .await
            .add_element(CanvasElement::text("a", 0.0, 0.0));

        autosave.save_now().await.unwrap();
        assert_eq!(transport.call_count(), 1);

        // Timer path firing after an externally triggered save must not
        // send a redundant request.
        autosave.on_mutation();
        tokio::time::sleep(Duration::from_millis(1600)).await;
        settle().await;
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_errors_are_retried() {
        let store = test_store();
        let transport = FakeTransport::new();
        transport.queue(ScriptedResponse::NetworkError);
        transport.queue(ScriptedResponse::NetworkError);
        let autosave = controller(Arc::clone(&store), Arc::clone(&transport));

        store
            .write()
            .await
            .add_element(CanvasElement::text("a", 0.0, 0.0));

        autosave.save_now().await.unwrap();

        assert_eq!(transport.call_count(), 3);
        assert_eq!(store.read().await.save_status(), SaveStatus::Saved);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_exhausted_sets_error_status() {
        let store = test_store();
        let transport = FakeTransport::new();
        for _ in 0..3 {
            transport.queue(ScriptedResponse::NetworkError);
        }
        let autosave = controller(Arc::clone(&store), Arc::clone(&transport));

        store
            .write()
            .await
            .add_element(CanvasElement::text("a", 0.0, 0.0));

        let result = autosave.save_now().await;
        assert!(matches!(
            result,
            Err(AutoSaveError::RetriesExhausted { attempts: 3, .. })
        ));
        assert_eq!(transport.call_count(), 3);
        assert_eq!(store.read().await.save_status(), SaveStatus::Error);

        // Edits stay in memory and an explicit save retries them
        autosave.save_now().await.unwrap();
        assert_eq!(store.read().await.save_status(), SaveStatus::Saved);
    }

    #[tokio::test(start_paused = true)]
    async fn test_max_attempts_bounds_total_transport_calls() {
        let store = test_store();
        let transport = FakeTransport::new();
        transport.queue(ScriptedResponse::NetworkError);
        transport.queue(ScriptedResponse::NetworkError);
        let autosave = AutoSaveController::new(
            Arc::clone(&store),
            Arc::clone(&transport),
            AutoSaveConfig::default().with_max_attempts(2),
        );

        store
            .write()
            .await
            .add_element(CanvasElement::text("a", 0.0, 0.0));

        // Two total attempts: the initial try plus one retry.
        let result = autosave.save_now().await;
        assert!(matches!(
            result,
            Err(AutoSaveError::RetriesExhausted { attempts: 2, .. })
        ));
        assert_eq!(transport.call_count(), 2);
        assert_eq!(store.read().await.save_status(), SaveStatus::Error);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_response_from_superseded_save_is_discarded() {
        let store = test_store();
        let transport = FakeTransport::new();
        transport.queue(ScriptedResponse::DelayedEcho(Duration::from_secs(5)));
        let autosave = controller(Arc::clone(&store), Arc::clone(&transport));

        store
            .write()
            .await
            .add_element(CanvasElement::text("first", 0.0, 0.0));
        autosave.on_mutation();
        tokio::time::sleep(Duration::from_millis(1600)).await;
        // The debounced save is now in flight, held by the slow server.

        store
            .write()
            .await
            .add_element(CanvasElement::text("second", 0.0, 0.0));
        autosave.save_now().await.unwrap();
        assert_eq!(store.read().await.version(), 2);
        assert_eq!(store.read().await.elements().len(), 2);

        // Let the held-up first response finally arrive.
        tokio::time::sleep(Duration::from_secs(5)).await;
        settle().await;

        // It was answering a superseded request and must not roll the
        // store back to the single-element state it echoed.
        {
            let store = store.read().await;
            assert_eq!(store.version(), 2);
            assert_eq!(store.elements().len(), 2);
            assert_eq!(store.save_status(), SaveStatus::Saved);
        }
        assert_eq!(transport.call_count(), 2);

        // Nor did it regress the last-sent snapshot: the timer path
        // still recognizes the current state as already persisted.
        autosave.on_mutation();
        tokio::time::sleep(Duration::from_millis(1600)).await;
        settle().await;
        assert_eq!(transport.call_count(), 2);
    }

    fn server_project(store_id: Uuid, version: i64) -> CanvasProject {
        let mut project = CanvasProject::new("user1", "Server copy").with_id(store_id);
        project
            .elements
            .push(CanvasElement::text("from other session", 0.0, 0.0));
        project.version = version;
        project
    }

    #[tokio::test(start_paused = true)]
    async fn test_conflict_halts_autosave_until_resolved() {
        let store = test_store();
        let project_id = store.read().await.project_id();
        let transport = FakeTransport::new();
        transport.queue(ScriptedResponse::Conflict(server_project(project_id, 4)));
        let autosave = controller(Arc::clone(&store), Arc::clone(&transport));

        store
            .write()
            .await
            .add_element(CanvasElement::text("mine", 0.0, 0.0));

        autosave.save_now().await.unwrap();
        assert_eq!(store.read().await.save_status(), SaveStatus::Conflict);
        assert!(autosave.conflict_pending());

        // Further mutations do not schedule saves while halted
        store
            .write()
            .await
            .add_element(CanvasElement::text("more", 0.0, 0.0));
        autosave.on_mutation();
        tokio::time::sleep(Duration::from_millis(1600)).await;
        settle().await;
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolve_keep_server_discards_local_edits() {
        let store = test_store();
        let project_id = store.read().await.project_id();
        let transport = FakeTransport::new();
        transport.queue(ScriptedResponse::Conflict(server_project(project_id, 4)));
        let autosave = controller(Arc::clone(&store), Arc::clone(&transport));

        store
            .write()
            .await
            .add_element(CanvasElement::text("mine", 0.0, 0.0));
        autosave.save_now().await.unwrap();

        autosave.resolve_keep_server().await.unwrap();

        let store = store.read().await;
        assert_eq!(store.version(), 4);
        assert_eq!(store.elements().len(), 1);
        assert_eq!(store.save_status(), SaveStatus::Saved);
        assert!(!autosave.conflict_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolve_keep_local_resubmits_and_wins() {
        let store = test_store();
        let project_id = store.read().await.project_id();
        let transport = FakeTransport::new();
        transport.queue(ScriptedResponse::Conflict(server_project(project_id, 4)));
        let autosave = controller(Arc::clone(&store), Arc::clone(&transport));

        store
            .write()
            .await
            .add_element(CanvasElement::text("mine", 0.0, 0.0));
        autosave.save_now().await.unwrap();
        assert!(autosave.conflict_pending());

        autosave.resolve_keep_local().await.unwrap();

        // Resubmitted with the server's version as the new expected one
        assert_eq!(transport.call_count(), 2);
        assert_eq!(transport.last_call().expected_version, 4);
        assert_eq!(transport.last_call().elements.len(), 1);

        let store = store.read().await;
        assert_eq!(store.version(), 5);
        assert_eq!(store.save_status(), SaveStatus::Saved);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolve_without_conflict_errors() {
        let store = test_store();
        let transport = FakeTransport::new();
        let autosave = controller(store, transport);

        assert!(matches!(
            autosave.resolve_keep_server().await,
            Err(AutoSaveError::NoConflict)
        ));
        assert!(matches!(
            autosave.resolve_keep_local().await,
            Err(AutoSaveError::NoConflict)
        ));
    }
}
