use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::engine::connectivity::NetworkState;
use crate::engine::queue::ActionQueue;
use crate::error::RemoteError;
use crate::models::action::{PendingAction, PhotoUpload, StatusUpdate};
use crate::models::delivery::{DeliveryStatus, DeliveryView};
use crate::models::event::EngineEvent;
use crate::observability::metrics::Metrics;
use crate::state::AppState;

/// The remote collaborator. Each call is one RPC; the action id travels as
/// an idempotency key.
#[tonic::async_trait]
pub trait RemoteApi: Send + Sync {
    async fn update_status(&self, update: &StatusUpdate) -> Result<(), RemoteError>;
    async fn upload_photo(&self, photo: &PhotoUpload) -> Result<(), RemoteError>;
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct DrainReport {
    pub submitted: usize,
    pub remaining: usize,
    pub stopped_on_failure: bool,
    pub skipped: bool,
}

pub struct SyncEngine {
    queue: Arc<ActionQueue>,
    remote: Arc<dyn RemoteApi>,
    network: Arc<NetworkState>,
    confirmed: DashMap<String, DeliveryView>,
    events_tx: broadcast::Sender<EngineEvent>,
    metrics: Metrics,
    submit_timeout: Duration,
    draining: AtomicBool,
}

struct DrainGuard<'a>(&'a AtomicBool);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl SyncEngine {
    pub fn new(
        queue: Arc<ActionQueue>,
        remote: Arc<dyn RemoteApi>,
        network: Arc<NetworkState>,
        events_tx: broadcast::Sender<EngineEvent>,
        metrics: Metrics,
        submit_timeout: Duration,
    ) -> Self {
        Self {
            queue,
            remote,
            network,
            confirmed: DashMap::new(),
            events_tx,
            metrics,
            submit_timeout,
            draining: AtomicBool::new(false),
        }
    }

    /// Dispatches exactly one RPC for `action`. Never touches the queue.
    pub async fn submit(&self, action: &PendingAction) -> Result<(), RemoteError> {
        let kind = action.kind();
        let start = Instant::now();

        let call = async {
            match action {
                PendingAction::StatusUpdate(update) => self.remote.update_status(update).await,
                PendingAction::PhotoUpload(photo) => self.remote.upload_photo(photo).await,
            }
        };

        let result = match timeout(self.submit_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(RemoteError::Timeout(self.submit_timeout)),
        };

        self.metrics
            .submit_latency_seconds
            .with_label_values(&[kind])
            .observe(start.elapsed().as_secs_f64());

        match &result {
            Ok(()) => {
                self.metrics
                    .actions_submitted_total
                    .with_label_values(&[kind, "success"])
                    .inc();
                self.on_confirmed(action);
                info!(
                    action_id = %action.id(),
                    target_id = action.target_id(),
                    kind,
                    "action submitted"
                );
            }
            Err(err) => {
                self.metrics
                    .actions_submitted_total
                    .with_label_values(&[kind, "error"])
                    .inc();
                warn!(
                    action_id = %action.id(),
                    target_id = action.target_id(),
                    kind,
                    error = %err,
                    "action submission failed"
                );
            }
        }

        result
    }

    /// Replays the queue head-first. Stops at the first failure and leaves the
    /// failed action, and everything behind it, queued. Concurrent calls while
    /// a drain is running return immediately with `skipped` set.
    pub async fn drain(&self) -> DrainReport {
        if !self.network.is_online() {
            debug!("drain skipped: offline");
            return self.skipped_report();
        }

        if self
            .draining
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("drain skipped: already running");
            return self.skipped_report();
        }
        let _guard = DrainGuard(&self.draining);

        let mut report = DrainReport::default();

        while self.network.is_online() {
            let Some(head) = self.queue.peek_head() else {
                break;
            };

            if self.submit(&head).await.is_err() {
                report.stopped_on_failure = true;
                break;
            }

            match self.queue.remove_head_if(head.id()) {
                Ok(_) => {
                    report.submitted += 1;
                    let pending = self.queue.len();
                    self.metrics.pending_actions.set(pending as i64);
                    let _ = self.events_tx.send(EngineEvent::ActionSynced {
                        action_id: head.id(),
                        pending,
                    });
                }
                Err(err) => {
                    // The action stays queued and is sent again next drain.
                    error!(action_id = %head.id(), error = %err, "failed to remove synced action");
                    report.stopped_on_failure = true;
                    break;
                }
            }
        }

        report.remaining = self.queue.len();
        self.metrics.pending_actions.set(report.remaining as i64);

        let result = if report.stopped_on_failure {
            "stopped"
        } else {
            "completed"
        };
        self.metrics.drains_total.with_label_values(&[result]).inc();

        if report.submitted > 0 || report.stopped_on_failure {
            info!(
                submitted = report.submitted,
                remaining = report.remaining,
                stopped_on_failure = report.stopped_on_failure,
                "queue drain finished"
            );
        }

        report
    }

    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::Acquire)
    }

    pub fn delivery_view(&self, target_id: &str) -> Option<DeliveryView> {
        self.confirmed
            .get(target_id)
            .map(|entry| entry.value().clone())
    }

    fn on_confirmed(&self, action: &PendingAction) {
        if let PendingAction::StatusUpdate(update) = action {
            if let Ok(status) = update.new_status.parse::<DeliveryStatus>() {
                self.confirmed.insert(
                    update.target_id.clone(),
                    DeliveryView {
                        target_id: update.target_id.clone(),
                        confirmed_status: status,
                        next_status: status.next(),
                        confirmed_at: Utc::now(),
                    },
                );
            }
        }

        let _ = self.events_tx.send(EngineEvent::EntityInvalidated {
            target_id: action.target_id().to_string(),
        });
    }

    fn skipped_report(&self) -> DrainReport {
        DrainReport {
            remaining: self.queue.len(),
            skipped: true,
            ..DrainReport::default()
        }
    }
}

/// Periodic retry so queued actions are not stuck waiting for the next
/// reconnect when a drain stopped on a failure.
pub async fn run_sync_loop(state: Arc<AppState>, interval: Duration) {
    info!(interval_secs = interval.as_secs(), "sync retry loop started");

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        if state.network.is_online() && !state.queue.is_empty() {
            state.sync.drain().await;
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::HashSet;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use tokio::sync::{broadcast, Notify};
    use uuid::Uuid;

    use super::{RemoteApi, SyncEngine};
    use crate::engine::connectivity::NetworkState;
    use crate::engine::queue::ActionQueue;
    use crate::engine::store::MemoryStore;
    use crate::error::RemoteError;
    use crate::models::action::{PendingAction, PhotoUpload, StatusUpdate};
    use crate::models::delivery::DeliveryStatus;
    use crate::models::event::EngineEvent;
    use crate::observability::metrics::Metrics;

    /// Records every attempted action id; ids in `failing` are rejected.
    #[derive(Default)]
    pub(crate) struct ScriptedRemote {
        pub attempts: Mutex<Vec<Uuid>>,
        pub failing: Mutex<HashSet<Uuid>>,
        pub fail_all: Mutex<bool>,
        pub gate: Option<Arc<Notify>>,
    }

    impl ScriptedRemote {
        pub(crate) fn fail(&self, id: Uuid) {
            self.failing.lock().unwrap().insert(id);
        }

        pub(crate) fn attempted(&self) -> Vec<Uuid> {
            self.attempts.lock().unwrap().clone()
        }

        async fn call(&self, id: Uuid) -> Result<(), RemoteError> {
            self.attempts.lock().unwrap().push(id);
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            if *self.fail_all.lock().unwrap() || self.failing.lock().unwrap().contains(&id) {
                return Err(RemoteError::Transport("connection reset".into()));
            }
            Ok(())
        }
    }

    #[tonic::async_trait]
    impl RemoteApi for ScriptedRemote {
        async fn update_status(&self, update: &StatusUpdate) -> Result<(), RemoteError> {
            self.call(update.id).await
        }

        async fn upload_photo(&self, photo: &PhotoUpload) -> Result<(), RemoteError> {
            self.call(photo.id).await
        }
    }

    fn engine_with(remote: Arc<ScriptedRemote>, online: bool) -> (Arc<SyncEngine>, Arc<ActionQueue>) {
        let (events_tx, _) = broadcast::channel(64);
        let metrics = Metrics::new();
        let queue = Arc::new(ActionQueue::open(Arc::new(MemoryStore::new()), "q"));
        let network = Arc::new(NetworkState::new(online, events_tx.clone(), metrics.clone()));
        let engine = SyncEngine::new(
            queue.clone(),
            remote,
            network,
            events_tx,
            metrics,
            Duration::from_secs(5),
        );
        (Arc::new(engine), queue)
    }

    fn status(target: &str, status: &str) -> PendingAction {
        PendingAction::status_update(target, status, None, None)
    }

    #[tokio::test]
    async fn drain_stops_on_failure_without_attempting_later_actions() {
        let remote = Arc::new(ScriptedRemote::default());
        let (engine, queue) = engine_with(remote.clone(), true);
        let a = status("del-1", "loaded");
        let b = PendingAction::photo_upload("del-1", "aGk=".into(), "image/jpeg");
        queue.enqueue(a.clone()).unwrap();
        queue.enqueue(b.clone()).unwrap();
        remote.fail(a.id());

        let report = engine.drain().await;

        assert!(report.stopped_on_failure);
        assert_eq!(report.submitted, 0);
        assert_eq!(queue.snapshot(), vec![a.clone(), b]);
        assert_eq!(remote.attempted(), vec![a.id()]);
    }

    #[tokio::test]
    async fn drain_removes_successful_head_and_keeps_failed_one() {
        let remote = Arc::new(ScriptedRemote::default());
        let (engine, queue) = engine_with(remote.clone(), true);
        let a = status("del-1", "loaded");
        let b = status("del-1", "en_route");
        queue.enqueue(a.clone()).unwrap();
        queue.enqueue(b.clone()).unwrap();
        remote.fail(b.id());

        let report = engine.drain().await;

        assert_eq!(report.submitted, 1);
        assert_eq!(report.remaining, 1);
        assert_eq!(queue.snapshot(), vec![b]);
    }

    #[tokio::test]
    async fn drain_resumes_from_the_same_head() {
        let remote = Arc::new(ScriptedRemote::default());
        let (engine, queue) = engine_with(remote.clone(), true);
        let a = status("del-1", "loaded");
        let b = status("del-1", "en_route");
        queue.enqueue(a.clone()).unwrap();
        queue.enqueue(b.clone()).unwrap();
        *remote.fail_all.lock().unwrap() = true;

        engine.drain().await;
        *remote.fail_all.lock().unwrap() = false;
        let report = engine.drain().await;

        assert_eq!(report.submitted, 2);
        assert!(queue.is_empty());
        assert_eq!(remote.attempted(), vec![a.id(), a.id(), b.id()]);
    }

    #[tokio::test]
    async fn drain_is_a_noop_while_offline() {
        let remote = Arc::new(ScriptedRemote::default());
        let (engine, queue) = engine_with(remote.clone(), false);
        queue.enqueue(status("del-1", "loaded")).unwrap();

        let report = engine.drain().await;

        assert!(report.skipped);
        assert_eq!(report.remaining, 1);
        assert!(remote.attempted().is_empty());
    }

    #[tokio::test]
    async fn concurrent_drain_is_single_flight() {
        let gate = Arc::new(Notify::new());
        let remote = Arc::new(ScriptedRemote {
            gate: Some(gate.clone()),
            ..ScriptedRemote::default()
        });
        let (engine, queue) = engine_with(remote.clone(), true);
        queue.enqueue(status("del-1", "loaded")).unwrap();

        let first = tokio::spawn({
            let engine = engine.clone();
            async move { engine.drain().await }
        });
        while remote.attempted().is_empty() {
            tokio::task::yield_now().await;
        }

        let second = engine.drain().await;
        assert!(second.skipped);
        assert!(engine.is_draining());

        gate.notify_one();
        let first = first.await.unwrap();
        assert_eq!(first.submitted, 1);
        assert_eq!(remote.attempted().len(), 1);
        assert!(!engine.is_draining());
    }

    #[tokio::test]
    async fn successful_status_update_invalidates_and_records_view() {
        let remote = Arc::new(ScriptedRemote::default());
        let (engine, _queue) = engine_with(remote, true);
        let mut events = engine.events_tx.subscribe();

        engine.submit(&status("del-7", "arrived")).await.unwrap();

        let view = engine.delivery_view("del-7").unwrap();
        assert_eq!(view.confirmed_status, DeliveryStatus::Arrived);
        assert_eq!(view.next_status, Some(DeliveryStatus::Delivered));
        assert_eq!(
            events.recv().await.unwrap(),
            EngineEvent::EntityInvalidated {
                target_id: "del-7".into()
            }
        );
    }

    struct HangingRemote;

    #[tonic::async_trait]
    impl RemoteApi for HangingRemote {
        async fn update_status(&self, _update: &StatusUpdate) -> Result<(), RemoteError> {
            std::future::pending().await
        }

        async fn upload_photo(&self, _photo: &PhotoUpload) -> Result<(), RemoteError> {
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn hung_submission_times_out() {
        let (events_tx, _) = broadcast::channel(8);
        let metrics = Metrics::new();
        let queue = Arc::new(ActionQueue::open(Arc::new(MemoryStore::new()), "q"));
        let network = Arc::new(NetworkState::new(true, events_tx.clone(), metrics.clone()));
        let engine = SyncEngine::new(
            queue,
            Arc::new(HangingRemote),
            network,
            events_tx,
            metrics,
            Duration::from_secs(3),
        );

        let result = engine.submit(&status("del-1", "loaded")).await;
        assert!(matches!(result, Err(RemoteError::Timeout(_))));
    }
}
