use std::sync::Arc;

use tokio::sync::broadcast;

use crate::config::Config;
use crate::engine::connectivity::{ConnectivityMonitor, NetworkState};
use crate::engine::controller::StatusController;
use crate::engine::gps::{FixOptions, GpsProvider, LocationWatch};
use crate::engine::queue::ActionQueue;
use crate::engine::store::KeyValueStore;
use crate::engine::sync::{RemoteApi, SyncEngine};
use crate::models::event::EngineEvent;
use crate::observability::metrics::Metrics;

pub struct AppState {
    pub queue: Arc<ActionQueue>,
    pub network: Arc<NetworkState>,
    pub sync: Arc<SyncEngine>,
    pub monitor: Arc<ConnectivityMonitor>,
    pub controller: StatusController,
    pub location: LocationWatch,
    pub events_tx: broadcast::Sender<EngineEvent>,
    pub metrics: Metrics,
    pub accuracy_threshold_m: f64,
    pub max_photo_bytes: usize,
}

impl AppState {
    pub fn new(
        config: &Config,
        store: Arc<dyn KeyValueStore>,
        remote: Arc<dyn RemoteApi>,
        gps: Arc<dyn GpsProvider>,
    ) -> Self {
        let (events_tx, _unused_rx) = broadcast::channel(config.event_buffer_size);
        let metrics = Metrics::new();

        let queue = Arc::new(ActionQueue::open(store, config.queue_storage_key.clone()));
        metrics.pending_actions.set(queue.len() as i64);

        let network = Arc::new(NetworkState::new(
            config.start_online,
            events_tx.clone(),
            metrics.clone(),
        ));
        let sync = Arc::new(SyncEngine::new(
            queue.clone(),
            remote,
            network.clone(),
            events_tx.clone(),
            metrics.clone(),
            config.submit_timeout,
        ));
        let monitor = Arc::new(ConnectivityMonitor::new(network.clone(), sync.clone()));
        let controller = StatusController::new(
            queue.clone(),
            sync.clone(),
            network.clone(),
            gps,
            events_tx.clone(),
            metrics.clone(),
            FixOptions {
                timeout: config.gps_timeout,
                max_age: config.max_fix_age,
            },
        );

        Self {
            queue,
            network,
            sync,
            monitor,
            controller,
            location: LocationWatch::new(),
            events_tx,
            metrics,
            accuracy_threshold_m: config.gps_accuracy_threshold_m,
            max_photo_bytes: config.max_photo_bytes,
        }
    }
}
