use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio::time::timeout;
use tonic::codegen::http::Uri;
use tracing::{debug, info, warn};

use crate::engine::sync::{DrainReport, SyncEngine};
use crate::error::AppError;
use crate::models::event::EngineEvent;
use crate::observability::metrics::Metrics;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    BecameOnline,
    BecameOffline,
}

/// Current reachability flag. Repeated identical signals produce no
/// transition and no event.
pub struct NetworkState {
    online: AtomicBool,
    events_tx: broadcast::Sender<EngineEvent>,
    metrics: Metrics,
}

impl NetworkState {
    pub fn new(initial: bool, events_tx: broadcast::Sender<EngineEvent>, metrics: Metrics) -> Self {
        Self {
            online: AtomicBool::new(initial),
            events_tx,
            metrics,
        }
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::Acquire)
    }

    pub fn observe(&self, online: bool) -> Option<Transition> {
        let previous = self.online.swap(online, Ordering::AcqRel);
        if previous == online {
            return None;
        }

        let (transition, event, direction) = if online {
            (Transition::BecameOnline, EngineEvent::BecameOnline, "online")
        } else {
            (Transition::BecameOffline, EngineEvent::BecameOffline, "offline")
        };

        self.metrics
            .connectivity_transitions_total
            .with_label_values(&[direction])
            .inc();
        let _ = self.events_tx.send(event);
        info!(direction, "connectivity changed");

        Some(transition)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ConnectivityReport {
    pub online: bool,
    pub transition: Option<Transition>,
    pub drain: Option<DrainReport>,
}

/// Turns platform online/offline signals into transitions. A became-online
/// transition drains the queue before `report` returns.
pub struct ConnectivityMonitor {
    network: Arc<NetworkState>,
    sync: Arc<SyncEngine>,
}

impl ConnectivityMonitor {
    pub fn new(network: Arc<NetworkState>, sync: Arc<SyncEngine>) -> Self {
        Self { network, sync }
    }

    pub async fn report(&self, online: bool) -> ConnectivityReport {
        let transition = self.network.observe(online);

        let drain = match transition {
            Some(Transition::BecameOnline) => Some(self.sync.drain().await),
            _ => None,
        };

        ConnectivityReport {
            online: self.network.is_online(),
            transition,
            drain,
        }
    }
}

/// `host:port` of the remote endpoint, defaulting the port from the scheme.
pub fn probe_target(endpoint: &str) -> Result<String, AppError> {
    let uri: Uri = endpoint
        .parse()
        .map_err(|err| AppError::Internal(format!("invalid remote endpoint {endpoint}: {err}")))?;

    let host = uri
        .host()
        .ok_or_else(|| AppError::Internal(format!("remote endpoint {endpoint} has no host")))?;
    let port = uri.port_u16().unwrap_or(match uri.scheme_str() {
        Some("https") => 443,
        _ => 80,
    });

    Ok(format!("{host}:{port}"))
}

pub async fn is_reachable(target: &str, limit: Duration) -> bool {
    matches!(timeout(limit, TcpStream::connect(target)).await, Ok(Ok(_)))
}

/// Feeds the monitor from a periodic TCP reachability check of the remote.
pub async fn run_connectivity_probe(
    monitor: Arc<ConnectivityMonitor>,
    target: String,
    interval: Duration,
) {
    info!(probe = %target, interval_secs = interval.as_secs(), "connectivity probe started");

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let connect_limit = interval.min(Duration::from_secs(3));

    loop {
        ticker.tick().await;

        let reachable = is_reachable(&target, connect_limit).await;
        debug!(reachable, "connectivity probe");

        let report = monitor.report(reachable).await;
        if let Some(drain) = report.drain {
            if drain.stopped_on_failure {
                warn!(remaining = drain.remaining, "reconnect drain stopped on a failed action");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::sync::broadcast;

    use super::{probe_target, ConnectivityMonitor, NetworkState, Transition};
    use crate::engine::queue::ActionQueue;
    use crate::engine::store::MemoryStore;
    use crate::engine::sync::tests::ScriptedRemote;
    use crate::engine::sync::SyncEngine;
    use crate::models::action::PendingAction;
    use crate::models::event::EngineEvent;
    use crate::observability::metrics::Metrics;

    #[test]
    fn repeated_signals_do_not_emit_duplicate_events() {
        let (events_tx, mut events) = broadcast::channel(8);
        let network = NetworkState::new(true, events_tx, Metrics::new());

        assert_eq!(network.observe(true), None);
        assert_eq!(network.observe(false), Some(Transition::BecameOffline));
        assert_eq!(network.observe(false), None);
        assert_eq!(network.observe(true), Some(Transition::BecameOnline));

        assert_eq!(events.try_recv().unwrap(), EngineEvent::BecameOffline);
        assert_eq!(events.try_recv().unwrap(), EngineEvent::BecameOnline);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn coming_online_drains_before_returning() {
        let (events_tx, _) = broadcast::channel(8);
        let metrics = Metrics::new();
        let queue = Arc::new(ActionQueue::open(Arc::new(MemoryStore::new()), "q"));
        let network = Arc::new(NetworkState::new(false, events_tx.clone(), metrics.clone()));
        let remote = Arc::new(ScriptedRemote::default());
        let sync = Arc::new(SyncEngine::new(
            queue.clone(),
            remote.clone(),
            network.clone(),
            events_tx,
            metrics,
            Duration::from_secs(5),
        ));
        let monitor = ConnectivityMonitor::new(network, sync);

        queue
            .enqueue(PendingAction::status_update("del-1", "loaded", None, None))
            .unwrap();

        let report = monitor.report(true).await;

        assert_eq!(report.transition, Some(Transition::BecameOnline));
        assert_eq!(report.drain.unwrap().submitted, 1);
        assert!(queue.is_empty());

        let again = monitor.report(true).await;
        assert!(again.transition.is_none());
        assert!(again.drain.is_none());
    }

    #[test]
    fn probe_target_defaults_port_from_scheme() {
        assert_eq!(probe_target("http://10.0.0.2:50051").unwrap(), "10.0.0.2:50051");
        assert_eq!(probe_target("https://api.example.com").unwrap(), "api.example.com:443");
        assert!(probe_target("not a uri").is_err());
    }
}
