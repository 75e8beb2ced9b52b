use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

use crate::engine::connectivity::NetworkState;
use crate::engine::gps::{acquire_fresh_fix, FixOptions, GpsProvider};
use crate::engine::queue::ActionQueue;
use crate::engine::sync::SyncEngine;
use crate::error::AppError;
use crate::models::action::PendingAction;
use crate::models::delivery::{DeliveryStatus, TransitionOutcome, TransitionReceipt};
use crate::models::event::EngineEvent;
use crate::observability::metrics::Metrics;

#[derive(Debug, Clone)]
pub struct TransitionRequest {
    pub target_id: String,
    pub new_status: String,
    pub notes: Option<String>,
}

/// Dispatches field actions: fresh GPS fix, then direct submission when
/// online or the durable queue when not. Dispatches run one at a time so the
/// remote sees actions in capture order. Transition order is advisory only.
pub struct StatusController {
    queue: Arc<ActionQueue>,
    sync: Arc<SyncEngine>,
    network: Arc<NetworkState>,
    gps: Arc<dyn GpsProvider>,
    events_tx: broadcast::Sender<EngineEvent>,
    metrics: Metrics,
    fix_options: FixOptions,
    dispatch_lock: Mutex<()>,
}

impl StatusController {
    pub fn new(
        queue: Arc<ActionQueue>,
        sync: Arc<SyncEngine>,
        network: Arc<NetworkState>,
        gps: Arc<dyn GpsProvider>,
        events_tx: broadcast::Sender<EngineEvent>,
        metrics: Metrics,
        fix_options: FixOptions,
    ) -> Self {
        Self {
            queue,
            sync,
            network,
            gps,
            events_tx,
            metrics,
            fix_options,
            dispatch_lock: Mutex::new(()),
        }
    }

    pub async fn request_transition(
        &self,
        request: TransitionRequest,
    ) -> Result<TransitionReceipt, AppError> {
        let gps = self.gps.clone();
        self.request_transition_with(request, gps.as_ref()).await
    }

    pub async fn request_transition_with(
        &self,
        request: TransitionRequest,
        gps: &dyn GpsProvider,
    ) -> Result<TransitionReceipt, AppError> {
        let TransitionRequest {
            target_id,
            new_status,
            notes,
        } = request;

        if target_id.trim().is_empty() {
            return Err(AppError::BadRequest("target id must not be empty".into()));
        }
        if new_status.trim().is_empty() {
            return Err(AppError::BadRequest("status must not be empty".into()));
        }

        let mut warnings = self.advisory_warnings(&target_id, &new_status);

        let gps_fix = match acquire_fresh_fix(gps, &self.fix_options).await {
            Ok(fix) => Some(fix),
            Err(err) => {
                warn!(target_id = %target_id, error = %err, "recording transition without gps fix");
                warnings.push(format!("recorded without location: {err}"));
                None
            }
        };

        let action = PendingAction::status_update(target_id, new_status, gps_fix, notes);
        self.dispatch(action, warnings).await
    }

    pub async fn capture_photo(
        &self,
        target_id: &str,
        photo: &[u8],
        mime_type: &str,
    ) -> Result<TransitionReceipt, AppError> {
        if target_id.trim().is_empty() {
            return Err(AppError::BadRequest("target id must not be empty".into()));
        }
        if photo.is_empty() {
            return Err(AppError::BadRequest("photo must not be empty".into()));
        }
        if mime_type.trim().is_empty() {
            return Err(AppError::BadRequest("mime type must not be empty".into()));
        }

        let action = PendingAction::photo_upload(target_id, STANDARD.encode(photo), mime_type);
        self.dispatch(action, Vec::new()).await
    }

    async fn dispatch(
        &self,
        action: PendingAction,
        mut warnings: Vec<String>,
    ) -> Result<TransitionReceipt, AppError> {
        let action_id = action.id();
        let _serial = self.dispatch_lock.lock().await;

        if !self.network.is_online() {
            self.enqueue(action)?;
            return Ok(receipt(action_id, TransitionOutcome::Enqueued, warnings));
        }

        // Older actions are still waiting: go behind them so the remote sees
        // them in capture order.
        if !self.queue.is_empty() {
            self.enqueue(action)?;
            self.sync.drain().await;
            let outcome = if self.queue.contains(action_id) {
                TransitionOutcome::Enqueued
            } else {
                TransitionOutcome::Submitted
            };
            return Ok(receipt(action_id, outcome, warnings));
        }

        match self.sync.submit(&action).await {
            Ok(()) => Ok(receipt(action_id, TransitionOutcome::Submitted, warnings)),
            Err(err) => {
                warnings.push(format!("queued for retry: {err}"));
                self.enqueue(action)?;
                Ok(receipt(action_id, TransitionOutcome::Enqueued, warnings))
            }
        }
    }

    fn enqueue(&self, action: PendingAction) -> Result<(), AppError> {
        let action_id = action.id();
        let target_id = action.target_id().to_string();
        let kind = action.kind();

        let pending = self.queue.enqueue(action)?;
        self.metrics.pending_actions.set(pending as i64);
        let _ = self
            .events_tx
            .send(EngineEvent::ActionQueued { action_id, pending });

        info!(action_id = %action_id, target_id = %target_id, kind, pending, "action queued");
        Ok(())
    }

    fn advisory_warnings(&self, target_id: &str, new_status: &str) -> Vec<String> {
        let Ok(requested) = new_status.parse::<DeliveryStatus>() else {
            debug!(target_id, new_status, "status outside the delivery workflow");
            return Vec::new();
        };
        let Some(view) = self.sync.delivery_view(target_id) else {
            return Vec::new();
        };

        if view.confirmed_status.permits(requested) {
            return Vec::new();
        }

        warn!(
            target_id,
            from = %view.confirmed_status,
            to = %requested,
            "out-of-order transition requested"
        );
        vec![format!(
            "transition {} -> {} is out of order",
            view.confirmed_status, requested
        )]
    }
}

fn receipt(
    action_id: uuid::Uuid,
    outcome: TransitionOutcome,
    warnings: Vec<String>,
) -> TransitionReceipt {
    TransitionReceipt {
        action_id,
        outcome,
        warnings,
    }
}
