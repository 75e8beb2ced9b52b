use serde::Serialize;
use uuid::Uuid;

/// Broadcast to UI listeners over the websocket.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    BecameOnline,
    BecameOffline,
    ActionQueued { action_id: Uuid, pending: usize },
    ActionSynced { action_id: Uuid, pending: usize },
    EntityInvalidated { target_id: String },
    QueueCleared { dropped: usize },
}
