use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::coordinate::GpsFix;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusUpdate {
    pub id: Uuid,
    pub target_id: String,
    pub new_status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gps_fix: Option<GpsFix>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PhotoUpload {
    pub id: Uuid,
    pub target_id: String,
    pub photo_bytes_base64: String,
    pub mime_type: String,
    pub created_at: DateTime<Utc>,
}

/// A remote action captured on the device and not yet confirmed by the server.
/// Entries are never edited after creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PendingAction {
    StatusUpdate(StatusUpdate),
    PhotoUpload(PhotoUpload),
}

impl PendingAction {
    pub fn status_update(
        target_id: impl Into<String>,
        new_status: impl Into<String>,
        gps_fix: Option<GpsFix>,
        notes: Option<String>,
    ) -> Self {
        PendingAction::StatusUpdate(StatusUpdate {
            id: Uuid::new_v4(),
            target_id: target_id.into(),
            new_status: new_status.into(),
            gps_fix,
            notes,
            created_at: Utc::now(),
        })
    }

    pub fn photo_upload(
        target_id: impl Into<String>,
        photo_bytes_base64: String,
        mime_type: impl Into<String>,
    ) -> Self {
        PendingAction::PhotoUpload(PhotoUpload {
            id: Uuid::new_v4(),
            target_id: target_id.into(),
            photo_bytes_base64,
            mime_type: mime_type.into(),
            created_at: Utc::now(),
        })
    }

    pub fn id(&self) -> Uuid {
        match self {
            PendingAction::StatusUpdate(update) => update.id,
            PendingAction::PhotoUpload(photo) => photo.id,
        }
    }

    pub fn target_id(&self) -> &str {
        match self {
            PendingAction::StatusUpdate(update) => &update.target_id,
            PendingAction::PhotoUpload(photo) => &photo.target_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            PendingAction::StatusUpdate(_) => "status_update",
            PendingAction::PhotoUpload(_) => "photo_upload",
        }
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        match self {
            PendingAction::StatusUpdate(update) => update.created_at,
            PendingAction::PhotoUpload(photo) => photo.created_at,
        }
    }

    pub fn summary(&self) -> ActionSummary {
        ActionSummary {
            id: self.id(),
            kind: self.kind(),
            target_id: self.target_id().to_string(),
            created_at: self.created_at(),
        }
    }
}

/// Queue listing entry without the photo payload.
#[derive(Debug, Clone, Serialize)]
pub struct ActionSummary {
    pub id: Uuid,
    pub kind: &'static str,
    pub target_id: String,
    pub created_at: DateTime<Utc>,
}
