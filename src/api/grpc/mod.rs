use std::time::Duration;

use tonic::transport::{Channel, Endpoint};
use tonic::Request;
use tracing::debug;

use crate::engine::sync::RemoteApi;
use crate::error::{AppError, RemoteError};
use crate::models::action::{PhotoUpload, StatusUpdate};

pub mod pb {
    tonic::include_proto!("field.v1");
}

use pb::field_service_client::FieldServiceClient;
use pb::{Ack, UpdateStatusRequest, UploadPhotoRequest};

/// Remote collaborator reached over gRPC. The channel connects lazily, so
/// an unreachable server only shows up as failed submissions.
#[derive(Clone)]
pub struct GrpcRemote {
    client: FieldServiceClient<Channel>,
}

impl GrpcRemote {
    pub fn connect_lazy(endpoint: &str, request_timeout: Duration) -> Result<Self, AppError> {
        let channel = Endpoint::from_shared(endpoint.to_string())
            .map_err(|err| AppError::Internal(format!("invalid remote endpoint {endpoint}: {err}")))?
            .connect_timeout(Duration::from_secs(5))
            .timeout(request_timeout)
            .connect_lazy();

        Ok(Self {
            client: FieldServiceClient::new(channel),
        })
    }
}

fn check_ack(ack: Ack) -> Result<(), RemoteError> {
    if ack.accepted {
        Ok(())
    } else {
        Err(RemoteError::Rejected(ack.message))
    }
}

pub fn status_request(update: &StatusUpdate) -> UpdateStatusRequest {
    UpdateStatusRequest {
        target_id: update.target_id.clone(),
        new_status: update.new_status.clone(),
        gps_coordinate: update
            .gps_fix
            .as_ref()
            .map(|fix| fix.coordinate.to_rpc_string()),
        notes: update.notes.clone(),
        idempotency_key: update.id.to_string(),
    }
}

pub fn photo_request(photo: &PhotoUpload) -> UploadPhotoRequest {
    UploadPhotoRequest {
        target_id: photo.target_id.clone(),
        photo_base64: photo.photo_bytes_base64.clone(),
        mime_type: photo.mime_type.clone(),
        idempotency_key: photo.id.to_string(),
    }
}

#[tonic::async_trait]
impl RemoteApi for GrpcRemote {
    async fn update_status(&self, update: &StatusUpdate) -> Result<(), RemoteError> {
        debug!(action_id = %update.id, target_id = %update.target_id, "sending status update");
        let mut client = self.client.clone();
        let response = client
            .update_status(Request::new(status_request(update)))
            .await?;
        check_ack(response.into_inner())
    }

    async fn upload_photo(&self, photo: &PhotoUpload) -> Result<(), RemoteError> {
        debug!(action_id = %photo.id, target_id = %photo.target_id, "uploading photo");
        let mut client = self.client.clone();
        let response = client
            .upload_photo(Request::new(photo_request(photo)))
            .await?;
        check_ack(response.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::{check_ack, photo_request, status_request};
    use crate::error::RemoteError;
    use crate::models::action::PendingAction;
    use crate::models::coordinate::{Coordinate, GpsFix};

    #[test]
    fn status_request_carries_coordinate_string_and_key() {
        let fix = GpsFix {
            coordinate: Coordinate {
                latitude: 40.7128,
                longitude: -74.006,
            },
            accuracy_meters: 9.0,
            captured_at: Utc::now(),
        };
        let action = PendingAction::status_update("del-3", "arrived", Some(fix), Some("dock 4".into()));
        let PendingAction::StatusUpdate(update) = &action else {
            unreachable!()
        };

        let request = status_request(update);
        assert_eq!(request.gps_coordinate.as_deref(), Some("40.712800,-74.006000"));
        assert_eq!(request.notes.as_deref(), Some("dock 4"));
        assert_eq!(request.idempotency_key, action.id().to_string());
    }

    #[test]
    fn photo_request_passes_payload_through() {
        let action = PendingAction::photo_upload("del-3", "aGk=".into(), "image/jpeg");
        let PendingAction::PhotoUpload(photo) = &action else {
            unreachable!()
        };

        let request = photo_request(photo);
        assert_eq!(request.photo_base64, "aGk=");
        assert_eq!(request.mime_type, "image/jpeg");
    }

    #[test]
    fn negative_ack_is_a_rejection() {
        let ack = super::Ack {
            accepted: false,
            message: "unknown delivery".into(),
        };
        assert!(matches!(check_ack(ack), Err(RemoteError::Rejected(_))));
    }

    #[test]
    fn status_codes_map_to_remote_errors() {
        let rejected: RemoteError = tonic::Status::invalid_argument("bad status").into();
        assert!(matches!(rejected, RemoteError::Rejected(_)));

        let transient: RemoteError = tonic::Status::unavailable("down").into();
        assert!(matches!(transient, RemoteError::Transport(_)));
    }
}
