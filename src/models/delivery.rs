use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Scheduled,
    Loaded,
    EnRoute,
    Arrived,
    Delivered,
    Returning,
    Completed,
    Cancelled,
}

const WORKFLOW: [DeliveryStatus; 7] = [
    DeliveryStatus::Scheduled,
    DeliveryStatus::Loaded,
    DeliveryStatus::EnRoute,
    DeliveryStatus::Arrived,
    DeliveryStatus::Delivered,
    DeliveryStatus::Returning,
    DeliveryStatus::Completed,
];

impl DeliveryStatus {
    /// Ordered workflow statuses; `Cancelled` sits outside the order.
    pub fn all() -> &'static [DeliveryStatus] {
        &WORKFLOW
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Scheduled => "scheduled",
            DeliveryStatus::Loaded => "loaded",
            DeliveryStatus::EnRoute => "en_route",
            DeliveryStatus::Arrived => "arrived",
            DeliveryStatus::Delivered => "delivered",
            DeliveryStatus::Returning => "returning",
            DeliveryStatus::Completed => "completed",
            DeliveryStatus::Cancelled => "cancelled",
        }
    }

    pub fn next(&self) -> Option<DeliveryStatus> {
        let position = WORKFLOW.iter().position(|status| status == self)?;
        WORKFLOW.get(position + 1).copied()
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, DeliveryStatus::Completed | DeliveryStatus::Cancelled)
    }

    /// Whether moving from `self` to `to` follows the workflow. Cancelling is
    /// allowed from any non-terminal status.
    pub fn permits(&self, to: DeliveryStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        to == DeliveryStatus::Cancelled || self.next() == Some(to)
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStatus(pub String);

impl fmt::Display for UnknownStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown delivery status '{}'", self.0)
    }
}

impl FromStr for DeliveryStatus {
    type Err = UnknownStatus;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        WORKFLOW
            .iter()
            .chain(std::iter::once(&DeliveryStatus::Cancelled))
            .find(|status| status.as_str() == raw)
            .copied()
            .ok_or_else(|| UnknownStatus(raw.to_string()))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransitionOutcome {
    Enqueued,
    Submitted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionReceipt {
    pub action_id: Uuid,
    pub outcome: TransitionOutcome,
    pub warnings: Vec<String>,
}

/// Last status the remote side confirmed for a delivery, kept for the UI's
/// "next step" button.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryView {
    pub target_id: String,
    pub confirmed_status: DeliveryStatus,
    pub next_status: Option<DeliveryStatus>,
    pub confirmed_at: DateTime<Utc>,
}
