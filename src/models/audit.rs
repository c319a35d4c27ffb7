use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Every name a booking timeline entry can carry. `AdminOverride` rides along
/// with the lifecycle event whenever an administrator forces an edge.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    BookingCreated,
    DriverAssigned,
    BookingAccepted,
    DriverArrived,
    WaitingStarted,
    TripStarted,
    TripCompleted,
    BookingCancelled,
    DriverRejected,
    NoShowRequested,
    NoShowConfirmed,
    AutoReleased,
    AdminOverride,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "kind", content = "id")]
pub enum Actor {
    System,
    Driver(Uuid),
    Admin(Uuid),
    Partner(Uuid),
}

impl Actor {
    pub fn is_admin(self) -> bool {
        matches!(self, Self::Admin(_))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub booking_id: Uuid,
    pub event: EventType,
    pub actor: Actor,
    pub details: Option<Value>,
    pub reason: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(booking_id: Uuid, event: EventType, actor: Actor) -> Self {
        Self {
            booking_id,
            event,
            actor,
            details: None,
            reason: None,
            recorded_at: Utc::now(),
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}
