use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::audit::EventType;
use crate::models::booking::Booking;
use crate::models::driver::PositionFix;

/// One event per successful mutation, fanned out to real-time subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum DomainEvent {
    BookingCreated { booking: Booking },
    BookingUpdated { booking: Booking, event: EventType },
    DriverLocation { driver_id: Uuid, fix: PositionFix },
}
