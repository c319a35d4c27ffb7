use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::booking::{GeoPoint, VehicleType};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Availability {
    Available,
    Busy,
    OnBreak,
    Offline,
}

impl Availability {
    pub fn is_busy(self) -> bool {
        matches!(self, Self::Busy)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vehicle {
    pub plate: String,
    pub vehicle_type: VehicleType,
    pub capacity: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Suspension {
    pub reason: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Suspension {
    /// A suspension with no expiry is indefinite.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(true, |expiry| expiry > now)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Driver {
    pub id: Uuid,
    pub name: String,
    pub phone: String,
    pub vehicle: Vehicle,
    pub availability: Availability,
    pub current_booking: Option<Uuid>,
    pub suspension: Option<Suspension>,
    /// Verdict supplied by the compliance collaborator; not computed here.
    pub compliance_ok: bool,
    pub total_offers: u64,
    pub accepted_offers: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Driver {
    pub fn is_suspended(&self, now: DateTime<Utc>) -> bool {
        self.suspension
            .as_ref()
            .is_some_and(|suspension| suspension.is_active(now))
    }

    /// What consumers see: an actively suspended driver reads as offline
    /// regardless of the stored availability value.
    pub fn effective_availability(&self, now: DateTime<Utc>) -> Availability {
        if self.is_suspended(now) {
            Availability::Offline
        } else {
            self.availability
        }
    }

    pub fn acceptance_rate(&self) -> f64 {
        if self.total_offers == 0 {
            return 0.0;
        }
        self.accepted_offers as f64 / self.total_offers as f64
    }
}

/// Latest telemetry fix for a driver. Kept out of the `Driver` record so a
/// flood of pings never contends with availability or binding writes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionFix {
    pub point: GeoPoint,
    pub heading: Option<f64>,
    pub speed_kmh: Option<f64>,
    pub recorded_at: DateTime<Utc>,
}

impl PositionFix {
    pub fn is_stale(&self, now: DateTime<Utc>, threshold: chrono::Duration) -> bool {
        now - self.recorded_at > threshold
    }
}
