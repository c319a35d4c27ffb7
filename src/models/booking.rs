use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Assigned,
    Accepted,
    Arrived,
    WaitingStarted,
    Started,
    Completed,
    Cancelled,
    NoShowRequested,
    NoShowConfirmed,
    AutoReleased,
}

impl BookingStatus {
    /// Statuses that must carry a driver binding.
    pub fn is_driver_bound(self) -> bool {
        matches!(
            self,
            Self::Assigned | Self::Accepted | Self::Arrived | Self::WaitingStarted | Self::Started
        )
    }

    /// Terminal statuses freeze the booking; only reads are allowed afterwards.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Cancelled | Self::NoShowConfirmed | Self::AutoReleased
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum BookingSource {
    Direct,
    Partner,
    Manual,
    Phone,
    Api,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum ServiceType {
    Standard,
    Executive,
    Shuttle,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VehicleType {
    Sedan,
    Van,
    Minibus,
    Executive,
}

/// What the booking needs from the vehicle. `vehicle_type: None` means any type.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct VehicleRequirement {
    pub vehicle_type: Option<VehicleType>,
    pub min_capacity: Option<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stop {
    pub address: String,
    pub point: GeoPoint,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BookingNotes {
    pub passenger: Option<String>,
    pub driver: Option<String>,
    pub admin: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    pub reference: String,
    pub status: BookingStatus,
    pub source: BookingSource,
    pub passenger_name: String,
    pub passenger_phone: String,
    pub pickup: Stop,
    pub dropoff: Option<Stop>,
    /// `None` means an ASAP booking.
    pub scheduled_pickup_time: Option<DateTime<Utc>>,
    pub service_type: ServiceType,
    pub requirement: VehicleRequirement,
    pub fare_estimate: Option<f64>,
    pub fare_final: Option<f64>,
    pub assigned_driver: Option<Uuid>,
    pub notes: BookingNotes,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    /// Human-readable reference handed to passengers and partners.
    pub fn generate_reference(now: DateTime<Utc>) -> String {
        let suffix = Uuid::new_v4().simple().to_string();
        format!(
            "TX-{}-{}",
            now.timestamp_millis(),
            suffix[..5].to_uppercase()
        )
    }
}
