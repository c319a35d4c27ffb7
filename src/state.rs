use chrono::Duration;
use dashmap::DashMap;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::engine::audit::AuditLog;
use crate::models::booking::Booking;
use crate::models::driver::{Driver, PositionFix};
use crate::models::event::DomainEvent;
use crate::observability::metrics::Metrics;

pub struct AppState {
    pub bookings: DashMap<Uuid, Booking>,
    pub drivers: DashMap<Uuid, Driver>,
    /// Telemetry lives apart from the driver records so that the periodic
    /// location stream never contends with availability or binding writes.
    pub positions: DashMap<Uuid, PositionFix>,
    pub audit: AuditLog,
    pub events_tx: broadcast::Sender<DomainEvent>,
    pub staleness_threshold: Duration,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(event_buffer_size: usize, staleness_seconds: i64) -> Self {
        let (events_tx, _unused_rx) = broadcast::channel(event_buffer_size);

        Self {
            bookings: DashMap::new(),
            drivers: DashMap::new(),
            positions: DashMap::new(),
            audit: AuditLog::new(),
            events_tx,
            staleness_threshold: Duration::seconds(staleness_seconds),
            metrics: Metrics::new(),
        }
    }

    pub fn emit(&self, event: DomainEvent) {
        // Nobody listening is fine; the broadcast port is best-effort.
        let _ = self.events_tx.send(event);
    }
}
