use dashmap::DashMap;
use uuid::Uuid;

use crate::models::audit::AuditEntry;

/// Append-only per-booking timeline. Entries are never updated or removed;
/// order within a booking is insertion order, which the callers guarantee to
/// be time order by holding the booking's entry lock while appending.
#[derive(Default)]
pub struct AuditLog {
    entries: DashMap<Uuid, Vec<AuditEntry>>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, entry: AuditEntry) {
        self.entries.entry(entry.booking_id).or_default().push(entry);
    }

    /// Ordered snapshot of a booking's timeline. Empty for unknown bookings.
    pub fn timeline_for(&self, booking_id: Uuid) -> Vec<AuditEntry> {
        self.entries
            .get(&booking_id)
            .map(|timeline| timeline.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.entries.iter().map(|entry| entry.value().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
