use chrono::Utc;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::audit::{Actor, AuditEntry, EventType};
use crate::models::booking::{Booking, BookingStatus};
use crate::models::driver::Availability;
use crate::models::event::DomainEvent;
use crate::state::AppState;

/// One row of the legal transition graph. The admin and driver front-ends of
/// the predecessor system each carried a partial copy of this table; this is
/// the single authoritative one.
#[derive(Debug, Clone, Copy)]
pub struct Edge {
    pub from: BookingStatus,
    pub to: BookingStatus,
    pub requires_reason: bool,
}

use BookingStatus::*;

pub const TRANSITIONS: &[Edge] = &[
    Edge { from: Pending, to: Assigned, requires_reason: false },
    Edge { from: Pending, to: Cancelled, requires_reason: true },
    Edge { from: Assigned, to: Accepted, requires_reason: false },
    Edge { from: Assigned, to: Pending, requires_reason: false },
    Edge { from: Assigned, to: AutoReleased, requires_reason: false },
    Edge { from: Assigned, to: Cancelled, requires_reason: true },
    Edge { from: Accepted, to: Arrived, requires_reason: false },
    Edge { from: Accepted, to: Cancelled, requires_reason: true },
    Edge { from: Arrived, to: WaitingStarted, requires_reason: false },
    Edge { from: Arrived, to: Cancelled, requires_reason: true },
    Edge { from: WaitingStarted, to: Started, requires_reason: false },
    Edge { from: WaitingStarted, to: NoShowRequested, requires_reason: false },
    Edge { from: Started, to: Completed, requires_reason: false },
    Edge { from: NoShowRequested, to: NoShowConfirmed, requires_reason: false },
    Edge { from: NoShowRequested, to: Cancelled, requires_reason: true },
];

pub fn edge(from: BookingStatus, to: BookingStatus) -> Option<&'static Edge> {
    TRANSITIONS
        .iter()
        .find(|edge| edge.from == from && edge.to == to)
}

pub fn allowed_targets(from: BookingStatus) -> Vec<BookingStatus> {
    TRANSITIONS
        .iter()
        .filter(|edge| edge.from == from)
        .map(|edge| edge.to)
        .collect()
}

/// Lifecycle event recorded for a successful transition.
fn event_for(target: BookingStatus, actor: Actor) -> EventType {
    match target {
        Assigned => EventType::DriverAssigned,
        Accepted => EventType::BookingAccepted,
        Arrived => EventType::DriverArrived,
        WaitingStarted => EventType::WaitingStarted,
        Started => EventType::TripStarted,
        Completed => EventType::TripCompleted,
        Cancelled => EventType::BookingCancelled,
        NoShowRequested => EventType::NoShowRequested,
        NoShowConfirmed => EventType::NoShowConfirmed,
        AutoReleased => EventType::AutoReleased,
        // Back to the pool: a driver turning the offer down, or an admin
        // unassigning. Only those two actors can reach this target.
        Pending => match actor {
            Actor::Driver(_) => EventType::DriverRejected,
            _ => EventType::AdminOverride,
        },
    }
}

/// Steps a driver may take on a booking bound to them. Rejection of a fresh
/// offer (assigned -> pending) is included; cancellation is not.
fn driver_may_target(target: BookingStatus) -> bool {
    matches!(
        target,
        Accepted | Arrived | WaitingStarted | Started | Completed | NoShowRequested | Pending
    )
}

/// Validate and apply one booking status transition.
///
/// Admin actors may take edges outside the table ("override") with a
/// non-empty reason; those are additionally recorded as `admin_override`.
/// `expected_status` is an optional compare-and-set guard: callers that read
/// a booking, decided on a transition, and want to detect a lost race pass
/// the status they saw.
pub fn request_transition(
    state: &AppState,
    booking_id: Uuid,
    target: BookingStatus,
    actor: Actor,
    reason: Option<&str>,
    expected_status: Option<BookingStatus>,
) -> Result<Booking, AppError> {
    // Booking entry lock first; driver entries are only ever taken while a
    // booking entry is held, never the other way around.
    let mut booking = state
        .bookings
        .get_mut(&booking_id)
        .ok_or_else(|| AppError::NotFound(format!("booking {booking_id} not found")))?;

    let from = booking.status;

    if let Some(expected) = expected_status {
        if expected != from {
            return Err(AppError::ConcurrentModification);
        }
    }

    // Terminal bookings are frozen; replays of an already-applied transition
    // are consistently rejected rather than absorbed.
    if from.is_terminal() || target == from {
        return Err(AppError::InvalidTransition { from, to: target });
    }

    let standard_edge = edge(from, target);
    let is_override = standard_edge.is_none();

    match actor {
        Actor::Admin(_) => {}
        Actor::System => {
            // Automated release of a stalled offer goes through
            // `auto_released`, never back to the pool.
            if is_override || target == Pending {
                return Err(AppError::InvalidTransition { from, to: target });
            }
        }
        Actor::Driver(driver_id) => {
            let bound = booking.assigned_driver == Some(driver_id);
            if is_override || !bound || !driver_may_target(target) {
                return Err(AppError::InvalidTransition { from, to: target });
            }
        }
        Actor::Partner(_) => {
            if is_override || target != Cancelled {
                return Err(AppError::InvalidTransition { from, to: target });
            }
        }
    }

    // An admin pulling a booking back to the pool is an unassignment and
    // must be justified like any off-table override.
    let is_admin_unassign = target == Pending && actor.is_admin();
    let reason_required = is_override
        || is_admin_unassign
        || standard_edge.is_some_and(|edge| edge.requires_reason);
    let reason = reason.map(str::trim).filter(|reason| !reason.is_empty());
    if reason_required && reason.is_none() {
        return Err(AppError::MissingOverrideReason);
    }

    if target.is_driver_bound() && booking.assigned_driver.is_none() {
        return Err(AppError::InvalidTransition { from, to: target });
    }

    // All checks passed; from here on every mutation must land.
    let now = Utc::now();
    booking.status = target;
    booking.updated_at = now;

    if let (Actor::Admin(_), Some(reason)) = (actor, reason) {
        booking.notes.admin = Some(reason.to_string());
    }

    let released_driver = if from.is_driver_bound() && !target.is_driver_bound() {
        booking.assigned_driver.take()
    } else {
        None
    };

    if let Some(driver_id) = released_driver {
        release_driver(state, driver_id);
    }

    if target == Accepted {
        if let Some(driver_id) = booking.assigned_driver {
            if let Some(mut driver) = state.drivers.get_mut(&driver_id) {
                driver.accepted_offers += 1;
                driver.updated_at = now;
            }
        }
    }

    let event = event_for(target, actor);
    let mut entry = AuditEntry::new(booking_id, event, actor).with_details(json!({
        "from": from,
        "to": target,
        "released_driver": released_driver,
    }));
    if let Some(reason) = reason {
        entry = entry.with_reason(reason);
    }
    state.audit.append(entry);

    // Reasoned admin transitions and true overrides get the extra marker the
    // dispute timeline filters on.
    let flag_override =
        actor.is_admin() && (is_override || reason_required) && event != EventType::AdminOverride;
    if flag_override {
        let mut marker = AuditEntry::new(booking_id, EventType::AdminOverride, actor)
            .with_details(json!({ "from": from, "to": target }));
        if let Some(reason) = reason {
            marker = marker.with_reason(reason);
        }
        state.audit.append(marker);
        warn!(booking_id = %booking_id, from = ?from, to = ?target, "admin override applied");
    }

    state
        .metrics
        .transitions_total
        .with_label_values(&[event_label(event)])
        .inc();

    let snapshot = booking.clone();
    drop(booking);

    state.emit(DomainEvent::BookingUpdated {
        booking: snapshot.clone(),
        event,
    });

    info!(
        booking_id = %booking_id,
        from = ?from,
        to = ?target,
        actor = ?actor,
        "booking transition applied"
    );

    Ok(snapshot)
}

/// Unbind a driver after its booking left the driver-bound family. Stored
/// availability goes back to available; an active suspension still masks it.
fn release_driver(state: &AppState, driver_id: Uuid) {
    if let Some(mut driver) = state.drivers.get_mut(&driver_id) {
        driver.current_booking = None;
        driver.availability = Availability::Available;
        driver.updated_at = Utc::now();
    }
}

pub fn event_label(event: EventType) -> &'static str {
    match event {
        EventType::BookingCreated => "booking_created",
        EventType::DriverAssigned => "driver_assigned",
        EventType::BookingAccepted => "booking_accepted",
        EventType::DriverArrived => "driver_arrived",
        EventType::WaitingStarted => "waiting_started",
        EventType::TripStarted => "trip_started",
        EventType::TripCompleted => "trip_completed",
        EventType::BookingCancelled => "booking_cancelled",
        EventType::DriverRejected => "driver_rejected",
        EventType::NoShowRequested => "no_show_requested",
        EventType::NoShowConfirmed => "no_show_confirmed",
        EventType::AutoReleased => "auto_released",
        EventType::AdminOverride => "admin_override",
    }
}
