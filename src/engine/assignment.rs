use chrono::Utc;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::engine::registry::ineligibility_reason;
use crate::error::AppError;
use crate::models::audit::{Actor, AuditEntry, EventType};
use crate::models::booking::{Booking, BookingStatus};
use crate::models::driver::Availability;
use crate::models::event::DomainEvent;
use crate::state::AppState;

/// Bind a pending booking to an eligible driver. Both entry locks are held
/// for the whole mutation, booking first, so the pair changes as one unit;
/// every precondition is checked before the first write.
pub fn assign(
    state: &AppState,
    booking_id: Uuid,
    driver_id: Uuid,
    actor: Actor,
) -> Result<Booking, AppError> {
    let mut booking = state
        .bookings
        .get_mut(&booking_id)
        .ok_or_else(|| AppError::NotFound(format!("booking {booking_id} not found")))?;

    if booking.status != BookingStatus::Pending {
        state
            .metrics
            .assignments_total
            .with_label_values(&["rejected"])
            .inc();
        return Err(AppError::InvalidTransition {
            from: booking.status,
            to: BookingStatus::Assigned,
        });
    }

    let mut driver = state
        .drivers
        .get_mut(&driver_id)
        .ok_or_else(|| AppError::NotFound(format!("driver {driver_id} not found")))?;

    let now = Utc::now();
    if let Some(why) = ineligibility_reason(state, &driver, &booking.requirement, now) {
        state
            .metrics
            .assignments_total
            .with_label_values(&["rejected"])
            .inc();
        return Err(AppError::DriverIneligible(why.to_string()));
    }

    booking.status = BookingStatus::Assigned;
    booking.assigned_driver = Some(driver_id);
    booking.updated_at = now;

    driver.current_booking = Some(booking_id);
    driver.availability = Availability::Busy;
    driver.total_offers += 1;
    driver.updated_at = now;

    state.audit.append(
        AuditEntry::new(booking_id, EventType::DriverAssigned, actor).with_details(json!({
            "driver_id": driver_id,
            "vehicle_plate": driver.vehicle.plate,
        })),
    );

    state
        .metrics
        .assignments_total
        .with_label_values(&["success"])
        .inc();

    let snapshot = booking.clone();
    drop(driver);
    drop(booking);

    state.emit(DomainEvent::BookingUpdated {
        booking: snapshot.clone(),
        event: EventType::DriverAssigned,
    });

    info!(booking_id = %booking_id, driver_id = %driver_id, "driver assigned");

    Ok(snapshot)
}

/// Admin-only reversal of a binding: booking back to the pool, driver freed.
/// Audited as an override, so the reason is mandatory.
pub fn unassign(
    state: &AppState,
    booking_id: Uuid,
    actor: Actor,
    reason: &str,
) -> Result<Booking, AppError> {
    if !actor.is_admin() {
        return Err(AppError::BadRequest(
            "unassign is an administrative action".to_string(),
        ));
    }
    let reason = reason.trim();
    if reason.is_empty() {
        return Err(AppError::MissingOverrideReason);
    }

    let mut booking = state
        .bookings
        .get_mut(&booking_id)
        .ok_or_else(|| AppError::NotFound(format!("booking {booking_id} not found")))?;

    if booking.status != BookingStatus::Assigned {
        return Err(AppError::InvalidTransition {
            from: booking.status,
            to: BookingStatus::Pending,
        });
    }

    let driver_id = booking.assigned_driver.take().ok_or_else(|| {
        AppError::Internal(format!("assigned booking {booking_id} has no driver"))
    })?;

    let now = Utc::now();
    booking.status = BookingStatus::Pending;
    booking.updated_at = now;

    if let Some(mut driver) = state.drivers.get_mut(&driver_id) {
        driver.current_booking = None;
        driver.availability = Availability::Available;
        driver.updated_at = now;
    }

    state.audit.append(
        AuditEntry::new(booking_id, EventType::AdminOverride, actor)
            .with_reason(reason)
            .with_details(json!({
                "action": "unassign",
                "driver_id": driver_id,
            })),
    );

    let snapshot = booking.clone();
    drop(booking);

    state.emit(DomainEvent::BookingUpdated {
        booking: snapshot.clone(),
        event: EventType::AdminOverride,
    });

    info!(booking_id = %booking_id, driver_id = %driver_id, "driver unassigned");

    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::{assign, unassign};
    use crate::engine::registry::report_location;
    use crate::error::AppError;
    use crate::models::audit::{Actor, EventType};
    use crate::models::booking::{
        Booking, BookingNotes, BookingSource, BookingStatus, GeoPoint, ServiceType, Stop,
        VehicleRequirement, VehicleType,
    };
    use crate::models::driver::{Availability, Driver, Vehicle};
    use crate::state::AppState;

    fn test_state() -> AppState {
        AppState::new(16, 300)
    }

    fn seed_booking(state: &AppState, requirement: VehicleRequirement) -> Uuid {
        let now = Utc::now();
        let id = Uuid::new_v4();
        state.bookings.insert(
            id,
            Booking {
                id,
                reference: Booking::generate_reference(now),
                status: BookingStatus::Pending,
                source: BookingSource::Partner,
                passenger_name: "Omar Passenger".to_string(),
                passenger_phone: "+4915200000004".to_string(),
                pickup: Stop {
                    address: "Hauptbahnhof".to_string(),
                    point: GeoPoint { lat: 52.525, lng: 13.369 },
                },
                dropoff: None,
                scheduled_pickup_time: None,
                service_type: ServiceType::Standard,
                requirement,
                fare_estimate: None,
                fare_final: None,
                assigned_driver: None,
                notes: BookingNotes::default(),
                created_at: now,
                updated_at: now,
            },
        );
        id
    }

    fn seed_driver(state: &AppState, vehicle_type: VehicleType) -> Uuid {
        let now = Utc::now();
        let id = Uuid::new_v4();
        state.drivers.insert(
            id,
            Driver {
                id,
                name: "Kim Driver".to_string(),
                phone: "+4915200000005".to_string(),
                vehicle: Vehicle {
                    plate: "B-TX 3003".to_string(),
                    vehicle_type,
                    capacity: 4,
                },
                availability: Availability::Available,
                current_booking: None,
                suspension: None,
                compliance_ok: true,
                total_offers: 0,
                accepted_offers: 0,
                created_at: now,
                updated_at: now,
            },
        );
        report_location(state, id, GeoPoint { lat: 52.52, lng: 13.405 }, None, None, None)
            .unwrap();
        id
    }

    fn admin() -> Actor {
        Actor::Admin(Uuid::new_v4())
    }

    #[test]
    fn assign_binds_both_sides_atomically() {
        let state = test_state();
        let booking_id = seed_booking(&state, VehicleRequirement::default());
        let driver_id = seed_driver(&state, VehicleType::Sedan);

        let booking = assign(&state, booking_id, driver_id, admin()).unwrap();

        assert_eq!(booking.status, BookingStatus::Assigned);
        assert_eq!(booking.assigned_driver, Some(driver_id));

        let driver = state.drivers.get(&driver_id).unwrap().clone();
        assert_eq!(driver.current_booking, Some(booking_id));
        assert_eq!(driver.availability, Availability::Busy);
        assert_eq!(driver.total_offers, 1);

        let timeline = state.audit.timeline_for(booking_id);
        assert_eq!(timeline.len(), 1);
        assert_eq!(timeline[0].event, EventType::DriverAssigned);
    }

    #[test]
    fn wrong_vehicle_type_is_rejected_without_mutation() {
        let state = test_state();
        let booking_id = seed_booking(
            &state,
            VehicleRequirement {
                vehicle_type: Some(VehicleType::Van),
                min_capacity: None,
            },
        );
        let driver_id = seed_driver(&state, VehicleType::Sedan);

        let err = assign(&state, booking_id, driver_id, admin()).unwrap_err();
        assert!(matches!(err, AppError::DriverIneligible(_)));

        let booking = state.bookings.get(&booking_id).unwrap().clone();
        assert_eq!(booking.status, BookingStatus::Pending);
        assert!(booking.assigned_driver.is_none());

        let driver = state.drivers.get(&driver_id).unwrap().clone();
        assert!(driver.current_booking.is_none());
        assert_eq!(driver.availability, Availability::Available);
        assert!(state.audit.timeline_for(booking_id).is_empty());
    }

    #[test]
    fn second_assign_to_same_booking_is_rejected() {
        let state = test_state();
        let booking_id = seed_booking(&state, VehicleRequirement::default());
        let first = seed_driver(&state, VehicleType::Sedan);
        let second = seed_driver(&state, VehicleType::Sedan);

        assign(&state, booking_id, first, admin()).unwrap();

        let err = assign(&state, booking_id, second, admin()).unwrap_err();
        assert!(matches!(
            err,
            AppError::InvalidTransition {
                from: BookingStatus::Assigned,
                to: BookingStatus::Assigned,
            }
        ));

        // Only one driver ever holds the booking.
        let booking = state.bookings.get(&booking_id).unwrap().clone();
        assert_eq!(booking.assigned_driver, Some(first));
        assert!(state
            .drivers
            .get(&second)
            .unwrap()
            .current_booking
            .is_none());
    }

    #[test]
    fn busy_driver_cannot_take_a_second_booking() {
        let state = test_state();
        let first_booking = seed_booking(&state, VehicleRequirement::default());
        let second_booking = seed_booking(&state, VehicleRequirement::default());
        let driver_id = seed_driver(&state, VehicleType::Sedan);

        assign(&state, first_booking, driver_id, admin()).unwrap();

        let err = assign(&state, second_booking, driver_id, admin()).unwrap_err();
        assert!(matches!(err, AppError::DriverIneligible(_)));
        assert_eq!(
            state.bookings.get(&second_booking).unwrap().status,
            BookingStatus::Pending
        );
    }

    #[test]
    fn unassign_reverses_the_binding() {
        let state = test_state();
        let booking_id = seed_booking(&state, VehicleRequirement::default());
        let driver_id = seed_driver(&state, VehicleType::Sedan);
        assign(&state, booking_id, driver_id, admin()).unwrap();

        let booking = unassign(&state, booking_id, admin(), "driver stuck in traffic").unwrap();

        assert_eq!(booking.status, BookingStatus::Pending);
        assert!(booking.assigned_driver.is_none());

        let driver = state.drivers.get(&driver_id).unwrap().clone();
        assert!(driver.current_booking.is_none());
        assert_eq!(driver.availability, Availability::Available);

        let timeline = state.audit.timeline_for(booking_id);
        assert_eq!(timeline.last().unwrap().event, EventType::AdminOverride);
        assert_eq!(
            timeline.last().unwrap().reason.as_deref(),
            Some("driver stuck in traffic")
        );
    }

    #[test]
    fn unassign_requires_reason_and_admin() {
        let state = test_state();
        let booking_id = seed_booking(&state, VehicleRequirement::default());
        let driver_id = seed_driver(&state, VehicleType::Sedan);
        assign(&state, booking_id, driver_id, admin()).unwrap();

        let err = unassign(&state, booking_id, admin(), "  ").unwrap_err();
        assert!(matches!(err, AppError::MissingOverrideReason));

        let err = unassign(&state, booking_id, Actor::Driver(driver_id), "done").unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));

        assert_eq!(
            state.bookings.get(&booking_id).unwrap().status,
            BookingStatus::Assigned
        );
    }

    #[tokio::test]
    async fn concurrent_assigns_have_exactly_one_winner() {
        let state = std::sync::Arc::new(test_state());
        let booking_id = seed_booking(&state, VehicleRequirement::default());
        let first = seed_driver(&state, VehicleType::Sedan);
        let second = seed_driver(&state, VehicleType::Sedan);

        let a = {
            let state = state.clone();
            tokio::task::spawn_blocking(move || assign(&state, booking_id, first, admin()))
        };
        let b = {
            let state = state.clone();
            tokio::task::spawn_blocking(move || assign(&state, booking_id, second, admin()))
        };

        let (a, b) = tokio::join!(a, b);
        let results = [a.unwrap(), b.unwrap()];
        let winners = results.iter().filter(|result| result.is_ok()).count();
        assert_eq!(winners, 1);

        let loser = results
            .iter()
            .find(|result| result.is_err())
            .unwrap()
            .as_ref()
            .unwrap_err();
        assert!(matches!(*loser, AppError::InvalidTransition { .. }));

        // Exactly one audit entry, one bound driver.
        assert_eq!(state.audit.timeline_for(booking_id).len(), 1);
        let bound = [first, second]
            .iter()
            .filter(|id| {
                state
                    .drivers
                    .get(id)
                    .unwrap()
                    .current_booking
                    .is_some()
            })
            .count();
        assert_eq!(bound, 1);
    }
}
