use chrono::{DateTime, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::AppError;
use crate::geo::haversine_km;
use crate::models::booking::{GeoPoint, VehicleRequirement};
use crate::models::driver::{Availability, Driver, PositionFix, Suspension};
use crate::models::event::DomainEvent;
use crate::state::AppState;

/// Most-recent-write-wins telemetry. Deliberately does not touch the driver
/// record: pings must never contend with availability or binding writes, and
/// a suspended driver keeps reporting so dispatch can still see the vehicle.
/// Client timestamps are taken as-is; this is physical telemetry, not
/// authoritative state, so an out-of-order old ping simply lands.
pub fn report_location(
    state: &AppState,
    driver_id: Uuid,
    point: GeoPoint,
    heading: Option<f64>,
    speed_kmh: Option<f64>,
    recorded_at: Option<DateTime<Utc>>,
) -> Result<PositionFix, AppError> {
    if !state.drivers.contains_key(&driver_id) {
        return Err(AppError::NotFound(format!("driver {driver_id} not found")));
    }

    let fix = PositionFix {
        point,
        heading,
        speed_kmh,
        recorded_at: recorded_at.unwrap_or_else(Utc::now),
    };
    state.positions.insert(driver_id, fix.clone());
    state.metrics.location_updates_total.inc();

    debug!(driver_id = %driver_id, lat = point.lat, lng = point.lng, "location updated");

    state.emit(DomainEvent::DriverLocation {
        driver_id,
        fix: fix.clone(),
    });

    Ok(fix)
}

/// Driver-requested availability change. Binding into and out of `busy` is
/// the assignment engine's and state machine's job, never a direct request.
pub fn set_availability(
    state: &AppState,
    driver_id: Uuid,
    target: Availability,
) -> Result<Driver, AppError> {
    let mut driver = state
        .drivers
        .get_mut(&driver_id)
        .ok_or_else(|| AppError::NotFound(format!("driver {driver_id} not found")))?;

    let now = Utc::now();

    if target == Availability::Available && driver.is_suspended(now) {
        return Err(AppError::DriverSuspended);
    }

    if driver.current_booking.is_some() {
        return Err(AppError::DriverBusy);
    }

    if target.is_busy() {
        return Err(AppError::BadRequest(
            "busy is set by assignment, not requested".to_string(),
        ));
    }

    driver.availability = target;
    driver.updated_at = now;

    info!(driver_id = %driver_id, availability = ?target, "driver availability updated");

    Ok(driver.clone())
}

pub fn suspend(
    state: &AppState,
    driver_id: Uuid,
    reason: String,
    expires_at: Option<DateTime<Utc>>,
) -> Result<Driver, AppError> {
    if reason.trim().is_empty() {
        return Err(AppError::BadRequest(
            "suspension reason cannot be empty".to_string(),
        ));
    }

    let mut driver = state
        .drivers
        .get_mut(&driver_id)
        .ok_or_else(|| AppError::NotFound(format!("driver {driver_id} not found")))?;

    driver.suspension = Some(Suspension {
        reason: reason.clone(),
        expires_at,
    });
    driver.updated_at = Utc::now();

    info!(driver_id = %driver_id, reason = %reason, "driver suspended");

    Ok(driver.clone())
}

/// Lifting a suspension does not restore `available`; the driver re-opts in.
pub fn unsuspend(state: &AppState, driver_id: Uuid) -> Result<Driver, AppError> {
    let mut driver = state
        .drivers
        .get_mut(&driver_id)
        .ok_or_else(|| AppError::NotFound(format!("driver {driver_id} not found")))?;

    driver.suspension = None;
    driver.updated_at = Utc::now();

    info!(driver_id = %driver_id, "driver suspension lifted");

    Ok(driver.clone())
}

/// Why a driver cannot take a booking right now, or `None` when they can.
pub fn ineligibility_reason(
    state: &AppState,
    driver: &Driver,
    requirement: &VehicleRequirement,
    now: DateTime<Utc>,
) -> Option<&'static str> {
    if driver.is_suspended(now) {
        return Some("suspended");
    }
    if !driver.compliance_ok {
        return Some("compliance documents invalid");
    }
    if driver.availability != Availability::Available {
        return Some("not available");
    }

    match state.positions.get(&driver.id) {
        None => return Some("no known position"),
        Some(fix) => {
            if fix.is_stale(now, state.staleness_threshold) {
                return Some("position stale");
            }
        }
    }

    if let Some(required_type) = requirement.vehicle_type {
        if driver.vehicle.vehicle_type != required_type {
            return Some("vehicle type mismatch");
        }
    }
    if let Some(min_capacity) = requirement.min_capacity {
        if driver.vehicle.capacity < min_capacity {
            return Some("vehicle capacity too small");
        }
    }

    None
}

pub fn is_eligible_for_assignment(
    state: &AppState,
    driver_id: Uuid,
    requirement: &VehicleRequirement,
    now: DateTime<Utc>,
) -> Result<bool, AppError> {
    let driver = state
        .drivers
        .get(&driver_id)
        .ok_or_else(|| AppError::NotFound(format!("driver {driver_id} not found")))?;

    Ok(ineligibility_reason(state, &driver, requirement, now).is_none())
}

/// An eligible driver with its distance to a pickup, for dispatcher display.
/// Choosing among them stays with the caller.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Candidate {
    pub driver: Driver,
    pub distance_km: f64,
}

pub fn eligible_drivers(
    state: &AppState,
    requirement: &VehicleRequirement,
    pickup: &GeoPoint,
    now: DateTime<Utc>,
) -> Vec<Candidate> {
    let mut candidates: Vec<Candidate> = state
        .drivers
        .iter()
        .filter_map(|entry| {
            let driver = entry.value();
            if ineligibility_reason(state, driver, requirement, now).is_some() {
                return None;
            }
            let fix = state.positions.get(&driver.id)?;
            Some(Candidate {
                driver: driver.clone(),
                distance_km: haversine_km(&fix.point, pickup),
            })
        })
        .collect();

    candidates.sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km));
    candidates
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    use super::{
        eligible_drivers, is_eligible_for_assignment, report_location, set_availability, suspend,
        unsuspend,
    };
    use crate::error::AppError;
    use crate::models::booking::{GeoPoint, VehicleRequirement, VehicleType};
    use crate::models::driver::{Availability, Driver, Vehicle};
    use crate::state::AppState;

    fn test_state() -> AppState {
        AppState::new(16, 300)
    }

    fn seed_driver(state: &AppState, vehicle_type: VehicleType, capacity: u8) -> Uuid {
        let now = Utc::now();
        let id = Uuid::new_v4();
        state.drivers.insert(
            id,
            Driver {
                id,
                name: "Nia Driver".to_string(),
                phone: "+4915200000003".to_string(),
                vehicle: Vehicle {
                    plate: "B-TX 2002".to_string(),
                    vehicle_type,
                    capacity,
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
        id
    }

    fn ping(state: &AppState, driver_id: Uuid) {
        report_location(
            state,
            driver_id,
            GeoPoint { lat: 52.52, lng: 13.405 },
            None,
            None,
            None,
        )
        .unwrap();
    }

    #[test]
    fn fresh_available_driver_is_eligible() {
        let state = test_state();
        let driver_id = seed_driver(&state, VehicleType::Sedan, 4);
        ping(&state, driver_id);

        let eligible = is_eligible_for_assignment(
            &state,
            driver_id,
            &VehicleRequirement::default(),
            Utc::now(),
        )
        .unwrap();
        assert!(eligible);
    }

    #[test]
    fn driver_without_position_is_not_eligible() {
        let state = test_state();
        let driver_id = seed_driver(&state, VehicleType::Sedan, 4);

        let eligible = is_eligible_for_assignment(
            &state,
            driver_id,
            &VehicleRequirement::default(),
            Utc::now(),
        )
        .unwrap();
        assert!(!eligible);
    }

    #[test]
    fn stale_position_blocks_eligibility() {
        let state = test_state();
        let driver_id = seed_driver(&state, VehicleType::Sedan, 4);
        ping(&state, driver_id);

        let later = Utc::now() + Duration::seconds(301);
        let eligible =
            is_eligible_for_assignment(&state, driver_id, &VehicleRequirement::default(), later)
                .unwrap();
        assert!(!eligible);
    }

    #[test]
    fn vehicle_requirement_is_enforced() {
        let state = test_state();
        let driver_id = seed_driver(&state, VehicleType::Sedan, 4);
        ping(&state, driver_id);

        let wants_van = VehicleRequirement {
            vehicle_type: Some(VehicleType::Van),
            min_capacity: None,
        };
        assert!(
            !is_eligible_for_assignment(&state, driver_id, &wants_van, Utc::now()).unwrap()
        );

        let wants_six_seats = VehicleRequirement {
            vehicle_type: None,
            min_capacity: Some(6),
        };
        assert!(
            !is_eligible_for_assignment(&state, driver_id, &wants_six_seats, Utc::now()).unwrap()
        );
    }

    #[test]
    fn suspended_driver_pings_but_stays_ineligible() {
        let state = test_state();
        let driver_id = seed_driver(&state, VehicleType::Sedan, 4);
        suspend(&state, driver_id, "expired insurance".to_string(), None).unwrap();

        // Telemetry still lands.
        ping(&state, driver_id);
        assert!(state.positions.contains_key(&driver_id));

        assert!(!is_eligible_for_assignment(
            &state,
            driver_id,
            &VehicleRequirement::default(),
            Utc::now()
        )
        .unwrap());

        let err = set_availability(&state, driver_id, Availability::Available).unwrap_err();
        assert!(matches!(err, AppError::DriverSuspended));
    }

    #[test]
    fn expired_suspension_no_longer_blocks() {
        let state = test_state();
        let driver_id = seed_driver(&state, VehicleType::Sedan, 4);
        ping(&state, driver_id);
        suspend(
            &state,
            driver_id,
            "late arrivals".to_string(),
            Some(Utc::now() - Duration::minutes(5)),
        )
        .unwrap();

        assert!(is_eligible_for_assignment(
            &state,
            driver_id,
            &VehicleRequirement::default(),
            Utc::now()
        )
        .unwrap());
    }

    #[test]
    fn unsuspend_does_not_restore_available() {
        let state = test_state();
        let driver_id = seed_driver(&state, VehicleType::Sedan, 4);
        set_availability(&state, driver_id, Availability::Offline).unwrap();
        suspend(&state, driver_id, "document check".to_string(), None).unwrap();

        let driver = unsuspend(&state, driver_id).unwrap();
        assert_eq!(driver.availability, Availability::Offline);
    }

    #[test]
    fn bound_driver_cannot_change_availability() {
        let state = test_state();
        let driver_id = seed_driver(&state, VehicleType::Sedan, 4);
        state.drivers.get_mut(&driver_id).unwrap().current_booking = Some(Uuid::new_v4());
        state.drivers.get_mut(&driver_id).unwrap().availability = Availability::Busy;

        let err = set_availability(&state, driver_id, Availability::Available).unwrap_err();
        assert!(matches!(err, AppError::DriverBusy));

        let err = set_availability(&state, driver_id, Availability::Offline).unwrap_err();
        assert!(matches!(err, AppError::DriverBusy));
    }

    #[test]
    fn busy_cannot_be_requested_directly() {
        let state = test_state();
        let driver_id = seed_driver(&state, VehicleType::Sedan, 4);

        let err = set_availability(&state, driver_id, Availability::Busy).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[test]
    fn candidates_come_back_nearest_first() {
        let state = test_state();
        let near = seed_driver(&state, VehicleType::Sedan, 4);
        let far = seed_driver(&state, VehicleType::Sedan, 4);
        report_location(
            &state,
            near,
            GeoPoint { lat: 52.522, lng: 13.413 },
            None,
            None,
            None,
        )
        .unwrap();
        report_location(
            &state,
            far,
            GeoPoint { lat: 52.60, lng: 13.50 },
            None,
            None,
            None,
        )
        .unwrap();

        let pickup = GeoPoint { lat: 52.5219, lng: 13.4132 };
        let candidates = eligible_drivers(
            &state,
            &VehicleRequirement::default(),
            &pickup,
            Utc::now(),
        );

        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].driver.id, near);
        assert!(candidates[0].distance_km < candidates[1].distance_km);
    }

    #[test]
    fn unknown_driver_location_is_not_found() {
        let state = test_state();
        let err = report_location(
            &state,
            Uuid::new_v4(),
            GeoPoint { lat: 0.0, lng: 0.0 },
            None,
            None,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
