use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, patch, post};
use axum::Json;
use axum::Router;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::registry;
use crate::error::AppError;
use crate::models::booking::GeoPoint;
use crate::models::driver::{Availability, Driver, PositionFix, Vehicle};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/drivers", post(create_driver).get(list_drivers))
        .route("/drivers/:id", get(get_driver))
        .route("/drivers/:id/availability", patch(update_availability))
        .route("/drivers/:id/location", post(report_location))
        .route(
            "/drivers/:id/suspend",
            post(suspend_driver).delete(unsuspend_driver),
        )
        .route("/drivers/:id/compliance", patch(update_compliance))
}

#[derive(Deserialize)]
pub struct CreateDriverRequest {
    pub name: String,
    pub phone: String,
    pub vehicle: Vehicle,
    #[serde(default = "default_compliance")]
    pub compliance_ok: bool,
}

fn default_compliance() -> bool {
    true
}

#[derive(Deserialize)]
pub struct UpdateAvailabilityRequest {
    pub availability: Availability,
}

#[derive(Deserialize)]
pub struct LocationReport {
    pub lat: f64,
    pub lng: f64,
    pub heading: Option<f64>,
    pub speed_kmh: Option<f64>,
    pub recorded_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
pub struct SuspendRequest {
    pub reason: String,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
pub struct ComplianceRequest {
    pub compliance_ok: bool,
}

#[derive(Deserialize)]
pub struct ListDriversQuery {
    pub availability: Option<Availability>,
    #[serde(default)]
    pub include_stale: bool,
}

/// Driver as consumers see it: derived staleness and effective availability
/// included, stored values untouched.
#[derive(Serialize)]
pub struct DriverView {
    #[serde(flatten)]
    pub driver: Driver,
    pub effective_availability: Availability,
    pub is_stale: bool,
    pub position: Option<PositionFix>,
    pub acceptance_rate: f64,
}

fn driver_view(state: &AppState, driver: Driver, now: DateTime<Utc>) -> DriverView {
    let position = state.positions.get(&driver.id).map(|fix| fix.value().clone());
    let is_stale = position
        .as_ref()
        .map_or(true, |fix| fix.is_stale(now, state.staleness_threshold));

    DriverView {
        effective_availability: driver.effective_availability(now),
        acceptance_rate: driver.acceptance_rate(),
        is_stale,
        position,
        driver,
    }
}

async fn create_driver(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateDriverRequest>,
) -> Result<Json<Driver>, AppError> {
    if payload.name.trim().is_empty() {
        return Err(AppError::BadRequest("name cannot be empty".to_string()));
    }
    if payload.vehicle.plate.trim().is_empty() {
        return Err(AppError::BadRequest(
            "vehicle plate cannot be empty".to_string(),
        ));
    }
    if payload.vehicle.capacity == 0 {
        return Err(AppError::BadRequest(
            "vehicle capacity must be > 0".to_string(),
        ));
    }

    let now = Utc::now();
    let driver = Driver {
        id: Uuid::new_v4(),
        name: payload.name,
        phone: payload.phone,
        vehicle: payload.vehicle,
        availability: Availability::Offline,
        current_booking: None,
        suspension: None,
        compliance_ok: payload.compliance_ok,
        total_offers: 0,
        accepted_offers: 0,
        created_at: now,
        updated_at: now,
    };

    state.drivers.insert(driver.id, driver.clone());

    tracing::info!(driver_id = %driver.id, plate = %driver.vehicle.plate, "driver onboarded");

    Ok(Json(driver))
}

async fn list_drivers(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListDriversQuery>,
) -> Json<Vec<DriverView>> {
    let now = Utc::now();
    let drivers = state
        .drivers
        .iter()
        .filter(|entry| {
            query
                .availability
                .map_or(true, |availability| entry.value().availability == availability)
        })
        .map(|entry| driver_view(&state, entry.value().clone(), now))
        .filter(|view| query.include_stale || !view.is_stale)
        .collect();
    Json(drivers)
}

async fn get_driver(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<DriverView>, AppError> {
    let driver = state
        .drivers
        .get(&id)
        .map(|entry| entry.value().clone())
        .ok_or_else(|| AppError::NotFound(format!("driver {id} not found")))?;

    Ok(Json(driver_view(&state, driver, Utc::now())))
}

async fn update_availability(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateAvailabilityRequest>,
) -> Result<Json<Driver>, AppError> {
    let driver = registry::set_availability(&state, id, payload.availability)?;
    Ok(Json(driver))
}

async fn report_location(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<LocationReport>,
) -> Result<Json<PositionFix>, AppError> {
    let fix = registry::report_location(
        &state,
        id,
        GeoPoint {
            lat: payload.lat,
            lng: payload.lng,
        },
        payload.heading,
        payload.speed_kmh,
        payload.recorded_at,
    )?;
    Ok(Json(fix))
}

async fn suspend_driver(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<SuspendRequest>,
) -> Result<Json<Driver>, AppError> {
    let driver = registry::suspend(&state, id, payload.reason, payload.expires_at)?;
    Ok(Json(driver))
}

async fn unsuspend_driver(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Driver>, AppError> {
    let driver = registry::unsuspend(&state, id)?;
    Ok(Json(driver))
}

async fn update_compliance(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ComplianceRequest>,
) -> Result<Json<Driver>, AppError> {
    let mut driver = state
        .drivers
        .get_mut(&id)
        .ok_or_else(|| AppError::NotFound(format!("driver {id} not found")))?;

    driver.compliance_ok = payload.compliance_ok;
    driver.updated_at = Utc::now();

    Ok(Json(driver.clone()))
}
