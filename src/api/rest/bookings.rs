use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::engine::{assignment, lifecycle, registry};
use crate::error::AppError;
use crate::models::audit::{Actor, AuditEntry, EventType};
use crate::models::booking::{
    Booking, BookingNotes, BookingSource, BookingStatus, ServiceType, Stop, VehicleRequirement,
};
use crate::models::event::DomainEvent;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/bookings", post(create_booking).get(list_bookings))
        .route("/bookings/:id", get(get_booking))
        .route("/bookings/:id/transition", post(transition_booking))
        .route("/bookings/:id/assign", post(assign_driver))
        .route("/bookings/:id/unassign", post(unassign_driver))
        .route("/bookings/:id/timeline", get(booking_timeline))
        .route("/bookings/:id/candidates", get(booking_candidates))
}

#[derive(Deserialize)]
pub struct CreateBookingRequest {
    pub passenger_name: String,
    pub passenger_phone: String,
    pub pickup: Stop,
    pub dropoff: Option<Stop>,
    pub scheduled_pickup_time: Option<DateTime<Utc>>,
    #[serde(default = "default_source")]
    pub source: BookingSource,
    #[serde(default = "default_service_type")]
    pub service_type: ServiceType,
    #[serde(default)]
    pub requirement: VehicleRequirement,
    pub fare_estimate: Option<f64>,
    pub passenger_notes: Option<String>,
    #[serde(default = "system_actor")]
    pub actor: Actor,
}

fn default_source() -> BookingSource {
    BookingSource::Direct
}

fn default_service_type() -> ServiceType {
    ServiceType::Standard
}

fn system_actor() -> Actor {
    Actor::System
}

#[derive(Deserialize)]
pub struct TransitionRequest {
    pub target: BookingStatus,
    pub actor: Actor,
    pub reason: Option<String>,
    pub expected_status: Option<BookingStatus>,
}

#[derive(Deserialize)]
pub struct AssignRequest {
    pub driver_id: Uuid,
    pub actor: Actor,
}

#[derive(Deserialize)]
pub struct UnassignRequest {
    pub actor: Actor,
    pub reason: String,
}

#[derive(Deserialize)]
pub struct ListBookingsQuery {
    pub status: Option<BookingStatus>,
}

async fn create_booking(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateBookingRequest>,
) -> Result<Json<Booking>, AppError> {
    if payload.passenger_name.trim().is_empty() {
        return Err(AppError::BadRequest(
            "passenger_name cannot be empty".to_string(),
        ));
    }
    if payload.passenger_phone.trim().is_empty() {
        return Err(AppError::BadRequest(
            "passenger_phone cannot be empty".to_string(),
        ));
    }
    if payload.pickup.address.trim().is_empty() {
        return Err(AppError::BadRequest(
            "pickup address cannot be empty".to_string(),
        ));
    }

    let now = Utc::now();
    let booking = Booking {
        id: Uuid::new_v4(),
        reference: Booking::generate_reference(now),
        status: BookingStatus::Pending,
        source: payload.source,
        passenger_name: payload.passenger_name,
        passenger_phone: payload.passenger_phone,
        pickup: payload.pickup,
        dropoff: payload.dropoff,
        scheduled_pickup_time: payload.scheduled_pickup_time,
        service_type: payload.service_type,
        requirement: payload.requirement,
        fare_estimate: payload.fare_estimate,
        fare_final: None,
        assigned_driver: None,
        notes: BookingNotes {
            passenger: payload.passenger_notes,
            driver: None,
            admin: None,
        },
        created_at: now,
        updated_at: now,
    };

    state.bookings.insert(booking.id, booking.clone());
    state.audit.append(AuditEntry::new(
        booking.id,
        EventType::BookingCreated,
        payload.actor,
    ));
    state.metrics.bookings_created_total.inc();
    state.emit(DomainEvent::BookingCreated {
        booking: booking.clone(),
    });

    tracing::info!(
        booking_id = %booking.id,
        reference = %booking.reference,
        "booking created"
    );

    Ok(Json(booking))
}

async fn list_bookings(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListBookingsQuery>,
) -> Json<Vec<Booking>> {
    let bookings = state
        .bookings
        .iter()
        .filter(|entry| {
            query
                .status
                .map_or(true, |status| entry.value().status == status)
        })
        .map(|entry| entry.value().clone())
        .collect();
    Json(bookings)
}

async fn get_booking(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Booking>, AppError> {
    let booking = state
        .bookings
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("booking {id} not found")))?;

    Ok(Json(booking.value().clone()))
}

async fn transition_booking(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<TransitionRequest>,
) -> Result<Json<Booking>, AppError> {
    let booking = lifecycle::request_transition(
        &state,
        id,
        payload.target,
        payload.actor,
        payload.reason.as_deref(),
        payload.expected_status,
    )?;
    Ok(Json(booking))
}

async fn assign_driver(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AssignRequest>,
) -> Result<Json<Booking>, AppError> {
    let booking = assignment::assign(&state, id, payload.driver_id, payload.actor)?;
    Ok(Json(booking))
}

async fn unassign_driver(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UnassignRequest>,
) -> Result<Json<Booking>, AppError> {
    let booking = assignment::unassign(&state, id, payload.actor, &payload.reason)?;
    Ok(Json(booking))
}

async fn booking_timeline(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<AuditEntry>>, AppError> {
    if !state.bookings.contains_key(&id) {
        return Err(AppError::NotFound(format!("booking {id} not found")));
    }
    Ok(Json(state.audit.timeline_for(id)))
}

async fn booking_candidates(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<registry::Candidate>>, AppError> {
    let booking = state
        .bookings
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("booking {id} not found")))?;

    let candidates = registry::eligible_drivers(
        &state,
        &booking.requirement,
        &booking.pickup.point,
        Utc::now(),
    );
    Ok(Json(candidates))
}
