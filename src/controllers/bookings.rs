use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::ApiError;
use crate::extract::ApiJson;
use crate::middleware::AuthUser;
use crate::models::{Booking, BookingStatus};
use crate::services::booking::BookingError;
use crate::store::BookingRecords;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/bookings", get(my_bookings).post(create_booking))
        .route("/bookings/{booking_id}", get(get_booking))
        .route("/bookings/{booking_id}/cancel", post(cancel_booking))
}

/// Booking as shown to clients: seats by label, in the order requested.
#[derive(Debug, Serialize)]
pub(crate) struct BookingView {
    booking_id: i64,
    user_id: i64,
    show_id: i64,
    seats: Vec<String>,
    total_price: Decimal,
    status: BookingStatus,
    created_at: DateTime<Utc>,
}

impl From<&Booking> for BookingView {
    fn from(booking: &Booking) -> Self {
        BookingView {
            booking_id: booking.id,
            user_id: booking.user_id,
            show_id: booking.show_id,
            seats: booking.seat_labels(),
            total_price: booking.total_price,
            status: booking.status,
            created_at: booking.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ReserveRequest {
    show_id: i64,
    seats: Vec<String>,
}

// POST /api/bookings
async fn create_booking(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    ApiJson(req): ApiJson<ReserveRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let confirmation = state
        .engine
        .reserve(req.show_id, user.user_id, &req.seats)
        .await?;
    state.seats_changed(req.show_id).await;

    Ok((StatusCode::CREATED, Json(confirmation)))
}

// GET /api/bookings
async fn my_bookings(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    let bookings = state.store.bookings_for_user(user.user_id).await?;
    Ok(Json(
        bookings.iter().map(BookingView::from).collect::<Vec<_>>(),
    ))
}

// GET /api/bookings/{booking_id}
async fn get_booking(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(booking_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let booking = state
        .store
        .get_booking(booking_id)
        .await?
        .ok_or(BookingError::BookingNotFound(booking_id))?;

    if booking.user_id != user.user_id {
        return Err(BookingError::Forbidden(booking_id).into());
    }
    Ok(Json(BookingView::from(&booking)))
}

// POST /api/bookings/{booking_id}/cancel
async fn cancel_booking(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(booking_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let booking = state.engine.cancel(booking_id, user.user_id).await?;
    state.seats_changed(booking.show_id).await;

    Ok(Json(BookingView::from(&booking)))
}
