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
use validator::Validate;

use super::bookings::BookingView;
use crate::error::ApiError;
use crate::extract::{ApiJson, ApiQuery};
use crate::middleware::AuthUser;
use crate::models::{NewShow, SeatStatus, Show, DEFAULT_GRID_ROWS, DEFAULT_SEATS_PER_ROW};
use crate::store::{BookingRecords, CatalogStore};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/shows", post(create_show))
        .route("/shows/{show_id}/seats", get(list_seats))
        .route("/shows/{show_id}/bookings", get(show_bookings))
}

async fn require_show(state: &AppState, show_id: i64) -> Result<Show, ApiError> {
    state
        .store
        .get_show(show_id)
        .await?
        .ok_or_else(|| ApiError::not_found("SHOW_NOT_FOUND", format!("show {} not found", show_id)))
}

#[derive(Debug, Deserialize, Validate)]
struct CreateShowRequest {
    movie_id: i64,
    time: DateTime<Utc>,
    price: Decimal,
    #[validate(range(min = 1, max = 26))]
    rows: Option<u8>,
    #[validate(range(min = 1, max = 999))]
    seats_per_row: Option<u16>,
}

#[derive(Debug, Serialize)]
struct CreateShowResponse {
    show: Show,
    seat_count: usize,
}

// POST /api/shows
async fn create_show(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    ApiJson(req): ApiJson<CreateShowRequest>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate()?;
    if req.price.is_sign_negative() {
        return Err(ApiError::bad_request("price must not be negative"));
    }
    if state.store.get_movie(req.movie_id).await?.is_none() {
        return Err(ApiError::not_found(
            "MOVIE_NOT_FOUND",
            format!("movie {} not found", req.movie_id),
        ));
    }

    let (show, seats) = state
        .store
        .create_show_with_grid(
            NewShow {
                movie_id: req.movie_id,
                starts_at: req.time,
                price: req.price.round_dp(2),
            },
            req.rows.unwrap_or(DEFAULT_GRID_ROWS),
            req.seats_per_row.unwrap_or(DEFAULT_SEATS_PER_ROW),
        )
        .await?;

    tracing::info!(
        "User {} scheduled show {} for movie {} with {} seats",
        user.user_id,
        show.id,
        show.movie_id,
        seats.len()
    );
    Ok((
        StatusCode::CREATED,
        Json(CreateShowResponse {
            show,
            seat_count: seats.len(),
        }),
    ))
}

#[derive(Debug, Deserialize)]
struct SeatFilter {
    status: Option<SeatStatus>,
}

#[derive(Debug, Serialize)]
struct SeatView {
    seat_id: i64,
    label: String,
    row: String,
    number: i32,
    status: SeatStatus,
}

#[derive(Debug, Serialize)]
struct SeatMap {
    show_id: i64,
    seats: Vec<SeatView>,
    total_available: usize,
    total_booked: usize,
}

// GET /api/shows/{show_id}/seats?status=available
async fn list_seats(
    State(state): State<Arc<AppState>>,
    Path(show_id): Path<i64>,
    ApiQuery(filter): ApiQuery<SeatFilter>,
) -> Result<impl IntoResponse, ApiError> {
    require_show(&state, show_id).await?;
    let seats = state.seats(show_id).await?;

    let total_available = seats
        .iter()
        .filter(|seat| seat.status == SeatStatus::Available)
        .count();
    let total_booked = seats.len() - total_available;

    let seats = seats
        .into_iter()
        .filter(|seat| filter.status.map_or(true, |status| seat.status == status))
        .map(|seat| SeatView {
            seat_id: seat.id,
            label: seat.label(),
            row: seat.row,
            number: seat.number,
            status: seat.status,
        })
        .collect();

    Ok(Json(SeatMap {
        show_id,
        seats,
        total_available,
        total_booked,
    }))
}

// GET /api/shows/{show_id}/bookings
async fn show_bookings(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path(show_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    require_show(&state, show_id).await?;
    let bookings = state.store.bookings_for_show(show_id).await?;
    Ok(Json(
        bookings.iter().map(BookingView::from).collect::<Vec<_>>(),
    ))
}
