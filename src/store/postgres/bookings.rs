use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{Executor, Postgres};

use super::{stored_label, PgStore};
use crate::models::{BookedSeat, Booking, BookingStatus};
use crate::store::{BookingRecords, StoreError, StoreResult};

/// Which bookings to load, and in what order.
pub(super) enum BookingFilter {
    Id(i64),
    Show(i64),
    User(i64),
}

impl BookingFilter {
    fn clause(&self) -> (&'static str, i64) {
        match self {
            BookingFilter::Id(id) => ("WHERE b.id = $1 ORDER BY b.id, bs.position", *id),
            BookingFilter::Show(id) => ("WHERE b.show_id = $1 ORDER BY b.id, bs.position", *id),
            BookingFilter::User(id) => (
                "WHERE b.user_id = $1 ORDER BY b.created_at DESC, b.id DESC, bs.position",
                *id,
            ),
        }
    }
}

#[derive(sqlx::FromRow)]
struct BookingSeatRow {
    id: i64,
    user_id: i64,
    show_id: i64,
    status: String,
    total_price: Decimal,
    created_at: DateTime<Utc>,
    seat_id: i64,
    seat_row: String,
    number: i32,
}

/// Loads bookings with their seats in request order. Works on the pool or
/// inside an open transaction.
pub(super) async fn fetch_bookings<'e, E>(
    executor: E,
    filter: BookingFilter,
) -> StoreResult<Vec<Booking>>
where
    E: Executor<'e, Database = Postgres>,
{
    let (clause, key) = filter.clause();
    let rows = sqlx::query_as::<_, BookingSeatRow>(&format!(
        "SELECT b.id, b.user_id, b.show_id, b.status, b.total_price, b.created_at,
                s.id AS seat_id, s.seat_row, s.number
         FROM bookings b
         JOIN booking_seats bs ON bs.booking_id = b.id
         JOIN seats s ON s.id = bs.seat_id
         {}",
        clause
    ))
    .bind(key)
    .fetch_all(executor)
    .await?;

    // Rows arrive grouped by booking; fold consecutive runs.
    let mut bookings: Vec<Booking> = Vec::new();
    for row in rows {
        let seat = BookedSeat {
            seat_id: row.seat_id,
            label: stored_label(&row.seat_row, row.number)?,
        };
        match bookings.last_mut() {
            Some(current) if current.id == row.id => current.seats.push(seat),
            _ => bookings.push(Booking {
                id: row.id,
                user_id: row.user_id,
                show_id: row.show_id,
                seats: vec![seat],
                status: row
                    .status
                    .parse::<BookingStatus>()
                    .map_err(StoreError::InvalidData)?,
                total_price: row.total_price,
                created_at: row.created_at,
            }),
        }
    }
    Ok(bookings)
}

#[async_trait]
impl BookingRecords for PgStore {
    async fn get_booking(&self, booking_id: i64) -> StoreResult<Option<Booking>> {
        let mut bookings = fetch_bookings(&self.pool, BookingFilter::Id(booking_id)).await?;
        Ok(bookings.pop())
    }

    async fn bookings_for_show(&self, show_id: i64) -> StoreResult<Vec<Booking>> {
        fetch_bookings(&self.pool, BookingFilter::Show(show_id)).await
    }

    async fn bookings_for_user(&self, user_id: i64) -> StoreResult<Vec<Booking>> {
        fetch_bookings(&self.pool, BookingFilter::User(user_id)).await
    }
}
