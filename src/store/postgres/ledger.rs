//! Seat ledger on Postgres row locks.
//!
//! `try_reserve` resolves labels with a plain read, then locks exactly the
//! targeted seat rows with `SELECT ... ORDER BY id FOR UPDATE`. The fixed lock
//! order keeps overlapping requests from deadlocking each other, and seats
//! outside the request stay free for concurrent transactions.

use async_trait::async_trait;
use sqlx::{Postgres, Transaction};
use std::collections::HashMap;

use super::bookings::{fetch_bookings, BookingFilter};
use super::catalog::fetch_seats;
use super::PgStore;
use crate::models::{BookedSeat, Booking, BookingStatus, NewBooking, Seat, SeatSelection};
use crate::store::{
    CancelOutcome, LedgerTransaction, ReserveOutcome, SeatLedger, StoreError, StoreResult,
};

#[async_trait]
impl SeatLedger for PgStore {
    async fn list_seats(&self, show_id: i64) -> StoreResult<Vec<Seat>> {
        fetch_seats(&self.pool, show_id).await
    }

    async fn begin(&self) -> StoreResult<Box<dyn LedgerTransaction>> {
        let mut tx = self.pool.begin().await?;

        // SET does not take bind parameters; the value is an integer we own.
        let statement = format!(
            "SET LOCAL lock_timeout = '{}ms'",
            self.lock_timeout.as_millis().max(1)
        );
        sqlx::query(&statement).execute(&mut *tx).await?;

        Ok(Box::new(PgLedgerTransaction {
            tx,
            reserved: Vec::new(),
        }))
    }
}

struct PgLedgerTransaction {
    tx: Transaction<'static, Postgres>,
    reserved: Vec<i64>,
}

#[async_trait]
impl LedgerTransaction for PgLedgerTransaction {
    async fn try_reserve(
        &mut self,
        show_id: i64,
        selection: &SeatSelection,
    ) -> StoreResult<ReserveOutcome> {
        if !self.reserved.is_empty() {
            return Err(StoreError::InvariantViolation(
                "transaction already reserved seats".to_string(),
            ));
        }

        // 1. Resolve labels without locking anything.
        let found: Vec<(i64, String, i32)> = sqlx::query_as(
            r#"
            SELECT s.id, s.seat_row, s.number
            FROM seats s
            JOIN UNNEST($2::text[], $3::int4[]) AS req(seat_row, number)
              ON s.seat_row = req.seat_row AND s.number = req.number
            WHERE s.show_id = $1
            "#,
        )
        .bind(show_id)
        .bind(selection.rows())
        .bind(selection.numbers())
        .fetch_all(&mut *self.tx)
        .await?;

        let mut targets = Vec::with_capacity(selection.len());
        let mut missing = Vec::new();
        for label in selection.labels() {
            match found.iter().find(|(_, row, number)| label.matches(row, *number)) {
                Some((seat_id, _, _)) => targets.push(BookedSeat {
                    seat_id: *seat_id,
                    label: *label,
                }),
                None => missing.push(*label),
            }
        }
        if !missing.is_empty() {
            return Ok(ReserveOutcome::NotFound(missing));
        }

        // 2. Lock exactly those rows, in id order.
        let ids: Vec<i64> = targets.iter().map(|seat| seat.seat_id).collect();
        let locked: Vec<(i64, String)> = sqlx::query_as(
            "SELECT id, status FROM seats WHERE id = ANY($1) ORDER BY id FOR UPDATE",
        )
        .bind(&ids)
        .fetch_all(&mut *self.tx)
        .await?;

        let status_by_id: HashMap<i64, String> = locked.into_iter().collect();
        let taken: Vec<_> = targets
            .iter()
            .filter(|seat| {
                !matches!(
                    status_by_id.get(&seat.seat_id).map(String::as_str),
                    Some("available")
                )
            })
            .map(|seat| seat.label)
            .collect();
        if !taken.is_empty() {
            return Ok(ReserveOutcome::Conflict(taken));
        }

        // 3. Compare-and-set under the lock; every row must flip.
        let flipped = sqlx::query(
            "UPDATE seats
             SET status = 'booked', updated_at = NOW()
             WHERE id = ANY($1) AND status = 'available'",
        )
        .bind(&ids)
        .execute(&mut *self.tx)
        .await?
        .rows_affected();

        if flipped != ids.len() as u64 {
            return Err(StoreError::InvariantViolation(format!(
                "expected to book {} seats under lock, booked {}",
                ids.len(),
                flipped
            )));
        }

        self.reserved = ids;
        Ok(ReserveOutcome::Reserved(targets))
    }

    async fn record_booking(&mut self, booking: NewBooking) -> StoreResult<Booking> {
        if let Some(seat) = booking
            .seats
            .iter()
            .find(|seat| !self.reserved.contains(&seat.seat_id))
        {
            return Err(StoreError::InvariantViolation(format!(
                "seat {} was not reserved in this transaction",
                seat.label
            )));
        }

        let (id, created_at): (i64, chrono::DateTime<chrono::Utc>) = sqlx::query_as(
            "INSERT INTO bookings (user_id, show_id, status, total_price)
             VALUES ($1, $2, $3, $4)
             RETURNING id, created_at",
        )
        .bind(booking.user_id)
        .bind(booking.show_id)
        .bind(BookingStatus::Confirmed.as_str())
        .bind(booking.total_price)
        .fetch_one(&mut *self.tx)
        .await?;

        let seat_ids: Vec<i64> = booking.seats.iter().map(|seat| seat.seat_id).collect();
        let positions: Vec<i32> = (0..seat_ids.len() as i32).collect();

        sqlx::query(
            "INSERT INTO booking_seats (booking_id, seat_id, position)
             SELECT $1, link.seat_id, link.position
             FROM UNNEST($2::int8[], $3::int4[]) AS link(seat_id, position)",
        )
        .bind(id)
        .bind(&seat_ids)
        .bind(&positions)
        .execute(&mut *self.tx)
        .await?;

        let linked = sqlx::query(
            "UPDATE seats
             SET booking_id = $1
             WHERE id = ANY($2) AND status = 'booked' AND booking_id IS NULL",
        )
        .bind(id)
        .bind(&seat_ids)
        .execute(&mut *self.tx)
        .await?
        .rows_affected();

        if linked != seat_ids.len() as u64 {
            return Err(StoreError::InvariantViolation(format!(
                "booking {} linked {} of {} seats; the rest belong to another booking",
                id,
                linked,
                seat_ids.len()
            )));
        }

        Ok(Booking {
            id,
            user_id: booking.user_id,
            show_id: booking.show_id,
            seats: booking.seats,
            status: BookingStatus::Confirmed,
            total_price: booking.total_price,
            created_at,
        })
    }

    async fn cancel_booking(
        &mut self,
        booking_id: i64,
        user_id: i64,
    ) -> StoreResult<CancelOutcome> {
        let owner: Option<(i64, String)> = sqlx::query_as(
            "SELECT user_id, status FROM bookings WHERE id = $1 FOR UPDATE",
        )
        .bind(booking_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        let status = match owner {
            None => return Ok(CancelOutcome::NotFound),
            Some((owner_id, _)) if owner_id != user_id => return Ok(CancelOutcome::NotOwner),
            Some((_, status)) => status.parse::<BookingStatus>().map_err(StoreError::InvalidData)?,
        };
        if status == BookingStatus::Cancelled {
            return Ok(CancelOutcome::AlreadyCancelled);
        }

        let seat_ids: Vec<i64> = sqlx::query_scalar(
            "SELECT id FROM seats WHERE booking_id = $1 ORDER BY id FOR UPDATE",
        )
        .bind(booking_id)
        .fetch_all(&mut *self.tx)
        .await?;

        sqlx::query(
            "UPDATE seats
             SET status = 'available', booking_id = NULL, updated_at = NOW()
             WHERE id = ANY($1)",
        )
        .bind(&seat_ids)
        .execute(&mut *self.tx)
        .await?;

        sqlx::query("UPDATE bookings SET status = $2, cancelled_at = NOW() WHERE id = $1")
            .bind(booking_id)
            .bind(BookingStatus::Cancelled.as_str())
            .execute(&mut *self.tx)
            .await?;

        let mut bookings =
            fetch_bookings(&mut *self.tx, BookingFilter::Id(booking_id)).await?;

        bookings
            .pop()
            .map(CancelOutcome::Cancelled)
            .ok_or_else(|| {
                StoreError::InvariantViolation(format!("booking {} vanished during cancel", booking_id))
            })
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}
