//! Postgres implementation of the store traits.
//!
//! Queries are built at runtime (`sqlx::query_as`) so the crate compiles
//! without a live database.

use sqlx::PgPool;
use std::time::Duration;

use crate::database::Database;
use crate::models::{Seat, SeatLabel, SeatStatus};

use super::{StoreError, StoreResult};

mod bookings;
mod catalog;
mod ledger;
mod users;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    lock_timeout: Duration,
}

impl PgStore {
    /// `lock_timeout` bounds how long a reservation waits on seat rows held
    /// by another transaction before aborting.
    pub fn new(db: &Database, lock_timeout: Duration) -> Self {
        Self {
            pool: db.pool.clone(),
            lock_timeout,
        }
    }
}

#[derive(sqlx::FromRow)]
struct SeatRow {
    id: i64,
    show_id: i64,
    seat_row: String,
    number: i32,
    status: String,
}

impl TryFrom<SeatRow> for Seat {
    type Error = StoreError;

    fn try_from(row: SeatRow) -> StoreResult<Self> {
        Ok(Seat {
            id: row.id,
            show_id: row.show_id,
            status: row.status.parse::<SeatStatus>().map_err(StoreError::InvalidData)?,
            row: row.seat_row,
            number: row.number,
        })
    }
}

fn stored_label(row: &str, number: i32) -> StoreResult<SeatLabel> {
    let mut chars = row.chars();
    let letter = chars
        .next()
        .filter(|_| chars.next().is_none())
        .ok_or_else(|| StoreError::InvalidData(format!("bad seat row '{}'", row)))?;
    let number = u16::try_from(number)
        .map_err(|_| StoreError::InvalidData(format!("bad seat number {}", number)))?;
    SeatLabel::new(letter, number).map_err(|e| StoreError::InvalidData(e.to_string()))
}
