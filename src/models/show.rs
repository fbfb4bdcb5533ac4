use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A scheduled screening. Every seat of a show costs `price`.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Show {
    pub id: i64,
    pub movie_id: i64,
    pub starts_at: DateTime<Utc>,
    pub price: Decimal,
}

#[derive(Debug, Clone)]
pub struct NewShow {
    pub movie_id: i64,
    pub starts_at: DateTime<Utc>,
    pub price: Decimal,
}

/// Rows `A..=J`.
pub const DEFAULT_GRID_ROWS: u8 = 10;
pub const DEFAULT_SEATS_PER_ROW: u16 = 15;
