use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::str::FromStr;

use super::SeatLabel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Confirmed,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Cancelled => "cancelled",
        }
    }
}

impl FromStr for BookingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "confirmed" => Ok(BookingStatus::Confirmed),
            "cancelled" => Ok(BookingStatus::Cancelled),
            other => Err(format!("unknown booking status '{}'", other)),
        }
    }
}

/// A seat won by a booking, in the position the client requested it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BookedSeat {
    pub seat_id: i64,
    pub label: SeatLabel,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Booking {
    pub id: i64,
    pub user_id: i64,
    pub show_id: i64,
    pub seats: Vec<BookedSeat>,
    pub status: BookingStatus,
    pub total_price: Decimal,
    pub created_at: DateTime<Utc>,
}

impl Booking {
    pub fn seat_labels(&self) -> Vec<String> {
        self.seats.iter().map(|s| s.label.to_string()).collect()
    }

    pub fn is_active(&self) -> bool {
        self.status == BookingStatus::Confirmed
    }
}

/// Booking row written inside a reservation transaction.
#[derive(Debug, Clone)]
pub struct NewBooking {
    pub user_id: i64,
    pub show_id: i64,
    pub seats: Vec<BookedSeat>,
    pub total_price: Decimal,
}
