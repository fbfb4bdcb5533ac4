#![allow(dead_code)]

use chrono::{TimeZone, Utc};
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::sync::Arc;

use showtime_booking::models::{NewMovie, NewShow, SeatStatus, Show};
use showtime_booking::services::booking::BookingEngine;
use showtime_booking::store::memory::MemoryStore;
use showtime_booking::store::{BookingRecords, CatalogStore, SeatLedger};

/// A show priced at `price_cents` with a `rows` × `seats_per_row` grid.
pub async fn show_with_grid(
    store: &MemoryStore,
    price_cents: i64,
    rows: u8,
    seats_per_row: u16,
) -> Show {
    let movie = store
        .create_movie(NewMovie {
            title: "Interstellar".to_string(),
            duration: 169,
            photo: None,
        })
        .await
        .unwrap();
    let show = store
        .create_show(NewShow {
            movie_id: movie.id,
            starts_at: Utc.with_ymd_and_hms(2025, 4, 7, 14, 30, 0).unwrap(),
            price: Decimal::new(price_cents, 2),
        })
        .await
        .unwrap();
    store
        .create_seat_grid(show.id, rows, seats_per_row)
        .await
        .unwrap();
    show
}

pub fn engine(store: &MemoryStore) -> BookingEngine {
    BookingEngine::new(Arc::new(store.clone()), Arc::new(store.clone()))
}

pub fn labels(raw: &[&str]) -> Vec<String> {
    raw.iter().map(|s| s.to_string()).collect()
}

pub async fn seat_status(store: &MemoryStore, show_id: i64, label: &str) -> SeatStatus {
    store
        .list_seats(show_id)
        .await
        .unwrap()
        .into_iter()
        .find(|seat| seat.label() == label)
        .map(|seat| seat.status)
        .unwrap_or_else(|| panic!("no seat {}", label))
}

/// Booked seats of the show versus distinct seats held by confirmed bookings.
pub async fn ledger_counts(store: &MemoryStore, show_id: i64) -> (usize, usize) {
    let booked = store
        .list_seats(show_id)
        .await
        .unwrap()
        .iter()
        .filter(|seat| seat.status == SeatStatus::Booked)
        .count();

    let held: HashSet<i64> = store
        .bookings_for_show(show_id)
        .await
        .unwrap()
        .iter()
        .filter(|booking| booking.is_active())
        .flat_map(|booking| booking.seats.iter().map(|seat| seat.seat_id))
        .collect();

    (booked, held.len())
}
