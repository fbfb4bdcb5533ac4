mod common;

use std::collections::HashSet;

use common::{engine, ledger_counts, show_with_grid};
use proptest::prelude::*;
use showtime_booking::services::booking::BookingError;
use showtime_booking::store::memory::MemoryStore;
use showtime_booking::store::BookingRecords;

#[derive(Debug, Clone)]
enum Op {
    Reserve { user: i64, seats: Vec<(u8, u8)> },
    Cancel { user: i64, pick: usize },
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (1..4i64, prop::collection::vec((0..3u8, 1..5u8), 1..4))
            .prop_map(|(user, seats)| Op::Reserve { user, seats }),
        1 => (1..4i64, 0..8usize).prop_map(|(user, pick)| Op::Cancel { user, pick }),
    ]
}

fn label((row, number): (u8, u8)) -> String {
    format!("{}{}", char::from(b'A' + row), number)
}

async fn apply(
    engine: &showtime_booking::services::booking::BookingEngine,
    show_id: i64,
    confirmed: &[i64],
    op: Op,
) -> Option<i64> {
    match op {
        Op::Reserve { user, seats } => {
            let seats: Vec<String> = seats.into_iter().map(label).collect();
            match engine.reserve(show_id, user, &seats).await {
                Ok(confirmation) => Some(confirmation.booking_id),
                Err(BookingError::SeatConflict(_)) | Err(BookingError::InvalidRequest(_)) => None,
                Err(other) => panic!("unexpected reserve error {:?}", other),
            }
        }
        Op::Cancel { user, pick } => {
            if let Some(booking_id) = confirmed.get(pick % confirmed.len().max(1)) {
                match engine.cancel(*booking_id, user).await {
                    Ok(_)
                    | Err(BookingError::Forbidden(_))
                    | Err(BookingError::AlreadyCancelled(_)) => {}
                    Err(other) => panic!("unexpected cancel error {:?}", other),
                }
            }
            None
        }
    }
}

async fn assert_no_drift(store: &MemoryStore, show_id: i64) {
    let (booked, held) = ledger_counts(store, show_id).await;
    assert_eq!(booked, held, "booked seats drifted from confirmed bookings");

    // No seat belongs to two confirmed bookings.
    let mut seen = HashSet::new();
    for booking in store.bookings_for_show(show_id).await.unwrap() {
        if booking.is_active() {
            for seat in &booking.seats {
                assert!(seen.insert(seat.seat_id), "seat {} double-booked", seat.label);
            }
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn sequential_operations_never_drift(ops in prop::collection::vec(op(), 1..30)) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        runtime.block_on(async {
            let store = MemoryStore::new();
            let show = show_with_grid(&store, 1250, 3, 4).await;
            let engine = engine(&store);
            let mut confirmed = Vec::new();

            for op in ops {
                if let Some(id) = apply(&engine, show.id, &confirmed, op).await {
                    confirmed.push(id);
                }
                assert_no_drift(&store, show.id).await;
            }
        });
    }

    #[test]
    fn concurrent_batches_never_drift(
        batches in prop::collection::vec(prop::collection::vec(op(), 1..6), 1..6)
    ) {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(4)
            .enable_all()
            .build()
            .unwrap();

        runtime.block_on(async {
            let store = MemoryStore::new();
            let show = show_with_grid(&store, 1250, 3, 4).await;
            let show_id = show.id;
            let engine = engine(&store);
            let mut confirmed: Vec<i64> = Vec::new();

            for batch in batches {
                let snapshot = confirmed.clone();
                let tasks = batch.into_iter().map(|op| {
                    let engine = engine.clone();
                    let snapshot = snapshot.clone();
                    tokio::spawn(async move { apply(&engine, show_id, &snapshot, op).await })
                });
                for joined in futures::future::join_all(tasks).await {
                    if let Some(id) = joined.unwrap() {
                        confirmed.push(id);
                    }
                }
                assert_no_drift(&store, show.id).await;
            }
        });
    }
}
