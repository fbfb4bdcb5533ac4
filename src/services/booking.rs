//! Atomic reserve-or-fail over seats and booking records.
//!
//! A reservation is one [`LedgerTransaction`]: the seat status change and the
//! booking append either commit together or not at all. Any failure after
//! `begin` rolls the transaction back, so every error leaves the targeted
//! seats exactly as they were.

use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::models::{Booking, BookingStatus, NewBooking, SeatSelection, Show};
use crate::store::{
    CancelOutcome, CatalogStore, LedgerTransaction, ReserveOutcome, SeatLedger, StoreError,
};

#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("show {0} not found")]
    ShowNotFound(i64),
    #[error("seats not found: {}", .0.join(", "))]
    SeatNotFound(Vec<String>),
    #[error("seats already booked: {}", .0.join(", "))]
    SeatConflict(Vec<String>),
    #[error("{0}")]
    InvalidRequest(String),
    #[error("booking {0} not found")]
    BookingNotFound(i64),
    #[error("booking {0} belongs to another user")]
    Forbidden(i64),
    #[error("booking {0} is already cancelled")]
    AlreadyCancelled(i64),
    #[error("internal error: {0}")]
    Internal(String),
}

impl BookingError {
    /// Seat labels the caller should know about, if any.
    pub fn labels(&self) -> Option<&[String]> {
        match self {
            BookingError::SeatNotFound(labels) | BookingError::SeatConflict(labels) => {
                Some(labels)
            }
            _ => None,
        }
    }
}

/// Successful reservation as returned to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Confirmation {
    pub booking_id: i64,
    pub show_id: i64,
    pub seats: Vec<String>,
    pub total_price: Decimal,
    pub status: BookingStatus,
}

impl From<&Booking> for Confirmation {
    fn from(booking: &Booking) -> Self {
        Confirmation {
            booking_id: booking.id,
            show_id: booking.show_id,
            seats: booking.seat_labels(),
            total_price: booking.total_price,
            status: booking.status,
        }
    }
}

#[derive(Clone)]
pub struct BookingEngine {
    catalog: Arc<dyn CatalogStore>,
    ledger: Arc<dyn SeatLedger>,
}

impl BookingEngine {
    pub fn new(catalog: Arc<dyn CatalogStore>, ledger: Arc<dyn SeatLedger>) -> Self {
        Self { catalog, ledger }
    }

    pub async fn reserve(
        &self,
        show_id: i64,
        user_id: i64,
        seat_labels: &[String],
    ) -> Result<Confirmation, BookingError> {
        let show = self
            .catalog
            .get_show(show_id)
            .await
            .map_err(|e| internal("load show", e))?
            .ok_or(BookingError::ShowNotFound(show_id))?;

        if seat_labels.is_empty() {
            return Err(BookingError::InvalidRequest(
                "at least one seat must be requested".to_string(),
            ));
        }
        let selection = SeatSelection::parse(seat_labels)
            .map_err(|e| BookingError::InvalidRequest(e.to_string()))?;

        let mut tx = self
            .ledger
            .begin()
            .await
            .map_err(|e| internal("begin reservation", e))?;

        let booking = match reserve_in(tx.as_mut(), &show, user_id, &selection).await {
            Ok(booking) => booking,
            Err(e) => {
                abandon(tx, &e).await;
                return Err(e);
            }
        };

        tx.commit()
            .await
            .map_err(|e| internal("commit reservation", e))?;

        info!(
            "Booking {} confirmed: user {}, show {}, seats [{}], total {}",
            booking.id,
            user_id,
            show_id,
            booking.seat_labels().join(", "),
            booking.total_price
        );
        Ok(Confirmation::from(&booking))
    }

    /// Returns the booking's seats to the ledger. Only the owner may cancel.
    pub async fn cancel(&self, booking_id: i64, user_id: i64) -> Result<Booking, BookingError> {
        let mut tx = self
            .ledger
            .begin()
            .await
            .map_err(|e| internal("begin cancellation", e))?;

        let result = match tx.cancel_booking(booking_id, user_id).await {
            Ok(CancelOutcome::Cancelled(booking)) => Ok(booking),
            Ok(CancelOutcome::NotFound) => Err(BookingError::BookingNotFound(booking_id)),
            Ok(CancelOutcome::NotOwner) => Err(BookingError::Forbidden(booking_id)),
            Ok(CancelOutcome::AlreadyCancelled) => Err(BookingError::AlreadyCancelled(booking_id)),
            Err(e) => Err(internal("cancel booking", e)),
        };

        match result {
            Ok(booking) => {
                tx.commit()
                    .await
                    .map_err(|e| internal("commit cancellation", e))?;
                info!(
                    "Booking {} cancelled by user {}, released [{}]",
                    booking.id,
                    user_id,
                    booking.seat_labels().join(", ")
                );
                Ok(booking)
            }
            Err(e) => {
                abandon(tx, &e).await;
                Err(e)
            }
        }
    }
}

async fn reserve_in(
    tx: &mut dyn LedgerTransaction,
    show: &Show,
    user_id: i64,
    selection: &SeatSelection,
) -> Result<Booking, BookingError> {
    let seats = match tx
        .try_reserve(show.id, selection)
        .await
        .map_err(|e| internal("reserve seats", e))?
    {
        ReserveOutcome::Reserved(seats) => seats,
        ReserveOutcome::NotFound(labels) => {
            return Err(BookingError::SeatNotFound(
                labels.iter().map(ToString::to_string).collect(),
            ));
        }
        ReserveOutcome::Conflict(labels) => {
            let labels: Vec<String> = labels.iter().map(ToString::to_string).collect();
            debug!(
                "Seat conflict on show {} for user {}: [{}]",
                show.id,
                user_id,
                labels.join(", ")
            );
            return Err(BookingError::SeatConflict(labels));
        }
    };

    tx.record_booking(NewBooking {
        user_id,
        show_id: show.id,
        total_price: total_price(show.price, seats.len()),
        seats,
    })
    .await
    .map_err(|e| internal("record booking", e))
}

/// `price × count`, always carried with two decimal places.
pub fn total_price(price: Decimal, count: usize) -> Decimal {
    let mut total = price * Decimal::from(count);
    total.rescale(2);
    total
}

async fn abandon(tx: Box<dyn LedgerTransaction>, cause: &BookingError) {
    if let BookingError::Internal(reason) = cause {
        warn!("Rolling back after failure: {}", reason);
    }
    if let Err(e) = tx.rollback().await {
        // Dropping the connection aborts the transaction on the server side anyway.
        error!("Rollback failed: {:?}", e);
    }
}

fn internal(step: &str, e: StoreError) -> BookingError {
    match &e {
        StoreError::InvariantViolation(detail) => {
            error!("Invariant violation during {}: {}", step, detail);
        }
        _ => warn!("Store failure during {}: {:?}", step, e),
    }
    BookingError::Internal(format!("{} failed: {}", step, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewMovie, NewShow, SeatStatus};
    use crate::store::memory::MemoryStore;
    use crate::store::{BookingRecords, StoreResult};
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};

    /// Ledger whose booking append always reports a seat linked elsewhere.
    struct LinkedElsewhere(MemoryStore);

    struct LinkedElsewhereTx(Box<dyn LedgerTransaction>);

    #[async_trait]
    impl SeatLedger for LinkedElsewhere {
        async fn list_seats(&self, show_id: i64) -> StoreResult<Vec<crate::models::Seat>> {
            self.0.list_seats(show_id).await
        }

        async fn begin(&self) -> StoreResult<Box<dyn LedgerTransaction>> {
            Ok(Box::new(LinkedElsewhereTx(self.0.begin().await?)))
        }
    }

    #[async_trait]
    impl LedgerTransaction for LinkedElsewhereTx {
        async fn try_reserve(
            &mut self,
            show_id: i64,
            selection: &SeatSelection,
        ) -> StoreResult<ReserveOutcome> {
            self.0.try_reserve(show_id, selection).await
        }

        async fn record_booking(&mut self, _booking: NewBooking) -> StoreResult<Booking> {
            Err(StoreError::InvariantViolation(
                "seat A1 is already linked to booking 99".to_string(),
            ))
        }

        async fn cancel_booking(
            &mut self,
            booking_id: i64,
            user_id: i64,
        ) -> StoreResult<CancelOutcome> {
            self.0.cancel_booking(booking_id, user_id).await
        }

        async fn commit(self: Box<Self>) -> StoreResult<()> {
            self.0.commit().await
        }

        async fn rollback(self: Box<Self>) -> StoreResult<()> {
            self.0.rollback().await
        }
    }

    async fn show(store: &MemoryStore) -> Show {
        let movie = store
            .create_movie(NewMovie {
                title: "The Matrix".to_string(),
                duration: 136,
                photo: None,
            })
            .await
            .unwrap();
        let show = store
            .create_show(NewShow {
                movie_id: movie.id,
                starts_at: Utc.with_ymd_and_hms(2025, 4, 7, 18, 30, 0).unwrap(),
                price: Decimal::new(1700, 2),
            })
            .await
            .unwrap();
        store.create_seat_grid(show.id, 1, 5).await.unwrap();
        show
    }

    fn labels(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn total_price_keeps_two_decimals() {
        assert_eq!(total_price(Decimal::new(125, 1), 3).to_string(), "37.50");
        assert_eq!(total_price(Decimal::new(2000, 2), 1).to_string(), "20.00");
    }

    #[tokio::test]
    async fn invariant_violation_rolls_back_and_reports_internal() {
        let store = MemoryStore::new();
        let show = show(&store).await;
        let engine = BookingEngine::new(
            Arc::new(store.clone()),
            Arc::new(LinkedElsewhere(store.clone())),
        );

        let err = engine
            .reserve(show.id, 1, &labels(&["A1", "A2"]))
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::Internal(_)));

        let seats = store.list_seats(show.id).await.unwrap();
        assert!(seats.iter().all(|s| s.status == SeatStatus::Available));
        assert!(store.bookings_for_show(show.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn validation_order_is_show_then_empty_then_labels() {
        let store = MemoryStore::new();
        let show = show(&store).await;
        let engine = BookingEngine::new(Arc::new(store.clone()), Arc::new(store.clone()));

        let err = engine.reserve(show.id + 1000, 1, &[]).await.unwrap_err();
        assert!(matches!(err, BookingError::ShowNotFound(_)));

        let err = engine.reserve(show.id, 1, &[]).await.unwrap_err();
        assert!(matches!(err, BookingError::InvalidRequest(_)));

        let err = engine
            .reserve(show.id, 1, &labels(&["A1", "a1"]))
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::InvalidRequest(_)));

        let err = engine.reserve(show.id, 1, &labels(&["1A"])).await.unwrap_err();
        assert!(matches!(err, BookingError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn cancel_reports_each_refusal() {
        let store = MemoryStore::new();
        let show = show(&store).await;
        let engine = BookingEngine::new(Arc::new(store.clone()), Arc::new(store.clone()));

        let confirmation = engine.reserve(show.id, 7, &labels(&["A3"])).await.unwrap();

        let err = engine.cancel(confirmation.booking_id, 8).await.unwrap_err();
        assert!(matches!(err, BookingError::Forbidden(_)));

        let err = engine.cancel(confirmation.booking_id + 1000, 7).await.unwrap_err();
        assert!(matches!(err, BookingError::BookingNotFound(_)));

        let cancelled = engine.cancel(confirmation.booking_id, 7).await.unwrap();
        assert_eq!(cancelled.status, BookingStatus::Cancelled);
        assert_eq!(cancelled.seat_labels(), vec!["A3".to_string()]);

        let err = engine.cancel(confirmation.booking_id, 7).await.unwrap_err();
        assert!(matches!(err, BookingError::AlreadyCancelled(_)));
    }
}
