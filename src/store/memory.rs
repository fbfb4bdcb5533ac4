//! Single-process store with the ledger's transactional semantics.
//!
//! Seat and booking rows each carry their own lock, taken in ascending id
//! order, so two transactions only wait on each other when they touch the same
//! rows. Writes are staged in the transaction and become visible all at once
//! on commit; readers always see committed state.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{
    grid_rows, BookingRecords, CancelOutcome, CatalogStore, LedgerTransaction, ReserveOutcome,
    SeatLedger, StoreError, StoreResult, UserStore,
};
use crate::models::{
    BookedSeat, Booking, BookingStatus, Movie, NewBooking, NewMovie, NewShow, NewUser, Seat,
    SeatLabel, SeatSelection, SeatStatus, Show, User,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum RowKey {
    Seat(i64),
    Booking(i64),
}

#[derive(Default)]
struct MemoryState {
    last_id: i64,
    users: BTreeMap<i64, User>,
    movies: BTreeMap<i64, Movie>,
    shows: BTreeMap<i64, Show>,
    seats: BTreeMap<i64, Seat>,
    seat_index: HashMap<(i64, SeatLabel), i64>,
    /// seat id -> active booking id
    seat_links: HashMap<i64, i64>,
    bookings: BTreeMap<i64, Booking>,
    row_locks: HashMap<RowKey, Arc<Mutex<()>>>,
}

impl MemoryState {
    fn next_id(&mut self) -> i64 {
        self.last_id += 1;
        self.last_id
    }

    fn row_lock(&mut self, key: RowKey) -> Arc<Mutex<()>> {
        self.row_locks.entry(key).or_default().clone()
    }

    /// Forgets locks nobody holds or waits for; the map keeps only in-flight rows.
    fn prune_row_locks(&mut self) {
        self.row_locks.retain(|_, lock| Arc::strong_count(lock) > 1);
    }

    fn insert_show(&mut self, show: NewShow) -> StoreResult<Show> {
        if !self.movies.contains_key(&show.movie_id) {
            return Err(StoreError::InvalidData(format!(
                "movie {} does not exist",
                show.movie_id
            )));
        }
        let id = self.next_id();
        let show = Show {
            id,
            movie_id: show.movie_id,
            starts_at: show.starts_at,
            price: show.price,
        };
        self.shows.insert(id, show.clone());
        Ok(show)
    }

    /// Adds the seats of `labels` that the show does not have yet.
    fn insert_grid(&mut self, show_id: i64, labels: &[SeatLabel]) {
        for label in labels {
            if self.seat_index.contains_key(&(show_id, *label)) {
                continue;
            }
            let id = self.next_id();
            self.seats.insert(
                id,
                Seat {
                    id,
                    show_id,
                    row: label.row().to_string(),
                    number: i32::from(label.number()),
                    status: SeatStatus::Available,
                },
            );
            self.seat_index.insert((show_id, *label), id);
        }
    }

    fn seats_of(&self, show_id: i64) -> Vec<Seat> {
        let mut seats: Vec<Seat> = self
            .seats
            .values()
            .filter(|seat| seat.show_id == show_id)
            .cloned()
            .collect();
        seats.sort_by(|a, b| (&a.row, a.number).cmp(&(&b.row, b.number)));
        seats
    }
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
    fail_booking_writes: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent `record_booking` fail as if the store went away
    /// after the seats were locked.
    pub fn set_fail_booking_writes(&self, fail: bool) {
        self.fail_booking_writes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn get_show(&self, show_id: i64) -> StoreResult<Option<Show>> {
        Ok(self.state.lock().await.shows.get(&show_id).cloned())
    }

    async fn create_movie(&self, movie: NewMovie) -> StoreResult<Movie> {
        let mut state = self.state.lock().await;
        let id = state.next_id();
        let movie = Movie {
            id,
            title: movie.title,
            duration: movie.duration,
            photo: movie.photo,
            created_at: Utc::now(),
        };
        state.movies.insert(id, movie.clone());
        Ok(movie)
    }

    async fn get_movie(&self, movie_id: i64) -> StoreResult<Option<Movie>> {
        Ok(self.state.lock().await.movies.get(&movie_id).cloned())
    }

    async fn list_movies(&self) -> StoreResult<Vec<Movie>> {
        Ok(self.state.lock().await.movies.values().cloned().collect())
    }

    async fn create_show(&self, show: NewShow) -> StoreResult<Show> {
        self.state.lock().await.insert_show(show)
    }

    async fn list_shows_for_movie(&self, movie_id: i64) -> StoreResult<Vec<Show>> {
        let state = self.state.lock().await;
        let mut shows: Vec<Show> = state
            .shows
            .values()
            .filter(|show| show.movie_id == movie_id)
            .cloned()
            .collect();
        shows.sort_by_key(|show| (show.starts_at, show.id));
        Ok(shows)
    }

    async fn create_seat_grid(
        &self,
        show_id: i64,
        rows: u8,
        seats_per_row: u16,
    ) -> StoreResult<Vec<Seat>> {
        let labels = grid_labels(rows, seats_per_row)?;
        let mut state = self.state.lock().await;
        if !state.shows.contains_key(&show_id) {
            return Err(StoreError::InvalidData(format!("show {} does not exist", show_id)));
        }
        state.insert_grid(show_id, &labels);
        Ok(state.seats_of(show_id))
    }

    async fn create_show_with_grid(
        &self,
        show: NewShow,
        rows: u8,
        seats_per_row: u16,
    ) -> StoreResult<(Show, Vec<Seat>)> {
        // Checked before anything is written, under the same lock as the inserts.
        let labels = grid_labels(rows, seats_per_row)?;
        let mut state = self.state.lock().await;
        let show = state.insert_show(show)?;
        state.insert_grid(show.id, &labels);
        let seats = state.seats_of(show.id);
        Ok((show, seats))
    }
}

fn grid_labels(rows: u8, seats_per_row: u16) -> StoreResult<Vec<SeatLabel>> {
    let mut labels = Vec::with_capacity(usize::from(rows) * usize::from(seats_per_row));
    for row in grid_rows(rows) {
        for number in 1..=seats_per_row {
            labels.push(
                SeatLabel::new(row, number).map_err(|e| StoreError::InvalidData(e.to_string()))?,
            );
        }
    }
    Ok(labels)
}

#[async_trait]
impl SeatLedger for MemoryStore {
    async fn list_seats(&self, show_id: i64) -> StoreResult<Vec<Seat>> {
        Ok(self.state.lock().await.seats_of(show_id))
    }

    async fn begin(&self) -> StoreResult<Box<dyn LedgerTransaction>> {
        Ok(Box::new(MemoryTransaction {
            state: self.state.clone(),
            fail_booking_writes: self.fail_booking_writes.clone(),
            guards: Vec::new(),
            reserved: Vec::new(),
            booking: None,
            cancelled: None,
        }))
    }
}

struct MemoryTransaction {
    state: Arc<Mutex<MemoryState>>,
    fail_booking_writes: Arc<AtomicBool>,
    guards: Vec<OwnedMutexGuard<()>>,
    reserved: Vec<i64>,
    booking: Option<Booking>,
    cancelled: Option<(i64, Vec<i64>)>,
}

impl MemoryTransaction {
    async fn lock_rows(&mut self, locks: Vec<Arc<Mutex<()>>>) {
        for lock in locks {
            self.guards.push(lock.lock_owned().await);
        }
    }
}

#[async_trait]
impl LedgerTransaction for MemoryTransaction {
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

        let (targets, locks) = {
            let mut state = self.state.lock().await;
            let mut targets = Vec::with_capacity(selection.len());
            let mut missing = Vec::new();
            for label in selection.labels() {
                match state.seat_index.get(&(show_id, *label)) {
                    Some(seat_id) => targets.push(BookedSeat { seat_id: *seat_id, label: *label }),
                    None => missing.push(*label),
                }
            }
            if !missing.is_empty() {
                return Ok(ReserveOutcome::NotFound(missing));
            }

            let mut ids: Vec<i64> = targets.iter().map(|seat| seat.seat_id).collect();
            ids.sort_unstable();
            let locks: Vec<_> = ids
                .into_iter()
                .map(|id| state.row_lock(RowKey::Seat(id)))
                .collect();
            (targets, locks)
        };

        self.lock_rows(locks).await;

        let state = self.state.lock().await;
        let taken: Vec<SeatLabel> = targets
            .iter()
            .filter(|seat| {
                state
                    .seats
                    .get(&seat.seat_id)
                    .is_some_and(|s| s.status == SeatStatus::Booked)
            })
            .map(|seat| seat.label)
            .collect();
        drop(state);

        if !taken.is_empty() {
            self.guards.clear();
            return Ok(ReserveOutcome::Conflict(taken));
        }

        self.reserved = targets.iter().map(|seat| seat.seat_id).collect();
        Ok(ReserveOutcome::Reserved(targets))
    }

    async fn record_booking(&mut self, booking: NewBooking) -> StoreResult<Booking> {
        if self.fail_booking_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("booking write rejected".to_string()));
        }
        if self.booking.is_some() {
            return Err(StoreError::InvariantViolation(
                "transaction already recorded a booking".to_string(),
            ));
        }
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

        let mut state = self.state.lock().await;
        for seat in &booking.seats {
            if let Some(other) = state.seat_links.get(&seat.seat_id) {
                return Err(StoreError::InvariantViolation(format!(
                    "seat {} is already linked to booking {}",
                    seat.label, other
                )));
            }
        }

        let record = Booking {
            id: state.next_id(),
            user_id: booking.user_id,
            show_id: booking.show_id,
            seats: booking.seats,
            status: BookingStatus::Confirmed,
            total_price: booking.total_price,
            created_at: Utc::now(),
        };
        self.booking = Some(record.clone());
        Ok(record)
    }

    async fn cancel_booking(
        &mut self,
        booking_id: i64,
        user_id: i64,
    ) -> StoreResult<CancelOutcome> {
        let booking_lock = self.state.lock().await.row_lock(RowKey::Booking(booking_id));
        self.guards.push(booking_lock.lock_owned().await);

        let (booking, seat_locks) = {
            let mut state = self.state.lock().await;
            let booking = match state.bookings.get(&booking_id) {
                Some(booking) => booking.clone(),
                None => return Ok(CancelOutcome::NotFound),
            };
            if booking.user_id != user_id {
                return Ok(CancelOutcome::NotOwner);
            }
            if booking.status == BookingStatus::Cancelled {
                return Ok(CancelOutcome::AlreadyCancelled);
            }

            let mut ids: Vec<i64> = booking.seats.iter().map(|seat| seat.seat_id).collect();
            ids.sort_unstable();
            let locks: Vec<_> = ids
                .into_iter()
                .map(|id| state.row_lock(RowKey::Seat(id)))
                .collect();
            (booking, locks)
        };

        self.lock_rows(seat_locks).await;

        let seat_ids = booking.seats.iter().map(|seat| seat.seat_id).collect();
        self.cancelled = Some((booking.id, seat_ids));
        Ok(CancelOutcome::Cancelled(Booking {
            status: BookingStatus::Cancelled,
            ..booking
        }))
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let MemoryTransaction {
            state: shared,
            guards,
            reserved,
            booking,
            cancelled,
            ..
        } = *self;

        let mut state = shared.lock().await;
        for seat_id in &reserved {
            if let Some(seat) = state.seats.get_mut(seat_id) {
                seat.status = SeatStatus::Booked;
            }
        }
        if let Some(booking) = booking {
            for seat in &booking.seats {
                state.seat_links.insert(seat.seat_id, booking.id);
            }
            state.bookings.insert(booking.id, booking);
        }
        if let Some((booking_id, seat_ids)) = cancelled {
            for seat_id in seat_ids {
                if let Some(seat) = state.seats.get_mut(&seat_id) {
                    seat.status = SeatStatus::Available;
                }
                state.seat_links.remove(&seat_id);
            }
            if let Some(booking) = state.bookings.get_mut(&booking_id) {
                booking.status = BookingStatus::Cancelled;
            }
        }

        // Row locks are released only once the writes are visible.
        drop(guards);
        state.prune_row_locks();
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        let MemoryTransaction {
            state: shared,
            guards,
            ..
        } = *self;
        drop(guards);
        shared.lock().await.prune_row_locks();
        Ok(())
    }
}

#[async_trait]
impl BookingRecords for MemoryStore {
    async fn get_booking(&self, booking_id: i64) -> StoreResult<Option<Booking>> {
        Ok(self.state.lock().await.bookings.get(&booking_id).cloned())
    }

    async fn bookings_for_show(&self, show_id: i64) -> StoreResult<Vec<Booking>> {
        let state = self.state.lock().await;
        Ok(state
            .bookings
            .values()
            .filter(|booking| booking.show_id == show_id)
            .cloned()
            .collect())
    }

    async fn bookings_for_user(&self, user_id: i64) -> StoreResult<Vec<Booking>> {
        let state = self.state.lock().await;
        let mut bookings: Vec<Booking> = state
            .bookings
            .values()
            .filter(|booking| booking.user_id == user_id)
            .cloned()
            .collect();
        bookings.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        Ok(bookings)
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn create_user(&self, user: NewUser) -> StoreResult<User> {
        let mut state = self.state.lock().await;
        if state.users.values().any(|existing| existing.email == user.email) {
            return Err(StoreError::Duplicate(format!("user {}", user.email)));
        }
        let id = state.next_id();
        let user = User {
            id,
            name: user.name,
            email: user.email,
            password_hash: user.password_hash,
            created_at: Utc::now(),
        };
        state.users.insert(id, user.clone());
        Ok(user)
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let state = self.state.lock().await;
        Ok(state.users.values().find(|user| user.email == email).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal::Decimal;

    async fn show_with_grid(store: &MemoryStore) -> Show {
        let movie = store
            .create_movie(NewMovie {
                title: "Inception".to_string(),
                duration: 148,
                photo: None,
            })
            .await
            .unwrap();
        let show = store
            .create_show(NewShow {
                movie_id: movie.id,
                starts_at: Utc.with_ymd_and_hms(2025, 4, 7, 10, 0, 0).unwrap(),
                price: Decimal::new(1250, 2),
            })
            .await
            .unwrap();
        store.create_seat_grid(show.id, 2, 5).await.unwrap();
        show
    }

    fn selection(labels: &[&str]) -> SeatSelection {
        SeatSelection::parse(labels.iter().copied()).unwrap()
    }

    #[tokio::test]
    async fn seat_grid_is_idempotent() {
        let store = MemoryStore::new();
        let show = show_with_grid(&store).await;

        let again = store.create_seat_grid(show.id, 2, 5).await.unwrap();
        assert_eq!(again.len(), 10);
        assert_eq!(again[0].label(), "A1");
        assert_eq!(again[9].label(), "B5");
    }

    #[tokio::test]
    async fn uncommitted_reservation_is_invisible_and_dropped_on_rollback() {
        let store = MemoryStore::new();
        let show = show_with_grid(&store).await;

        let mut tx = store.begin().await.unwrap();
        let outcome = tx.try_reserve(show.id, &selection(&["A1"])).await.unwrap();
        assert!(matches!(outcome, ReserveOutcome::Reserved(_)));

        let seats = store.list_seats(show.id).await.unwrap();
        assert!(seats.iter().all(|s| s.status == SeatStatus::Available));

        drop(tx);

        let mut retry = store.begin().await.unwrap();
        let outcome = retry.try_reserve(show.id, &selection(&["A1"])).await.unwrap();
        assert!(matches!(outcome, ReserveOutcome::Reserved(_)));
        retry.rollback().await.unwrap();
    }

    #[tokio::test]
    async fn unknown_labels_are_reported_without_locking() {
        let store = MemoryStore::new();
        let show = show_with_grid(&store).await;

        let mut holder = store.begin().await.unwrap();
        holder.try_reserve(show.id, &selection(&["A1"])).await.unwrap();

        // A1 is locked by `holder`; the lookup must not wait for it.
        let mut tx = store.begin().await.unwrap();
        let outcome = tx
            .try_reserve(show.id, &selection(&["A1", "C1", "A9"]))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            ReserveOutcome::NotFound(vec!["C1".parse().unwrap(), "A9".parse().unwrap()])
        );
    }

    #[tokio::test]
    async fn record_booking_requires_seats_reserved_in_the_transaction() {
        let store = MemoryStore::new();
        let show = show_with_grid(&store).await;
        let seat_id = store.list_seats(show.id).await.unwrap()[0].id;

        let mut tx = store.begin().await.unwrap();
        let err = tx
            .record_booking(NewBooking {
                user_id: 1,
                show_id: show.id,
                seats: vec![BookedSeat {
                    seat_id,
                    label: "A1".parse().unwrap(),
                }],
                total_price: Decimal::new(1250, 2),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvariantViolation(_)));
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected() {
        let store = MemoryStore::new();
        let new_user = || NewUser {
            name: "Ritam".to_string(),
            email: "ritam@example.com".to_string(),
            password_hash: "hash".to_string(),
        };
        store.create_user(new_user()).await.unwrap();
        let err = store.create_user(new_user()).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(_)));
    }

    #[tokio::test]
    async fn show_with_an_impossible_grid_is_not_created() {
        let store = MemoryStore::new();
        let movie = store
            .create_movie(NewMovie {
                title: "Memento".to_string(),
                duration: 113,
                photo: None,
            })
            .await
            .unwrap();
        let new_show = || NewShow {
            movie_id: movie.id,
            starts_at: Utc.with_ymd_and_hms(2025, 4, 7, 14, 0, 0).unwrap(),
            price: Decimal::new(900, 2),
        };

        let err = store
            .create_show_with_grid(new_show(), 1, 1000)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidData(_)));
        assert!(store.list_shows_for_movie(movie.id).await.unwrap().is_empty());

        let (show, seats) = store.create_show_with_grid(new_show(), 2, 3).await.unwrap();
        assert_eq!(seats.len(), 6);
        assert!(seats.iter().all(|seat| seat.status == SeatStatus::Available));
        assert_eq!(store.list_shows_for_movie(movie.id).await.unwrap(), vec![show]);
    }

    #[tokio::test]
    async fn finished_transactions_leave_no_row_locks_behind() {
        let store = MemoryStore::new();
        let show = show_with_grid(&store).await;

        let mut tx = store.begin().await.unwrap();
        tx.try_reserve(show.id, &selection(&["A1", "A2"])).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        tx.try_reserve(show.id, &selection(&["B1"])).await.unwrap();
        tx.rollback().await.unwrap();

        // Dropped without commit; the next commit sweeps its entry too.
        let mut tx = store.begin().await.unwrap();
        tx.try_reserve(show.id, &selection(&["B2"])).await.unwrap();
        drop(tx);
        let mut tx = store.begin().await.unwrap();
        tx.try_reserve(show.id, &selection(&["B3"])).await.unwrap();
        tx.commit().await.unwrap();

        assert!(store.state.lock().await.row_locks.is_empty());
    }
}
