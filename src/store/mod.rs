//! Persistence seams.
//!
//! Every component gets its store handle injected at construction time; there
//! is no process-wide connection. [`postgres::PgStore`] is the production
//! implementation, [`memory::MemoryStore`] keeps the same transactional
//! guarantees inside one process for tests and local runs.
//!
//! Seat coordination happens only inside a [`LedgerTransaction`]. The
//! transaction handle is the lock token: seat rows locked by `try_reserve`
//! stay locked until `commit` or `rollback`, and dropping an uncommitted
//! transaction rolls it back.

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::models::{
    BookedSeat, Booking, Movie, NewBooking, NewMovie, NewShow, NewUser, Seat, SeatLabel,
    SeatSelection, Show, User,
};

pub mod memory;
pub mod postgres;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("{0} already exists")]
    Duplicate(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
    #[error("invalid stored data: {0}")]
    InvalidData(String),
}

/// Result of the atomic seat transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReserveOutcome {
    /// Every requested seat moved from available to booked, in request order.
    Reserved(Vec<BookedSeat>),
    /// Seats that were already booked; nothing changed.
    Conflict(Vec<SeatLabel>),
    /// Labels that name no seat of the show; no lock was taken.
    NotFound(Vec<SeatLabel>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelOutcome {
    Cancelled(Booking),
    NotFound,
    NotOwner,
    AlreadyCancelled,
}

#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn get_show(&self, show_id: i64) -> StoreResult<Option<Show>>;

    async fn get_price(&self, show_id: i64) -> StoreResult<Option<Decimal>> {
        Ok(self.get_show(show_id).await?.map(|show| show.price))
    }

    async fn create_movie(&self, movie: NewMovie) -> StoreResult<Movie>;

    async fn get_movie(&self, movie_id: i64) -> StoreResult<Option<Movie>>;

    async fn list_movies(&self) -> StoreResult<Vec<Movie>>;

    async fn create_show(&self, show: NewShow) -> StoreResult<Show>;

    async fn list_shows_for_movie(&self, movie_id: i64) -> StoreResult<Vec<Show>>;

    /// Creates rows `A..` (`rows` of them) with seats `1..=seats_per_row`, all
    /// available. Calling it again for the same show returns the existing grid.
    async fn create_seat_grid(
        &self,
        show_id: i64,
        rows: u8,
        seats_per_row: u16,
    ) -> StoreResult<Vec<Seat>>;

    /// `create_show` and `create_seat_grid` as one unit of work: if the grid
    /// cannot be created the show is not created either.
    async fn create_show_with_grid(
        &self,
        show: NewShow,
        rows: u8,
        seats_per_row: u16,
    ) -> StoreResult<(Show, Vec<Seat>)>;
}

#[async_trait]
pub trait SeatLedger: Send + Sync {
    /// Committed seats of a show ordered by row then number.
    async fn list_seats(&self, show_id: i64) -> StoreResult<Vec<Seat>>;

    async fn begin(&self) -> StoreResult<Box<dyn LedgerTransaction>>;
}

#[async_trait]
pub trait LedgerTransaction: Send {
    /// Locks exactly the selected seats and books them if all are available.
    async fn try_reserve(
        &mut self,
        show_id: i64,
        selection: &SeatSelection,
    ) -> StoreResult<ReserveOutcome>;

    /// Appends the booking for seats reserved earlier in this transaction and
    /// links them to it.
    async fn record_booking(&mut self, booking: NewBooking) -> StoreResult<Booking>;

    /// Returns a confirmed booking's seats to the ledger.
    async fn cancel_booking(&mut self, booking_id: i64, user_id: i64)
        -> StoreResult<CancelOutcome>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;

    async fn rollback(self: Box<Self>) -> StoreResult<()>;
}

#[async_trait]
pub trait BookingRecords: Send + Sync {
    async fn get_booking(&self, booking_id: i64) -> StoreResult<Option<Booking>>;

    async fn bookings_for_show(&self, show_id: i64) -> StoreResult<Vec<Booking>>;

    /// Newest first.
    async fn bookings_for_user(&self, user_id: i64) -> StoreResult<Vec<Booking>>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create_user(&self, user: NewUser) -> StoreResult<User>;

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;
}

/// Everything the HTTP layer needs from one backing store.
pub trait Store: CatalogStore + SeatLedger + BookingRecords + UserStore {}

impl<T> Store for T where T: CatalogStore + SeatLedger + BookingRecords + UserStore {}

/// Row letters for a grid of `rows` rows, starting at `A`.
pub(crate) fn grid_rows(rows: u8) -> impl Iterator<Item = char> {
    (b'A'..=b'Z').take(usize::from(rows)).map(char::from)
}
