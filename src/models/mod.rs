pub mod booking;
pub mod movie;
pub mod seat;
pub mod show;
pub mod user;

pub use booking::{BookedSeat, Booking, BookingStatus, NewBooking};
pub use movie::{Movie, NewMovie};
pub use seat::{LabelError, Seat, SeatLabel, SeatSelection, SeatStatus, SelectionError};
pub use show::{NewShow, Show, DEFAULT_GRID_ROWS, DEFAULT_SEATS_PER_ROW};
pub use user::{NewUser, User};
