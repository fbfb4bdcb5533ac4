pub mod bookings;
pub mod movies;
pub mod shows;
pub mod users;

use axum::Router;
use std::sync::Arc;

pub fn routes() -> Router<Arc<crate::AppState>> {
    Router::new()
        .merge(users::routes())
        .merge(movies::routes())
        .merge(shows::routes())
        .merge(bookings::routes())
}
