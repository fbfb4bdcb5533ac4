use chrono::{NaiveDate, NaiveTime, TimeZone, Utc};
use rust_decimal::Decimal;
use tracing::info;

use crate::models::{NewMovie, NewShow, DEFAULT_GRID_ROWS, DEFAULT_SEATS_PER_ROW};
use crate::store::{CatalogStore, StoreError, StoreResult};

const MOVIES: [(&str, i32); 5] = [
    ("Inception", 148),
    ("The Dark Knight", 152),
    ("Interstellar", 169),
    ("The Matrix", 136),
    ("Avatar", 162),
];

/// (hour, minute, price in cents)
const SCHEDULE: [(u32, u32, i64); 4] = [(10, 0, 1250), (14, 30, 1500), (18, 30, 1700), (22, 0, 2000)];

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SeedSummary {
    pub movies: usize,
    pub shows: usize,
    pub seats: usize,
}

/// Fills an empty catalog with demo movies, shows and seat grids. A catalog
/// that already has movies is left alone.
pub async fn seed_demo_catalog(catalog: &dyn CatalogStore) -> StoreResult<SeedSummary> {
    if !catalog.list_movies().await?.is_empty() {
        info!("Catalog already populated, skipping demo seed");
        return Ok(SeedSummary::default());
    }

    let day = NaiveDate::from_ymd_opt(2025, 4, 7)
        .ok_or_else(|| StoreError::InvalidData("bad seed date".to_string()))?;

    let mut summary = SeedSummary::default();
    for (title, duration) in MOVIES {
        let movie = catalog
            .create_movie(NewMovie {
                title: title.to_string(),
                duration,
                photo: None,
            })
            .await?;
        summary.movies += 1;

        for (hour, minute, cents) in SCHEDULE {
            let time = NaiveTime::from_hms_opt(hour, minute, 0)
                .ok_or_else(|| StoreError::InvalidData("bad seed time".to_string()))?;
            let (_, seats) = catalog
                .create_show_with_grid(
                    NewShow {
                        movie_id: movie.id,
                        starts_at: Utc.from_utc_datetime(&day.and_time(time)),
                        price: Decimal::new(cents, 2),
                    },
                    DEFAULT_GRID_ROWS,
                    DEFAULT_SEATS_PER_ROW,
                )
                .await?;
            summary.shows += 1;
            summary.seats += seats.len();
        }
    }

    info!(
        "Seeded {} movies, {} shows, {} seats",
        summary.movies, summary.shows, summary.seats
    );
    Ok(summary)
}
