use async_trait::async_trait;
use sqlx::{Executor, Postgres};

use super::{PgStore, SeatRow};
use crate::models::{Movie, NewMovie, NewShow, Seat, Show};
use crate::store::{grid_rows, CatalogStore, SeatLedger, StoreResult};

const MOVIE_COLUMNS: &str = "id, title, duration_minutes AS duration, photo, created_at";

#[async_trait]
impl CatalogStore for PgStore {
    async fn get_show(&self, show_id: i64) -> StoreResult<Option<Show>> {
        let show = sqlx::query_as::<_, Show>(
            "SELECT id, movie_id, starts_at, price FROM shows WHERE id = $1",
        )
        .bind(show_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(show)
    }

    async fn create_movie(&self, movie: NewMovie) -> StoreResult<Movie> {
        let movie = sqlx::query_as::<_, Movie>(&format!(
            "INSERT INTO movies (title, duration_minutes, photo)
             VALUES ($1, $2, $3)
             RETURNING {}",
            MOVIE_COLUMNS
        ))
        .bind(movie.title)
        .bind(movie.duration)
        .bind(movie.photo)
        .fetch_one(&self.pool)
        .await?;
        Ok(movie)
    }

    async fn get_movie(&self, movie_id: i64) -> StoreResult<Option<Movie>> {
        let movie = sqlx::query_as::<_, Movie>(&format!(
            "SELECT {} FROM movies WHERE id = $1",
            MOVIE_COLUMNS
        ))
        .bind(movie_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(movie)
    }

    async fn list_movies(&self) -> StoreResult<Vec<Movie>> {
        let movies = sqlx::query_as::<_, Movie>(&format!(
            "SELECT {} FROM movies ORDER BY id",
            MOVIE_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(movies)
    }

    async fn create_show(&self, show: NewShow) -> StoreResult<Show> {
        insert_show(&self.pool, show).await
    }

    async fn list_shows_for_movie(&self, movie_id: i64) -> StoreResult<Vec<Show>> {
        let shows = sqlx::query_as::<_, Show>(
            "SELECT id, movie_id, starts_at, price
             FROM shows
             WHERE movie_id = $1
             ORDER BY starts_at, id",
        )
        .bind(movie_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(shows)
    }

    async fn create_seat_grid(
        &self,
        show_id: i64,
        rows: u8,
        seats_per_row: u16,
    ) -> StoreResult<Vec<Seat>> {
        let inserted = insert_grid(&self.pool, show_id, rows, seats_per_row).await?;
        tracing::debug!("Seat grid for show {}: {} new seats", show_id, inserted);
        self.list_seats(show_id).await
    }

    async fn create_show_with_grid(
        &self,
        show: NewShow,
        rows: u8,
        seats_per_row: u16,
    ) -> StoreResult<(Show, Vec<Seat>)> {
        let mut tx = self.pool.begin().await?;

        // Any error drops `tx`, which rolls the show back with the grid.
        let show = insert_show(&mut *tx, show).await?;
        insert_grid(&mut *tx, show.id, rows, seats_per_row).await?;
        let seats = fetch_seats(&mut *tx, show.id).await?;

        tx.commit().await?;
        Ok((show, seats))
    }
}

async fn insert_show<'e, E>(executor: E, show: NewShow) -> StoreResult<Show>
where
    E: Executor<'e, Database = Postgres>,
{
    let show = sqlx::query_as::<_, Show>(
        "INSERT INTO shows (movie_id, starts_at, price)
         VALUES ($1, $2, $3)
         RETURNING id, movie_id, starts_at, price",
    )
    .bind(show.movie_id)
    .bind(show.starts_at)
    .bind(show.price)
    .fetch_one(executor)
    .await?;
    Ok(show)
}

/// Inserts the missing seats of the grid; returns how many were new.
async fn insert_grid<'e, E>(
    executor: E,
    show_id: i64,
    rows: u8,
    seats_per_row: u16,
) -> StoreResult<u64>
where
    E: Executor<'e, Database = Postgres>,
{
    let mut seat_rows = Vec::new();
    let mut numbers = Vec::new();
    for row in grid_rows(rows) {
        for number in 1..=i32::from(seats_per_row) {
            seat_rows.push(row.to_string());
            numbers.push(number);
        }
    }

    // Single bulk insert; reruns leave existing seats untouched.
    let inserted = sqlx::query(
        "INSERT INTO seats (show_id, seat_row, number)
         SELECT $1, grid.seat_row, grid.number
         FROM UNNEST($2::text[], $3::int4[]) AS grid(seat_row, number)
         ON CONFLICT (show_id, seat_row, number) DO NOTHING",
    )
    .bind(show_id)
    .bind(&seat_rows)
    .bind(&numbers)
    .execute(executor)
    .await?;
    Ok(inserted.rows_affected())
}

pub(super) async fn fetch_seats<'e, E>(executor: E, show_id: i64) -> StoreResult<Vec<Seat>>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as::<_, SeatRow>(
        "SELECT id, show_id, seat_row, number, status
         FROM seats
         WHERE show_id = $1
         ORDER BY seat_row, number",
    )
    .bind(show_id)
    .fetch_all(executor)
    .await?
    .into_iter()
    .map(Seat::try_from)
    .collect()
}
