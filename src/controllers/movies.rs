use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

use crate::error::ApiError;
use crate::extract::ApiJson;
use crate::middleware::AuthUser;
use crate::models::{Movie, NewMovie, Show};
use crate::store::CatalogStore;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/movies", get(list_movies).post(create_movie))
        .route("/movies/{movie_id}/shows", get(shows_for_movie))
}

// GET /api/movies
async fn list_movies(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.movies().await?))
}

#[derive(Debug, Deserialize, Validate)]
struct CreateMovieRequest {
    #[validate(length(min = 1, max = 200))]
    title: String,
    /// Minutes.
    #[validate(range(min = 1, max = 1000))]
    duration: i32,
    #[validate(url)]
    photo: Option<String>,
}

// POST /api/movies
async fn create_movie(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    ApiJson(req): ApiJson<CreateMovieRequest>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate()?;

    let movie = state
        .store
        .create_movie(NewMovie {
            title: req.title.trim().to_string(),
            duration: req.duration,
            photo: req.photo,
        })
        .await?;
    state.movies_changed().await;

    tracing::info!("User {} added movie {} '{}'", user.user_id, movie.id, movie.title);
    Ok((StatusCode::CREATED, Json(movie)))
}

#[derive(Debug, Serialize)]
struct MovieShows {
    movie: Movie,
    shows: Vec<Show>,
}

// GET /api/movies/{movie_id}/shows
async fn shows_for_movie(
    State(state): State<Arc<AppState>>,
    Path(movie_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let movie = state
        .store
        .get_movie(movie_id)
        .await?
        .ok_or_else(|| ApiError::not_found("MOVIE_NOT_FOUND", format!("movie {} not found", movie_id)))?;
    let shows = state.store.list_shows_for_movie(movie_id).await?;
    Ok(Json(MovieShows { movie, shows }))
}
