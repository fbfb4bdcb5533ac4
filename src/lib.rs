pub mod cache;
pub mod config;
pub mod controllers;
pub mod database;
pub mod error;
pub mod extract;
pub mod middleware;
pub mod models;
pub mod redis_client;
pub mod services;
pub mod store;

use axum::{
    http::{header, Method},
    routing::get,
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::models::{Movie, Seat};
use crate::services::{auth::AuthService, booking::BookingEngine};
use crate::store::{CatalogStore, SeatLedger, Store, StoreResult};

// Shared state for every handler
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub engine: BookingEngine,
    pub auth: AuthService,
    pub cache: Option<cache::CacheService>,
    pub config: config::Config,
}

impl AppState {
    pub fn new<S: Store + 'static>(
        store: Arc<S>,
        cache: Option<cache::CacheService>,
        config: config::Config,
    ) -> Arc<Self> {
        let engine = BookingEngine::new(store.clone(), store.clone());
        let auth = AuthService::new(&config.jwt);
        Arc::new(Self {
            store,
            engine,
            auth,
            cache,
            config,
        })
    }

    pub async fn movies(&self) -> StoreResult<Vec<Movie>> {
        match &self.cache {
            Some(cache) => cache.get_movies().await,
            None => self.store.list_movies().await,
        }
    }

    pub async fn seats(&self, show_id: i64) -> StoreResult<Vec<Seat>> {
        match &self.cache {
            Some(cache) => cache.get_seats(show_id).await,
            None => self.store.list_seats(show_id).await,
        }
    }

    pub async fn seats_changed(&self, show_id: i64) {
        if let Some(cache) = &self.cache {
            cache.invalidate_seats(show_id).await;
        }
    }

    pub async fn movies_changed(&self) {
        if let Some(cache) = &self.cache {
            cache.invalidate_movies().await;
        }
    }
}

/// Full HTTP application: health checks, `/api` routes, CORS and request tracing.
pub fn app(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    Router::new()
        .route("/", get(|| async { "Showtime Booking API v1.0" }))
        .route("/health", get(|| async { "OK" }))
        .nest("/api", controllers::routes())
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
