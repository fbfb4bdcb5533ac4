//! Read-through Redis cache for catalog listings and seat maps.
//!
//! Only listing endpoints read through here. Reservations always go to the
//! store, and a failing Redis degrades to a store read.
//!
//! Every cached listing lives under a generation-scoped key
//! (`seats:7:v3`). Invalidation bumps the generation instead of deleting
//! the data, so a snapshot loaded before a write and saved after it lands
//! under a key that readers no longer ask for.

use redis::AsyncCommands;
use std::sync::Arc;
use tracing::info;

use crate::{config::RedisConfig, redis_client::RedisClient, store::Store};

pub mod movies;
pub mod seats;

#[derive(Clone)]
pub struct CacheService {
    redis: RedisClient,
    store: Arc<dyn Store>,
    seats_ttl: u64,
    movies_ttl: u64,
}

impl CacheService {
    pub fn new(redis: RedisClient, store: Arc<dyn Store>, config: &RedisConfig) -> Self {
        Self {
            redis,
            store,
            seats_ttl: config.seats_ttl_seconds,
            movies_ttl: config.movies_ttl_seconds,
        }
    }

    // Cache warmup at startup; only the movie list is worth preloading
    pub async fn warmup_cache(&self) {
        info!("Starting cache warmup...");
        match self.get_movies().await {
            Ok(movies) => info!("Cache warmup done: {} movies", movies.len()),
            Err(e) => tracing::warn!("Cache warmup skipped: {:?}", e),
        }
    }

    // Data key for the current generation of `base`
    async fn snapshot_key(&self, base: &str) -> redis::RedisResult<String> {
        let mut conn = self.redis.conn.clone();
        let generation: Option<u64> = conn.get(generation_key(base)).await?;
        Ok(versioned_key(base, generation.unwrap_or(0)))
    }

    // Retires every snapshot of `base` taken so far
    async fn bump_generation(&self, base: &str) -> redis::RedisResult<u64> {
        let mut conn = self.redis.conn.clone();
        conn.incr(generation_key(base), 1u64).await
    }

    async fn read_snapshot<T: serde::de::DeserializeOwned>(
        &self,
        key: &str,
    ) -> redis::RedisResult<Option<T>> {
        let mut conn = self.redis.conn.clone();
        let data: Option<String> = conn.get(key).await?;
        data.as_deref().map(decode).transpose()
    }

    async fn write_snapshot<T: serde::Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: u64,
    ) -> redis::RedisResult<()> {
        let data = encode(value)?;
        let mut conn = self.redis.conn.clone();
        conn.set_ex(key, data, ttl).await
    }
}

fn generation_key(base: &str) -> String {
    format!("{}:generation", base)
}

fn versioned_key(base: &str, generation: u64) -> String {
    format!("{}:v{}", base, generation)
}

fn encode<T: serde::Serialize + ?Sized>(value: &T) -> redis::RedisResult<String> {
    serde_json::to_string(value).map_err(|_| {
        redis::RedisError::from((redis::ErrorKind::TypeError, "Serialize error"))
    })
}

fn decode<T: serde::de::DeserializeOwned>(data: &str) -> redis::RedisResult<T> {
    serde_json::from_str(data)
        .map_err(|_| redis::RedisError::from((redis::ErrorKind::TypeError, "Parse error")))
}
