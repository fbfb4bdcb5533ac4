use tracing::{debug, warn};

use super::CacheService;
use crate::models::Movie;
use crate::store::{CatalogStore, StoreResult};

const MOVIES_BASE: &str = "movies";

impl CacheService {
    pub async fn get_movies(&self) -> StoreResult<Vec<Movie>> {
        let key = match self.snapshot_key(MOVIES_BASE).await {
            Ok(key) => Some(key),
            Err(e) => {
                warn!("Movie list cache unavailable: {:?}", e);
                None
            }
        };

        if let Some(key) = &key {
            match self.read_snapshot::<Vec<Movie>>(key).await {
                Ok(Some(movies)) => return Ok(movies),
                Ok(None) => debug!("Movie list cache miss"),
                Err(e) => warn!("Movie list cache read failed: {:?}", e),
            }
        }

        let movies = self.store.list_movies().await?;
        if let Some(key) = &key {
            if let Err(e) = self.write_snapshot(key, &movies, self.movies_ttl).await {
                warn!("Movie list cache write failed: {:?}", e);
            }
        }
        Ok(movies)
    }

    pub async fn invalidate_movies(&self) {
        if let Err(e) = self.bump_generation(MOVIES_BASE).await {
            warn!("Failed to invalidate movie list cache: {:?}", e);
        }
    }
}
