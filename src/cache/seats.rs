use tracing::{debug, warn};

use super::CacheService;
use crate::models::Seat;
use crate::store::{SeatLedger, StoreResult};

fn seats_base(show_id: i64) -> String {
    format!("seats:{}", show_id)
}

impl CacheService {
    /// Seat map of a show, from Redis when fresh.
    pub async fn get_seats(&self, show_id: i64) -> StoreResult<Vec<Seat>> {
        // The key is fixed before the store read; see the module docs.
        let key = match self.seats_snapshot_key(show_id).await {
            Ok(key) => Some(key),
            Err(e) => {
                warn!("Seat cache unavailable for show {}: {:?}", show_id, e);
                None
            }
        };

        if let Some(key) = &key {
            match self.read_snapshot::<Vec<Seat>>(key).await {
                Ok(Some(seats)) => return Ok(seats),
                Ok(None) => debug!("Seat cache miss for show {}", show_id),
                Err(e) => warn!("Seat cache read failed for show {}: {:?}", show_id, e),
            }
        }

        let seats = self.store.list_seats(show_id).await?;
        if let Some(key) = &key {
            if let Err(e) = self.write_snapshot(key, &seats, self.seats_ttl).await {
                warn!("Seat cache write failed for show {}: {:?}", show_id, e);
            }
        }
        Ok(seats)
    }

    pub async fn invalidate_seats(&self, show_id: i64) {
        match self.bump_generation(&seats_base(show_id)).await {
            Ok(generation) => debug!(
                "Invalidated seats cache for show {} (generation {})",
                show_id, generation
            ),
            Err(e) => warn!("Failed to invalidate seats cache for show {}: {:?}", show_id, e),
        }
    }

    async fn seats_snapshot_key(&self, show_id: i64) -> redis::RedisResult<String> {
        self.snapshot_key(&seats_base(show_id)).await
    }
}
