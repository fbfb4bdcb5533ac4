use redis::{aio::MultiplexedConnection, Client};

/// Shared Redis handle; clones reuse one multiplexed connection.
#[derive(Clone)]
pub struct RedisClient {
    pub conn: MultiplexedConnection,
}

impl RedisClient {
    pub async fn new(redis_url: &str) -> redis::RedisResult<Self> {
        let client = Client::open(redis_url)?;
        let mut conn = client.get_multiplexed_async_connection().await?;
        // Fail at startup rather than on the first cached read.
        redis::cmd("PING").query_async::<String>(&mut conn).await?;
        Ok(RedisClient { conn })
    }
}
