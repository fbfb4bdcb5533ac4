use anyhow::Context;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use showtime_booking::{
    app,
    cache::CacheService,
    config::{Config, LogFormat},
    database::Database,
    redis_client::RedisClient,
    services::seed::seed_demo_catalog,
    store::postgres::PgStore,
    AppState,
};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::from_env().context("Failed to load configuration")?;

    let registry =
        tracing_subscriber::registry().with(tracing_subscriber::EnvFilter::new(&config.app.rust_log));
    match config.app.log_format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }

    info!("Starting Showtime Booking API ({})", config.app.environment);

    let db = Database::new(&config.database)
        .await
        .context("Failed to connect to database")?;
    info!("Database connected");

    db.run_migrations()
        .await
        .context("Failed to run migrations")?;

    let store = Arc::new(PgStore::new(&db, config.database.lock_timeout()));

    let cache = match &config.redis.url {
        Some(url) => match RedisClient::new(url).await {
            Ok(redis) => {
                info!("Redis connected");
                let cache = CacheService::new(redis, store.clone(), &config.redis);
                cache.warmup_cache().await;
                Some(cache)
            }
            Err(e) => {
                warn!("Redis unavailable, serving without cache: {:?}", e);
                None
            }
        },
        None => {
            info!("REDIS_URL not set, serving without cache");
            None
        }
    };

    if config.features.seed_demo_data {
        seed_demo_catalog(store.as_ref())
            .await
            .context("Failed to seed demo catalog")?;
    }

    let addr = config.bind_address();
    let state = AppState::new(store, cache, config);
    let router = app(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Server listening on {}", addr);

    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    db.close().await;
    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
