use std::sync::Arc;

use more_like_this::{
    config::{CacheBackendKind, Config},
    db::{Cache, MemoryBackend, RedisBackend},
    routes::{create_router, AppState},
    services::IdMap,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "more_like_this=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let cache = match config.cache_backend {
        CacheBackendKind::Redis => {
            let backend = RedisBackend::connect(&config.redis_url, config.cache_ttl()).await?;
            tracing::info!(url = %config.redis_url, "Using Redis cache");
            Cache::new(Arc::new(backend))
        }
        CacheBackendKind::Memory => {
            tracing::info!(max_entries = config.cache_max_entries, "Using in-process cache");
            Cache::new(Arc::new(MemoryBackend::new(
                config.cache_ttl(),
                config.cache_max_entries,
            )))
        }
    };

    let id_map = IdMap::load(&config.id_map_path);
    let state = AppState::from_config(&config, id_map, cache)?;
    let app = create_router(Arc::new(state));

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "Server listening");
    axum::serve(listener, app).await?;

    Ok(())
}
