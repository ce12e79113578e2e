use axum::{
    http::StatusCode,
    middleware,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    config::Config,
    db::Cache,
    error::AppResult,
    middleware::request_id::{make_span_with_request_id, request_id_middleware},
    models::{ProviderKeys, RecOptions},
    services::{
        providers::{
            gemini::GeminiSource, simkl::SimklSource, tastedive::TasteDiveSource,
            tmdb::TmdbSource, trakt::TraktSource, watchmode::WatchmodeSource, ProviderClients,
            RecommendationSource,
        },
        title_search::strategies_from_names,
        IdMap, IdResolver, IdTranslator, Recommender,
    },
};

pub mod recommendations;
pub mod resolve;

/// Shared handles for every request
pub struct AppState {
    pub resolver: IdResolver,
    pub recommender: Recommender,
    /// Server-side keys, used when a request brings none
    pub default_keys: ProviderKeys,
    pub default_options: RecOptions,
}

impl AppState {
    /// Wires clients, resolver and sources from configuration
    pub fn from_config(config: &Config, id_map: IdMap, cache: Cache) -> AppResult<Self> {
        let clients = ProviderClients::from_config(config)?;
        let id_map = Arc::new(id_map);

        let strategies = strategies_from_names(&config.title_lookup_order, &clients, id_map.clone());
        let resolver = IdResolver::new(id_map, clients.clone(), strategies, cache.clone());
        let translator: Arc<dyn IdTranslator> = Arc::new(resolver.clone());

        let sources: Vec<Arc<dyn RecommendationSource>> = vec![
            Arc::new(TmdbSource::new(clients.tmdb.clone(), translator.clone(), cache.clone())),
            Arc::new(TraktSource::new(clients.trakt.clone(), translator.clone(), cache.clone())),
            Arc::new(SimklSource::new(clients.simkl.clone(), translator.clone(), cache.clone())),
            Arc::new(TasteDiveSource::new(
                clients.tastedive.clone(),
                translator.clone(),
                cache.clone(),
            )),
            Arc::new(GeminiSource::new(clients.gemini.clone(), translator.clone(), cache.clone())),
            Arc::new(WatchmodeSource::new(clients.watchmode, translator, cache.clone())),
        ];

        Ok(Self {
            resolver,
            recommender: Recommender::new(sources, cache, config.source_timeout()),
            default_keys: config.default_keys(),
            default_options: config.rec_options(),
        })
    }
}

/// Creates the application router with all routes
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1", api_routes())
        .layer(TraceLayer::new_for_http().make_span_with(make_span_with_request_id))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// API routes under /api/v1
fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/resolve", get(resolve::resolve))
        .route("/recommendations", post(recommendations::recommend))
}

/// Health check endpoint
async fn health_check() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "status": "healthy" })))
}
