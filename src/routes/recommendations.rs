use axum::{extract::State, Extension, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::{
    error::{AppError, AppResult},
    middleware::request_id::RequestId,
    models::{ImdbId, MediaQuery, MediaType, ProviderKeys, RecOptions, ResolvedQuery},
    routes::AppState,
};

/// Either a free-text `search` or a structured `query`
///
/// `keys` and `options` replace the server defaults for this request only.
#[derive(Debug, Deserialize)]
pub struct RecommendationRequest {
    #[serde(default)]
    pub search: Option<String>,
    #[serde(rename = "type", default)]
    pub media_type: Option<MediaType>,
    #[serde(default)]
    pub query: Option<MediaQuery>,
    #[serde(default)]
    pub keys: Option<ProviderKeys>,
    #[serde(default)]
    pub options: Option<RecOptions>,
}

#[derive(Debug, Serialize)]
pub struct RecommendationResponse {
    pub query: ResolvedQuery,
    pub imdb_ids: Vec<ImdbId>,
}

impl RecommendationRequest {
    fn media_query(&self) -> AppResult<MediaQuery> {
        if let Some(query) = &self.query {
            return Ok(query.clone());
        }
        match self.search.as_deref() {
            Some(term) => MediaQuery::from_search(term, self.media_type.unwrap_or(MediaType::Movie)),
            None => Err(AppError::InvalidInput(
                "Request needs either `search` or `query`".to_string(),
            )),
        }
    }
}

/// Handler for recommendations endpoint
pub async fn recommend(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    Json(request): Json<RecommendationRequest>,
) -> AppResult<Json<RecommendationResponse>> {
    let query = request.media_query()?;
    let keys = request.keys.unwrap_or_else(|| state.default_keys.clone());
    let options = request
        .options
        .unwrap_or_else(|| state.default_options.clone());

    tracing::info!(
        request_id = %request_id,
        media_type = %query.media_type,
        sources = ?state.recommender.enabled_sources(&keys),
        "Processing recommendation request"
    );

    let Some(resolved) = state.resolver.resolve(query, &keys, &options).await? else {
        return Err(AppError::NotFound(
            "Query did not resolve to a known title".to_string(),
        ));
    };

    let imdb_ids = state.recommender.combine(&resolved, &keys, &options).await;

    tracing::info!(
        request_id = %request_id,
        imdb_id = %resolved.imdb_id,
        count = imdb_ids.len(),
        "Recommendations completed"
    );

    Ok(Json(RecommendationResponse {
        query: resolved,
        imdb_ids,
    }))
}
