use axum::{
    extract::{Query, State},
    Extension, Json,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::{
    error::{AppError, AppResult},
    middleware::request_id::RequestId,
    models::{MediaQuery, MediaType, ResolvedQuery},
    routes::AppState,
};

#[derive(Debug, Deserialize)]
pub struct ResolveParams {
    search: String,
    #[serde(rename = "type", default)]
    media_type: Option<MediaType>,
}

/// Handler for resolving a search term to its IMDB id, title and year
pub async fn resolve(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    Query(params): Query<ResolveParams>,
) -> AppResult<Json<ResolvedQuery>> {
    let media_type = params.media_type.unwrap_or(MediaType::Movie);
    let query = MediaQuery::from_search(&params.search, media_type)?;

    tracing::info!(
        request_id = %request_id,
        search = %params.search,
        media_type = %query.media_type,
        "Resolving query"
    );

    let resolved = state
        .resolver
        .resolve(query, &state.default_keys, &state.default_options)
        .await?;

    resolved
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("No title matches '{}'", params.search)))
}
