/// Simkl API provider
///
/// `/{movies|tv}/{imdb}?extended=full` returns the same record whichever
/// endpoint is used, so the record's own type is checked against the query.
/// Recommendations come back as Simkl ids and are translated to IMDB.
use reqwest::Client as HttpClient;
use serde::Deserialize;
use std::sync::Arc;

use super::{ensure_success, non_empty, rank_candidates, settle, RecommendationSource};
use crate::{
    cached,
    db::{Cache, CacheKey},
    error::{AppError, AppResult},
    models::{
        ExternalId, ImdbId, MediaType, ProviderKeys, RecOptions, RecommendationEntry,
        ResolvedQuery, Source,
    },
    services::resolver::IdTranslator,
};

fn endpoint(media_type: MediaType) -> &'static str {
    match media_type {
        MediaType::Movie => "movies",
        MediaType::Series => "tv",
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SimklIds {
    #[serde(default)]
    pub simkl: Option<u64>,
    #[serde(default)]
    pub imdb: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SimklRecommendation {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub ids: SimklIds,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SimklDetails {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub anime_type: Option<String>,
    #[serde(default)]
    pub ids: SimklIds,
    #[serde(default)]
    pub users_recommendations: Vec<SimklRecommendation>,
}

impl SimklDetails {
    /// The record's media type, reading anime through `anime_type`
    pub fn media_type(&self) -> Option<MediaType> {
        let kind = match self.kind.as_deref()? {
            "anime" => self.anime_type.as_deref()?,
            other => other,
        };
        match kind {
            "movie" => Some(MediaType::Movie),
            "tv" | "show" => Some(MediaType::Series),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct IdSearchHit {
    #[serde(default)]
    ids: SimklIds,
}

#[derive(Clone)]
pub struct SimklClient {
    http_client: HttpClient,
    api_url: String,
}

impl SimklClient {
    pub fn new(http_client: HttpClient, api_url: String) -> Self {
        Self {
            http_client,
            api_url,
        }
    }

    async fn get<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        client_id: &str,
        params: &[(&str, String)],
    ) -> AppResult<T> {
        let url = format!("{}{}", self.api_url, path);

        let response = self
            .http_client
            .get(&url)
            .header("simkl-api-key", client_id)
            .query(params)
            .send()
            .await?;

        let response = ensure_success(response, "Simkl").await?;
        Ok(response.json().await?)
    }

    /// Full record for an IMDB or Simkl id
    pub async fn details(
        &self,
        id: &str,
        media_type: MediaType,
        client_id: &str,
    ) -> AppResult<SimklDetails> {
        self.get(
            &format!("/{}/{}", endpoint(media_type), id),
            client_id,
            &[("extended", "full".to_string())],
        )
        .await
    }

    pub async fn imdb_id(
        &self,
        simkl_id: u64,
        media_type: MediaType,
        client_id: &str,
    ) -> AppResult<Option<ImdbId>> {
        let details = self
            .details(&simkl_id.to_string(), media_type, client_id)
            .await?;
        Ok(details.ids.imdb.as_deref().and_then(ImdbId::parse))
    }

    pub async fn simkl_id(&self, imdb_id: &ImdbId, client_id: &str) -> AppResult<Option<u64>> {
        let hits: Vec<IdSearchHit> = self
            .get("/search/id", client_id, &[("imdb", imdb_id.to_string())])
            .await?;
        Ok(hits.into_iter().find_map(|hit| hit.ids.simkl))
    }
}

#[derive(Clone)]
pub struct SimklSource {
    client: SimklClient,
    translator: Arc<dyn IdTranslator>,
    cache: Cache,
}

impl SimklSource {
    pub fn new(client: SimklClient, translator: Arc<dyn IdTranslator>, cache: Cache) -> Self {
        Self {
            client,
            translator,
            cache,
        }
    }

    async fn fetch(
        &self,
        query: &ResolvedQuery,
        keys: &ProviderKeys,
    ) -> AppResult<Vec<RecommendationEntry>> {
        let client_id = keys
            .simkl
            .usable()
            .ok_or_else(|| AppError::InvalidInput("Simkl key is not valid".to_string()))?;

        let details = self
            .client
            .details(query.imdb_id.as_str(), query.media_type, client_id)
            .await?;

        if details.media_type() != Some(query.media_type) {
            return Err(AppError::NotFound(format!(
                "Simkl record for {} is not a {}",
                query.imdb_id, query.media_type
            )));
        }

        let entries = rank_candidates(query, details.users_recommendations, |rec| async move {
            let simkl_id = rec.ids.simkl?;
            let imdb_id = self
                .translator
                .to_imdb(ExternalId::Simkl(simkl_id), query.media_type, keys)
                .await?;
            Some((imdb_id, None))
        })
        .await;

        non_empty(Source::Simkl, entries)
    }
}

#[async_trait::async_trait]
impl RecommendationSource for SimklSource {
    fn source(&self) -> Source {
        Source::Simkl
    }

    fn is_enabled(&self, keys: &ProviderKeys) -> bool {
        keys.simkl.usable().is_some()
    }

    async fn recommend(
        &self,
        query: &ResolvedQuery,
        keys: &ProviderKeys,
        _options: &RecOptions,
    ) -> Option<Vec<RecommendationEntry>> {
        if !self.is_enabled(keys) {
            return None;
        }

        let this = self.clone();
        let owned_query = query.clone();
        let keys = keys.clone();

        let result = cached!(
            self.cache,
            CacheKey::recs(Source::Simkl, query, false),
            async move { this.fetch(&owned_query, &keys).await }
        );

        settle(Source::Simkl, query, result)
    }
}
