/// Watchmode API provider
///
/// `/title/{id}/details/` accepts either an IMDB id or a Watchmode id. For a
/// query it yields `similar_titles` as Watchmode ids, which are translated
/// through the offline dataset first and the same endpoint second.
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
    services::{id_map::media_type_from_tmdb, resolver::IdTranslator},
};

#[derive(Debug, Clone, Deserialize)]
pub struct WatchmodeDetails {
    pub id: u64,
    #[serde(default)]
    pub imdb_id: Option<String>,
    #[serde(default)]
    pub tmdb_id: Option<u64>,
    /// TMDB vocabulary: "movie" or "tv"
    #[serde(default)]
    pub tmdb_type: Option<String>,
    #[serde(default)]
    pub similar_titles: Vec<u64>,
}

impl WatchmodeDetails {
    pub fn media_type(&self) -> Option<MediaType> {
        self.tmdb_type.as_deref().and_then(media_type_from_tmdb)
    }

    pub fn imdb(&self) -> Option<ImdbId> {
        self.imdb_id.as_deref().and_then(ImdbId::parse)
    }
}

#[derive(Clone)]
pub struct WatchmodeClient {
    http_client: HttpClient,
    api_url: String,
}

impl WatchmodeClient {
    pub fn new(http_client: HttpClient, api_url: String) -> Self {
        Self {
            http_client,
            api_url,
        }
    }

    /// Title details by IMDB id or Watchmode id
    pub async fn details(&self, id: &str, api_key: &str) -> AppResult<WatchmodeDetails> {
        let url = format!("{}/title/{}/details/", self.api_url, id);

        let response = self
            .http_client
            .get(&url)
            .query(&[("apiKey", api_key)])
            .send()
            .await?;

        let response = ensure_success(response, "Watchmode").await?;
        Ok(response.json().await?)
    }
}

#[derive(Clone)]
pub struct WatchmodeSource {
    client: WatchmodeClient,
    translator: Arc<dyn IdTranslator>,
    cache: Cache,
}

impl WatchmodeSource {
    pub fn new(client: WatchmodeClient, translator: Arc<dyn IdTranslator>, cache: Cache) -> Self {
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
        let api_key = keys
            .watchmode
            .usable()
            .ok_or_else(|| AppError::InvalidInput("Watchmode key is not valid".to_string()))?;

        let details = self.client.details(query.imdb_id.as_str(), api_key).await?;

        if details.media_type() != Some(query.media_type) {
            return Err(AppError::NotFound(format!(
                "Watchmode record for {} is not a {}",
                query.imdb_id, query.media_type
            )));
        }

        let entries = rank_candidates(query, details.similar_titles, |watchmode_id| async move {
            let imdb_id = self
                .translator
                .to_imdb(ExternalId::Watchmode(watchmode_id), query.media_type, keys)
                .await?;
            Some((imdb_id, None))
        })
        .await;

        non_empty(Source::Watchmode, entries)
    }
}

#[async_trait::async_trait]
impl RecommendationSource for WatchmodeSource {
    fn source(&self) -> Source {
        Source::Watchmode
    }

    fn is_enabled(&self, keys: &ProviderKeys) -> bool {
        keys.watchmode.usable().is_some()
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
            CacheKey::recs(Source::Watchmode, query, false),
            async move { this.fetch(&owned_query, &keys).await }
        );

        settle(Source::Watchmode, query, result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_details_parse() {
        let json = r#"{
            "id": 1295258, "title": "Inception", "type": "movie",
            "imdb_id": "tt1375666", "tmdb_id": 27205, "tmdb_type": "movie",
            "similar_titles": [1337, 4242]
        }"#;
        let details: WatchmodeDetails = serde_json::from_str(json).unwrap();
        assert_eq!(details.media_type(), Some(MediaType::Movie));
        assert_eq!(details.imdb(), ImdbId::parse("tt1375666"));
        assert_eq!(details.similar_titles, vec![1337, 4242]);
    }

    #[test]
    fn test_details_without_similar_titles() {
        let json = r#"{"id": 3173903, "tmdb_type": "tv", "imdb_id": null}"#;
        let details: WatchmodeDetails = serde_json::from_str(json).unwrap();
        assert_eq!(details.media_type(), Some(MediaType::Series));
        assert_eq!(details.imdb(), None);
        assert!(details.similar_titles.is_empty());
    }
}
