/// TasteDive API provider
///
/// TasteDive is searched by title. Its `info` block is its reading of the
/// query, which must translate back to the query's IMDB id before any of
/// its `results` are trusted.
use reqwest::Client as HttpClient;
use serde::Deserialize;
use std::sync::Arc;

use super::{confirm_query, ensure_success, non_empty, rank_candidates, settle, RecommendationSource};
use crate::{
    cached,
    db::{Cache, CacheKey},
    error::{AppError, AppResult},
    models::{MediaType, ProviderKeys, RecOptions, RecommendationEntry, ResolvedQuery, Source},
    services::resolver::IdTranslator,
};

fn endpoint(media_type: MediaType) -> &'static str {
    match media_type {
        MediaType::Movie => "movie",
        MediaType::Series => "show",
    }
}

/// Keeps ASCII letters, digits and spaces
pub fn clean_title(title: &str) -> String {
    title
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == ' ')
        .collect::<String>()
        .trim()
        .to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct TasteDiveItem {
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Similar {
    #[serde(default)]
    pub info: Vec<TasteDiveItem>,
    #[serde(default)]
    pub results: Vec<TasteDiveItem>,
}

#[derive(Debug, Deserialize)]
struct SimilarResponse {
    #[serde(default)]
    similar: Similar,
}

#[derive(Clone)]
pub struct TasteDiveClient {
    http_client: HttpClient,
    api_url: String,
}

impl TasteDiveClient {
    pub fn new(http_client: HttpClient, api_url: String) -> Self {
        Self {
            http_client,
            api_url,
        }
    }

    pub async fn similar(
        &self,
        title: &str,
        year: Option<i32>,
        media_type: MediaType,
        api_key: &str,
    ) -> AppResult<Similar> {
        let url = format!("{}/similar", self.api_url);
        let kind = endpoint(media_type);

        let mut search = clean_title(title);
        if let Some(year) = year {
            search = format!("{} {}", search, year);
        }
        let q = format!("{}:{}", kind, search);

        let response = self
            .http_client
            .get(&url)
            .query(&[
                ("q", q.as_str()),
                ("type", kind),
                ("slimit", "2"),
                ("k", api_key),
            ])
            .send()
            .await?;

        let response = ensure_success(response, "TasteDive").await?;
        let body: SimilarResponse = response.json().await?;
        Ok(body.similar)
    }
}

#[derive(Clone)]
pub struct TasteDiveSource {
    client: TasteDiveClient,
    translator: Arc<dyn IdTranslator>,
    cache: Cache,
}

impl TasteDiveSource {
    pub fn new(client: TasteDiveClient, translator: Arc<dyn IdTranslator>, cache: Cache) -> Self {
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
            .tastedive
            .usable()
            .ok_or_else(|| AppError::InvalidInput("TasteDive key is not valid".to_string()))?;

        let similar = self
            .client
            .similar(&query.title, query.year, query.media_type, api_key)
            .await?;

        self.rank(query, keys, similar).await
    }

    /// Confirms the `info` element, then translates `results` by title
    async fn rank(
        &self,
        query: &ResolvedQuery,
        keys: &ProviderKeys,
        similar: Similar,
    ) -> AppResult<Vec<RecommendationEntry>> {
        let understood = match similar.info.first() {
            Some(info) => {
                self.translator
                    .title_to_imdb(&info.name, query.year, query.media_type, keys)
                    .await
            }
            None => None,
        };
        confirm_query(Source::TasteDive, query, understood.as_ref())?;

        let entries = rank_candidates(query, similar.results, |item| async move {
            let imdb_id = self
                .translator
                .title_to_imdb(&item.name, None, query.media_type, keys)
                .await?;
            Some((imdb_id, None))
        })
        .await;

        non_empty(Source::TasteDive, entries)
    }
}

#[async_trait::async_trait]
impl RecommendationSource for TasteDiveSource {
    fn source(&self) -> Source {
        Source::TasteDive
    }

    fn is_enabled(&self, keys: &ProviderKeys) -> bool {
        keys.tastedive.usable().is_some()
    }

    async fn recommend(
        &self,
        query: &ResolvedQuery,
        keys: &ProviderKeys,
        _options: &RecOptions,
    ) -> Option<Vec<RecommendationEntry>> {
        if !self.is_enabled(keys) || query.title.trim().is_empty() {
            return None;
        }

        let this = self.clone();
        let owned_query = query.clone();
        let keys = keys.clone();

        let result = cached!(
            self.cache,
            CacheKey::recs(Source::TasteDive, query, false),
            async move { this.fetch(&owned_query, &keys).await }
        );

        settle(Source::TasteDive, query, result)
    }
}
