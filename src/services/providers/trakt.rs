/// Trakt API provider
///
/// Trakt answers `/related` directly for an IMDB id and reports the IMDB id of
/// most related titles, so translation is only needed for the few that lack one.
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

const API_VERSION: &str = "2";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TraktIds {
    #[serde(default)]
    pub trakt: Option<u64>,
    #[serde(default)]
    pub imdb: Option<String>,
    #[serde(default)]
    pub tmdb: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TraktTitle {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub ids: TraktIds,
}

/// Search hits wrap the title under a "movie" or "show" field
#[derive(Debug, Deserialize)]
struct SearchHit {
    #[serde(default)]
    movie: Option<TraktTitle>,
    #[serde(default)]
    show: Option<TraktTitle>,
}

impl SearchHit {
    fn into_title(self, media_type: MediaType) -> Option<TraktTitle> {
        match media_type {
            MediaType::Movie => self.movie,
            MediaType::Series => self.show,
        }
    }
}

/// Singular form used by /search, plural by everything else
fn endpoint(media_type: MediaType, plural: bool) -> &'static str {
    match (media_type, plural) {
        (MediaType::Movie, false) => "movie",
        (MediaType::Movie, true) => "movies",
        (MediaType::Series, false) => "show",
        (MediaType::Series, true) => "shows",
    }
}

#[derive(Clone)]
pub struct TraktClient {
    http_client: HttpClient,
    api_url: String,
}

impl TraktClient {
    pub fn new(http_client: HttpClient, api_url: String) -> Self {
        Self {
            http_client,
            api_url,
        }
    }

    async fn get<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        api_key: &str,
        params: &[(&str, String)],
    ) -> AppResult<T> {
        let url = format!("{}{}", self.api_url, path);

        let response = self
            .http_client
            .get(&url)
            .header("Content-Type", "application/json")
            .header("trakt-api-version", API_VERSION)
            .header("trakt-api-key", api_key)
            .query(params)
            .send()
            .await?;

        let response = ensure_success(response, "Trakt").await?;
        Ok(response.json().await?)
    }

    pub async fn related(
        &self,
        imdb_id: &ImdbId,
        media_type: MediaType,
        api_key: &str,
    ) -> AppResult<Vec<TraktTitle>> {
        self.get(
            &format!("/{}/{}/related", endpoint(media_type, true), imdb_id),
            api_key,
            &[],
        )
        .await
    }

    pub async fn search(
        &self,
        title: &str,
        year: Option<i32>,
        media_type: MediaType,
        api_key: &str,
    ) -> AppResult<Vec<TraktTitle>> {
        let mut params = vec![("query", title.to_string())];
        if let Some(year) = year {
            params.push(("years", year.to_string()));
        }

        let hits: Vec<SearchHit> = self
            .get(&format!("/search/{}", endpoint(media_type, false)), api_key, &params)
            .await?;
        Ok(hits
            .into_iter()
            .filter_map(|hit| hit.into_title(media_type))
            .collect())
    }

    /// Looks up a title by one of its ids (`id_type` is "imdb", "tmdb" or "trakt")
    pub async fn lookup(
        &self,
        id_type: &str,
        id: &str,
        media_type: MediaType,
        api_key: &str,
    ) -> AppResult<Option<TraktTitle>> {
        let hits: Vec<SearchHit> = self
            .get(
                &format!("/search/{}/{}", id_type, id),
                api_key,
                &[("type", endpoint(media_type, false).to_string())],
            )
            .await?;
        Ok(hits
            .into_iter()
            .find_map(|hit| hit.into_title(media_type)))
    }
}

#[derive(Clone)]
pub struct TraktSource {
    client: TraktClient,
    translator: Arc<dyn IdTranslator>,
    cache: Cache,
}

impl TraktSource {
    pub fn new(client: TraktClient, translator: Arc<dyn IdTranslator>, cache: Cache) -> Self {
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
            .trakt
            .usable()
            .ok_or_else(|| AppError::InvalidInput("Trakt key is not valid".to_string()))?;

        let related = self
            .client
            .related(&query.imdb_id, query.media_type, api_key)
            .await?;

        let entries = rank_candidates(query, related, |title| async move {
            if let Some(imdb_id) = title.ids.imdb.as_deref().and_then(ImdbId::parse) {
                return Some((imdb_id, title.ids.tmdb));
            }
            let tmdb_id = title.ids.tmdb?;
            let imdb_id = self
                .translator
                .to_imdb(ExternalId::Tmdb(tmdb_id), query.media_type, keys)
                .await?;
            Some((imdb_id, Some(tmdb_id)))
        })
        .await;

        non_empty(Source::Trakt, entries)
    }
}

#[async_trait::async_trait]
impl RecommendationSource for TraktSource {
    fn source(&self) -> Source {
        Source::Trakt
    }

    fn is_enabled(&self, keys: &ProviderKeys) -> bool {
        keys.trakt.usable().is_some()
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
            CacheKey::recs(Source::Trakt, query, false),
            async move { this.fetch(&owned_query, &keys).await }
        );

        settle(Source::Trakt, query, result)
    }
}
