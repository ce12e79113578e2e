/// TMDB API provider
///
/// Serves three roles: metadata for IMDB ids (`/find`), title search for the
/// resolver, and a recommendation source.
///
/// API Flow:
/// 1. IMDB → TMDB id: offline dataset, else /find/{imdb_id}
/// 2. Recommendations: /{movie|tv}/{tmdb_id}/recommendations
/// 3. Optional collection siblings: /movie/{id} → /collection/{collection_id}
/// 4. Each recommended TMDB id → IMDB: offline dataset, else /{type}/{id}/external_ids
use reqwest::Client as HttpClient;
use serde::Deserialize;
use std::sync::Arc;

use super::{ensure_success, non_empty, rank_candidates, settle, year_from_date, RecommendationSource};
use crate::{
    cached,
    db::{Cache, CacheKey},
    error::{AppError, AppResult},
    models::{
        ExternalId, IdSpace, ImdbId, MediaType, ProviderKeys, RecOptions, RecommendationEntry,
        ResolvedQuery, Source,
    },
    services::resolver::{IdTranslator, TitleMeta},
};

/// TMDB's path segment for a media type
fn endpoint(media_type: MediaType) -> &'static str {
    match media_type {
        MediaType::Movie => "movie",
        MediaType::Series => "tv",
    }
}

/// A movie or tv record as returned by search, find and recommendations
#[derive(Debug, Clone, Deserialize)]
pub struct TmdbTitle {
    pub id: u64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub first_air_date: Option<String>,
}

impl TmdbTitle {
    /// Movies carry `title`/`release_date`, tv shows `name`/`first_air_date`
    pub fn inferred_type(&self) -> MediaType {
        if self.title.is_some() || self.release_date.is_some() {
            MediaType::Movie
        } else {
            MediaType::Series
        }
    }

    pub fn display_title(&self) -> Option<&str> {
        self.title.as_deref().or(self.name.as_deref())
    }

    pub fn year(&self) -> Option<i32> {
        self.release_date
            .as_deref()
            .or(self.first_air_date.as_deref())
            .and_then(year_from_date)
    }
}

#[derive(Debug, Deserialize)]
struct Page {
    #[serde(default)]
    results: Vec<TmdbTitle>,
}

#[derive(Debug, Deserialize)]
struct FindResponse {
    #[serde(default)]
    movie_results: Vec<TmdbTitle>,
    #[serde(default)]
    tv_results: Vec<TmdbTitle>,
}

#[derive(Debug, Deserialize)]
struct ExternalIds {
    #[serde(default)]
    imdb_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MovieDetails {
    #[serde(default)]
    belongs_to_collection: Option<CollectionRef>,
}

#[derive(Debug, Deserialize)]
struct CollectionRef {
    id: u64,
}

#[derive(Debug, Deserialize)]
struct Collection {
    #[serde(default)]
    parts: Vec<TmdbTitle>,
}

#[derive(Clone)]
pub struct TmdbClient {
    http_client: HttpClient,
    api_url: String,
}

impl TmdbClient {
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
            .query(&[("api_key", api_key)])
            .query(params)
            .send()
            .await?;

        let response = ensure_success(response, "TMDB").await?;
        Ok(response.json().await?)
    }

    /// Looks up an IMDB id, returning the record under the requested type
    ///
    /// `Err(NotFound)` when TMDB only knows the id under the other type.
    pub async fn find_by_imdb(
        &self,
        imdb_id: &ImdbId,
        media_type: MediaType,
        api_key: &str,
        language: &str,
    ) -> AppResult<Option<TmdbTitle>> {
        let found: FindResponse = self
            .get(
                &format!("/find/{}", imdb_id),
                api_key,
                &[
                    ("external_source", "imdb_id".to_string()),
                    ("language", language.to_string()),
                ],
            )
            .await?;

        let (wanted, other) = match media_type {
            MediaType::Movie => (found.movie_results, found.tv_results),
            MediaType::Series => (found.tv_results, found.movie_results),
        };

        match wanted.into_iter().next() {
            Some(title) => Ok(Some(title)),
            None if !other.is_empty() => Err(AppError::NotFound(format!(
                "{} is not a {} on TMDB",
                imdb_id, media_type
            ))),
            None => Ok(None),
        }
    }

    pub async fn search(
        &self,
        title: &str,
        year: Option<i32>,
        media_type: MediaType,
        api_key: &str,
    ) -> AppResult<Vec<TmdbTitle>> {
        let mut params = vec![
            ("query", title.to_string()),
            ("include_adult", "false".to_string()),
            ("page", "1".to_string()),
        ];
        if let Some(year) = year {
            let year_param = match media_type {
                MediaType::Movie => "year",
                MediaType::Series => "first_air_date_year",
            };
            params.push((year_param, year.to_string()));
        }

        let page: Page = self
            .get(&format!("/search/{}", endpoint(media_type)), api_key, &params)
            .await?;
        Ok(page.results)
    }

    pub async fn recommendations(
        &self,
        tmdb_id: u64,
        media_type: MediaType,
        api_key: &str,
        language: &str,
    ) -> AppResult<Vec<TmdbTitle>> {
        let page: Page = self
            .get(
                &format!("/{}/{}/recommendations", endpoint(media_type), tmdb_id),
                api_key,
                &[("language", language.to_string()), ("page", "1".to_string())],
            )
            .await?;
        Ok(page.results)
    }

    pub async fn imdb_id(
        &self,
        tmdb_id: u64,
        media_type: MediaType,
        api_key: &str,
    ) -> AppResult<Option<ImdbId>> {
        let ids: ExternalIds = self
            .get(
                &format!("/{}/{}/external_ids", endpoint(media_type), tmdb_id),
                api_key,
                &[],
            )
            .await?;
        Ok(ids.imdb_id.as_deref().and_then(ImdbId::parse))
    }

    /// Other movies of the collection `tmdb_id` belongs to, in release order
    pub async fn collection_siblings(&self, tmdb_id: u64, api_key: &str) -> AppResult<Vec<u64>> {
        let details: MovieDetails = self
            .get(&format!("/movie/{}", tmdb_id), api_key, &[])
            .await?;

        let Some(collection) = details.belongs_to_collection else {
            return Ok(Vec::new());
        };

        let collection: Collection = self
            .get(&format!("/collection/{}", collection.id), api_key, &[])
            .await?;

        Ok(release_order(collection.parts, tmdb_id))
    }
}

/// Sorts collection parts by release date, unreleased last, excluding `own_id`
fn release_order(mut parts: Vec<TmdbTitle>, own_id: u64) -> Vec<u64> {
    parts.retain(|part| part.id != own_id);
    parts.sort_by(|a, b| {
        let a = a.release_date.as_deref().filter(|d| !d.is_empty());
        let b = b.release_date.as_deref().filter(|d| !d.is_empty());
        match (a, b) {
            (Some(a), Some(b)) => a.cmp(b),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        }
    });
    parts.into_iter().map(|part| part.id).collect()
}

impl From<TmdbTitle> for TitleMeta {
    fn from(title: TmdbTitle) -> Self {
        let media_type = title.inferred_type();
        let year = title.year();
        TitleMeta {
            title: title.display_title().unwrap_or_default().to_string(),
            year,
            media_type,
            tmdb_id: Some(title.id),
        }
    }
}

/// TMDB recommendations, optionally led by the query's collection siblings
#[derive(Clone)]
pub struct TmdbSource {
    client: TmdbClient,
    translator: Arc<dyn IdTranslator>,
    cache: Cache,
}

impl TmdbSource {
    pub fn new(client: TmdbClient, translator: Arc<dyn IdTranslator>, cache: Cache) -> Self {
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
        language: &str,
        include_collections: bool,
    ) -> AppResult<Vec<RecommendationEntry>> {
        let api_key = keys
            .tmdb
            .usable()
            .ok_or_else(|| AppError::InvalidInput("TMDB key is not valid".to_string()))?;

        let tmdb_id = match query.tmdb_id {
            Some(id) => id,
            None => match self
                .translator
                .from_imdb(&query.imdb_id, IdSpace::Tmdb, query.media_type, keys)
                .await
            {
                Some(ExternalId::Tmdb(id)) => id,
                _ => {
                    return Err(AppError::NotFound(format!(
                        "No TMDB id for {}",
                        query.imdb_id
                    )))
                }
            },
        };

        let mut candidates = Vec::new();
        if include_collections {
            match self.client.collection_siblings(tmdb_id, api_key).await {
                Ok(siblings) => candidates.extend(siblings),
                Err(e) => tracing::warn!(provider = "tmdb", tmdb_id, error = %e, "Collection lookup failed"),
            }
        }

        let recs = self
            .client
            .recommendations(tmdb_id, query.media_type, api_key, language)
            .await?;
        candidates.extend(recs.into_iter().map(|rec| rec.id));

        let entries = rank_candidates(query, candidates, |id| async move {
            let imdb_id = self
                .translator
                .to_imdb(ExternalId::Tmdb(id), query.media_type, keys)
                .await?;
            Some((imdb_id, Some(id)))
        })
        .await;

        non_empty(Source::Tmdb, entries)
    }
}

#[async_trait::async_trait]
impl RecommendationSource for TmdbSource {
    fn source(&self) -> Source {
        Source::Tmdb
    }

    fn is_enabled(&self, keys: &ProviderKeys) -> bool {
        keys.tmdb.usable().is_some()
    }

    async fn recommend(
        &self,
        query: &ResolvedQuery,
        keys: &ProviderKeys,
        options: &RecOptions,
    ) -> Option<Vec<RecommendationEntry>> {
        if !self.is_enabled(keys) {
            return None;
        }

        let include_collections =
            options.include_collections && query.media_type == MediaType::Movie;

        let this = self.clone();
        let owned_query = query.clone();
        let keys = keys.clone();
        let language = options.language.clone();

        // Language only localizes titles; the cached ids are the same in every language
        let result = cached!(
            self.cache,
            CacheKey::recs(Source::Tmdb, query, include_collections),
            async move {
                this.fetch(&owned_query, &keys, &language, include_collections)
                    .await
            }
        );

        settle(Source::Tmdb, query, result)
    }
}
