/// Recommendation source abstraction
///
/// Each provider module holds a thin HTTP client plus, where the provider
/// recommends titles, a `RecommendationSource` adapter. Adapters hide the
/// provider's id space and vocabulary: the aggregator only ever sees
/// `RecommendationEntry` lists keyed by IMDB id.
use chrono::Datelike;
use futures::future::join_all;
use reqwest::{Client as HttpClient, Response};
use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;

use crate::{
    config::Config,
    error::{AppError, AppResult},
    models::{ImdbId, ProviderKeys, RecOptions, RecommendationEntry, ResolvedQuery, Source},
};

pub mod cinemeta;
pub mod gemini;
pub mod kitsu;
pub mod simkl;
pub mod tastedive;
pub mod tmdb;
pub mod trakt;
pub mod watchmode;

/// Uniform contract of one recommendation provider
///
/// `recommend` returns `None` when the provider is disabled, failed, or
/// answered about a different title than the one queried.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait RecommendationSource: Send + Sync {
    fn source(&self) -> Source;

    /// Whether `keys` carries a usable credential for this provider
    fn is_enabled(&self, keys: &ProviderKeys) -> bool;

    async fn recommend(
        &self,
        query: &ResolvedQuery,
        keys: &ProviderKeys,
        options: &RecOptions,
    ) -> Option<Vec<RecommendationEntry>>;
}

/// HTTP clients for every external service, sharing one connection pool
#[derive(Clone)]
pub struct ProviderClients {
    pub tmdb: tmdb::TmdbClient,
    pub trakt: trakt::TraktClient,
    pub simkl: simkl::SimklClient,
    pub tastedive: tastedive::TasteDiveClient,
    pub gemini: gemini::GeminiClient,
    pub watchmode: watchmode::WatchmodeClient,
    pub kitsu: kitsu::KitsuClient,
    pub cinemeta: cinemeta::CinemetaClient,
}

impl ProviderClients {
    pub fn from_config(config: &Config) -> AppResult<Self> {
        let http_client = build_http_client(config.http_timeout())?;

        Ok(Self {
            tmdb: tmdb::TmdbClient::new(http_client.clone(), config.tmdb_api_url.clone()),
            trakt: trakt::TraktClient::new(http_client.clone(), config.trakt_api_url.clone()),
            simkl: simkl::SimklClient::new(http_client.clone(), config.simkl_api_url.clone()),
            tastedive: tastedive::TasteDiveClient::new(
                http_client.clone(),
                config.tastedive_api_url.clone(),
            ),
            gemini: gemini::GeminiClient::new(
                http_client.clone(),
                config.gemini_api_url.clone(),
                config.gemini_model.clone(),
                config.gemini_rec_limit,
            ),
            watchmode: watchmode::WatchmodeClient::new(
                http_client.clone(),
                config.watchmode_api_url.clone(),
            ),
            kitsu: kitsu::KitsuClient::new(http_client.clone(), config.kitsu_api_url.clone()),
            cinemeta: cinemeta::CinemetaClient::new(http_client, config.cinemeta_api_url.clone()),
        })
    }
}

pub fn build_http_client(timeout: Duration) -> AppResult<HttpClient> {
    let client = HttpClient::builder()
        .timeout(timeout)
        .user_agent(concat!("more-like-this/", env!("CARGO_PKG_VERSION")))
        .build()?;
    Ok(client)
}

/// Maps a non-2xx response to `AppError::ExternalApi`
pub(crate) async fn ensure_success(response: Response, provider: &str) -> AppResult<Response> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Err(AppError::ExternalApi(format!(
        "{} API returned status {}: {}",
        provider, status, body
    )))
}

/// Year of a "YYYY-MM-DD" date, or of a bare leading "YYYY"
pub(crate) fn year_from_date(date: &str) -> Option<i32> {
    let date = date.trim();
    if let Ok(parsed) = chrono::NaiveDate::parse_from_str(date, "%Y-%m-%d") {
        return Some(parsed.year());
    }
    let prefix: String = date.chars().take_while(|c| c.is_ascii_digit()).collect();
    (prefix.len() == 4).then(|| prefix.parse().ok()).flatten()
}

/// Verifies a title-search provider understood the query
///
/// `found` is the provider's own reading of the query, translated back to IMDB.
pub(crate) fn confirm_query(
    source: Source,
    query: &ResolvedQuery,
    found: Option<&ImdbId>,
) -> AppResult<()> {
    match found {
        Some(id) if *id == query.imdb_id => Ok(()),
        Some(id) => Err(AppError::ProviderMismatch {
            provider: source.as_str(),
            expected: query.imdb_id.to_string(),
            found: id.to_string(),
        }),
        None => Err(AppError::ProviderMismatch {
            provider: source.as_str(),
            expected: query.imdb_id.to_string(),
            found: "no match".to_string(),
        }),
    }
}

/// Translates candidates concurrently and ranks them by provider order
///
/// `ranking` is the candidate's 1-based position in `candidates`. Candidates
/// that fail translation, resolve to the query itself or repeat an earlier
/// id are dropped without renumbering the rest.
pub(crate) async fn rank_candidates<C, F, Fut>(
    query: &ResolvedQuery,
    candidates: Vec<C>,
    translate: F,
) -> Vec<RecommendationEntry>
where
    F: Fn(C) -> Fut,
    Fut: Future<Output = Option<(ImdbId, Option<u64>)>>,
{
    let translated = join_all(candidates.into_iter().map(translate)).await;

    let mut seen = HashSet::new();
    translated
        .into_iter()
        .enumerate()
        .filter_map(|(index, translated)| {
            let (imdb_id, tmdb_id) = translated?;
            if imdb_id == query.imdb_id || !seen.insert(imdb_id.clone()) {
                return None;
            }
            Some(RecommendationEntry {
                imdb_id,
                tmdb_id,
                ranking: index as u32 + 1,
            })
        })
        .collect()
}

/// Turns an empty list into `NotFound` so it is not cached
pub(crate) fn non_empty(
    source: Source,
    entries: Vec<RecommendationEntry>,
) -> AppResult<Vec<RecommendationEntry>> {
    if entries.is_empty() {
        return Err(AppError::NotFound(format!("{} returned no recommendations", source)));
    }
    Ok(entries)
}

/// Collapses an adapter's result to the `Option` contract, logging failures
pub(crate) fn settle(
    source: Source,
    query: &ResolvedQuery,
    result: AppResult<Vec<RecommendationEntry>>,
) -> Option<Vec<RecommendationEntry>> {
    match result {
        Ok(entries) => {
            tracing::info!(
                provider = source.as_str(),
                imdb_id = %query.imdb_id,
                count = entries.len(),
                "Fetched recommendations"
            );
            Some(entries)
        }
        Err(AppError::NotFound(reason)) => {
            tracing::info!(provider = source.as_str(), imdb_id = %query.imdb_id, reason = %reason, "Empty catalog");
            None
        }
        Err(e @ AppError::ProviderMismatch { .. }) => {
            tracing::warn!(provider = source.as_str(), error = %e, "Provider resolved a different title");
            None
        }
        Err(e) => {
            tracing::warn!(provider = source.as_str(), imdb_id = %query.imdb_id, error = %e, "Provider failed");
            None
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::{imdb, inception};
    use super::*;

    #[test]
    fn test_year_from_date() {
        assert_eq!(year_from_date("2010-07-15"), Some(2010));
        assert_eq!(year_from_date("2011–2019"), Some(2011));
        assert_eq!(year_from_date(""), None);
        assert_eq!(year_from_date("TBA"), None);
    }

    #[test]
    fn test_confirm_query() {
        let query = inception();
        assert!(confirm_query(Source::Gemini, &query, Some(&imdb("tt1375666"))).is_ok());

        let err = confirm_query(Source::Gemini, &query, Some(&imdb("tt0816692"))).unwrap_err();
        assert!(matches!(err, AppError::ProviderMismatch { provider: "gemini", .. }));
        assert!(confirm_query(Source::TasteDive, &query, None).is_err());
    }

    #[tokio::test]
    async fn test_rank_candidates_keeps_provider_positions() {
        let query = inception();
        let candidates = vec!["tt0816692", "bogus", "tt1375666", "tt0482571", "tt0816692"];

        let entries = rank_candidates(&query, candidates, |raw| async move {
            ImdbId::parse(raw).map(|id| (id, None))
        })
        .await;

        let ranked: Vec<(&str, u32)> = entries
            .iter()
            .map(|e| (e.imdb_id.as_str(), e.ranking))
            .collect();
        assert_eq!(ranked, vec![("tt0816692", 1), ("tt0482571", 4)]);
    }

    #[test]
    fn test_non_empty() {
        assert!(matches!(non_empty(Source::Trakt, vec![]), Err(AppError::NotFound(_))));
    }

    #[test]
    fn test_settle_maps_errors_to_none() {
        let query = inception();
        let mismatch = AppError::ProviderMismatch {
            provider: "tastedive",
            expected: "tt1375666".to_string(),
            found: "tt0816692".to_string(),
        };
        assert_eq!(settle(Source::TasteDive, &query, Err(mismatch)), None);
        assert_eq!(settle(Source::Trakt, &query, Ok(vec![])), Some(vec![]));
    }
}
