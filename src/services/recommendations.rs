use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::{
    cached,
    db::{Cache, CacheKey},
    error::AppError,
    models::{
        ImdbId, ProviderKeys, RankingPolicy, RecOptions, RecommendationEntry, ResolvedQuery,
        Source,
    },
    services::providers::RecommendationSource,
};

/// A candidate during the merge, with how many sources named it and where
#[derive(Debug, Clone)]
struct ScoredEntry {
    entry: RecommendationEntry,
    occurrence_count: u32,
    ranking_sum: f64,
}

impl ScoredEntry {
    fn average_rank(&self) -> f64 {
        self.ranking_sum / f64::from(self.occurrence_count)
    }
}

/// Fans out to every enabled source and merges their lists into one ranking
#[derive(Clone)]
pub struct Recommender {
    sources: Vec<Arc<dyn RecommendationSource>>,
    cache: Cache,
    source_timeout: Duration,
}

impl Recommender {
    pub fn new(
        sources: Vec<Arc<dyn RecommendationSource>>,
        cache: Cache,
        source_timeout: Duration,
    ) -> Self {
        Self {
            sources,
            cache,
            source_timeout,
        }
    }

    /// Sources that would take part for `keys`
    pub fn enabled_sources(&self, keys: &ProviderKeys) -> Vec<Source> {
        self.sources
            .iter()
            .filter(|source| source.is_enabled(keys))
            .map(|source| source.source())
            .collect()
    }

    /// Combined, deduplicated ranking of recommended IMDB ids for `query`
    ///
    /// Never fails: providers that time out, error or disagree about the
    /// query contribute nothing, and an empty list is a normal answer.
    pub async fn combine(
        &self,
        query: &ResolvedQuery,
        keys: &ProviderKeys,
        options: &RecOptions,
    ) -> Vec<ImdbId> {
        let enabled: Vec<Arc<dyn RecommendationSource>> = self
            .sources
            .iter()
            .filter(|source| source.is_enabled(keys))
            .cloned()
            .collect();

        if enabled.is_empty() {
            tracing::info!(imdb_id = %query.imdb_id, "No recommendation source enabled");
            return Vec::new();
        }

        let names: Vec<Source> = enabled.iter().map(|source| source.source()).collect();
        let timeout = self.source_timeout;
        let owned_query = query.clone();
        let owned_keys = keys.clone();
        let owned_options = options.clone();

        let result = cached!(
            self.cache,
            CacheKey::catalog(query, &names, options),
            async move {
                let lists = fan_out(&enabled, &owned_query, &owned_keys, &owned_options, timeout).await;
                let merged = merge_and_rank(lists, &owned_query.imdb_id, owned_options.ranking);
                if merged.is_empty() {
                    // Not cached, so the next request asks the providers again
                    return Err(AppError::NotFound(format!(
                        "No recommendations for {}",
                        owned_query.imdb_id
                    )));
                }
                Ok(merged)
            }
        );

        match result {
            Ok(ids) => {
                tracing::info!(imdb_id = %query.imdb_id, sources = names.len(), count = ids.len(), "Combined recommendations");
                ids
            }
            Err(AppError::NotFound(_)) => {
                tracing::info!(imdb_id = %query.imdb_id, "No source returned recommendations");
                Vec::new()
            }
            Err(e) => {
                tracing::error!(imdb_id = %query.imdb_id, error = %e, "Failed to combine recommendations");
                Vec::new()
            }
        }
    }
}

/// Queries every source concurrently, each under its own timeout
///
/// A source that times out is dropped mid-flight and contributes an empty list.
async fn fan_out(
    sources: &[Arc<dyn RecommendationSource>],
    query: &ResolvedQuery,
    keys: &ProviderKeys,
    options: &RecOptions,
    timeout: Duration,
) -> Vec<Vec<RecommendationEntry>> {
    join_all(sources.iter().map(|source| async move {
        let name = source.source();
        match tokio::time::timeout(timeout, source.recommend(query, keys, options)).await {
            Ok(Some(entries)) => entries,
            Ok(None) => Vec::new(),
            Err(_) => {
                tracing::warn!(
                    provider = name.as_str(),
                    timeout_ms = timeout.as_millis() as u64,
                    "Provider timed out"
                );
                Vec::new()
            }
        }
    }))
    .await
}

/// Merges per-source lists into one ranking
///
/// Titles named by more sources come first; ties go to the lower average
/// rank, then to whichever title was seen first. `query_id` never appears.
fn merge_and_rank(
    lists: Vec<Vec<RecommendationEntry>>,
    query_id: &ImdbId,
    policy: RankingPolicy,
) -> Vec<ImdbId> {
    let mut scored: Vec<ScoredEntry> = Vec::new();
    let mut index: HashMap<ImdbId, usize> = HashMap::new();

    for list in lists {
        let length = list.len().max(1) as f64;
        for entry in list {
            if entry.imdb_id == *query_id {
                continue;
            }
            let weight = match policy {
                RankingPolicy::Position => f64::from(entry.ranking),
                RankingPolicy::Normalized => f64::from(entry.ranking) / length,
            };

            match index.get(&entry.imdb_id) {
                Some(&position) => {
                    let existing = &mut scored[position];
                    existing.occurrence_count += 1;
                    existing.ranking_sum += weight;
                }
                None => {
                    index.insert(entry.imdb_id.clone(), scored.len());
                    scored.push(ScoredEntry {
                        entry,
                        occurrence_count: 1,
                        ranking_sum: weight,
                    });
                }
            }
        }
    }

    // Stable sort keeps first-seen order among exact ties
    scored.sort_by(|a, b| {
        b.occurrence_count
            .cmp(&a.occurrence_count)
            .then_with(|| a.average_rank().total_cmp(&b.average_rank()))
    });

    scored.into_iter().map(|scored| scored.entry.imdb_id).collect()
}
