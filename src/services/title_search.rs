use async_trait::async_trait;
use std::sync::Arc;

use crate::{
    error::AppResult,
    models::{ImdbId, MediaType, ProviderKeys},
    services::{
        id_map::IdMap,
        providers::{cinemeta::CinemetaClient, tmdb::TmdbClient, trakt::TraktClient, ProviderClients},
    },
};

/// One way of turning a title into an IMDB id
///
/// Strategies are tried in configured order until one answers. `Ok(None)`
/// means "not found here, try the next one"; so does an error, which the
/// resolver logs.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TitleStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn find(
        &self,
        title: &str,
        year: Option<i32>,
        media_type: MediaType,
        keys: &ProviderKeys,
    ) -> AppResult<Option<ImdbId>>;
}

/// Exact normalized-title match against the offline dataset
pub struct OfflineTitleLookup {
    id_map: Arc<IdMap>,
}

impl OfflineTitleLookup {
    pub fn new(id_map: Arc<IdMap>) -> Self {
        Self { id_map }
    }
}

#[async_trait]
impl TitleStrategy for OfflineTitleLookup {
    fn name(&self) -> &'static str {
        "offline"
    }

    async fn find(
        &self,
        title: &str,
        year: Option<i32>,
        media_type: MediaType,
        _keys: &ProviderKeys,
    ) -> AppResult<Option<ImdbId>> {
        Ok(self.id_map.find_title(title, year, media_type))
    }
}

/// TMDB search; the top hit is mapped to IMDB through the dataset or `/external_ids`
pub struct TmdbTitleSearch {
    client: TmdbClient,
    id_map: Arc<IdMap>,
}

impl TmdbTitleSearch {
    pub fn new(client: TmdbClient, id_map: Arc<IdMap>) -> Self {
        Self { client, id_map }
    }
}

#[async_trait]
impl TitleStrategy for TmdbTitleSearch {
    fn name(&self) -> &'static str {
        "tmdb"
    }

    async fn find(
        &self,
        title: &str,
        year: Option<i32>,
        media_type: MediaType,
        keys: &ProviderKeys,
    ) -> AppResult<Option<ImdbId>> {
        let Some(api_key) = keys.tmdb.usable() else {
            return Ok(None);
        };

        let results = self.client.search(title, year, media_type, api_key).await?;
        let Some(top) = results.into_iter().next() else {
            return Ok(None);
        };
        if top.inferred_type() != media_type {
            return Ok(None);
        }

        if let Some(imdb_id) = self.id_map.tmdb_to_imdb(top.id, media_type) {
            return Ok(Some(imdb_id));
        }
        self.client.imdb_id(top.id, media_type, api_key).await
    }
}

/// Trakt search; hits carry their IMDB id
pub struct TraktTitleSearch {
    client: TraktClient,
}

impl TraktTitleSearch {
    pub fn new(client: TraktClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TitleStrategy for TraktTitleSearch {
    fn name(&self) -> &'static str {
        "trakt"
    }

    async fn find(
        &self,
        title: &str,
        year: Option<i32>,
        media_type: MediaType,
        keys: &ProviderKeys,
    ) -> AppResult<Option<ImdbId>> {
        let Some(api_key) = keys.trakt.usable() else {
            return Ok(None);
        };

        let hits = self.client.search(title, year, media_type, api_key).await?;
        Ok(hits
            .into_iter()
            .next()
            .and_then(|hit| hit.ids.imdb)
            .as_deref()
            .and_then(ImdbId::parse))
    }
}

/// Cinemeta catalog search, keyless
pub struct CinemetaTitleSearch {
    client: CinemetaClient,
}

impl CinemetaTitleSearch {
    pub fn new(client: CinemetaClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TitleStrategy for CinemetaTitleSearch {
    fn name(&self) -> &'static str {
        "cinemeta"
    }

    async fn find(
        &self,
        title: &str,
        year: Option<i32>,
        media_type: MediaType,
        _keys: &ProviderKeys,
    ) -> AppResult<Option<ImdbId>> {
        let metas = self.client.search(title, media_type).await?;

        Ok(metas
            .into_iter()
            .filter(|meta| meta.media_type().map_or(true, |t| t == media_type))
            .find(|meta| year.is_none() || meta.release_year() == year)
            .and_then(|meta| meta.imdb()))
    }
}

/// Builds the strategy chain from configured names, skipping unknown ones
pub fn strategies_from_names(
    names: &[String],
    clients: &ProviderClients,
    id_map: Arc<IdMap>,
) -> Vec<Arc<dyn TitleStrategy>> {
    names
        .iter()
        .filter_map(|name| -> Option<Arc<dyn TitleStrategy>> {
            match name.trim().to_lowercase().as_str() {
                "offline" => Some(Arc::new(OfflineTitleLookup::new(id_map.clone()))),
                "tmdb" => Some(Arc::new(TmdbTitleSearch::new(
                    clients.tmdb.clone(),
                    id_map.clone(),
                ))),
                "trakt" => Some(Arc::new(TraktTitleSearch::new(clients.trakt.clone()))),
                "cinemeta" => Some(Arc::new(CinemetaTitleSearch::new(clients.cinemeta.clone()))),
                other => {
                    tracing::warn!(strategy = other, "Unknown title lookup strategy, skipping");
                    None
                }
            }
        })
        .collect()
}
