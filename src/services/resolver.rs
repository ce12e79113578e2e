//! Identifier resolution
//!
//! Every cross-provider comparison happens on IMDB ids. This module turns a
//! `MediaQuery` into a `ResolvedQuery`, and translates single ids between
//! IMDB and the provider-native spaces. The offline dataset is always
//! consulted first; live providers are the fallback.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::{
    cached,
    db::{Cache, CacheKey},
    error::{AppError, AppResult},
    models::{
        ExternalId, IdSpace, ImdbId, MediaQuery, MediaType, MetadataSource, ProviderKeys,
        RecOptions, ResolvedQuery,
    },
    services::{
        id_map::{IdMap, Lookup},
        providers::{kitsu::KitsuTitle, ProviderClients},
        title_search::TitleStrategy,
    },
};

/// Descriptive metadata for one title
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TitleMeta {
    pub title: String,
    pub year: Option<i32>,
    pub media_type: MediaType,
    pub tmdb_id: Option<u64>,
}

/// Id translation helpers handed to the source adapters
///
/// Nothing here caches; adapters cache their finished lists instead.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IdTranslator: Send + Sync {
    async fn to_imdb(
        &self,
        id: ExternalId,
        media_type: MediaType,
        keys: &ProviderKeys,
    ) -> Option<ImdbId>;

    async fn from_imdb(
        &self,
        imdb_id: &ImdbId,
        space: IdSpace,
        media_type: MediaType,
        keys: &ProviderKeys,
    ) -> Option<ExternalId>;

    async fn title_to_imdb(
        &self,
        title: &str,
        year: Option<i32>,
        media_type: MediaType,
        keys: &ProviderKeys,
    ) -> Option<ImdbId>;
}

#[derive(Clone)]
pub struct IdResolver {
    id_map: Arc<IdMap>,
    clients: ProviderClients,
    strategies: Vec<Arc<dyn TitleStrategy>>,
    cache: Cache,
}

impl IdResolver {
    pub fn new(
        id_map: Arc<IdMap>,
        clients: ProviderClients,
        strategies: Vec<Arc<dyn TitleStrategy>>,
        cache: Cache,
    ) -> Self {
        Self {
            id_map,
            clients,
            strategies,
            cache,
        }
    }

    /// Establishes the IMDB id, title and year of a query
    ///
    /// `Ok(None)` is the normal "nothing to recommend for" outcome: the id is
    /// unknown, the title matched nothing, or the title exists only under the
    /// other media type.
    pub async fn resolve(
        &self,
        query: MediaQuery,
        keys: &ProviderKeys,
        options: &RecOptions,
    ) -> AppResult<Option<ResolvedQuery>> {
        if let Some(imdb_id) = query.imdb_id.clone() {
            return self.resolve_imdb(imdb_id, &query, keys, options).await;
        }

        if let Some(tmdb_id) = query.tmdb_id {
            let translated = self
                .to_imdb(ExternalId::Tmdb(tmdb_id), query.media_type, keys)
                .await;
            return match translated {
                Some(imdb_id) => self.resolve_imdb(imdb_id, &query, keys, options).await,
                None => {
                    tracing::info!(tmdb_id, media_type = %query.media_type, "TMDB id has no IMDB id");
                    Ok(None)
                }
            };
        }

        if let Some(kitsu_id) = query.kitsu_id {
            let Some(anime) = self.kitsu_title(kitsu_id).await else {
                return Ok(None);
            };
            if anime.media_type != query.media_type {
                tracing::info!(kitsu_id, expected = %query.media_type, found = %anime.media_type, "Kitsu type mismatch");
                return Ok(None);
            }
            return Ok(self
                .resolve_title(&anime.title, anime.year, query.media_type, keys)
                .await);
        }

        match query.title.as_deref().map(str::trim) {
            Some(title) if !title.is_empty() => Ok(self
                .resolve_title(title, query.year, query.media_type, keys)
                .await),
            _ => Err(AppError::InvalidInput(
                "Query needs a title or an id".to_string(),
            )),
        }
    }

    async fn resolve_imdb(
        &self,
        imdb_id: ImdbId,
        query: &MediaQuery,
        keys: &ProviderKeys,
        options: &RecOptions,
    ) -> AppResult<Option<ResolvedQuery>> {
        let media_type = query.media_type;

        let meta = match self.describe(&imdb_id, media_type, keys, options).await {
            Ok(Some(meta)) => Some(meta),
            Ok(None) => {
                tracing::info!(imdb_id = %imdb_id, media_type = %media_type, "Title exists only under the other type");
                return Ok(None);
            }
            Err(e) => {
                tracing::warn!(imdb_id = %imdb_id, error = %e, "Metadata unavailable, resolving without it");
                None
            }
        };

        let tmdb_id = meta
            .as_ref()
            .and_then(|m| m.tmdb_id)
            .or(query.tmdb_id)
            .or(match self.id_map.imdb_to_tmdb(&imdb_id, media_type) {
                Lookup::Hit(id) => Some(id),
                _ => None,
            });

        let (title, year) = match meta {
            Some(meta) => (meta.title, meta.year),
            None => (query.title.clone().unwrap_or_default(), query.year),
        };

        Ok(Some(ResolvedQuery {
            imdb_id,
            tmdb_id,
            title,
            year,
            media_type,
        }))
    }

    /// Kitsu's title, year and type for an anime id
    ///
    /// An unreachable or failing Kitsu counts as an unknown id.
    async fn kitsu_title(&self, kitsu_id: u64) -> Option<KitsuTitle> {
        match self.clients.kitsu.anime(kitsu_id).await {
            Ok(Some(anime)) => Some(anime),
            Ok(None) => {
                tracing::info!(kitsu_id, "Unknown Kitsu id");
                None
            }
            Err(e) => {
                tracing::warn!(kitsu_id, error = %e, "Kitsu lookup failed");
                None
            }
        }
    }

    async fn resolve_title(
        &self,
        title: &str,
        year: Option<i32>,
        media_type: MediaType,
        keys: &ProviderKeys,
    ) -> Option<ResolvedQuery> {
        let imdb_id = self.find_title(title, year, media_type, keys).await?;

        let tmdb_id = match self.id_map.imdb_to_tmdb(&imdb_id, media_type) {
            Lookup::Hit(id) => Some(id),
            _ => None,
        };

        Some(ResolvedQuery {
            imdb_id,
            tmdb_id,
            title: title.to_string(),
            year,
            media_type,
        })
    }

    /// Cached metadata lookup for an IMDB id
    ///
    /// `Ok(None)` when the preferred source files the id under the other type.
    async fn describe(
        &self,
        imdb_id: &ImdbId,
        media_type: MediaType,
        keys: &ProviderKeys,
        options: &RecOptions,
    ) -> AppResult<Option<TitleMeta>> {
        let tmdb_key = match options.metadata_source {
            MetadataSource::Tmdb => keys.tmdb.usable().map(str::to_string),
            MetadataSource::Cinemeta => None,
        };
        let source = if tmdb_key.is_some() {
            MetadataSource::Tmdb
        } else {
            MetadataSource::Cinemeta
        };

        let clients = self.clients.clone();
        let owned_id = imdb_id.clone();
        let language = options.language.clone();

        cached!(
            self.cache,
            CacheKey::meta(imdb_id, media_type, source, &options.language),
            async move {
                match tmdb_key {
                    Some(key) => fetch_tmdb_meta(&clients, &owned_id, media_type, &key, &language).await,
                    None => fetch_cinemeta_meta(&clients, &owned_id, media_type).await,
                }
            }
        )
    }

    async fn find_title(
        &self,
        title: &str,
        year: Option<i32>,
        media_type: MediaType,
        keys: &ProviderKeys,
    ) -> Option<ImdbId> {
        for strategy in &self.strategies {
            match strategy.find(title, year, media_type, keys).await {
                Ok(Some(imdb_id)) => {
                    tracing::debug!(strategy = strategy.name(), title, imdb_id = %imdb_id, "Title resolved");
                    return Some(imdb_id);
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::debug!(strategy = strategy.name(), title, error = %e, "Title lookup failed");
                }
            }
        }

        tracing::info!(title, year, media_type = %media_type, "Title not found");
        None
    }

    async fn live_to_imdb(
        &self,
        id: ExternalId,
        media_type: MediaType,
        keys: &ProviderKeys,
    ) -> AppResult<Option<ImdbId>> {
        match id {
            ExternalId::Tmdb(tmdb_id) => {
                if let Some(imdb_id) = self.id_map.tmdb_to_imdb(tmdb_id, media_type) {
                    return Ok(Some(imdb_id));
                }
                match keys.tmdb.usable() {
                    Some(key) => self.clients.tmdb.imdb_id(tmdb_id, media_type, key).await,
                    None => Ok(None),
                }
            }
            ExternalId::Watchmode(watchmode_id) => {
                if let Some(record) = self.id_map.watchmode(watchmode_id) {
                    if record.media_type.is_some_and(|t| t != media_type) {
                        return Ok(None);
                    }
                    if record.imdb_id.is_some() {
                        return Ok(record.imdb_id.clone());
                    }
                }
                let Some(key) = keys.watchmode.usable() else {
                    return Ok(None);
                };
                let details = self
                    .clients
                    .watchmode
                    .details(&watchmode_id.to_string(), key)
                    .await?;
                if details.media_type().is_some_and(|t| t != media_type) {
                    return Ok(None);
                }
                Ok(details.imdb())
            }
            ExternalId::Simkl(simkl_id) => match keys.simkl.usable() {
                Some(key) => self.clients.simkl.imdb_id(simkl_id, media_type, key).await,
                None => Ok(None),
            },
            ExternalId::Trakt(trakt_id) => {
                let Some(key) = keys.trakt.usable() else {
                    return Ok(None);
                };
                let found = self
                    .clients
                    .trakt
                    .lookup("trakt", &trakt_id.to_string(), media_type, key)
                    .await?;
                Ok(found
                    .and_then(|title| title.ids.imdb)
                    .as_deref()
                    .and_then(ImdbId::parse))
            }
            ExternalId::Kitsu(kitsu_id) => {
                let Some(anime) = self.kitsu_title(kitsu_id).await else {
                    return Ok(None);
                };
                if anime.media_type != media_type {
                    return Ok(None);
                }
                Ok(self
                    .find_title(&anime.title, anime.year, media_type, keys)
                    .await)
            }
        }
    }

    async fn live_from_imdb(
        &self,
        imdb_id: &ImdbId,
        space: IdSpace,
        media_type: MediaType,
        keys: &ProviderKeys,
    ) -> AppResult<Option<ExternalId>> {
        match space {
            IdSpace::Tmdb => {
                match self.id_map.imdb_to_tmdb(imdb_id, media_type) {
                    Lookup::Hit(id) => return Ok(Some(ExternalId::Tmdb(id))),
                    Lookup::Mismatch => return Ok(None),
                    Lookup::Miss => {}
                }
                let Some(key) = keys.tmdb.usable() else {
                    return Ok(None);
                };
                let found = match self.clients.tmdb.find_by_imdb(imdb_id, media_type, key, "en").await {
                    Err(AppError::NotFound(_)) => None,
                    other => other?,
                };
                Ok(found.map(|title| ExternalId::Tmdb(title.id)))
            }
            IdSpace::Watchmode => {
                if let Some(id) = self.id_map.imdb_to_watchmode(imdb_id) {
                    return Ok(Some(ExternalId::Watchmode(id)));
                }
                let Some(key) = keys.watchmode.usable() else {
                    return Ok(None);
                };
                let details = self.clients.watchmode.details(imdb_id.as_str(), key).await?;
                Ok(Some(ExternalId::Watchmode(details.id)))
            }
            IdSpace::Trakt => {
                let Some(key) = keys.trakt.usable() else {
                    return Ok(None);
                };
                let found = self
                    .clients
                    .trakt
                    .lookup("imdb", imdb_id.as_str(), media_type, key)
                    .await?;
                Ok(found
                    .and_then(|title| title.ids.trakt)
                    .map(ExternalId::Trakt))
            }
            IdSpace::Simkl => {
                let Some(key) = keys.simkl.usable() else {
                    return Ok(None);
                };
                let found = self.clients.simkl.simkl_id(imdb_id, key).await?;
                Ok(found.map(ExternalId::Simkl))
            }
            // Kitsu has no IMDB cross-reference
            IdSpace::Kitsu => Ok(None),
        }
    }
}

async fn fetch_tmdb_meta(
    clients: &ProviderClients,
    imdb_id: &ImdbId,
    media_type: MediaType,
    api_key: &str,
    language: &str,
) -> AppResult<Option<TitleMeta>> {
    match clients
        .tmdb
        .find_by_imdb(imdb_id, media_type, api_key, language)
        .await
    {
        Ok(Some(title)) => Ok(Some(TitleMeta::from(title))),
        Ok(None) => Err(AppError::NotFound(format!("{} is unknown to TMDB", imdb_id))),
        // TMDB knows the id, but under the other type
        Err(AppError::NotFound(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

async fn fetch_cinemeta_meta(
    clients: &ProviderClients,
    imdb_id: &ImdbId,
    media_type: MediaType,
) -> AppResult<Option<TitleMeta>> {
    let Some(meta) = clients.cinemeta.meta(imdb_id, media_type).await? else {
        return Err(AppError::NotFound(format!("{} is unknown to Cinemeta", imdb_id)));
    };
    if meta.media_type().is_some_and(|t| t != media_type) {
        return Ok(None);
    }
    meta.into_meta(media_type)
        .map(Some)
        .ok_or_else(|| AppError::NotFound(format!("Cinemeta has no title for {}", imdb_id)))
}

#[async_trait]
impl IdTranslator for IdResolver {
    async fn to_imdb(
        &self,
        id: ExternalId,
        media_type: MediaType,
        keys: &ProviderKeys,
    ) -> Option<ImdbId> {
        match self.live_to_imdb(id, media_type, keys).await {
            Ok(found) => found,
            Err(e) => {
                tracing::debug!(id = %id, error = %e, "Id translation failed");
                None
            }
        }
    }

    async fn from_imdb(
        &self,
        imdb_id: &ImdbId,
        space: IdSpace,
        media_type: MediaType,
        keys: &ProviderKeys,
    ) -> Option<ExternalId> {
        match self.live_from_imdb(imdb_id, space, media_type, keys).await {
            Ok(found) => found,
            Err(e) => {
                tracing::debug!(imdb_id = %imdb_id, space = ?space, error = %e, "Id translation failed");
                None
            }
        }
    }

    async fn title_to_imdb(
        &self,
        title: &str,
        year: Option<i32>,
        media_type: MediaType,
        keys: &ProviderKeys,
    ) -> Option<ImdbId> {
        self.find_title(title, year, media_type, keys).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::services::title_search::{MockTitleStrategy, OfflineTitleLookup};
    use std::time::Duration;

    const DATASET: &str = r#"[
        {"watchmodeID": 1295258, "imdbID": "tt1375666", "tmdbID": 27205, "type": "movie", "title": "Inception", "year": 2010},
        {"watchmodeID": 345534, "imdbID": "tt0944947", "tmdbID": 1399, "type": "tv", "title": "Game of Thrones", "year": 2011},
        {"watchmodeID": 1337, "imdbID": "tt0816692", "tmdbID": 157336, "type": "movie", "title": "Interstellar", "year": 2014}
    ]"#;

    fn imdb(id: &str) -> ImdbId {
        ImdbId::parse(id).unwrap()
    }

    fn resolver(strategies: Vec<Arc<dyn TitleStrategy>>) -> IdResolver {
        resolver_with_kitsu("http://127.0.0.1:9", strategies)
    }

    fn resolver_with_kitsu(kitsu_url: &str, strategies: Vec<Arc<dyn TitleStrategy>>) -> IdResolver {
        let config = envy::from_iter::<_, Config>(vec![
            ("CINEMETA_API_URL".to_string(), "http://127.0.0.1:9".to_string()),
            ("TMDB_API_URL".to_string(), "http://127.0.0.1:9".to_string()),
            ("KITSU_API_URL".to_string(), kitsu_url.to_string()),
            ("HTTP_TIMEOUT_MS".to_string(), "200".to_string()),
        ])
        .unwrap();
        IdResolver::new(
            Arc::new(IdMap::from_json(DATASET).unwrap()),
            ProviderClients::from_config(&config).unwrap(),
            strategies,
            Cache::in_memory(Duration::from_secs(60), 100),
        )
    }

    /// Serves one Kitsu anime document on a local port and returns its base url
    async fn kitsu_stub(document: serde_json::Value) -> String {
        let app = axum::Router::new().route(
            "/anime/:id",
            axum::routing::get(move || {
                let document = document.clone();
                async move { axum::Json(document) }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn kitsu_query(kitsu_id: u64, media_type: MediaType) -> MediaQuery {
        MediaQuery {
            title: None,
            year: None,
            media_type,
            imdb_id: None,
            tmdb_id: None,
            kitsu_id: Some(kitsu_id),
        }
    }

    fn offline() -> Arc<dyn TitleStrategy> {
        Arc::new(OfflineTitleLookup::new(Arc::new(IdMap::from_json(DATASET).unwrap())))
    }

    #[tokio::test]
    async fn test_title_resolves_through_dataset() {
        let resolver = resolver(vec![offline()]);
        let resolved = resolver
            .resolve(
                MediaQuery::from_title("Inception", Some(2010), MediaType::Movie),
                &ProviderKeys::default(),
                &RecOptions::default(),
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(resolved.imdb_id, imdb("tt1375666"));
        assert_eq!(resolved.tmdb_id, Some(27205));
        assert_eq!(resolved.title, "Inception");
    }

    #[tokio::test]
    async fn test_unknown_title_is_not_found() {
        let resolver = resolver(vec![offline()]);
        let resolved = resolver
            .resolve(
                MediaQuery::from_title("No Such Film", None, MediaType::Movie),
                &ProviderKeys::default(),
                &RecOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(resolved, None);
    }

    #[tokio::test]
    async fn test_strategies_tried_in_order_until_one_answers() {
        let mut failing = MockTitleStrategy::new();
        failing.expect_name().return_const("first");
        failing
            .expect_find()
            .times(1)
            .returning(|_, _, _, _| Err(AppError::ExternalApi("down".to_string())));

        let mut answering = MockTitleStrategy::new();
        answering.expect_name().return_const("second");
        answering
            .expect_find()
            .times(1)
            .returning(|_, _, _, _| Ok(Some(ImdbId::parse("tt0133093").unwrap())));

        let mut unused = MockTitleStrategy::new();
        unused.expect_name().return_const("third");
        unused.expect_find().never();

        let resolver = resolver(vec![Arc::new(failing), Arc::new(answering), Arc::new(unused)]);
        let found = resolver
            .title_to_imdb("The Matrix", Some(1999), MediaType::Movie, &ProviderKeys::default())
            .await;
        assert_eq!(found, Some(imdb("tt0133093")));
    }

    #[tokio::test]
    async fn test_imdb_query_survives_missing_metadata() {
        // Cinemeta is unreachable, so the query keeps its own title
        let resolver = resolver(vec![]);
        let mut query = MediaQuery::from_imdb(imdb("tt0944947"), MediaType::Series);
        query.title = Some("Game of Thrones".to_string());

        let resolved = resolver
            .resolve(query, &ProviderKeys::default(), &RecOptions::default())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(resolved.imdb_id, imdb("tt0944947"));
        assert_eq!(resolved.tmdb_id, Some(1399));
        assert_eq!(resolved.title, "Game of Thrones");
    }

    #[tokio::test]
    async fn test_dataset_translations() {
        let resolver = resolver(vec![]);
        let keys = ProviderKeys::default();

        assert_eq!(
            resolver.to_imdb(ExternalId::Tmdb(157336), MediaType::Movie, &keys).await,
            Some(imdb("tt0816692"))
        );
        assert_eq!(
            resolver.to_imdb(ExternalId::Watchmode(345534), MediaType::Series, &keys).await,
            Some(imdb("tt0944947"))
        );
        // Recorded as a series, so never handed out as a movie
        assert_eq!(
            resolver.to_imdb(ExternalId::Watchmode(345534), MediaType::Movie, &keys).await,
            None
        );
        assert_eq!(
            resolver
                .from_imdb(&imdb("tt1375666"), IdSpace::Tmdb, MediaType::Movie, &keys)
                .await,
            Some(ExternalId::Tmdb(27205))
        );
        assert_eq!(
            resolver
                .from_imdb(&imdb("tt1375666"), IdSpace::Tmdb, MediaType::Series, &keys)
                .await,
            None
        );
        assert_eq!(
            resolver
                .from_imdb(&imdb("tt1375666"), IdSpace::Kitsu, MediaType::Movie, &keys)
                .await,
            None
        );
    }

    #[tokio::test]
    async fn test_kitsu_id_resolves_through_title_chain() {
        let url = kitsu_stub(serde_json::json!({"data": {"id": "7442", "attributes": {
            "titles": {"en": "Attack on Titan Season 3", "en_jp": "Shingeki no Kyojin"},
            "startDate": "2013-04-07", "subtype": "TV"}}}))
        .await;

        let mut strategy = MockTitleStrategy::new();
        strategy.expect_name().return_const("mock");
        strategy
            .expect_find()
            .times(1)
            .returning(|title, year, media_type, _| {
                Ok((title == "Attack on Titan" && year == Some(2013) && media_type == MediaType::Series)
                    .then(|| ImdbId::parse("tt2560140").unwrap()))
            });

        let resolver = resolver_with_kitsu(&url, vec![Arc::new(strategy)]);
        let resolved = resolver
            .resolve(
                kitsu_query(7442, MediaType::Series),
                &ProviderKeys::default(),
                &RecOptions::default(),
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(resolved.imdb_id, imdb("tt2560140"));
        assert_eq!(resolved.title, "Attack on Titan");
        assert_eq!(resolved.year, Some(2013));
    }

    #[tokio::test]
    async fn test_kitsu_type_mismatch_is_not_found() {
        let url = kitsu_stub(serde_json::json!({"data": {"id": "7442", "attributes": {
            "titles": {"en": "Attack on Titan"}, "startDate": "2013-04-07", "subtype": "TV"}}}))
        .await;

        let mut strategy = MockTitleStrategy::new();
        strategy.expect_name().return_const("mock");
        strategy.expect_find().never();

        let resolver = resolver_with_kitsu(&url, vec![Arc::new(strategy)]);
        let resolved = resolver
            .resolve(
                kitsu_query(7442, MediaType::Movie),
                &ProviderKeys::default(),
                &RecOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(resolved, None);
    }

    #[tokio::test]
    async fn test_unreachable_kitsu_is_not_found() {
        let mut strategy = MockTitleStrategy::new();
        strategy.expect_name().return_const("mock");
        strategy.expect_find().never();

        let resolver = resolver(vec![Arc::new(strategy)]);
        let keys = ProviderKeys::default();

        let resolved = resolver
            .resolve(kitsu_query(7442, MediaType::Series), &keys, &RecOptions::default())
            .await;
        assert!(matches!(resolved, Ok(None)));

        assert_eq!(
            resolver.to_imdb(ExternalId::Kitsu(7442), MediaType::Series, &keys).await,
            None
        );
    }

    #[tokio::test]
    async fn test_query_without_title_or_id_is_rejected() {
        let resolver = resolver(vec![]);
        let query = MediaQuery {
            title: Some("  ".to_string()),
            year: None,
            media_type: MediaType::Movie,
            imdb_id: None,
            tmdb_id: None,
            kitsu_id: None,
        };
        let result = resolver
            .resolve(query, &ProviderKeys::default(), &RecOptions::default())
            .await;
        assert!(matches!(result, Err(AppError::InvalidInput(_))));
    }
}
