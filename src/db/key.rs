use std::fmt::Display;

use crate::models::{
    ImdbId, MediaType, MetadataSource, RankingPolicy, RecOptions, ResolvedQuery, Source,
};

/// Namespaced cache keys
///
/// Each variant lists every input its cached value depends on, so two
/// results that differ in any of them can never share a key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// Combined ranked id list for one query and one set of enabled sources
    Catalog {
        imdb_id: ImdbId,
        media_type: MediaType,
        sources: Vec<Source>,
        include_collections: bool,
        ranking: RankingPolicy,
        /// Title and year handed to the title-search sources, when any is enabled
        searched_as: Option<(String, Option<i32>)>,
    },
    /// Descriptive metadata (title, year) for one title
    Meta {
        imdb_id: ImdbId,
        media_type: MediaType,
        source: MetadataSource,
        language: String,
    },
    /// One provider's recommendation list
    Recs {
        source: Source,
        imdb_id: ImdbId,
        media_type: MediaType,
        include_collections: bool,
    },
}

impl CacheKey {
    pub fn catalog(query: &ResolvedQuery, sources: &[Source], options: &RecOptions) -> Self {
        let mut sources = sources.to_vec();
        sources.sort_by_key(|s| s.as_str());
        sources.dedup();

        // Only TMDB reads the collections flag
        let include_collections = options.include_collections && sources.contains(&Source::Tmdb);

        // TasteDive and Gemini search by the resolved title, which may be
        // missing or localized
        let searched_as = sources
            .iter()
            .any(|s| matches!(s, Source::TasteDive | Source::Gemini))
            .then(|| (query.title.trim().to_lowercase(), query.year));

        CacheKey::Catalog {
            imdb_id: query.imdb_id.clone(),
            media_type: query.media_type,
            sources,
            include_collections,
            ranking: options.ranking,
            searched_as,
        }
    }

    pub fn meta(
        imdb_id: &ImdbId,
        media_type: MediaType,
        source: MetadataSource,
        language: &str,
    ) -> Self {
        CacheKey::Meta {
            imdb_id: imdb_id.clone(),
            media_type,
            source,
            language: language.to_lowercase(),
        }
    }

    pub fn recs(source: Source, query: &ResolvedQuery, include_collections: bool) -> Self {
        CacheKey::Recs {
            source,
            imdb_id: query.imdb_id.clone(),
            media_type: query.media_type,
            include_collections,
        }
    }
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheKey::Catalog {
                imdb_id,
                media_type,
                sources,
                include_collections,
                ranking,
                searched_as,
            } => {
                let sources: Vec<&str> = sources.iter().map(|s| s.as_str()).collect();
                write!(f, "catalog:{}_{}_{}", imdb_id, media_type, sources.join("+"))?;
                if *include_collections {
                    write!(f, "_collections")?;
                }
                if *ranking != RankingPolicy::Position {
                    write!(f, "_{}", ranking.as_str())?;
                }
                if let Some((title, year)) = searched_as {
                    write!(f, "_as:{}", title)?;
                    if let Some(year) = year {
                        write!(f, ":{}", year)?;
                    }
                }
                Ok(())
            }
            CacheKey::Meta {
                imdb_id,
                media_type,
                source,
                language,
            } => write!(
                f,
                "meta:{}_{}_{}_{}",
                imdb_id,
                media_type,
                source.as_str(),
                language
            ),
            CacheKey::Recs {
                source,
                imdb_id,
                media_type,
                include_collections,
            } => {
                write!(f, "recs:{}:{}_{}", source, imdb_id, media_type)?;
                if *include_collections {
                    write!(f, "_collections")?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query() -> ResolvedQuery {
        ResolvedQuery {
            imdb_id: ImdbId::parse("tt1375666").unwrap(),
            tmdb_id: Some(27205),
            title: "Inception".to_string(),
            year: Some(2010),
            media_type: MediaType::Movie,
        }
    }

    #[test]
    fn test_cache_key_display_catalog() {
        let key = CacheKey::catalog(
            &query(),
            &[Source::Trakt, Source::Tmdb],
            &RecOptions::default(),
        );
        assert_eq!(format!("{}", key), "catalog:tt1375666_movie_tmdb+trakt");
    }

    #[test]
    fn test_cache_key_catalog_ignores_source_order() {
        let options = RecOptions::default();
        let a = CacheKey::catalog(&query(), &[Source::Gemini, Source::Simkl], &options);
        let b = CacheKey::catalog(&query(), &[Source::Simkl, Source::Gemini], &options);
        assert_eq!(a, b);
    }

    #[test]
    fn test_cache_key_catalog_collections_only_with_tmdb() {
        let options = RecOptions {
            include_collections: true,
            ..RecOptions::default()
        };
        let with_tmdb = CacheKey::catalog(&query(), &[Source::Tmdb], &options);
        let without_tmdb = CacheKey::catalog(&query(), &[Source::Trakt], &options);
        assert_eq!(format!("{}", with_tmdb), "catalog:tt1375666_movie_tmdb_collections");
        assert_eq!(format!("{}", without_tmdb), "catalog:tt1375666_movie_trakt");
    }

    #[test]
    fn test_cache_key_catalog_includes_non_default_ranking() {
        let options = RecOptions {
            ranking: RankingPolicy::Normalized,
            ..RecOptions::default()
        };
        let key = CacheKey::catalog(&query(), &[Source::Trakt], &options);
        assert_eq!(format!("{}", key), "catalog:tt1375666_movie_trakt_normalized");
    }

    #[test]
    fn test_cache_key_catalog_tracks_title_for_title_search_sources() {
        let options = RecOptions::default();
        let untitled = ResolvedQuery {
            title: String::new(),
            year: None,
            ..query()
        };

        let key = CacheKey::catalog(&query(), &[Source::Trakt, Source::TasteDive], &options);
        assert_eq!(
            format!("{}", key),
            "catalog:tt1375666_movie_tastedive+trakt_as:inception:2010"
        );

        let full = CacheKey::catalog(&query(), &[Source::Gemini], &options);
        let degraded = CacheKey::catalog(&untitled, &[Source::Gemini], &options);
        assert_ne!(format!("{}", full), format!("{}", degraded));

        // Id-based sources never see the title
        let full = CacheKey::catalog(&query(), &[Source::Tmdb], &options);
        let degraded = CacheKey::catalog(&untitled, &[Source::Tmdb], &options);
        assert_eq!(full, degraded);
    }

    #[test]
    fn test_cache_key_display_meta_lowercases_language() {
        let key = CacheKey::meta(
            &ImdbId::parse("tt0944947").unwrap(),
            MediaType::Series,
            MetadataSource::Cinemeta,
            "PT-BR",
        );
        assert_eq!(format!("{}", key), "meta:tt0944947_series_cinemeta_pt-br");
    }

    #[test]
    fn test_cache_key_display_recs() {
        let key = CacheKey::recs(Source::TasteDive, &query(), false);
        assert_eq!(format!("{}", key), "recs:tastedive:tt1375666_movie");

        let key = CacheKey::recs(Source::Tmdb, &query(), true);
        assert_eq!(format!("{}", key), "recs:tmdb:tt1375666_movie_collections");
    }

    #[test]
    fn test_cache_key_differs_by_media_type() {
        let movie = CacheKey::recs(Source::Trakt, &query(), false);
        let series = CacheKey::recs(
            Source::Trakt,
            &ResolvedQuery {
                media_type: MediaType::Series,
                ..query()
            },
            false,
        );
        assert_ne!(format!("{}", movie), format!("{}", series));
    }
}
