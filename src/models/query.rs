use serde::{Deserialize, Serialize};

use super::{ImdbId, MediaType};
use crate::error::{AppError, AppResult};

/// Input to one recommendation round, built from a search term or a known id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaQuery {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(rename = "type")]
    pub media_type: MediaType,
    #[serde(default)]
    pub imdb_id: Option<ImdbId>,
    #[serde(default)]
    pub tmdb_id: Option<u64>,
    #[serde(default)]
    pub kitsu_id: Option<u64>,
}

impl MediaQuery {
    pub fn from_title(title: impl Into<String>, year: Option<i32>, media_type: MediaType) -> Self {
        Self {
            title: Some(title.into()),
            year,
            media_type,
            imdb_id: None,
            tmdb_id: None,
            kitsu_id: None,
        }
    }

    pub fn from_imdb(imdb_id: ImdbId, media_type: MediaType) -> Self {
        Self {
            title: None,
            year: None,
            media_type,
            imdb_id: Some(imdb_id),
            tmdb_id: None,
            kitsu_id: None,
        }
    }

    /// Builds a query from a free-text search term
    ///
    /// Recognises `y:YYYY` and `t:movie|t:series` flags anywhere in the term,
    /// and treats a bare `tt…`, `kitsu:N` or `tmdb:N` term as an id.
    pub fn from_search(term: &str, default_type: MediaType) -> AppResult<Self> {
        let mut year = None;
        let mut media_type = default_type;
        let mut words = Vec::new();

        for word in term.split_whitespace() {
            let lower = word.to_lowercase();
            if let Some(y) = lower.strip_prefix("y:") {
                if y.len() == 4 {
                    if let Ok(parsed) = y.parse::<i32>() {
                        year = Some(parsed);
                        continue;
                    }
                }
            }
            if let Some(t) = lower.strip_prefix("t:") {
                if let Ok(parsed) = t.parse::<MediaType>() {
                    media_type = parsed;
                    continue;
                }
            }
            words.push(word);
        }

        let title = words.join(" ");
        if title.is_empty() {
            return Err(AppError::InvalidInput(
                "Search term cannot be empty".to_string(),
            ));
        }

        let mut query = Self::from_title(title.clone(), year, media_type);

        if words.len() == 1 {
            if let Some(imdb_id) = ImdbId::parse(&title) {
                query.title = None;
                query.imdb_id = Some(imdb_id);
            } else if let Some(id) = prefixed_numeric_id(&title, "kitsu:") {
                query.title = None;
                query.kitsu_id = Some(id);
            } else if let Some(id) = prefixed_numeric_id(&title, "tmdb:") {
                query.title = None;
                query.tmdb_id = Some(id);
            }
        }

        Ok(query)
    }
}

/// Extracts N from `prefix:N` or `prefix:N:episode`
fn prefixed_numeric_id(term: &str, prefix: &str) -> Option<u64> {
    let rest = term.to_lowercase();
    let rest = rest.strip_prefix(prefix)?;
    rest.split(':').next()?.parse().ok()
}

/// A query whose canonical id, title and year have been established
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedQuery {
    pub imdb_id: ImdbId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tmdb_id: Option<u64>,
    pub title: String,
    pub year: Option<i32>,
    #[serde(rename = "type")]
    pub media_type: MediaType,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_search_plain_title() {
        let query = MediaQuery::from_search("The Matrix", MediaType::Movie).unwrap();
        assert_eq!(query.title.as_deref(), Some("The Matrix"));
        assert_eq!(query.year, None);
        assert_eq!(query.media_type, MediaType::Movie);
    }

    #[test]
    fn test_from_search_year_and_type_flags() {
        let query = MediaQuery::from_search("Dark y:2017 t:series", MediaType::Movie).unwrap();
        assert_eq!(query.title.as_deref(), Some("Dark"));
        assert_eq!(query.year, Some(2017));
        assert_eq!(query.media_type, MediaType::Series);
    }

    #[test]
    fn test_from_search_ignores_malformed_year_flag() {
        let query = MediaQuery::from_search("Alien y:79", MediaType::Movie).unwrap();
        assert_eq!(query.title.as_deref(), Some("Alien y:79"));
        assert_eq!(query.year, None);
    }

    #[test]
    fn test_from_search_imdb_id() {
        let query = MediaQuery::from_search("tt0944947:1:1", MediaType::Series).unwrap();
        assert_eq!(query.imdb_id, ImdbId::parse("tt0944947"));
        assert_eq!(query.title, None);
    }

    #[test]
    fn test_from_search_kitsu_and_tmdb_ids() {
        let kitsu = MediaQuery::from_search("kitsu:7442:3", MediaType::Series).unwrap();
        assert_eq!(kitsu.kitsu_id, Some(7442));
        assert_eq!(kitsu.title, None);

        let tmdb = MediaQuery::from_search("tmdb:27205", MediaType::Movie).unwrap();
        assert_eq!(tmdb.tmdb_id, Some(27205));
    }

    #[test]
    fn test_from_search_empty_term_is_invalid() {
        let result = MediaQuery::from_search("  y:2010 ", MediaType::Movie);
        assert!(matches!(result, Err(AppError::InvalidInput(_))));
    }

    #[test]
    fn test_media_query_deserializes_type_field() {
        let json = r#"{"title": "Heat", "year": 1995, "type": "movie"}"#;
        let query: MediaQuery = serde_json::from_str(json).unwrap();
        assert_eq!(query, MediaQuery::from_title("Heat", Some(1995), MediaType::Movie));
    }
}
