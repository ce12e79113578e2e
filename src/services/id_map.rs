//! Offline identifier dataset
//!
//! A static export of Watchmode's title map, linking Watchmode, IMDB and TMDB
//! ids. Lookups here are O(1) and are always tried before any live provider.

use serde::{Deserialize, Deserializer};
use std::collections::HashMap;
use std::path::Path;

use crate::{
    error::{AppError, AppResult},
    models::{ImdbId, MediaType},
};

/// One row of the dataset as exported
#[derive(Debug, Clone, Deserialize)]
pub struct IdRow {
    #[serde(rename = "watchmodeID", default, deserialize_with = "loose_id")]
    pub watchmode_id: Option<u64>,
    #[serde(rename = "imdbID", default)]
    pub imdb_id: Option<String>,
    #[serde(rename = "tmdbID", default, deserialize_with = "loose_id")]
    pub tmdb_id: Option<u64>,
    /// TMDB vocabulary: "movie" or "tv"
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "loose_id")]
    pub year: Option<u64>,
}

/// Ids in the export are sometimes numbers and sometimes numeric strings
fn loose_id<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Loose {
        Number(u64),
        Text(String),
    }

    Ok(match Option::<Loose>::deserialize(deserializer)? {
        Some(Loose::Number(n)) => Some(n),
        Some(Loose::Text(s)) => s.trim().parse().ok(),
        None => None,
    })
}

/// A linked set of ids for one title
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdRecord {
    pub watchmode_id: Option<u64>,
    pub imdb_id: Option<ImdbId>,
    pub tmdb_id: Option<u64>,
    pub media_type: Option<MediaType>,
}

/// Outcome of a dataset lookup that can veto a live fallback
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<T> {
    Hit(T),
    /// The title is known but recorded under the other media type
    Mismatch,
    Miss,
}

#[derive(Debug, Default)]
pub struct IdMap {
    by_watchmode: HashMap<u64, IdRecord>,
    by_imdb: HashMap<ImdbId, IdRecord>,
    by_tmdb: HashMap<(u64, MediaType), IdRecord>,
    by_title: HashMap<(String, MediaType), Vec<(Option<i32>, ImdbId)>>,
}

impl IdMap {
    /// Loads the dataset, falling back to an empty map when it is unavailable
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Id dataset not found, continuing without it");
                return Self::default();
            }
        };

        match Self::from_json(&contents) {
            Ok(map) => {
                tracing::info!(path = %path.display(), titles = map.len(), "Loaded id dataset");
                map
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Id dataset unreadable, continuing without it");
                Self::default()
            }
        }
    }

    pub fn from_json(json: &str) -> AppResult<Self> {
        let rows: Vec<IdRow> = serde_json::from_str(json)
            .map_err(|e| AppError::InvalidInput(format!("Malformed id dataset: {}", e)))?;
        Ok(Self::from_rows(rows))
    }

    pub fn from_rows(rows: impl IntoIterator<Item = IdRow>) -> Self {
        let mut map = Self::default();

        for row in rows {
            let media_type = row.kind.as_deref().and_then(media_type_from_tmdb);
            let record = IdRecord {
                watchmode_id: row.watchmode_id,
                imdb_id: row.imdb_id.as_deref().and_then(ImdbId::parse),
                tmdb_id: row.tmdb_id,
                media_type,
            };

            if let Some(id) = record.watchmode_id {
                map.by_watchmode.insert(id, record.clone());
            }
            if let Some(id) = &record.imdb_id {
                map.by_imdb.insert(id.clone(), record.clone());
            }
            if let (Some(id), Some(media_type)) = (record.tmdb_id, media_type) {
                map.by_tmdb.insert((id, media_type), record.clone());
            }
            if let (Some(title), Some(imdb_id), Some(media_type)) =
                (row.title.as_deref(), record.imdb_id.clone(), media_type)
            {
                let year = row.year.and_then(|y| i32::try_from(y).ok());
                map.by_title
                    .entry((normalize_title(title), media_type))
                    .or_default()
                    .push((year, imdb_id));
            }
        }

        map
    }

    /// Number of distinct IMDB ids known to the dataset
    pub fn len(&self) -> usize {
        self.by_imdb.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_imdb.is_empty()
    }

    /// IMDB to TMDB, refusing records whose type disagrees with `media_type`
    pub fn imdb_to_tmdb(&self, imdb_id: &ImdbId, media_type: MediaType) -> Lookup<u64> {
        match self.by_imdb.get(imdb_id) {
            Some(record) if record.media_type.is_some_and(|t| t != media_type) => Lookup::Mismatch,
            Some(IdRecord {
                tmdb_id: Some(id), ..
            }) => Lookup::Hit(*id),
            _ => Lookup::Miss,
        }
    }

    pub fn imdb_to_watchmode(&self, imdb_id: &ImdbId) -> Option<u64> {
        self.by_imdb.get(imdb_id)?.watchmode_id
    }

    pub fn tmdb_to_imdb(&self, tmdb_id: u64, media_type: MediaType) -> Option<ImdbId> {
        self.by_tmdb.get(&(tmdb_id, media_type))?.imdb_id.clone()
    }

    pub fn watchmode(&self, watchmode_id: u64) -> Option<&IdRecord> {
        self.by_watchmode.get(&watchmode_id)
    }

    /// Exact match on the normalized title
    ///
    /// With a year, only a record from that year (or one without a year)
    /// qualifies; without one the first record wins.
    pub fn find_title(&self, title: &str, year: Option<i32>, media_type: MediaType) -> Option<ImdbId> {
        let candidates = self.by_title.get(&(normalize_title(title), media_type))?;

        match year {
            Some(year) => candidates
                .iter()
                .find(|(y, _)| *y == Some(year))
                .or_else(|| candidates.iter().find(|(y, _)| y.is_none()))
                .map(|(_, id)| id.clone()),
            None => candidates.first().map(|(_, id)| id.clone()),
        }
    }
}

/// TMDB's "movie"/"tv" vocabulary
pub fn media_type_from_tmdb(kind: &str) -> Option<MediaType> {
    match kind.trim().to_lowercase().as_str() {
        "movie" => Some(MediaType::Movie),
        "tv" | "show" | "series" => Some(MediaType::Series),
        _ => None,
    }
}

/// Lowercases, drops punctuation and collapses whitespace
pub fn normalize_title(title: &str) -> String {
    let cleaned: String = title
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}
