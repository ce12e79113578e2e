use serde::{Deserialize, Serialize};
use std::{fmt::Display, str::FromStr};

pub mod keys;
pub mod query;

pub use keys::{ApiKey, MetadataSource, ProviderKeys, RankingPolicy, RecOptions, Source};
pub use query::{MediaQuery, ResolvedQuery};

/// IMDB identifier, the id of record for every title (e.g. "tt1375666")
///
/// Every cross-provider comparison happens on this type, never on a
/// provider-native id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ImdbId(String);

impl ImdbId {
    /// Parses an IMDB id, ignoring any `:season:episode` suffix
    pub fn parse(raw: &str) -> Option<Self> {
        let id = raw.trim().split(':').next()?;
        let digits = id.strip_prefix("tt")?;
        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        Some(Self(id.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ImdbId {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| format!("invalid IMDB id: {}", value))
    }
}

impl From<ImdbId> for String {
    fn from(id: ImdbId) -> Self {
        id.0
    }
}

impl Display for ImdbId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of title a query or recommendation refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Movie,
    Series,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Movie => "movie",
            MediaType::Series => "series",
        }
    }
}

impl Display for MediaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "movie" => Ok(MediaType::Movie),
            "series" => Ok(MediaType::Series),
            other => Err(format!("unknown media type: {}", other)),
        }
    }
}

/// Identifier spaces the resolver can translate to and from IMDB
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdSpace {
    Tmdb,
    Trakt,
    Simkl,
    Watchmode,
    Kitsu,
}

/// A provider-native identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExternalId {
    Tmdb(u64),
    Trakt(u64),
    Simkl(u64),
    Watchmode(u64),
    Kitsu(u64),
}

impl ExternalId {
    pub fn space(&self) -> IdSpace {
        match self {
            ExternalId::Tmdb(_) => IdSpace::Tmdb,
            ExternalId::Trakt(_) => IdSpace::Trakt,
            ExternalId::Simkl(_) => IdSpace::Simkl,
            ExternalId::Watchmode(_) => IdSpace::Watchmode,
            ExternalId::Kitsu(_) => IdSpace::Kitsu,
        }
    }

    pub fn value(&self) -> u64 {
        match *self {
            ExternalId::Tmdb(id)
            | ExternalId::Trakt(id)
            | ExternalId::Simkl(id)
            | ExternalId::Watchmode(id)
            | ExternalId::Kitsu(id) => id,
        }
    }
}

impl Display for ExternalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let prefix = match self.space() {
            IdSpace::Tmdb => "tmdb",
            IdSpace::Trakt => "trakt",
            IdSpace::Simkl => "simkl",
            IdSpace::Watchmode => "watchmode",
            IdSpace::Kitsu => "kitsu",
        };
        write!(f, "{}:{}", prefix, self.value())
    }
}

/// One recommended title as produced by a single source
///
/// `ranking` is the 1-based position the title held in that source's list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecommendationEntry {
    pub imdb_id: ImdbId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tmdb_id: Option<u64>,
    pub ranking: u32,
}
