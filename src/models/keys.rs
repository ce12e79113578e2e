use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// Recommendation providers the aggregator can fan out to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Tmdb,
    Trakt,
    Simkl,
    TasteDive,
    Gemini,
    Watchmode,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Tmdb => "tmdb",
            Source::Trakt => "trakt",
            Source::Simkl => "simkl",
            Source::TasteDive => "tastedive",
            Source::Gemini => "gemini",
            Source::Watchmode => "watchmode",
        }
    }
}

impl Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A provider API key together with its verified-validity flag
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiKey {
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub valid: bool,
}

impl ApiKey {
    /// Treats any non-empty key as valid; used for server-side keys from the environment
    pub fn new(key: impl Into<String>) -> Self {
        let key = key.into();
        let valid = !key.trim().is_empty();
        Self { key, valid }
    }

    /// Returns the key only when it is present and flagged valid
    pub fn usable(&self) -> Option<&str> {
        let key = self.key.trim();
        (self.valid && !key.is_empty()).then_some(key)
    }
}

/// Per-request provider credentials
///
/// Threaded explicitly through every call so validity can differ per request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderKeys {
    pub tmdb: ApiKey,
    pub trakt: ApiKey,
    pub simkl: ApiKey,
    pub tastedive: ApiKey,
    pub gemini: ApiKey,
    pub watchmode: ApiKey,
}

impl ProviderKeys {
    pub fn get(&self, source: Source) -> &ApiKey {
        match source {
            Source::Tmdb => &self.tmdb,
            Source::Trakt => &self.trakt,
            Source::Simkl => &self.simkl,
            Source::TasteDive => &self.tastedive,
            Source::Gemini => &self.gemini,
            Source::Watchmode => &self.watchmode,
        }
    }
}

/// Where descriptive metadata (title, year) is fetched from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetadataSource {
    #[default]
    Tmdb,
    Cinemeta,
}

impl MetadataSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetadataSource::Tmdb => "tmdb",
            MetadataSource::Cinemeta => "cinemeta",
        }
    }
}

/// How per-source positions are folded into one score during the merge
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RankingPolicy {
    /// Sum of raw 1-based positions
    #[default]
    Position,
    /// Each position divided by the length of the list it came from
    Normalized,
}

impl RankingPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RankingPolicy::Position => "position",
            RankingPolicy::Normalized => "normalized",
        }
    }
}

impl std::str::FromStr for RankingPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "position" => Ok(RankingPolicy::Position),
            "normalized" => Ok(RankingPolicy::Normalized),
            other => Err(format!("Unknown ranking policy: {}", other)),
        }
    }
}

/// Options that shape one recommendation round
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecOptions {
    /// Place TMDB collection siblings ahead of TMDB's recommendations
    pub include_collections: bool,
    /// Language tag, only passed through to metadata lookups
    pub language: String,
    pub metadata_source: MetadataSource,
    pub ranking: RankingPolicy,
}

impl Default for RecOptions {
    fn default() -> Self {
        Self {
            include_collections: false,
            language: "en".to_string(),
            metadata_source: MetadataSource::Tmdb,
            ranking: RankingPolicy::Position,
        }
    }
}
