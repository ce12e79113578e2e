use serde::Deserialize;
use std::time::Duration;

use crate::models::{ApiKey, MetadataSource, ProviderKeys, RankingPolicy, RecOptions};

/// Where cached values live
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackendKind {
    #[default]
    Memory,
    Redis,
}

/// Application configuration loaded from environment variables
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub cache_backend: CacheBackendKind,

    /// Redis connection URL, used when `cache_backend` is `redis`
    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    /// Upper bound on entries held by the in-process cache
    #[serde(default = "default_cache_max_entries")]
    pub cache_max_entries: usize,

    /// Timeout applied to every outbound HTTP request
    #[serde(default = "default_http_timeout_ms")]
    pub http_timeout_ms: u64,

    /// Budget for one source adapter's whole answer, translations included
    #[serde(default = "default_source_timeout_ms")]
    pub source_timeout_ms: u64,

    /// Offline Watchmode/IMDB/TMDB id dataset
    #[serde(default = "default_id_map_path")]
    pub id_map_path: String,

    #[serde(default = "default_language")]
    pub language: String,

    #[serde(default)]
    pub metadata_source: MetadataSource,

    #[serde(default)]
    pub include_collections: bool,

    #[serde(default)]
    pub ranking_policy: RankingPolicy,

    /// Title lookup strategies in the order they are tried (comma separated)
    #[serde(default = "default_title_lookup_order")]
    pub title_lookup_order: Vec<String>,

    #[serde(default = "default_gemini_model")]
    pub gemini_model: String,

    /// Number of recommendations requested from Gemini
    #[serde(default = "default_gemini_rec_limit")]
    pub gemini_rec_limit: usize,

    // Provider base URLs
    #[serde(default = "default_tmdb_api_url")]
    pub tmdb_api_url: String,
    #[serde(default = "default_trakt_api_url")]
    pub trakt_api_url: String,
    #[serde(default = "default_simkl_api_url")]
    pub simkl_api_url: String,
    #[serde(default = "default_tastedive_api_url")]
    pub tastedive_api_url: String,
    #[serde(default = "default_gemini_api_url")]
    pub gemini_api_url: String,
    #[serde(default = "default_watchmode_api_url")]
    pub watchmode_api_url: String,
    #[serde(default = "default_kitsu_api_url")]
    pub kitsu_api_url: String,
    #[serde(default = "default_cinemeta_api_url")]
    pub cinemeta_api_url: String,

    // Server-side API keys, used when a request brings none
    #[serde(default)]
    pub tmdb_api_key: String,
    #[serde(default)]
    pub trakt_api_key: String,
    #[serde(default)]
    pub simkl_api_key: String,
    #[serde(default)]
    pub tastedive_api_key: String,
    #[serde(default)]
    pub gemini_api_key: String,
    #[serde(default)]
    pub watchmode_api_key: String,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_cache_ttl_secs() -> u64 {
    7 * 24 * 60 * 60 // 1 week
}

fn default_cache_max_entries() -> usize {
    10_000
}

fn default_http_timeout_ms() -> u64 {
    5_000
}

fn default_source_timeout_ms() -> u64 {
    20_000
}

fn default_id_map_path() -> String {
    "data/watchmode_title_id_map.json".to_string()
}

fn default_language() -> String {
    "en".to_string()
}

fn default_title_lookup_order() -> Vec<String> {
    ["offline", "tmdb", "trakt", "cinemeta"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_gemini_model() -> String {
    "gemini-2.0-flash".to_string()
}

fn default_gemini_rec_limit() -> usize {
    30
}

fn default_tmdb_api_url() -> String {
    "https://api.themoviedb.org/3".to_string()
}

fn default_trakt_api_url() -> String {
    "https://api.trakt.tv".to_string()
}

fn default_simkl_api_url() -> String {
    "https://api.simkl.com".to_string()
}

fn default_tastedive_api_url() -> String {
    "https://tastedive.com/api".to_string()
}

fn default_gemini_api_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_watchmode_api_url() -> String {
    "https://api.watchmode.com/v1".to_string()
}

fn default_kitsu_api_url() -> String {
    "https://kitsu.io/api/edge".to_string()
}

fn default_cinemeta_api_url() -> String {
    "https://v3-cinemeta.strem.io".to_string()
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        envy::from_env::<Config>().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }

    pub fn source_timeout(&self) -> Duration {
        Duration::from_millis(self.source_timeout_ms)
    }

    /// Server-side keys; a key is considered valid when it is non-empty
    pub fn default_keys(&self) -> ProviderKeys {
        ProviderKeys {
            tmdb: ApiKey::new(self.tmdb_api_key.as_str()),
            trakt: ApiKey::new(self.trakt_api_key.as_str()),
            simkl: ApiKey::new(self.simkl_api_key.as_str()),
            tastedive: ApiKey::new(self.tastedive_api_key.as_str()),
            gemini: ApiKey::new(self.gemini_api_key.as_str()),
            watchmode: ApiKey::new(self.watchmode_api_key.as_str()),
        }
    }

    /// Options applied when a request does not bring its own
    pub fn rec_options(&self) -> RecOptions {
        RecOptions {
            include_collections: self.include_collections,
            language: self.language.clone(),
            metadata_source: self.metadata_source,
            ranking: self.ranking_policy,
        }
    }
}
