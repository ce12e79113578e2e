/// Cinemeta, the free catalog service
///
/// Needs no key. Used for metadata when TMDB is unavailable and as the last
/// title-lookup strategy.
use reqwest::Client as HttpClient;
use serde::Deserialize;

use super::{ensure_success, year_from_date};
use crate::{
    error::AppResult,
    models::{ImdbId, MediaType},
    services::resolver::TitleMeta,
};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CinemetaMeta {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub imdb_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default, deserialize_with = "loose_year")]
    pub year: Option<i32>,
    #[serde(default)]
    pub release_info: Option<String>,
}

/// Cinemeta reports years as numbers, strings or ranges like "2011–2019"
fn loose_year<'de, D>(deserializer: D) -> Result<Option<i32>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Loose {
        Number(i32),
        Text(String),
    }

    Ok(match Option::<Loose>::deserialize(deserializer)? {
        Some(Loose::Number(n)) => Some(n),
        Some(Loose::Text(s)) => year_from_date(&s),
        None => None,
    })
}

impl CinemetaMeta {
    pub fn imdb(&self) -> Option<ImdbId> {
        self.imdb_id
            .as_deref()
            .or(self.id.as_deref())
            .and_then(ImdbId::parse)
    }

    pub fn media_type(&self) -> Option<MediaType> {
        self.kind.as_deref().and_then(|kind| kind.parse().ok())
    }

    /// `year`, else the start of `releaseInfo`
    pub fn release_year(&self) -> Option<i32> {
        self.year
            .or_else(|| self.release_info.as_deref().and_then(year_from_date))
    }

    pub fn into_meta(self, media_type: MediaType) -> Option<TitleMeta> {
        let year = self.release_year();
        Some(TitleMeta {
            title: self.name.filter(|n| !n.trim().is_empty())?,
            year,
            media_type: self.kind.as_deref().and_then(|k| k.parse().ok()).unwrap_or(media_type),
            tmdb_id: None,
        })
    }
}

#[derive(Debug, Deserialize)]
struct MetaResponse {
    #[serde(default)]
    meta: Option<CinemetaMeta>,
}

#[derive(Debug, Deserialize)]
struct CatalogResponse {
    #[serde(default)]
    metas: Vec<CinemetaMeta>,
}

#[derive(Clone)]
pub struct CinemetaClient {
    http_client: HttpClient,
    api_url: String,
}

impl CinemetaClient {
    pub fn new(http_client: HttpClient, api_url: String) -> Self {
        Self {
            http_client,
            api_url,
        }
    }

    pub async fn meta(
        &self,
        imdb_id: &ImdbId,
        media_type: MediaType,
    ) -> AppResult<Option<CinemetaMeta>> {
        let url = format!("{}/meta/{}/{}.json", self.api_url, media_type, imdb_id);

        let response = self.http_client.get(&url).send().await?;
        let response = ensure_success(response, "Cinemeta").await?;
        let body: MetaResponse = response.json().await?;
        Ok(body.meta)
    }

    pub async fn search(&self, title: &str, media_type: MediaType) -> AppResult<Vec<CinemetaMeta>> {
        // The search term is a path segment; reqwest percent-encodes it
        let mut url = reqwest::Url::parse(&self.api_url)
            .map_err(|e| crate::error::AppError::Internal(format!("Bad Cinemeta URL: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| crate::error::AppError::Internal("Bad Cinemeta URL".to_string()))?
            .extend([
                "catalog",
                media_type.as_str(),
                "top",
                &format!("search={}.json", title),
            ]);

        let response = self.http_client.get(url).send().await?;
        let response = ensure_success(response, "Cinemeta").await?;
        let body: CatalogResponse = response.json().await?;
        Ok(body.metas)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_year_from_release_info() {
        let json = r#"{"meta": {"id": "tt0944947", "imdb_id": "tt0944947", "name": "Game of Thrones",
                        "type": "series", "releaseInfo": "2011–2019"}}"#;
        let meta = serde_json::from_str::<MetaResponse>(json).unwrap().meta.unwrap();
        assert_eq!(meta.release_year(), Some(2011));
        assert_eq!(meta.media_type(), Some(MediaType::Series));
        assert_eq!(meta.imdb(), ImdbId::parse("tt0944947"));
    }

    #[test]
    fn test_string_year_and_into_meta() {
        let json = r#"{"id": "tt1375666", "name": "Inception", "type": "movie", "year": "2010"}"#;
        let meta: CinemetaMeta = serde_json::from_str(json).unwrap();
        let title = meta.into_meta(MediaType::Movie).unwrap();
        assert_eq!(title.title, "Inception");
        assert_eq!(title.year, Some(2010));
        assert_eq!(title.media_type, MediaType::Movie);
    }

    #[test]
    fn test_into_meta_requires_name() {
        let meta: CinemetaMeta = serde_json::from_str(r#"{"id": "tt1375666"}"#).unwrap();
        assert!(meta.into_meta(MediaType::Movie).is_none());
    }

    #[test]
    fn test_catalog_response_parse() {
        let json = r#"{"metas": [{"id": "tt0133093", "name": "The Matrix", "type": "movie", "releaseInfo": "1999"}]}"#;
        let body: CatalogResponse = serde_json::from_str(json).unwrap();
        assert_eq!(body.metas[0].release_year(), Some(1999));
    }
}
