/// Kitsu anime metadata
///
/// Kitsu ids carry no cross-reference to IMDB. The resolver turns them into a
/// title, year and type and resolves that title like any other.
use reqwest::Client as HttpClient;
use serde::Deserialize;

use super::{ensure_success, year_from_date};
use crate::{
    error::AppResult,
    models::MediaType,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KitsuTitle {
    pub title: String,
    pub year: Option<i32>,
    pub media_type: MediaType,
}

#[derive(Debug, Deserialize)]
struct AnimeResponse {
    data: Option<AnimeData>,
}

#[derive(Debug, Deserialize)]
struct AnimeData {
    attributes: Attributes,
}

#[derive(Debug, Default, Deserialize)]
struct Titles {
    #[serde(default)]
    en: Option<String>,
    #[serde(default)]
    en_jp: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Attributes {
    #[serde(default)]
    titles: Titles,
    #[serde(default)]
    start_date: Option<String>,
    #[serde(default)]
    subtype: Option<String>,
}

impl Attributes {
    fn into_title(self) -> Option<KitsuTitle> {
        let raw = self
            .titles
            .en
            .filter(|t| !t.trim().is_empty())
            .or(self.titles.en_jp)?;
        let title = strip_season_suffix(&raw);
        if title.is_empty() {
            return None;
        }

        // Specials, OVAs and films are all movies everywhere else
        let media_type = match self.subtype.as_deref() {
            Some("TV") => MediaType::Series,
            _ => MediaType::Movie,
        };

        Some(KitsuTitle {
            title,
            year: self.start_date.as_deref().and_then(year_from_date),
            media_type,
        })
    }
}

/// Drops a trailing "Season N" (and anything after it) from a title
pub fn strip_season_suffix(title: &str) -> String {
    let words: Vec<&str> = title.split_whitespace().collect();
    let cut = words.windows(2).position(|pair| {
        pair[0].eq_ignore_ascii_case("season") && pair[1].chars().all(|c| c.is_ascii_digit())
    });
    match cut {
        Some(index) => words[..index].join(" "),
        None => words.join(" "),
    }
}

#[derive(Clone)]
pub struct KitsuClient {
    http_client: HttpClient,
    api_url: String,
}

impl KitsuClient {
    pub fn new(http_client: HttpClient, api_url: String) -> Self {
        Self {
            http_client,
            api_url,
        }
    }

    pub async fn anime(&self, kitsu_id: u64) -> AppResult<Option<KitsuTitle>> {
        let url = format!("{}/anime/{}", self.api_url, kitsu_id);

        let response = self
            .http_client
            .get(&url)
            .header("Accept", "application/vnd.api+json")
            .send()
            .await?;

        let response = ensure_success(response, "Kitsu").await?;
        let body: AnimeResponse = response.json().await?;

        Ok(body.data.and_then(|data| data.attributes.into_title()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> Option<KitsuTitle> {
        let body: AnimeResponse = serde_json::from_str(json).unwrap();
        body.data.and_then(|data| data.attributes.into_title())
    }

    #[test]
    fn test_strip_season_suffix() {
        assert_eq!(strip_season_suffix("Attack on Titan Season 3 Part 2"), "Attack on Titan");
        assert_eq!(strip_season_suffix("Spy x Family"), "Spy x Family");
        assert_eq!(strip_season_suffix("Season of Mist"), "Season of Mist");
    }

    #[test]
    fn test_tv_subtype_is_series() {
        let title = parse(
            r#"{"data": {"id": "7442", "attributes": {
                "titles": {"en": "Attack on Titan", "en_jp": "Shingeki no Kyojin"},
                "startDate": "2013-04-07", "subtype": "TV"}}}"#,
        )
        .unwrap();
        assert_eq!(title.title, "Attack on Titan");
        assert_eq!(title.year, Some(2013));
        assert_eq!(title.media_type, MediaType::Series);
    }

    #[test]
    fn test_falls_back_to_romaji_and_movie() {
        let title = parse(
            r#"{"data": {"attributes": {
                "titles": {"en": "", "en_jp": "Kimi no Na wa."},
                "startDate": "2016-08-26", "subtype": "movie"}}}"#,
        )
        .unwrap();
        assert_eq!(title.title, "Kimi no Na wa.");
        assert_eq!(title.media_type, MediaType::Movie);
    }

    #[test]
    fn test_missing_titles_is_none() {
        assert_eq!(parse(r#"{"data": {"attributes": {"titles": {}}}}"#), None);
        assert_eq!(parse(r#"{"data": null}"#), None);
    }
}
