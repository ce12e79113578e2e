/// Gemini generative recommendations
///
/// The model is asked for "Title, Year" lines, the query itself first. The
/// first line is the model's reading of the query and must translate back to
/// the query's IMDB id; the remaining lines are resolved by title.
use reqwest::Client as HttpClient;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use super::{confirm_query, ensure_success, non_empty, rank_candidates, settle, RecommendationSource};
use crate::{
    cached,
    db::{Cache, CacheKey},
    error::{AppError, AppResult},
    models::{MediaType, ProviderKeys, RecOptions, RecommendationEntry, ResolvedQuery, Source},
    services::resolver::IdTranslator,
};

/// One "Title, Year" line of model output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuggestedTitle {
    pub title: String,
    pub year: Option<i32>,
}

/// Parses model output, one suggestion per non-blank line
///
/// Lines split on the last comma so titles may contain commas. A trailing
/// part that is not a year is kept as part of the title.
pub fn parse_suggestions(text: &str) -> Vec<SuggestedTitle> {
    text.lines()
        .map(|line| line.trim().trim_start_matches(['-', '*', ' ']).trim())
        .filter(|line| !line.is_empty())
        .map(|line| match line.rsplit_once(',') {
            Some((title, year)) => match year.trim().trim_matches('"').parse::<i32>() {
                Ok(year) => SuggestedTitle {
                    title: title.trim().trim_matches('"').to_string(),
                    year: Some(year),
                },
                Err(_) => SuggestedTitle {
                    title: line.trim_matches('"').to_string(),
                    year: None,
                },
            },
            None => SuggestedTitle {
                title: line.trim_matches('"').to_string(),
                year: None,
            },
        })
        .filter(|suggestion| !suggestion.title.is_empty())
        .collect()
}

fn noun(media_type: MediaType) -> &'static str {
    match media_type {
        MediaType::Movie => "movie",
        MediaType::Series => "tv show",
    }
}

fn system_instruction(media_type: MediaType) -> String {
    let noun = noun(media_type);
    format!(
        "You are a {noun} recommendation service, not a chatbot. You should only ever output \
         recommendations. Output in the following format: {noun} name, year. Leave it as an \
         empty string if not applicable."
    )
}

fn prompt(title: &str, year: Option<i32>, media_type: MediaType, limit: usize) -> String {
    let noun = noun(media_type);
    let year = year.map(|y| y.to_string()).unwrap_or_default();
    format!(
        "You are an advanced {noun} recommendation system with deep domain knowledge across \
         {noun}s from all eras, regions and production scales.\n\n\
         TASK: Generate {limit} highly relevant {noun} recommendations that capture the essence \
         of \"{title}\" {year} as closely as possible.\n\n\
         RECOMMENDATION GUIDELINES:\n\
         - If direct sequels, prequels, spin-offs or remakes exist, list the most relevant ones\n\
         - Prioritize thematic and structural similarity, comparable narrative and emotional impact\n\
         - Deprioritize superficial connections like shared cast, crew or popularity\n\n\
         FORMAT:\n\
         - The first line must be \"{title}\" itself with its release year\n\
         - Then one recommendation per line in the format: \"Title, Year\"\n\
         - No numbering, explanations or additional text"
    )
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

impl GenerateResponse {
    fn text(self) -> String {
        self.candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .map(|part| part.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default()
    }
}

#[derive(Clone)]
pub struct GeminiClient {
    http_client: HttpClient,
    api_url: String,
    model: String,
    limit: usize,
}

impl GeminiClient {
    pub fn new(http_client: HttpClient, api_url: String, model: String, limit: usize) -> Self {
        Self {
            http_client,
            api_url,
            model,
            limit,
        }
    }

    pub async fn suggest(
        &self,
        title: &str,
        year: Option<i32>,
        media_type: MediaType,
        api_key: &str,
    ) -> AppResult<Vec<SuggestedTitle>> {
        let url = format!("{}/models/{}:generateContent", self.api_url, self.model);

        let body = json!({
            "systemInstruction": { "parts": [{ "text": system_instruction(media_type) }] },
            "contents": [{ "role": "user", "parts": [{ "text": prompt(title, year, media_type, self.limit) }] }],
        });

        let response = self
            .http_client
            .post(&url)
            .query(&[("key", api_key)])
            .json(&body)
            .send()
            .await?;

        let response = ensure_success(response, "Gemini").await?;
        let generated: GenerateResponse = response.json().await?;
        let text = generated.text();

        tracing::debug!(provider = "gemini", model = %self.model, lines = text.lines().count(), "Generated suggestions");

        // The query line comes on top of the requested count
        let mut suggestions = parse_suggestions(&text);
        suggestions.truncate(self.limit + 1);
        Ok(suggestions)
    }
}

#[derive(Clone)]
pub struct GeminiSource {
    client: GeminiClient,
    translator: Arc<dyn IdTranslator>,
    cache: Cache,
}

impl GeminiSource {
    pub fn new(client: GeminiClient, translator: Arc<dyn IdTranslator>, cache: Cache) -> Self {
        Self {
            client,
            translator,
            cache,
        }
    }

    async fn fetch(
        &self,
        query: &ResolvedQuery,
        keys: &ProviderKeys,
    ) -> AppResult<Vec<RecommendationEntry>> {
        let api_key = keys
            .gemini
            .usable()
            .ok_or_else(|| AppError::InvalidInput("Gemini key is not valid".to_string()))?;

        let suggestions = self
            .client
            .suggest(&query.title, query.year, query.media_type, api_key)
            .await?;

        self.rank(query, keys, suggestions).await
    }

    async fn rank(
        &self,
        query: &ResolvedQuery,
        keys: &ProviderKeys,
        suggestions: Vec<SuggestedTitle>,
    ) -> AppResult<Vec<RecommendationEntry>> {
        let mut suggestions = suggestions.into_iter();

        let understood = match suggestions.next() {
            Some(first) => {
                self.translator
                    .title_to_imdb(&first.title, first.year, query.media_type, keys)
                    .await
            }
            None => None,
        };
        confirm_query(Source::Gemini, query, understood.as_ref())?;

        let rest: Vec<SuggestedTitle> = suggestions.collect();
        let entries = rank_candidates(query, rest, |suggestion| async move {
            let imdb_id = self
                .translator
                .title_to_imdb(&suggestion.title, suggestion.year, query.media_type, keys)
                .await?;
            Some((imdb_id, None))
        })
        .await;

        non_empty(Source::Gemini, entries)
    }
}

#[async_trait::async_trait]
impl RecommendationSource for GeminiSource {
    fn source(&self) -> Source {
        Source::Gemini
    }

    fn is_enabled(&self, keys: &ProviderKeys) -> bool {
        keys.gemini.usable().is_some()
    }

    async fn recommend(
        &self,
        query: &ResolvedQuery,
        keys: &ProviderKeys,
        _options: &RecOptions,
    ) -> Option<Vec<RecommendationEntry>> {
        if !self.is_enabled(keys) || query.title.trim().is_empty() {
            return None;
        }

        let this = self.clone();
        let owned_query = query.clone();
        let keys = keys.clone();

        let result = cached!(
            self.cache,
            CacheKey::recs(Source::Gemini, query, false),
            async move { this.fetch(&owned_query, &keys).await }
        );

        settle(Source::Gemini, query, result)
    }
}
