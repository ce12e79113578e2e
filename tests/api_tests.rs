use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::util::ServiceExt;

use more_like_this::{
    config::Config,
    db::Cache,
    routes::{create_router, AppState},
    services::IdMap,
};

const DATASET: &str = r#"[
    {"watchmodeID": 1295258, "imdbID": "tt1375666", "tmdbID": 27205, "type": "movie", "title": "Inception", "year": 2010},
    {"watchmodeID": 345534, "imdbID": "tt0944947", "tmdbID": 1399, "type": "tv", "title": "Game of Thrones", "year": 2011}
]"#;

/// Router with no provider keys and every provider pointed at a closed port
fn create_test_app() -> axum::Router {
    let unreachable = "http://127.0.0.1:9".to_string();
    let vars: Vec<(String, String)> = [
        "TMDB_API_URL",
        "TRAKT_API_URL",
        "SIMKL_API_URL",
        "TASTEDIVE_API_URL",
        "GEMINI_API_URL",
        "WATCHMODE_API_URL",
        "KITSU_API_URL",
        "CINEMETA_API_URL",
    ]
    .iter()
    .map(|name| (name.to_string(), unreachable.clone()))
    .chain([("HTTP_TIMEOUT_MS".to_string(), "500".to_string())])
    .collect();

    let config = envy::from_iter::<_, Config>(vars).unwrap();
    let cache = Cache::in_memory(Duration::from_secs(60), 100);
    let state = AppState::from_config(&config, IdMap::from_json(DATASET).unwrap(), cache).unwrap();
    create_router(Arc::new(state))
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn extract_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health_check() {
    let response = create_test_app().oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_request_id_is_echoed() {
    let request = Request::builder()
        .uri("/health")
        .header("x-request-id", "abc-123")
        .body(Body::empty())
        .unwrap();
    let response = create_test_app().oneshot(request).await.unwrap();
    assert_eq!(response.headers()["x-request-id"], "abc-123");

    let response = create_test_app().oneshot(get("/health")).await.unwrap();
    assert!(response.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn test_resolve_title_from_dataset() {
    let response = create_test_app()
        .oneshot(get("/api/v1/resolve?type=series&search=game%20of%20thrones%20y:2011"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["imdb_id"], "tt0944947");
    assert_eq!(body["tmdb_id"], 1399);
    assert_eq!(body["year"], 2011);
    assert_eq!(body["type"], "series");
}

#[tokio::test]
async fn test_resolve_unknown_title_is_404() {
    let response = create_test_app()
        .oneshot(get("/api/v1/resolve?type=movie&search=Definitely%20Not%20A%20Film"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let body = extract_json(response.into_body()).await;
    assert!(body["error"].as_str().unwrap().contains("Definitely Not A Film"));
}

#[tokio::test]
async fn test_kitsu_id_with_kitsu_down_is_404() {
    let response = create_test_app()
        .oneshot(get("/api/v1/resolve?type=series&search=kitsu:7442"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = create_test_app()
        .oneshot(post_json(
            "/api/v1/recommendations",
            json!({ "search": "kitsu:7442", "type": "series" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_resolve_empty_search_is_400() {
    let response = create_test_app()
        .oneshot(get("/api/v1/resolve?type=movie&search=%20"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_recommendations_without_keys_is_empty_not_an_error() {
    let response = create_test_app()
        .oneshot(post_json(
            "/api/v1/recommendations",
            json!({ "search": "Inception", "type": "movie" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["query"]["imdb_id"], "tt1375666");
    assert_eq!(body["query"]["title"], "Inception");
    assert_eq!(body["imdb_ids"], json!([]));
}

#[tokio::test]
async fn test_recommendations_for_imdb_id_without_metadata() {
    let response = create_test_app()
        .oneshot(post_json(
            "/api/v1/recommendations",
            json!({ "query": { "type": "movie", "imdb_id": "tt1375666" } }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["query"]["imdb_id"], "tt1375666");
    assert_eq!(body["query"]["tmdb_id"], 27205);
}

#[tokio::test]
async fn test_recommendations_need_search_or_query() {
    let response = create_test_app()
        .oneshot(post_json("/api/v1/recommendations", json!({ "type": "movie" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
