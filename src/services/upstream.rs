use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{CommentaryBuckets, Match, MatchStatus};
use crate::services::{commentary, normalizer};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("network error for {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("upstream returned {status} for {url}: {body}")]
    Status {
        url: String,
        status: StatusCode,
        body: String,
    },
    #[error("unexpected response shape from {url}: {reason}")]
    Shape { url: String, reason: String },
    #[error("upstream rejected {url}: {message}")]
    Rejected { url: String, message: String },
}

// ── Endpoint catalogue ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchFeed {
    CricketLive,
    CricketResults,
    CricketFixtures,
    FootballLive,
    FootballResults,
    FootballFixtures,
    LocalMatches,
}

impl MatchFeed {
    pub fn path(self) -> &'static str {
        match self {
            MatchFeed::CricketLive => "/api/v1/cricket/matches/live",
            MatchFeed::CricketResults => "/api/v1/cricket/matches/results",
            MatchFeed::CricketFixtures => "/api/v1/cricket/matches/fixtures",
            MatchFeed::FootballLive => "/api/v1/football/matches/live",
            MatchFeed::FootballResults => "/api/v1/football/matches/results",
            MatchFeed::FootballFixtures => "/api/v1/football/matches/fixtures",
            MatchFeed::LocalMatches => "/api/v1/admin/local-matches",
        }
    }

    /// Status assumed when an item carries none we recognise.
    pub fn implied_status(self) -> Option<MatchStatus> {
        match self {
            MatchFeed::CricketLive | MatchFeed::FootballLive => Some(MatchStatus::Live),
            MatchFeed::CricketResults | MatchFeed::FootballResults => Some(MatchStatus::Completed),
            MatchFeed::CricketFixtures | MatchFeed::FootballFixtures => Some(MatchStatus::Upcoming),
            MatchFeed::LocalMatches => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            MatchFeed::CricketLive => "cricket-live",
            MatchFeed::CricketResults => "cricket-results",
            MatchFeed::CricketFixtures => "cricket-fixtures",
            MatchFeed::FootballLive => "football-live",
            MatchFeed::FootballResults => "football-results",
            MatchFeed::FootballFixtures => "football-fixtures",
            MatchFeed::LocalMatches => "local-matches",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommentarySource {
    #[default]
    Feed,
    InHouse,
}

impl std::str::FromStr for CommentarySource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "feed" => Ok(CommentarySource::Feed),
            "in-house" | "in_house" | "inhouse" => Ok(CommentarySource::InHouse),
            other => Err(format!("unknown commentary source '{}'", other)),
        }
    }
}

// ── UpstreamClient ───────────────────────────────────────────────────────────

/// Thin GET wrapper over the backend API. Cloning is cheap; the inner
/// `reqwest::Client` is reference counted.
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    client: Client,
    base_url: String,
}

impl UpstreamClient {
    pub fn new(base_url: &str, timeout: Duration) -> reqwest::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("scorecast/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch one match list and normalize it. Items the normalizer rejects
    /// are dropped, not fatal.
    pub async fn fetch_feed(&self, feed: MatchFeed) -> Result<Vec<Match>, FetchError> {
        let (url, data) = self.get_data(feed.path()).await?;
        let items = match_list(&url, data)?;
        let total = items.len();

        let matches: Vec<Match> = items
            .iter()
            .filter_map(|item| match normalizer::normalize_match(item, feed.implied_status()) {
                Ok(m) => Some(m),
                Err(reason) => {
                    tracing::debug!(feed = feed.label(), ?reason, "dropping upstream match");
                    None
                }
            })
            .collect();

        tracing::debug!(feed = feed.label(), total, kept = matches.len(), "feed fetched");
        Ok(matches)
    }

    /// Single cricket match, used for the match header.
    pub async fn fetch_match(&self, match_id: &str) -> Result<Match, FetchError> {
        let (url, data) = self.get_data(&format!("/api/v1/cricket/matches/{}", match_id)).await?;

        let item = match &data {
            Value::Object(obj) => obj.get("match").filter(|v| v.is_object()).unwrap_or(&data),
            _ => &data,
        };

        normalizer::normalize_match(item, None).map_err(|reason| FetchError::Shape {
            url,
            reason: format!("match rejected: {:?}", reason),
        })
    }

    pub async fn fetch_commentary(
        &self,
        match_id: &str,
        source: CommentarySource,
    ) -> Result<CommentaryBuckets, FetchError> {
        let path = match source {
            CommentarySource::Feed => format!("/api/v1/cricket/matches/{}/commentary", match_id),
            CommentarySource::InHouse => format!("/api/v1/cricket/matches/{}/commentary/in-house", match_id),
        };
        let (url, data) = self.get_data(&path).await?;

        commentary::normalize_payload(&data).map_err(|reason| FetchError::Shape { url, reason })
    }

    async fn get_data(&self, path: &str) -> Result<(String, Value), FetchError> {
        let url = format!("{}{}", self.base_url, path);
        let request_id = Uuid::new_v4();
        tracing::debug!(%url, %request_id, "GET upstream");

        let response = self
            .client
            .get(&url)
            .header("x-request-id", request_id.to_string())
            .send()
            .await
            .map_err(|source| FetchError::Network { url: url.clone(), source })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Status { url, status, body });
        }

        let body: Value = response.json().await.map_err(|e| FetchError::Shape {
            url: url.clone(),
            reason: e.to_string(),
        })?;

        let data = open_envelope(&url, body)?;
        Ok((url, data))
    }
}

// ── Envelope handling ────────────────────────────────────────────────────────

/// `{ success, data?, message? }`. Bodies without a `success` flag are taken
/// to be the data itself.
pub(crate) fn open_envelope(url: &str, body: Value) -> Result<Value, FetchError> {
    let mut obj = match body {
        Value::Object(obj) => obj,
        other => return Ok(other),
    };

    match obj.get("success") {
        Some(Value::Bool(false)) => {
            let message = obj
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("request was not successful")
                .to_string();
            Err(FetchError::Rejected { url: url.to_string(), message })
        }
        Some(_) => Ok(obj.remove("data").unwrap_or(Value::Null)),
        None => Ok(Value::Object(obj)),
    }
}

const LIST_KEYS: [&str; 3] = ["results", "fixtures", "matches"];

/// Find the match array inside `data`, which is either the array itself or
/// an object nesting it under a named key (possibly behind another `data`).
pub(crate) fn match_list(url: &str, data: Value) -> Result<Vec<Value>, FetchError> {
    let mut current = data;
    for _ in 0..3 {
        match current {
            Value::Array(items) => return Ok(items),
            Value::Null => return Ok(Vec::new()),
            Value::Object(mut obj) => {
                if let Some(key) = LIST_KEYS.iter().find(|k| matches!(obj.get(**k), Some(Value::Array(_)))) {
                    if let Some(Value::Array(items)) = obj.remove(*key) {
                        return Ok(items);
                    }
                }
                match obj.remove("data") {
                    Some(inner) => current = inner,
                    None => break,
                }
            }
            _ => break,
        }
    }

    Err(FetchError::Shape {
        url: url.to_string(),
        reason: "no match list in response".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::Path, routing::get, Json, Router};
    use serde_json::json;

    async fn spawn_upstream(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[test]
    fn test_open_envelope_variants() {
        let data = open_envelope("u", json!({"success": true, "data": [1, 2]})).unwrap();
        assert_eq!(data, json!([1, 2]));

        let bare = open_envelope("u", json!([{"id": 1}])).unwrap();
        assert_eq!(bare, json!([{"id": 1}]));

        let err = open_envelope("u", json!({"success": false, "message": "boom"})).unwrap_err();
        assert!(matches!(err, FetchError::Rejected { ref message, .. } if message == "boom"));

        let missing = open_envelope("u", json!({"success": true})).unwrap();
        assert_eq!(missing, Value::Null);
    }

    #[test]
    fn test_match_list_unwraps_known_shapes() {
        assert_eq!(match_list("u", json!([1])).unwrap().len(), 1);
        assert_eq!(
            match_list("u", json!({"results": [1, 2], "pagination": {"page": 1}})).unwrap().len(),
            2
        );
        assert_eq!(match_list("u", json!({"fixtures": [1]})).unwrap().len(), 1);
        assert_eq!(match_list("u", json!({"data": {"results": [1, 2, 3]}})).unwrap().len(), 3);
        assert!(match_list("u", Value::Null).unwrap().is_empty());
        assert!(matches!(
            match_list("u", json!({"total": 3})),
            Err(FetchError::Shape { .. })
        ));
    }

    #[tokio::test]
    async fn test_fetch_feed_normalizes_and_drops_ambiguous() {
        let router = Router::new().route(
            "/api/v1/cricket/matches/live",
            get(|| async {
                Json(json!({
                    "success": true,
                    "data": [
                        {"_id": "a", "format": "t20", "teams": {"home": "India", "away": "Australia"}},
                        {"_id": "b", "format": "t20", "league": "EPL"},
                        {"_id": "c"}
                    ]
                }))
            }),
        );
        let base = spawn_upstream(router).await;
        let client = UpstreamClient::new(&base, Duration::from_secs(5)).unwrap();

        let matches = client.fetch_feed(MatchFeed::CricketLive).await.unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].id, "a");
        assert_eq!(matches[0].status, MatchStatus::Live);
    }

    #[tokio::test]
    async fn test_fetch_feed_reports_http_status() {
        let router = Router::new().route(
            "/api/v1/football/matches/live",
            get(|| async { (axum::http::StatusCode::SERVICE_UNAVAILABLE, "down") }),
        );
        let base = spawn_upstream(router).await;
        let client = UpstreamClient::new(&base, Duration::from_secs(5)).unwrap();

        let err = client.fetch_feed(MatchFeed::FootballLive).await.unwrap_err();
        match err {
            FetchError::Status { status, body, .. } => {
                assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
                assert_eq!(body, "down");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_fetch_commentary_uses_in_house_path() {
        let router = Router::new().route(
            "/api/v1/cricket/matches/{id}/commentary/in-house",
            get(|Path(id): Path<String>| async move {
                assert_eq!(id, "m7");
                Json(json!({
                    "success": true,
                    "data": [{"over": 3.2, "ballNumber": 2, "scoreboard": "S1", "runs": 1}]
                }))
            }),
        );
        let base = spawn_upstream(router).await;
        let client = UpstreamClient::new(&base, Duration::from_secs(5)).unwrap();

        let buckets = client.fetch_commentary("m7", CommentarySource::InHouse).await.unwrap();
        assert_eq!(buckets.first_innings.len(), 1);
        assert_eq!(buckets.first_innings[0].over, 3);
        assert!(buckets.second_innings.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_match_unwraps_nested_object() {
        let router = Router::new().route(
            "/api/v1/cricket/matches/{id}",
            get(|| async {
                Json(json!({
                    "success": true,
                    "data": {"match": {"id": "m9", "format": "odi", "status": "completed"}}
                }))
            }),
        );
        let base = spawn_upstream(router).await;
        let client = UpstreamClient::new(&base, Duration::from_secs(5)).unwrap();

        let m = client.fetch_match("m9").await.unwrap();
        assert_eq!(m.id, "m9");
        assert_eq!(m.status, MatchStatus::Completed);
    }

    #[tokio::test]
    async fn test_connection_refused_is_network_error() {
        let client = UpstreamClient::new("http://127.0.0.1:9", Duration::from_secs(2)).unwrap();
        let err = client.fetch_feed(MatchFeed::CricketResults).await.unwrap_err();
        assert!(matches!(err, FetchError::Network { .. }));
    }
}
