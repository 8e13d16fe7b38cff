use crate::wire::{decode_entries, response_standings};
use crate::{ExportArtifact, LeaderboardEntry, Scope, ScopeKind};
use log::{debug, warn};
use reqwest::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde_json::Value;
use std::fmt;
use std::time::Duration;

pub type ApiResult<T> = Result<T, ApiError>;

const DEFAULT_BASE_URL: &str = "http://127.0.0.1:4000/api";

/// Leaderboard API client for the tournament platform's REST endpoints.
#[derive(Debug, Clone)]
pub struct LeaderboardApi {
    client: Client,
    base_url: String,
    token: Option<String>,
    timeout: Duration,
}

impl Default for LeaderboardApi {
    fn default() -> Self {
        Self {
            client: Client::builder()
                .user_agent("standings-tui/0.1 (terminal leaderboard viewer)")
                .build()
                .unwrap_or_default(),
            base_url: DEFAULT_BASE_URL.to_owned(),
            token: None,
            timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug)]
pub enum ApiError {
    Network(reqwest::Error, String),
    Api(reqwest::Error, String),
    Parsing(reqwest::Error, String),
    NotFound(String),
    Other(String),
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::Network(e, url) => write!(f, "Network error for {url}: {e}"),
            ApiError::Api(e, url) => write!(f, "API error for {url}: {e}"),
            ApiError::Parsing(e, url) => write!(f, "Parse error for {url}: {e}"),
            ApiError::NotFound(msg) => write!(f, "Not found: {msg}"),
            ApiError::Other(msg) => write!(f, "Error: {msg}"),
        }
    }
}

impl std::error::Error for ApiError {}

impl LeaderboardApi {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            ..Self::default()
        }
    }

    /// Attach a bearer token to every request.
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token.filter(|t| !t.trim().is_empty());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Tournament-wide standings.
    pub async fn fetch_by_tournament(&self, tournament_id: &str) -> ApiResult<Vec<LeaderboardEntry>> {
        let url = format!("{}/leaderboard/tournament/{tournament_id}", self.base_url);
        self.get_standings(&url).await
    }

    /// Standings for a single stage.
    pub async fn fetch_by_stage(&self, stage_id: &str) -> ApiResult<Vec<LeaderboardEntry>> {
        let url = format!("{}/leaderboard/stage/{stage_id}", self.base_url);
        self.get_standings(&url).await
    }

    pub async fn fetch(&self, scope: &Scope) -> ApiResult<Vec<LeaderboardEntry>> {
        match scope.kind {
            ScopeKind::Tournament => self.fetch_by_tournament(&scope.id).await,
            ScopeKind::Stage => self.fetch_by_stage(&scope.id).await,
        }
    }

    /// Ask the server to rescore a stage. Local state is not touched; callers
    /// re-fetch once this returns.
    pub async fn recalculate(&self, stage_id: &str) -> ApiResult<()> {
        let url = format!("{}/leaderboard/stage/{stage_id}/recalculate", self.base_url);
        debug!("requesting recalculation for stage {stage_id}");
        self.send(self.client.post(&url), &url).await?;
        Ok(())
    }

    /// Download the stage's export artifact. The body is treated as opaque bytes.
    pub async fn export_stage(&self, stage_id: &str) -> ApiResult<ExportArtifact> {
        let url = format!("{}/leaderboard/stage/{stage_id}/export", self.base_url);
        let response = self.send(self.client.get(&url), &url).await?;

        let header = |name| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned)
        };
        let content_type = header(CONTENT_TYPE);
        let file_name = header(CONTENT_DISPOSITION).and_then(|v| disposition_file_name(&v));

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ApiError::Network(e, url.clone()))?;

        Ok(ExportArtifact { bytes: bytes.to_vec(), content_type, file_name })
    }

    async fn get_standings(&self, url: &str) -> ApiResult<Vec<LeaderboardEntry>> {
        let body = self
            .send(self.client.get(url), url)
            .await?
            .json::<Value>()
            .await
            .map_err(|e| ApiError::Parsing(e, url.to_owned()))?;

        match response_standings(&body) {
            Some(items) => Ok(decode_entries(items)),
            None => {
                warn!("unrecognized leaderboard envelope from {url}; treating as empty");
                Ok(Vec::new())
            }
        }
    }

    async fn send(&self, request: RequestBuilder, url: &str) -> ApiResult<Response> {
        let request = match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        };
        let response = request
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| ApiError::Network(e, url.to_owned()))?;

        match response.error_for_status() {
            Ok(res) => Ok(res),
            Err(e) if e.status() == Some(StatusCode::NOT_FOUND) => {
                Err(ApiError::NotFound(url.to_owned()))
            }
            Err(e) => Err(ApiError::Api(e, url.to_owned())),
        }
    }
}

/// `attachment; filename="stage-1.xlsx"` -> `stage-1.xlsx`
fn disposition_file_name(header: &str) -> Option<String> {
    header.split(';').find_map(|part| {
        let (key, value) = part.trim().split_once('=')?;
        if !key.trim().eq_ignore_ascii_case("filename") {
            return None;
        }
        let name = value.trim().trim_matches('"');
        // Keep only the final path component.
        let name = name.rsplit(['/', '\\']).next().unwrap_or(name);
        (!name.is_empty()).then(|| name.to_owned())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    fn api_for(server: &Server) -> LeaderboardApi {
        LeaderboardApi::new(server.url())
    }

    const ROW: &str = r#"{"teamId":"a","teamName":"Alpha","rank":1,"wins":3,"totalPoints":50,"totalKills":20}"#;

    #[tokio::test]
    async fn each_envelope_shape_is_normalized() {
        let bodies = [
            format!("[{ROW}]"),
            format!(r#"{{"data":{{"leaderboard":[{ROW}]}}}}"#),
            format!(r#"{{"leaderboard":[{ROW}]}}"#),
            format!(r#"{{"leaderboard":{{"leaderboard":[{ROW}]}}}}"#),
        ];
        for body in bodies {
            let mut server = Server::new_async().await;
            let mock = server
                .mock("GET", "/leaderboard/tournament/t1")
                .with_status(200)
                .with_header("content-type", "application/json")
                .with_body(&body)
                .create_async()
                .await;

            let rows = api_for(&server).fetch_by_tournament("t1").await.unwrap();
            mock.assert_async().await;
            assert_eq!(rows.len(), 1, "body: {body}");
            assert_eq!(rows[0].team_name, "Alpha");
            assert_eq!(rows[0].placement_points, 30);
        }
    }

    #[tokio::test]
    async fn unrecognized_envelope_yields_empty() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/leaderboard/stage/s1")
            .with_status(200)
            .with_body(r#"{"message":"no standings yet"}"#)
            .create_async()
            .await;

        let rows = api_for(&server).fetch_by_stage("s1").await.unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn scope_dispatches_to_stage_endpoint() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/leaderboard/stage/s7")
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;

        api_for(&server).fetch(&Scope::stage("s7")).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn server_errors_are_rejected() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/leaderboard/stage/s1")
            .with_status(500)
            .create_async()
            .await;

        let err = api_for(&server).fetch_by_stage("s1").await.unwrap_err();
        assert!(matches!(err, ApiError::Api(..)), "got {err}");
    }

    #[tokio::test]
    async fn missing_scope_is_not_found() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/leaderboard/tournament/nope")
            .with_status(404)
            .create_async()
            .await;

        let err = api_for(&server).fetch_by_tournament("nope").await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn recalculate_posts_without_body_and_sends_token() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/leaderboard/stage/s1/recalculate")
            .match_header("authorization", "Bearer sekrit")
            .match_body(Matcher::Exact(String::new()))
            .with_status(200)
            .with_body(r#"{"ok":true}"#)
            .create_async()
            .await;

        api_for(&server)
            .with_token(Some("sekrit".into()))
            .recalculate("s1")
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn export_returns_bytes_and_file_name() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/leaderboard/stage/s1/export")
            .with_status(200)
            .with_header("content-type", "application/pdf")
            .with_header("content-disposition", r#"attachment; filename="stage-s1.pdf""#)
            .with_body(b"%PDF-1.7 fake")
            .create_async()
            .await;

        let artifact = api_for(&server).export_stage("s1").await.unwrap();
        assert_eq!(artifact.bytes, b"%PDF-1.7 fake");
        assert_eq!(artifact.content_type.as_deref(), Some("application/pdf"));
        assert_eq!(artifact.file_name.as_deref(), Some("stage-s1.pdf"));
    }

    #[test]
    fn disposition_names_are_sanitized() {
        assert_eq!(
            disposition_file_name(r#"attachment; filename="../../etc/passwd""#).as_deref(),
            Some("passwd")
        );
        assert_eq!(disposition_file_name("inline"), None);
        assert_eq!(disposition_file_name("attachment; filename=board.xlsx").as_deref(), Some("board.xlsx"));
    }

    #[test]
    fn blank_tokens_are_ignored() {
        let api = LeaderboardApi::new("http://x/api/").with_token(Some("  ".into()));
        assert!(api.token.is_none());
        assert_eq!(api.base_url(), "http://x/api");
    }
}
