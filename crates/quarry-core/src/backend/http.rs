//! reqwest implementation of [`ResearchBackend`].

use std::time::Duration;

use anyhow::Result;
use futures_util::StreamExt;
use serde::Serialize;
use serde::de::DeserializeOwned;
use url::Url;

use super::shared::{
    BASE_URL_ENV, BackendError, BackendErrorKind, BackendResult, DEFAULT_BASE_URL, USER_AGENT,
    classify_reqwest_error, resolve_base_url, validate_url,
};
use super::sse::StreamChunkParser;
use super::types::{
    ContinueRequest, HistoryResponse, ResumeRequest, StartRequest, WorkflowResponse,
};
use super::{ChunkStream, ResearchBackend};
use crate::config::Config;

/// Connection settings for [`HttpBackend`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendConfig {
    pub base_url: String,
    /// Deadline for atomic calls and for opening the stream. `None` disables it.
    pub request_timeout: Option<Duration>,
}

impl BackendConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            request_timeout: None,
        }
    }

    /// Builds the connection settings from the loaded config.
    ///
    /// Base URL resolution order:
    /// 1. `url_override` (the `--backend-url` flag), if non-empty
    /// 2. `QUARRY_BACKEND_URL` env var (if set and non-empty)
    /// 3. `backend_url` from the config file
    /// 4. Default: `http://localhost:8000`
    ///
    /// # Errors
    /// Returns an error if the selected URL does not parse.
    pub fn from_config(config: &Config, url_override: Option<&str>) -> Result<Self> {
        let base_url = match url_override.map(str::trim).filter(|url| !url.is_empty()) {
            Some(url) => {
                validate_url(url)?;
                url.trim_end_matches('/').to_string()
            }
            None => resolve_base_url(config.backend_url.as_deref(), BASE_URL_ENV, DEFAULT_BASE_URL)?,
        };

        Ok(Self {
            base_url,
            request_timeout: config.request_timeout(),
        })
    }
}

/// HTTP client for the research service.
pub struct HttpBackend {
    config: BackendConfig,
    http: reqwest::Client,
}

impl HttpBackend {
    pub fn new(config: BackendConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    fn endpoint(&self, segments: &[&str]) -> BackendResult<Url> {
        let mut url = Url::parse(&self.config.base_url).map_err(|e| {
            BackendError::new(
                BackendErrorKind::Network,
                format!("Invalid backend URL {}: {e}", self.config.base_url),
            )
        })?;
        url.path_segments_mut()
            .map_err(|()| {
                BackendError::new(
                    BackendErrorKind::Network,
                    format!("Backend URL cannot have a path: {}", self.config.base_url),
                )
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn with_deadline<T>(
        &self,
        what: &str,
        call: impl Future<Output = BackendResult<T>>,
    ) -> BackendResult<T> {
        match self.config.request_timeout {
            Some(limit) => tokio::time::timeout(limit, call).await.map_err(|_elapsed| {
                BackendError::timeout(format!(
                    "{what} timed out after {}ms",
                    limit.as_millis()
                ))
            })?,
            None => call.await,
        }
    }

    async fn post_json<B>(&self, path: &str, body: &B) -> BackendResult<WorkflowResponse>
    where
        B: Serialize + Sync,
    {
        let url = self.endpoint(&[path])?;
        tracing::debug!(%url, "POST");

        self.with_deadline(path, async {
            let response = self
                .http
                .post(url)
                .header("accept", "application/json")
                .header("user-agent", USER_AGENT)
                .json(body)
                .send()
                .await
                .map_err(|e| classify_reqwest_error(&e))?;
            read_json(response).await
        })
        .await
    }

    async fn get_json<T>(&self, segments: &[&str]) -> BackendResult<T>
    where
        T: DeserializeOwned,
    {
        let url = self.endpoint(segments)?;
        tracing::debug!(%url, "GET");

        self.with_deadline(segments[0], async {
            let response = self
                .http
                .get(url)
                .header("accept", "application/json")
                .header("user-agent", USER_AGENT)
                .send()
                .await
                .map_err(|e| classify_reqwest_error(&e))?;
            read_json(response).await
        })
        .await
    }
}

async fn read_json<T>(response: reqwest::Response) -> BackendResult<T>
where
    T: DeserializeOwned,
{
    let status = response.status();
    if !status.is_success() {
        let error_body = response.text().await.unwrap_or_default();
        return Err(BackendError::http_status(status.as_u16(), &error_body));
    }

    let body = response
        .text()
        .await
        .map_err(|e| classify_reqwest_error(&e))?;
    serde_json::from_str(&body).map_err(|e| BackendError {
        kind: BackendErrorKind::Parse,
        message: format!("Invalid response body: {e}"),
        details: Some(body.clone()),
    })
}

#[async_trait::async_trait]
impl ResearchBackend for HttpBackend {
    async fn start(&self, message: &str) -> BackendResult<WorkflowResponse> {
        self.post_json("start", &StartRequest { message }).await
    }

    async fn resume(
        &self,
        thread_id: &str,
        choice: &str,
        user_input: &str,
    ) -> BackendResult<WorkflowResponse> {
        let request = ResumeRequest {
            thread_id,
            choice,
            user_input,
        };
        self.post_json("resume", &request).await
    }

    async fn follow_up(&self, thread_id: &str, message: &str) -> BackendResult<WorkflowResponse> {
        self.post_json("continue", &ContinueRequest { thread_id, message })
            .await
    }

    async fn stream(&self, thread_id: &str, choice: &str) -> BackendResult<ChunkStream> {
        let mut url = self.endpoint(&["stream"])?;
        url.query_pairs_mut()
            .append_pair("thread_id", thread_id)
            .append_pair("choice", choice);
        tracing::debug!(%url, "GET (stream)");

        let response = self
            .with_deadline("stream", async {
                let response = self
                    .http
                    .get(url)
                    .header("accept", "text/event-stream")
                    .header("user-agent", USER_AGENT)
                    .send()
                    .await
                    .map_err(|e| classify_reqwest_error(&e))?;

                let status = response.status();
                if !status.is_success() {
                    let error_body = response.text().await.unwrap_or_default();
                    return Err(BackendError::http_status(status.as_u16(), &error_body));
                }
                Ok(response)
            })
            .await?;

        let parser = StreamChunkParser::new(Box::pin(response.bytes_stream()));
        Ok(parser.boxed())
    }

    async fn get_state(&self, thread_id: &str) -> BackendResult<WorkflowResponse> {
        self.get_json(&["get_state", thread_id]).await
    }

    async fn conversation_history(&self, thread_id: &str) -> BackendResult<HistoryResponse> {
        self.get_json(&["conversation_history", thread_id]).await
    }
}

#[cfg(test)]
mod tests {
    use futures_util::StreamExt;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::backend::StreamChunk;

    fn can_bind_localhost() -> bool {
        std::net::TcpListener::bind("127.0.0.1:0").is_ok()
    }

    fn backend_for(server: &MockServer) -> HttpBackend {
        HttpBackend::new(BackendConfig::new(server.uri()))
    }

    #[tokio::test]
    async fn test_start_posts_message_and_parses_interrupt() {
        if !can_bind_localhost() {
            eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
            return;
        }
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/start"))
            .and(body_json(json!({"message": "Explain quantum computing"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "thread_id": "t-1",
                "state": {"current_step": "format_selection"},
                "requires_input": true,
                "interrupt_message": "## Research Complete - Choose Response Format"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let response = backend_for(&server)
            .start("Explain quantum computing")
            .await
            .unwrap();

        assert_eq!(response.thread_id.as_deref(), Some("t-1"));
        assert_eq!(response.requires_input, Some(true));
        assert_eq!(response.current_step(), Some("format_selection"));
    }

    #[tokio::test]
    async fn test_resume_sends_choice_and_user_input() {
        if !can_bind_localhost() {
            return;
        }
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/resume"))
            .and(body_json(json!({
                "thread_id": "t-1",
                "choice": "technical",
                "user_input": "focus on qubits"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "state": {"current_step": "analysis"},
                "requires_input": false,
                "current_step": "analysis"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let response = backend_for(&server)
            .resume("t-1", "technical", "focus on qubits")
            .await
            .unwrap();
        assert_eq!(response.requires_input, Some(false));
    }

    #[tokio::test]
    async fn test_follow_up_posts_to_continue() {
        if !can_bind_localhost() {
            return;
        }
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/continue"))
            .and(body_json(json!({"thread_id": "t-1", "message": "And error correction?"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "state": {"current_step": "planning"},
                "requires_input": true,
                "interrupt_message": "## Follow-up Question Analysis"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let response = backend_for(&server)
            .follow_up("t-1", "And error correction?")
            .await
            .unwrap();
        assert_eq!(
            response.interrupt_message(),
            Some("## Follow-up Question Analysis")
        );
    }

    #[tokio::test]
    async fn test_non_success_status_is_http_error() {
        if !can_bind_localhost() {
            return;
        }
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/resume"))
            .respond_with(
                ResponseTemplate::new(500)
                    .set_body_json(json!({"detail": "Error resuming research: boom"})),
            )
            .mount(&server)
            .await;

        let err = backend_for(&server)
            .resume("t-1", "proceed", "proceed")
            .await
            .unwrap_err();
        assert_eq!(err.kind, BackendErrorKind::HttpStatus);
        assert_eq!(err.message, "HTTP 500: Error resuming research: boom");
    }

    #[tokio::test]
    async fn test_invalid_json_body_is_parse_error() {
        if !can_bind_localhost() {
            return;
        }
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/start"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let err = backend_for(&server).start("hi").await.unwrap_err();
        assert_eq!(err.kind, BackendErrorKind::Parse);
        assert_eq!(err.details.as_deref(), Some("<html>oops</html>"));
    }

    #[tokio::test]
    async fn test_slow_response_times_out() {
        if !can_bind_localhost() {
            return;
        }
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/start"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"requires_input": false}))
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let backend = HttpBackend::new(BackendConfig {
            base_url: server.uri(),
            request_timeout: Some(Duration::from_millis(100)),
        });
        let err = backend.start("hi").await.unwrap_err();
        assert_eq!(err.kind, BackendErrorKind::Timeout);
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_stream_parses_event_stream_body() {
        if !can_bind_localhost() {
            return;
        }
        let server = MockServer::start().await;
        let body = concat!(
            "data: {\"type\": \"content\", \"content\": \"Quantum \", \"done\": false}\n\n",
            "data: {\"type\": \"content\", \"content\": \"computing is...\", \"done\": false}\n\n",
            "data: {\"type\": \"done\", \"content\": \"\", \"done\": true}\n\n",
        );
        Mock::given(method("GET"))
            .and(path("/stream"))
            .and(query_param("thread_id", "t-1"))
            .and(query_param("choice", "comprehensive"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(body),
            )
            .expect(1)
            .mount(&server)
            .await;

        let stream = backend_for(&server)
            .stream("t-1", "comprehensive")
            .await
            .unwrap();
        let chunks: Vec<StreamChunk> = stream.map(|chunk| chunk.unwrap()).collect().await;

        assert_eq!(chunks.len(), 3);
        assert!(matches!(&chunks[0], StreamChunk::Delta { text, .. } if text == "Quantum "));
        assert_eq!(chunks[2], StreamChunk::Done);
    }

    #[tokio::test]
    async fn test_stream_open_failure_is_reported_before_streaming() {
        if !can_bind_localhost() {
            return;
        }
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/stream"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let result = backend_for(&server).stream("t-1", "executive").await;
        let Err(err) = result else {
            panic!("expected stream open to fail");
        };
        assert_eq!(err.kind, BackendErrorKind::HttpStatus);
    }

    #[tokio::test]
    async fn test_get_state_and_history_use_thread_path() {
        if !can_bind_localhost() {
            return;
        }
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/get_state/t-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "state": {"current_step": "completed"},
                "next": [],
                "requires_input": [],
                "current_step": "completed"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/conversation_history/t-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "conversation_history": [{"type": "research", "query": "q"}],
                "thread_id": "t-1"
            })))
            .mount(&server)
            .await;

        let backend = backend_for(&server);
        let state = backend.get_state("t-1").await.unwrap();
        assert_eq!(state.current_step(), Some("completed"));
        assert_eq!(state.requires_input, Some(false));

        let history = backend.conversation_history("t-1").await.unwrap();
        assert_eq!(history.conversation_history.len(), 1);
    }

    #[test]
    fn test_endpoint_keeps_base_path_and_escapes_segments() {
        let backend = HttpBackend::new(BackendConfig::new("http://localhost:8000/api"));
        let url = backend.endpoint(&["get_state", "a b/c"]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:8000/api/get_state/a%20b%2Fc");
    }

    #[test]
    fn test_from_config_prefers_override() {
        let config = Config {
            backend_url: Some("http://from-config:1234".to_string()),
            request_timeout_secs: 0,
            ..Config::default()
        };
        let resolved =
            BackendConfig::from_config(&config, Some("http://override:9999/")).unwrap();
        assert_eq!(resolved.base_url, "http://override:9999");
        assert_eq!(resolved.request_timeout, None);
    }
}
