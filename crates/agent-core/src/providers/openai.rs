//! `OpenAI`-compatible executor.
//!
//! Runs each task as one non-streaming Chat Completions request. The default
//! endpoint is `OpenRouter`, which routes every catalog model.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};

use crate::error::{ExecutionError, RemoteErrorKind, Result};
use crate::provider::{
    EMPTY_RESULT, ExecuteRequest, ExecuteResponse, SYSTEM_PROMPT, TaskExecutor,
};

/// Default endpoint.
pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// Sampling parameters applied to every request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingParams {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 1000,
        }
    }
}

/// Executor for the `OpenAI` API and compatible endpoints.
#[derive(Debug, Clone)]
pub struct OpenAiExecutor {
    http: reqwest::Client,
    base_url: String,
    params: SamplingParams,
}

impl OpenAiExecutor {
    /// Create an executor for the default endpoint.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built.
    pub fn new() -> Result<Self> {
        Self::with_config(None, SamplingParams::default(), None)
    }

    /// Create an executor with a custom endpoint, sampling parameters and
    /// client timeout.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built.
    pub fn with_config(
        base_url: Option<String>,
        params: SamplingParams,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder
            .build()
            .map_err(|e| ExecutionError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            params,
        })
    }

    fn headers(request: &ExecuteRequest) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let bearer = HeaderValue::from_str(&format!("Bearer {}", request.credential.expose()))
            .map_err(|_| {
                ExecutionError::remote(
                    RemoteErrorKind::Unauthorized,
                    "API key contains invalid characters",
                )
            })?;
        headers.insert(AUTHORIZATION, bearer);
        Ok(headers)
    }
}

// Chat Completions request types

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'static str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

// Chat Completions response types

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

/// Extract a readable message from an error body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<ErrorEnvelope>(body).map_or_else(
        |_| {
            let trimmed = body.trim();
            if trimmed.is_empty() {
                "Unknown error occurred".to_string()
            } else {
                trimmed.to_string()
            }
        },
        |envelope| envelope.error.message,
    )
}

#[async_trait]
impl TaskExecutor for OpenAiExecutor {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn execute(&self, request: ExecuteRequest) -> Result<ExecuteResponse> {
        let prompt = request.prompt();
        let body = ChatRequest {
            model: request.model.upstream_id(),
            messages: [
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt,
                },
            ],
            temperature: self.params.temperature,
            max_tokens: self.params.max_tokens,
        };

        let url = format!("{}/chat/completions", self.base_url);
        tracing::debug!(url = %url, model = %request.model, task = %request.task_title, "executing task");

        let response = self
            .http
            .post(&url)
            .headers(Self::headers(&request)?)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(ExecutionError::remote(
                RemoteErrorKind::from_status(status.as_u16()),
                error_message(&text),
            ));
        }

        let parsed: ChatResponse = serde_json::from_str(&text)
            .map_err(|e| ExecutionError::remote(RemoteErrorKind::MalformedResponse, e.to_string()))?;

        if parsed.choices.is_empty() {
            if let Some(error) = parsed.error {
                return Err(ExecutionError::remote(RemoteErrorKind::Upstream, error.message));
            }
        }

        let result_text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| EMPTY_RESULT.to_string());

        Ok(ExecuteResponse { result_text })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::Credential;
    use crate::types::ModelId;
    use mockito::{Matcher, Server};

    fn request() -> ExecuteRequest {
        ExecuteRequest {
            goal: "Write a blog post".to_string(),
            task_title: "Create outline/structure".to_string(),
            prior_context: String::new(),
            model: ModelId::Claude3Haiku,
            credential: Credential::new("test-key").unwrap(),
        }
    }

    fn executor(url: String) -> OpenAiExecutor {
        OpenAiExecutor::with_config(Some(url), SamplingParams::default(), None).unwrap()
    }

    #[tokio::test]
    async fn returns_completion_text() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer test-key")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "model": "anthropic/claude-3-haiku",
                "max_tokens": 1000
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"choices":[{"message":{"role":"assistant","content":"1. Intro"}}]}"#)
            .create_async()
            .await;

        let response = executor(server.url()).execute(request()).await.unwrap();
        assert_eq!(response.result_text, "1. Intro");
    }

    #[tokio::test]
    async fn empty_completion_is_success() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body(r#"{"choices":[{"message":{"content":""}}]}"#)
            .create_async()
            .await;

        let response = executor(server.url()).execute(request()).await.unwrap();
        assert_eq!(response.result_text, EMPTY_RESULT);
    }

    #[tokio::test]
    async fn http_error_is_remote_failure() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("POST", "/chat/completions")
            .with_status(401)
            .with_body(r#"{"error":{"message":"No auth credentials found"}}"#)
            .create_async()
            .await;

        let err = executor(server.url()).execute(request()).await.unwrap_err();
        match err {
            ExecutionError::Remote { kind, message } => {
                assert_eq!(kind, RemoteErrorKind::Unauthorized);
                assert_eq!(message, "No auth credentials found");
            }
            other => panic!("expected remote failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn garbage_body_is_malformed() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body("<html>oops</html>")
            .create_async()
            .await;

        let err = executor(server.url()).execute(request()).await.unwrap_err();
        assert!(matches!(
            err,
            ExecutionError::Remote {
                kind: RemoteErrorKind::MalformedResponse,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_transport_failure() {
        let err = executor("http://127.0.0.1:9".to_string())
            .execute(request())
            .await
            .unwrap_err();
        assert!(err.is_transport());
    }

    #[test]
    fn error_message_falls_back_to_body() {
        assert_eq!(error_message("bad gateway"), "bad gateway");
        assert_eq!(error_message("  "), "Unknown error occurred");
    }
}
