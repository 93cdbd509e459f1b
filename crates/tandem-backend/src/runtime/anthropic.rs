// SPDX-FileCopyrightText: 2026 Tandem Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cloud runtime backed by the Anthropic Messages API.
//!
//! Handles request construction, authentication headers and SSE streaming.
//! Retry is the API controller's job; this runtime only classifies failures.

use std::time::Duration;

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use tandem_config::ApiConfig;
use tandem_core::{InferenceRequest, ModelRuntime, Source, TandemError, TextStream};
use tracing::{debug, warn};

use super::{map_reqwest_error, remaining_budget, status_error};

const BACKEND: &str = "anthropic";
const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Serialize)]
struct MessageRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(rename = "type")]
    type_: String,
    message: String,
}

#[derive(Debug, Deserialize)]
struct SseContentBlockDelta {
    delta: SseDelta,
}

#[derive(Debug, Deserialize)]
struct SseDelta {
    #[serde(rename = "type")]
    type_: String,
    #[serde(default)]
    text: String,
}

/// Anthropic-backed cloud model.
#[derive(Debug, Clone)]
pub struct AnthropicRuntime {
    client: reqwest::Client,
    base_url: String,
    model: String,
    max_tokens: u32,
    system_prompt: Option<String>,
}

impl AnthropicRuntime {
    /// Creates a runtime with authentication headers baked into the client.
    pub fn new(api_key: &str, api_version: &str, model: impl Into<String>) -> Result<Self, TandemError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(api_key)
                .map_err(|e| TandemError::Config(format!("invalid API key header value: {e}")))?,
        );
        headers.insert(
            "anthropic-version",
            HeaderValue::from_str(api_version).map_err(|e| {
                TandemError::Config(format!("invalid API version header value: {e}"))
            })?,
        );
        headers.insert("content-type", HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| TandemError::Provider {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;

        Ok(Self {
            client,
            base_url: "https://api.anthropic.com".to_string(),
            model: model.into(),
            max_tokens: 1024,
            system_prompt: None,
        })
    }

    /// Builds a runtime from `[api]` config.
    ///
    /// API key resolution: `api.api_key`, then `ANTHROPIC_API_KEY`, else a config error.
    pub fn from_config(config: &ApiConfig) -> Result<Self, TandemError> {
        let api_key = resolve_api_key(config.api_key.as_deref())?;
        Ok(Self::new(&api_key, &config.api_version, config.model.clone())?
            .with_base_url(&config.base_url)
            .with_max_tokens(config.max_tokens))
    }

    /// Overrides the base URL (self-hosted gateways, wiremock).
    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn send(&self, request: &InferenceRequest, stream: bool) -> Result<reqwest::Response, TandemError> {
        let body = MessageRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            messages: vec![ApiMessage {
                role: "user",
                content: request.prompt_text(),
            }],
            system: self.system_prompt.as_deref(),
            stream,
        };
        let send = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .timeout(remaining_budget(request)?)
            .json(&body)
            .send();

        let response = tokio::select! {
            response = send => response.map_err(|e| map_reqwest_error(BACKEND, e))?,
            _ = request.cancel.cancelled() => return Err(TandemError::Cancelled),
        };

        let status = response.status();
        debug!(status = %status, stream, "anthropic response received");
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let detail = match serde_json::from_str::<ApiErrorResponse>(&body) {
            Ok(api_err) => format!("{} ({})", api_err.error.message, api_err.error.type_),
            Err(_) => body,
        };
        Err(status_error(BACKEND, status, detail))
    }
}

#[async_trait]
impl ModelRuntime for AnthropicRuntime {
    fn name(&self) -> &str {
        BACKEND
    }

    fn source(&self) -> Source {
        Source::Api
    }

    async fn is_available(&self) -> bool {
        let response = self
            .client
            .get(format!("{}/v1/models", self.base_url))
            .timeout(PROBE_TIMEOUT)
            .send()
            .await;
        match response {
            Ok(r) if r.status().is_success() => true,
            Ok(r) => {
                warn!(status = %r.status(), "anthropic probe rejected");
                false
            }
            Err(e) => {
                warn!(error = %e, "anthropic unreachable");
                false
            }
        }
    }

    async fn infer(&self, request: InferenceRequest) -> Result<String, TandemError> {
        let response = self.send(&request, false).await?;
        let body = tokio::select! {
            body = response.text() => body.map_err(|e| map_reqwest_error(BACKEND, e))?,
            _ = request.cancel.cancelled() => return Err(TandemError::Cancelled),
        };
        let parsed: MessageResponse = serde_json::from_str(&body).map_err(|e| TandemError::Provider {
            message: format!("failed to parse API response: {e}"),
            source: Some(Box::new(e)),
        })?;
        Ok(parsed
            .content
            .into_iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text),
                ContentBlock::Other => None,
            })
            .collect())
    }

    async fn stream(&self, request: InferenceRequest) -> Result<TextStream, TandemError> {
        let response = self.send(&request, true).await?;
        let events = Box::pin(response.bytes_stream().eventsource());
        // Ends at `message_stop` or after the first error. EOF without
        // `message_stop` means the reply was cut off.
        let text = futures::stream::unfold(Some(events), |state| async move {
            let mut events = state?;
            loop {
                let event = match events.next().await {
                    Some(Ok(event)) => event,
                    Some(Err(e)) => {
                        return Some((Err(TandemError::transient(format!("SSE stream error: {e}"))), None));
                    }
                    None => {
                        return Some((Err(TandemError::transient("anthropic stream ended early")), None));
                    }
                };
                match event.event.as_str() {
                    "content_block_delta" => {
                        match serde_json::from_str::<SseContentBlockDelta>(&event.data) {
                            Ok(d) if d.delta.type_ == "text_delta" => {
                                return Some((Ok(d.delta.text), Some(events)));
                            }
                            Ok(_) => {}
                            Err(e) => {
                                let err = TandemError::Provider {
                                    message: format!("failed to parse content_block_delta: {e}"),
                                    source: Some(Box::new(e)),
                                };
                                return Some((Err(err), None));
                            }
                        }
                    }
                    "message_stop" => return None,
                    "error" => return Some((Err(stream_error(&event.data)), None)),
                    // message_start, ping and unknown events carry no text.
                    _ => {}
                }
            }
        });
        Ok(Box::pin(text))
    }
}

/// Classify an in-stream `error` event.
fn stream_error(data: &str) -> TandemError {
    match serde_json::from_str::<ApiErrorResponse>(data) {
        Ok(err) if matches!(err.error.type_.as_str(), "overloaded_error" | "rate_limit_error" | "api_error") => {
            TandemError::transient(format!("anthropic stream error ({}): {}", err.error.type_, err.error.message))
        }
        Ok(err) => TandemError::provider(format!(
            "anthropic stream error ({}): {}",
            err.error.type_, err.error.message
        )),
        Err(_) => TandemError::provider(format!("anthropic stream error: {data}")),
    }
}

fn resolve_api_key(config_key: Option<&str>) -> Result<String, TandemError> {
    if let Some(key) = config_key.filter(|k| !k.is_empty()) {
        return Ok(key.to_string());
    }
    match std::env::var("ANTHROPIC_API_KEY") {
        Ok(key) if !key.is_empty() => Ok(key),
        _ => Err(TandemError::Config(
            "no API key: set api.api_key or ANTHROPIC_API_KEY".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tandem_core::{ConversationContext, Query};
    use tokio_util::sync::CancellationToken;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn runtime(server: &MockServer) -> AnthropicRuntime {
        AnthropicRuntime::new("test-api-key", "2023-06-01", "claude-sonnet-4-20250514")
            .unwrap()
            .with_base_url(&server.uri())
    }

    fn request(text: &str) -> InferenceRequest {
        InferenceRequest {
            query: Query::new(text, 0),
            context: ConversationContext::empty(),
            instruction: None,
            deadline: tokio::time::Instant::now() + Duration::from_secs(10),
            cancel: CancellationToken::new(),
        }
    }

    #[tokio::test]
    async fn infer_sends_headers_and_joins_text_blocks() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "test-api-key"))
            .and(header("anthropic-version", "2023-06-01"))
            .and(body_partial_json(serde_json::json!({
                "model": "claude-sonnet-4-20250514",
                "stream": false,
                "messages": [{"role": "user", "content": "Write a haiku"}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "msg_1",
                "type": "message",
                "role": "assistant",
                "content": [
                    {"type": "text", "text": "Light on the water, "},
                    {"type": "thinking", "thinking": "..."},
                    {"type": "text", "text": "the keeper sleeps."}
                ],
                "stop_reason": "end_turn"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let text = runtime(&server).infer(request("Write a haiku")).await.unwrap();
        assert_eq!(text, "Light on the water, the keeper sleeps.");
    }

    #[tokio::test]
    async fn rate_limit_is_transient_and_not_retried_here() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(429).set_body_json(serde_json::json!({
                "error": {"type": "rate_limit_error", "message": "Rate limited"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let err = runtime(&server).infer(request("hi")).await.unwrap_err();
        assert!(err.is_transient());
        assert!(err.to_string().contains("rate_limit_error"), "got: {err}");
    }

    #[tokio::test]
    async fn bad_request_is_provider_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": {"type": "invalid_request_error", "message": "Bad model"}
            })))
            .mount(&server)
            .await;

        let err = runtime(&server).infer(request("hi")).await.unwrap_err();
        assert!(!err.is_transient());
        assert!(err.to_string().contains("invalid_request_error"), "got: {err}");
    }

    #[tokio::test]
    async fn stream_yields_text_deltas() {
        let server = MockServer::start().await;
        let sse = concat!(
            "event: message_start\n",
            "data: {\"type\":\"message_start\",\"message\":{\"id\":\"msg_1\"}}\n\n",
            "event: ping\n",
            "data: {\"type\":\"ping\"}\n\n",
            "event: content_block_delta\n",
            "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"Hello\"}}\n\n",
            "event: content_block_delta\n",
            "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\", world\"}}\n\n",
            "event: message_stop\n",
            "data: {\"type\":\"message_stop\"}\n\n",
        );
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(body_partial_json(serde_json::json!({"stream": true})))
            .respond_with(ResponseTemplate::new(200).set_body_raw(sse, "text/event-stream"))
            .mount(&server)
            .await;

        let stream = runtime(&server).stream(request("hi")).await.unwrap();
        let parts: Vec<String> = stream.map(|r| r.unwrap()).collect().await;
        assert_eq!(parts.concat(), "Hello, world");
    }

    #[tokio::test]
    async fn overloaded_stream_event_is_transient() {
        let server = MockServer::start().await;
        let sse = concat!(
            "event: error\n",
            "data: {\"type\":\"error\",\"error\":{\"type\":\"overloaded_error\",\"message\":\"Overloaded\"}}\n\n",
        );
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(sse, "text/event-stream"))
            .mount(&server)
            .await;

        let mut stream = runtime(&server).stream(request("hi")).await.unwrap();
        let first = stream.next().await.unwrap();
        assert!(first.unwrap_err().is_transient());
    }

    #[tokio::test]
    async fn stream_cut_off_before_message_stop_is_transient() {
        let server = MockServer::start().await;
        let sse = concat!(
            "event: message_start\n",
            "data: {\"type\":\"message_start\",\"message\":{\"id\":\"msg_1\"}}\n\n",
            "event: content_block_delta\n",
            "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"Once upon\"}}\n\n",
        );
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(sse, "text/event-stream"))
            .mount(&server)
            .await;

        let items: Vec<_> = runtime(&server).stream(request("hi")).await.unwrap().collect().await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_deref().unwrap(), "Once upon");
        let err = items[1].as_ref().unwrap_err();
        assert!(err.is_transient());
        assert!(err.to_string().contains("ended early"), "got: {err}");
    }

    #[tokio::test]
    async fn probe_uses_models_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/models"))
            .and(header("x-api-key", "test-api-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": []})))
            .mount(&server)
            .await;

        assert!(runtime(&server).is_available().await);
    }

    #[tokio::test]
    async fn probe_fails_on_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/models"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        assert!(!runtime(&server).is_available().await);
    }

    #[test]
    #[serial_test::serial]
    fn configured_key_wins() {
        // SAFETY: env mutation is serialized across tests by `serial`.
        unsafe { std::env::set_var("ANTHROPIC_API_KEY", "sk-env") };
        assert_eq!(resolve_api_key(Some("sk-config")).unwrap(), "sk-config");
        assert_eq!(resolve_api_key(Some("")).unwrap(), "sk-env");
        unsafe { std::env::remove_var("ANTHROPIC_API_KEY") };
    }

    #[test]
    #[serial_test::serial]
    fn missing_key_is_a_config_error() {
        // SAFETY: env mutation is serialized across tests by `serial`.
        unsafe { std::env::remove_var("ANTHROPIC_API_KEY") };
        let err = AnthropicRuntime::from_config(&ApiConfig::default()).unwrap_err();
        assert!(matches!(err, TandemError::Config(_)));
    }
}
