// SPDX-FileCopyrightText: 2026 Tandem Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Local runtime backed by an Ollama server.
//!
//! Uses `/api/generate` for completions (single JSON body, or NDJSON lines
//! when streaming) and `/api/tags` as the availability probe.

use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tandem_config::LocalConfig;
use tandem_core::{InferenceRequest, ModelRuntime, Source, TandemError, TextStream};
use tracing::{debug, warn};

use super::{map_reqwest_error, remaining_budget, status_error};

const BACKEND: &str = "ollama";
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: String,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateChunk {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Debug, Deserialize)]
struct TagEntry {
    name: String,
}

/// Ollama-backed local model.
#[derive(Debug, Clone)]
pub struct OllamaRuntime {
    client: reqwest::Client,
    endpoint: String,
    model: String,
}

impl OllamaRuntime {
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>) -> Result<Self, TandemError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| TandemError::Provider {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;
        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            model: model.into(),
        })
    }

    pub fn from_config(config: &LocalConfig) -> Result<Self, TandemError> {
        Self::new(config.endpoint.clone(), config.model.clone())
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn send_generate(
        &self,
        request: &InferenceRequest,
        stream: bool,
    ) -> Result<reqwest::Response, TandemError> {
        let body = GenerateRequest {
            model: &self.model,
            prompt: request.prompt_text(),
            stream,
        };
        let send = self
            .client
            .post(format!("{}/api/generate", self.endpoint))
            .timeout(remaining_budget(request)?)
            .json(&body)
            .send();

        let response = tokio::select! {
            response = send => response.map_err(|e| map_reqwest_error(BACKEND, e))?,
            _ = request.cancel.cancelled() => return Err(TandemError::Cancelled),
        };

        let status = response.status();
        debug!(status = %status, stream, "ollama response received");
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let detail = serde_json::from_str::<GenerateChunk>(&body)
            .ok()
            .and_then(|c| c.error)
            .unwrap_or(body);
        Err(status_error(BACKEND, status, detail))
    }
}

#[async_trait]
impl ModelRuntime for OllamaRuntime {
    fn name(&self) -> &str {
        BACKEND
    }

    fn source(&self) -> Source {
        Source::Local
    }

    async fn is_available(&self) -> bool {
        let response = self
            .client
            .get(format!("{}/api/tags", self.endpoint))
            .timeout(PROBE_TIMEOUT)
            .send()
            .await;
        let tags = match response {
            Ok(r) if r.status().is_success() => r.json::<TagsResponse>().await,
            Ok(r) => {
                warn!(status = %r.status(), "ollama probe failed");
                return false;
            }
            Err(e) => {
                warn!(error = %e, "ollama unreachable");
                return false;
            }
        };
        match tags {
            Ok(tags) => {
                let tagged = format!("{}:latest", self.model);
                let found = tags
                    .models
                    .iter()
                    .any(|m| m.name == self.model || m.name == tagged);
                if !found {
                    warn!(model = %self.model, "model is not pulled on the ollama server");
                }
                found
            }
            Err(e) => {
                warn!(error = %e, "unexpected ollama tags response");
                false
            }
        }
    }

    async fn infer(&self, request: InferenceRequest) -> Result<String, TandemError> {
        let response = self.send_generate(&request, false).await?;
        let body = tokio::select! {
            body = response.bytes() => body.map_err(|e| map_reqwest_error(BACKEND, e))?,
            _ = request.cancel.cancelled() => return Err(TandemError::Cancelled),
        };
        match parse_line(&body)? {
            Some((text, _)) => Ok(text),
            None => Err(TandemError::provider("ollama returned an empty body")),
        }
    }

    async fn stream(&self, request: InferenceRequest) -> Result<TextStream, TandemError> {
        let response = self.send_generate(&request, true).await?;
        Ok(ndjson_stream(response))
    }
}

/// Parse one NDJSON line into `(text, done)`. Blank lines yield `None`.
fn parse_line(line: &[u8]) -> Result<Option<(String, bool)>, TandemError> {
    let line = line.trim_ascii();
    if line.is_empty() {
        return Ok(None);
    }
    let chunk: GenerateChunk = serde_json::from_slice(line).map_err(|e| TandemError::Provider {
        message: format!("failed to parse ollama response: {e}"),
        source: Some(Box::new(e)),
    })?;
    if let Some(error) = chunk.error {
        return Err(TandemError::provider(format!("ollama error: {error}")));
    }
    Ok(Some((chunk.response, chunk.done)))
}

/// Split a streaming body into NDJSON lines and yield each line's text.
fn ndjson_stream(response: reqwest::Response) -> TextStream {
    let state = (response.bytes_stream().boxed(), BytesMut::new(), false);
    let stream = futures::stream::unfold(state, |(mut bytes, mut buf, finished)| async move {
        if finished {
            return None;
        }
        loop {
            if let Some(pos) = buf.iter().position(|b| *b == b'\n') {
                let line = buf.split_to(pos + 1);
                match parse_line(&line) {
                    Ok(None) => continue,
                    Ok(Some((text, done))) => return Some((Ok(text), (bytes, buf, done))),
                    Err(e) => return Some((Err(e), (bytes, buf, true))),
                }
            }
            match bytes.next().await {
                Some(Ok(chunk)) => buf.extend_from_slice(&chunk),
                Some(Err(e)) => return Some((Err(map_reqwest_error(BACKEND, e)), (bytes, buf, true))),
                None => {
                    let rest = buf.split();
                    return match parse_line(&rest) {
                        Ok(Some((text, _))) => Some((Ok(text), (bytes, buf, true))),
                        Ok(None) => None,
                        Err(e) => Some((Err(e), (bytes, buf, true))),
                    };
                }
            }
        }
    });
    Box::pin(stream)
}
