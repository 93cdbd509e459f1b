// SPDX-FileCopyrightText: 2026 Tandem Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! API backend controller.
//!
//! Calls the cloud runtime through its streaming interface, assembling the
//! fragments into one reply. Transient failures are retried with exponential
//! backoff as long as the retry still fits inside the deadline.

use std::sync::Arc;

use futures::StreamExt;
use tandem_core::{BackendResult, InferenceRequest, ModelRuntime, Source, TandemError};
use tokio::time::{Instant, sleep, sleep_until};
use tracing::{debug, warn};

use crate::finish;
use crate::retry::RetryPolicy;

/// Wraps the API [`ModelRuntime`] with timeout, cancellation and retry.
pub struct ApiController {
    runtime: Arc<dyn ModelRuntime>,
    retry: RetryPolicy,
}

impl ApiController {
    pub fn new(runtime: Arc<dyn ModelRuntime>, retry: RetryPolicy) -> Self {
        Self { runtime, retry }
    }

    pub fn runtime(&self) -> &Arc<dyn ModelRuntime> {
        &self.runtime
    }

    /// Run one API inference, retrying transient failures within the deadline.
    pub async fn run(&self, request: InferenceRequest) -> BackendResult {
        let started = Instant::now();
        let deadline = request.deadline;
        let cancel = request.cancel.clone();
        let call_token = cancel.child_token();
        let call = InferenceRequest {
            cancel: call_token.clone(),
            ..request
        };

        tokio::select! {
            result = self.call_with_retry(call) => finish(Source::Api, result, started, deadline),
            _ = sleep_until(deadline) => {
                call_token.cancel();
                BackendResult::timeout(Source::Api, started.elapsed())
            }
            _ = cancel.cancelled() => BackendResult::error(Source::Api, "cancelled", started.elapsed()),
        }
    }

    async fn call_with_retry(&self, request: InferenceRequest) -> Result<String, TandemError> {
        let mut attempt = 0;
        loop {
            match self.call_once(request.clone()).await {
                Ok(text) => return Ok(text),
                Err(err) if err.is_transient() && attempt < self.retry.max_retries => {
                    let backoff = self.retry.backoff(attempt);
                    if Instant::now() + backoff >= request.deadline {
                        warn!(attempt, error = %err, "no time left for another API attempt");
                        return Err(err);
                    }
                    warn!(
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %err,
                        "transient API error, will retry"
                    );
                    sleep(backoff).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn call_once(&self, request: InferenceRequest) -> Result<String, TandemError> {
        let mut stream = self.runtime.stream(request).await?;
        let mut text = String::new();
        while let Some(fragment) = stream.next().await {
            text.push_str(&fragment?);
        }
        debug!(chars = text.len(), runtime = self.runtime.name(), "API stream complete");
        Ok(text)
    }
}
