// SPDX-FileCopyrightText: 2026 Tandem Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Local backend controller.
//!
//! Runs the local model call on its own task under a hard deadline. On expiry
//! the call is signalled to stop, given a short grace period, then aborted.
//! Access to the shared model is serialized through a semaphore; time spent
//! queuing counts against the deadline.

use std::sync::Arc;
use std::time::Duration;

use tandem_core::{BackendResult, InferenceRequest, ModelRuntime, Source};
use tokio::sync::Semaphore;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, warn};

use crate::finish;

/// Wraps the local [`ModelRuntime`] with timeout, cancellation and queuing.
pub struct LocalController {
    runtime: Arc<dyn ModelRuntime>,
    permits: Arc<Semaphore>,
    grace: Duration,
}

impl LocalController {
    pub fn new(runtime: Arc<dyn ModelRuntime>, max_concurrency: usize, grace: Duration) -> Self {
        Self {
            runtime,
            permits: Arc::new(Semaphore::new(max_concurrency.max(1))),
            grace,
        }
    }

    pub fn runtime(&self) -> &Arc<dyn ModelRuntime> {
        &self.runtime
    }

    /// Run one local inference. Never takes longer than the request's
    /// deadline plus the cancellation grace period.
    pub async fn run(&self, request: InferenceRequest) -> BackendResult {
        let started = Instant::now();
        let deadline = request.deadline;
        let cancel = request.cancel.clone();

        let permit = tokio::select! {
            permit = self.permits.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => {
                    return BackendResult::error(Source::Local, "local controller closed", started.elapsed());
                }
            },
            _ = sleep_until(deadline) => {
                warn!(source = %Source::Local, "deadline reached while queued for the local model");
                return BackendResult::timeout(Source::Local, started.elapsed());
            }
            _ = cancel.cancelled() => {
                return BackendResult::error(Source::Local, "cancelled", started.elapsed());
            }
        };
        debug!(queued_ms = started.elapsed().as_millis() as u64, "local model permit acquired");

        let call_token = cancel.child_token();
        let runtime = Arc::clone(&self.runtime);
        let call = InferenceRequest {
            cancel: call_token.clone(),
            ..request
        };
        let mut handle = tokio::spawn(async move {
            let _permit = permit;
            runtime.infer(call).await
        });

        let joined = tokio::select! {
            joined = &mut handle => Some(joined),
            _ = sleep_until(deadline) => None,
            _ = cancel.cancelled() => None,
        };

        match joined {
            Some(Ok(result)) => finish(Source::Local, result, started, deadline),
            Some(Err(join_err)) => BackendResult::error(
                Source::Local,
                format!("local model task failed: {join_err}"),
                started.elapsed(),
            ),
            None => {
                call_token.cancel();
                if tokio::time::timeout(self.grace, &mut handle).await.is_err() {
                    warn!(grace_ms = self.grace.as_millis() as u64, "local model ignored cancellation, aborting");
                    handle.abort();
                }
                if cancel.is_cancelled() {
                    BackendResult::error(Source::Local, "cancelled", started.elapsed())
                } else {
                    BackendResult::timeout(Source::Local, started.elapsed())
                }
            }
        }
    }
}
