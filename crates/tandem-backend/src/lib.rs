// SPDX-FileCopyrightText: 2026 Tandem Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Backend controllers and model runtimes for the Tandem assistant.
//!
//! - [`LocalController`]: hard timeout, cooperative cancel then abort, queued access
//! - [`ApiController`]: longer timeout, streaming assembly, bounded retry
//! - [`Backends`]: the pair of controllers the orchestrator fans out to
//! - [`runtime`]: Ollama (local) and Anthropic (API) [`ModelRuntime`] implementations
//!
//! Controllers never return errors: every outcome is a [`BackendResult`].

pub mod api;
pub mod local;
pub mod retry;
pub mod runtime;

use std::sync::Arc;
use std::time::Duration;

pub use api::ApiController;
pub use local::LocalController;
pub use retry::RetryPolicy;

use tandem_config::TandemConfig;
use tandem_core::{
    BackendAvailability, BackendResult, InferenceRequest, ModelRuntime, Source, TandemError,
};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Turn a runtime outcome into a [`BackendResult`]. Blank text counts as an
/// error; a failure surfacing at or past the deadline counts as a timeout.
pub(crate) fn finish(
    source: Source,
    result: Result<String, TandemError>,
    started: Instant,
    deadline: Instant,
) -> BackendResult {
    let latency = started.elapsed();
    match result {
        Ok(text) if text.trim().is_empty() => {
            BackendResult::error(source, "empty response", latency)
        }
        Ok(text) => BackendResult::ok(source, text, latency),
        Err(err) if Instant::now() >= deadline => {
            debug!(source = %source, error = %err, "runtime failed at its deadline");
            BackendResult::timeout(source, latency)
        }
        Err(err) => BackendResult::error(source, err.to_string(), latency),
    }
}

/// The local and API controllers. Cheap to clone; either side may be absent.
#[derive(Clone, Default)]
pub struct Backends {
    local: Option<Arc<LocalController>>,
    api: Option<Arc<ApiController>>,
}

impl Backends {
    pub fn new(local: Option<LocalController>, api: Option<ApiController>) -> Self {
        Self {
            local: local.map(Arc::new),
            api: api.map(Arc::new),
        }
    }

    /// Wrap runtimes in controllers configured from `config`.
    pub fn from_runtimes(
        local: Option<Arc<dyn ModelRuntime>>,
        api: Option<Arc<dyn ModelRuntime>>,
        config: &TandemConfig,
    ) -> Self {
        Self::new(
            local.map(|rt| {
                LocalController::new(rt, config.local.max_concurrency, config.local.cancel_grace())
            }),
            api.map(|rt| ApiController::new(rt, RetryPolicy::from_config(&config.api))),
        )
    }

    /// Whether a controller exists for the track.
    pub fn has(&self, source: Source) -> bool {
        match source {
            Source::Local => self.local.is_some(),
            Source::Api => self.api.is_some(),
        }
    }

    /// Run one track. A missing controller yields an ERROR result.
    pub async fn run(&self, source: Source, request: InferenceRequest) -> BackendResult {
        match source {
            Source::Local => match &self.local {
                Some(controller) => controller.run(request).await,
                None => BackendResult::error(source, "local backend not configured", Duration::ZERO),
            },
            Source::Api => match &self.api {
                Some(controller) => controller.run(request).await,
                None => BackendResult::error(source, "API backend not configured", Duration::ZERO),
            },
        }
    }

    /// Probe both runtimes concurrently, each bounded by `timeout`.
    pub async fn probe(&self, timeout: Duration) -> BackendAvailability {
        let local = probe_one(self.local.as_ref().map(|c| c.runtime().clone()), timeout);
        let api = probe_one(self.api.as_ref().map(|c| c.runtime().clone()), timeout);
        let (local, api) = tokio::join!(local, api);
        info!(local, api, "backend availability probed");
        BackendAvailability { local, api }
    }
}

async fn probe_one(runtime: Option<Arc<dyn ModelRuntime>>, timeout: Duration) -> bool {
    let Some(runtime) = runtime else {
        return false;
    };
    match tokio::time::timeout(timeout, runtime.is_available()).await {
        Ok(available) => available,
        Err(_) => {
            warn!(runtime = runtime.name(), "availability probe timed out");
            false
        }
    }
}
