// SPDX-FileCopyrightText: 2026 Tandem Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! [`ModelRuntime`](tandem_core::ModelRuntime) implementations over HTTP.
//!
//! Both runtimes classify failures the same way: connection failures are
//! [`TandemError::Unavailable`], rate limits and server errors are
//! [`TandemError::Transient`], everything else is [`TandemError::Provider`].

pub mod anthropic;
pub mod ollama;

pub use anthropic::AnthropicRuntime;
pub use ollama::OllamaRuntime;

use std::time::Duration;

use tandem_core::{InferenceRequest, TandemError};

/// Returns true for HTTP status codes that indicate transient errors worth retrying.
pub(crate) fn is_transient_status(status: reqwest::StatusCode) -> bool {
    status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

pub(crate) fn map_reqwest_error(backend: &str, err: reqwest::Error) -> TandemError {
    if err.is_connect() {
        TandemError::Unavailable {
            backend: backend.to_string(),
            message: err.to_string(),
        }
    } else if err.is_timeout() {
        TandemError::Transient {
            message: format!("{backend} request timed out: {err}"),
            source: Some(Box::new(err)),
        }
    } else {
        TandemError::Transient {
            message: format!("{backend} request failed: {err}"),
            source: Some(Box::new(err)),
        }
    }
}

pub(crate) fn status_error(backend: &str, status: reqwest::StatusCode, detail: String) -> TandemError {
    let message = format!("{backend} returned {status}: {detail}");
    if is_transient_status(status) {
        TandemError::transient(message)
    } else {
        TandemError::provider(message)
    }
}

/// Time left for an HTTP call, or a timeout error if the deadline already passed.
pub(crate) fn remaining_budget(request: &InferenceRequest) -> Result<Duration, TandemError> {
    let remaining = request.remaining();
    if remaining.is_zero() {
        Err(TandemError::Timeout {
            duration: Duration::ZERO,
        })
    } else {
        Ok(remaining)
    }
}
