// SPDX-FileCopyrightText: 2026 Tandem Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Tandem assistant core.

use thiserror::Error;

/// The primary error type used across collaborator traits and core operations.
///
/// Backend failures never escape a turn as this type: controllers fold them
/// into a [`BackendResult`](crate::types::BackendResult) status. The variants
/// exist so runtimes and collaborators can report *what kind* of failure
/// happened, which drives retry and fallback decisions.
#[derive(Debug, Error)]
pub enum TandemError {
    /// Configuration errors (invalid values, missing credentials).
    #[error("configuration error: {0}")]
    Config(String),

    /// The backend could not be reached at call time. Never retried.
    #[error("{backend} unavailable: {message}")]
    Unavailable { backend: String, message: String },

    /// Non-retryable provider error (bad request, model not found, malformed response).
    #[error("provider error: {message}")]
    Provider {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Retryable provider error (rate limit, 5xx, dropped connection).
    #[error("transient provider error: {message}")]
    Transient {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Operation was cancelled through its cancellation token.
    #[error("operation cancelled")]
    Cancelled,

    /// An external collaborator (memory, STT, TTS, activation) failed.
    #[error("{collaborator} failed: {message}")]
    Collaborator {
        collaborator: &'static str,
        message: String,
    },

    /// The input source has no more input (end of stream, device closed).
    #[error("input source closed")]
    InputClosed,

    /// No backend produced a usable result for the turn.
    #[error("integration failed: {0}")]
    Integration(String),

    /// The requested session is not registered with the driver.
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl TandemError {
    /// Whether a retry of the same request could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, TandemError::Transient { .. } | TandemError::Timeout { .. })
    }

    /// Shorthand for a [`TandemError::Provider`] without a source error.
    pub fn provider(message: impl Into<String>) -> Self {
        TandemError::Provider {
            message: message.into(),
            source: None,
        }
    }

    /// Shorthand for a [`TandemError::Transient`] without a source error.
    pub fn transient(message: impl Into<String>) -> Self {
        TandemError::Transient {
            message: message.into(),
            source: None,
        }
    }
}
