// SPDX-FileCopyrightText: 2026 Tandem Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Voice/text I/O collaborators: activation trigger, query input, reply output.

use async_trait::async_trait;

use crate::error::TandemError;

/// Wake-word or push-to-talk trigger consulted at the start of every turn.
#[async_trait]
pub trait ActivationSource: Send + Sync + 'static {
    /// Whether the assistant should process a turn now.
    async fn is_active(&self) -> Result<bool, TandemError>;
}

/// Speech-to-text engine or direct text input.
#[async_trait]
pub trait InputSource: Send + Sync + 'static {
    /// Returns the next utterance. An empty string means nothing usable was heard;
    /// [`TandemError::InputClosed`] means no more input will ever arrive.
    async fn query_text(&self) -> Result<String, TandemError>;
}

/// Text-to-speech engine or text display.
#[async_trait]
pub trait OutputSink: Send + Sync + 'static {
    /// Delivers the reply to the user. Best-effort.
    async fn deliver(&self, text: &str) -> Result<(), TandemError>;
}
