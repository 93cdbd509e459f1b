// SPDX-FileCopyrightText: 2026 Tandem Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Memory/context collaborator.

use async_trait::async_trait;

use crate::error::TandemError;
use crate::types::{ConversationContext, Query, SessionId};

/// Cross-turn memory store.
///
/// Implementations own their concurrency discipline; the core assumes
/// concurrent reads and serialized writes per session.
#[async_trait]
pub trait MemoryProvider: Send + Sync + 'static {
    /// Fetches context relevant to `query` for the given session.
    async fn retrieve_context(
        &self,
        session: &SessionId,
        query: &Query,
    ) -> Result<ConversationContext, TandemError>;

    /// Records a completed turn.
    async fn store_turn(
        &self,
        session: &SessionId,
        query: &Query,
        response: &str,
    ) -> Result<(), TandemError>;
}
