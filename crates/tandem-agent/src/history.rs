// SPDX-FileCopyrightText: 2026 Tandem Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bounded in-process conversation history.
//!
//! A minimal [`MemoryProvider`] for running without an external memory store:
//! the last `capacity` turns of each session become the context text.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use tandem_core::{ConversationContext, MemoryProvider, Query, SessionId, TandemError};

#[derive(Debug, Clone)]
struct StoredTurn {
    query_id: String,
    query: String,
    response: String,
}

#[derive(Debug, Default)]
struct SessionHistory {
    turns: VecDeque<StoredTurn>,
    /// Every turn ever stored, including those evicted from `turns`.
    total: usize,
}

/// Keeps the most recent turns of every session in memory.
#[derive(Debug)]
pub struct InMemoryHistory {
    capacity: usize,
    sessions: Mutex<HashMap<SessionId, SessionHistory>>,
}

impl InMemoryHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Number of turns stored for a session, including evicted ones.
    pub fn turn_count(&self, session: &SessionId) -> usize {
        self.sessions
            .lock()
            .map(|s| s.get(session).map_or(0, |h| h.total))
            .unwrap_or(0)
    }
}

fn poisoned<T>(_: T) -> TandemError {
    TandemError::Collaborator {
        collaborator: "memory",
        message: "history lock poisoned".to_string(),
    }
}

#[async_trait]
impl MemoryProvider for InMemoryHistory {
    async fn retrieve_context(
        &self,
        session: &SessionId,
        _query: &Query,
    ) -> Result<ConversationContext, TandemError> {
        let sessions = self.sessions.lock().map_err(poisoned)?;
        let Some(history) = sessions.get(session) else {
            return Ok(ConversationContext::empty());
        };

        let mut text = String::new();
        for turn in &history.turns {
            text.push_str("User: ");
            text.push_str(&turn.query);
            text.push_str("\nAssistant: ");
            text.push_str(&turn.response);
            text.push('\n');
        }

        Ok(ConversationContext {
            text,
            turn_refs: history.turns.iter().map(|t| t.query_id.clone()).collect(),
            prior_turns: history.total,
        })
    }

    async fn store_turn(
        &self,
        session: &SessionId,
        query: &Query,
        response: &str,
    ) -> Result<(), TandemError> {
        let mut sessions = self.sessions.lock().map_err(poisoned)?;
        let history = sessions.entry(session.clone()).or_default();
        history.turns.push_back(StoredTurn {
            query_id: query.id.clone(),
            query: query.prompt().to_string(),
            response: response.to_string(),
        });
        while history.turns.len() > self.capacity {
            history.turns.pop_front();
        }
        history.total += 1;
        Ok(())
    }
}
