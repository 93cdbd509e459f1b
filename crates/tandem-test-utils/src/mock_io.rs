// SPDX-FileCopyrightText: 2026 Tandem Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock collaborators: activation, input, output and memory.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tandem_core::{
    ActivationSource, ConversationContext, InputSource, MemoryProvider, OutputSink, Query,
    SessionId, TandemError,
};
use tokio::sync::Mutex;

/// Activation source with a fixed answer, optionally failing.
pub struct MockActivation {
    active: AtomicBool,
    fail: AtomicBool,
    panic: AtomicBool,
}

impl MockActivation {
    pub fn always() -> Self {
        Self {
            active: AtomicBool::new(true),
            fail: AtomicBool::new(false),
            panic: AtomicBool::new(false),
        }
    }

    pub fn never() -> Self {
        Self {
            active: AtomicBool::new(false),
            fail: AtomicBool::new(false),
            panic: AtomicBool::new(false),
        }
    }

    pub fn failing() -> Self {
        Self {
            active: AtomicBool::new(true),
            fail: AtomicBool::new(true),
            panic: AtomicBool::new(false),
        }
    }

    /// Panics inside every `is_active` call.
    pub fn panicking() -> Self {
        let activation = Self::always();
        activation.panic.store(true, Ordering::SeqCst);
        activation
    }

    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::SeqCst);
    }
}

#[async_trait]
impl ActivationSource for MockActivation {
    async fn is_active(&self) -> Result<bool, TandemError> {
        if self.panic.load(Ordering::SeqCst) {
            panic!("wake-word detector crashed");
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(TandemError::Collaborator {
                collaborator: "activation",
                message: "microphone unavailable".to_string(),
            });
        }
        Ok(self.active.load(Ordering::SeqCst))
    }
}

enum Line {
    Text(String),
    Fail,
    Panic,
}

/// Input source that plays back queued utterances, then reports closed.
#[derive(Default)]
pub struct ScriptedInput {
    lines: Mutex<VecDeque<Line>>,
}

impl ScriptedInput {
    pub fn new<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: Mutex::new(lines.into_iter().map(|l| Line::Text(l.into())).collect()),
        }
    }

    pub async fn push(&self, line: impl Into<String>) {
        self.lines.lock().await.push_back(Line::Text(line.into()));
    }

    /// The next call fails with a collaborator error.
    pub async fn push_failure(&self) {
        self.lines.lock().await.push_back(Line::Fail);
    }

    /// The next call panics.
    pub async fn push_panic(&self) {
        self.lines.lock().await.push_back(Line::Panic);
    }

    pub async fn remaining(&self) -> usize {
        self.lines.lock().await.len()
    }
}

#[async_trait]
impl InputSource for ScriptedInput {
    async fn query_text(&self) -> Result<String, TandemError> {
        let next = self.lines.lock().await.pop_front();
        match next {
            Some(Line::Text(line)) => Ok(line),
            Some(Line::Fail) => Err(TandemError::Collaborator {
                collaborator: "stt",
                message: "transcription failed".to_string(),
            }),
            Some(Line::Panic) => panic!("speech recognizer crashed"),
            None => Err(TandemError::InputClosed),
        }
    }
}

/// Output sink that records every delivered reply.
#[derive(Default)]
pub struct RecordingSink {
    delivered: Mutex<Vec<String>>,
    fail: AtomicBool,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            delivered: Mutex::new(Vec::new()),
            fail: AtomicBool::new(true),
        }
    }

    pub async fn delivered(&self) -> Vec<String> {
        self.delivered.lock().await.clone()
    }

    pub async fn last(&self) -> Option<String> {
        self.delivered.lock().await.last().cloned()
    }
}

#[async_trait]
impl OutputSink for RecordingSink {
    async fn deliver(&self, text: &str) -> Result<(), TandemError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(TandemError::Collaborator {
                collaborator: "tts",
                message: "speaker disconnected".to_string(),
            });
        }
        self.delivered.lock().await.push(text.to_string());
        Ok(())
    }
}

/// A stored `(session, query text, reply)` triple.
pub type StoredTurn = (SessionId, String, String);

/// Memory provider with switchable failures and a seeded turn count.
#[derive(Default)]
pub struct MockMemory {
    seeded_turns: usize,
    stored: Mutex<Vec<StoredTurn>>,
    fail_retrieve: AtomicBool,
    fail_store: AtomicBool,
    panic_on_retrieve: AtomicBool,
}

impl MockMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pretend the conversation already has `turns` prior turns.
    pub fn with_prior_turns(mut self, turns: usize) -> Self {
        self.seeded_turns = turns;
        self
    }

    pub fn fail_retrieve(self) -> Self {
        self.fail_retrieve.store(true, Ordering::SeqCst);
        self
    }

    pub fn fail_store(self) -> Self {
        self.fail_store.store(true, Ordering::SeqCst);
        self
    }

    pub fn panic_on_retrieve(self) -> Self {
        self.panic_on_retrieve.store(true, Ordering::SeqCst);
        self
    }

    pub async fn stored(&self) -> Vec<StoredTurn> {
        self.stored.lock().await.clone()
    }
}

#[async_trait]
impl MemoryProvider for MockMemory {
    async fn retrieve_context(
        &self,
        session: &SessionId,
        _query: &Query,
    ) -> Result<ConversationContext, TandemError> {
        if self.panic_on_retrieve.load(Ordering::SeqCst) {
            panic!("memory index corrupted");
        }
        if self.fail_retrieve.load(Ordering::SeqCst) {
            return Err(TandemError::Collaborator {
                collaborator: "memory",
                message: "vector store offline".to_string(),
            });
        }

        let stored = self.stored.lock().await;
        let own: Vec<&StoredTurn> = stored.iter().filter(|(s, _, _)| s == session).collect();
        let text = own
            .iter()
            .map(|(_, q, r)| format!("User: {q}\nAssistant: {r}\n"))
            .collect::<String>();
        Ok(ConversationContext {
            text,
            turn_refs: Vec::new(),
            prior_turns: self.seeded_turns + own.len(),
        })
    }

    async fn store_turn(
        &self,
        session: &SessionId,
        query: &Query,
        response: &str,
    ) -> Result<(), TandemError> {
        if self.fail_store.load(Ordering::SeqCst) {
            return Err(TandemError::Collaborator {
                collaborator: "memory",
                message: "write rejected".to_string(),
            });
        }
        self.stored
            .lock()
            .await
            .push((session.clone(), query.text.clone(), response.to_string()));
        Ok(())
    }
}
