// SPDX-FileCopyrightText: 2026 Tandem Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock model runtime for deterministic testing.
//!
//! `MockRuntime` implements `ModelRuntime` with scripted replies, enabling
//! fast, CI-runnable tests without a local model server or cloud API.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tandem_core::{InferenceRequest, ModelRuntime, Source, TandemError};

/// What the runtime does on one call.
#[derive(Debug, Clone, PartialEq)]
pub enum MockReply {
    /// Reply immediately.
    Text(String),
    /// Reply after a delay, honouring cancellation.
    Delayed(Duration, String),
    /// Never reply; stop when cancelled.
    Hang,
    /// Never reply and ignore cancellation.
    Stuck,
    /// Fail with the given kind of error.
    Fail(MockFailure),
    /// Panic inside the call.
    Panic,
}

impl MockReply {
    pub fn text(text: impl Into<String>) -> Self {
        MockReply::Text(text.into())
    }

    pub fn delayed(delay: Duration, text: impl Into<String>) -> Self {
        MockReply::Delayed(delay, text.into())
    }
}

/// Error kinds a [`MockRuntime`] can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    Transient,
    Provider,
    Unavailable,
}

impl MockFailure {
    fn into_error(self, name: &str) -> TandemError {
        match self {
            MockFailure::Transient => TandemError::transient(format!("{name}: 503 service unavailable")),
            MockFailure::Provider => TandemError::provider(format!("{name}: model not found")),
            MockFailure::Unavailable => TandemError::Unavailable {
                backend: name.to_string(),
                message: "connection refused".to_string(),
            },
        }
    }
}

/// A mock runtime that plays back scripted replies.
///
/// Replies are popped from a FIFO script. When the script is empty, the
/// default reply is used.
pub struct MockRuntime {
    name: String,
    source: Source,
    script: Mutex<VecDeque<MockReply>>,
    default: MockReply,
    available: AtomicBool,
    calls: AtomicUsize,
    cancellations: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl MockRuntime {
    pub fn new(source: Source, default: MockReply) -> Self {
        Self {
            name: format!("mock-{source}"),
            source,
            script: Mutex::new(VecDeque::new()),
            default,
            available: AtomicBool::new(true),
            calls: AtomicUsize::new(0),
            cancellations: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// A local runtime answering "local answer".
    pub fn local() -> Self {
        Self::new(Source::Local, MockReply::text("local answer"))
    }

    /// An API runtime answering "api answer".
    pub fn api() -> Self {
        Self::new(Source::Api, MockReply::text("api answer"))
    }

    /// Replace the default reply.
    pub fn with_default(mut self, reply: MockReply) -> Self {
        self.default = reply;
        self
    }

    /// Queue a reply ahead of the default.
    pub fn then(self, reply: MockReply) -> Self {
        self.push(reply);
        self
    }

    /// Report unavailable from the availability probe.
    pub fn unavailable(self) -> Self {
        self.set_available(false);
        self
    }

    pub fn push(&self, reply: MockReply) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(reply);
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of `infer` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Number of calls that observed cancellation.
    pub fn cancellations(&self) -> usize {
        self.cancellations.load(Ordering::SeqCst)
    }

    /// Prompt text of every call, in order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }

    fn next_reply(&self) -> MockReply {
        self.script
            .lock()
            .ok()
            .and_then(|mut script| script.pop_front())
            .unwrap_or_else(|| self.default.clone())
    }

    fn observed_cancel(&self) -> TandemError {
        self.cancellations.fetch_add(1, Ordering::SeqCst);
        TandemError::Cancelled
    }
}

#[async_trait]
impl ModelRuntime for MockRuntime {
    fn name(&self) -> &str {
        &self.name
    }

    fn source(&self) -> Source {
        self.source
    }

    async fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    async fn infer(&self, request: InferenceRequest) -> Result<String, TandemError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(request.prompt_text());
        }

        match self.next_reply() {
            MockReply::Text(text) => Ok(text),
            MockReply::Delayed(delay, text) => {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => Ok(text),
                    _ = request.cancel.cancelled() => Err(self.observed_cancel()),
                }
            }
            MockReply::Hang => {
                request.cancel.cancelled().await;
                Err(self.observed_cancel())
            }
            MockReply::Stuck => std::future::pending().await,
            MockReply::Fail(kind) => Err(kind.into_error(&self.name)),
            MockReply::Panic => panic!("{} panicked", self.name),
        }
    }
}
