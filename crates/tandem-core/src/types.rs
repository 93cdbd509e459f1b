// SPDX-FileCopyrightText: 2026 Tandem Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Data model shared by the analyzer, policy, controllers, integrator and orchestrator.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tokio_util::sync::CancellationToken;

/// Unique identifier for a conversation session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    /// Generates a fresh random session id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// The two substitutable backends. Each track of a turn runs on one source.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumString, Serialize,
    Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Source {
    /// Fast, locally hosted model.
    Local,
    /// Slower, higher-quality cloud model API.
    Api,
}

impl Source {
    /// The opposite track.
    pub fn other(self) -> Source {
        match self {
            Source::Local => Source::Api,
            Source::Api => Source::Local,
        }
    }
}

/// Explicit user instruction about speed versus thoroughness.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ModeHint {
    #[default]
    None,
    Fast,
    Quality,
}

impl ModeHint {
    /// Parse a per-message override prefix (`/fast ` or `/quality `).
    ///
    /// Returns the hint and the message with the prefix stripped, or
    /// `(None, original)` when no override is present.
    pub fn parse_prefix(text: &str) -> (Option<ModeHint>, &str) {
        let trimmed = text.trim_start();
        if let Some(rest) = trimmed.strip_prefix("/fast ") {
            (Some(ModeHint::Fast), rest)
        } else if let Some(rest) = trimmed.strip_prefix("/quality ") {
            (Some(ModeHint::Quality), rest)
        } else {
            (None, text)
        }
    }
}

/// One user utterance. Created at turn start and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub id: String,
    /// Raw text as acquired from the input collaborator.
    pub text: String,
    /// Zero-based index of this turn within its session.
    pub turn_index: u32,
    pub arrived_at: DateTime<Utc>,
}

impl Query {
    /// Creates a query stamped with a fresh id and the current time.
    pub fn new(text: impl Into<String>, turn_index: u32) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            text: text.into(),
            turn_index,
            arrived_at: Utc::now(),
        }
    }

    /// The text to send to a backend, with any mode override prefix removed.
    pub fn prompt(&self) -> &str {
        ModeHint::parse_prefix(&self.text).1
    }
}

/// Cross-turn memory snapshot, borrowed read-only from the memory collaborator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationContext {
    /// Retrieved context text, ready to be prepended to a prompt.
    pub text: String,
    /// Opaque references to the prior turns the text was built from.
    pub turn_refs: Vec<String>,
    /// Number of prior turns in the conversation.
    pub prior_turns: usize,
}

impl ConversationContext {
    /// The degraded context used when retrieval fails.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty() && self.prior_turns == 0
    }
}

/// Routing signals derived from a query. All scores are in `[0, 1]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryFeatures {
    pub complexity: f32,
    pub context_dependency: f32,
    pub time_sensitivity: f32,
    pub mode_hint: ModeHint,
    /// At least one reasoning/analysis keyword was found.
    pub reasoning: bool,
    /// A creative-writing request marker was found.
    pub creative: bool,
    /// The query enumerates several requests.
    pub multi_part: bool,
    pub word_count: usize,
    pub prior_turns: usize,
}

/// Execution path chosen for a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RoutePath {
    Local,
    Api,
    /// Both tracks run concurrently and are merged.
    Parallel,
}

impl RoutePath {
    /// The tracks this path launches.
    pub fn sources(self) -> &'static [Source] {
        match self {
            RoutePath::Local => &[Source::Local],
            RoutePath::Api => &[Source::Api],
            RoutePath::Parallel => &[Source::Local, Source::Api],
        }
    }

    /// The single-track path for a source.
    pub fn for_source(source: Source) -> RoutePath {
        match source {
            Source::Local => RoutePath::Local,
            Source::Api => RoutePath::Api,
        }
    }
}

/// Identifier of the policy rule that produced a decision.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum RuleId {
    ForceLocal,
    ForceApi,
    HighComplexity,
    ContextFollowUp,
    TimeSensitive,
    AmbiguousHedge,
    DefaultLocal,
}

/// Chosen execution path plus the budgets each selected track gets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub path: RoutePath,
    pub confidence: f32,
    pub rule: RuleId,
    pub local_timeout: Duration,
    pub api_timeout: Duration,
}

impl RoutingDecision {
    /// Timeout budget for one track.
    pub fn timeout_for(&self, source: Source) -> Duration {
        match source {
            Source::Local => self.local_timeout,
            Source::Api => self.api_timeout,
        }
    }

    /// Whether the decision launches the given track.
    pub fn selects(&self, source: Source) -> bool {
        self.path.sources().contains(&source)
    }

    /// Global fan-in deadline: the larger of the selected tracks' budgets.
    pub fn join_deadline(&self) -> Duration {
        self.path
            .sources()
            .iter()
            .map(|s| self.timeout_for(*s))
            .max()
            .unwrap_or_default()
    }
}

/// Outcome of one backend call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum BackendStatus {
    Ok,
    Timeout,
    Error,
}

/// Output of one backend controller call. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendResult {
    pub source: Source,
    pub text: String,
    /// Wall-clock time including any queuing delay.
    pub latency: Duration,
    pub status: BackendStatus,
    pub error: Option<String>,
}

impl BackendResult {
    pub fn ok(source: Source, text: impl Into<String>, latency: Duration) -> Self {
        Self {
            source,
            text: text.into(),
            latency,
            status: BackendStatus::Ok,
            error: None,
        }
    }

    pub fn timeout(source: Source, latency: Duration) -> Self {
        Self {
            source,
            text: String::new(),
            latency,
            status: BackendStatus::Timeout,
            error: Some(format!("deadline exceeded after {}ms", latency.as_millis())),
        }
    }

    pub fn error(source: Source, detail: impl Into<String>, latency: Duration) -> Self {
        Self {
            source,
            text: String::new(),
            latency,
            status: BackendStatus::Error,
            error: Some(detail.into()),
        }
    }

    /// A successful result with non-blank text.
    pub fn is_usable(&self) -> bool {
        self.status == BackendStatus::Ok && !self.text.trim().is_empty()
    }
}

/// How the final reply was assembled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    Single,
    Synthesized,
    TransitionMerged,
}

/// Final reply for a turn, with source attribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegratedResponse {
    pub text: String,
    pub strategy: MergeStrategy,
    pub sources: Vec<Source>,
    /// Similarity between the two track outputs, when both were compared.
    pub similarity: Option<f32>,
}

/// Which tracks are usable right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendAvailability {
    pub local: bool,
    pub api: bool,
}

impl BackendAvailability {
    pub const ALL: BackendAvailability = BackendAvailability {
        local: true,
        api: true,
    };

    pub fn is_available(&self, source: Source) -> bool {
        match source {
            Source::Local => self.local,
            Source::Api => self.api,
        }
    }
}

impl Default for BackendAvailability {
    fn default() -> Self {
        Self::ALL
    }
}

/// A request handed to a [`ModelRuntime`](crate::traits::ModelRuntime).
#[derive(Debug, Clone)]
pub struct InferenceRequest {
    pub query: Query,
    pub context: ConversationContext,
    /// Instruction overriding the default prompt framing (used for synthesis).
    pub instruction: Option<String>,
    /// Absolute deadline for the call.
    pub deadline: tokio::time::Instant,
    /// Cooperative cancellation signal; long-running runtimes should observe it.
    pub cancel: CancellationToken,
}

impl InferenceRequest {
    /// Flattened prompt text: context, then the user's query.
    pub fn prompt_text(&self) -> String {
        let mut prompt = String::new();
        if let Some(ref instruction) = self.instruction {
            prompt.push_str(instruction);
            prompt.push_str("\n\n");
        }
        if !self.context.text.trim().is_empty() {
            prompt.push_str("Conversation so far:\n");
            prompt.push_str(self.context.text.trim());
            prompt.push_str("\n\n");
        }
        prompt.push_str(self.query.prompt());
        prompt
    }

    /// Time left until the deadline.
    pub fn remaining(&self) -> Duration {
        self.deadline
            .saturating_duration_since(tokio::time::Instant::now())
    }
}
