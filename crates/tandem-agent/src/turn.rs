// SPDX-FileCopyrightText: 2026 Tandem Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-turn state machine types.
//!
//! A turn moves through [`TurnStage`]s strictly in order:
//! Idle -> ActivationChecked -> InputAcquired -> ContextRetrieved -> Routed ->
//! Executing -> Integrated -> Dispatched -> ContextUpdated -> Idle.

use std::collections::HashMap;
use std::time::Duration;

use strum::Display;
use tandem_core::{
    BackendResult, ConversationContext, IntegratedResponse, Query, QueryFeatures,
    RoutingDecision, SessionId, Source,
};

/// States in the turn FSM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display)]
#[strum(serialize_all = "snake_case")]
pub enum TurnStage {
    /// Waiting for the next turn.
    Idle,
    ActivationChecked,
    InputAcquired,
    ContextRetrieved,
    Routed,
    /// One or both backends running.
    Executing,
    Integrated,
    Dispatched,
    /// Terminal per turn; the machine then returns to `Idle`.
    ContextUpdated,
}

/// Why a turn ended before producing a reply. Aborted turns have no side effects.
#[derive(Debug, Clone, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum AbortReason {
    /// The activation source reported no activation.
    Inactive,
    /// The activation source failed or timed out.
    ActivationFailed,
    /// Nothing usable was heard or typed.
    EmptyInput,
    /// The input source failed for this turn.
    InputFailed,
    /// The input source will never produce more input.
    InputClosed,
    /// The driver was cancelled before a query was acquired.
    Cancelled,
}

/// Mutable working state for one turn, owned by the orchestrator.
#[derive(Debug, Clone)]
pub struct TurnState {
    pub stage: TurnStage,
    pub query: Query,
    pub context: ConversationContext,
    pub features: Option<QueryFeatures>,
    pub decision: Option<RoutingDecision>,
    pub results: HashMap<Source, BackendResult>,
    pub response: Option<IntegratedResponse>,
    /// Memory retrieval failed; the turn ran with empty context.
    pub degraded_context: bool,
    /// The track run after the sole selected track errored.
    pub fallback_source: Option<Source>,
    /// Stage at which an error or panic was caught.
    pub failed_stage: Option<TurnStage>,
    pub dispatch_failed: bool,
    pub store_failed: bool,
}

impl TurnState {
    pub fn new(query: Query) -> Self {
        Self {
            stage: TurnStage::InputAcquired,
            query,
            context: ConversationContext::empty(),
            features: None,
            decision: None,
            results: HashMap::new(),
            response: None,
            degraded_context: false,
            fallback_source: None,
            failed_stage: None,
            dispatch_failed: false,
            store_failed: false,
        }
    }

    /// Move to the next stage. Stages only move forward within a turn.
    pub fn advance(&mut self, next: TurnStage) {
        debug_assert!(next > self.stage, "{} -> {}", self.stage, next);
        self.stage = next;
    }
}

/// Everything observable about a completed turn.
#[derive(Debug, Clone)]
pub struct TurnReport {
    pub session_id: SessionId,
    pub query: Query,
    pub features: Option<QueryFeatures>,
    pub decision: Option<RoutingDecision>,
    pub results: HashMap<Source, BackendResult>,
    /// The integrated response, absent when the apology was sent instead.
    pub response: Option<IntegratedResponse>,
    /// The text handed to the output sink.
    pub reply: String,
    pub degraded_context: bool,
    pub fallback_source: Option<Source>,
    pub failed_stage: Option<TurnStage>,
    pub dispatch_failed: bool,
    pub store_failed: bool,
    /// Final stage reached; always `ContextUpdated` for a completed turn.
    pub stage: TurnStage,
    pub elapsed: Duration,
}

impl TurnReport {
    pub(crate) fn from_state(
        session_id: SessionId,
        state: TurnState,
        reply: String,
        elapsed: Duration,
    ) -> Self {
        Self {
            session_id,
            query: state.query,
            features: state.features,
            decision: state.decision,
            results: state.results,
            response: state.response,
            reply,
            degraded_context: state.degraded_context,
            fallback_source: state.fallback_source,
            failed_stage: state.failed_stage,
            dispatch_failed: state.dispatch_failed,
            store_failed: state.store_failed,
            stage: state.stage,
            elapsed,
        }
    }

    /// Whether the fixed apology was sent instead of an integrated response.
    pub fn is_apology(&self) -> bool {
        self.response.is_none()
    }
}

/// Result of one pass through the state machine.
#[derive(Debug, Clone)]
pub enum TurnOutcome {
    Aborted(AbortReason),
    Completed(Box<TurnReport>),
}

impl TurnOutcome {
    pub fn report(&self) -> Option<&TurnReport> {
        match self {
            TurnOutcome::Completed(report) => Some(report),
            TurnOutcome::Aborted(_) => None,
        }
    }

    pub fn abort_reason(&self) -> Option<&AbortReason> {
        match self {
            TurnOutcome::Aborted(reason) => Some(reason),
            TurnOutcome::Completed(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_names_are_snake_case() {
        assert_eq!(TurnStage::ContextRetrieved.to_string(), "context_retrieved");
        assert_eq!(TurnStage::Idle.to_string(), "idle");
        assert_eq!(AbortReason::InputClosed.to_string(), "input_closed");
    }

    #[test]
    fn stages_are_ordered() {
        let order = [
            TurnStage::Idle,
            TurnStage::ActivationChecked,
            TurnStage::InputAcquired,
            TurnStage::ContextRetrieved,
            TurnStage::Routed,
            TurnStage::Executing,
            TurnStage::Integrated,
            TurnStage::Dispatched,
            TurnStage::ContextUpdated,
        ];
        assert!(order.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn new_state_starts_after_input() {
        let state = TurnState::new(Query::new("hi", 0));
        assert_eq!(state.stage, TurnStage::InputAcquired);
        assert!(state.results.is_empty());
        assert!(!state.degraded_context);
    }
}
