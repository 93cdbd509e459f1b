// SPDX-FileCopyrightText: 2026 Tandem Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-session turn orchestrator.
//!
//! Drives one turn through the [`TurnStage`] state machine: activation check,
//! input, context retrieval, routing, backend execution, integration, output
//! dispatch and context update. The orchestrator integrates:
//! - **Router**: analyzer and rule-table policy choosing LOCAL, API or PARALLEL
//! - **Backends**: fan-out/fan-in over the local and API controllers
//! - **Integrator**: one reply from one or two backend results
//!
//! Every collaborator call and the pipeline between context retrieval and
//! integration run under `catch_unwind`. A panic before input is acquired
//! aborts the turn; after that it becomes the fixed fallback reply and the
//! turn still reaches `ContextUpdated`.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tandem_backend::Backends;
use tandem_config::{OrchestratorConfig, TandemConfig};
use tandem_core::{
    ActivationSource, BackendAvailability, BackendResult, BackendStatus, ConversationContext,
    InferenceRequest, InputSource, IntegratedResponse, MemoryProvider, ModeHint, OutputSink, Query,
    RoutePath, RoutingDecision, SessionId, Source, TandemError,
};
use tandem_integrator::{Integration, ResponseIntegrator};
use tandem_router::Router;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::turn::{AbortReason, TurnOutcome, TurnReport, TurnStage, TurnState};

/// The external collaborators one session talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub activation: Arc<dyn ActivationSource>,
    pub input: Arc<dyn InputSource>,
    pub output: Arc<dyn OutputSink>,
    pub memory: Arc<dyn MemoryProvider>,
}

/// Runs turns for a single session. Turns are strictly sequential: callers
/// hold `&mut self` for the whole turn.
pub struct TurnOrchestrator {
    session_id: SessionId,
    router: Router,
    backends: Backends,
    integrator: ResponseIntegrator,
    collaborators: Collaborators,
    config: OrchestratorConfig,
    /// Last probed availability; `None` until the first probe.
    availability: Option<BackendAvailability>,
    stage: TurnStage,
    turn_index: u32,
}

impl TurnOrchestrator {
    pub fn new(
        session_id: SessionId,
        router: Router,
        backends: Backends,
        integrator: ResponseIntegrator,
        collaborators: Collaborators,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            session_id,
            router,
            backends,
            integrator,
            collaborators,
            config,
            availability: None,
            stage: TurnStage::Idle,
            turn_index: 0,
        }
    }

    /// Build an orchestrator with router, integrator and timeouts from `config`.
    pub fn from_config(
        session_id: SessionId,
        config: &TandemConfig,
        backends: Backends,
        collaborators: Collaborators,
    ) -> Self {
        Self::new(
            session_id,
            Router::from_config(config),
            backends,
            ResponseIntegrator::new(config.integrator.clone()),
            collaborators,
            config.orchestrator.clone(),
        )
    }

    /// Seed availability from a probe done elsewhere (e.g. at startup).
    pub fn with_availability(mut self, availability: BackendAvailability) -> Self {
        self.availability = Some(availability);
        self
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Current stage. `Idle` between turns.
    pub fn stage(&self) -> TurnStage {
        self.stage
    }

    pub fn availability(&self) -> Option<BackendAvailability> {
        self.availability
    }

    /// Number of turns that reached `ContextUpdated`.
    pub fn turns_completed(&self) -> u32 {
        self.turn_index
    }

    /// Probe both runtimes and remember the result.
    pub async fn probe_backends(&mut self) -> BackendAvailability {
        let availability = self.backends.probe(self.config.collaborator_timeout()).await;
        self.availability = Some(availability);
        availability
    }

    /// Run one turn to completion or abort.
    pub async fn process_turn(&mut self) -> TurnOutcome {
        self.process_turn_until(&CancellationToken::new()).await
    }

    /// Run one turn, aborting with [`AbortReason::Cancelled`] if `cancel` fires
    /// while waiting for activation or input. Once a query has been acquired
    /// the turn always reaches `ContextUpdated`.
    pub async fn process_turn_until(&mut self, cancel: &CancellationToken) -> TurnOutcome {
        let started = Instant::now();
        let limit = self.config.collaborator_timeout();
        self.stage = TurnStage::Idle;

        // Idle -> ActivationChecked
        let checked = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            checked = AssertUnwindSafe(bounded(limit, self.collaborators.activation.is_active()))
                .catch_unwind() => Some(checked),
        };
        match checked {
            None => return self.cancelled(),
            Some(Ok(Ok(true))) => {}
            Some(Ok(Ok(false))) => {
                debug!(session_id = %self.session_id, "not activated, skipping turn");
                return TurnOutcome::Aborted(AbortReason::Inactive);
            }
            Some(Ok(Err(e))) => {
                warn!(session_id = %self.session_id, error = %e, "activation check failed, skipping turn");
                return TurnOutcome::Aborted(AbortReason::ActivationFailed);
            }
            Some(Err(panic)) => {
                error!(
                    session_id = %self.session_id,
                    stage = %self.stage,
                    panic = panic_message(panic.as_ref()),
                    "activation source panicked, skipping turn"
                );
                return TurnOutcome::Aborted(AbortReason::ActivationFailed);
            }
        }
        self.stage = TurnStage::ActivationChecked;

        // ActivationChecked -> InputAcquired
        let acquired = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            acquired = AssertUnwindSafe(self.collaborators.input.query_text())
                .catch_unwind() => Some(acquired),
        };
        let text = match acquired {
            None => return self.cancelled(),
            Some(Ok(Ok(text))) => text,
            Some(Ok(Err(TandemError::InputClosed))) => {
                info!(session_id = %self.session_id, "input closed");
                self.stage = TurnStage::Idle;
                return TurnOutcome::Aborted(AbortReason::InputClosed);
            }
            Some(Ok(Err(e))) => {
                warn!(session_id = %self.session_id, error = %e, "input acquisition failed, skipping turn");
                self.stage = TurnStage::Idle;
                return TurnOutcome::Aborted(AbortReason::InputFailed);
            }
            Some(Err(panic)) => {
                error!(
                    session_id = %self.session_id,
                    stage = %self.stage,
                    panic = panic_message(panic.as_ref()),
                    "input source panicked, skipping turn"
                );
                self.stage = TurnStage::Idle;
                return TurnOutcome::Aborted(AbortReason::InputFailed);
            }
        };
        if ModeHint::parse_prefix(&text).1.trim().is_empty() {
            debug!(session_id = %self.session_id, "empty input, skipping turn");
            self.stage = TurnStage::Idle;
            return TurnOutcome::Aborted(AbortReason::EmptyInput);
        }

        let mut state = TurnState::new(Query::new(text, self.turn_index));
        self.stage = state.stage;
        info!(
            session_id = %self.session_id,
            turn = self.turn_index,
            query_id = %state.query.id,
            "turn started"
        );

        // InputAcquired -> ... -> Integrated, with recovery.
        let pipeline = AssertUnwindSafe(self.run_pipeline(&mut state))
            .catch_unwind()
            .await;
        let reply = match pipeline {
            Ok(Ok(response)) => {
                let text = response.text.clone();
                state.response = Some(response);
                text
            }
            Ok(Err(TandemError::Integration(detail))) => {
                warn!(
                    session_id = %self.session_id,
                    stage = %state.stage,
                    detail = %detail,
                    "no usable backend result, sending fallback reply"
                );
                state.failed_stage = Some(state.stage);
                self.config.fallback_text.clone()
            }
            Ok(Err(e)) => {
                error!(
                    session_id = %self.session_id,
                    stage = %state.stage,
                    error = %e,
                    "turn pipeline failed, sending fallback reply"
                );
                state.failed_stage = Some(state.stage);
                self.config.fallback_text.clone()
            }
            Err(panic) => {
                error!(
                    session_id = %self.session_id,
                    stage = %state.stage,
                    panic = panic_message(panic.as_ref()),
                    "turn pipeline panicked, sending fallback reply"
                );
                state.failed_stage = Some(state.stage);
                self.config.fallback_text.clone()
            }
        };
        if state.stage < TurnStage::Integrated {
            state.advance(TurnStage::Integrated);
        }

        // Integrated -> Dispatched
        let delivered = AssertUnwindSafe(bounded(limit, self.collaborators.output.deliver(&reply)))
            .catch_unwind()
            .await;
        match delivered {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(session_id = %self.session_id, error = %e, "output dispatch failed");
                state.dispatch_failed = true;
            }
            Err(panic) => {
                error!(
                    session_id = %self.session_id,
                    panic = panic_message(panic.as_ref()),
                    "output sink panicked"
                );
                state.dispatch_failed = true;
            }
        }
        state.advance(TurnStage::Dispatched);

        // Dispatched -> ContextUpdated
        let stored = AssertUnwindSafe(bounded(
            limit,
            self.collaborators
                .memory
                .store_turn(&self.session_id, &state.query, &reply),
        ))
        .catch_unwind()
        .await;
        match stored {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(session_id = %self.session_id, error = %e, "failed to store turn");
                state.store_failed = true;
            }
            Err(panic) => {
                error!(
                    session_id = %self.session_id,
                    panic = panic_message(panic.as_ref()),
                    "memory store panicked"
                );
                state.store_failed = true;
            }
        }
        state.advance(TurnStage::ContextUpdated);

        let elapsed = started.elapsed();
        let rule = state.decision.as_ref().map(|d| d.rule.to_string()).unwrap_or_default();
        let path = state.decision.as_ref().map(|d| d.path.to_string()).unwrap_or_default();
        let strategy = state
            .response
            .as_ref()
            .map(|r| r.strategy.to_string())
            .unwrap_or_default();
        info!(
            session_id = %self.session_id,
            turn = self.turn_index,
            rule = rule.as_str(),
            path = path.as_str(),
            strategy = strategy.as_str(),
            fallback_reply = state.response.is_none(),
            latency_ms = elapsed.as_millis() as u64,
            "turn completed"
        );

        self.turn_index += 1;
        self.stage = TurnStage::Idle;
        TurnOutcome::Completed(Box::new(TurnReport::from_state(
            self.session_id.clone(),
            state,
            reply,
            elapsed,
        )))
    }

    fn cancelled(&mut self) -> TurnOutcome {
        debug!(session_id = %self.session_id, stage = %self.stage, "cancelled before input, skipping turn");
        self.stage = TurnStage::Idle;
        TurnOutcome::Aborted(AbortReason::Cancelled)
    }

    /// InputAcquired -> ContextRetrieved -> Routed -> Executing -> Integrated.
    async fn run_pipeline(
        &mut self,
        state: &mut TurnState,
    ) -> Result<IntegratedResponse, TandemError> {
        let limit = self.config.collaborator_timeout();
        match bounded(
            limit,
            self.collaborators
                .memory
                .retrieve_context(&self.session_id, &state.query),
        )
        .await
        {
            Ok(context) => state.context = context,
            Err(e) => {
                warn!(
                    session_id = %self.session_id,
                    error = %e,
                    "context retrieval failed, continuing with empty context"
                );
                state.context = ConversationContext::empty();
                state.degraded_context = true;
            }
        }
        state.advance(TurnStage::ContextRetrieved);
        self.stage = state.stage;

        let availability = self.current_availability().await;
        let (features, decision) = self
            .router
            .decide(&state.query, &state.context, availability);
        state.features = Some(features);
        state.decision = Some(decision.clone());
        state.advance(TurnStage::Routed);
        self.stage = state.stage;

        state.advance(TurnStage::Executing);
        self.stage = state.stage;
        let execution_started = Instant::now();
        let results = self
            .execute(decision.path.sources(), &decision, &state.query, &state.context)
            .await;
        state.results = results;

        if let Some(fallback) = self.fallback_source(&decision, &state.results, availability) {
            warn!(
                session_id = %self.session_id,
                failed = %fallback.other(),
                fallback = %fallback,
                "sole track failed, falling back to the other track"
            );
            let extra = self
                .execute(&[fallback], &decision, &state.query, &state.context)
                .await;
            state.results.extend(extra);
            state.fallback_source = Some(fallback);
        }

        let response = match self.integrator.integrate(&decision, &state.results)? {
            Integration::Ready(response) => response,
            Integration::Synthesize {
                instruction,
                fallback,
            } => {
                let deadline = execution_started + decision.join_deadline();
                self.synthesize(instruction, fallback, state, deadline, availability)
                    .await
            }
        };
        state.advance(TurnStage::Integrated);
        self.stage = state.stage;
        Ok(response)
    }

    async fn current_availability(&mut self) -> BackendAvailability {
        match self.availability {
            Some(availability) if !self.config.probe_each_turn => availability,
            _ => self.probe_backends().await,
        }
    }

    /// Fan out to `sources` and join them under the decision's join deadline
    /// plus the configured grace. Every source gets a result.
    async fn execute(
        &self,
        sources: &[Source],
        decision: &RoutingDecision,
        query: &Query,
        context: &ConversationContext,
    ) -> HashMap<Source, BackendResult> {
        let started = Instant::now();
        let cancel = CancellationToken::new();
        let mut tasks = JoinSet::new();
        let mut join_budget = Duration::ZERO;

        for &source in sources {
            let budget = decision.timeout_for(source);
            join_budget = join_budget.max(budget);
            let request = InferenceRequest {
                query: query.clone(),
                context: context.clone(),
                instruction: None,
                deadline: started + budget,
                cancel: cancel.child_token(),
            };
            let backends = self.backends.clone();
            tasks.spawn(async move { backends.run(source, request).await });
        }

        let deadline = started + join_budget + self.config.join_grace();
        let mut results = HashMap::new();
        let mut deadline_passed = false;
        loop {
            match tokio::time::timeout_at(deadline, tasks.join_next()).await {
                Ok(Some(Ok(result))) => {
                    info!(
                        session_id = %self.session_id,
                        source = %result.source,
                        status = %result.status,
                        latency_ms = result.latency.as_millis() as u64,
                        "backend finished"
                    );
                    results.insert(result.source, result);
                }
                Ok(Some(Err(e))) => {
                    error!(session_id = %self.session_id, error = %e, "backend task failed");
                }
                Ok(None) => break,
                Err(_) => {
                    warn!(
                        session_id = %self.session_id,
                        pending = tasks.len(),
                        "join deadline passed, discarding late results"
                    );
                    deadline_passed = true;
                    cancel.cancel();
                    tasks.abort_all();
                    break;
                }
            }
        }

        let elapsed = started.elapsed();
        for &source in sources {
            results.entry(source).or_insert_with(|| {
                if deadline_passed {
                    BackendResult::timeout(source, elapsed)
                } else {
                    BackendResult::error(source, "backend task failed", elapsed)
                }
            });
        }
        results
    }

    /// The track to retry on when a single-track decision errored.
    /// Timeouts never fall back: the turn budget is already spent.
    fn fallback_source(
        &self,
        decision: &RoutingDecision,
        results: &HashMap<Source, BackendResult>,
        availability: BackendAvailability,
    ) -> Option<Source> {
        if !self.config.fallback_on_error || decision.path == RoutePath::Parallel {
            return None;
        }
        let sole = decision.path.sources().first().copied()?;
        if results.get(&sole)?.status != BackendStatus::Error {
            return None;
        }
        let other = sole.other();
        (availability.is_available(other) && self.backends.has(other)).then_some(other)
    }

    /// Ask the API track to merge both answers; use `fallback` if it cannot.
    async fn synthesize(
        &self,
        instruction: String,
        fallback: IntegratedResponse,
        state: &TurnState,
        deadline: Instant,
        availability: BackendAvailability,
    ) -> IntegratedResponse {
        if !availability.api || !self.backends.has(Source::Api) || Instant::now() >= deadline {
            debug!(session_id = %self.session_id, "no budget for synthesis, using merged reply");
            return fallback;
        }

        let request = InferenceRequest {
            query: state.query.clone(),
            context: state.context.clone(),
            instruction: Some(instruction),
            deadline,
            cancel: CancellationToken::new(),
        };
        let started = Instant::now();
        let result = match tokio::time::timeout_at(
            deadline + self.config.join_grace(),
            self.backends.run(Source::Api, request),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => BackendResult::timeout(Source::Api, started.elapsed()),
        };

        if result.is_usable() {
            self.integrator.synthesized(result.text, fallback.similarity)
        } else {
            warn!(
                session_id = %self.session_id,
                status = %result.status,
                "synthesis failed, using merged reply"
            );
            fallback
        }
    }
}

/// Bound a collaborator call by `limit`.
async fn bounded<T>(
    limit: Duration,
    call: impl Future<Output = Result<T, TandemError>>,
) -> Result<T, TandemError> {
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(TandemError::Timeout { duration: limit }),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}
