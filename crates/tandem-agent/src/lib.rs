// SPDX-FileCopyrightText: 2026 Tandem Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Turn orchestration and session management for the Tandem assistant.
//!
//! The [`Assistant`] is the multi-session driver that:
//! - Registers sessions, each with its own collaborators and [`TurnOrchestrator`]
//! - Runs one turn at a time per session, sessions in parallel
//! - Probes backend availability at startup
//! - Stops a session loop on input close or cancellation

pub mod history;
pub mod orchestrator;
pub mod shutdown;
pub mod turn;

use std::collections::HashMap;
use std::sync::Arc;

pub use history::InMemoryHistory;
pub use orchestrator::{Collaborators, TurnOrchestrator};
pub use turn::{AbortReason, TurnOutcome, TurnReport, TurnStage, TurnState};

use tandem_backend::Backends;
use tandem_config::TandemConfig;
use tandem_core::{BackendAvailability, SessionId, TandemError};
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Drives turns for every registered session.
///
/// Each session owns a [`TurnOrchestrator`] behind its own mutex, so turns in
/// one session are sequential while different sessions proceed concurrently.
pub struct Assistant {
    config: TandemConfig,
    backends: Backends,
    availability: RwLock<Option<BackendAvailability>>,
    sessions: RwLock<HashMap<SessionId, Arc<Mutex<TurnOrchestrator>>>>,
}

impl Assistant {
    pub fn new(config: TandemConfig, backends: Backends) -> Self {
        info!(
            agent_name = config.agent.name.as_str(),
            local = backends.has(tandem_core::Source::Local),
            api = backends.has(tandem_core::Source::Api),
            "assistant initialized"
        );
        Self {
            config,
            backends,
            availability: RwLock::new(None),
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &TandemConfig {
        &self.config
    }

    /// Probe both backends. Sessions registered afterwards start with this
    /// availability instead of probing on their first turn.
    pub async fn probe_backends(&self) -> BackendAvailability {
        let availability = self
            .backends
            .probe(self.config.orchestrator.collaborator_timeout())
            .await;
        *self.availability.write().await = Some(availability);
        availability
    }

    /// Register a session with its collaborators.
    pub async fn register_session(
        &self,
        session_id: SessionId,
        collaborators: Collaborators,
    ) -> Result<(), TandemError> {
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&session_id) {
            return Err(TandemError::Internal(format!(
                "session already registered: {session_id}"
            )));
        }
        if sessions.len() >= self.config.agent.max_sessions {
            return Err(TandemError::Internal(format!(
                "session limit reached ({})",
                self.config.agent.max_sessions
            )));
        }

        let mut orchestrator = TurnOrchestrator::from_config(
            session_id.clone(),
            &self.config,
            self.backends.clone(),
            collaborators,
        );
        if let Some(availability) = *self.availability.read().await {
            orchestrator = orchestrator.with_availability(availability);
        }
        sessions.insert(session_id.clone(), Arc::new(Mutex::new(orchestrator)));
        info!(session_id = %session_id, active = sessions.len(), "session registered");
        Ok(())
    }

    /// Remove a session. Returns whether it existed.
    pub async fn remove_session(&self, session_id: &SessionId) -> bool {
        let removed = self.sessions.write().await.remove(session_id).is_some();
        if removed {
            debug!(session_id = %session_id, "session removed");
        }
        removed
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    async fn session(&self, session_id: &SessionId) -> Result<Arc<Mutex<TurnOrchestrator>>, TandemError> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .cloned()
            .ok_or_else(|| TandemError::SessionNotFound(session_id.to_string()))
    }

    /// Run one turn for `session_id`.
    ///
    /// The only error is [`TandemError::SessionNotFound`]; every other failure
    /// is folded into the returned [`TurnOutcome`].
    pub async fn process_turn(&self, session_id: &SessionId) -> Result<TurnOutcome, TandemError> {
        let orchestrator = self.session(session_id).await?;
        let mut orchestrator = orchestrator.lock().await;
        Ok(orchestrator.process_turn().await)
    }

    /// Run turns for `session_id` until its input closes or `cancel` fires.
    ///
    /// Returns the number of completed turns.
    pub async fn run(
        &self,
        session_id: &SessionId,
        cancel: CancellationToken,
    ) -> Result<u32, TandemError> {
        self.run_with(session_id, cancel, |_| {}).await
    }

    /// Like [`Assistant::run`], calling `on_turn` after every completed turn.
    ///
    /// `cancel` is observed between turns and while the session waits for
    /// activation or input; a turn that has acquired its query is finished.
    pub async fn run_with<F>(
        &self,
        session_id: &SessionId,
        cancel: CancellationToken,
        mut on_turn: F,
    ) -> Result<u32, TandemError>
    where
        F: FnMut(&TurnReport),
    {
        let orchestrator = self.session(session_id).await?;
        info!(session_id = %session_id, "session loop running");

        let mut completed = 0;
        while !cancel.is_cancelled() {
            let outcome = orchestrator.lock().await.process_turn_until(&cancel).await;
            match outcome {
                TurnOutcome::Completed(report) => {
                    completed += 1;
                    on_turn(&report);
                }
                TurnOutcome::Aborted(AbortReason::InputClosed) => break,
                TurnOutcome::Aborted(AbortReason::Cancelled) => break,
                TurnOutcome::Aborted(_) => tokio::task::yield_now().await,
            }
        }
        if cancel.is_cancelled() {
            info!(session_id = %session_id, "shutdown signal received, stopping session loop");
        }

        info!(session_id = %session_id, completed, "session loop stopped");
        Ok(completed)
    }
}
