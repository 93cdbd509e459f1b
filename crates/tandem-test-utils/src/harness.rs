// SPDX-FileCopyrightText: 2026 Tandem Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end turn testing.
//!
//! `TestHarness` assembles an [`Assistant`] with mock runtimes and mock
//! collaborators, registers one session and provides `say()` to drive a
//! full turn in tests.

use std::sync::Arc;

use tandem_agent::{Assistant, Collaborators, TurnOutcome, TurnReport};
use tandem_backend::Backends;
use tandem_config::TandemConfig;
use tandem_core::{ModelRuntime, SessionId, TandemError};

use crate::mock_io::{MockActivation, MockMemory, RecordingSink, ScriptedInput};
use crate::mock_runtime::MockRuntime;

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    config: TandemConfig,
    local: Option<MockRuntime>,
    api: Option<MockRuntime>,
    activation: MockActivation,
    memory: MockMemory,
    sink: RecordingSink,
    probe: bool,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            config: TandemConfig::default(),
            local: Some(MockRuntime::local()),
            api: Some(MockRuntime::api()),
            activation: MockActivation::always(),
            memory: MockMemory::new(),
            sink: RecordingSink::new(),
            probe: true,
        }
    }

    pub fn with_config(mut self, config: TandemConfig) -> Self {
        self.config = config;
        self
    }

    /// Adjust the default configuration in place.
    pub fn configure(mut self, f: impl FnOnce(&mut TandemConfig)) -> Self {
        f(&mut self.config);
        self
    }

    pub fn with_local(mut self, runtime: MockRuntime) -> Self {
        self.local = Some(runtime);
        self
    }

    pub fn with_api(mut self, runtime: MockRuntime) -> Self {
        self.api = Some(runtime);
        self
    }

    /// Build without a local controller.
    pub fn without_local(mut self) -> Self {
        self.local = None;
        self
    }

    /// Build without an API controller.
    pub fn without_api(mut self) -> Self {
        self.api = None;
        self
    }

    pub fn with_activation(mut self, activation: MockActivation) -> Self {
        self.activation = activation;
        self
    }

    pub fn with_memory(mut self, memory: MockMemory) -> Self {
        self.memory = memory;
        self
    }

    pub fn with_sink(mut self, sink: RecordingSink) -> Self {
        self.sink = sink;
        self
    }

    /// Skip the startup probe; the session probes on its first turn instead.
    pub fn without_startup_probe(mut self) -> Self {
        self.probe = false;
        self
    }

    /// Build the harness and register its session.
    pub async fn build(self) -> Result<TestHarness, TandemError> {
        let local = self.local.map(Arc::new);
        let api = self.api.map(Arc::new);
        let backends = Backends::from_runtimes(
            local.clone().map(|rt| rt as Arc<dyn ModelRuntime>),
            api.clone().map(|rt| rt as Arc<dyn ModelRuntime>),
            &self.config,
        );

        let assistant = Arc::new(Assistant::new(self.config, backends));
        if self.probe {
            assistant.probe_backends().await;
        }

        let activation = Arc::new(self.activation);
        let input = Arc::new(ScriptedInput::default());
        let sink = Arc::new(self.sink);
        let memory = Arc::new(self.memory);
        let session = SessionId::from("test-session");
        assistant
            .register_session(
                session.clone(),
                Collaborators {
                    activation: activation.clone(),
                    input: input.clone(),
                    output: sink.clone(),
                    memory: memory.clone(),
                },
            )
            .await?;

        Ok(TestHarness {
            assistant,
            session,
            local,
            api,
            activation,
            input,
            sink,
            memory,
        })
    }
}

/// A fully assembled assistant with one registered session.
pub struct TestHarness {
    pub assistant: Arc<Assistant>,
    pub session: SessionId,
    pub local: Option<Arc<MockRuntime>>,
    pub api: Option<Arc<MockRuntime>>,
    pub activation: Arc<MockActivation>,
    pub input: Arc<ScriptedInput>,
    pub sink: Arc<RecordingSink>,
    pub memory: Arc<MockMemory>,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// Run one turn with whatever input is queued.
    pub async fn turn(&self) -> TurnOutcome {
        self.assistant
            .process_turn(&self.session)
            .await
            .expect("harness session is registered")
    }

    /// Queue `text` as the next utterance and run a turn that must complete.
    pub async fn say(&self, text: &str) -> TurnReport {
        self.input.push(text).await;
        match self.turn().await {
            TurnOutcome::Completed(report) => *report,
            TurnOutcome::Aborted(reason) => panic!("turn for {text:?} aborted: {reason}"),
        }
    }

    /// The local mock runtime. Panics if the harness was built without one.
    pub fn local(&self) -> &MockRuntime {
        self.local.as_deref().expect("harness has a local runtime")
    }

    /// The API mock runtime. Panics if the harness was built without one.
    pub fn api(&self) -> &MockRuntime {
        self.api.as_deref().expect("harness has an API runtime")
    }
}
