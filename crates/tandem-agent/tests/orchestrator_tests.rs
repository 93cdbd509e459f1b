// SPDX-FileCopyrightText: 2026 Tandem Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end turn tests driving the orchestrator through mock runtimes.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tandem_agent::{AbortReason, Collaborators, TurnOutcome, TurnStage};
use tandem_core::{
    BackendStatus, InputSource, MergeStrategy, RoutePath, RuleId, SessionId, Source, TandemError,
};
use tandem_test_utils::{
    MockActivation, MockFailure, MockMemory, MockReply, MockRuntime, RecordingSink,
    ScriptedInput, TestHarness,
};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use tracing_test::traced_test;

const STORY: &str = "Write a 300-word story about a lighthouse";
const FOLLOW_UP: &str = "What about the other one?";
const HEDGE: &str =
    "Can you explain why my sourdough bread keeps collapsing and compare it with yeast bread";

fn fallback_text() -> String {
    tandem_config::OrchestratorConfig::default().fallback_text
}

// --- Routing scenarios ---

#[tokio::test(start_paused = true)]
async fn time_question_is_answered_locally() {
    let h = TestHarness::builder().build().await.unwrap();

    let report = h.say("What time is it?").await;

    let decision = report.decision.as_ref().unwrap();
    assert_eq!(decision.rule, RuleId::TimeSensitive);
    assert_eq!(decision.path, RoutePath::Local);
    let response = report.response.as_ref().unwrap();
    assert_eq!(response.strategy, MergeStrategy::Single);
    assert_eq!(response.sources, vec![Source::Local]);
    assert_eq!(report.reply, "local answer");
    assert_eq!(report.stage, TurnStage::ContextUpdated);

    assert_eq!(h.local().calls(), 1);
    assert_eq!(h.api().calls(), 0);
    assert_eq!(h.sink.delivered().await, vec!["local answer"]);
    assert_eq!(h.memory.stored().await.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn creative_request_with_api_timeout_sends_fallback_reply() {
    let h = TestHarness::builder()
        .with_api(MockRuntime::api().with_default(MockReply::Hang))
        .build()
        .await
        .unwrap();

    let report = h.say(STORY).await;

    let decision = report.decision.as_ref().unwrap();
    assert_eq!(decision.rule, RuleId::HighComplexity);
    assert_eq!(decision.path, RoutePath::Api);
    assert_eq!(report.results[&Source::Api].status, BackendStatus::Timeout);
    assert!(!report.results.contains_key(&Source::Local));
    assert_eq!(h.local().calls(), 0, "timeouts never fall back");

    assert!(report.is_apology());
    assert_eq!(report.reply, fallback_text());
    assert_eq!(report.failed_stage, Some(TurnStage::Executing));
    assert_eq!(h.sink.last().await.as_deref(), Some(fallback_text().as_str()));
}

#[tokio::test(start_paused = true)]
async fn follow_up_runs_both_tracks_and_merges_divergent_answers() {
    let local_text = "Probably the red kettle.";
    let api_text = "You likely mean the stainless steel model with the temperature dial.";
    let h = TestHarness::builder()
        .with_memory(MockMemory::new().with_prior_turns(5))
        .with_local(MockRuntime::local().with_default(MockReply::text(local_text)))
        .with_api(MockRuntime::api().with_default(MockReply::text(api_text)))
        .build()
        .await
        .unwrap();

    let report = h.say(FOLLOW_UP).await;

    let decision = report.decision.as_ref().unwrap();
    assert_eq!(decision.rule, RuleId::ContextFollowUp);
    assert_eq!(decision.path, RoutePath::Parallel);
    let response = report.response.as_ref().unwrap();
    assert_eq!(response.strategy, MergeStrategy::TransitionMerged);
    assert_eq!(response.sources, vec![Source::Local, Source::Api]);
    assert!(report.reply.contains(local_text));
    assert!(report.reply.contains(api_text));
    assert!(report.reply.find(local_text) < report.reply.find(api_text));
    assert_eq!(h.local().calls(), 1);
    assert_eq!(h.api().calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn local_unavailable_at_startup_forces_api_for_every_query() {
    let h = TestHarness::builder()
        .with_local(MockRuntime::local().unavailable())
        .build()
        .await
        .unwrap();

    for text in ["What time is it?", STORY, HEDGE] {
        let report = h.say(text).await;
        let decision = report.decision.as_ref().unwrap();
        assert_eq!(decision.rule, RuleId::ForceApi, "{text}");
        assert_eq!(decision.path, RoutePath::Api);
        assert_eq!(report.reply, "api answer");
    }
    assert_eq!(h.local().calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn mid_complexity_query_is_hedged_across_both_tracks() {
    let h = TestHarness::builder().build().await.unwrap();

    let report = h.say(HEDGE).await;

    let decision = report.decision.as_ref().unwrap();
    assert_eq!(decision.rule, RuleId::AmbiguousHedge);
    assert_eq!(decision.path, RoutePath::Parallel);
    assert_eq!(report.results.len(), 2);
    assert!(report.results.values().all(|r| r.status == BackendStatus::Ok));
    assert_eq!(h.local().calls(), 1);
    assert_eq!(h.api().calls(), 1);
}

// --- Execution and fallback ---

#[tokio::test(start_paused = true)]
async fn sole_track_error_falls_back_to_the_other_track() {
    let h = TestHarness::builder()
        .with_local(MockRuntime::local().with_default(MockReply::Fail(MockFailure::Provider)))
        .build()
        .await
        .unwrap();

    let report = h.say("What time is it?").await;

    assert_eq!(report.results[&Source::Local].status, BackendStatus::Error);
    assert_eq!(report.fallback_source, Some(Source::Api));
    assert_eq!(report.reply, "api answer");
    assert_eq!(report.response.as_ref().unwrap().sources, vec![Source::Api]);
}

#[tokio::test(start_paused = true)]
async fn fallback_can_be_disabled() {
    let h = TestHarness::builder()
        .configure(|c| c.orchestrator.fallback_on_error = false)
        .with_local(MockRuntime::local().with_default(MockReply::Fail(MockFailure::Provider)))
        .build()
        .await
        .unwrap();

    let report = h.say("What time is it?").await;

    assert_eq!(report.fallback_source, None);
    assert!(report.is_apology());
    assert_eq!(h.api().calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn sole_track_timeout_does_not_fall_back() {
    let h = TestHarness::builder()
        .with_local(MockRuntime::local().with_default(MockReply::Hang))
        .build()
        .await
        .unwrap();

    let report = h.say("What time is it?").await;

    assert_eq!(report.results[&Source::Local].status, BackendStatus::Timeout);
    assert_eq!(report.fallback_source, None);
    assert_eq!(h.api().calls(), 0);
    assert_eq!(report.reply, fallback_text());
}

#[tokio::test(start_paused = true)]
async fn stuck_local_model_is_abandoned_within_timeout_plus_grace() {
    let h = TestHarness::builder()
        .with_local(MockRuntime::local().with_default(MockReply::Stuck))
        .build()
        .await
        .unwrap();

    let report = h.say("What time is it?").await;

    assert_eq!(report.results[&Source::Local].status, BackendStatus::Timeout);
    // 5 s local budget plus 250 ms cancellation grace.
    assert!(report.elapsed <= Duration::from_millis(5_300), "took {:?}", report.elapsed);
}

#[tokio::test(start_paused = true)]
async fn stuck_api_is_abandoned_at_its_deadline() {
    let h = TestHarness::builder()
        .with_api(MockRuntime::api().with_default(MockReply::Stuck))
        .build()
        .await
        .unwrap();

    let report = h.say(STORY).await;

    assert_eq!(report.results[&Source::Api].status, BackendStatus::Timeout);
    // 30 s API budget stretched by 1.5 for a creative request.
    assert!(report.elapsed <= Duration::from_millis(45_300), "took {:?}", report.elapsed);
}

#[tokio::test(start_paused = true)]
async fn parallel_turn_uses_the_surviving_track() {
    let h = TestHarness::builder()
        .with_memory(MockMemory::new().with_prior_turns(5))
        .with_local(MockRuntime::local().with_default(MockReply::Hang))
        .build()
        .await
        .unwrap();

    let report = h.say(FOLLOW_UP).await;

    assert_eq!(report.decision.as_ref().unwrap().path, RoutePath::Parallel);
    assert_eq!(report.results[&Source::Local].status, BackendStatus::Timeout);
    assert_eq!(report.results[&Source::Api].status, BackendStatus::Ok);
    let response = report.response.as_ref().unwrap();
    assert_eq!(response.strategy, MergeStrategy::Single);
    assert_eq!(response.sources, vec![Source::Api]);
    assert_eq!(h.local().cancellations(), 1);
}

#[tokio::test(start_paused = true)]
async fn parallel_turn_with_both_tracks_failing_sends_fallback_reply() {
    let h = TestHarness::builder()
        .with_memory(MockMemory::new().with_prior_turns(5))
        .with_local(MockRuntime::local().with_default(MockReply::Fail(MockFailure::Provider)))
        .with_api(MockRuntime::api().with_default(MockReply::Fail(MockFailure::Unavailable)))
        .build()
        .await
        .unwrap();

    let report = h.say(FOLLOW_UP).await;

    assert_eq!(report.results.len(), 2);
    assert!(report.is_apology());
    assert_eq!(h.sink.last().await.as_deref(), Some(fallback_text().as_str()));
    // The apology still completes the turn and is remembered.
    assert_eq!(h.memory.stored().await.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn long_divergent_answers_are_synthesized_by_the_api() {
    let h = TestHarness::builder()
        .configure(|c| {
            c.integrator.synthesize = true;
            c.integrator.max_merged_chars = 20;
        })
        .with_memory(MockMemory::new().with_prior_turns(5))
        .with_local(MockRuntime::local().with_default(MockReply::text("Probably the red kettle.")))
        .with_api(
            MockRuntime::api()
                .then(MockReply::text("You likely mean the stainless steel model."))
                .then(MockReply::text("The stainless steel kettle, not the red one.")),
        )
        .build()
        .await
        .unwrap();

    let report = h.say(FOLLOW_UP).await;

    let response = report.response.as_ref().unwrap();
    assert_eq!(response.strategy, MergeStrategy::Synthesized);
    assert_eq!(report.reply, "The stainless steel kettle, not the red one.");
    let prompts = h.api().prompts();
    assert_eq!(prompts.len(), 2);
    assert!(prompts[1].contains("Probably the red kettle."));
    assert!(prompts[1].contains("You likely mean the stainless steel model."));
}

#[tokio::test(start_paused = true)]
async fn failed_synthesis_keeps_the_merged_reply() {
    let h = TestHarness::builder()
        .configure(|c| {
            c.integrator.synthesize = true;
            c.integrator.max_merged_chars = 20;
        })
        .with_memory(MockMemory::new().with_prior_turns(5))
        .with_local(MockRuntime::local().with_default(MockReply::text("Probably the red kettle.")))
        .with_api(
            MockRuntime::api()
                .then(MockReply::text("You likely mean the stainless steel model."))
                .then(MockReply::Fail(MockFailure::Provider)),
        )
        .build()
        .await
        .unwrap();

    let report = h.say(FOLLOW_UP).await;

    assert_eq!(
        report.response.as_ref().unwrap().strategy,
        MergeStrategy::TransitionMerged
    );
    assert!(report.reply.contains("Probably the red kettle."));
}

#[tokio::test(start_paused = true)]
async fn panicking_backend_is_contained() {
    let h = TestHarness::builder()
        .with_local(MockRuntime::local().with_default(MockReply::Panic))
        .build()
        .await
        .unwrap();

    let report = h.say("What time is it?").await;

    assert_eq!(report.results[&Source::Local].status, BackendStatus::Error);
    assert_eq!(report.reply, "api answer");
}

// --- Collaborator failures ---

#[tokio::test(start_paused = true)]
async fn memory_retrieval_failure_degrades_to_empty_context() {
    let h = TestHarness::builder()
        .with_memory(MockMemory::new().fail_retrieve())
        .build()
        .await
        .unwrap();

    let report = h.say("What time is it?").await;

    assert!(report.degraded_context);
    assert_eq!(report.reply, "local answer");
    assert!(!report.is_apology());
}

#[tokio::test(start_paused = true)]
#[traced_test]
async fn memory_store_failure_is_logged_not_fatal() {
    let h = TestHarness::builder()
        .with_memory(MockMemory::new().fail_store())
        .build()
        .await
        .unwrap();

    let report = h.say("What time is it?").await;

    assert!(report.store_failed);
    assert_eq!(report.stage, TurnStage::ContextUpdated);
    assert_eq!(h.sink.delivered().await, vec!["local answer"]);
    assert!(logs_contain("failed to store turn"));
}

#[tokio::test(start_paused = true)]
#[traced_test]
async fn output_failure_is_logged_and_turn_still_stored() {
    let h = TestHarness::builder()
        .with_sink(RecordingSink::failing())
        .build()
        .await
        .unwrap();

    let report = h.say("What time is it?").await;

    assert!(report.dispatch_failed);
    assert_eq!(h.memory.stored().await.len(), 1);
    assert!(logs_contain("output dispatch failed"));
}

#[tokio::test(start_paused = true)]
#[traced_test]
async fn pipeline_panic_becomes_fallback_reply() {
    let h = TestHarness::builder()
        .with_memory(MockMemory::new().panic_on_retrieve())
        .build()
        .await
        .unwrap();

    let report = h.say("What time is it?").await;

    assert!(report.is_apology());
    assert_eq!(report.failed_stage, Some(TurnStage::InputAcquired));
    assert_eq!(report.stage, TurnStage::ContextUpdated);
    assert_eq!(h.sink.last().await.as_deref(), Some(fallback_text().as_str()));
    assert!(logs_contain("turn pipeline panicked"));
    assert!(logs_contain("input_acquired"));
}

// --- Aborted turns ---

#[tokio::test]
async fn inactive_turn_has_no_side_effects() {
    let h = TestHarness::builder()
        .with_activation(MockActivation::never())
        .build()
        .await
        .unwrap();
    h.input.push("What time is it?").await;

    let outcome = h.turn().await;

    assert_eq!(outcome.abort_reason(), Some(&AbortReason::Inactive));
    assert_eq!(h.input.remaining().await, 1, "input is not consumed");
    assert!(h.sink.delivered().await.is_empty());
    assert!(h.memory.stored().await.is_empty());
    assert_eq!(h.local().calls(), 0);
}

#[tokio::test]
async fn activation_error_aborts() {
    let h = TestHarness::builder()
        .with_activation(MockActivation::failing())
        .build()
        .await
        .unwrap();

    let outcome = h.turn().await;
    assert_eq!(outcome.abort_reason(), Some(&AbortReason::ActivationFailed));
}

#[tokio::test]
async fn empty_and_prefix_only_input_abort() {
    let h = TestHarness::builder().build().await.unwrap();
    h.input.push("   ").await;
    h.input.push("/fast ").await;
    h.input.push_failure().await;

    assert_eq!(h.turn().await.abort_reason(), Some(&AbortReason::EmptyInput));
    assert_eq!(h.turn().await.abort_reason(), Some(&AbortReason::EmptyInput));
    assert_eq!(h.turn().await.abort_reason(), Some(&AbortReason::InputFailed));
    assert_eq!(h.turn().await.abort_reason(), Some(&AbortReason::InputClosed));
    assert!(h.sink.delivered().await.is_empty());
}

#[tokio::test]
#[traced_test]
async fn panicking_activation_aborts_turn() {
    let h = TestHarness::builder()
        .with_activation(MockActivation::panicking())
        .build()
        .await
        .unwrap();
    h.input.push("What time is it?").await;

    let assistant = h.assistant.clone();
    let session = h.session.clone();
    let turn = async move { assistant.process_turn(&session).await };
    let outcome = tokio::spawn(turn.in_current_span())
        .await
        .expect("the session task survives the panic")
        .unwrap();

    assert_eq!(outcome.abort_reason(), Some(&AbortReason::ActivationFailed));
    assert_eq!(h.input.remaining().await, 1, "input is not consumed");
    assert!(h.sink.delivered().await.is_empty());
    assert!(h.memory.stored().await.is_empty());
    assert!(logs_contain("activation source panicked"));
    assert!(logs_contain("stage=idle"));
}

#[tokio::test(start_paused = true)]
#[traced_test]
async fn panicking_input_skips_only_that_turn() {
    let h = TestHarness::builder().build().await.unwrap();
    h.input.push_panic().await;
    h.input.push("What time is it?").await;

    assert_eq!(h.turn().await.abort_reason(), Some(&AbortReason::InputFailed));
    assert!(logs_contain("input source panicked"));
    assert!(logs_contain("stage=activation_checked"));
    assert!(h.sink.delivered().await.is_empty());

    let report = h.say("Is it raining?").await;
    assert_eq!(report.query.text, "What time is it?");
    assert_eq!(h.memory.stored().await.len(), 1);
}

// --- Sessions and the driver ---

#[tokio::test]
async fn unknown_session_is_the_only_error() {
    let h = TestHarness::builder().build().await.unwrap();
    let err = h
        .assistant
        .process_turn(&SessionId::from("nobody"))
        .await
        .unwrap_err();
    assert!(matches!(err, TandemError::SessionNotFound(_)));
}

#[tokio::test(start_paused = true)]
async fn prior_turns_flow_into_the_next_prompt() {
    let h = TestHarness::builder().build().await.unwrap();

    h.say("What time is it?").await;
    let second = h.say("Is it raining?").await;

    assert_eq!(second.query.turn_index, 1);
    let prompts = h.local().prompts();
    assert!(!prompts[0].contains("Conversation so far"));
    assert!(prompts[1].contains("User: What time is it?\nAssistant: local answer"));
}

#[tokio::test(start_paused = true)]
async fn mode_prefix_overrides_routing() {
    let h = TestHarness::builder().build().await.unwrap();

    let report = h.say("/quality What time is it?").await;

    assert_eq!(report.decision.as_ref().unwrap().rule, RuleId::ForceApi);
    assert_eq!(h.api().prompts(), vec!["What time is it?"]);
}

#[tokio::test(start_paused = true)]
async fn per_turn_probe_picks_up_recovered_backend() {
    let h = TestHarness::builder()
        .configure(|c| c.orchestrator.probe_each_turn = true)
        .with_local(MockRuntime::local().unavailable())
        .build()
        .await
        .unwrap();

    let first = h.say("What time is it?").await;
    assert_eq!(first.decision.as_ref().unwrap().rule, RuleId::ForceApi);

    h.local().set_available(true);
    let second = h.say("What time is it?").await;
    assert_eq!(second.decision.as_ref().unwrap().rule, RuleId::TimeSensitive);
}

#[tokio::test(start_paused = true)]
async fn session_probes_lazily_without_startup_probe() {
    let h = TestHarness::builder()
        .without_startup_probe()
        .with_api(MockRuntime::api().unavailable())
        .build()
        .await
        .unwrap();

    let report = h.say(STORY).await;
    assert_eq!(report.decision.as_ref().unwrap().rule, RuleId::ForceLocal);
    assert_eq!(report.reply, "local answer");
}

#[tokio::test(start_paused = true)]
async fn run_loop_processes_turns_until_input_closes() {
    let h = TestHarness::builder().build().await.unwrap();
    for line in ["What time is it?", "   ", "Is it raining?"] {
        h.input.push(line).await;
    }

    let completed = h
        .assistant
        .run(&h.session, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(completed, 2);
    assert_eq!(h.sink.delivered().await.len(), 2);
}

#[tokio::test]
async fn run_loop_stops_on_cancel() {
    let h = TestHarness::builder().build().await.unwrap();
    h.input.push("What time is it?").await;
    let cancel = CancellationToken::new();
    cancel.cancel();

    let completed = h.assistant.run(&h.session, cancel).await.unwrap();
    assert_eq!(completed, 0);
    assert_eq!(h.input.remaining().await, 1);
}

#[tokio::test(start_paused = true)]
async fn cancel_mid_turn_still_delivers_and_stores() {
    let h = TestHarness::builder()
        .with_local(
            MockRuntime::local()
                .with_default(MockReply::delayed(Duration::from_secs(1), "local answer")),
        )
        .build()
        .await
        .unwrap();
    h.input.push("What time is it?").await;
    h.input.push("Is it raining?").await;

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(500)).await;
        trigger.cancel();
    });

    let completed = h.assistant.run(&h.session, cancel).await.unwrap();

    assert_eq!(completed, 1);
    assert_eq!(h.sink.delivered().await, vec!["local answer"]);
    assert_eq!(h.memory.stored().await.len(), 1);
    assert_eq!(h.input.remaining().await, 1, "no new turn starts after cancel");
}

/// Input that never produces an utterance.
struct SilentInput;

#[async_trait]
impl InputSource for SilentInput {
    async fn query_text(&self) -> Result<String, TandemError> {
        std::future::pending().await
    }
}

#[tokio::test(start_paused = true)]
async fn cancel_while_waiting_for_input_ends_the_loop() {
    let h = TestHarness::builder().build().await.unwrap();
    let quiet = SessionId::from("quiet");
    let sink = Arc::new(RecordingSink::new());
    h.assistant
        .register_session(
            quiet.clone(),
            Collaborators {
                activation: Arc::new(MockActivation::always()),
                input: Arc::new(SilentInput),
                output: sink.clone(),
                memory: Arc::new(MockMemory::new()),
            },
        )
        .await
        .unwrap();

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(30)).await;
        trigger.cancel();
    });

    let completed = h.assistant.run(&quiet, cancel).await.unwrap();
    assert_eq!(completed, 0);
    assert!(sink.delivered().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn run_with_reports_each_completed_turn() {
    let h = TestHarness::builder().build().await.unwrap();
    h.input.push("What time is it?").await;
    h.input.push_failure().await;
    h.input.push("Is it raining?").await;

    let mut rules = Vec::new();
    let completed = h
        .assistant
        .run_with(&h.session, CancellationToken::new(), |report| {
            rules.push(report.decision.as_ref().map(|d| d.rule));
        })
        .await
        .unwrap();

    assert_eq!(completed, 2);
    assert_eq!(rules.len(), 2);
    assert_eq!(rules[0], Some(RuleId::TimeSensitive));
}

#[tokio::test(start_paused = true)]
async fn sessions_run_independently() {
    let h = TestHarness::builder().build().await.unwrap();
    let other = SessionId::from("kitchen");
    let other_input = Arc::new(ScriptedInput::new(["Is it raining?"]));
    let other_sink = Arc::new(RecordingSink::new());
    let other_memory = Arc::new(MockMemory::new());
    h.assistant
        .register_session(
            other.clone(),
            Collaborators {
                activation: Arc::new(MockActivation::always()),
                input: other_input,
                output: other_sink.clone(),
                memory: other_memory.clone(),
            },
        )
        .await
        .unwrap();
    h.input.push("What time is it?").await;

    let (a, b) = tokio::join!(
        h.assistant.process_turn(&h.session),
        h.assistant.process_turn(&other)
    );

    assert!(matches!(a.unwrap(), TurnOutcome::Completed(_)));
    assert!(matches!(b.unwrap(), TurnOutcome::Completed(_)));
    assert_eq!(h.memory.stored().await.len(), 1);
    let stored = other_memory.stored().await;
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].0, other);
    assert_eq!(other_sink.delivered().await.len(), 1);
}

#[tokio::test]
async fn session_limit_is_enforced() {
    let h = TestHarness::builder()
        .configure(|c| c.agent.max_sessions = 1)
        .build()
        .await
        .unwrap();

    let err = h
        .assistant
        .register_session(
            SessionId::from("second"),
            Collaborators {
                activation: Arc::new(MockActivation::always()),
                input: Arc::new(ScriptedInput::default()),
                output: Arc::new(RecordingSink::new()),
                memory: Arc::new(MockMemory::new()),
            },
        )
        .await
        .unwrap_err();
    assert!(err.to_string().contains("session limit"));
    assert_eq!(h.assistant.session_count().await, 1);
}
