// SPDX-FileCopyrightText: 2026 Tandem Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Query analysis and dual-track routing for the Tandem assistant.
//!
//! This crate provides:
//! - [`QueryAnalyzer`]: heuristic feature extraction (zero-cost, zero-latency)
//! - [`RoutingPolicy`]: ordered rule table choosing LOCAL, API or PARALLEL
//!
//! Both are pure and synchronous; the orchestrator calls them once per turn.

pub mod analyzer;
pub mod policy;

pub use analyzer::QueryAnalyzer;
pub use policy::{RULES, Rule, RuleInput, RoutingPolicy, route, routing_certainty};

use tandem_config::TandemConfig;
use tandem_core::{BackendAvailability, ConversationContext, Query, QueryFeatures, RoutingDecision};

/// Analyzer and policy bundled for callers that need both.
#[derive(Debug, Clone, Default)]
pub struct Router {
    analyzer: QueryAnalyzer,
    policy: RoutingPolicy,
}

impl Router {
    pub fn new(analyzer: QueryAnalyzer, policy: RoutingPolicy) -> Self {
        Self { analyzer, policy }
    }

    pub fn from_config(config: &TandemConfig) -> Self {
        Self::new(
            QueryAnalyzer::new(config.analyzer.clone()),
            RoutingPolicy::new(config.policy.clone()),
        )
    }

    /// Analyze and route in one step.
    pub fn decide(
        &self,
        query: &Query,
        context: &ConversationContext,
        availability: BackendAvailability,
    ) -> (QueryFeatures, RoutingDecision) {
        let features = self.analyzer.analyze(query, context);
        let decision = self.policy.route(&features, availability);
        (features, decision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tandem_core::{RoutePath, RuleId};

    fn decide(text: &str, prior_turns: usize) -> RoutingDecision {
        let context = ConversationContext {
            prior_turns,
            ..ConversationContext::empty()
        };
        Router::default()
            .decide(
                &Query::new(text, prior_turns as u32),
                &context,
                BackendAvailability::ALL,
            )
            .1
    }

    #[test]
    fn time_question_routes_local() {
        let d = decide("What time is it?", 0);
        assert_eq!(d.rule, RuleId::TimeSensitive);
        assert_eq!(d.path, RoutePath::Local);
    }

    #[test]
    fn story_request_routes_api() {
        let d = decide("Write a 300-word story about a lighthouse", 0);
        assert_eq!(d.rule, RuleId::HighComplexity);
        assert_eq!(d.path, RoutePath::Api);
    }

    #[test]
    fn follow_up_after_five_turns_routes_parallel() {
        let d = decide("What about the other one?", 5);
        assert_eq!(d.rule, RuleId::ContextFollowUp);
        assert_eq!(d.path, RoutePath::Parallel);
    }

    #[test]
    fn mid_complexity_question_is_hedged() {
        let d = decide(
            "Can you explain why my sourdough bread keeps collapsing and compare it with yeast bread",
            0,
        );
        assert_eq!(d.rule, RuleId::AmbiguousHedge);
        assert_eq!(d.path, RoutePath::Parallel);
    }

    #[test]
    fn local_down_forces_api_for_everything() {
        let router = Router::default();
        let availability = BackendAvailability {
            local: false,
            api: true,
        };
        for text in ["What time is it?", "hi", "What about the other one?"] {
            let (_, d) = router.decide(&Query::new(text, 3), &ConversationContext::empty(), availability);
            assert_eq!(d.rule, RuleId::ForceApi, "text: {text}");
        }
    }

    proptest! {
        #[test]
        fn routing_is_deterministic(
            complexity in 0.0f32..=1.0,
            context in 0.0f32..=1.0,
            time in 0.0f32..=1.0,
            prior_turns in 0usize..10,
            local in any::<bool>(),
            api in any::<bool>(),
        ) {
            let features = QueryFeatures {
                complexity,
                context_dependency: context,
                time_sensitivity: time,
                prior_turns,
                ..QueryFeatures::default()
            };
            let availability = BackendAvailability { local, api };
            let config = tandem_config::PolicyConfig::default();
            let a = route(&features, availability, &config);
            let b = route(&features, availability, &config);
            prop_assert_eq!(&a, &b);
            prop_assert!((0.0..=1.0).contains(&a.confidence));
            prop_assert!(a.join_deadline() >= config.local_timeout());
        }

        #[test]
        fn analysis_is_idempotent(text in "[a-zA-Z ?;,.]{0,120}", turns in 0u32..8) {
            let analyzer = QueryAnalyzer::default();
            let query = Query::new(text, turns);
            let context = ConversationContext::empty();
            let first = analyzer.analyze(&query, &context);
            let second = analyzer.analyze(&query, &context);
            prop_assert_eq!(&first, &second);
            prop_assert!((0.0..=1.0).contains(&first.complexity));
            prop_assert!((0.0..=1.0).contains(&first.context_dependency));
            prop_assert!((0.0..=1.0).contains(&first.time_sensitivity));
        }
    }
}
