// SPDX-FileCopyrightText: 2026 Tandem Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Dual-track routing policy.
//!
//! Maps query features and backend availability to a [`RoutingDecision`]
//! through an ordered, first-match rule table. Rules are plain data so the
//! table can be inspected, logged and tested on its own.

use std::time::Duration;

use tandem_config::PolicyConfig;
use tandem_core::{
    BackendAvailability, ModeHint, QueryFeatures, RoutePath, RoutingDecision, RuleId,
};
use tracing::info;

/// Inputs every rule predicate sees.
#[derive(Debug, Clone, Copy)]
pub struct RuleInput<'a> {
    pub features: &'a QueryFeatures,
    pub availability: BackendAvailability,
    pub config: &'a PolicyConfig,
}

/// One entry of the rule table.
#[derive(Clone, Copy)]
pub struct Rule {
    pub id: RuleId,
    pub path: RoutePath,
    pub confidence: f32,
    pub matches: fn(&RuleInput<'_>) -> bool,
}

/// The routing rules in evaluation order. The last rule always matches.
pub static RULES: [Rule; 7] = [
    Rule {
        id: RuleId::ForceLocal,
        path: RoutePath::Local,
        confidence: 1.0,
        matches: |i| i.features.mode_hint == ModeHint::Fast || !i.availability.api,
    },
    Rule {
        id: RuleId::ForceApi,
        path: RoutePath::Api,
        confidence: 1.0,
        matches: |i| i.features.mode_hint == ModeHint::Quality || !i.availability.local,
    },
    Rule {
        id: RuleId::HighComplexity,
        path: RoutePath::Api,
        confidence: 0.85,
        matches: |i| {
            i.features.complexity >= i.config.high_complexity_threshold || i.features.creative
        },
    },
    Rule {
        id: RuleId::ContextFollowUp,
        path: RoutePath::Parallel,
        confidence: 0.7,
        matches: |i| {
            i.features.context_dependency >= i.config.context_threshold
                && i.features.prior_turns > i.config.follow_up_min_turns
        },
    },
    Rule {
        id: RuleId::TimeSensitive,
        path: RoutePath::Local,
        confidence: 0.8,
        matches: |i| {
            i.features.time_sensitivity >= i.config.time_sensitivity_threshold
                && i.features.complexity < i.config.low_complexity_threshold
        },
    },
    Rule {
        id: RuleId::AmbiguousHedge,
        path: RoutePath::Parallel,
        confidence: 0.5,
        matches: |i| routing_certainty(i.features.complexity) < i.config.ambiguity_threshold,
    },
    Rule {
        id: RuleId::DefaultLocal,
        path: RoutePath::Local,
        confidence: 0.6,
        matches: |_| true,
    },
];

/// How far complexity sits from the LOCAL/API midpoint, in `[0, 1]`.
///
/// 1.0 means the query is clearly simple or clearly hard; 0.0 means it sits
/// exactly on the fence.
pub fn routing_certainty(complexity: f32) -> f32 {
    ((complexity - 0.5).abs() / 0.5).clamp(0.0, 1.0)
}

/// Route a query with an explicit policy configuration.
pub fn route(
    features: &QueryFeatures,
    availability: BackendAvailability,
    config: &PolicyConfig,
) -> RoutingDecision {
    let input = RuleInput {
        features,
        availability,
        config,
    };
    let rule = RULES
        .iter()
        .find(|r| (r.matches)(&input))
        .unwrap_or(&RULES[RULES.len() - 1]);

    let (local_timeout, api_timeout) = budgets(features, config);
    let decision = RoutingDecision {
        path: rule.path,
        confidence: rule.confidence,
        rule: rule.id,
        local_timeout,
        api_timeout,
    };

    info!(
        rule = %decision.rule,
        path = %decision.path,
        confidence = decision.confidence,
        complexity = features.complexity,
        context_dependency = features.context_dependency,
        time_sensitivity = features.time_sensitivity,
        "routing decision"
    );

    decision
}

/// Per-path timeout budgets, stretched for high-complexity queries.
fn budgets(features: &QueryFeatures, config: &PolicyConfig) -> (Duration, Duration) {
    let local = config.local_timeout();
    let api = config.api_timeout();
    if features.complexity >= config.high_complexity_threshold || features.creative {
        let scale = config.complexity_budget_scale.max(1.0);
        (local.mul_f32(scale), api.mul_f32(scale))
    } else {
        (local, api)
    }
}

/// Routing policy bound to one configuration.
#[derive(Debug, Clone, Default)]
pub struct RoutingPolicy {
    config: PolicyConfig,
}

impl RoutingPolicy {
    pub fn new(config: PolicyConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }

    pub fn route(
        &self,
        features: &QueryFeatures,
        availability: BackendAvailability,
    ) -> RoutingDecision {
        route(features, availability, &self.config)
    }
}
