// SPDX-FileCopyrightText: 2026 Tandem Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that serde attributes cannot express:
//! weight and threshold ranges, non-zero budgets, and cross-section rules.

use crate::diagnostic::ConfigError;
use crate::model::TandemConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or every collected error
/// (does not fail fast).
pub fn validate_config(config: &TandemConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if !LOG_LEVELS.contains(&config.agent.log_level.as_str()) {
        errors.push(ConfigError::validation(format!(
            "agent.log_level must be one of {}, got `{}`",
            LOG_LEVELS.join(", "),
            config.agent.log_level
        )));
    }
    if config.agent.max_sessions == 0 {
        errors.push(ConfigError::validation("agent.max_sessions must be at least 1"));
    }

    let analyzer = &config.analyzer;
    for (key, weight) in analyzer.weights() {
        if !weight.is_finite() || weight < 0.0 {
            errors.push(ConfigError::validation(format!(
                "analyzer.{key} must be a non-negative number, got {weight}"
            )));
        }
    }
    for (key, value) in [
        ("length_norm_words", analyzer.length_norm_words),
        ("reasoning_saturation", analyzer.reasoning_saturation),
        ("anaphora_saturation", analyzer.anaphora_saturation),
        ("history_saturation_turns", analyzer.history_saturation_turns),
        ("urgency_saturation", analyzer.urgency_saturation),
        ("short_question_words", analyzer.short_question_words),
    ] {
        if value == 0 {
            errors.push(ConfigError::validation(format!(
                "analyzer.{key} must be at least 1"
            )));
        }
    }

    let policy = &config.policy;
    for (key, threshold) in policy.thresholds() {
        if !(0.0..=1.0).contains(&threshold) {
            errors.push(ConfigError::validation(format!(
                "policy.{key} must be within [0, 1], got {threshold}"
            )));
        }
    }
    if policy.local_timeout_ms == 0 {
        errors.push(ConfigError::validation("policy.local_timeout_ms must be greater than 0"));
    }
    if policy.api_timeout_ms == 0 {
        errors.push(ConfigError::validation("policy.api_timeout_ms must be greater than 0"));
    }
    if !policy.complexity_budget_scale.is_finite() || policy.complexity_budget_scale < 1.0 {
        errors.push(ConfigError::validation(format!(
            "policy.complexity_budget_scale must be at least 1.0, got {}",
            policy.complexity_budget_scale
        )));
    }

    if !config.local.enabled && !config.api.enabled {
        errors.push(ConfigError::validation(
            "at least one of local.enabled and api.enabled must be true",
        ));
    }
    if config.local.enabled && config.local.endpoint.trim().is_empty() {
        errors.push(ConfigError::validation("local.endpoint must not be empty"));
    }
    if config.local.max_concurrency == 0 {
        errors.push(ConfigError::validation("local.max_concurrency must be at least 1"));
    }

    if config.api.enabled && config.api.base_url.trim().is_empty() {
        errors.push(ConfigError::validation("api.base_url must not be empty"));
    }
    if config.api.api_version.trim().is_empty() {
        errors.push(ConfigError::validation("api.api_version must not be empty"));
    }
    if config.api.initial_backoff_ms > config.api.max_backoff_ms {
        errors.push(ConfigError::validation(format!(
            "api.initial_backoff_ms ({}) must not exceed api.max_backoff_ms ({})",
            config.api.initial_backoff_ms, config.api.max_backoff_ms
        )));
    }

    let integrator = &config.integrator;
    if !(0.0..=1.0).contains(&integrator.similarity_threshold) {
        errors.push(ConfigError::validation(format!(
            "integrator.similarity_threshold must be within [0, 1], got {}",
            integrator.similarity_threshold
        )));
    }
    if integrator.transition_phrases.is_empty() {
        errors.push(ConfigError::validation(
            "integrator.transition_phrases must contain at least one phrase",
        ));
    }
    for (i, phrase) in integrator.transition_phrases.iter().enumerate() {
        if phrase.trim().is_empty() {
            errors.push(ConfigError::validation(format!(
                "integrator.transition_phrases[{i}] must not be empty"
            )));
        }
    }

    let orchestrator = &config.orchestrator;
    if orchestrator.fallback_text.trim().is_empty() {
        errors.push(ConfigError::validation("orchestrator.fallback_text must not be empty"));
    }
    if orchestrator.collaborator_timeout_ms == 0 {
        errors.push(ConfigError::validation(
            "orchestrator.collaborator_timeout_ms must be greater than 0",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
