// SPDX-FileCopyrightText: 2026 Tandem Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Tandem assistant.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Top-level Tandem configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TandemConfig {
    /// Assistant identity and process settings.
    #[serde(default)]
    pub agent: AgentConfig,

    /// Query analyzer scoring weights.
    #[serde(default)]
    pub analyzer: AnalyzerConfig,

    /// Routing policy thresholds and timeout budgets.
    #[serde(default)]
    pub policy: PolicyConfig,

    /// Local model runtime settings.
    #[serde(default)]
    pub local: LocalConfig,

    /// Cloud model API settings.
    #[serde(default)]
    pub api: ApiConfig,

    /// Response integration settings.
    #[serde(default)]
    pub integrator: IntegratorConfig,

    /// Turn orchestration settings.
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
}

/// Assistant identity and process configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    /// Display name of the assistant.
    #[serde(default = "default_agent_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Maximum number of concurrently registered sessions.
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            log_level: default_log_level(),
            max_sessions: default_max_sessions(),
        }
    }
}

fn default_agent_name() -> String {
    "tandem".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_sessions() -> usize {
    16
}

/// Weights and normalizers for the heuristic query analyzer.
///
/// Each score is a weighted sum of signals in `[0, 1]`, clamped to `[0, 1]`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AnalyzerConfig {
    /// Word count at which the length signal saturates.
    #[serde(default = "default_length_norm_words")]
    pub length_norm_words: usize,

    #[serde(default = "default_complexity_length_weight")]
    pub complexity_length_weight: f32,

    #[serde(default = "default_complexity_reasoning_weight")]
    pub complexity_reasoning_weight: f32,

    /// Reasoning keyword count at which the reasoning signal saturates.
    #[serde(default = "default_reasoning_saturation")]
    pub reasoning_saturation: usize,

    #[serde(default = "default_complexity_multi_part_weight")]
    pub complexity_multi_part_weight: f32,

    #[serde(default = "default_complexity_creative_weight")]
    pub complexity_creative_weight: f32,

    #[serde(default = "default_context_anaphora_weight")]
    pub context_anaphora_weight: f32,

    /// Anaphora marker count at which the anaphora signal saturates.
    #[serde(default = "default_anaphora_saturation")]
    pub anaphora_saturation: usize,

    #[serde(default = "default_context_history_weight")]
    pub context_history_weight: f32,

    /// Prior turn count at which the history signal saturates.
    #[serde(default = "default_history_saturation_turns")]
    pub history_saturation_turns: usize,

    #[serde(default = "default_time_urgency_weight")]
    pub time_urgency_weight: f32,

    /// Urgency marker count at which the urgency signal saturates.
    #[serde(default = "default_urgency_saturation")]
    pub urgency_saturation: usize,

    #[serde(default = "default_time_factual_weight")]
    pub time_factual_weight: f32,

    #[serde(default = "default_time_brevity_weight")]
    pub time_brevity_weight: f32,

    /// Maximum word count for the short factual question pattern.
    #[serde(default = "default_short_question_words")]
    pub short_question_words: usize,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            length_norm_words: default_length_norm_words(),
            complexity_length_weight: default_complexity_length_weight(),
            complexity_reasoning_weight: default_complexity_reasoning_weight(),
            reasoning_saturation: default_reasoning_saturation(),
            complexity_multi_part_weight: default_complexity_multi_part_weight(),
            complexity_creative_weight: default_complexity_creative_weight(),
            context_anaphora_weight: default_context_anaphora_weight(),
            anaphora_saturation: default_anaphora_saturation(),
            context_history_weight: default_context_history_weight(),
            history_saturation_turns: default_history_saturation_turns(),
            time_urgency_weight: default_time_urgency_weight(),
            urgency_saturation: default_urgency_saturation(),
            time_factual_weight: default_time_factual_weight(),
            time_brevity_weight: default_time_brevity_weight(),
            short_question_words: default_short_question_words(),
        }
    }
}

impl AnalyzerConfig {
    /// All weights paired with their key names, for validation.
    pub fn weights(&self) -> [(&'static str, f32); 9] {
        [
            ("complexity_length_weight", self.complexity_length_weight),
            ("complexity_reasoning_weight", self.complexity_reasoning_weight),
            ("complexity_multi_part_weight", self.complexity_multi_part_weight),
            ("complexity_creative_weight", self.complexity_creative_weight),
            ("context_anaphora_weight", self.context_anaphora_weight),
            ("context_history_weight", self.context_history_weight),
            ("time_urgency_weight", self.time_urgency_weight),
            ("time_factual_weight", self.time_factual_weight),
            ("time_brevity_weight", self.time_brevity_weight),
        ]
    }
}

fn default_length_norm_words() -> usize {
    40
}

fn default_complexity_length_weight() -> f32 {
    0.25
}

fn default_complexity_reasoning_weight() -> f32 {
    0.45
}

fn default_reasoning_saturation() -> usize {
    2
}

fn default_complexity_multi_part_weight() -> f32 {
    0.2
}

fn default_complexity_creative_weight() -> f32 {
    0.6
}

fn default_context_anaphora_weight() -> f32 {
    0.7
}

fn default_anaphora_saturation() -> usize {
    2
}

fn default_context_history_weight() -> f32 {
    0.3
}

fn default_history_saturation_turns() -> usize {
    3
}

fn default_time_urgency_weight() -> f32 {
    0.5
}

fn default_urgency_saturation() -> usize {
    1
}

fn default_time_factual_weight() -> f32 {
    0.4
}

fn default_time_brevity_weight() -> f32 {
    0.3
}

fn default_short_question_words() -> usize {
    8
}

/// Routing policy thresholds and per-path timeout budgets.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyConfig {
    /// Complexity at or above which a query goes to the API.
    #[serde(default = "default_high_complexity_threshold")]
    pub high_complexity_threshold: f32,

    /// Context dependency at or above which a follow-up is hedged.
    #[serde(default = "default_context_threshold")]
    pub context_threshold: f32,

    /// A follow-up needs strictly more prior turns than this.
    #[serde(default = "default_follow_up_min_turns")]
    pub follow_up_min_turns: usize,

    #[serde(default = "default_time_sensitivity_threshold")]
    pub time_sensitivity_threshold: f32,

    /// Time-sensitive queries stay local only below this complexity.
    #[serde(default = "default_low_complexity_threshold")]
    pub low_complexity_threshold: f32,

    /// Routing certainty below which a query is hedged across both tracks.
    #[serde(default = "default_ambiguity_threshold")]
    pub ambiguity_threshold: f32,

    #[serde(default = "default_local_timeout_ms")]
    pub local_timeout_ms: u64,

    #[serde(default = "default_api_timeout_ms")]
    pub api_timeout_ms: u64,

    /// Multiplier applied to both budgets for high-complexity queries.
    #[serde(default = "default_complexity_budget_scale")]
    pub complexity_budget_scale: f32,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            high_complexity_threshold: default_high_complexity_threshold(),
            context_threshold: default_context_threshold(),
            follow_up_min_turns: default_follow_up_min_turns(),
            time_sensitivity_threshold: default_time_sensitivity_threshold(),
            low_complexity_threshold: default_low_complexity_threshold(),
            ambiguity_threshold: default_ambiguity_threshold(),
            local_timeout_ms: default_local_timeout_ms(),
            api_timeout_ms: default_api_timeout_ms(),
            complexity_budget_scale: default_complexity_budget_scale(),
        }
    }
}

impl PolicyConfig {
    pub fn local_timeout(&self) -> Duration {
        Duration::from_millis(self.local_timeout_ms)
    }

    pub fn api_timeout(&self) -> Duration {
        Duration::from_millis(self.api_timeout_ms)
    }

    /// All `[0, 1]` thresholds paired with their key names.
    pub fn thresholds(&self) -> [(&'static str, f32); 5] {
        [
            ("high_complexity_threshold", self.high_complexity_threshold),
            ("context_threshold", self.context_threshold),
            ("time_sensitivity_threshold", self.time_sensitivity_threshold),
            ("low_complexity_threshold", self.low_complexity_threshold),
            ("ambiguity_threshold", self.ambiguity_threshold),
        ]
    }
}

fn default_high_complexity_threshold() -> f32 {
    0.6
}

fn default_context_threshold() -> f32 {
    0.5
}

fn default_follow_up_min_turns() -> usize {
    2
}

fn default_time_sensitivity_threshold() -> f32 {
    0.6
}

fn default_low_complexity_threshold() -> f32 {
    0.4
}

fn default_ambiguity_threshold() -> f32 {
    0.4
}

fn default_local_timeout_ms() -> u64 {
    5_000
}

fn default_api_timeout_ms() -> u64 {
    30_000
}

fn default_complexity_budget_scale() -> f32 {
    1.5
}

/// Local model runtime configuration (Ollama-compatible server).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LocalConfig {
    /// Whether the local track may be used at all.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Base URL of the local model server.
    #[serde(default = "default_local_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_local_model")]
    pub model: String,

    /// Number of local calls allowed to run at once; the rest queue.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// How long a timed-out call may take to observe cancellation before it is aborted.
    #[serde(default = "default_cancel_grace_ms")]
    pub cancel_grace_ms: u64,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: default_local_endpoint(),
            model: default_local_model(),
            max_concurrency: default_max_concurrency(),
            cancel_grace_ms: default_cancel_grace_ms(),
        }
    }
}

impl LocalConfig {
    pub fn cancel_grace(&self) -> Duration {
        Duration::from_millis(self.cancel_grace_ms)
    }
}

fn default_true() -> bool {
    true
}

fn default_local_endpoint() -> String {
    "http://localhost:11434".to_string()
}

fn default_local_model() -> String {
    "llama3.2:3b".to_string()
}

fn default_max_concurrency() -> usize {
    1
}

fn default_cancel_grace_ms() -> u64 {
    250
}

/// Cloud model API configuration (Anthropic Messages API).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ApiConfig {
    /// Whether the API track may be used at all.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// API key. `None` falls back to the `ANTHROPIC_API_KEY` environment variable.
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_api_model")]
    pub model: String,

    #[serde(default = "default_api_version")]
    pub api_version: String,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Retries after the first attempt for transient failures.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_key: None,
            base_url: default_base_url(),
            model: default_api_model(),
            api_version: default_api_version(),
            max_tokens: default_max_tokens(),
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

impl ApiConfig {
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }
}

fn default_base_url() -> String {
    "https://api.anthropic.com".to_string()
}

fn default_api_model() -> String {
    "claude-sonnet-4-20250514".to_string()
}

fn default_api_version() -> String {
    "2023-06-01".to_string()
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_max_retries() -> u32 {
    2
}

fn default_initial_backoff_ms() -> u64 {
    500
}

fn default_max_backoff_ms() -> u64 {
    4_000
}

/// Text similarity method used to compare parallel outputs.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Display, EnumString, Deserialize, Serialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SimilarityMethod {
    /// Sørensen–Dice coefficient over character bigrams.
    #[default]
    Dice,
    /// Jaccard index over lowercase word tokens.
    Jaccard,
}

/// Response integration configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct IntegratorConfig {
    #[serde(default)]
    pub similarity: SimilarityMethod,

    /// Similarity at or above which the API text alone is used.
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,

    /// Prefix placed before the preliminary local answer in a merged reply.
    #[serde(default = "default_preliminary_prefix")]
    pub preliminary_prefix: String,

    /// Phrases bridging the local and API answers. One is chosen per query.
    #[serde(default = "default_transition_phrases")]
    pub transition_phrases: Vec<String>,

    /// Ask the API track to merge long divergent replies into one.
    #[serde(default)]
    pub synthesize: bool,

    /// Merged replies longer than this are synthesized when enabled.
    #[serde(default = "default_max_merged_chars")]
    pub max_merged_chars: usize,
}

impl Default for IntegratorConfig {
    fn default() -> Self {
        Self {
            similarity: SimilarityMethod::default(),
            similarity_threshold: default_similarity_threshold(),
            preliminary_prefix: default_preliminary_prefix(),
            transition_phrases: default_transition_phrases(),
            synthesize: false,
            max_merged_chars: default_max_merged_chars(),
        }
    }
}

fn default_similarity_threshold() -> f32 {
    0.6
}

fn default_preliminary_prefix() -> String {
    "Quick answer: ".to_string()
}

fn default_transition_phrases() -> Vec<String> {
    vec![
        "Here's a more complete answer:".to_string(),
        "Looking at this more carefully:".to_string(),
        "To expand on that:".to_string(),
    ]
}

fn default_max_merged_chars() -> usize {
    1_200
}

/// Turn orchestration configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct OrchestratorConfig {
    /// Reply delivered when no backend produced usable text.
    #[serde(default = "default_fallback_text")]
    pub fallback_text: String,

    /// Upper bound on every activation, memory and output call.
    #[serde(default = "default_collaborator_timeout_ms")]
    pub collaborator_timeout_ms: u64,

    /// How long the join waits for cancelled tracks to wind down.
    #[serde(default = "default_join_grace_ms")]
    pub join_grace_ms: u64,

    /// Run the other track when the only selected track fails with an error.
    #[serde(default = "default_true")]
    pub fallback_on_error: bool,

    /// Re-probe backend availability at the start of every turn.
    #[serde(default)]
    pub probe_each_turn: bool,

    /// Prior turns kept by the built-in in-memory history.
    #[serde(default = "default_history_turns")]
    pub history_turns: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            fallback_text: default_fallback_text(),
            collaborator_timeout_ms: default_collaborator_timeout_ms(),
            join_grace_ms: default_join_grace_ms(),
            fallback_on_error: true,
            probe_each_turn: false,
            history_turns: default_history_turns(),
        }
    }
}

impl OrchestratorConfig {
    pub fn collaborator_timeout(&self) -> Duration {
        Duration::from_millis(self.collaborator_timeout_ms)
    }

    pub fn join_grace(&self) -> Duration {
        Duration::from_millis(self.join_grace_ms)
    }
}

fn default_fallback_text() -> String {
    "Sorry, I couldn't come up with an answer just now. Please try again.".to_string()
}

fn default_collaborator_timeout_ms() -> u64 {
    3_000
}

fn default_join_grace_ms() -> u64 {
    250
}

fn default_history_turns() -> usize {
    6
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_helpers_use_millis() {
        let config = TandemConfig::default();
        assert_eq!(config.policy.local_timeout(), Duration::from_secs(5));
        assert_eq!(config.policy.api_timeout(), Duration::from_secs(30));
        assert_eq!(config.local.cancel_grace(), Duration::from_millis(250));
        assert_eq!(config.orchestrator.join_grace(), Duration::from_millis(250));
    }

    #[test]
    fn similarity_method_parses_lowercase() {
        use std::str::FromStr;
        assert_eq!(
            SimilarityMethod::from_str("jaccard").unwrap(),
            SimilarityMethod::Jaccard
        );
        assert_eq!(SimilarityMethod::Dice.to_string(), "dice");
    }
}
