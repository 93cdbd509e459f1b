// SPDX-FileCopyrightText: 2026 Tandem Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the Tandem configuration system.

use std::io::Write;

use tandem_config::diagnostic::ConfigError;
use tandem_config::model::{SimilarityMethod, TandemConfig};
use tandem_config::{load_and_validate_path, load_and_validate_str, load_config_from_str};

/// Valid TOML with fields from every section deserializes successfully.
#[test]
fn valid_toml_deserializes_into_tandem_config() {
    let toml = r#"
[agent]
name = "kitchen-speaker"
log_level = "debug"

[analyzer]
length_norm_words = 60
complexity_reasoning_weight = 0.5

[policy]
local_timeout_ms = 3000
api_timeout_ms = 20000
ambiguity_threshold = 0.3

[local]
endpoint = "http://10.0.0.2:11434"
model = "qwen2.5:7b"
max_concurrency = 2

[api]
api_key = "sk-ant-123"
max_retries = 4

[integrator]
similarity = "jaccard"
similarity_threshold = 0.5
transition_phrases = ["More detail:"]

[orchestrator]
fallback_on_error = false
history_turns = 10
"#;

    let config = load_config_from_str(toml).expect("valid TOML should deserialize");
    assert_eq!(config.agent.name, "kitchen-speaker");
    assert_eq!(config.agent.log_level, "debug");
    assert_eq!(config.analyzer.length_norm_words, 60);
    assert_eq!(config.analyzer.complexity_reasoning_weight, 0.5);
    assert_eq!(config.policy.local_timeout_ms, 3000);
    assert_eq!(config.policy.api_timeout_ms, 20000);
    assert_eq!(config.policy.ambiguity_threshold, 0.3);
    assert_eq!(config.local.endpoint, "http://10.0.0.2:11434");
    assert_eq!(config.local.model, "qwen2.5:7b");
    assert_eq!(config.local.max_concurrency, 2);
    assert_eq!(config.api.api_key.as_deref(), Some("sk-ant-123"));
    assert_eq!(config.api.max_retries, 4);
    assert_eq!(config.integrator.similarity, SimilarityMethod::Jaccard);
    assert_eq!(config.integrator.transition_phrases, vec!["More detail:"]);
    assert!(!config.orchestrator.fallback_on_error);
    assert_eq!(config.orchestrator.history_turns, 10);
}

/// Missing optional sections use defaults without error.
#[test]
fn missing_optional_sections_use_defaults() {
    let config = load_config_from_str("").expect("empty TOML should use defaults");

    assert_eq!(config.agent.name, "tandem");
    assert_eq!(config.agent.log_level, "info");
    assert_eq!(config.policy.local_timeout_ms, 5_000);
    assert_eq!(config.policy.api_timeout_ms, 30_000);
    assert_eq!(config.policy.high_complexity_threshold, 0.6);
    assert_eq!(config.policy.follow_up_min_turns, 2);
    assert!(config.local.enabled);
    assert_eq!(config.local.max_concurrency, 1);
    assert!(config.api.enabled);
    assert!(config.api.api_key.is_none());
    assert_eq!(config.api.api_version, "2023-06-01");
    assert_eq!(config.integrator.similarity, SimilarityMethod::Dice);
    assert!(!config.integrator.synthesize);
    assert!(config.orchestrator.fallback_on_error);
    assert!(!config.orchestrator.probe_each_turn);
}

/// Unknown field in [policy] produces an UnknownField error.
#[test]
fn unknown_field_in_policy_produces_error() {
    let toml = r#"
[policy]
local_timout_ms = 100
"#;

    let err = load_config_from_str(toml).expect_err("should reject unknown field");
    let err_str = format!("{err}");
    assert!(
        err_str.contains("unknown field") || err_str.contains("local_timout_ms"),
        "error should mention unknown field or the bad key, got: {err_str}"
    );
}

/// Unexpected top-level section is rejected by deny_unknown_fields.
#[test]
fn deny_unknown_fields_at_top_level() {
    let toml = r#"
[telegram]
bot_token = "x"
"#;

    let err = load_config_from_str(toml).expect_err("unknown top-level section should be rejected");
    let err_str = format!("{err}");
    assert!(
        err_str.contains("unknown field") || err_str.contains("telegram"),
        "error should mention unknown field, got: {err_str}"
    );
}

/// Dotted overrides (the shape `TANDEM_API_MAX_RETRIES` maps to) win over TOML.
#[test]
fn dotted_override_wins_over_toml() {
    use figment::{
        Figment,
        providers::{Format, Serialized, Toml},
    };

    let config: TandemConfig = Figment::new()
        .merge(Serialized::defaults(TandemConfig::default()))
        .merge(Toml::string("[api]\nmax_retries = 1\n"))
        .merge(("api.max_retries", 7))
        .extract()
        .expect("should merge override");

    assert_eq!(config.api.max_retries, 7);
}

/// Unknown key "naem" in [agent] is reported with a suggestion and valid keys.
#[test]
fn diagnostic_error_includes_suggestion_and_valid_keys() {
    let toml = r#"
[agent]
naem = "test"
"#;

    let errors = load_and_validate_str(toml).expect_err("should produce errors");
    let found = errors.iter().any(|e| {
        matches!(e, ConfigError::UnknownKey { key, suggestion, valid_keys, .. } if {
            key == "naem"
                && suggestion.as_deref() == Some("name")
                && valid_keys.contains("log_level")
        })
    });
    assert!(found, "expected UnknownKey for 'naem', got: {errors:?}");
}

/// Invalid type (string where number expected) produces an InvalidType diagnostic.
#[test]
fn diagnostic_invalid_type() {
    let toml = r#"
[local]
max_concurrency = "many"
"#;

    let errors = load_and_validate_str(toml).expect_err("should reject invalid type");
    assert!(
        errors
            .iter()
            .any(|e| matches!(e, ConfigError::InvalidType { .. } | ConfigError::Other(_))),
        "got: {errors:?}"
    );
}

/// ConfigError renders through miette's graphical handler.
#[test]
fn config_error_renders_with_miette() {
    use miette::{Diagnostic, GraphicalReportHandler};

    let error = ConfigError::UnknownKey {
        key: "naem".to_string(),
        suggestion: Some("name".to_string()),
        valid_keys: "name, log_level, max_sessions".to_string(),
        span: None,
        src: None,
    };

    assert!(error.code().is_some());
    let help = error.help().expect("should have help text").to_string();
    assert!(help.contains("did you mean `name`"), "got: {help}");

    let mut buf = String::new();
    GraphicalReportHandler::new()
        .render_report(&mut buf, &error)
        .expect("should render without error");
    assert!(buf.contains("naem"));
}

/// Semantic validation runs after a successful parse.
#[test]
fn validation_catches_disabled_backends() {
    let toml = r#"
[local]
enabled = false

[api]
enabled = false
"#;

    let errors = load_and_validate_str(toml).expect_err("no backend should fail");
    assert!(errors.iter().any(|e| {
        matches!(e, ConfigError::Validation { message } if message.contains("api.enabled"))
    }));
}

/// Validation catches an out-of-range similarity threshold.
#[test]
fn validation_catches_similarity_threshold() {
    let toml = r#"
[integrator]
similarity_threshold = 2.0
"#;

    let errors = load_and_validate_str(toml).expect_err("threshold above 1 should fail");
    assert!(errors.iter().any(|e| {
        matches!(e, ConfigError::Validation { message } if message.contains("similarity_threshold"))
    }));
}

/// An explicit file path loads and validates.
#[test]
fn load_and_validate_from_file() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    writeln!(file, "[orchestrator]\nprobe_each_turn = true").expect("write");

    let config = load_and_validate_path(file.path()).expect("file config should validate");
    assert!(config.orchestrator.probe_each_turn);
}
