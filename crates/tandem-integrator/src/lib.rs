// SPDX-FileCopyrightText: 2026 Tandem Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Response integration for the Tandem assistant.
//!
//! Turns the per-track [`BackendResult`]s of one turn into a single
//! [`IntegratedResponse`]:
//! - one usable result: [`MergeStrategy::Single`]
//! - two agreeing results: [`MergeStrategy::Single`] with the API text
//! - two diverging results: [`MergeStrategy::TransitionMerged`], local text
//!   first as a preliminary answer, then a transition phrase, then the API text
//!
//! Integration never invents text: zero usable results is an error.

pub mod similarity;

use std::collections::HashMap;
use std::sync::Arc;

pub use similarity::{Similarity, dice, jaccard};

use tandem_config::IntegratorConfig;
use tandem_core::{
    BackendResult, IntegratedResponse, MergeStrategy, RoutingDecision, Source, TandemError,
};
use tracing::debug;

/// Outcome of integrating one turn's results.
#[derive(Debug, Clone, PartialEq)]
pub enum Integration {
    /// A reply ready to dispatch.
    Ready(IntegratedResponse),
    /// The merged reply is too long; ask the API track to merge both answers.
    /// `fallback` is the transition-merged reply to use if that fails.
    Synthesize {
        instruction: String,
        fallback: IntegratedResponse,
    },
}

impl Integration {
    /// The reply to use without further backend work.
    pub fn into_response(self) -> IntegratedResponse {
        match self {
            Integration::Ready(response) => response,
            Integration::Synthesize { fallback, .. } => fallback,
        }
    }
}

/// Combines backend outputs into one reply.
#[derive(Clone)]
pub struct ResponseIntegrator {
    config: IntegratorConfig,
    similarity: Arc<dyn Similarity>,
}

impl std::fmt::Debug for ResponseIntegrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseIntegrator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Default for ResponseIntegrator {
    fn default() -> Self {
        Self::new(IntegratorConfig::default())
    }
}

impl ResponseIntegrator {
    /// Create an integrator using the configured built-in similarity.
    pub fn new(config: IntegratorConfig) -> Self {
        let similarity = similarity::for_method(config.similarity);
        Self { config, similarity }
    }

    /// Replace the similarity scorer.
    pub fn with_similarity(mut self, similarity: Arc<dyn Similarity>) -> Self {
        self.similarity = similarity;
        self
    }

    pub fn config(&self) -> &IntegratorConfig {
        &self.config
    }

    /// Integrate the results of one turn.
    ///
    /// Returns [`TandemError::Integration`] when no result is usable.
    pub fn integrate(
        &self,
        decision: &RoutingDecision,
        results: &HashMap<Source, BackendResult>,
    ) -> Result<Integration, TandemError> {
        let local = results.get(&Source::Local).filter(|r| r.is_usable());
        let api = results.get(&Source::Api).filter(|r| r.is_usable());

        match (local, api) {
            (None, None) => {
                let detail = results
                    .values()
                    .map(|r| format!("{}={}", r.source, r.status))
                    .collect::<Vec<_>>()
                    .join(", ");
                Err(TandemError::Integration(format!(
                    "no usable backend result for {} path ({detail})",
                    decision.path
                )))
            }
            (Some(only), None) | (None, Some(only)) => Ok(Integration::Ready(single(only, None))),
            (Some(local), Some(api)) => Ok(self.compare(local, api)),
        }
    }

    fn compare(&self, local: &BackendResult, api: &BackendResult) -> Integration {
        let score = self.similarity.score(local.text.trim(), api.text.trim());
        let score = if score.is_nan() { 0.0 } else { score.clamp(0.0, 1.0) };
        debug!(
            similarity = score,
            threshold = self.config.similarity_threshold,
            "comparing track outputs"
        );

        if score >= self.config.similarity_threshold {
            return Integration::Ready(single(api, Some(score)));
        }

        let merged = IntegratedResponse {
            text: self.transition_merge(&local.text, &api.text),
            strategy: MergeStrategy::TransitionMerged,
            sources: vec![Source::Local, Source::Api],
            similarity: Some(score),
        };

        if self.config.synthesize && merged.text.chars().count() > self.config.max_merged_chars {
            Integration::Synthesize {
                instruction: synthesis_instruction(&local.text, &api.text),
                fallback: merged,
            }
        } else {
            Integration::Ready(merged)
        }
    }

    /// Preliminary local answer, a transition phrase, then the API answer.
    fn transition_merge(&self, local: &str, api: &str) -> String {
        let local = local.trim();
        let api = api.trim();
        match self.transition_phrase(local) {
            Some(phrase) => format!("{}{local}\n\n{phrase} {api}", self.config.preliminary_prefix),
            None => format!("{}{local}\n\n{api}", self.config.preliminary_prefix),
        }
    }

    /// Same local text, same phrase.
    fn transition_phrase(&self, key: &str) -> Option<&str> {
        let phrases = &self.config.transition_phrases;
        if phrases.is_empty() {
            return None;
        }
        let index = key
            .bytes()
            .fold(0usize, |acc, b| acc.wrapping_mul(31).wrapping_add(b as usize));
        Some(phrases[index % phrases.len()].as_str())
    }

    /// Wrap a synthesized API answer as the turn's reply.
    pub fn synthesized(&self, text: String, similarity: Option<f32>) -> IntegratedResponse {
        IntegratedResponse {
            text: text.trim().to_string(),
            strategy: MergeStrategy::Synthesized,
            sources: vec![Source::Local, Source::Api],
            similarity,
        }
    }
}

fn single(result: &BackendResult, similarity: Option<f32>) -> IntegratedResponse {
    IntegratedResponse {
        text: result.text.trim().to_string(),
        strategy: MergeStrategy::Single,
        sources: vec![result.source],
        similarity,
    }
}

/// Instruction asking a model to merge two draft answers into one.
pub fn synthesis_instruction(local: &str, api: &str) -> String {
    format!(
        "Two draft answers to the user's latest message follow. Merge them into one concise, \
         consistent reply. Prefer the second draft where they disagree.\n\n\
         Draft 1:\n{}\n\nDraft 2:\n{}",
        local.trim(),
        api.trim()
    )
}
