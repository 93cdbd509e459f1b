// SPDX-FileCopyrightText: 2026 Tandem Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Heuristic query analysis.
//!
//! Scores a query's complexity, context dependency and time sensitivity from
//! its text and the conversation history. No model pre-call, no network, no
//! hidden state: the same inputs always produce the same features.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use tandem_config::AnalyzerConfig;
use tandem_core::{ConversationContext, ModeHint, Query, QueryFeatures};

// -- Regex patterns compiled once via LazyLock --

static REASONING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:analy[sz]e|compare|contrast|explain why|explain how|evaluate|design|derive|prove|trade-?offs?|pros and cons|step by step|implications?|critique|assess|justify|why does|why do)\b",
    )
    .unwrap()
});

static CREATIVE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:write|compose|draft|tell)\b[^.?!]{0,60}?\b(?:story|stories|poem|poems|essay|song|lyrics|haiku|limerick|fable|tale|script|sonnet)\b",
    )
    .unwrap()
});

static LIST_ITEM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*(?:\d+[.)]|[-*•])\s+").unwrap());

static CONJOINED_REQUEST_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:and also|as well as|additionally)\b").unwrap());

// Longer markers first so "the other one" is not split into "the other".
static ANAPHORA_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:the other one|the other|the same|the previous|the last one|what about|how about|that one|this one|it|its|that|this|those|these|they|them|he|she|him|her|there|earlier)\b",
    )
    .unwrap()
});

static URGENCY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:right now|at the moment|quick(?:ly)?|now|asap|urgent(?:ly)?|immediately|hurry|fast|currently|today|tonight)\b",
    )
    .unwrap()
});

static SHORT_FACTUAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?:what|who|when|where|which|how (?:many|much|old|far|long))\b").unwrap()
});

static FAST_HINT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:quick answer|short answer|in a word|tl;?dr|keep it short|just briefly)\b")
        .unwrap()
});

static QUALITY_HINT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:be thorough|thoroughly|in depth|in detail|detailed answer|take your time)\b")
        .unwrap()
});

/// Heuristic query analyzer with zero cost and zero latency.
#[derive(Debug, Clone, Default)]
pub struct QueryAnalyzer {
    config: AnalyzerConfig,
}

impl QueryAnalyzer {
    /// Create an analyzer with the given scoring weights.
    pub fn new(config: AnalyzerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Derive routing features for `query` given the conversation so far.
    ///
    /// An explicit mode hint (a `/fast ` or `/quality ` prefix, or a phrase such
    /// as "in detail") short-circuits scoring: the three scores stay at zero.
    pub fn analyze(&self, query: &Query, context: &ConversationContext) -> QueryFeatures {
        let (prefix_hint, text) = ModeHint::parse_prefix(&query.text);
        let text = text.trim();
        let word_count = text.split_whitespace().count();
        let prior_turns = context.prior_turns.max(query.turn_index as usize);

        let mode_hint = prefix_hint.unwrap_or_else(|| Self::phrase_hint(text));
        if mode_hint != ModeHint::None {
            return QueryFeatures {
                mode_hint,
                word_count,
                prior_turns,
                ..QueryFeatures::default()
            };
        }

        let cfg = &self.config;
        let length = ratio(word_count, cfg.length_norm_words);

        // Complexity
        let reasoning_hits = distinct_matches(&REASONING_RE, text);
        let multi_part = Self::is_multi_part(text);
        let creative = CREATIVE_RE.is_match(text);
        let complexity = unit(
            cfg.complexity_length_weight * length
                + cfg.complexity_reasoning_weight * ratio(reasoning_hits, cfg.reasoning_saturation)
                + cfg.complexity_multi_part_weight * flag(multi_part)
                + cfg.complexity_creative_weight * flag(creative),
        );

        // Context dependency: nothing to refer back to without a prior turn.
        let context_dependency = if prior_turns == 0 {
            0.0
        } else {
            let anaphora = distinct_matches(&ANAPHORA_RE, text);
            unit(
                cfg.context_anaphora_weight * ratio(anaphora, cfg.anaphora_saturation)
                    + cfg.context_history_weight
                        * ratio(prior_turns, cfg.history_saturation_turns),
            )
        };

        // Time sensitivity
        let urgency = distinct_matches(&URGENCY_RE, text);
        let short_factual = word_count <= cfg.short_question_words
            && text.ends_with('?')
            && SHORT_FACTUAL_RE.is_match(text);
        let time_sensitivity = unit(
            cfg.time_urgency_weight * ratio(urgency, cfg.urgency_saturation)
                + cfg.time_factual_weight * flag(short_factual)
                + cfg.time_brevity_weight * (1.0 - length),
        );

        QueryFeatures {
            complexity,
            context_dependency,
            time_sensitivity,
            mode_hint,
            reasoning: reasoning_hits > 0,
            creative,
            multi_part,
            word_count,
            prior_turns,
        }
    }

    fn phrase_hint(text: &str) -> ModeHint {
        if QUALITY_HINT_RE.is_match(text) {
            ModeHint::Quality
        } else if FAST_HINT_RE.is_match(text) {
            ModeHint::Fast
        } else {
            ModeHint::None
        }
    }

    fn is_multi_part(text: &str) -> bool {
        text.matches('?').count() >= 2
            || text.contains(';')
            || LIST_ITEM_RE.find_iter(text).count() >= 2
            || CONJOINED_REQUEST_RE.is_match(text)
    }
}

/// Number of distinct (case-insensitive) pattern matches in `text`.
fn distinct_matches(re: &Regex, text: &str) -> usize {
    re.find_iter(text)
        .map(|m| m.as_str().to_lowercase())
        .collect::<HashSet<_>>()
        .len()
}

/// `count / saturation`, capped at 1.
fn ratio(count: usize, saturation: usize) -> f32 {
    if saturation == 0 {
        return if count > 0 { 1.0 } else { 0.0 };
    }
    (count as f32 / saturation as f32).min(1.0)
}

fn flag(b: bool) -> f32 {
    if b { 1.0 } else { 0.0 }
}

/// Clamp to `[0, 1]`, mapping NaN to 0.
fn unit(x: f32) -> f32 {
    if x.is_nan() { 0.0 } else { x.clamp(0.0, 1.0) }
}
