// SPDX-FileCopyrightText: 2026 Tandem Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Pluggable text similarity used to decide whether two answers agree.

use std::collections::HashSet;
use std::sync::Arc;

use tandem_config::SimilarityMethod;

/// Scores how much two answers agree, in `[0, 1]`.
pub trait Similarity: Send + Sync {
    fn score(&self, a: &str, b: &str) -> f32;
}

impl<F> Similarity for F
where
    F: Fn(&str, &str) -> f32 + Send + Sync,
{
    fn score(&self, a: &str, b: &str) -> f32 {
        self(a, b)
    }
}

/// Sørensen–Dice coefficient over character bigrams of the lowercased texts.
pub fn dice(a: &str, b: &str) -> f32 {
    strsim::sorensen_dice(&a.to_lowercase(), &b.to_lowercase()) as f32
}

/// Jaccard index over lowercase alphanumeric word tokens.
pub fn jaccard(a: &str, b: &str) -> f32 {
    let a = tokens(a);
    let b = tokens(b);
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let shared = a.intersection(&b).count();
    let total = a.union(&b).count();
    shared as f32 / total as f32
}

fn tokens(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// The built-in scorer for a configured method.
pub fn for_method(method: SimilarityMethod) -> Arc<dyn Similarity> {
    match method {
        SimilarityMethod::Dice => Arc::new(dice),
        SimilarityMethod::Jaccard => Arc::new(jaccard),
    }
}
