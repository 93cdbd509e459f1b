// SPDX-FileCopyrightText: 2026 Tandem Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `tandem route` command: analyze and route a query without calling a backend.

use std::fmt::Write as _;

use colored::Colorize;
use tandem_config::TandemConfig;
use tandem_core::{
    BackendAvailability, ConversationContext, Query, QueryFeatures, RoutingDecision, TandemError,
};
use tandem_router::{Router, routing_certainty};

/// Options for a routing dry run.
#[derive(Debug, Clone, Default)]
pub struct RouteOptions {
    pub prior_turns: usize,
    pub local_down: bool,
    pub api_down: bool,
    pub json: bool,
}

/// Run the analyzer and policy for `text` and print the result.
pub fn run_route(config: &TandemConfig, text: &str, options: &RouteOptions) -> Result<(), TandemError> {
    let (features, decision) = dry_run(config, text, options);
    if options.json {
        let value = serde_json::json!({
            "features": features,
            "decision": decision,
        });
        let rendered = serde_json::to_string_pretty(&value)
            .map_err(|e| TandemError::Internal(format!("failed to render JSON: {e}")))?;
        println!("{rendered}");
    } else {
        print!("{}", render(&features, &decision));
    }
    Ok(())
}

pub fn dry_run(
    config: &TandemConfig,
    text: &str,
    options: &RouteOptions,
) -> (QueryFeatures, RoutingDecision) {
    let router = Router::from_config(config);
    let turn_index = u32::try_from(options.prior_turns).unwrap_or(u32::MAX);
    let query = Query::new(text, turn_index);
    let context = ConversationContext {
        prior_turns: options.prior_turns,
        ..ConversationContext::empty()
    };
    let availability = BackendAvailability {
        local: !options.local_down,
        api: !options.api_down,
    };
    router.decide(&query, &context, availability)
}

fn render(features: &QueryFeatures, decision: &RoutingDecision) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", "features".bold());
    let _ = writeln!(out, "  complexity         {:.2}", features.complexity);
    let _ = writeln!(out, "  certainty          {:.2}", routing_certainty(features.complexity));
    let _ = writeln!(out, "  context dependency {:.2}", features.context_dependency);
    let _ = writeln!(out, "  time sensitivity   {:.2}", features.time_sensitivity);
    let _ = writeln!(out, "  mode hint          {}", features.mode_hint);
    let _ = writeln!(
        out,
        "  markers            reasoning={} creative={} multi_part={}",
        features.reasoning, features.creative, features.multi_part
    );
    let _ = writeln!(out, "  words              {}", features.word_count);
    let _ = writeln!(out, "  prior turns        {}", features.prior_turns);
    let _ = writeln!(out, "{}", "decision".bold());
    let _ = writeln!(out, "  rule               {}", decision.rule.to_string().green());
    let _ = writeln!(out, "  path               {}", decision.path.to_string().green());
    let _ = writeln!(out, "  confidence         {:.2}", decision.confidence);
    let _ = writeln!(out, "  local budget       {} ms", decision.local_timeout.as_millis());
    let _ = writeln!(out, "  api budget         {} ms", decision.api_timeout.as_millis());
    out
}
