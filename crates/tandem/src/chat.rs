// SPDX-FileCopyrightText: 2026 Tandem Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `tandem chat` command implementation.
//!
//! Launches an interactive REPL backed by the full turn pipeline: the local
//! Ollama model and the Anthropic API, routed per message, with in-memory
//! conversation history. Creates a new session per invocation.

use std::sync::Arc;

use colored::Colorize;
use tandem_agent::{
    Assistant, Collaborators, InMemoryHistory, TurnReport, shutdown::install_signal_handler,
};
use tandem_backend::Backends;
use tandem_backend::runtime::{AnthropicRuntime, OllamaRuntime};
use tandem_config::TandemConfig;
use tandem_core::{ModelRuntime, SessionId, TandemError};
use tracing::{info, warn};

use crate::console::{AlwaysActive, ConsoleOutput, ReplInput};

/// Runs the `tandem chat` REPL until the user quits or a signal arrives.
pub async fn run_chat(config: TandemConfig, show_route: bool) -> Result<(), TandemError> {
    let backends = build_backends(&config)?;
    let assistant = Assistant::new(config.clone(), backends);

    let availability = assistant.probe_backends().await;
    println!("{}", "tandem chat".bold().green());
    println!(
        "local: {}  api: {}",
        status_label(availability.local),
        status_label(availability.api)
    );
    if !availability.local && !availability.api {
        eprintln!(
            "{}",
            "warning: no backend is reachable; replies will fall back to an apology".yellow()
        );
    }
    println!("Type {} to exit.\n", "/quit".yellow());

    let session_id = SessionId::generate();
    let input = ReplInput::spawn(format!("{}> ", "you".green()))?;
    assistant
        .register_session(
            session_id.clone(),
            Collaborators {
                activation: Arc::new(AlwaysActive),
                input: Arc::new(input),
                output: Arc::new(ConsoleOutput::new(config.agent.name.clone())),
                memory: Arc::new(InMemoryHistory::new(config.orchestrator.history_turns)),
            },
        )
        .await?;

    let cancel = install_signal_handler();
    let turns = assistant
        .run_with(&session_id, cancel.clone(), |report| {
            if show_route {
                println!("{}\n", route_summary(report).dimmed());
            }
        })
        .await?;

    cancel.cancel();
    assistant.remove_session(&session_id).await;
    info!(session_id = %session_id, turns, "chat ended");
    println!("{}", format!("{turns} turn(s)").dimmed());
    Ok(())
}

/// Build runtimes for the enabled backends. A missing API key disables the
/// API track rather than failing; having no track at all is an error.
pub fn build_backends(config: &TandemConfig) -> Result<Backends, TandemError> {
    let local: Option<Arc<dyn ModelRuntime>> = if config.local.enabled {
        Some(Arc::new(OllamaRuntime::from_config(&config.local)?))
    } else {
        info!("local backend disabled by configuration");
        None
    };

    let api: Option<Arc<dyn ModelRuntime>> = if config.api.enabled {
        match AnthropicRuntime::from_config(&config.api) {
            Ok(runtime) => Some(Arc::new(runtime)),
            Err(e) => {
                warn!(error = %e, "API backend unavailable, continuing local-only");
                eprintln!(
                    "{}: {e}. Set api.api_key or ANTHROPIC_API_KEY to enable the API track.",
                    "warning".yellow()
                );
                None
            }
        }
    } else {
        info!("API backend disabled by configuration");
        None
    };

    if local.is_none() && api.is_none() {
        return Err(TandemError::Config(
            "no backend enabled: enable [local] or configure [api]".to_string(),
        ));
    }
    Ok(Backends::from_runtimes(local, api, config))
}

fn status_label(up: bool) -> colored::ColoredString {
    if up { "up".green() } else { "down".red() }
}

/// One-line summary of how a turn was routed and answered.
fn route_summary(report: &TurnReport) -> String {
    let route = match &report.decision {
        Some(d) => format!("{} -> {}", d.rule, d.path),
        None => "unrouted".to_string(),
    };
    let strategy = match &report.response {
        Some(r) => r.strategy.to_string(),
        None => "fallback".to_string(),
    };
    format!("[{route}, {strategy}, {} ms]", report.elapsed.as_millis())
}
