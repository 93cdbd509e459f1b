// SPDX-FileCopyrightText: 2026 Tandem Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tandem - a dual-track assistant that answers each turn with a fast local
//! model, a cloud API, or both.
//!
//! This is the binary entry point.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod chat;
mod console;
mod route;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use colored::Colorize;
use tandem_config::{ConfigError, TandemConfig};
use tandem_core::TandemError;

use crate::route::RouteOptions;

/// Tandem - route every turn between a local model and a cloud API.
#[derive(Parser, Debug)]
#[command(name = "tandem", version, about, long_about = None)]
struct Cli {
    /// Configuration file to load instead of the standard search path.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start an interactive chat session (the default).
    Chat {
        /// Print the routing rule, path and merge strategy after each reply.
        #[arg(long)]
        show_route: bool,
    },
    /// Show how a query would be routed, without calling any backend.
    Route {
        /// The query text.
        #[arg(required = true)]
        text: Vec<String>,
        /// Number of earlier turns in the conversation.
        #[arg(long, default_value_t = 0)]
        prior_turns: usize,
        /// Treat the local backend as unavailable.
        #[arg(long)]
        local_down: bool,
        /// Treat the API backend as unavailable.
        #[arg(long)]
        api_down: bool,
        /// Print features and decision as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Validate configuration and report any problems.
    Config {
        /// Print the effective configuration as TOML.
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(errors) => {
            tandem_config::render_errors(&errors);
            std::process::exit(1);
        }
    };
    init_tracing(&config.agent.log_level);

    let command = cli.command.unwrap_or(Commands::Chat { show_route: false });
    let result = match command {
        Commands::Chat { show_route } => chat::run_chat(config, show_route).await,
        Commands::Route {
            text,
            prior_turns,
            local_down,
            api_down,
            json,
        } => {
            let options = RouteOptions {
                prior_turns,
                local_down,
                api_down,
                json,
            };
            route::run_route(&config, &text.join(" "), &options)
        }
        Commands::Config { show } => show_config(&config, show),
    };

    if let Err(e) = result {
        eprintln!("{}: {e}", "error".red());
        std::process::exit(1);
    }
}

fn load_config(path: Option<&std::path::Path>) -> Result<TandemConfig, Vec<ConfigError>> {
    match path {
        Some(path) => tandem_config::load_and_validate_path(path),
        None => tandem_config::load_and_validate(),
    }
}

fn show_config(config: &TandemConfig, show: bool) -> Result<(), TandemError> {
    println!(
        "{} (agent.name={}, local={}, api={})",
        "config ok".green(),
        config.agent.name,
        config.local.enabled,
        config.api.enabled
    );
    if show {
        let mut shown = config.clone();
        if shown.api.api_key.is_some() {
            shown.api.api_key = Some("<redacted>".to_string());
        }
        let rendered = toml::to_string_pretty(&shown)
            .map_err(|e| TandemError::Internal(format!("failed to render config: {e}")))?;
        println!("\n{rendered}");
    }
    Ok(())
}

/// Initialize the tracing subscriber with an env filter.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("tandem={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_names(false)
        .init();
}
