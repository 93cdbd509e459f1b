// SPDX-FileCopyrightText: 2026 Tandem Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Terminal collaborators for `tandem chat`.
//!
//! The text REPL stands in for the voice pipeline: readline replaces speech
//! recognition, stdout replaces text-to-speech, and activation is always on.

use std::sync::mpsc;
use std::thread;

use async_trait::async_trait;
use colored::Colorize;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tandem_core::{ActivationSource, InputSource, OutputSink, TandemError};
use tokio::sync::oneshot;
use tracing::debug;

/// A typed REPL is always listening.
pub struct AlwaysActive;

#[async_trait]
impl ActivationSource for AlwaysActive {
    async fn is_active(&self) -> Result<bool, TandemError> {
        Ok(true)
    }
}

type LineReply = oneshot::Sender<Result<String, TandemError>>;

/// Reads lines with rustyline on a dedicated thread.
///
/// Each `query_text` call asks the thread for exactly one line, so the
/// prompt only appears once the previous reply has been printed. A terminal
/// error fails that one turn and closes the input.
pub struct ReplInput {
    requests: mpsc::Sender<LineReply>,
}

impl ReplInput {
    /// Starts the readline thread. Fails if the terminal cannot be set up.
    pub fn spawn(prompt: String) -> Result<Self, TandemError> {
        let (requests, incoming) = mpsc::channel::<LineReply>();
        let (ready_tx, ready_rx) = mpsc::sync_channel::<Result<(), String>>(1);

        thread::Builder::new()
            .name("tandem-readline".to_string())
            .spawn(move || {
                let mut editor = match DefaultEditor::new() {
                    Ok(editor) => {
                        let _ = ready_tx.send(Ok(()));
                        editor
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e.to_string()));
                        return;
                    }
                };
                // Ends when the ReplInput is dropped.
                while let Ok(reply) = incoming.recv() {
                    let line = read_line(&mut editor, &prompt);
                    let broken = matches!(line, Err(TandemError::Collaborator { .. }));
                    let _ = reply.send(line);
                    // Later reads see a closed input once the terminal has failed.
                    if broken {
                        break;
                    }
                }
            })
            .map_err(|e| TandemError::Internal(format!("failed to spawn readline thread: {e}")))?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self { requests }),
            Ok(Err(e)) => Err(TandemError::Internal(format!("failed to initialize readline: {e}"))),
            Err(_) => Err(TandemError::Internal("readline thread exited".to_string())),
        }
    }
}

fn read_line(editor: &mut DefaultEditor, prompt: &str) -> Result<String, TandemError> {
    match editor.readline(prompt) {
        Ok(line) => {
            let trimmed = line.trim();
            if trimmed == "/quit" || trimmed == "/exit" {
                return Err(TandemError::InputClosed);
            }
            if !trimmed.is_empty() {
                let _ = editor.add_history_entry(trimmed);
            }
            Ok(line)
        }
        // Ctrl+C and Ctrl+D both end the conversation.
        Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => Err(TandemError::InputClosed),
        Err(e) => Err(TandemError::Collaborator {
            collaborator: "readline",
            message: e.to_string(),
        }),
    }
}

#[async_trait]
impl InputSource for ReplInput {
    async fn query_text(&self) -> Result<String, TandemError> {
        let (reply, line) = oneshot::channel();
        if self.requests.send(reply).is_err() {
            return Err(TandemError::InputClosed);
        }
        line.await.unwrap_or(Err(TandemError::InputClosed))
    }
}

/// Prints replies to stdout under the assistant's name.
pub struct ConsoleOutput {
    name: String,
}

impl ConsoleOutput {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    fn format(&self, text: &str) -> String {
        format!("{}: {}\n", self.name.cyan().bold(), text.trim())
    }
}

#[async_trait]
impl OutputSink for ConsoleOutput {
    async fn deliver(&self, text: &str) -> Result<(), TandemError> {
        debug!(chars = text.len(), "printing reply");
        println!("{}", self.format(text));
        Ok(())
    }
}
