// SPDX-FileCopyrightText: 2026 Tandem Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Tandem assistant.
//!
//! This crate provides the data model, error type and collaborator traits
//! shared by the router, backend controllers, integrator and orchestrator.
//! External collaborators (activation, speech input, memory, model runtimes,
//! output) implement the traits defined here.

pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::TandemError;
pub use types::{
    BackendAvailability, BackendResult, BackendStatus, ConversationContext, InferenceRequest,
    IntegratedResponse, MergeStrategy, ModeHint, Query, QueryFeatures, RoutePath,
    RoutingDecision, RuleId, SessionId, Source,
};

pub use traits::{
    ActivationSource, InputSource, MemoryProvider, ModelRuntime, OutputSink, TextStream,
};
