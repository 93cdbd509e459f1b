// SPDX-FileCopyrightText: 2026 Tandem Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Tandem integration tests.
//!
//! Provides mock runtimes, mock collaborators and test harness infrastructure
//! for fast, deterministic, CI-runnable tests without a model server or API.
//!
//! # Components
//!
//! - [`MockRuntime`] - Mock model runtime with scripted replies, delays and failures
//! - [`MockActivation`], [`ScriptedInput`], [`RecordingSink`], [`MockMemory`] - collaborators
//! - [`TestHarness`] - An assistant with one registered session, driven by `say()`

pub mod harness;
pub mod mock_io;
pub mod mock_runtime;

pub use harness::{TestHarness, TestHarnessBuilder};
pub use mock_io::{MockActivation, MockMemory, RecordingSink, ScriptedInput};
pub use mock_runtime::{MockFailure, MockReply, MockRuntime};
