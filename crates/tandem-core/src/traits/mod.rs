// SPDX-FileCopyrightText: 2026 Tandem Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Collaborator trait definitions.
//!
//! All traits use `#[async_trait]` so they can be held as `Arc<dyn Trait>`.

pub mod io;
pub mod memory;
pub mod runtime;

pub use io::{ActivationSource, InputSource, OutputSink};
pub use memory::MemoryProvider;
pub use runtime::{ModelRuntime, TextStream};
