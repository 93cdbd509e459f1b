// SPDX-FileCopyrightText: 2026 Tandem Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Model runtime trait implemented by every backend provider (local or cloud).

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::error::TandemError;
use crate::types::{InferenceRequest, Source};

/// A stream of generated text fragments.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String, TandemError>> + Send>>;

/// A language model behind the common inference contract.
///
/// New providers are new implementations of this trait tagged with the
/// [`Source`] track they serve, never ad hoc branches in the controllers.
#[async_trait]
pub trait ModelRuntime: Send + Sync + 'static {
    /// Human-readable name of this runtime instance.
    fn name(&self) -> &str;

    /// The track this runtime serves.
    fn source(&self) -> Source;

    /// Cheap reachability probe used at startup.
    async fn is_available(&self) -> bool;

    /// Generates the full reply text.
    async fn infer(&self, request: InferenceRequest) -> Result<String, TandemError>;

    /// Generates the reply as incremental fragments.
    ///
    /// The default implementation yields the result of [`infer`](Self::infer)
    /// as a single fragment.
    async fn stream(&self, request: InferenceRequest) -> Result<TextStream, TandemError> {
        let text = self.infer(request).await?;
        Ok(Box::pin(futures::stream::once(async move { Ok(text) })))
    }
}
