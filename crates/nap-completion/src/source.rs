//! Source capability traits
//!
//! A source is manufactured once per session from its [`Seed`] and then asked
//! for a fresh [`CompletionStream`] on every request. Streams may yield any
//! number of completions and may be abandoned at the source's deadline.

use crate::error::CompletionResult;
use crate::types::{Completion, Context, Payload, Seed, SnippetSeed};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// Completions of one source for one request, in the source's emission order
pub type CompletionStream = futures::stream::BoxStream<'static, CompletionResult<Completion>>;

/// A live completion source
#[async_trait]
pub trait Source: Send + Sync {
    /// Start producing completions for `context`
    ///
    /// The stream is polled from a spawned task and must own everything it needs.
    fn complete(&self, context: &Context) -> CompletionStream;

    /// Receive an out-of-band notification addressed to this source
    async fn notify(&self, _body: Vec<Value>) -> CompletionResult<()> {
        Ok(())
    }
}

/// Entry point that turns a seed into a live [`Source`]
#[async_trait]
pub trait Manufacture: Send + Sync {
    async fn manufacture(&self, seed: Seed) -> CompletionResult<Arc<dyn Source>>;
}

#[async_trait]
impl<F> Manufacture for F
where
    F: Fn(Seed) -> CompletionResult<Arc<dyn Source>> + Send + Sync,
{
    async fn manufacture(&self, seed: Seed) -> CompletionResult<Arc<dyn Source>> {
        self(seed)
    }
}

/// Expands accepted snippet completions into edits
pub trait SnippetEngine: Send + Sync {
    fn expand(&self, completion: &Completion, context: &Context) -> CompletionResult<Payload>;
}

/// Entry point that turns a seed into a [`SnippetEngine`]
pub trait SnippetManufacture: Send + Sync {
    fn manufacture(&self, seed: SnippetSeed) -> CompletionResult<Arc<dyn SnippetEngine>>;
}

/// Resolves externally configured entry points by name
///
/// Resolution failure is reported as `None`; the caller omits the entry.
pub trait SourceLoader: Send + Sync {
    fn load(&self, main: &str) -> Option<Arc<dyn Manufacture>>;

    fn load_engine(&self, _main: &str) -> Option<Arc<dyn SnippetManufacture>> {
        None
    }
}

/// Loader that resolves nothing; only intrinsic sources are available
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopLoader;

impl SourceLoader for NoopLoader {
    fn load(&self, _main: &str) -> Option<Arc<dyn Manufacture>> {
        None
    }
}
