//! Host editor collaborators
//!
//! The orchestration core never talks to an editor directly. It reads the
//! cursor context through [`Editor`] and hands ranked results and accepted
//! edits to a [`CompletionSink`].

use crate::engine::MergeResult;
use crate::error::CompletionResult;
use crate::settings::MatchOptions;
use crate::types::{Context, Payload};
use async_trait::async_trait;

/// Read access to the live editor
#[async_trait]
pub trait Editor: Send + Sync {
    /// Snapshot of the cursor surroundings
    ///
    /// `match_options` decides which characters belong to the word prefix.
    async fn context(&self, match_options: &MatchOptions) -> CompletionResult<Context>;
}

/// Consumer of merge results and accepted edits
#[async_trait]
pub trait CompletionSink: Send + Sync {
    /// Render a ranked result
    ///
    /// Implementations must check that `result.position` still matches the
    /// live cursor before showing anything.
    async fn complete(&self, result: &MergeResult) -> CompletionResult<()>;

    /// Apply the edit for an accepted candidate
    async fn apply(&self, payload: Payload) -> CompletionResult<()>;
}
