/// Language server completions delivered out of band
///
/// The language server client runs outside this process. It pushes its latest
/// completion items through notifications addressed to this source; each
/// request replays the most recent batch and lets the matcher filter it.
///
/// Notification body: `[items]` where `items` is an array of serialized
/// [`Completion`]s. An empty body clears the batch.
use crate::error::{CompletionError, CompletionResult};
use crate::source::{CompletionStream, Manufacture, Source};
use crate::types::{Completion, Context, Seed};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde_json::Value;
use std::sync::{Arc, RwLock};
use tracing::debug;

pub const NAME: &str = "lsp";

/// Entry point for the lsp source
#[derive(Debug, Default, Clone, Copy)]
pub struct LspFactory;

#[async_trait]
impl Manufacture for LspFactory {
    async fn manufacture(&self, _seed: Seed) -> CompletionResult<Arc<dyn Source>> {
        Ok(Arc::new(LspSource::new()))
    }
}

/// Replays the whole batch; the merge engine caps it after scoring
#[derive(Default)]
pub struct LspSource {
    items: RwLock<Vec<Completion>>,
}

impl LspSource {
    pub fn new() -> Self {
        Self::default()
    }

    fn parse(body: Vec<Value>) -> CompletionResult<Vec<Completion>> {
        match body.into_iter().next() {
            None => Ok(Vec::new()),
            Some(items) => Ok(serde_json::from_value(items)?),
        }
    }
}

#[async_trait]
impl Source for LspSource {
    fn complete(&self, _context: &Context) -> CompletionStream {
        let items = match self.items.read() {
            Ok(items) => items.clone(),
            Err(_) => {
                let err = CompletionError::InternalError(
                    "Failed to acquire read lock on lsp items".to_string(),
                );
                return stream::once(async move { Err(err) }).boxed();
            }
        };

        stream::iter(items.into_iter().map(Ok)).boxed()
    }

    async fn notify(&self, body: Vec<Value>) -> CompletionResult<()> {
        let batch = Self::parse(body)?;
        debug!(count = batch.len(), "Received language server completions");

        let mut items = self.items.write().map_err(|_| {
            CompletionError::InternalError("Failed to acquire write lock on lsp items".to_string())
        })?;
        *items = batch;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::MatchOptions;
    use crate::types::Position;
    use serde_json::json;

    fn context() -> Context {
        Context::new(Position::new(0, 2), "rust", "pr", "", &MatchOptions::default())
    }

    async fn collect(source: &LspSource) -> Vec<String> {
        source
            .complete(&context())
            .map(|c| c.unwrap().text)
            .collect()
            .await
    }

    #[tokio::test]
    async fn test_empty_before_first_notification() {
        let source = LspSource::new();
        assert!(collect(&source).await.is_empty());
    }

    #[tokio::test]
    async fn test_notification_replaces_batch() {
        let source = LspSource::new();
        source
            .notify(vec![json!([{ "text": "println!" }, { "text": "print!", "kind": "Macro" }])])
            .await
            .unwrap();
        assert_eq!(collect(&source).await, vec!["println!", "print!"]);

        source.notify(vec![json!([{ "text": "process" }])]).await.unwrap();
        assert_eq!(collect(&source).await, vec!["process"]);

        source.notify(Vec::new()).await.unwrap();
        assert!(collect(&source).await.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_notification_is_an_error() {
        let source = LspSource::new();
        let result = source.notify(vec![json!({ "not": "a list" })]).await;
        assert!(matches!(result, Err(CompletionError::SerializationError(_))));
    }

    #[tokio::test]
    async fn test_seed_limit_does_not_cut_the_batch() {
        let seed = Seed {
            match_options: MatchOptions::default(),
            limit: Some(1),
            config: json!({}),
        };
        let source = LspFactory.manufacture(seed).await.unwrap();
        source
            .notify(vec![json!([{ "text": "alpha" }, { "text": "print" }])])
            .await
            .unwrap();

        let texts: Vec<String> = source
            .complete(&context())
            .map(|c| c.unwrap().text)
            .collect()
            .await;
        assert_eq!(texts, vec!["alpha", "print"]);
    }
}
