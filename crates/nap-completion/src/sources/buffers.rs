/// Words indexed from the editor's open buffers
///
/// The host pushes buffer contents through notifications addressed to this
/// source, so no editor API is needed at request time.
///
/// Notification body: `[buffer, text]` indexes (or re-indexes) `buffer`;
/// `[buffer]` or `[buffer, null]` forgets it.
use crate::error::{CompletionError, CompletionResult};
use crate::settings::MatchOptions;
use crate::source::{CompletionStream, Manufacture, Source};
use crate::types::{Completion, Context, Seed};
use async_trait::async_trait;
use dashmap::DashMap;
use futures::stream::{self, StreamExt};
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

pub const NAME: &str = "buffers";

/// Entry point for the buffers source
#[derive(Debug, Default, Clone, Copy)]
pub struct BuffersFactory;

#[async_trait]
impl Manufacture for BuffersFactory {
    async fn manufacture(&self, seed: Seed) -> CompletionResult<Arc<dyn Source>> {
        Ok(Arc::new(BuffersSource::new(seed.match_options)))
    }
}

pub struct BuffersSource {
    match_options: MatchOptions,
    words: DashMap<String, Vec<String>>,
}

impl BuffersSource {
    pub fn new(match_options: MatchOptions) -> Self {
        Self {
            match_options,
            words: DashMap::new(),
        }
    }

    fn index(&self, text: &str) -> Vec<String> {
        let is_word = |c: char| c.is_alphanumeric() || self.match_options.unifying_chars.contains(&c);
        let unique: BTreeSet<&str> = text.split(|c: char| !is_word(c)).filter(|w| !w.is_empty()).collect();
        unique.into_iter().map(str::to_string).collect()
    }

    /// Number of buffers currently indexed
    pub fn buffer_count(&self) -> usize {
        self.words.len()
    }
}

#[async_trait]
impl Source for BuffersSource {
    fn complete(&self, context: &Context) -> CompletionStream {
        let mut words = BTreeSet::new();
        for entry in self.words.iter() {
            words.extend(entry.value().iter().filter(|w| **w != context.prefix).cloned());
        }
        stream::iter(words.into_iter().map(|word| Ok(Completion::new(word).with_kind("Text")))).boxed()
    }

    async fn notify(&self, body: Vec<Value>) -> CompletionResult<()> {
        let mut body = body.into_iter();
        let buffer = match body.next() {
            Some(Value::String(buffer)) => buffer,
            Some(Value::Number(buffer)) => buffer.to_string(),
            other => {
                return Err(CompletionError::ConfigError(format!(
                    "buffers notification needs a buffer id, got {:?}",
                    other
                )))
            }
        };

        match body.next() {
            Some(Value::String(text)) => {
                let words = self.index(&text);
                debug!(buffer = %buffer, words = words.len(), "Indexed buffer");
                self.words.insert(buffer, words);
            }
            None | Some(Value::Null) => {
                self.words.remove(&buffer);
            }
            Some(other) => {
                return Err(CompletionError::ConfigError(format!(
                    "buffers notification text must be a string, got {}",
                    other
                )))
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Position;
    use serde_json::json;

    fn context(prefix: &str) -> Context {
        Context::new(Position::new(0, prefix.len()), "rust", prefix, "", &MatchOptions::default())
    }

    async fn collect(source: &BuffersSource, prefix: &str) -> Vec<String> {
        source
            .complete(&context(prefix))
            .map(|c| c.unwrap().text)
            .collect()
            .await
    }

    #[tokio::test]
    async fn test_words_from_every_buffer() {
        let source = BuffersSource::new(MatchOptions::default());
        assert!(collect(&source, "pri").await.is_empty());

        source.notify(vec![json!("a.rs"), json!("fn print_all() { pri }")]).await.unwrap();
        source.notify(vec![json!(7), json!("private primary print_all")]).await.unwrap();

        assert_eq!(source.buffer_count(), 2);
        assert_eq!(
            collect(&source, "pri").await,
            vec!["fn", "primary", "print_all", "private"]
        );
    }

    #[tokio::test]
    async fn test_reindex_and_forget() {
        let source = BuffersSource::new(MatchOptions::default());
        source.notify(vec![json!("a.rs"), json!("alpha")]).await.unwrap();
        source.notify(vec![json!("a.rs"), json!("beta")]).await.unwrap();
        assert_eq!(collect(&source, "").await, vec!["beta"]);

        source.notify(vec![json!("a.rs")]).await.unwrap();
        assert!(collect(&source, "").await.is_empty());
        assert_eq!(source.buffer_count(), 0);
    }

    #[tokio::test]
    async fn test_malformed_notification_is_rejected() {
        let source = BuffersSource::new(MatchOptions::default());
        assert!(source.notify(Vec::new()).await.is_err());
        assert!(source.notify(vec![json!("a.rs"), json!(3)]).await.is_err());
    }
}
