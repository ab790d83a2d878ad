/// Words found in the buffer lines surrounding the cursor
use crate::error::CompletionResult;
use crate::settings::MatchOptions;
use crate::source::{CompletionStream, Manufacture, Source};
use crate::types::{Completion, Context, Seed};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::collections::BTreeSet;
use std::sync::Arc;

pub const NAME: &str = "around";

/// Lines scanned on each side of the cursor when the config omits `span`
const DEFAULT_SPAN: usize = 20;

/// Entry point for the around source
#[derive(Debug, Default, Clone, Copy)]
pub struct AroundFactory;

#[async_trait]
impl Manufacture for AroundFactory {
    async fn manufacture(&self, seed: Seed) -> CompletionResult<Arc<dyn Source>> {
        let span = seed
            .config
            .get("span")
            .and_then(|span| span.as_u64())
            .map(|span| span as usize)
            .unwrap_or(DEFAULT_SPAN);

        Ok(Arc::new(AroundSource {
            span,
            match_options: seed.match_options,
        }))
    }
}

pub struct AroundSource {
    span: usize,
    match_options: MatchOptions,
}

impl AroundSource {
    fn words(&self, context: &Context) -> Vec<String> {
        let row = context.position.row;
        let first = row.saturating_sub(self.span);
        let last = row.saturating_add(self.span);
        let is_word = |c: char| c.is_alphanumeric() || self.match_options.unifying_chars.contains(&c);

        let mut seen = BTreeSet::new();
        let mut words = Vec::new();
        for (offset, line) in context.lines.iter().enumerate() {
            let line_row = context.lines_start + offset;
            if line_row < first || line_row > last {
                continue;
            }

            for word in line.split(|c: char| !is_word(c)) {
                // the fragment being typed is not a useful suggestion
                if word.is_empty() || word == context.prefix {
                    continue;
                }
                if seen.insert(word) {
                    words.push(word.to_string());
                }
            }
        }
        words
    }
}

impl Source for AroundSource {
    fn complete(&self, context: &Context) -> CompletionStream {
        let words = self.words(context);
        stream::iter(words.into_iter().map(|word| Ok(Completion::new(word).with_kind("Text")))).boxed()
    }
}
