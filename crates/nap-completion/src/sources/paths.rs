/// Filesystem entries for the path being typed before the cursor
///
/// A path token is the run of characters before the cursor up to whitespace
/// or a delimiter, and must contain a `/`. The directory part is resolved
/// against the root (`/...`), the home directory (`~/...`) or the configured
/// `cwd` (falling back to the process working directory), and its entries are
/// listed with `tokio::fs`. Dot entries are only offered when the typed
/// fragment starts with a dot.
use crate::error::{CompletionError, CompletionResult};
use crate::source::{CompletionStream, Manufacture, Source};
use crate::types::{Completion, Context, Seed};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

pub const NAME: &str = "paths";

const DELIMITERS: &[char] = &['"', '\'', '`', '(', ')', '[', ']', '{', '}', '<', '>', '=', ',', ';', ':'];

/// Entry point for the paths source
#[derive(Debug, Default, Clone, Copy)]
pub struct PathsFactory;

#[async_trait]
impl Manufacture for PathsFactory {
    async fn manufacture(&self, seed: Seed) -> CompletionResult<Arc<dyn Source>> {
        let cwd = seed.config.get("cwd").and_then(|cwd| cwd.as_str()).map(PathBuf::from);
        Ok(Arc::new(PathsSource { cwd }))
    }
}

pub struct PathsSource {
    cwd: Option<PathBuf>,
}

/// Directory part (including the trailing `/`) and fragment of a path token
fn split_token(line_before: &str) -> Option<(&str, &str)> {
    let start = line_before
        .char_indices()
        .rev()
        .find(|(_, c)| c.is_whitespace() || DELIMITERS.contains(c))
        .map(|(idx, c)| idx + c.len_utf8())
        .unwrap_or(0);
    let token = &line_before[start..];
    let slash = token.rfind('/')?;
    Some((&token[..=slash], &token[slash + 1..]))
}

impl PathsSource {
    fn resolve(&self, dir: &str) -> CompletionResult<PathBuf> {
        if dir.starts_with('/') {
            return Ok(PathBuf::from(dir));
        }

        if let Some(rest) = dir.strip_prefix("~/") {
            let home = std::env::var_os("HOME")
                .ok_or_else(|| CompletionError::NotFound("HOME is not set".to_string()))?;
            return Ok(PathBuf::from(home).join(rest));
        }

        let base = match &self.cwd {
            Some(cwd) => cwd.clone(),
            None => std::env::current_dir()?,
        };
        Ok(base.join(dir))
    }
}

async fn list(dir: PathBuf, show_hidden: bool) -> CompletionResult<Vec<Completion>> {
    let mut entries = match tokio::fs::read_dir(&dir).await {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            debug!(dir = %dir.display(), "Path completion directory does not exist");
            return Ok(Vec::new());
        }
        Err(err) => return Err(err.into()),
    };

    let mut completions = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') && !show_hidden {
            continue;
        }

        let is_dir = entry.file_type().await.map(|kind| kind.is_dir()).unwrap_or(false);
        let completion = if is_dir {
            let label = format!("{}/", name);
            Completion::new(name).with_label(label).with_kind("Folder")
        } else {
            Completion::new(name).with_kind("File")
        };
        completions.push(completion);
    }

    completions.sort_by(|a, b| a.text.cmp(&b.text));
    Ok(completions)
}

impl Source for PathsSource {
    fn complete(&self, context: &Context) -> CompletionStream {
        let Some((dir, fragment)) = split_token(&context.line_before) else {
            return stream::empty().boxed();
        };

        let dir = match self.resolve(dir) {
            Ok(dir) => dir,
            Err(err) => return stream::once(async move { Err(err) }).boxed(),
        };
        let show_hidden = fragment.starts_with('.');

        stream::once(async move {
            let items: Vec<CompletionResult<Completion>> = match list(dir, show_hidden).await {
                Ok(completions) => completions.into_iter().map(Ok).collect(),
                Err(err) => vec![Err(err)],
            };
            stream::iter(items)
        })
        .flatten()
        .boxed()
    }
}
