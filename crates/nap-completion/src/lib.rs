/// NAP Completion
///
/// Asynchronous completion orchestration for text editors. The crate decides
/// when a completion request should run, fans it out to every configured
/// source concurrently, and merges what comes back into one ranked list.
///
/// # Architecture
///
/// 1. **State machine** ([`state`]): tells organic typing apart from text the
///    completion engine inserted itself
/// 2. **Scheduler** ([`scheduler`]): cancel-and-replace admission of requests,
///    so only the newest request is ever delivered
/// 3. **Merge engine** ([`engine`]): per-source tasks with their own deadlines,
///    fuzzy scoring, dedupe, per-source and global caps, ranking
/// 4. **Settings and factories** ([`settings`], [`registry`]): layered
///    configuration and the immutable source factory map built from it
/// 5. **Session** ([`session`]): one editor's event loop wiring the above
///    together, plus notification ingress for out-of-band sources
///
/// # Sources
///
/// A source implements [`Source`] and is built from its [`Seed`] by a
/// [`Manufacture`] entry point. Bundled sources live in [`sources`]; anything
/// else is resolved by name through a [`SourceLoader`]. A source that cannot
/// be resolved is simply absent.
///
/// # Example
///
/// ```ignore
/// use nap_completion::{FactoryRegistry, IntrinsicSources, NoopLoader, Session, Settings};
/// use std::collections::BTreeMap;
/// use std::sync::Arc;
///
/// let settings = Arc::new(Settings::initial(&[user_config])?);
/// let factories = Arc::new(FactoryRegistry::load(
///     &settings,
///     &IntrinsicSources::with_builtin_sources(),
///     &NoopLoader,
/// ));
/// let handle = Session::start(settings, factories, &BTreeMap::new(), editor, sink).await;
/// handle.send(EditorEvent::InsertEnter)?;
/// ```
pub mod cache;
pub mod engine;
pub mod error;
pub mod host;
pub mod logging;
pub mod matcher;
pub mod registry;
pub mod scheduler;
pub mod session;
pub mod settings;
pub mod source;
pub mod sources;
pub mod state;
pub mod types;

pub use cache::{CacheKey, CacheStats, ResultCache};
pub use engine::{rank_order, MergeEngine, MergeResult, SourceOutcome, SourceReport};
pub use error::{CompletionError, CompletionResult};
pub use host::{CompletionSink, Editor};
pub use logging::{init_logging, LogLevel};
pub use matcher::{normalize, FuzzyMatcher, MatchKind, MatchScore};
pub use registry::{
    assemble, load_engines, load_factories, EngineFactory, FactoryRegistry, IntrinsicSources,
    SourceFactory,
};
pub use scheduler::{schedule, signal_channel, Delivery, GenOptions, Signal, SignalSender};
pub use session::{EditorEvent, Session, SessionHandle};
pub use settings::{
    CacheOptions, CacheSpec, ConfigFormat, DisplayOptions, MatchOptions, Settings,
    SnippetEngineSpec, SourceSpec, DEFAULT_RANK,
};
pub use source::{
    CompletionStream, Manufacture, NoopLoader, SnippetEngine, SnippetManufacture, Source,
    SourceLoader,
};
pub use state::State;
pub use types::*;
