/// Source fan-out and merge engine
///
/// One merge runs per admitted request:
///
/// 1. **Selection**: enabled sources, narrowed to the request's source set
/// 2. **Fan-out**: each source streams completions from its own task,
///    bounded by the source timeout (falling back to the global one)
/// 3. **Scoring**: completions are normalized and scored as they arrive
/// 4. **Ranking**: once every source finished, failed or hit its deadline,
///    results are deduplicated, capped per source, sorted and capped globally
///
/// A merge moves through `Pending → FanningOut → Ranking → Delivered`, and
/// can be `Cancelled` from any non-terminal phase by the scheduler. Source
/// failures stay inside their task: the source contributes nothing and the
/// merge carries on.
///
/// # Example
///
/// ```ignore
/// use nap_completion::engine::MergeEngine;
/// use nap_completion::scheduler::GenOptions;
/// use tokio_util::sync::CancellationToken;
///
/// let engine = MergeEngine::new(settings, factories, editor).await;
/// if let Some(result) = engine.merge(GenOptions::default(), CancellationToken::new()).await {
///     for (position, step) in result {
///         println!("{:?} {}", position, step.comp.text);
///     }
/// }
/// ```
use crate::cache::{CacheKey, ResultCache};
use crate::host::Editor;
use crate::matcher::{normalize, FuzzyMatcher};
use crate::registry::{FactoryRegistry, SourceFactory};
use crate::scheduler::GenOptions;
use crate::settings::Settings;
use crate::source::{CompletionStream, Source};
use crate::types::{Completion, Context, Notification, Position, Step};
use futures::StreamExt;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// How a source's part of a merge ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceOutcome {
    /// The stream ended on its own
    Completed,
    /// The deadline passed first; what it produced before is kept
    TimedOut,
    /// The source errored or its task died; it contributes nothing
    Failed(String),
}

/// Per-source summary of one merge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceReport {
    pub source: String,
    pub outcome: SourceOutcome,
    /// Completions received from the source
    pub received: usize,
    /// Steps the source contributed after matching, dedupe and capping
    pub kept: usize,
    /// Whether the contribution was replayed from the cache
    pub from_cache: bool,
}

/// Ranked output of one merge
#[derive(Debug, Clone)]
pub struct MergeResult {
    /// Cursor position at request time
    pub position: Position,
    pub context: Context,
    pub steps: Vec<Step>,
    pub reports: Vec<SourceReport>,
}

impl MergeResult {
    pub fn empty(context: Context) -> Self {
        Self {
            position: context.position,
            context,
            steps: Vec::new(),
            reports: Vec::new(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Position, &Step)> {
        let position = self.position;
        self.steps.iter().map(move |step| (position, step))
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn report(&self, source: &str) -> Option<&SourceReport> {
        self.reports.iter().find(|report| report.source == source)
    }
}

impl IntoIterator for MergeResult {
    type Item = (Position, Step);
    type IntoIter = std::iter::Zip<std::iter::Repeat<Position>, std::vec::IntoIter<Step>>;

    fn into_iter(self) -> Self::IntoIter {
        std::iter::repeat(self.position).zip(self.steps)
    }
}

/// Ranking order: rank bias ascending, score descending, normalized text ascending
pub fn rank_order(a: &Step, b: &Step) -> Ordering {
    a.rank
        .cmp(&b.rank)
        .then_with(|| b.score.cmp(&a.score))
        .then_with(|| a.text_normalized.cmp(&b.text_normalized))
}

enum SourceEvent {
    Item { index: usize, completion: Completion },
    Done { index: usize, outcome: SourceOutcome },
}

/// Bookkeeping for one source during a merge
struct SourceRun {
    factory: Arc<SourceFactory>,
    steps: Vec<Step>,
    received: usize,
    outcome: Option<SourceOutcome>,
}

impl SourceRun {
    fn accept(&mut self, completion: Completion, matcher: &mut FuzzyMatcher) {
        self.received += 1;
        let normalized = normalize(&completion.text, matcher.options());
        if let Some(score) = matcher.score_normalized(&normalized) {
            self.steps.push(Step::new(
                self.factory.name.clone(),
                self.factory.short_name.clone(),
                self.factory.rank,
                score,
                normalized,
                completion,
            ));
        }
    }
}

/// Drive one source stream until it ends, fails or passes its deadline
async fn run_source(
    index: usize,
    source: Arc<dyn Source>,
    context: Arc<Context>,
    deadline: Option<Instant>,
    events: mpsc::UnboundedSender<SourceEvent>,
) {
    let mut stream: CompletionStream = source.complete(&context);

    let outcome = loop {
        let next = match deadline {
            Some(deadline) => match tokio::time::timeout_at(deadline, stream.next()).await {
                Ok(next) => next,
                Err(_) => break SourceOutcome::TimedOut,
            },
            None => stream.next().await,
        };

        match next {
            Some(Ok(completion)) => {
                if events.send(SourceEvent::Item { index, completion }).is_err() {
                    // merge is gone
                    return;
                }
            }
            Some(Err(err)) => break SourceOutcome::Failed(err.to_string()),
            None => break SourceOutcome::Completed,
        }
    };

    let _ = events.send(SourceEvent::Done { index, outcome });
}

struct EngineInner {
    settings: Arc<Settings>,
    factories: Arc<FactoryRegistry>,
    /// Live source instances, manufactured once per engine
    sources: BTreeMap<String, Arc<dyn Source>>,
    editor: Arc<dyn Editor>,
    cache: ResultCache,
}

/// Fan-out and merge engine for one settings generation
#[derive(Clone)]
pub struct MergeEngine {
    inner: Arc<EngineInner>,
}

impl MergeEngine {
    /// Manufacture a live instance of every enabled source
    ///
    /// A source whose factory fails is logged and left out.
    pub async fn new(settings: Arc<Settings>, factories: Arc<FactoryRegistry>, editor: Arc<dyn Editor>) -> Self {
        let mut sources = BTreeMap::new();
        for (name, factory) in factories.iter() {
            if !factory.enabled {
                continue;
            }
            match factory.manufacture.manufacture(factory.seed.clone()).await {
                Ok(source) => {
                    sources.insert(name.clone(), source);
                }
                Err(err) => warn!(source = %name, error = %err, "Failed to manufacture source"),
            }
        }

        debug!(sources = sources.len(), "Merge engine ready");
        let cache = ResultCache::from_options(&settings.cache);
        Self {
            inner: Arc::new(EngineInner {
                settings,
                factories,
                sources,
                editor,
                cache,
            }),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub fn cache(&self) -> &ResultCache {
        &self.inner.cache
    }

    /// Names of the live source instances
    pub fn live_sources(&self) -> Vec<String> {
        self.inner.sources.keys().cloned().collect()
    }

    /// Merge for the editor's current context
    ///
    /// Returns `None` when cancelled or when the editor context is unavailable.
    pub async fn merge(&self, options: GenOptions, cancel: CancellationToken) -> Option<MergeResult> {
        let context = tokio::select! {
            biased;
            _ = cancel.cancelled() => return None,
            context = self.inner.editor.context(&self.inner.settings.match_options) => context,
        };

        match context {
            Ok(context) => self.merge_with_context(context, options, cancel).await,
            Err(err) => {
                warn!(error = %err, "Failed to read editor context");
                None
            }
        }
    }

    /// Merge for an explicit context
    pub async fn merge_with_context(
        &self,
        context: Context,
        options: GenOptions,
        cancel: CancellationToken,
    ) -> Option<MergeResult> {
        let settings = &self.inner.settings;
        debug!(phase = "pending", prefix = %context.prefix, force = options.force);

        let selected: Vec<(Arc<SourceFactory>, Arc<dyn Source>)> = self
            .inner
            .sources
            .iter()
            .filter(|(name, _)| {
                options
                    .sources
                    .as_ref()
                    .map_or(true, |requested| requested.contains(name.as_str()))
            })
            .filter_map(|(name, source)| {
                self.inner
                    .factories
                    .get(name)
                    .filter(|factory| factory.enabled)
                    .map(|factory| (factory.clone(), source.clone()))
            })
            .collect();

        if selected.is_empty() {
            debug!(phase = "delivered", "No sources selected");
            return Some(MergeResult::empty(context));
        }

        debug!(phase = "fanning_out", sources = selected.len());
        let started = Instant::now();
        let shared = Arc::new(context.clone());
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let mut tasks = JoinSet::new();
        let mut runs = Vec::with_capacity(selected.len());

        for (index, (factory, source)) in selected.into_iter().enumerate() {
            let deadline = factory.timeout.or(settings.timeout).map(|timeout| started + timeout);
            tasks.spawn(run_source(index, source, shared.clone(), deadline, events_tx.clone()));
            runs.push(SourceRun {
                factory,
                steps: Vec::new(),
                received: 0,
                outcome: None,
            });
        }
        // only the tasks hold senders now, so the channel closes when all have ended
        drop(events_tx);

        let mut matcher = FuzzyMatcher::new(&context.prefix, &settings.match_options);
        let global_deadline = settings.timeout.map(|timeout| started + timeout);
        let deadline = async {
            match global_deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };
        tokio::pin!(deadline);

        let mut drained = false;
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(phase = "cancelled", prefix = %context.prefix);
                    return None;
                }
                event = events_rx.recv() => match event {
                    Some(SourceEvent::Item { index, completion }) => runs[index].accept(completion, &mut matcher),
                    Some(SourceEvent::Done { index, outcome }) => runs[index].outcome = Some(outcome),
                    None => {
                        drained = true;
                        break;
                    }
                },
                _ = &mut deadline => {
                    debug!("Merge deadline elapsed");
                    break;
                }
            }
        }
        tasks.abort_all();

        debug!(phase = "ranking", elapsed_ms = started.elapsed().as_millis() as u64);
        let result = self.rank(context, runs, drained, &mut matcher);
        debug!(phase = "delivered", results = result.steps.len());
        Some(result)
    }

    fn rank(&self, context: Context, runs: Vec<SourceRun>, drained: bool, matcher: &mut FuzzyMatcher) -> MergeResult {
        let settings = &self.inner.settings;
        let normalized_prefix = normalize(&context.prefix, &settings.match_options);
        let mut steps = Vec::new();
        let mut reports = Vec::with_capacity(runs.len());

        for run in runs {
            let factory = run.factory;
            let outcome = match run.outcome {
                Some(outcome) => outcome,
                // the channel closed without a verdict: the task died
                None if drained => SourceOutcome::Failed("source task ended unexpectedly".to_string()),
                None => SourceOutcome::TimedOut,
            };

            let mut own = match &outcome {
                SourceOutcome::Failed(reason) => {
                    warn!(source = %factory.name, reason = %reason, "Source failed");
                    Vec::new()
                }
                SourceOutcome::TimedOut => {
                    debug!(source = %factory.name, received = run.received, "Source timed out");
                    run.steps
                }
                SourceOutcome::Completed => run.steps,
            };

            if factory.unique {
                own.sort_by(|a, b| b.score.cmp(&a.score));
                let mut seen = HashSet::new();
                own.retain(|step| seen.insert(step.text_normalized.clone()));
            }
            own.sort_by(rank_order);

            // the cache keeps the best ranked items, not the first arrivals
            let mut from_cache = false;
            if factory.cache.enabled {
                let filetype = factory.cache.same_filetype.then_some(context.filetype.as_str());
                let key = CacheKey::new(&factory.name, &normalized_prefix, filetype, settings.cache.prefix_matches);

                if !own.is_empty() {
                    self.inner
                        .cache
                        .put(key, own.iter().map(|step| step.comp.clone()).collect());
                } else if outcome != SourceOutcome::Completed {
                    if let Some(cached) = self.inner.cache.get(&key) {
                        own = self.replay(&factory, cached, matcher);
                        from_cache = !own.is_empty();
                    }
                }
            }

            if let Some(limit) = factory.limit {
                own.truncate(limit);
            }

            reports.push(SourceReport {
                source: factory.name.clone(),
                outcome,
                received: run.received,
                kept: own.len(),
                from_cache,
            });
            steps.extend(own);
        }

        steps.sort_by(rank_order);
        steps.truncate(settings.display.max_results);

        MergeResult {
            position: context.position,
            context,
            steps,
            reports,
        }
    }

    /// Re-score cached completions for a source that produced nothing
    fn replay(&self, factory: &SourceFactory, cached: Vec<Completion>, matcher: &mut FuzzyMatcher) -> Vec<Step> {
        let options = &self.inner.settings.cache;
        let mut steps: Vec<Step> = cached
            .into_iter()
            .filter_map(|completion| {
                let normalized = normalize(&completion.text, matcher.options());
                let score = matcher.score_normalized(&normalized)?;
                Some(Step::new(
                    factory.name.clone(),
                    options.short_name.clone(),
                    factory.rank.saturating_add(options.rank_penalty),
                    score,
                    normalized,
                    completion,
                ))
            })
            .collect();

        steps.sort_by(rank_order);
        steps.truncate(options.limit);
        steps
    }

    /// Route a notification to its live source
    pub async fn notify(&self, notification: Notification) {
        let Some(source) = self.inner.sources.get(&notification.source) else {
            debug!(source = %notification.source, "Notification for unknown source dropped");
            return;
        };

        if let Err(err) = source.notify(notification.body).await {
            warn!(source = %notification.source, error = %err, "Source rejected notification");
        }
    }

    /// Drain a notification channel until every sender is gone
    pub async fn listen(&self, mut notifications: mpsc::UnboundedReceiver<Notification>) {
        while let Some(notification) = notifications.recv().await {
            self.notify(notification).await;
        }
    }
}
