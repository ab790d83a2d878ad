//! Per-editor completion session
//!
//! A [`Session`] owns the editor [`State`] and the request side of the
//! scheduler. Editor events are handled one at a time on a single task, so
//! the state never needs a lock. [`Session::start`] wires the pieces
//! together:
//!
//! ```text
//! editor events ──► Session ──► Signal ──► scheduler ──► MergeEngine
//!                      ▲                                     │
//!                      └──────────── Delivery ◄──────────────┘
//! notifications ─────────────────────────────────► MergeEngine::listen
//! ```

use crate::engine::{MergeEngine, MergeResult};
use crate::error::{CompletionError, CompletionResult};
use crate::host::{CompletionSink, Editor};
use crate::registry::{EngineFactory, FactoryRegistry};
use crate::scheduler::{schedule, signal_channel, Delivery, GenOptions, SignalSender};
use crate::settings::{MatchOptions, Settings};
use crate::source::SnippetEngine;
use crate::state::State;
use crate::types::{Context, Notification, Payload, Step};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Editor events the session reacts to
#[derive(Debug, Clone, PartialEq)]
pub enum EditorEvent {
    /// Insert mode was entered
    InsertEnter,
    /// A printable character is about to be inserted
    PreInsertChar,
    /// Buffer text changed while in insert mode
    TextChanged,
    /// Completion was requested explicitly
    Manual,
    SetSources(BTreeSet<String>),
    ToggleSources(Vec<String>),
    /// The user accepted a candidate from the last delivered result
    Accepted(Step),
}

/// Event handling core of a completion session
pub struct Session {
    state: State,
    signals: SignalSender,
    /// Snippet engines keyed by the completion kind they expand
    snippets: BTreeMap<String, Arc<dyn SnippetEngine>>,
    /// Context of the last delivered result
    last_context: Option<Context>,
    /// Id of the newest signal sent; older deliveries are stale
    last_requested: u64,
}

impl Session {
    pub fn new(settings: &Settings, signals: SignalSender) -> Self {
        Self {
            state: State::initial(settings),
            signals,
            snippets: BTreeMap::new(),
            last_context: None,
            last_requested: 0,
        }
    }

    /// Manufacture one snippet engine per factory and index it by kind
    ///
    /// Engines that fail to manufacture are logged and skipped.
    pub fn with_snippet_engines(mut self, engines: &BTreeMap<String, Arc<EngineFactory>>) -> Self {
        let mut built: Vec<(Arc<EngineFactory>, Arc<dyn SnippetEngine>)> = Vec::new();

        for (kind, factory) in engines {
            let existing = built
                .iter()
                .find(|(seen, _)| Arc::ptr_eq(seen, factory))
                .map(|(_, engine)| engine.clone());

            let engine = match existing {
                Some(engine) => engine,
                None => match factory.manufacture.manufacture(factory.seed.clone()) {
                    Ok(engine) => {
                        built.push((factory.clone(), engine.clone()));
                        engine
                    }
                    Err(err) => {
                        warn!(kind = %kind, error = %err, "Failed to manufacture snippet engine");
                        continue;
                    }
                },
            };

            self.snippets.insert(kind.clone(), engine);
        }
        self
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    fn request(&mut self, force: bool) -> CompletionResult<u64> {
        let options = GenOptions {
            force,
            sources: Some(self.state.sources.clone()),
        };
        let id = self.signals.send(options)?;
        self.last_requested = id;
        debug!(id, force, "Completion requested");
        Ok(id)
    }

    /// Whether a delivery for signal `id` answers the newest request
    pub fn is_current(&self, id: u64) -> bool {
        id >= self.last_requested
    }

    /// Entering insert mode always asks for completions
    pub fn insert_enter(&mut self) -> CompletionResult<u64> {
        self.request(false)
    }

    pub fn pre_insert_char(&mut self) {
        self.state = self.state.char_inserted();
    }

    /// Request completions if the change was organic typing
    ///
    /// The state transition is applied even when sending the request fails.
    pub fn text_changed(&mut self) -> CompletionResult<Option<u64>> {
        let requested = if self.state.natural_insertable() {
            self.request(false).map(Some)
        } else {
            Ok(None)
        };
        self.state = self.state.text_changed();
        requested
    }

    /// Explicit request, admitted whatever the state says
    pub fn manual(&mut self) -> CompletionResult<u64> {
        self.request(true)
    }

    pub fn set_sources(&mut self, sources: BTreeSet<String>) {
        self.state = self.state.set_sources(sources);
    }

    pub fn toggle_sources(&mut self, sources: Vec<String>) {
        self.state = self.state.toggle_sources(sources);
    }

    /// A ranked result was handed to the editor
    ///
    /// The editor echoes the inserted candidate as a text change, which must
    /// not trigger another request.
    pub fn delivered(&mut self, result: &MergeResult) {
        self.state = self.state.comp_inserted();
        self.last_context = Some(result.context.clone());
    }

    /// Build the edit for an accepted candidate
    pub fn accepted(&self, step: &Step, live: &Context) -> CompletionResult<Payload> {
        let context = self.last_context.as_ref().unwrap_or(live);

        let engine = step.comp.kind.as_ref().and_then(|kind| self.snippets.get(kind));
        match engine {
            Some(engine) => engine.expand(&step.comp, context),
            None => Ok(Payload::from_step(step, context)),
        }
    }

    /// Handle one editor event
    ///
    /// Returns the payload to apply when the event accepted a candidate.
    pub fn handle(&mut self, event: EditorEvent, live: Option<&Context>) -> CompletionResult<Option<Payload>> {
        match event {
            EditorEvent::InsertEnter => {
                self.insert_enter()?;
            }
            EditorEvent::PreInsertChar => self.pre_insert_char(),
            EditorEvent::TextChanged => {
                self.text_changed()?;
            }
            EditorEvent::Manual => {
                self.manual()?;
            }
            EditorEvent::SetSources(sources) => self.set_sources(sources),
            EditorEvent::ToggleSources(sources) => self.toggle_sources(sources),
            EditorEvent::Accepted(step) => {
                let fallback = Context::default();
                let payload = self.accepted(&step, live.unwrap_or(&fallback))?;
                return Ok(Some(payload));
            }
        }
        Ok(None)
    }

    /// Wire a session to its engine, editor and sink and start it
    pub async fn start(
        settings: Arc<Settings>,
        factories: Arc<FactoryRegistry>,
        snippet_engines: &BTreeMap<String, Arc<EngineFactory>>,
        editor: Arc<dyn Editor>,
        sink: Arc<dyn CompletionSink>,
    ) -> SessionHandle {
        let engine = MergeEngine::new(settings.clone(), factories, editor.clone()).await;
        let (signals, signal_rx) = signal_channel();
        let (delivery_tx, delivery_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (notify_tx, notify_rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        let mut tasks = JoinSet::new();

        let generator = engine.clone();
        tasks.spawn(schedule(
            signal_rx,
            move |options, cancel| {
                let engine = generator.clone();
                async move { engine.merge(options, cancel).await }
            },
            delivery_tx,
        ));

        let listener = engine.clone();
        tasks.spawn(async move { listener.listen(notify_rx).await });

        let session = Session::new(&settings, signals).with_snippet_engines(snippet_engines);
        let runner = SessionRunner {
            session,
            editor,
            sink,
            match_options: settings.match_options.clone(),
        };
        tasks.spawn(runner.run(events_rx, delivery_rx, shutdown.clone()));

        info!(sources = ?engine.live_sources(), "Completion session started");
        SessionHandle {
            events: events_tx,
            notifications: notify_tx,
            shutdown,
            tasks,
            engine,
        }
    }
}

struct SessionRunner {
    session: Session,
    editor: Arc<dyn Editor>,
    sink: Arc<dyn CompletionSink>,
    match_options: MatchOptions,
}

impl SessionRunner {
    async fn run(
        mut self,
        mut events: mpsc::UnboundedReceiver<EditorEvent>,
        mut deliveries: mpsc::UnboundedReceiver<Delivery<MergeResult>>,
        shutdown: CancellationToken,
    ) {
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                Some(event) = events.recv() => self.on_event(event).await,
                Some(delivery) = deliveries.recv() => self.on_delivery(delivery).await,
                else => break,
            }
        }
        debug!("Session loop stopped");
    }

    async fn on_event(&mut self, event: EditorEvent) {
        let live = match &event {
            EditorEvent::Accepted(_) => match self.editor.context(&self.match_options).await {
                Ok(context) => Some(context),
                Err(err) => {
                    debug!(error = %err, "Editor context unavailable for accepted candidate");
                    None
                }
            },
            _ => None,
        };

        match self.session.handle(event, live.as_ref()) {
            Ok(Some(payload)) => {
                if let Err(err) = self.sink.apply(payload).await {
                    warn!(error = %err, "Failed to apply completion edit");
                }
            }
            Ok(None) => {}
            Err(err) => warn!(error = %err, "Failed to handle editor event"),
        }
    }

    async fn on_delivery(&mut self, delivery: Delivery<MergeResult>) {
        let result = delivery.value;
        if !self.session.is_current(delivery.signal.id) {
            debug!(id = delivery.signal.id, "Dropping delivery superseded by a newer request");
            return;
        }
        debug!(id = delivery.signal.id, results = result.len(), "Merge delivered");

        match self.sink.complete(&result).await {
            // nothing shown means nothing inserted
            Ok(()) if !result.is_empty() => self.session.delivered(&result),
            Ok(()) => {}
            Err(err) => warn!(error = %err, "Failed to render completions"),
        }
    }
}

/// Handle to a running session
pub struct SessionHandle {
    events: mpsc::UnboundedSender<EditorEvent>,
    notifications: mpsc::UnboundedSender<Notification>,
    shutdown: CancellationToken,
    tasks: JoinSet<()>,
    engine: MergeEngine,
}

impl SessionHandle {
    pub fn send(&self, event: EditorEvent) -> CompletionResult<()> {
        self.events.send(event).map_err(|_| {
            CompletionError::InternalError("Session is not running".to_string())
        })
    }

    /// Route an out-of-band message to its source
    pub fn notify(&self, notification: Notification) -> CompletionResult<()> {
        self.notifications.send(notification).map_err(|_| {
            CompletionError::InternalError("Notification listener is not running".to_string())
        })
    }

    pub fn engine(&self) -> &MergeEngine {
        &self.engine
    }

    /// Stop every session task and wait for them to finish
    pub async fn shutdown(mut self) {
        self.shutdown.cancel();
        self.tasks.shutdown().await;
        info!("Completion session stopped");
    }
}
