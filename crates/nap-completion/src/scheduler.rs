//! Cancel-and-replace request scheduling
//!
//! Completion requests arrive as [`Signal`]s. At most one generation is in
//! flight at a time: a newer signal cancels the running one and takes its
//! place, and only a generation that ran to completion without being
//! superseded is delivered. A burst of signals that queued up while the
//! scheduler was busy collapses into its newest member.

use crate::error::{CompletionError, CompletionResult};
use std::collections::BTreeSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Options of one completion request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenOptions {
    /// Explicit request; bypasses the typing heuristics
    pub force: bool,
    /// Sources to consult; `None` means every enabled source
    pub sources: Option<BTreeSet<String>>,
}

impl GenOptions {
    pub fn forced() -> Self {
        Self {
            force: true,
            sources: None,
        }
    }

    pub fn with_sources(mut self, sources: BTreeSet<String>) -> Self {
        self.sources = Some(sources);
        self
    }
}

/// A request to (re)start completion generation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signal {
    /// Monotonic request id; later signals carry larger ids
    pub id: u64,
    pub options: GenOptions,
}

/// Result of a generation that was not superseded
#[derive(Debug, Clone)]
pub struct Delivery<T> {
    pub signal: Signal,
    pub value: T,
}

/// Producer side of the signal channel
#[derive(Debug, Clone)]
pub struct SignalSender {
    tx: mpsc::UnboundedSender<Signal>,
    next_id: Arc<AtomicU64>,
}

impl SignalSender {
    /// Enqueue a request and return its id
    pub fn send(&self, options: GenOptions) -> CompletionResult<u64> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.tx
            .send(Signal { id, options })
            .map_err(|_| CompletionError::InternalError("Scheduler is not running".to_string()))?;
        Ok(id)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Create a connected signal sender and receiver
pub fn signal_channel() -> (SignalSender, mpsc::UnboundedReceiver<Signal>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let sender = SignalSender {
        tx,
        next_id: Arc::new(AtomicU64::new(1)),
    };
    (sender, rx)
}

struct Inflight<Fut> {
    signal: Signal,
    cancel: CancellationToken,
    future: Pin<Box<Fut>>,
}

enum Event<T> {
    Signal(Signal),
    Finished(Option<T>),
    Closed,
}

/// Take the newest signal, discarding any older ones still queued
fn collapse(first: Signal, signals: &mut mpsc::UnboundedReceiver<Signal>) -> Signal {
    let mut latest = first;
    while let Ok(next) = signals.try_recv() {
        trace!(dropped = latest.id, "Signal superseded before start");
        latest = next;
    }
    latest
}

/// Run the scheduling loop until the signal channel closes
///
/// `gen` starts one generation for a signal. It receives a token that is
/// cancelled when the generation is superseded; the generation's future is
/// dropped right after, so any work it spawned must be tied to the token or
/// to the future's lifetime. A generation resolving to `None` produced
/// nothing to deliver.
///
/// Deliveries are sent in request order and never for a superseded signal.
/// The loop exits when every [`SignalSender`] is dropped or the delivery
/// receiver goes away.
pub async fn schedule<G, Fut, T>(
    mut signals: mpsc::UnboundedReceiver<Signal>,
    mut gen: G,
    deliveries: mpsc::UnboundedSender<Delivery<T>>,
) where
    G: FnMut(GenOptions, CancellationToken) -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let mut inflight: Option<Inflight<Fut>> = None;

    loop {
        let event = match inflight.as_mut() {
            None => match signals.recv().await {
                Some(signal) => Event::Signal(signal),
                None => Event::Closed,
            },
            Some(run) => tokio::select! {
                biased;
                signal = signals.recv() => match signal {
                    Some(signal) => Event::Signal(signal),
                    None => Event::Closed,
                },
                value = run.future.as_mut() => Event::Finished(value),
            },
        };

        match event {
            Event::Closed => {
                if let Some(run) = inflight.take() {
                    run.cancel.cancel();
                }
                break;
            }
            Event::Finished(value) => {
                let Some(run) = inflight.take() else {
                    continue;
                };
                match value {
                    Some(value) => {
                        debug!(id = run.signal.id, "Delivering generation");
                        let delivery = Delivery {
                            signal: run.signal,
                            value,
                        };
                        if deliveries.send(delivery).is_err() {
                            break;
                        }
                    }
                    None => debug!(id = run.signal.id, "Generation produced nothing"),
                }
            }
            Event::Signal(signal) => {
                let signal = collapse(signal, &mut signals);
                if let Some(previous) = inflight.take() {
                    debug!(
                        cancelled = previous.signal.id,
                        replacement = signal.id,
                        "Cancelling superseded generation"
                    );
                    previous.cancel.cancel();
                }

                let cancel = CancellationToken::new();
                let future = Box::pin(gen(signal.options.clone(), cancel.clone()));
                inflight = Some(Inflight {
                    signal,
                    cancel,
                    future,
                });
            }
        }
    }

    debug!("Scheduler stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    type Generated = (GenOptions, usize);
    type GenFuture = Pin<Box<dyn Future<Output = Option<Generated>> + Send>>;

    /// Generation that sleeps for `delay_ms`; records every token it was given
    fn slow_gen(
        delay_ms: u64,
        tokens: Arc<Mutex<Vec<CancellationToken>>>,
    ) -> impl FnMut(GenOptions, CancellationToken) -> GenFuture {
        move |options, cancel| {
            let run = {
                let mut tokens = tokens.lock().unwrap();
                tokens.push(cancel.clone());
                tokens.len()
            };
            Box::pin(async move {
                tokio::select! {
                    _ = cancel.cancelled() => None,
                    _ = tokio::time::sleep(Duration::from_millis(delay_ms)) => Some((options, run)),
                }
            })
        }
    }

    fn cancelled(tokens: &Arc<Mutex<Vec<CancellationToken>>>) -> Vec<bool> {
        tokens.lock().unwrap().iter().map(|t| t.is_cancelled()).collect()
    }

    #[test]
    fn test_signal_ids_increase() {
        let (sender, mut rx) = signal_channel();
        let first = sender.send(GenOptions::default()).unwrap();
        let second = sender.clone().send(GenOptions::forced()).unwrap();
        assert!(second > first);
        assert_eq!(rx.try_recv().unwrap().id, first);
        assert!(rx.try_recv().unwrap().options.force);
    }

    #[test]
    fn test_send_after_close_fails() {
        let (sender, rx) = signal_channel();
        drop(rx);
        assert!(sender.is_closed());
        assert!(matches!(
            sender.send(GenOptions::default()),
            Err(CompletionError::InternalError(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_request_is_delivered() {
        let (sender, signals) = signal_channel();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let tokens = Arc::new(Mutex::new(Vec::new()));
        tokio::spawn(schedule(signals, slow_gen(10, tokens.clone()), tx));

        let id = sender.send(GenOptions::forced()).unwrap();
        let delivery = rx.recv().await.unwrap();
        assert_eq!(delivery.signal.id, id);
        assert!(delivery.value.0.force);
        assert_eq!(cancelled(&tokens), vec![false]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_newer_request_cancels_inflight() {
        let (sender, signals) = signal_channel();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let tokens = Arc::new(Mutex::new(Vec::new()));
        tokio::spawn(schedule(signals, slow_gen(50, tokens.clone()), tx));

        let first = sender.send(GenOptions::default()).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        let second = sender.send(GenOptions::default()).unwrap();

        let delivery = rx.recv().await.unwrap();
        assert_eq!(delivery.signal.id, second);
        assert_ne!(delivery.signal.id, first);
        assert_eq!(cancelled(&tokens), vec![true, false]);

        drop(sender);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_collapses_to_newest() {
        let (sender, signals) = signal_channel();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let tokens = Arc::new(Mutex::new(Vec::new()));

        // queue the burst before the scheduler runs
        let mut last = 0;
        for _ in 0..5 {
            last = sender.send(GenOptions::default()).unwrap();
        }
        tokio::spawn(schedule(signals, slow_gen(10, tokens.clone()), tx));

        let delivery = rx.recv().await.unwrap();
        assert_eq!(delivery.signal.id, last);
        assert_eq!(delivery.value.1, 1);
        assert_eq!(cancelled(&tokens), vec![false]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sequential_requests_are_all_delivered() {
        let (sender, signals) = signal_channel();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let tokens = Arc::new(Mutex::new(Vec::new()));
        tokio::spawn(schedule(signals, slow_gen(10, tokens.clone()), tx));

        let mut ids = Vec::new();
        for _ in 0..3 {
            let id = sender.send(GenOptions::default()).unwrap();
            assert_eq!(rx.recv().await.unwrap().signal.id, id);
            ids.push(id);
        }
        assert!(ids.windows(2).all(|pair| pair[0] < pair[1]));
        assert_eq!(cancelled(&tokens), vec![false, false, false]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_closing_cancels_inflight() {
        let (sender, signals) = signal_channel();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let tokens = Arc::new(Mutex::new(Vec::new()));
        let handle = tokio::spawn(schedule(signals, slow_gen(1_000, tokens.clone()), tx));

        sender.send(GenOptions::default()).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        drop(sender);
        handle.await.unwrap();

        assert!(rx.recv().await.is_none());
        assert_eq!(cancelled(&tokens), vec![true]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_generation_is_not_delivered() {
        let (sender, signals) = signal_channel();
        let (tx, mut rx) = mpsc::unbounded_channel::<Delivery<u64>>();
        let handle = tokio::spawn(schedule(signals, |_options, _cancel| async { None }, tx));

        sender.send(GenOptions::default()).unwrap();
        drop(sender);
        handle.await.unwrap();
        assert!(rx.recv().await.is_none());
    }
}
