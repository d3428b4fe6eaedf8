//! Live observation of a pipeline run.
//!
//! An observer owns one run. Two producers feed a single consumer over a
//! bounded queue:
//!
//! - the poll producer re-fetches every event of the run on a fixed interval
//! - the push producer forwards subscribed events and asks for one re-fetch
//!   each time the subscription becomes active
//!
//! The consumer is the only task touching the run state. It merges every
//! batch, derives a [`RunSnapshot`], fires terminal callbacks through the
//! once-guard and publishes the snapshot on a `watch` channel.

use std::sync::Arc;
use std::time::Duration;

use bon::Builder;
use futures::StreamExt;
use stagewatch_schemas::{RunSnapshot, StageEvent};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, instrument, warn, Instrument};

use crate::callbacks::{LoggingCallbacks, RunCallbacks};
use crate::config::ObserverConfig;
use crate::reconciler::Delivery;
use crate::source::{EventSource, EventSubscriber, SubscriptionMessage};
use crate::stages::{default_stage_table, StageTable};
use crate::state::RunState;

/// Everything an observer needs besides the run id
#[derive(Clone, Builder)]
pub struct ObserverContext {
    source: Arc<dyn EventSource>,
    subscriber: Arc<dyn EventSubscriber>,
    #[builder(default = Arc::new(LoggingCallbacks) as Arc<dyn RunCallbacks>)]
    callbacks: Arc<dyn RunCallbacks>,
    #[builder(default = Arc::new(default_stage_table().clone()))]
    table: Arc<StageTable>,
    #[builder(default)]
    config: ObserverConfig,
}

impl ObserverContext {
    pub fn table(&self) -> &StageTable {
        &self.table
    }

    pub fn config(&self) -> &ObserverConfig {
        &self.config
    }
}

/// Batch handed from a producer to the consumer
#[derive(Debug)]
enum Input {
    Fetched(Vec<StageEvent>),
    Pushed(StageEvent),
}

/// Start observing `run_id`.
///
/// Without a run id, or with an empty one, nothing is spawned and the handle
/// reports `connecting` until it is dropped. Must be called from within a Tokio runtime.
///
/// ```no_run
/// use std::sync::Arc;
/// use stagewatch_core::memory::InMemoryEventStore;
/// use stagewatch_core::observer::{observe, ObserverContext};
///
/// # async fn run() {
/// let store = InMemoryEventStore::new();
/// let ctx = ObserverContext::builder()
///     .source(Arc::new(store.clone()))
///     .subscriber(Arc::new(store))
///     .build();
///
/// let handle = observe(Some("run-1".to_string()), &ctx);
/// if let Some(snapshot) = handle.wait_terminal().await {
///     println!("{} at {}%", snapshot.status, snapshot.progress);
/// }
/// # }
/// ```
#[instrument(skip(ctx))]
pub fn observe(run_id: Option<String>, ctx: &ObserverContext) -> ObserverHandle {
    let token = CancellationToken::new();

    let Some(run_id) = run_id.filter(|id| !id.is_empty()) else {
        debug!("No run to observe yet");
        let (_, snapshot_rx) = watch::channel(idle_snapshot(&ctx.table));
        return ObserverHandle {
            run_id: None,
            token,
            snapshot_rx,
            tasks: Vec::new(),
        };
    };

    info!("Observing pipeline run");

    let state = RunState::new(run_id.clone());
    let (snapshot_tx, snapshot_rx) = watch::channel(state.snapshot(&ctx.table));
    let (input_tx, input_rx) = mpsc::channel(ctx.config.channel_capacity());
    let poll_token = token.child_token();
    let span = info_span!("observer", run_id = %run_id);

    let consumer = Consumer {
        state,
        input_rx,
        snapshot_tx,
        table: ctx.table.clone(),
        callbacks: ctx.callbacks.clone(),
        token: token.clone(),
        poll_token: poll_token.clone(),
        poll_after_terminal: ctx.config.poll_after_terminal(),
    };

    let tasks = vec![
        tokio::spawn(consumer.run().instrument(span.clone())),
        tokio::spawn(
            poll_events(
                run_id.clone(),
                ctx.source.clone(),
                input_tx.clone(),
                ctx.config.poll_interval(),
                poll_token,
            )
            .instrument(span.clone()),
        ),
        tokio::spawn(
            push_events(
                run_id.clone(),
                ctx.subscriber.clone(),
                ctx.source.clone(),
                input_tx,
                ctx.config.poll_interval(),
                token.clone(),
            )
            .instrument(span),
        ),
    ];

    ObserverHandle {
        run_id: Some(run_id),
        token,
        snapshot_rx,
        tasks,
    }
}

fn idle_snapshot(table: &StageTable) -> RunSnapshot {
    let events: [StageEvent; 0] = [];
    RunSnapshot::new(
        None,
        table.compute_status(&events, None),
        table.compute_progress(&events),
    )
}

struct Consumer {
    state: RunState,
    input_rx: mpsc::Receiver<Input>,
    snapshot_tx: watch::Sender<RunSnapshot>,
    table: Arc<StageTable>,
    callbacks: Arc<dyn RunCallbacks>,
    token: CancellationToken,
    poll_token: CancellationToken,
    poll_after_terminal: bool,
}

impl Consumer {
    async fn run(mut self) {
        loop {
            let input = tokio::select! {
                biased;
                _ = self.token.cancelled() => break,
                input = self.input_rx.recv() => match input {
                    Some(input) => input,
                    None => break,
                },
            };

            // results that raced with teardown must not touch the run
            if self.token.is_cancelled() {
                break;
            }

            let changed = match input {
                Input::Fetched(events) => self.state.ingest(events, Delivery::Fetch),
                Input::Pushed(event) => self.state.ingest([event], Delivery::Push),
            };
            if !changed {
                continue;
            }

            let snapshot = self.state.refresh(&self.table, self.callbacks.as_ref());
            debug!(
                status = %snapshot.status,
                progress = snapshot.progress,
                label = %snapshot.label,
                "Run snapshot updated"
            );

            if snapshot.is_terminal() && !self.poll_after_terminal && !self.poll_token.is_cancelled() {
                info!(status = %snapshot.status, "Run reached a terminal status, stopping polling");
                self.poll_token.cancel();
            }

            self.snapshot_tx.send_replace(snapshot);
        }

        debug!("Observer consumer stopped");
    }
}

/// Fetch every event of the run once and queue them.
///
/// Returns false when the observer is shutting down.
async fn fetch_into(
    run_id: &str,
    source: &dyn EventSource,
    input_tx: &mpsc::Sender<Input>,
    token: &CancellationToken,
) -> bool {
    let fetched = tokio::select! {
        biased;
        _ = token.cancelled() => return false,
        fetched = source.fetch_events(run_id) => fetched,
    };

    match fetched {
        Ok(events) => {
            debug!(count = events.len(), "Fetched run events");
            input_tx.send(Input::Fetched(events)).await.is_ok()
        }
        Err(error) => {
            warn!(%error, "Failed to fetch run events, retrying on next tick");
            true
        }
    }
}

async fn poll_events(
    run_id: String,
    source: Arc<dyn EventSource>,
    input_tx: mpsc::Sender<Input>,
    period: Duration,
    token: CancellationToken,
) {
    // the first tick completes immediately, which is the initial fetch
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        if !fetch_into(&run_id, source.as_ref(), &input_tx, &token).await {
            break;
        }
    }

    debug!("Poll producer stopped");
}

async fn push_events(
    run_id: String,
    subscriber: Arc<dyn EventSubscriber>,
    source: Arc<dyn EventSource>,
    input_tx: mpsc::Sender<Input>,
    retry_after: Duration,
    token: CancellationToken,
) {
    'subscribe: loop {
        let subscribed = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            subscribed = subscriber.subscribe(&run_id) => subscribed,
        };

        match subscribed {
            Ok(mut subscription) => loop {
                let message = tokio::select! {
                    biased;
                    _ = token.cancelled() => break 'subscribe,
                    message = subscription.next() => message,
                };

                match message {
                    Some(SubscriptionMessage::Active) => {
                        debug!("Subscription active, re-fetching run events");
                        if !fetch_into(&run_id, source.as_ref(), &input_tx, &token).await {
                            break 'subscribe;
                        }
                    }
                    Some(SubscriptionMessage::Event(event)) => {
                        if input_tx.send(Input::Pushed(event)).await.is_err() {
                            break 'subscribe;
                        }
                    }
                    None => {
                        warn!("Event subscription ended, resubscribing");
                        break;
                    }
                }
            },
            Err(error) => warn!(%error, "Failed to subscribe to run events"),
        }

        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(retry_after) => {}
        }
    }

    debug!("Push producer stopped");
}

/// Handle to a running observer, dropping it stops observation
#[derive(Debug)]
pub struct ObserverHandle {
    run_id: Option<String>,
    token: CancellationToken,
    snapshot_rx: watch::Receiver<RunSnapshot>,
    tasks: Vec<JoinHandle<()>>,
}

impl ObserverHandle {
    pub fn run_id(&self) -> Option<&str> {
        self.run_id.as_deref()
    }

    /// Latest derived snapshot
    pub fn snapshot(&self) -> RunSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    /// Receiver notified on every snapshot change
    pub fn subscribe(&self) -> watch::Receiver<RunSnapshot> {
        self.snapshot_rx.clone()
    }

    /// Wait until the run is completed, failed or cancelled.
    ///
    /// Returns `None` when observation stops first.
    pub async fn wait_terminal(&self) -> Option<RunSnapshot> {
        let mut snapshot_rx = self.snapshot_rx.clone();
        let snapshot = snapshot_rx
            .wait_for(|snapshot| snapshot.is_terminal())
            .await
            .ok()?;

        Some(snapshot.clone())
    }

    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Stop observing and wait for the producers and the consumer to exit
    pub async fn stop(mut self) {
        self.token.cancel();
        for task in self.tasks.drain(..) {
            if let Err(error) = task.await {
                warn!(%error, "Observer task did not shut down cleanly");
            }
        }
        debug!(run_id = ?self.run_id, "Observer stopped");
    }
}

impl Drop for ObserverHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Observes whichever run is currently selected.
///
/// Selecting another run tears the previous observer down, so its state and
/// once-guard never leak into the new run.
pub struct ProgressMonitor {
    ctx: ObserverContext,
    observer: ObserverHandle,
}

impl ProgressMonitor {
    /// Must be called from within a Tokio runtime
    pub fn new(ctx: ObserverContext) -> Self {
        let observer = observe(None, &ctx);
        Self { ctx, observer }
    }

    /// Switch to `run_id`, setting the current run again is a no-op
    pub async fn set_run(&mut self, run_id: Option<String>) {
        let run_id = run_id.filter(|id| !id.is_empty());
        if self.observer.run_id() == run_id.as_deref() {
            return;
        }

        info!(from = ?self.observer.run_id(), to = ?run_id, "Switching observed run");
        let previous = std::mem::replace(&mut self.observer, observe(None, &self.ctx));
        previous.stop().await;
        self.observer = observe(run_id, &self.ctx);
    }

    pub fn run_id(&self) -> Option<&str> {
        self.observer.run_id()
    }

    pub fn snapshot(&self) -> RunSnapshot {
        self.observer.snapshot()
    }

    pub fn observer(&self) -> &ObserverHandle {
        &self.observer
    }
}
