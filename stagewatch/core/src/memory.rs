//! In-memory event transport.
//!
//! Stores events per run and pushes them to live subscribers. Besides the
//! regular path it can model the delivery faults a real backend shows: a
//! missed push, a push that is visible before the row, stale or failing
//! fetches and subscriptions that drop.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use stagewatch_schemas::StageEvent;
use tokio::sync::{mpsc, Mutex};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, trace};

use crate::source::{
    EventSource, EventSubscriber, Subscription, SubscriptionMessage, TransportError,
};

#[derive(Debug, Default)]
struct StoreState {
    events: HashMap<String, Vec<StageEvent>>,
    subscribers: HashMap<String, Vec<mpsc::UnboundedSender<SubscriptionMessage>>>,
    fetch_delay: Option<Duration>,
    failing_fetches: usize,
    failing_subscribes: usize,
    fetch_count: usize,
}

impl StoreState {
    fn push(&mut self, event: &StageEvent) {
        if let Some(senders) = self.subscribers.get_mut(&event.run_id) {
            senders.retain(|tx| tx.send(SubscriptionMessage::Event(event.clone())).is_ok());
            trace!(event_id = %event.id, subscribers = senders.len(), "Pushed event");
        }
    }

    fn store(&mut self, event: StageEvent) {
        self.events.entry(event.run_id.clone()).or_default().push(event);
    }
}

/// Event store kept in memory, cheap to clone and shared between clones
#[derive(Debug, Clone, Default)]
pub struct InMemoryEventStore {
    state: Arc<Mutex<StoreState>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an event and push it to the run's subscribers
    pub async fn publish(&self, event: StageEvent) {
        let mut state = self.state.lock().await;
        state.push(&event);
        state.store(event);
    }

    /// Store an event without pushing it, as if the push was lost
    pub async fn record(&self, event: StageEvent) {
        self.state.lock().await.store(event);
    }

    /// Push an event that a fetch cannot see yet
    pub async fn push_only(&self, event: StageEvent) {
        self.state.lock().await.push(&event);
    }

    /// Fail the next `count` fetches
    pub async fn fail_next_fetches(&self, count: usize) {
        self.state.lock().await.failing_fetches = count;
    }

    /// Fail the next `count` subscription attempts
    pub async fn fail_next_subscribes(&self, count: usize) {
        self.state.lock().await.failing_subscribes = count;
    }

    /// Delay fetch results, the returned events are read before the delay
    pub async fn set_fetch_delay(&self, delay: Option<Duration>) {
        self.state.lock().await.fetch_delay = delay;
    }

    /// End every open subscription of `run_id`
    pub async fn close_subscriptions(&self, run_id: &str) {
        self.state.lock().await.subscribers.remove(run_id);
    }

    /// Number of fetches served, failed ones included
    pub async fn fetch_count(&self) -> usize {
        self.state.lock().await.fetch_count
    }

    /// Number of subscriptions of `run_id` that are still open
    pub async fn subscriber_count(&self, run_id: &str) -> usize {
        self.state
            .lock()
            .await
            .subscribers
            .get(run_id)
            .map(|senders| senders.iter().filter(|tx| !tx.is_closed()).count())
            .unwrap_or(0)
    }
}

#[async_trait]
impl EventSource for InMemoryEventStore {
    async fn fetch_events(&self, run_id: &str) -> Result<Vec<StageEvent>, TransportError> {
        let (events, delay) = {
            let mut state = self.state.lock().await;
            state.fetch_count += 1;

            if state.failing_fetches > 0 {
                state.failing_fetches -= 1;
                return Err(TransportError::Fetch {
                    run_id: run_id.to_string(),
                    message: "injected fetch failure".to_string(),
                });
            }

            let mut events = state.events.get(run_id).cloned().unwrap_or_default();
            events.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
            (events, state.fetch_delay)
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        debug!(run_id, count = events.len(), "Served fetch");
        Ok(events)
    }
}

#[async_trait]
impl EventSubscriber for InMemoryEventStore {
    async fn subscribe(&self, run_id: &str) -> Result<Subscription, TransportError> {
        let mut state = self.state.lock().await;

        if state.failing_subscribes > 0 {
            state.failing_subscribes -= 1;
            return Err(TransportError::Subscribe {
                run_id: run_id.to_string(),
                message: "injected subscribe failure".to_string(),
            });
        }

        let (tx, rx) = mpsc::unbounded_channel();
        // an unbounded send only fails once the receiver is gone
        let _ = tx.send(SubscriptionMessage::Active);
        state.subscribers.entry(run_id.to_string()).or_default().push(tx);
        debug!(run_id, "Subscription opened");

        Ok(UnboundedReceiverStream::new(rx).boxed())
    }
}
