//! Transports the observer reads events from.

use async_trait::async_trait;
use futures::stream::BoxStream;
use stagewatch_schemas::StageEvent;
use thiserror::Error;

/// Errors raised by event transports, these are retried and never fail a run
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("failed to fetch events for run '{run_id}': {message}")]
    Fetch { run_id: String, message: String },

    #[error("failed to subscribe to events for run '{run_id}': {message}")]
    Subscribe { run_id: String, message: String },

    #[error("transport closed")]
    Closed,
}

/// Item of a push subscription
#[derive(Debug, Clone, PartialEq)]
pub enum SubscriptionMessage {
    /// The subscription is established, events written before this point may
    /// have been missed and should be re-fetched
    Active,
    /// A newly written event
    Event(StageEvent),
}

/// Stream of pushed messages, dropping it unsubscribes
pub type Subscription = BoxStream<'static, SubscriptionMessage>;

/// Authoritative source of all events of a run
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Fetch every event currently recorded for `run_id`
    async fn fetch_events(&self, run_id: &str) -> Result<Vec<StageEvent>, TransportError>;
}

/// Best-effort push channel of new events of a run
#[async_trait]
pub trait EventSubscriber: Send + Sync {
    /// Subscribe to events inserted for `run_id` from now on
    async fn subscribe(&self, run_id: &str) -> Result<Subscription, TransportError>;
}
