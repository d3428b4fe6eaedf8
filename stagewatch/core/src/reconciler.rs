//! Merging of stage events delivered through redundant channels.
//!
//! A run is observed through an authoritative periodic fetch and a
//! best-effort push subscription. Both may deliver the same event, in any
//! order, and a fetch may resolve after pushes that happened later. The
//! reconciler keeps exactly one copy of every event id it has seen.

use std::collections::BTreeMap;

use stagewatch_schemas::StageEvent;
use tracing::{debug, trace, warn};

/// Channel a batch of events was delivered through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Full re-fetch of the run's events, authoritative for the ids it contains
    Fetch,
    /// Single event pushed by the subscription
    Push,
}

/// Deduplicated event set of a single run.
///
/// Merge policy:
/// - a fetched event replaces the held copy with the same id
/// - a pushed event is only inserted when its id is new
/// - held events missing from a fetch are kept, the fetch may have been
///   issued before they were pushed
#[derive(Debug, Clone)]
pub struct EventReconciler {
    run_id: String,
    events: BTreeMap<String, StageEvent>,
}

impl EventReconciler {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            events: BTreeMap::new(),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Merge a batch into the held set, returns true if the set changed
    pub fn ingest<I>(&mut self, batch: I, delivery: Delivery) -> bool
    where
        I: IntoIterator<Item = StageEvent>,
    {
        let mut changed = false;

        for event in batch {
            if event.run_id != self.run_id {
                warn!(
                    run_id = %self.run_id,
                    event_run_id = %event.run_id,
                    event_id = %event.id,
                    "Dropping event that belongs to another run"
                );
                continue;
            }

            match delivery {
                Delivery::Fetch => {
                    if self.events.get(&event.id) != Some(&event) {
                        self.events.insert(event.id.clone(), event);
                        changed = true;
                    }
                }
                Delivery::Push => {
                    if self.events.contains_key(&event.id) {
                        trace!(event_id = %event.id, "Duplicate push ignored");
                    } else {
                        self.events.insert(event.id.clone(), event);
                        changed = true;
                    }
                }
            }
        }

        debug!(
            run_id = %self.run_id,
            ?delivery,
            changed,
            held = self.events.len(),
            "Ingested event batch"
        );

        changed
    }

    pub fn events(&self) -> impl Iterator<Item = &StageEvent> {
        self.events.values()
    }

    pub fn get(&self, id: &str) -> Option<&StageEvent> {
        self.events.get(id)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
