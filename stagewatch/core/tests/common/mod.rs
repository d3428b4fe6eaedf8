//! Common test utilities for stagewatch core testing.
//!
//! Event builders for the default stage table and counting callbacks shared
//! by the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use stagewatch_core::prelude::*;

/// Build an event with a deterministic id derived from stage and status
pub fn event(run_id: &str, stage: &str, status: EventStatus) -> StageEvent {
    StageEvent::builder()
        .id(format!("{run_id}-{stage}-{status}"))
        .run_id(run_id)
        .stage(stage)
        .status(status)
        .build()
}

/// `started` then `completed` for every stage of the default table
pub fn full_run(run_id: &str) -> Vec<StageEvent> {
    default_stage_table()
        .iter()
        .flat_map(|range| {
            [
                event(run_id, &range.name, EventStatus::Started),
                event(run_id, &range.name, EventStatus::Completed),
            ]
        })
        .collect()
}

/// Callbacks recording how often each notification fired
#[derive(Debug, Default)]
pub struct CountingCallbacks {
    completed: AtomicUsize,
    errors: Mutex<Vec<String>>,
}

impl CountingCallbacks {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().unwrap().clone()
    }
}

impl RunCallbacks for CountingCallbacks {
    fn on_complete(&self) {
        self.completed.fetch_add(1, Ordering::SeqCst);
    }

    fn on_error(&self, message: &str) {
        self.errors.lock().unwrap().push(message.to_string());
    }
}
