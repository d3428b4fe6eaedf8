//! # Stagewatch Core
//!
//! Derives the progress, label and status of an externally executed
//! pipeline run from the stage events it records.
//!
//! Events arrive through two redundant, unordered channels: an
//! authoritative fetch of every event of the run and a best-effort push
//! subscription. This crate merges both into one deduplicated set and
//! derives everything from that set alone, so the result never depends on
//! the order or the channel events arrived through.
//!
//! ## Pure derivation
//!
//! ```rust
//! use stagewatch_core::prelude::*;
//!
//! let events = vec![
//!     StageEvent::builder()
//!         .id("e1")
//!         .run_id("run-1")
//!         .stage("parsing_jd")
//!         .status(EventStatus::Completed)
//!         .build(),
//! ];
//!
//! let progress = compute_progress(&events);
//! assert_eq!(progress.progress, 5);
//! assert_eq!(compute_status(&events, Some("run-1")), PipelineStatus::Processing);
//! ```
//!
//! ## Live observation
//!
//! [`observer::observe`] spawns the poll and push producers for a run and
//! returns an [`observer::ObserverHandle`] exposing the latest
//! [`RunSnapshot`](stagewatch_schemas::RunSnapshot). Terminal callbacks are
//! delivered through [`callbacks::RunCallbacks`] at most once per run.

pub mod callbacks;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod memory;
pub mod observer;
pub mod progress;
pub mod reconciler;
pub mod source;
pub mod stages;
pub mod state;

pub use error::{Error, Result};

/// Prelude to import all relevant types and functions
pub mod prelude {
    pub use super::callbacks::{FnCallbacks, LoggingCallbacks, RunCallbacks};
    pub use super::config::{ConfigError, ObserverConfig};
    pub use super::memory::InMemoryEventStore;
    pub use super::observer::{observe, ObserverContext, ObserverHandle, ProgressMonitor};
    pub use super::progress::{compute_progress, compute_status, failure_message};
    pub use super::reconciler::{Delivery, EventReconciler};
    pub use super::source::{
        EventSource, EventSubscriber, Subscription, SubscriptionMessage, TransportError,
    };
    pub use super::stages::{default_stage_table, StageTable, StageTableError, STAGE_COUNT};
    pub use super::state::RunState;

    pub use stagewatch_schemas::{
        EventStatus, PipelineStatus, Progress, RunSnapshot, StageEvent, StageRange,
    };
}
