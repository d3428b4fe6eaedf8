//! Stagewatch - Derive pipeline progress from unordered stage events
//!
//! This crate is a meta-package that re-exports the most commonly used
//! types and functions of the stagewatch crates. It provides a convenient
//! way to include everything needed to observe a pipeline run.
//!
//! # Features
//!
//! - **core**: Reconciliation, derivation and observers (enabled by default)
//! - **toml**: Loading observer configuration from TOML (enabled by default)
//! - **schema_gen**: JSON schema generation for the data model
//! - **full**: All features
//!
//! # Examples
//!
//! ```no_run
//! use std::sync::Arc;
//! use stagewatch::prelude::*;
//!
//! # async fn run() {
//! let store = InMemoryEventStore::new();
//! let ctx = ObserverContext::builder()
//!     .source(Arc::new(store.clone()))
//!     .subscriber(Arc::new(store))
//!     .callbacks(Arc::new(LoggingCallbacks))
//!     .build();
//!
//! let mut monitor = ProgressMonitor::new(ctx);
//! monitor.set_run(Some("run-1".to_string())).await;
//! println!("{}% {}", monitor.snapshot().progress, monitor.snapshot().label);
//! # }
//! ```

// Re-exports from schemas
pub use stagewatch_schemas::{
    self as schemas, EventStatus, PipelineStatus, Progress, RunSnapshot, StageEvent, StageRange,
};

// Re-exports from core
#[cfg(feature = "core")]
pub use stagewatch_core::{self as core, prelude as core_prelude};

#[cfg(feature = "core")]
pub use stagewatch_core::{
    callbacks::{FnCallbacks, LoggingCallbacks, RunCallbacks},
    config::ObserverConfig,
    observer::{observe, ObserverContext, ObserverHandle, ProgressMonitor},
    progress::{compute_progress, compute_status},
    stages::{default_stage_table, StageTable, STAGE_COUNT},
    Error, Result,
};

/// Prelude module that exports commonly used types and functions.
///
/// This module provides a convenient way to import all the necessary
/// components with a single `use stagewatch::prelude::*;` statement.
pub mod prelude {
    pub use stagewatch_schemas::{
        EventStatus, PipelineStatus, Progress, RunSnapshot, StageEvent, StageRange,
    };

    #[cfg(feature = "core")]
    pub use stagewatch_core::prelude::*;
}

/// A simpler API for recorded event files
#[cfg(feature = "core")]
pub mod api {
    use std::collections::BTreeSet;
    use std::path::{Path, PathBuf};

    use stagewatch_core::reconciler::{Delivery, EventReconciler};
    use stagewatch_core::stages::StageTable;
    use stagewatch_schemas::{RunSnapshot, StageEvent};
    use thiserror::Error;
    use tracing::debug;

    /// Errors raised while loading recorded events
    #[derive(Debug, Error)]
    pub enum LoadError {
        #[error("failed to read '{path}': {source}")]
        Io {
            path: PathBuf,
            source: std::io::Error,
        },

        #[error("invalid event on line {line}: {source}")]
        Parse {
            line: usize,
            source: serde_json::Error,
        },

        #[error("events belong to several runs ({}), pass a run id", .0.join(", "))]
        AmbiguousRun(Vec<String>),
    }

    /// Parse recorded events from a JSON array or from newline-delimited JSON
    pub fn parse_events(contents: &str) -> Result<Vec<StageEvent>, LoadError> {
        let trimmed = contents.trim_start();
        if trimmed.starts_with('[') {
            return serde_json::from_str(trimmed).map_err(|source| LoadError::Parse {
                line: source.line(),
                source,
            });
        }

        contents
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(index, line)| {
                serde_json::from_str(line).map_err(|source| LoadError::Parse {
                    line: index + 1,
                    source,
                })
            })
            .collect()
    }

    /// Load recorded events from a file, see [`parse_events`]
    pub fn load_events<P: AsRef<Path>>(path: P) -> Result<Vec<StageEvent>, LoadError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let events = parse_events(&contents)?;
        debug!(path = %path.display(), count = events.len(), "Loaded recorded events");
        Ok(events)
    }

    /// Resolve which run recorded events describe.
    ///
    /// An explicit run id wins, otherwise the events must all share one run.
    pub fn resolve_run_id(
        events: &[StageEvent],
        run_id: Option<&str>,
    ) -> Result<Option<String>, LoadError> {
        if let Some(run_id) = run_id {
            return Ok(Some(run_id.to_string()));
        }

        let runs: BTreeSet<&str> = events.iter().map(|event| event.run_id.as_str()).collect();
        match runs.len() {
            0 => Ok(None),
            1 => Ok(runs.into_iter().next().map(str::to_string)),
            _ => Err(LoadError::AmbiguousRun(
                runs.into_iter().map(str::to_string).collect(),
            )),
        }
    }

    /// Derive the snapshot of one run from recorded events.
    ///
    /// The events are merged the same way a live observer merges a fetch, so
    /// duplicated records and events of other runs are ignored.
    pub fn snapshot_of(
        table: &StageTable,
        events: Vec<StageEvent>,
        run_id: Option<&str>,
    ) -> Result<RunSnapshot, LoadError> {
        let Some(run_id) = resolve_run_id(&events, run_id)? else {
            let none: [StageEvent; 0] = [];
            return Ok(RunSnapshot::new(
                None,
                table.compute_status(&none, None),
                table.compute_progress(&none),
            ));
        };

        let mut reconciler = EventReconciler::new(run_id.as_str());
        reconciler.ingest(
            events.into_iter().filter(|event| event.run_id == run_id),
            Delivery::Fetch,
        );

        Ok(RunSnapshot::new(
            Some(run_id.clone()),
            table.compute_status(reconciler.events(), Some(run_id.as_str())),
            table.compute_progress(reconciler.events()),
        ))
    }
}
