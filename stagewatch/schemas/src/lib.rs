//! # Stagewatch Schemas
//!
//! This crate contains the data model shared across the stagewatch workspace:
//! the stage events produced by an external pipeline, the statuses derived
//! from them and the serializable snapshot an observer publishes. Keeping
//! these types here lets the core engine, the CLI and any transport adapter
//! agree on a single wire format.

pub mod events;
pub mod progress;

pub use events::{EventStatus, StageEvent, StageEventBuilder};
pub use progress::{PipelineStatus, Progress, RunSnapshot, StageRange};
