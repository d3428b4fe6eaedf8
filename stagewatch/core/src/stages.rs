//! The stage progress table.
//!
//! Each configured stage owns a contiguous band of the progress scale. A
//! stage that has started shows the lower bound of its band, a completed
//! stage shows the upper bound. The band above the last stage is reserved
//! for the all-complete state.

use std::collections::HashSet;
use std::sync::OnceLock;

use stagewatch_schemas::{EventStatus, StageEvent, StageRange};
use thiserror::Error;

/// Number of stages in the default table
pub const STAGE_COUNT: usize = 10;

/// Upper bound of the last stage, the rest of the scale is reserved for completion
pub const RESERVED_FROM: u8 = 95;

/// Progress reported once every stage has completed
pub const COMPLETE_PERCENT: u8 = 100;

/// Label shown before any known stage has reported
pub const STARTING_LABEL: &str = "Starting analysis...";

/// Label shown once every stage has completed
pub const COMPLETE_LABEL: &str = "Analysis complete";

static DEFAULT_TABLE: OnceLock<StageTable> = OnceLock::new();

/// Errors raised when a stage table violates its invariants
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StageTableError {
    #[error("stage table must contain at least one stage")]
    Empty,

    #[error("stage '{0}' is configured more than once")]
    DuplicateStage(String),

    #[error("stage '{stage}' has an empty range ({min}..{max})")]
    EmptyRange { stage: String, min: u8, max: u8 },

    #[error("first stage '{stage}' must start at 0, found {min}")]
    FirstMinNotZero { stage: String, min: u8 },

    #[error("stage '{stage}' must start at {expected} to follow the previous stage, found {found}")]
    NotContiguous {
        stage: String,
        expected: u8,
        found: u8,
    },

    #[error("last stage '{stage}' must end at {}, found {max}", RESERVED_FROM)]
    ReservedBand { stage: String, max: u8 },
}

/// Ordered, validated list of stage ranges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageTable {
    ranges: Vec<StageRange>,
}

/// The process wide default table
pub fn default_stage_table() -> &'static StageTable {
    DEFAULT_TABLE.get_or_init(|| StageTable {
        ranges: vec![
            StageRange::new("parsing_jd", 0, 5, "Reading job description"),
            StageRange::new("parsing_cv", 5, 10, "Reading your CV"),
            StageRange::new("normalizing", 10, 20, "Reviewing role requirements"),
            StageRange::new("structuring", 20, 30, "Analyzing your experience"),
            StageRange::new("scoring", 30, 45, "Scoring your match"),
            StageRange::new("patching", 45, 55, "Generating improvement suggestions"),
            StageRange::new("explaining", 55, 65, "Writing score explanations"),
            StageRange::new("readiness", 65, 75, "Assessing your readiness"),
            StageRange::new("strategy", 75, 85, "Building career strategies"),
            StageRange::new("questions", 85, 95, "Predicting interview questions"),
        ],
    })
}

impl Default for StageTable {
    fn default() -> Self {
        default_stage_table().clone()
    }
}

impl StageTable {
    /// Build a custom table, validating that the ranges are ordered,
    /// contiguous and leave the completion band free.
    pub fn try_new(ranges: Vec<StageRange>) -> Result<Self, StageTableError> {
        let (first, last) = match (ranges.first(), ranges.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => return Err(StageTableError::Empty),
        };

        if first.min != 0 {
            return Err(StageTableError::FirstMinNotZero {
                stage: first.name.clone(),
                min: first.min,
            });
        }

        let mut seen = HashSet::new();
        let mut expected_min = 0;
        for range in &ranges {
            if !seen.insert(range.name.as_str()) {
                return Err(StageTableError::DuplicateStage(range.name.clone()));
            }
            if range.min >= range.max {
                return Err(StageTableError::EmptyRange {
                    stage: range.name.clone(),
                    min: range.min,
                    max: range.max,
                });
            }
            if range.min != expected_min {
                return Err(StageTableError::NotContiguous {
                    stage: range.name.clone(),
                    expected: expected_min,
                    found: range.min,
                });
            }
            expected_min = range.max;
        }

        if last.max != RESERVED_FROM {
            return Err(StageTableError::ReservedBand {
                stage: last.name.clone(),
                max: last.max,
            });
        }

        Ok(Self { ranges })
    }

    pub fn ranges(&self) -> &[StageRange] {
        &self.ranges
    }

    pub fn iter(&self) -> std::slice::Iter<'_, StageRange> {
        self.ranges.iter()
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn get(&self, stage: &str) -> Option<&StageRange> {
        self.ranges.iter().find(|range| range.name == stage)
    }

    /// Position of a stage in pipeline order
    pub fn position(&self, stage: &str) -> Option<usize> {
        self.ranges.iter().position(|range| range.name == stage)
    }

    /// True when every configured stage has at least one `completed` event
    pub fn all_completed<'a, I>(&self, events: I) -> bool
    where
        I: IntoIterator<Item = &'a StageEvent>,
    {
        let completed: HashSet<&str> = events
            .into_iter()
            .filter(|event| event.status == EventStatus::Completed)
            .map(|event| event.stage.as_str())
            .collect();

        self.ranges
            .iter()
            .all(|range| completed.contains(range.name.as_str()))
    }
}
