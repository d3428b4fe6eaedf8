//! Derived progress types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Progress values below this percentage still allow a running pipeline to be cancelled
pub const CANCEL_WINDOW_PERCENT: u8 = 50;

/// One entry of the stage progress table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema_gen", derive(schemars::JsonSchema))]
pub struct StageRange {
    /// Stage name as reported by the pipeline
    pub name: String,
    /// Percentage shown once the stage has started
    pub min: u8,
    /// Percentage shown once the stage has completed
    pub max: u8,
    /// Human readable label for the stage
    pub label: String,
}

impl StageRange {
    pub fn new(name: impl Into<String>, min: u8, max: u8, label: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            min,
            max,
            label: label.into(),
        }
    }
}

/// Progress percentage together with the label to display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema_gen", derive(schemars::JsonSchema))]
pub struct Progress {
    /// Percentage in the range 0..=100
    pub progress: u8,
    /// Label describing the current stage
    pub label: String,
}

impl Progress {
    pub fn new(progress: u8, label: impl Into<String>) -> Self {
        Self {
            progress,
            label: label.into(),
        }
    }

    /// Number of filled cells in a segmented progress bar with `total` cells
    ///
    /// ```
    /// use stagewatch_schemas::Progress;
    ///
    /// assert_eq!(Progress::new(0, "").filled_segments(10), 0);
    /// assert_eq!(Progress::new(45, "").filled_segments(10), 5);
    /// assert_eq!(Progress::new(100, "").filled_segments(10), 10);
    /// ```
    pub fn filled_segments(&self, total: usize) -> usize {
        // half-up rounding, kept in integers
        (usize::from(self.progress.min(100)) * total + 50) / 100
    }
}

/// Classification of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "schema_gen", derive(schemars::JsonSchema))]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    /// No run identifier has been supplied yet
    Connecting,
    /// The run is known and has not reached a terminal state
    Processing,
    /// Every configured stage has completed
    Completed,
    /// At least one stage reported a failure
    Failed,
    /// The run was cancelled
    Cancelled,
}

impl PipelineStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PipelineStatus::Completed | PipelineStatus::Failed | PipelineStatus::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStatus::Connecting => "connecting",
            PipelineStatus::Processing => "processing",
            PipelineStatus::Completed => "completed",
            PipelineStatus::Failed => "failed",
            PipelineStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything an observer derives for one run at one point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema_gen", derive(schemars::JsonSchema))]
pub struct RunSnapshot {
    /// Observed run, `None` while no run identifier is known
    pub run_id: Option<String>,
    pub status: PipelineStatus,
    pub progress: u8,
    pub label: String,
}

impl RunSnapshot {
    pub fn new(run_id: Option<String>, status: PipelineStatus, progress: Progress) -> Self {
        Self {
            run_id,
            status,
            progress: progress.progress,
            label: progress.label,
        }
    }

    /// Whether a cancel request is still meaningful for this run
    pub fn can_cancel(&self) -> bool {
        self.status == PipelineStatus::Processing && self.progress < CANCEL_WINDOW_PERCENT
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
