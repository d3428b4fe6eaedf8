//! Progress and status derivation.
//!
//! Both functions are pure: they only look at the set of events handed to
//! them, never at arrival order or timestamps. Feeding any permutation of the
//! same events, with or without duplicates, yields the same result.

use std::cmp::Ordering;

use stagewatch_schemas::{EventStatus, PipelineStatus, Progress, StageEvent};
use tracing::debug;

use crate::stages::{
    default_stage_table, StageTable, COMPLETE_LABEL, COMPLETE_PERCENT, STARTING_LABEL,
};

/// Derive progress from the default stage table, see [`StageTable::compute_progress`]
pub fn compute_progress<'a, I>(events: I) -> Progress
where
    I: IntoIterator<Item = &'a StageEvent>,
{
    default_stage_table().compute_progress(events)
}

/// Derive the run status from the default stage table, see [`StageTable::compute_status`]
pub fn compute_status<'a, I>(events: I, run_id: Option<&str>) -> PipelineStatus
where
    I: IntoIterator<Item = &'a StageEvent>,
{
    default_stage_table().compute_status(events, run_id)
}

/// Message passed to `on_error` for a failed run
pub fn failure_message(failure: Option<&StageEvent>) -> String {
    match failure {
        Some(StageEvent {
            error: Some(error), ..
        }) => error.clone(),
        Some(event) => format!("Failed at stage: {}", event.stage),
        None => "Failed at stage: unknown".to_string(),
    }
}

impl StageTable {
    /// Derive `{progress, label}` for a set of events.
    ///
    /// - no events: `0` and the starting label
    /// - a failed event: the `min` and label of the failing stage
    /// - every stage completed: `100` and the completion label
    /// - otherwise the highest value reached by any `started` (stage `min`)
    ///   or `completed` (stage `max`) event, with that stage's label
    ///
    /// ```
    /// use stagewatch_core::stages::default_stage_table;
    /// use stagewatch_schemas::{EventStatus, StageEvent};
    ///
    /// let events: Vec<StageEvent> = [
    ///     ("parsing_jd", EventStatus::Completed),
    ///     ("parsing_cv", EventStatus::Completed),
    ///     ("normalizing", EventStatus::Completed),
    ///     ("structuring", EventStatus::Started),
    /// ]
    /// .into_iter()
    /// .enumerate()
    /// .map(|(i, (stage, status))| {
    ///     StageEvent::builder()
    ///         .id(format!("evt-{i}"))
    ///         .run_id("run-1")
    ///         .stage(stage)
    ///         .status(status)
    ///         .build()
    /// })
    /// .collect();
    ///
    /// let progress = default_stage_table().compute_progress(&events);
    /// assert_eq!(progress.progress, 20);
    /// assert_eq!(progress.label, "Analyzing your experience");
    /// ```
    pub fn compute_progress<'a, I>(&self, events: I) -> Progress
    where
        I: IntoIterator<Item = &'a StageEvent>,
    {
        let events: Vec<&StageEvent> = events.into_iter().collect();
        if events.is_empty() {
            return Progress::new(0, STARTING_LABEL);
        }

        if let Some(failed) = self.failure(events.iter().copied()) {
            return match self.get(&failed.stage) {
                Some(range) => Progress::new(range.min, range.label.as_str()),
                None => Progress::new(0, failed.stage.as_str()),
            };
        }

        let mut current = 0;
        let mut label = STARTING_LABEL;
        for event in &events {
            let Some(range) = self.get(&event.stage) else {
                debug!(stage = %event.stage, event_id = %event.id, "Ignoring event for unknown stage");
                continue;
            };

            match event.status {
                // a late start for an earlier stage must not pull progress back
                EventStatus::Started if range.min >= current => {
                    current = range.min;
                    label = range.label.as_str();
                }
                EventStatus::Completed if range.max > current => {
                    current = range.max;
                    label = range.label.as_str();
                }
                _ => {}
            }
        }

        if self.all_completed(events.iter().copied()) {
            return Progress::new(COMPLETE_PERCENT, COMPLETE_LABEL);
        }

        Progress::new(current, label)
    }

    /// Classify a run.
    ///
    /// An empty run id counts as absent. Completion is checked before
    /// failure, and failure before cancellation.
    pub fn compute_status<'a, I>(&self, events: I, run_id: Option<&str>) -> PipelineStatus
    where
        I: IntoIterator<Item = &'a StageEvent>,
    {
        if run_id.map_or(true, str::is_empty) {
            return PipelineStatus::Connecting;
        }

        let events: Vec<&StageEvent> = events.into_iter().collect();
        if events.is_empty() {
            return PipelineStatus::Processing;
        }

        if self.all_completed(events.iter().copied()) {
            PipelineStatus::Completed
        } else if events.iter().any(|event| event.status == EventStatus::Failed) {
            PipelineStatus::Failed
        } else if events
            .iter()
            .any(|event| event.status == EventStatus::Cancelled)
        {
            PipelineStatus::Cancelled
        } else {
            PipelineStatus::Processing
        }
    }

    /// The failed event that decides where progress freezes.
    ///
    /// When several stages report a failure the earliest one in pipeline
    /// order wins, unknown stages sort after known ones, and remaining ties
    /// are broken by stage name and event id.
    pub fn failure<'a, I>(&self, events: I) -> Option<&'a StageEvent>
    where
        I: IntoIterator<Item = &'a StageEvent>,
    {
        events
            .into_iter()
            .filter(|event| event.status == EventStatus::Failed)
            .min_by(|a, b| self.failure_order(a, b))
    }

    fn failure_order(&self, a: &StageEvent, b: &StageEvent) -> Ordering {
        let position = |event: &StageEvent| self.position(&event.stage).unwrap_or(usize::MAX);

        position(a)
            .cmp(&position(b))
            .then_with(|| a.stage.cmp(&b.stage))
            .then_with(|| a.id.cmp(&b.id))
    }
}
