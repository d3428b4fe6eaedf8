use stagewatch_schemas::{RunSnapshot, StageEvent};

use crate::callbacks::RunCallbacks;
use crate::dispatch::{NotificationGuard, Notified};
use crate::reconciler::{Delivery, EventReconciler};
use crate::stages::StageTable;

/// State owned by whoever observes one run: the merged events and the once-guard.
///
/// A new run gets a new `RunState`, which is how the once-guard resets.
#[derive(Debug)]
pub struct RunState {
    reconciler: EventReconciler,
    guard: NotificationGuard,
}

impl RunState {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            reconciler: EventReconciler::new(run_id),
            guard: NotificationGuard::new(),
        }
    }

    pub fn run_id(&self) -> &str {
        self.reconciler.run_id()
    }

    pub fn events(&self) -> impl Iterator<Item = &StageEvent> {
        self.reconciler.events()
    }

    pub fn notified(&self) -> Notified {
        self.guard.notified()
    }

    /// Merge a batch, see [`EventReconciler::ingest`]
    pub fn ingest<I>(&mut self, batch: I, delivery: Delivery) -> bool
    where
        I: IntoIterator<Item = StageEvent>,
    {
        self.reconciler.ingest(batch, delivery)
    }

    /// Derive the snapshot without touching the once-guard
    pub fn snapshot(&self, table: &StageTable) -> RunSnapshot {
        let run_id = self.reconciler.run_id();
        let status = table.compute_status(self.reconciler.events(), Some(run_id));
        let progress = table.compute_progress(self.reconciler.events());

        RunSnapshot::new(Some(run_id.to_string()), status, progress)
    }

    /// Derive the snapshot and fire any pending terminal notification
    pub fn refresh(&mut self, table: &StageTable, callbacks: &dyn RunCallbacks) -> RunSnapshot {
        let snapshot = self.snapshot(table);
        let failure = table.failure(self.reconciler.events());
        self.guard.dispatch(snapshot.status, failure, callbacks);

        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callbacks::FnCallbacks;
    use crate::stages::default_stage_table;
    use stagewatch_schemas::{EventStatus, PipelineStatus};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn event(id: &str, stage: &str, status: EventStatus) -> StageEvent {
        StageEvent::builder()
            .id(id)
            .run_id("run-1")
            .stage(stage)
            .status(status)
            .build()
    }

    #[test]
    fn repeated_refresh_after_completion_notifies_once() {
        let completed = Arc::new(AtomicUsize::new(0));
        let c = completed.clone();
        let callbacks = FnCallbacks::new().with_complete(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });

        let table = default_stage_table();
        let mut state = RunState::new("run-1");
        let batch: Vec<StageEvent> = table
            .iter()
            .map(|range| event(&range.name, &range.name, EventStatus::Completed))
            .collect();

        // every poll re-delivers the full batch
        for _ in 0..4 {
            state.ingest(batch.clone(), Delivery::Fetch);
            let snapshot = state.refresh(table, &callbacks);
            assert_eq!(snapshot.status, PipelineStatus::Completed);
            assert_eq!(snapshot.progress, 100);
        }

        assert_eq!(completed.load(Ordering::SeqCst), 1);
        assert_eq!(state.notified(), Notified::Complete);
    }

    #[test]
    fn failure_message_names_stage_without_error() {
        let messages = Arc::new(std::sync::Mutex::new(Vec::new()));
        let m = messages.clone();
        let callbacks =
            FnCallbacks::new().with_error(move |message| m.lock().unwrap().push(message.to_string()));

        let mut state = RunState::new("run-1");
        state.ingest(
            [
                event("e1", "parsing_jd", EventStatus::Completed),
                event("e2", "parsing_cv", EventStatus::Failed),
            ],
            Delivery::Push,
        );

        let snapshot = state.refresh(default_stage_table(), &callbacks);
        assert_eq!(snapshot.status, PipelineStatus::Failed);
        assert_eq!(snapshot.progress, 5);
        assert_eq!(snapshot.label, "Reading your CV");
        assert_eq!(
            *messages.lock().unwrap(),
            vec!["Failed at stage: parsing_cv".to_string()]
        );
    }
}
