//! Once-guard for terminal notifications.

use stagewatch_schemas::{PipelineStatus, StageEvent};
use tracing::{debug, info};

use crate::callbacks::RunCallbacks;
use crate::progress::failure_message;

/// Last terminal notification fired for a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Notified {
    #[default]
    None,
    Complete,
    Error,
}

/// Translates a terminal status into exactly one callback per run.
///
/// `cancelled` never notifies, cancellation is surfaced by whoever issued it.
#[derive(Debug, Default)]
pub struct NotificationGuard {
    notified: Notified,
}

impl NotificationGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notified(&self) -> Notified {
        self.notified
    }

    /// Forget any fired notification, used when a new run starts
    pub fn reset(&mut self) {
        self.notified = Notified::None;
    }

    /// Fire the callback matching `status` unless it already fired.
    ///
    /// `failure` is the failed event that decided the status, its error is
    /// forwarded to `on_error`. Returns the notification fired by this call.
    pub fn dispatch(
        &mut self,
        status: PipelineStatus,
        failure: Option<&StageEvent>,
        callbacks: &dyn RunCallbacks,
    ) -> Option<Notified> {
        match status {
            PipelineStatus::Completed if self.notified != Notified::Complete => {
                self.notified = Notified::Complete;
                info!("Firing completion notification");
                callbacks.on_complete();
                Some(Notified::Complete)
            }
            PipelineStatus::Failed if self.notified != Notified::Error => {
                self.notified = Notified::Error;
                let message = failure_message(failure);
                info!(%message, "Firing failure notification");
                callbacks.on_error(&message);
                Some(Notified::Error)
            }
            _ => {
                debug!(%status, notified = ?self.notified, "No notification to fire");
                None
            }
        }
    }
}
