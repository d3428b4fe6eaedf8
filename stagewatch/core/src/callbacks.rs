use std::fmt;

use tracing::{error, info, instrument};

/// Receiver of the terminal notifications of a run.
///
/// Implement this trait to react when an observed pipeline run finishes.
/// Each method is called at most once per run: the observer guards both
/// notifications so that repeated polling or duplicate pushes after the
/// run has finished never notify twice.
///
/// # Examples
///
/// ```rust
/// use stagewatch_core::callbacks::RunCallbacks;
///
/// struct Toast;
///
/// impl RunCallbacks for Toast {
///     fn on_complete(&self) {
///         println!("Your report is ready");
///     }
///
///     fn on_error(&self, message: &str) {
///         println!("Analysis failed: {message}");
///     }
/// }
/// ```
pub trait RunCallbacks: Send + Sync {
    /// Called once every configured stage has completed
    fn on_complete(&self);

    /// Called when the run reports a failed stage
    ///
    /// # Arguments
    ///
    /// * `message` - The error of the failed event, or a message naming the failed stage
    fn on_error(&self, message: &str);
}

/// Callbacks that only log through `tracing`
#[derive(Debug, Default)]
pub struct LoggingCallbacks;

impl RunCallbacks for LoggingCallbacks {
    #[instrument(skip_all)]
    fn on_complete(&self) {
        info!("🎉 Pipeline run completed");
    }

    #[instrument(skip_all)]
    fn on_error(&self, message: &str) {
        error!(error = message, "❗ Pipeline run failed");
    }
}

type CompleteFn = Box<dyn Fn() + Send + Sync>;
type ErrorFn = Box<dyn Fn(&str) + Send + Sync>;

/// Callbacks assembled from closures, unset hooks do nothing
#[derive(Default)]
pub struct FnCallbacks {
    complete: Option<CompleteFn>,
    error: Option<ErrorFn>,
}

impl FnCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_complete(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.complete = Some(Box::new(f));
        self
    }

    pub fn with_error(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.error = Some(Box::new(f));
        self
    }
}

impl fmt::Debug for FnCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnCallbacks")
            .field("complete", &self.complete.is_some())
            .field("error", &self.error.is_some())
            .finish()
    }
}

impl RunCallbacks for FnCallbacks {
    fn on_complete(&self) {
        if let Some(complete) = &self.complete {
            complete();
        }
    }

    fn on_error(&self, message: &str) {
        if let Some(error) = &self.error {
            error(message);
        }
    }
}
