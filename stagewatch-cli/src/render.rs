use std::sync::Mutex;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use stagewatch::prelude::*;

/// Number of cells of the compact segmented bar
pub const SEGMENTS: usize = 10;

const FILLED: char = '■';
const EMPTY: char = '□';

/// Compact one line rendering of a snapshot, e.g. `[■■□□□□□□□□]  20% ...`
pub fn snapshot_line(snapshot: &RunSnapshot) -> String {
    let filled = Progress::new(snapshot.progress, snapshot.label.as_str()).filled_segments(SEGMENTS);
    let bar: String = (0..SEGMENTS)
        .map(|cell| if cell < filled { FILLED } else { EMPTY })
        .collect();

    format!(
        "[{bar}] {:>3}%  {} ({})",
        snapshot.progress, snapshot.label, snapshot.status
    )
}

/// Progress bar of a replayed run, also receives the terminal callbacks
pub struct ReplayBar {
    bar: ProgressBar,
    last_label: Mutex<Option<String>>,
    failure: Mutex<Option<String>>,
}

impl ReplayBar {
    pub fn new() -> Self {
        let bar = ProgressBar::new(100);
        bar.set_style(
            ProgressStyle::with_template("{spinner:.green} [{bar:40.cyan/blue}] {percent:>3}% {msg}")
                .map(|style| style.progress_chars("█▓▒░  "))
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        bar.enable_steady_tick(Duration::from_millis(120));
        bar.set_draw_target(ProgressDrawTarget::stderr_with_hz(30));
        bar.set_message("Connecting...");

        Self {
            bar,
            last_label: Mutex::new(None),
            failure: Mutex::new(None),
        }
    }

    /// Move the bar to a new snapshot, printing a line whenever the label changes
    pub fn update(&self, snapshot: &RunSnapshot) {
        self.bar.set_position(u64::from(snapshot.progress));
        self.bar.set_message(snapshot.label.clone());

        let mut last_label = self
            .last_label
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if last_label.as_deref() != Some(snapshot.label.as_str()) {
            self.bar.println(format!("⚙️  {}", snapshot.label));
            *last_label = Some(snapshot.label.clone());
        }
    }

    /// Message reported by the failure callback, if any
    pub fn failure(&self) -> Option<String> {
        self.failure
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn abandon(&self, message: &str) {
        self.bar.abandon_with_message(message.to_string());
    }

    pub fn finish(&self, snapshot: &RunSnapshot) {
        self.bar.finish_with_message(snapshot_line(snapshot));
    }
}

impl RunCallbacks for ReplayBar {
    fn on_complete(&self) {
        self.bar.println("🎉 Pipeline run completed");
    }

    fn on_error(&self, message: &str) {
        self.bar.println(format!("❗ Pipeline run failed: {message}"));
        *self
            .failure
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(message.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, "[□□□□□□□□□□]")]
    #[case(20, "[■■□□□□□□□□]")]
    #[case(45, "[■■■■■□□□□□]")]
    #[case(100, "[■■■■■■■■■■]")]
    fn segmented_bar(#[case] progress: u8, #[case] expected: &str) {
        let snapshot = RunSnapshot::new(
            Some("run-1".to_string()),
            PipelineStatus::Processing,
            Progress::new(progress, "Scoring your match"),
        );

        let line = snapshot_line(&snapshot);
        assert!(line.starts_with(expected), "{line}");
        assert!(line.ends_with("Scoring your match (processing)"), "{line}");
    }

    #[test]
    fn failure_callback_is_kept() {
        let bar = ReplayBar::new();
        bar.on_error("LLM error");
        assert_eq!(bar.failure().as_deref(), Some("LLM error"));
        bar.abandon("done");
    }
}
