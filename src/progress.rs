//! Terminal progress for a comparison run

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Progress reporter for one comparison: a phase spinner, then a bar over the
/// tested columns
#[derive(Debug)]
pub struct ProgressReporter {
    pub phase_pb: Option<ProgressBar>,
    pub columns_pb: Option<ProgressBar>,
    show_progress: bool,
    start_time: std::time::Instant,
}

impl ProgressReporter {
    pub fn new() -> Self {
        Self {
            phase_pb: None,
            columns_pb: None,
            show_progress: true,
            start_time: std::time::Instant::now(),
        }
    }

    /// No progress bars (tests, JSON-only output)
    pub fn new_minimal() -> Self {
        Self {
            phase_pb: None,
            columns_pb: None,
            show_progress: false,
            start_time: std::time::Instant::now(),
        }
    }

    /// Show the current phase on the spinner, creating it on first use
    pub fn phase(&mut self, message: &str) {
        if !self.show_progress {
            return;
        }
        match &self.phase_pb {
            Some(pb) => pb.set_message(message.to_string()),
            None => self.phase_pb = Some(create_spinner(message)),
        }
    }

    /// Switch from the spinner to a bar over `total` columns
    pub fn start_columns(&mut self, total: u64) {
        if !self.show_progress {
            return;
        }
        if let Some(pb) = self.phase_pb.take() {
            pb.finish_and_clear();
        }
        self.columns_pb = Some(create_progress_bar(total, "Testing columns"));
    }

    pub fn column_done(&mut self, column: &str) {
        if let Some(pb) = &self.columns_pb {
            pb.set_message(column.to_string());
            pb.inc(1);
        }
    }

    pub fn finish(&mut self, message: &str) {
        if let Some(pb) = self.phase_pb.take() {
            pb.finish_and_clear();
        }
        if let Some(pb) = self.columns_pb.take() {
            pb.finish_with_message(format!(
                "{} in {:.1}s",
                message,
                self.start_time.elapsed().as_secs_f64()
            ));
        }
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ProgressReporter {
    fn drop(&mut self) {
        if let Some(pb) = self.phase_pb.take() {
            pb.finish_and_clear();
        }
        if let Some(pb) = self.columns_pb.take() {
            pb.finish_and_clear();
        }
    }
}

fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    let style = ProgressStyle::default_spinner()
        .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
        .template("{spinner:.green} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    pb.set_style(style);
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

fn create_progress_bar(total: u64, message: &str) -> ProgressBar {
    let pb = ProgressBar::new(total);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos:>4}/{len:4} {msg}")
        .map(|s| s.progress_chars("#>-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    pb.set_style(style);
    pb.set_message(message.to_string());
    pb
}
