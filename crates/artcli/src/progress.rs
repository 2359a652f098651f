//! Terminal progress bars for transfers.

use std::sync::{Mutex, PoisonError};

use artifacts::Progress;
use indicatif::{ProgressBar, ProgressStyle};

/// One bar per transfer, drawn on stderr. indicatif hides it when stderr is
/// not a terminal.
pub struct BarProgress {
    bar: Mutex<ProgressBar>,
}

impl BarProgress {
    pub fn new() -> Self {
        Self {
            bar: Mutex::new(ProgressBar::hidden()),
        }
    }

    fn style() -> ProgressStyle {
        ProgressStyle::default_bar()
            .template("{msg:<24} [{bar:40.green/dim}] {pos}/{len} parts")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓▒░ ")
    }
}

impl Default for BarProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl Progress for BarProgress {
    fn begin(&self, label: &str, total: u64) {
        let bar = ProgressBar::new(total);
        bar.set_style(Self::style());
        bar.set_message(label.to_string());
        *self.bar.lock().unwrap_or_else(PoisonError::into_inner) = bar;
    }

    fn advance(&self, n: u64) {
        self.bar
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .inc(n);
    }

    fn finish(&self) {
        self.bar
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .finish_and_clear();
    }
}
