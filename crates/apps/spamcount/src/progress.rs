//! Console spinner shown while message dates are resolved

use indicatif::{ProgressBar, ProgressStyle};
use mail::Progress;

/// Frames cycled through on each processed message; the last one is shown when finished
const SPINNER_FRAMES: &[&str] = &["|", "/", "-", "\\", " "];

/// Spinner on stderr advanced once per message
pub struct Spinner {
    bar: ProgressBar,
}

impl Spinner {
    pub fn new(quiet: bool) -> Self {
        let bar = if quiet {
            ProgressBar::hidden()
        } else {
            ProgressBar::new_spinner()
        };

        let style = ProgressStyle::with_template("{msg} {spinner}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(SPINNER_FRAMES);
        bar.set_style(style);
        bar.set_message("Processing messages...");

        Self { bar }
    }
}

impl Progress for Spinner {
    fn tick(&mut self) {
        self.bar.tick();
    }

    fn finish(&mut self, processed: usize) {
        self.bar.finish_and_clear();
        if !self.bar.is_hidden() {
            eprintln!("Processed {} messages.", processed);
        }
    }
}
