//! Terminal progress bars

use indicatif::{ProgressBar, ProgressStyle};
use memdump::Progress;

/// An `indicatif` bar driven by library progress callbacks
pub struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    pub fn new(total: usize, message: &'static str) -> Self {
        let bar = ProgressBar::new(total as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        {
            bar.set_style(style.progress_chars("#>-"));
        }
        bar.set_message(message);
        Self { bar }
    }
}

impl Progress for BarProgress {
    fn advance(&self, completed: usize, total: usize) {
        self.bar.set_length(total as u64);
        self.bar.set_position(completed as u64);
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}
