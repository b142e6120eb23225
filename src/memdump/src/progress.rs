//! Progress reporting hook

/// Receives `(completed, total)` after every unit of work
///
/// Called from worker threads during post-processing, hence `Sync`.
pub trait Progress: Sync {
    fn advance(&self, completed: usize, total: usize);

    /// Called once when the phase is over
    fn finish(&self) {}
}

/// Discards all progress updates
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl Progress for NoProgress {
    fn advance(&self, _completed: usize, _total: usize) {}
}
