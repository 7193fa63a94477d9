//! Progress reporting during date resolution

/// Observer notified while messages are resolved
pub trait Progress {
    /// One more message has been fetched
    fn tick(&mut self);

    /// Resolution is complete
    fn finish(&mut self, _processed: usize) {}
}

/// Progress observer that ignores everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl Progress for NoProgress {
    fn tick(&mut self) {}
}
