/// Coalesces any number of reconciliation requests into one pass per frame.
#[derive(Debug, Default)]
pub struct FrameScheduler {
    pending: bool,
    passes: u64,
}

impl FrameScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if this call scheduled a new frame callback.
    pub fn request(&mut self) -> bool {
        if self.pending {
            return false;
        }
        self.pending = true;
        true
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// Drops a scheduled pass without running it.
    pub fn cancel(&mut self) {
        self.pending = false;
    }

    /// Frame callback: runs `pass` once if anything was requested since the last frame.
    pub fn run_frame<T>(&mut self, pass: impl FnOnce() -> T) -> Option<T> {
        if !self.pending {
            return None;
        }
        self.pending = false;
        self.passes += 1;
        Some(pass())
    }

    pub fn passes(&self) -> u64 {
        self.passes
    }
}
