use kdam::{Bar, BarExt, tqdm};

/// Receives `(current, total)` updates from long-running operations.
///
/// `current` increases by one per processed item and ends at `total`.
/// There is no cancellation: returning from the callback always lets the
/// operation continue.
pub trait Progress {
    fn update(&mut self, current: usize, total: usize);
}

impl<F> Progress for F
where
    F: FnMut(usize, usize),
{
    fn update(&mut self, current: usize, total: usize) {
        (self)(current, total)
    }
}

/// Discards every update.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl Progress for NoProgress {
    fn update(&mut self, _current: usize, _total: usize) {}
}

/// Terminal progress bar on stderr.
pub struct BarProgress {
    bar: Bar,
}

impl BarProgress {
    pub fn new(desc: &str) -> Self {
        Self {
            bar: tqdm!(desc = desc, leave = true),
        }
    }
}

impl Progress for BarProgress {
    fn update(&mut self, current: usize, total: usize) {
        self.bar.total = total;
        // A failed terminal write must not abort the operation.
        let _ = self.bar.update_to(current);
    }
}

impl std::fmt::Debug for BarProgress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BarProgress").finish_non_exhaustive()
    }
}
