use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

type ProgressFn = dyn Fn(f64) + Send + Sync;

/// Shared state to stop a long running batch and observe its progress.
///
/// The abort flag is checked between units of work (cameras, frames, tracks); a unit that
/// already started always completes.
#[derive(Clone, Default)]
pub struct RunControl {
    abort: Arc<AtomicBool>,
    progress: Option<Arc<ProgressFn>>,
}

impl std::fmt::Debug for RunControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunControl")
            .field("aborted", &self.is_aborted())
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

impl RunControl {
    /// Create a control with a fresh abort flag and no progress callback.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a control observing an existing abort flag, e.g. one set by a signal handler.
    pub fn with_abort_flag(abort: Arc<AtomicBool>) -> Self {
        Self {
            abort,
            progress: None,
        }
    }

    /// Attach a callback receiving the completed percentage in `[0, 100]`.
    pub fn on_progress(mut self, callback: impl Fn(f64) + Send + Sync + 'static) -> Self {
        self.progress = Some(Arc::new(callback));
        self
    }

    /// The abort flag shared with the signal handler.
    pub fn abort_flag(&self) -> Arc<AtomicBool> {
        self.abort.clone()
    }

    /// Request the batch to stop before its next unit of work.
    pub fn abort(&self) {
        self.abort.store(true, Ordering::SeqCst);
    }

    /// Whether an abort was requested.
    pub fn is_aborted(&self) -> bool {
        self.abort.load(Ordering::SeqCst)
    }

    /// Start counting `total` units of work.
    pub(crate) fn tracker(&self, total: usize) -> ProgressTracker<'_> {
        ProgressTracker {
            control: self,
            done: AtomicUsize::new(0),
            total,
        }
    }
}

/// Counts finished units and forwards the percentage to the callback.
pub(crate) struct ProgressTracker<'a> {
    control: &'a RunControl,
    done: AtomicUsize,
    total: usize,
}

impl ProgressTracker<'_> {
    /// Mark one unit as finished.
    pub(crate) fn advance(&self) {
        let done = self.done.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(callback) = &self.control.progress {
            let percent = if self.total == 0 {
                100.0
            } else {
                100.0 * done as f64 / self.total as f64
            };
            callback(percent.min(100.0));
        }
    }
}
