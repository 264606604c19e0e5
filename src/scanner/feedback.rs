use crate::error::HoundError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Progress hooks for a running scan. Every hook defaults to a no-op.
///
/// Hooks may be called from several worker threads during a parallel scan.
pub trait ScanFeedback: Send + Sync {
    fn on_scan_start(&self, _class_count: usize) {}

    fn on_class_start(&self, _class: &str) {}

    fn on_class_complete(&self, _class: &str, _detections: usize) {}

    /// The class was skipped; the rest of the scan continues.
    fn on_class_failure(&self, _class: &str, _error: &HoundError) {}

    fn on_scan_complete(&self, _cancelled: bool) {}

    /// Polled before each signature is evaluated against a method.
    fn is_cancelled(&self) -> bool {
        false
    }
}

/// Shared stop flag. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

impl ScanFeedback for CancellationToken {
    fn is_cancelled(&self) -> bool {
        CancellationToken::is_cancelled(self)
    }
}

/// Optional collaborators for one scan.
#[derive(Clone, Copy, Default)]
pub struct ScanContext<'a> {
    feedback: Option<&'a dyn ScanFeedback>,
    cancellation: Option<&'a CancellationToken>,
}

impl<'a> ScanContext<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_feedback(mut self, feedback: &'a dyn ScanFeedback) -> Self {
        self.feedback = Some(feedback);
        self
    }

    #[must_use]
    pub fn with_cancellation(mut self, token: &'a CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_some_and(CancellationToken::is_cancelled)
            || self.feedback.is_some_and(|feedback| feedback.is_cancelled())
    }

    pub(crate) fn feedback(&self) -> Option<&'a dyn ScanFeedback> {
        self.feedback
    }
}

impl std::fmt::Debug for ScanContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanContext")
            .field("feedback", &self.feedback.is_some())
            .field("cancellation", &self.cancellation)
            .finish()
    }
}
