use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Shared "capture is active" switch.
///
/// Raised by a session once monitor registration succeeds and lowered either
/// by an administrative stop or by the session itself when it ends.
#[derive(Debug, Clone, Default)]
pub struct CaptureFlag(Arc<AtomicBool>);

impl CaptureFlag {
    /// Creates a lowered flag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks capture as active.
    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Asks the running session to stop.
    pub fn lower(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    /// Whether capture is active.
    #[must_use]
    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
