use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use crate::error::{PipelineError, Result};

/// Cooperative cancellation flag shared between the caller and a running stage.
///
/// Stages poll it between lines (every `LINE_CHECK_INTERVAL`) and between query chunks.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

/// How many input lines a streaming stage processes between checks.
pub const LINE_CHECK_INTERVAL: u64 = 4096;

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Returns `Err(Cancelled)` once `cancel` has been called.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(PipelineError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Check only on every `LINE_CHECK_INTERVAL`-th line.
    pub fn check_at_line(&self, line_no: u64) -> Result<()> {
        if line_no % LINE_CHECK_INTERVAL == 0 {
            self.check()
        } else {
            Ok(())
        }
    }
}
