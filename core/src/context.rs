//! Caller context: cancellation and deadline for one entry-point call.

use crate::error::{SimError, SimResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const SLEEP_SLICE: Duration = Duration::from_millis(10);

/// Clonable cancellation flag. Cancelling any clone cancels them all.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Default)]
pub struct CallContext {
    cancel: CancelHandle,
    deadline: Option<Instant>,
}

impl CallContext {
    /// A context that is never cancelled and has no deadline.
    pub fn background() -> Self {
        Self::default()
    }

    pub fn with_cancel(mut self, handle: CancelHandle) -> Self {
        self.cancel = handle;
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn check(&self) -> SimResult<()> {
        if self.cancel.is_cancelled() {
            return Err(SimError::Cancelled);
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(SimError::DeadlineExceeded);
            }
        }
        Ok(())
    }

    /// Sleep for `total`, waking in short slices to observe cancellation.
    pub fn sleep(&self, total: Duration) -> SimResult<()> {
        let until = Instant::now() + total;
        loop {
            self.check()?;
            let now = Instant::now();
            if now >= until {
                return Ok(());
            }
            let mut slice = (until - now).min(SLEEP_SLICE);
            if let Some(deadline) = self.deadline {
                slice = slice.min(deadline.saturating_duration_since(now));
            }
            std::thread::sleep(slice);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancelled_context_fails_check() {
        let ctx = CallContext::background();
        ctx.cancel_handle().cancel();
        assert!(matches!(ctx.check(), Err(SimError::Cancelled)));
    }

    #[test]
    fn sleep_stops_at_deadline() {
        let ctx = CallContext::background().with_timeout(Duration::from_millis(20));
        let started = Instant::now();
        let res = ctx.sleep(Duration::from_secs(5));
        assert!(matches!(res, Err(SimError::DeadlineExceeded)));
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
