//! Cooperative cancellation for long-running fetches.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Shared flag asking a running pipeline to stop.
///
/// Checked between statement fetches and while a fetch waits for quota or
/// backs off, never in the middle of a request.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// Create an unset flag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// True once cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// When a fetch has to give up: a cancel flag, a deadline, both or neither.
#[derive(Clone, Debug, Default)]
pub struct StopSignal {
    cancel: Option<CancelFlag>,
    deadline: Option<Instant>,
}

impl StopSignal {
    /// A signal that never fires.
    #[must_use]
    pub fn never() -> Self {
        Self::default()
    }

    /// Fires when `cancel` is set or `deadline` passes.
    #[must_use]
    pub const fn new(cancel: CancelFlag, deadline: Option<Instant>) -> Self {
        Self {
            cancel: Some(cancel),
            deadline,
        }
    }

    /// True once the flag is set or the deadline has passed.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancelFlag::is_cancelled)
            || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Time left before the deadline, `None` without one.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_never_fires() {
        let stop = StopSignal::never();
        assert!(!stop.is_stopped());
        assert_eq!(stop.remaining(), None);
    }

    #[test]
    fn test_cancel_flag_is_shared() {
        let flag = CancelFlag::new();
        let stop = StopSignal::new(flag.clone(), None);
        assert!(!stop.is_stopped());

        flag.cancel();
        assert!(stop.is_stopped());
        assert!(stop.clone().is_stopped());
    }

    #[test]
    fn test_deadline() {
        let past = StopSignal::new(CancelFlag::new(), Some(Instant::now()));
        assert!(past.is_stopped());
        assert_eq!(past.remaining(), Some(Duration::ZERO));

        let later = Instant::now() + Duration::from_secs(3600);
        let future = StopSignal::new(CancelFlag::new(), Some(later));
        assert!(!future.is_stopped());
        assert!(future.remaining().unwrap() > Duration::from_secs(3500));
    }
}
