use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Cooperative cancellation flag shared between a caller and a long-running
/// operation (model fit, simulation, optimizer search). Cheap to clone; all
/// clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Wall-clock budget checked alongside a [`CancelToken`]. Exceeding it is
/// treated exactly like an explicit cancellation.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Deadline {
    at: Option<std::time::Instant>,
}

impl Deadline {
    /// `secs == 0` disables the budget.
    pub(crate) fn after_secs(secs: u64) -> Self {
        Self {
            at: (secs > 0)
                .then(|| std::time::Instant::now() + std::time::Duration::from_secs(secs)),
        }
    }

    pub(crate) fn expired(&self) -> bool {
        self.at.is_some_and(|at| std::time::Instant::now() >= at)
    }
}

#[cfg(test)]
mod tests {
    use super::{CancelToken, Deadline};

    #[test]
    fn clones_share_the_flag() {
        let token = CancelToken::new();
        let other = token.clone();
        assert!(!other.is_cancelled());
        token.cancel();
        assert!(other.is_cancelled());
    }

    #[test]
    fn zero_deadline_never_expires() {
        assert!(!Deadline::after_secs(0).expired());
        assert!(!Deadline::after_secs(3_600).expired());
    }
}
