//! Completion counters.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// An increment-only tally of completed operations.
///
/// Counters carry no events; they are bumped by the progress engine next to
/// (not instead of) CQ delivery.
pub struct Counter {
    inner: Arc<AtomicU64>,
}

impl_shared_handle!(Counter, "Counter");

impl Default for Counter {
    fn default() -> Self {
        Self::new()
    }
}

impl Counter {
    /// Create a counter at zero.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Add `n` to the counter.
    #[inline]
    pub fn add(&self, n: u64) {
        self.inner.fetch_add(n, Ordering::AcqRel);
    }

    /// Read the current value.
    #[inline]
    pub fn read(&self) -> u64 {
        self.inner.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_tally() {
        let a = Counter::new();
        let b = a.clone();
        a.add(2);
        b.add(3);
        assert_eq!(a.read(), 5);
        assert_eq!(a, b);
        assert_ne!(a, Counter::default());
    }
}
