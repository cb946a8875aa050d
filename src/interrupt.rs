//! Cooperative cancellation for long-running conversions.
//!
//! Every pipeline stage polls its interrupter at the top of each parallel
//! iteration and inside flood-fill loops. When the interrupter trips, the
//! current operation winds down and the conversion returns
//! [`ConvertError::Interrupted`](crate::convert::ConvertError::Interrupted);
//! the output grids are left in a well-formed but partially computed state
//! that the caller should discard.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Capability polled by all pipeline stages for cooperative cancellation.
pub trait Interrupter: Sync {
    /// Returns `true` once the running conversion should abort.
    fn was_interrupted(&self) -> bool;
}

/// Interrupter that never trips.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullInterrupter;

impl Interrupter for NullInterrupter {
    #[inline(always)]
    fn was_interrupted(&self) -> bool {
        false
    }
}

/// Interrupter backed by a shared atomic flag.
///
/// Clone it, hand one copy to the converter, and call
/// [`interrupt`](AtomicInterrupter::interrupt) from any thread.
#[derive(Debug, Default, Clone)]
pub struct AtomicInterrupter {
    flag: Arc<AtomicBool>,
}

impl AtomicInterrupter {
    /// Create an un-tripped interrupter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Trip the flag; all holders observe the interrupt.
    pub fn interrupt(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }
}

impl Interrupter for AtomicInterrupter {
    #[inline]
    fn was_interrupted(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_never_trips() {
        assert!(!NullInterrupter.was_interrupted());
    }

    #[test]
    fn test_atomic_trips_all_clones() {
        let a = AtomicInterrupter::new();
        let b = a.clone();
        assert!(!b.was_interrupted());
        a.interrupt();
        assert!(b.was_interrupted());
    }
}
