//! [`RetryGuard`] – repeated-detour detector.
//!
//! Detects when the robot keeps re-planning around the same waypoint
//! without ever reaching it, so the patrol machine can give up and halt
//! instead of circling an obstacle forever.
//!
//! # Algorithm
//!
//! The guard keeps a rolling window of the last `threshold` detour targets.
//! After each [`RetryGuard::record`] it checks whether every entry in a full
//! window names the same waypoint. Reaching any waypoint clears the window.
//!
//! # Example
//!
//! ```rust
//! use patrol_runtime::retry_guard::RetryGuard;
//!
//! let mut guard = RetryGuard::new(3);
//!
//! assert!(!guard.record("wp-2"));
//! assert!(!guard.record("wp-2"));
//! assert!(guard.record("wp-2")); // third detour for wp-2 → give up
//!
//! guard.reset();
//! assert!(!guard.record("wp-2"));
//! ```

use std::collections::VecDeque;

// ─────────────────────────────────────────────────────────────────────────────
// RetryGuard
// ─────────────────────────────────────────────────────────────────────────────

pub struct RetryGuard {
    /// Consecutive detours for one target that count as exhausted.
    threshold: usize,
    /// Target waypoint ids of the most recent detours.
    history: VecDeque<String>,
}

impl RetryGuard {
    /// `threshold` of 0 is treated as 1.
    pub fn new(threshold: usize) -> Self {
        let threshold = threshold.max(1);
        Self {
            threshold,
            history: VecDeque::with_capacity(threshold),
        }
    }

    /// Record a detour planned towards `target_id`.
    ///
    /// Returns `true` once `threshold` consecutive detours have aimed at the
    /// same target.
    pub fn record(&mut self, target_id: &str) -> bool {
        self.history.push_back(target_id.to_string());
        while self.history.len() > self.threshold {
            self.history.pop_front();
        }
        self.is_exhausted()
    }

    pub fn is_exhausted(&self) -> bool {
        if self.history.len() < self.threshold {
            return false;
        }
        let first = &self.history[0];
        self.history.iter().all(|t| t == first)
    }

    /// Number of detours in the current streak.
    pub fn streak(&self) -> usize {
        let Some(last) = self.history.back() else {
            return 0;
        };
        self.history.iter().rev().take_while(|t| *t == last).count()
    }

    /// Clear all history, typically after a waypoint is reached.
    pub fn reset(&mut self) {
        self.history.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detours_for_different_targets_never_exhaust() {
        let mut guard = RetryGuard::new(3);
        assert!(!guard.record("wp-1"));
        assert!(!guard.record("wp-2"));
        assert!(!guard.record("wp-1"));
    }

    #[test]
    fn exhausts_at_threshold() {
        let mut guard = RetryGuard::new(3);
        assert!(!guard.record("wp-4"));
        assert!(!guard.record("wp-4"));
        assert!(guard.record("wp-4"));
        assert!(guard.record("wp-4"));
    }

    #[test]
    fn reset_clears_streak() {
        let mut guard = RetryGuard::new(2);
        guard.record("wp-0");
        assert!(guard.record("wp-0"));
        guard.reset();
        assert_eq!(guard.streak(), 0);
        assert!(!guard.record("wp-0"));
    }

    #[test]
    fn window_slides_past_older_targets() {
        let mut guard = RetryGuard::new(3);
        guard.record("a");
        guard.record("b");
        guard.record("c");
        assert!(!guard.is_exhausted());
        guard.record("c");
        assert_eq!(guard.streak(), 2);
        assert!(guard.record("c"));
    }

    #[test]
    fn zero_threshold_behaves_like_one() {
        let mut guard = RetryGuard::new(0);
        assert!(guard.record("wp-0"));
    }
}
