//! [`LinkMonitor`] – heartbeat tracker for the operator network link.
//!
//! The network collaborator holds a clone and calls [`LinkMonitor::beat`]
//! whenever traffic arrives; the control loop asks for
//! [`LinkMonitor::status`] once per tick. Clones share one timestamp, so
//! beating never needs a lock or a channel round-trip.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Utc};
use patrol_types::LinkStatus;

/// Shared last-heartbeat timestamp with a grace period.
///
/// # Example
///
/// ```
/// use chrono::{Duration, Utc};
/// use patrol_kernel::link_monitor::LinkMonitor;
/// use patrol_types::LinkStatus;
///
/// let link = LinkMonitor::new(1_000);
/// let network_side = link.clone();
/// network_side.beat();
/// assert_eq!(link.status(Utc::now()), LinkStatus::Alive);
/// assert!(matches!(link.status(Utc::now() + Duration::seconds(5)), LinkStatus::Lost { .. }));
/// ```
#[derive(Debug, Clone)]
pub struct LinkMonitor {
    last_beat_ms: Arc<AtomicI64>,
    grace_ms: u64,
}

impl LinkMonitor {
    /// Create a monitor whose link counts as alive from now on.
    pub fn new(grace_ms: u64) -> Self {
        Self {
            last_beat_ms: Arc::new(AtomicI64::new(Utc::now().timestamp_millis())),
            grace_ms,
        }
    }

    /// Record a heartbeat at the current time.
    pub fn beat(&self) {
        self.beat_at(Utc::now());
    }

    /// Record a heartbeat at `at`. Older timestamps than the latest one are
    /// ignored.
    pub fn beat_at(&self, at: DateTime<Utc>) {
        self.last_beat_ms
            .fetch_max(at.timestamp_millis(), Ordering::AcqRel);
    }

    /// `Alive` while the last heartbeat is within the grace period of `now`.
    pub fn status(&self, now: DateTime<Utc>) -> LinkStatus {
        let last = self.last_beat_ms.load(Ordering::Acquire);
        let silent_for_ms = u64::try_from(now.timestamp_millis() - last).unwrap_or(0);
        if silent_for_ms > self.grace_ms {
            LinkStatus::Lost { silent_for_ms }
        } else {
            LinkStatus::Alive
        }
    }

    pub fn grace_ms(&self) -> u64 {
        self.grace_ms
    }
}
