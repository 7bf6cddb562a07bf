//! Lifecycle pieces shared by the advertiser and scanner engines.

use std::fmt;

/// Consecutive radio faults an engine tolerates before aborting the run.
pub const MAX_CONSECUTIVE_RADIO_FAULTS: u32 = 5;

/// Engine lifecycle. Transitions only move forward:
/// `Initialized -> Running -> Stopping -> Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Constructed, not yet started.
    Initialized,
    /// Main loop active.
    Running,
    /// Stop reason latched, shutdown work in progress.
    Stopping,
    /// Terminal.
    Stopped,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Initialized => f.write_str("initialized"),
            Self::Running => f.write_str("running"),
            Self::Stopping => f.write_str("stopping"),
            Self::Stopped => f.write_str("stopped"),
        }
    }
}

/// Counts consecutive transient faults against a bound. Any success resets
/// the streak.
#[derive(Debug)]
pub(crate) struct FaultTracker {
    consecutive: u32,
    limit: u32,
}

impl FaultTracker {
    pub(crate) const fn new(limit: u32) -> Self {
        Self {
            consecutive: 0,
            limit,
        }
    }

    /// Record one fault; `true` once the bound is reached.
    pub(crate) fn record(&mut self) -> bool {
        self.consecutive += 1;
        self.consecutive >= self.limit
    }

    pub(crate) fn reset(&mut self) {
        self.consecutive = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracker_trips_at_bound() {
        let mut tracker = FaultTracker::new(3);
        assert!(!tracker.record());
        assert!(!tracker.record());
        assert!(tracker.record());
    }

    #[test]
    fn test_success_resets_streak() {
        let mut tracker = FaultTracker::new(2);
        assert!(!tracker.record());
        tracker.reset();
        assert!(!tracker.record());
        assert!(tracker.record());
    }

    #[test]
    fn test_state_display() {
        assert_eq!(RunState::Running.to_string(), "running");
        assert_eq!(RunState::Stopped.to_string(), "stopped");
    }
}
