//! Scan scheduling and timer bookkeeping.
//!
//! Timers in this crate never cancel their spawned sleep tasks; instead
//! each armed timer carries an epoch token, and a firing whose token no
//! longer matches is ignored. [`TimerEpoch`] is that bookkeeping, shared
//! by the scan, pending-connect, and reconnect timers.

use std::time::Duration;

use crate::constants::{scan_policy, timeouts};

/// Arm/cancel bookkeeping for one logical timer.
#[derive(Debug, Default)]
pub struct TimerEpoch {
    armed: bool,
    epoch: u64,
}

impl TimerEpoch {
    /// Arms the timer, invalidating any earlier firing. Returns the token
    /// the firing must present.
    pub fn arm(&mut self) -> u64 {
        self.epoch += 1;
        self.armed = true;
        self.epoch
    }

    pub fn cancel(&mut self) {
        self.armed = false;
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// True when a firing with this token is the one currently armed.
    /// Accepting disarms the timer.
    pub fn accept(&mut self, epoch: u64) -> bool {
        if self.armed && epoch == self.epoch {
            self.armed = false;
            true
        } else {
            false
        }
    }
}

/// Periodic scan policy: a short burst of quick scans after startup,
/// disconnect, or resume, then a long steady-state interval.
#[derive(Debug)]
pub struct ScanScheduler {
    timer: TimerEpoch,
    fast_scans_remaining: u32,
}

impl Default for ScanScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl ScanScheduler {
    pub fn new() -> Self {
        Self {
            timer: TimerEpoch::default(),
            fast_scans_remaining: scan_policy::NUM_FAST_SCAN_ATTEMPTS,
        }
    }

    /// Restarts the quick-scan burst.
    pub fn restart_fast(&mut self) {
        self.fast_scans_remaining = scan_policy::NUM_FAST_SCAN_ATTEMPTS;
    }

    /// Ends the quick-scan burst early, once results have arrived.
    pub fn end_fast(&mut self) {
        self.fast_scans_remaining = 0;
    }

    /// Arms the next scan tick, consuming one quick attempt if any remain.
    /// Returns the epoch token and the interval to sleep.
    pub fn arm(&mut self) -> (u64, Duration) {
        let interval = if self.fast_scans_remaining > 0 {
            self.fast_scans_remaining -= 1;
            timeouts::fast_scan_interval()
        } else {
            timeouts::scan_interval()
        };
        (self.timer.arm(), interval)
    }

    pub fn cancel(&mut self) {
        self.timer.cancel();
    }

    pub fn accept(&mut self, epoch: u64) -> bool {
        self.timer.accept(epoch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rearming_invalidates_earlier_token() {
        let mut timer = TimerEpoch::default();
        let first = timer.arm();
        let second = timer.arm();
        assert!(!timer.accept(first));
        assert!(timer.accept(second));
        // A token is consumed on acceptance.
        assert!(!timer.accept(second));
    }

    #[test]
    fn cancel_drops_pending_firing() {
        let mut timer = TimerEpoch::default();
        let token = timer.arm();
        timer.cancel();
        assert!(!timer.accept(token));
    }

    #[test]
    fn fast_burst_then_steady_interval() {
        let mut scheduler = ScanScheduler::new();
        for _ in 0..scan_policy::NUM_FAST_SCAN_ATTEMPTS {
            let (_, interval) = scheduler.arm();
            assert_eq!(interval, timeouts::fast_scan_interval());
        }
        let (_, interval) = scheduler.arm();
        assert_eq!(interval, timeouts::scan_interval());
    }

    #[test]
    fn ending_the_burst_skips_remaining_fast_attempts() {
        let mut scheduler = ScanScheduler::new();
        scheduler.arm();
        scheduler.end_fast();
        let (_, interval) = scheduler.arm();
        assert_eq!(interval, timeouts::scan_interval());
    }

    #[test]
    fn restart_fast_renews_burst() {
        let mut scheduler = ScanScheduler::new();
        for _ in 0..scan_policy::NUM_FAST_SCAN_ATTEMPTS + 1 {
            scheduler.arm();
        }
        scheduler.restart_fast();
        let (_, interval) = scheduler.arm();
        assert_eq!(interval, timeouts::fast_scan_interval());
    }
}
