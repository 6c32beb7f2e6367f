//! Constants for timers, scan policy, and passphrase formats.
//!
//! Timer values follow the connection-manager conventions for station
//! behavior: a short bounded window for an in-flight association, a burst
//! of quick scans after startup or disconnection, and a long steady-state
//! scan interval.

/// Timer and interval constants.
pub mod timeouts {
    use std::time::Duration;

    /// Bound on an in-flight connection attempt.
    pub const PENDING_TIMEOUT_SECONDS: u64 = 15;

    /// Bound on waiting for the supplicant to re-associate on its own
    /// after an unexpected link loss.
    pub const RECONNECT_TIMEOUT_SECONDS: u64 = 10;

    /// Steady-state interval between scans.
    pub const SCAN_INTERVAL_SECONDS: u64 = 180;

    /// Interval between scans during the fast-scan burst.
    pub const FAST_SCAN_INTERVAL_SECONDS: u64 = 10;

    /// Maximum age of cached BSS entries flushed after a system resume.
    pub const MAX_BSS_RESUME_AGE_SECONDS: u32 = 10;

    pub fn pending_timeout() -> Duration {
        Duration::from_secs(PENDING_TIMEOUT_SECONDS)
    }

    pub fn reconnect_timeout() -> Duration {
        Duration::from_secs(RECONNECT_TIMEOUT_SECONDS)
    }

    pub fn scan_interval() -> Duration {
        Duration::from_secs(SCAN_INTERVAL_SECONDS)
    }

    pub fn fast_scan_interval() -> Duration {
        Duration::from_secs(FAST_SCAN_INTERVAL_SECONDS)
    }
}

/// Scan attempt budgets.
pub mod scan_policy {
    /// Number of quick scan attempts after startup or disconnect.
    pub const NUM_FAST_SCAN_ATTEMPTS: u32 = 3;
}

/// Background-scan parameters passed to the supplicant per network.
pub mod bgscan {
    pub const METHOD: &str = "simple";
    pub const SHORT_INTERVAL_SECONDS: u16 = 30;
    pub const SIGNAL_THRESHOLD_DBM: i32 = -50;
    pub const LONG_INTERVAL_SECONDS: u16 = 180;
}

/// IEEE 802.11 passphrase format constants.
pub mod ieee80211 {
    /// WEP-40 key length as ASCII characters.
    pub const WEP40_ASCII_LEN: usize = 5;
    /// WEP-104 key length as ASCII characters.
    pub const WEP104_ASCII_LEN: usize = 13;
    /// WEP-40 key length as hex digits.
    pub const WEP40_HEX_LEN: usize = 10;
    /// WEP-104 key length as hex digits.
    pub const WEP104_HEX_LEN: usize = 26;
    /// Minimum WPA passphrase length as ASCII characters.
    pub const WPA_ASCII_MIN_LEN: usize = 8;
    /// Maximum WPA passphrase length as ASCII characters.
    pub const WPA_ASCII_MAX_LEN: usize = 63;
    /// Length of a raw pre-shared key as hex digits.
    pub const WPA_HEX_LEN: usize = 64;
}
