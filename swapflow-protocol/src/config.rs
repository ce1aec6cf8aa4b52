// Tunable protocol parameters shared by both flows.

#[derive(Clone, Debug)]
pub struct SwapConfig {
    /// Delay between retry-poller attempts.
    pub poll_interval_ms: u64,
    /// HTLC refund window: lock_time = now + this many seconds.
    pub lock_time_window_secs: u64,
    /// Confirmation confidence the participant requires of the lock-chain
    /// script before funding the contract (0.0 - 1.0).
    pub script_confidence: f64,
}

impl Default for SwapConfig {
    fn default() -> Self {
        SwapConfig {
            poll_interval_ms: 2000,
            lock_time_window_secs: 3 * 3600, // 3 hours
            script_confidence: 0.8,
        }
    }
}
