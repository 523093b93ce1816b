//! Instantaneous throughput estimation
//!
//! Each reported rate reflects only the most recent inter-sample interval;
//! no smoothing or averaging is applied across samples.

/// Derives bytes-per-second from successive progress samples
///
/// The first sample measures from the transfer's start timestamp. One
/// estimator serves one in-flight entry; the engine creates a fresh one
/// at dispatch time.
#[derive(Debug)]
pub struct RateEstimator {
    prev_ms: i64,
    prev_loaded: u64,
}

impl RateEstimator {
    /// Create an estimator anchored at the transfer's start
    pub fn new(started_at_ms: i64) -> Self {
        Self {
            prev_ms: started_at_ms,
            prev_loaded: 0,
        }
    }

    /// Feed one progress sample
    ///
    /// Returns the rate in bytes per second for the interval since the
    /// previous sample, or None when the interval is zero or negative
    /// (caller retains the previous rate). The sample becomes the new
    /// reference point only when it produced a usable interval.
    pub fn sample(&mut self, now_ms: i64, loaded_bytes: u64) -> Option<f64> {
        let elapsed_ms = now_ms - self.prev_ms;
        if elapsed_ms <= 0 {
            return None;
        }
        let delta = loaded_bytes.saturating_sub(self.prev_loaded);
        let rate = delta as f64 * 1000.0 / elapsed_ms as f64;
        self.prev_ms = now_ms;
        self.prev_loaded = loaded_bytes;
        Some(rate)
    }
}

// =============================================================================
// Tests
// =============================================================================
