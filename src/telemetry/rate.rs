//! Rolling sampling rate estimate for one device

/// Minimum wall time between two rate emissions, in seconds.
pub const RATE_INTERVAL_SECS: f64 = 1.0;

#[derive(Debug, Clone)]
pub struct SamplingRateEstimator {
    count_since_last_tick: u64,
    last_tick_time: f64,
    rate: Option<f64>,
}

impl SamplingRateEstimator {
    pub fn new(now: f64) -> Self {
        SamplingRateEstimator {
            count_since_last_tick: 0,
            last_tick_time: now,
            rate: None,
        }
    }

    /// Forget the previous estimate and start a fresh interval at `now`.
    pub fn reset(&mut self, now: f64) {
        *self = Self::new(now);
    }

    /// Count one buffered sample.
    pub fn record(&mut self) {
        self.count_since_last_tick += 1;
    }

    /// Emit a new estimate once a full interval has passed
    ///
    /// Returns the latest estimate, which is the previous one until at
    /// least [`RATE_INTERVAL_SECS`] have elapsed since the last emission.
    pub fn tick(&mut self, now: f64) -> Option<f64> {
        let elapsed = now - self.last_tick_time;
        if elapsed >= RATE_INTERVAL_SECS {
            self.rate = Some(self.count_since_last_tick as f64 / elapsed);
            self.count_since_last_tick = 0;
            self.last_tick_time = now;
        }
        self.rate
    }

    pub fn rate(&self) -> Option<f64> {
        self.rate
    }

    /// Rate formatted for the per-device display.
    pub fn display(&self) -> String {
        match self.rate {
            Some(rate) => format!("{rate:.2} Hz"),
            None => "-- Hz".to_string(),
        }
    }
}
