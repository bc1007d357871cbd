use std::sync::Arc;

/// Caller-supplied progress callback. Receives a fraction in `[0, 1]`.
pub type ProgressFn = Arc<dyn Fn(f64) + Send + Sync>;

/// Turns raw counters into monotonic, rate-limited progress reports.
pub struct ProgressTracker {
    callback: Option<ProgressFn>,
    total: Option<u64>,
    last: f64,
    step: f64,
}

impl ProgressTracker {
    /// `total` is the expected number of units (bytes or lines). Without it
    /// only the final 1.0 is reported.
    pub fn new(callback: Option<ProgressFn>, total: Option<u64>) -> Self {
        Self { callback, total: total.filter(|&t| t > 0), last: 0.0, step: 0.01 }
    }

    pub fn update(&mut self, done: u64) {
        let (Some(callback), Some(total)) = (&self.callback, self.total) else {
            return;
        };
        let fraction = (done as f64 / total as f64).clamp(0.0, 1.0);
        // Never report 1.0 before the file is finished.
        let fraction = fraction.min(0.99);
        if fraction >= self.last + self.step {
            self.last = fraction;
            callback(fraction);
        }
    }

    pub fn complete(&mut self) {
        if let Some(callback) = &self.callback {
            if self.last < 1.0 {
                self.last = 1.0;
                callback(1.0);
            }
        }
    }

    pub fn last(&self) -> f64 {
        self.last
    }
}
