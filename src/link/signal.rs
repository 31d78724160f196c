//! # Signal Quality Estimator
//!
//! Turns per-frame carrier-detect samples into a windowed 0-66 rating.
//!
//! The rating is the sum of two independent 0-33 components:
//!
//! - **Density**: how many samples arrived in the window relative to a
//!   target count (link activity rate)
//! - **Quality**: the share of samples that saw a strong carrier
//!
//! ```text
//! rating = min(33 * (good + weak) / target, 33) + 33 * good / (good + weak)
//! ```
//!
//! A window with no samples rates 0.

use tracing::trace;

/// Default window length in milliseconds
pub const DEFAULT_WINDOW_MS: u64 = 500;

/// Default number of samples expected per window
pub const DEFAULT_TARGET_SAMPLES: u32 = 200;

/// Highest possible rating
pub const MAX_RATING: u8 = 66;

/// Maximum of each rating component
const COMPONENT_MAX: u32 = 33;

/// Compute the rating for one window
///
/// # Examples
///
/// ```
/// use rc_link::link::signal::compute_rating;
///
/// assert_eq!(compute_rating(180, 20, 200), 62);
/// assert_eq!(compute_rating(0, 0, 200), 0);
/// ```
#[must_use]
pub fn compute_rating(good: u32, weak: u32, target_samples: u32) -> u8 {
    let total = good + weak;
    if total == 0 {
        return 0;
    }

    let density = (COMPONENT_MAX * total / target_samples.max(1)).min(COMPONENT_MAX);
    let quality = COMPONENT_MAX * good / total;

    (density + quality) as u8
}

/// Windowed link quality estimator
#[derive(Debug, Clone)]
pub struct SignalQualityEstimator {
    window_ms: u64,
    target_samples: u32,

    window_start: u64,
    good: u32,
    weak: u32,
    interval_sum: u64,

    rating: u8,
    good_signal: bool,
    average_interval_ms: Option<u64>,
}

impl Default for SignalQualityEstimator {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_MS, DEFAULT_TARGET_SAMPLES)
    }
}

impl SignalQualityEstimator {
    /// Creates an estimator with the given window length and target count
    #[must_use]
    pub fn new(window_ms: u64, target_samples: u32) -> Self {
        Self {
            window_ms,
            target_samples: target_samples.max(1),
            window_start: 0,
            good: 0,
            weak: 0,
            interval_sum: 0,
            rating: 0,
            good_signal: false,
            average_interval_ms: None,
        }
    }

    /// Record one sample; `carrier_detected` marks it good
    pub fn probe(&mut self, carrier_detected: bool) {
        if carrier_detected {
            self.good = self.good.saturating_add(1);
        } else {
            self.weak = self.weak.saturating_add(1);
        }
    }

    /// Record the gap since the previous frame for the arrival diagnostic
    pub fn add_interval(&mut self, interval_ms: u64) {
        self.interval_sum = self.interval_sum.saturating_add(interval_ms);
    }

    /// Close the window if it has elapsed
    ///
    /// Returns `true` when a new rating was computed.
    pub fn tick(&mut self, now: u64) -> bool {
        if now.saturating_sub(self.window_start) < self.window_ms {
            return false;
        }

        let total = self.good + self.weak;
        self.rating = compute_rating(self.good, self.weak, self.target_samples);
        self.good_signal = self.good > self.weak;
        self.average_interval_ms = if total == 0 {
            None
        } else {
            Some(self.interval_sum / total as u64)
        };

        trace!(
            "Signal window closed: {} good, {} weak -> rating {}",
            self.good,
            self.weak,
            self.rating
        );

        self.window_start = now;
        self.good = 0;
        self.weak = 0;
        self.interval_sum = 0;

        true
    }

    /// Rating of the last closed window (0-66)
    #[must_use]
    pub fn rating(&self) -> u8 {
        self.rating
    }

    /// Whether most samples of the last closed window were good
    #[must_use]
    pub fn good_signal(&self) -> bool {
        self.good_signal
    }

    /// Average gap between frames in the last closed window
    #[must_use]
    pub fn average_interval_ms(&self) -> Option<u64> {
        self.average_interval_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rating_example() {
        // 33 (full density) + 33 * 180 / 200 = 33 + 29
        assert_eq!(compute_rating(180, 20, 200), 62);
    }

    #[test]
    fn test_rating_no_samples() {
        assert_eq!(compute_rating(0, 0, 200), 0);
    }

    #[test]
    fn test_rating_bounds() {
        assert_eq!(compute_rating(200, 0, 200), MAX_RATING);
        // Density saturates above the target
        assert_eq!(compute_rating(1000, 0, 200), MAX_RATING);
        assert_eq!(compute_rating(0, 200, 200), 33);
    }

    #[test]
    fn test_rating_low_density() {
        // 33 * 20 / 200 = 3, all good = 33
        assert_eq!(compute_rating(20, 0, 200), 36);
    }

    #[test]
    fn test_tick_before_window_keeps_rating() {
        let mut estimator = SignalQualityEstimator::new(500, 200);
        estimator.probe(true);
        assert!(!estimator.tick(499));
        assert_eq!(estimator.rating(), 0);
    }

    #[test]
    fn test_tick_closes_window() {
        let mut estimator = SignalQualityEstimator::new(500, 200);
        for _ in 0..180 {
            estimator.probe(true);
        }
        for _ in 0..20 {
            estimator.probe(false);
        }

        assert!(estimator.tick(500));
        assert_eq!(estimator.rating(), 62);
        assert!(estimator.good_signal());
    }

    #[test]
    fn test_rating_decays_when_samples_stop() {
        let mut estimator = SignalQualityEstimator::new(500, 200);
        for _ in 0..200 {
            estimator.probe(true);
        }
        estimator.tick(500);
        assert_eq!(estimator.rating(), 66);

        // Next window sees nothing
        assert!(estimator.tick(1000));
        assert_eq!(estimator.rating(), 0);
        assert!(!estimator.good_signal());
        assert_eq!(estimator.average_interval_ms(), None);
    }

    #[test]
    fn test_window_restarts_at_tick_time() {
        let mut estimator = SignalQualityEstimator::new(500, 200);
        assert!(estimator.tick(700));
        assert!(!estimator.tick(1100));
        assert!(estimator.tick(1200));
    }

    #[test]
    fn test_good_signal_requires_majority() {
        let mut estimator = SignalQualityEstimator::new(500, 200);
        estimator.probe(true);
        estimator.probe(false);
        estimator.tick(500);
        assert!(!estimator.good_signal());

        estimator.probe(true);
        estimator.probe(true);
        estimator.probe(false);
        estimator.tick(1000);
        assert!(estimator.good_signal());
    }

    #[test]
    fn test_average_interval() {
        let mut estimator = SignalQualityEstimator::new(500, 200);
        for interval in [2, 3, 4, 3] {
            estimator.probe(true);
            estimator.add_interval(interval);
        }
        estimator.tick(500);
        assert_eq!(estimator.average_interval_ms(), Some(3));
    }
}
