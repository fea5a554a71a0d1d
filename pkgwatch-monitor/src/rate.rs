//! Package build rate estimation

use std::fmt;

/// A packages/hour figure, `--` when it cannot be computed yet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PkgRate(pub Option<i64>);

impl fmt::Display for PkgRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(rate) => write!(f, "{}", rate),
            None => write!(f, "--"),
        }
    }
}

/// `ceil(pkgs / (secs / 3600))`, absent for a non-positive time span
pub fn per_hour(pkgs: i64, secs: i64) -> Option<i64> {
    if secs <= 0 {
        return None;
    }
    let rate = (pkgs as f64 / (secs as f64 / 3600.0)).ceil();
    rate.is_finite().then_some(rate as i64)
}

/// Average rate since the build started
pub fn lifetime_rate(attempted: i64, elapsed: Option<i64>) -> PkgRate {
    match elapsed {
        Some(elapsed) if attempted > 0 => PkgRate(per_hour(attempted, elapsed)),
        _ => PkgRate(None),
    }
}

/// Time span a trailing rate covers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Horizon {
    /// Not enough samples yet
    Calculating,
    /// Buffer still filling, rate covers everything seen so far
    Partial { minutes: u64 },
    /// Buffer wrapped, rate covers the full target period
    Full { minutes: u64 },
}

impl Horizon {
    pub fn title(&self) -> String {
        match self {
            Horizon::Calculating => "Package build rate. Still calculating...".to_string(),
            Horizon::Partial { minutes } | Horizon::Full { minutes } => {
                format!("Package build rate over last {} minutes", minutes)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImpulseReading {
    pub rate: PkgRate,
    pub horizon: Horizon,
}

#[derive(Debug, Clone, Copy, Default)]
struct Sample {
    pkgs: i64,
    time: Option<i64>,
}

/// Trailing rate over a fixed window of poll samples.
///
/// Samples live in a ring of `target_period / update_interval` slots; the
/// newest sample is compared with the oldest one still retained.
#[derive(Debug, Clone)]
pub struct ImpulseTracker {
    samples: Vec<Sample>,
    capacity: u64,
    first_interval: u64,
    update_interval_secs: u64,
    target_period_secs: u64,
    tracker: u64,
}

impl ImpulseTracker {
    pub fn new(update_interval_secs: u64, first_period_secs: u64, target_period_secs: u64) -> Self {
        let update_interval_secs = update_interval_secs.max(1);
        let capacity = (target_period_secs / update_interval_secs).max(1);
        Self {
            samples: Vec::with_capacity(capacity as usize),
            capacity,
            first_interval: first_period_secs / update_interval_secs,
            update_interval_secs,
            target_period_secs,
            tracker: 0,
        }
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Number of samples recorded so far
    pub fn recorded(&self) -> u64 {
        self.tracker
    }

    /// Slot the trailing rate is measured from
    pub fn tail_index(&self) -> u64 {
        if self.tracker < self.capacity {
            0
        } else {
            (self.tracker - (self.capacity - 1)) % self.capacity
        }
    }

    /// Record one poll's attempted count and elapsed seconds.
    pub fn record(&mut self, attempted: i64, elapsed: Option<i64>) -> ImpulseReading {
        let index = (self.tracker % self.capacity) as usize;
        let sample = Sample {
            pkgs: attempted,
            time: elapsed,
        };
        if index < self.samples.len() {
            self.samples[index] = sample;
        } else {
            self.samples.push(sample);
        }

        let reading = if self.tracker >= self.first_interval {
            let horizon = if self.tracker < self.capacity {
                Horizon::Partial {
                    minutes: self.tracker * self.update_interval_secs / 60,
                }
            } else {
                Horizon::Full {
                    minutes: self.target_period_secs / 60,
                }
            };
            let head = self.samples[index];
            let tail = self.samples[self.tail_index() as usize];
            let rate = match (head.time, tail.time) {
                (Some(now), Some(then)) => per_hour(head.pkgs - tail.pkgs, now - then),
                _ => None,
            };
            ImpulseReading {
                rate: PkgRate(rate),
                horizon,
            }
        } else {
            ImpulseReading {
                rate: PkgRate(None),
                horizon: Horizon::Calculating,
            }
        };

        self.tracker += 1;
        reading
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_per_hour() {
        assert_eq!(per_hour(10, 3600), Some(10));
        assert_eq!(per_hour(1, 7200), Some(1));
        assert_eq!(per_hour(3, 1800), Some(6));
        assert_eq!(per_hour(5, 0), None);
        assert_eq!(per_hour(5, -8), None);
    }

    #[test]
    fn test_lifetime_rate() {
        assert_eq!(lifetime_rate(5, Some(3600)).to_string(), "5");
        assert_eq!(lifetime_rate(0, Some(3600)).to_string(), "--");
        assert_eq!(lifetime_rate(5, None).to_string(), "--");
        assert_eq!(lifetime_rate(5, Some(0)).to_string(), "--");
    }

    #[test]
    fn test_default_window_geometry() {
        let tracker = ImpulseTracker::new(8, 120, 600);
        assert_eq!(tracker.capacity(), 75);
        assert_eq!(tracker.first_interval, 15);
    }

    #[test]
    fn test_still_calculating_before_first_interval() {
        let mut tracker = ImpulseTracker::new(8, 120, 600);
        for i in 0..15 {
            let reading = tracker.record(i, Some(i * 8));
            assert_eq!(reading.horizon, Horizon::Calculating);
            assert_eq!(reading.rate, PkgRate(None));
        }
        assert_eq!(
            Horizon::Calculating.title(),
            "Package build rate. Still calculating..."
        );
        let reading = tracker.record(15, Some(120));
        assert_eq!(reading.horizon, Horizon::Partial { minutes: 2 });
        // 15 packages over 120 seconds
        assert_eq!(reading.rate, PkgRate(Some(450)));
    }

    #[test]
    fn test_tail_once_wrapped() {
        let mut tracker = ImpulseTracker::new(8, 120, 600);
        for i in 0..75 {
            tracker.record(i, Some(i * 8));
        }
        assert_eq!(tracker.recorded(), 75);
        assert_eq!(tracker.tail_index(), 1);

        let reading = tracker.record(75, Some(600));
        assert_eq!(reading.horizon, Horizon::Full { minutes: 10 });
        assert_eq!(
            reading.horizon.title(),
            "Package build rate over last 10 minutes"
        );
        // Slot 0 now holds sample 75, slot 1 holds sample 1: 74 pkgs in 592s.
        assert_eq!(reading.rate, PkgRate(per_hour(74, 592)));
        assert_eq!(tracker.tail_index(), 2);
    }

    #[test]
    fn test_stalled_clock_reports_unknown_rate() {
        let mut tracker = ImpulseTracker::new(8, 0, 600);
        let first = tracker.record(3, Some(100));
        assert_eq!(first.rate, PkgRate(None));
        let reading = tracker.record(4, Some(100));
        assert_eq!(reading.rate.to_string(), "--");
        let reading = tracker.record(5, None);
        assert_eq!(reading.rate, PkgRate(None));
    }
}
