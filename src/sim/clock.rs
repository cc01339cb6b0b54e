//! Block clock: the single gameplay time source
//!
//! Holds the latest counter value seen from the upstream. Regressions and
//! gaps are absorbed here so everything downstream can assume a
//! non-decreasing clock.

use crate::platform::CounterSource;

/// Result of sampling the upstream once
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockSample {
    /// Counter moved forward by this many blocks
    Advanced(u64),
    /// Same value as last time (or a regression that was held)
    Held,
    /// Upstream has no value; no progress this frame
    Unavailable,
}

#[derive(Debug, Clone, Default)]
pub struct BlockClock {
    latest: Option<u64>,
    /// Frames since the counter last moved (stall indicator, not an error)
    idle_frames: u32,
    /// Set while the upstream sits below `latest`; cleared on the next advance
    regressed: bool,
}

impl BlockClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest known counter value, if any has been observed
    #[inline]
    pub fn current(&self) -> Option<u64> {
        self.latest
    }

    pub fn idle_frames(&self) -> u32 {
        self.idle_frames
    }

    /// Fold one reported value into the clock
    pub fn observe(&mut self, value: u64) -> ClockSample {
        match self.latest {
            Some(last) if value < last => {
                if self.regressed {
                    log::debug!("Block counter still behind {} at {}", last, value);
                } else {
                    log::warn!("Block counter regressed {} -> {}, holding", last, value);
                    self.regressed = true;
                }
                self.idle_frames = self.idle_frames.saturating_add(1);
                ClockSample::Held
            }
            Some(last) if value == last => {
                self.regressed = false;
                self.idle_frames = self.idle_frames.saturating_add(1);
                ClockSample::Held
            }
            last => {
                self.latest = Some(value);
                self.idle_frames = 0;
                self.regressed = false;
                ClockSample::Advanced(value - last.unwrap_or(value))
            }
        }
    }

    /// Poll the upstream and fold its value in
    pub fn sample(&mut self, source: &dyn CounterSource) -> ClockSample {
        match source.latest() {
            Some(value) => self.observe(value),
            None => {
                self.idle_frames = self.idle_frames.saturating_add(1);
                ClockSample::Unavailable
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::SharedCounter;

    #[test]
    fn test_regression_is_held() {
        let mut clock = BlockClock::new();
        assert_eq!(clock.observe(1000), ClockSample::Advanced(0));
        assert_eq!(clock.observe(1010), ClockSample::Advanced(10));
        assert_eq!(clock.observe(1005), ClockSample::Held);
        assert_eq!(clock.current(), Some(1010));
        assert_eq!(clock.observe(1011), ClockSample::Advanced(1));
    }

    #[test]
    fn test_held_regression_flagged_once_per_episode() {
        let counter = SharedCounter::new();
        let mut clock = BlockClock::new();
        counter.push(1010);
        clock.sample(&counter);

        // Upstream keeps reporting the stale value every frame
        counter.push(1005);
        for _ in 0..60 {
            assert_eq!(clock.sample(&counter), ClockSample::Held);
            assert!(clock.regressed);
        }
        assert_eq!(clock.current(), Some(1010));
        assert_eq!(clock.idle_frames(), 60);

        counter.push(1012);
        assert_eq!(clock.sample(&counter), ClockSample::Advanced(2));
        assert!(!clock.regressed);
    }

    #[test]
    fn test_unavailable_keeps_last_value() {
        let counter = SharedCounter::new();
        let mut clock = BlockClock::new();
        assert_eq!(clock.sample(&counter), ClockSample::Unavailable);
        assert_eq!(clock.current(), None);

        counter.push(42);
        clock.sample(&counter);
        counter.clear();
        assert_eq!(clock.sample(&counter), ClockSample::Unavailable);
        assert_eq!(clock.current(), Some(42));
    }

    #[test]
    fn test_stall_counts_idle_frames() {
        let counter = SharedCounter::new();
        let mut clock = BlockClock::new();
        counter.push(5);
        clock.sample(&counter);
        for _ in 0..3 {
            assert_eq!(clock.sample(&counter), ClockSample::Held);
        }
        assert_eq!(clock.idle_frames(), 3);
        counter.push(6);
        clock.sample(&counter);
        assert_eq!(clock.idle_frames(), 0);
    }
}
