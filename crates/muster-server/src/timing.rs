//! Fixed-timestep tick pacing.
//!
//! The simulation always advances in whole ticks of the configured length.
//! Wall-clock time is accumulated and converted into a tick count, clamped
//! so a stall never turns into an unbounded catch-up burst.

use std::time::{Duration, Instant};

/// Wall-clock to fixed-tick converter.
#[derive(Debug)]
pub struct FixedTimestep {
    /// Tick length in seconds
    fixed_dt: f32,
    /// Time of the last `delta_time` call
    last_frame: Instant,
    /// Unconsumed wall-clock time
    accumulator: f32,
    /// Maximum delta accepted per frame
    max_dt: f32,
    /// Maximum ticks per frame
    max_updates: u32,
}

impl FixedTimestep {
    /// Create a pacer for `tick_rate` ticks per second.
    #[must_use]
    pub fn new(tick_rate: u32) -> Self {
        Self {
            fixed_dt: 1.0 / tick_rate.max(1) as f32,
            last_frame: Instant::now(),
            accumulator: 0.0,
            max_dt: 0.25, // 250ms
            max_updates: 10,
        }
    }

    /// Tick length in seconds.
    #[must_use]
    pub fn fixed_dt(&self) -> f32 {
        self.fixed_dt
    }

    /// Unconsumed time in seconds.
    #[must_use]
    #[allow(dead_code)]
    pub fn accumulator(&self) -> f32 {
        self.accumulator
    }

    /// Time since the previous call, clamped to `max_dt`.
    pub fn delta_time(&mut self) -> f32 {
        let now = Instant::now();
        let dt = (now - self.last_frame).as_secs_f32();
        self.last_frame = now;
        dt.min(self.max_dt)
    }

    /// Accumulate time and return how many ticks are due.
    pub fn accumulate(&mut self, dt: f32) -> u32 {
        self.accumulator += dt.clamp(0.0, self.max_dt);
        let mut count = 0;

        while self.accumulator >= self.fixed_dt && count < self.max_updates {
            self.accumulator -= self.fixed_dt;
            count += 1;
        }

        // Still behind: drop the backlog
        if self.accumulator > self.fixed_dt * 2.0 {
            self.accumulator = 0.0;
        }

        count
    }

    /// Sleep until the next tick is due.
    pub fn sleep_remainder(&self) {
        let remaining = self.fixed_dt - self.accumulator - self.last_frame.elapsed().as_secs_f32();
        if remaining > 0.0 {
            std::thread::sleep(Duration::from_secs_f32(remaining));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_dt_from_rate() {
        let t = FixedTimestep::new(20);
        assert!((t.fixed_dt() - 0.05).abs() < 1e-6);
        let t = FixedTimestep::new(0);
        assert!((t.fixed_dt() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_accumulate_counts_whole_ticks() {
        let mut t = FixedTimestep::new(10);
        assert_eq!(t.accumulate(0.05), 0);
        assert_eq!(t.accumulate(0.06), 1);
        assert!((t.accumulator() - 0.01).abs() < 1e-4);
        assert_eq!(t.accumulate(0.2), 2);
    }

    #[test]
    fn test_accumulate_clamps_stalls() {
        let mut t = FixedTimestep::new(100);
        // A 5 s stall is treated as 250 ms, capped at 10 ticks
        assert_eq!(t.accumulate(5.0), 10);
        assert!(t.accumulator() <= t.fixed_dt() * 2.0);
    }
}
