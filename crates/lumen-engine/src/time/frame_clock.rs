use std::time::{Duration, Instant};

/// Timing of one loop iteration, handed to the scene controller.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct FrameTime {
    /// Seconds since the previous tick, clamped.
    pub dt: f32,
    /// Seconds of clamped time accumulated since the clock started.
    pub elapsed: f64,
    /// Number of ticks before this one.
    pub tick: u64,
}

/// Clamped delta-time source for the frame loop.
///
/// The upper clamp keeps camera motion sane after a long gate wait or a
/// debugger pause; the lower one avoids zero-dt updates.
#[derive(Debug, Clone)]
pub struct FrameClock {
    last: Instant,
    elapsed: f64,
    ticks: u64,
    dt_min: Duration,
    dt_max: Duration,
}

impl FrameClock {
    pub const DEFAULT_DT_MIN: Duration = Duration::from_micros(100);
    pub const DEFAULT_DT_MAX: Duration = Duration::from_millis(100);

    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    /// Clock whose baseline is `start`.
    pub fn starting_at(start: Instant) -> Self {
        Self {
            last: start,
            elapsed: 0.0,
            ticks: 0,
            dt_min: Self::DEFAULT_DT_MIN,
            dt_max: Self::DEFAULT_DT_MAX,
        }
    }

    pub fn with_clamps(mut self, dt_min: Duration, dt_max: Duration) -> Self {
        debug_assert!(dt_min <= dt_max);
        self.dt_min = dt_min;
        self.dt_max = dt_max;
        self
    }

    /// Moves the baseline to now without producing a tick.
    pub fn reset(&mut self) {
        self.last = Instant::now();
    }

    pub fn tick(&mut self) -> FrameTime {
        self.tick_at(Instant::now())
    }

    /// Advances to `now`. An instant earlier than the baseline counts as zero
    /// elapsed time.
    pub fn tick_at(&mut self, now: Instant) -> FrameTime {
        let dt = now
            .saturating_duration_since(self.last)
            .clamp(self.dt_min, self.dt_max);
        self.last = now;
        self.elapsed += dt.as_secs_f64();

        let time = FrameTime {
            dt: dt.as_secs_f32(),
            elapsed: self.elapsed,
            tick: self.ticks,
        };
        self.ticks = self.ticks.wrapping_add(1);
        time
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_stalls_are_clamped() {
        let start = Instant::now();
        let mut clock = FrameClock::starting_at(start);

        let t = clock.tick_at(start + Duration::from_secs(3));
        assert_eq!(t.dt, FrameClock::DEFAULT_DT_MAX.as_secs_f32());
        assert_eq!(t.tick, 0);
    }

    #[test]
    fn zero_intervals_use_the_minimum() {
        let start = Instant::now();
        let mut clock = FrameClock::starting_at(start);

        let t = clock.tick_at(start);
        assert_eq!(t.dt, FrameClock::DEFAULT_DT_MIN.as_secs_f32());
    }

    #[test]
    fn elapsed_accumulates_clamped_steps() {
        let start = Instant::now();
        let mut clock = FrameClock::starting_at(start)
            .with_clamps(Duration::ZERO, Duration::from_millis(50));

        clock.tick_at(start + Duration::from_millis(20));
        let t = clock.tick_at(start + Duration::from_millis(500));
        assert!((t.elapsed - 0.070).abs() < 1e-9);
        assert_eq!(t.tick, 1);
    }
}
