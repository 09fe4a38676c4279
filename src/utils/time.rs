use std::time::{Duration, Instant};

/// Frame delta handed to `on_update` callbacks.
#[derive(Debug, Clone, Copy, Default, PartialEq, PartialOrd)]
pub struct Timestep(f32);

impl Timestep {
    #[must_use]
    pub const fn from_seconds(seconds: f32) -> Self {
        Self(seconds)
    }

    #[must_use]
    pub const fn seconds(self) -> f32 {
        self.0
    }

    #[must_use]
    pub fn milliseconds(self) -> f32 {
        self.0 * 1000.0
    }
}

impl From<Duration> for Timestep {
    fn from(value: Duration) -> Self {
        Self(value.as_secs_f32())
    }
}

/// Timer for tracking frame timing and elapsed time.
pub struct Timer {
    start_time: Instant,
    last_update: Instant,
    /// Time since last tick
    pub delta: Duration,
    /// Total elapsed time since creation
    pub elapsed: Duration,
    /// Total number of ticks
    pub frame_count: u64,
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

impl Timer {
    /// Creates a new timer starting from now.
    #[must_use]
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            start_time: now,
            last_update: now,
            delta: Duration::ZERO,
            elapsed: Duration::ZERO,
            frame_count: 0,
        }
    }

    /// Advances the timer by one frame and returns the frame delta.
    pub fn tick(&mut self) -> Timestep {
        let now = Instant::now();
        self.delta = now - self.last_update;
        self.elapsed = now - self.start_time;
        self.last_update = now;
        self.frame_count += 1;
        Timestep::from(self.delta)
    }
}
