//! Frame timer for the viewer loop.

use std::time::{Duration, Instant};

/// Longest step fed to camera movement. Stalls such as a swapchain rebuild
/// or a dragged window would otherwise teleport the camera.
pub const DEFAULT_MAX_DELTA: Duration = Duration::from_millis(100);

/// Measures the step between successive redraws, clamped to a maximum.
#[derive(Debug)]
pub struct Timer {
    last_tick: Instant,
    max_delta: Duration,
    frames: u64,
}

impl Timer {
    pub fn new() -> Self {
        Self::with_max_delta(DEFAULT_MAX_DELTA)
    }

    pub fn with_max_delta(max_delta: Duration) -> Self {
        Self {
            last_tick: Instant::now(),
            max_delta,
            frames: 0,
        }
    }

    /// Time since the previous tick, at most the configured maximum.
    pub fn tick(&mut self) -> Duration {
        self.tick_at(Instant::now())
    }

    fn tick_at(&mut self, now: Instant) -> Duration {
        let delta = now.saturating_duration_since(self.last_tick);
        self.last_tick = now;
        self.frames += 1;
        if delta > self.max_delta {
            tracing::trace!("Frame step of {:?} clamped to {:?}", delta, self.max_delta);
        }
        delta.min(self.max_delta)
    }

    /// [`Timer::tick`] in seconds.
    pub fn delta_secs(&mut self) -> f32 {
        self.tick().as_secs_f32()
    }

    /// Number of ticks so far.
    #[inline]
    pub fn frame_count(&self) -> u64 {
        self.frames
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}
