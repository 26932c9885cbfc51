// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
use std::time::{Duration, Instant};

/// Installs the global subscriber. `RUST_LOG` wins; otherwise `info`.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .try_init();
}

/// Elapsed-time source for animation plus a once-per-second frame counter.
pub struct FrameClock {
    start: Instant,
    window_start: Instant,
    frames: u32,
}

impl FrameClock {
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    fn starting_at(now: Instant) -> Self {
        Self {
            start: now,
            window_start: now,
            frames: 0,
        }
    }

    /// Animation time. Unaffected by [`FrameClock::reset_window`].
    pub fn elapsed_secs(&self) -> f32 {
        self.elapsed_secs_at(Instant::now())
    }

    fn elapsed_secs_at(&self, now: Instant) -> f32 {
        now.saturating_duration_since(self.start).as_secs_f32()
    }

    pub fn frame_rendered(&mut self) {
        self.frames = self.frames.saturating_add(1);
    }

    /// Drops the current window, e.g. while paused.
    pub fn reset_window(&mut self) {
        self.frames = 0;
        self.window_start = Instant::now();
    }

    /// Returns the frame count once at least a second has passed since the
    /// last report, and starts a new window.
    pub fn poll_fps(&mut self) -> Option<u32> {
        self.poll_fps_at(Instant::now())
    }

    fn poll_fps_at(&mut self, now: Instant) -> Option<u32> {
        if now.duration_since(self.window_start) < Duration::from_secs(1) {
            return None;
        }
        let fps = self.frames;
        self.frames = 0;
        self.window_start = now;
        Some(fps)
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
    fn fps_reported_once_per_second() {
        let t0 = Instant::now();
        let mut clock = FrameClock::starting_at(t0);
        for _ in 0..42 {
            clock.frame_rendered();
        }
        assert_eq!(clock.poll_fps_at(t0 + Duration::from_millis(500)), None);
        assert_eq!(clock.poll_fps_at(t0 + Duration::from_millis(1001)), Some(42));
        assert_eq!(clock.poll_fps_at(t0 + Duration::from_millis(1500)), None);
    }

    #[test]
    fn reset_discards_partial_window() {
        let mut clock = FrameClock::new();
        clock.frame_rendered();
        clock.reset_window();
        assert_eq!(clock.frames, 0);
    }

    #[test]
    fn animation_time_survives_fps_window_resets() {
        let t0 = Instant::now();
        let mut clock = FrameClock::starting_at(t0);
        clock.reset_window();
        let t = clock.elapsed_secs_at(t0 + Duration::from_millis(1500));
        assert!((t - 1.5).abs() < 1e-6);
        assert_eq!(clock.elapsed_secs_at(t0), 0.0);
    }
}
