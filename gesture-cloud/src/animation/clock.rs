//! Fixed-rate frame pacing

use std::time::{Duration, Instant};

/// Wake slightly before a tick to absorb scheduler latency
const WAKE_EARLY: Duration = Duration::from_micros(1000);
/// Ticks allowed to fall behind before the schedule is reset
const MAX_FRAMES_BEHIND: u32 = 2;

/// Schedules redraws at a target rate and hands out a fixed `dt`.
///
/// Every tick advances the animation by exactly `1 / target_fps`, so the
/// smoothing constants behave the same regardless of how late a frame runs.
#[derive(Clone, Debug)]
pub struct FrameClock {
    frame_duration: Duration,
    next_tick: Instant,
    ticks: u64,
    /// Set by `poll`, consumed by `take_tick`
    tick_pending: bool,
}

impl FrameClock {
    pub fn new(target_fps: u32, now: Instant) -> Self {
        let fps = target_fps.max(1) as u64;
        Self {
            frame_duration: Duration::from_nanos(1_000_000_000 / fps),
            next_tick: now,
            ticks: 0,
            tick_pending: false,
        }
    }

    pub fn frame_duration(&self) -> Duration {
        self.frame_duration
    }

    /// Seconds per animation step
    pub fn fixed_dt(&self) -> f32 {
        self.frame_duration.as_secs_f32()
    }

    pub fn next_tick(&self) -> Instant {
        self.next_tick
    }

    /// When the event loop should wake up for the next tick
    pub fn wake_at(&self) -> Instant {
        self.next_tick.checked_sub(WAKE_EARLY).unwrap_or(self.next_tick)
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Returns true when a tick is due at `now` and schedules the next one.
    pub fn poll(&mut self, now: Instant) -> bool {
        if now < self.next_tick {
            return false;
        }

        self.ticks += 1;
        self.tick_pending = true;
        self.next_tick += self.frame_duration;

        // Reset if too far behind
        let max_behind = self.frame_duration * MAX_FRAMES_BEHIND;
        if now > self.next_tick + max_behind {
            log::debug!("Frame clock fell behind, resetting schedule");
            self.next_tick = now + self.frame_duration;
        }
        true
    }

    /// Consume the tick raised by `poll`, returning the step to advance by.
    ///
    /// Redraws the OS asks for (resize, expose) find no pending tick, so they
    /// render without advancing the animation.
    pub fn take_tick(&mut self) -> Option<f32> {
        std::mem::take(&mut self.tick_pending).then(|| self.fixed_dt())
    }
}
