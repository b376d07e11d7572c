//! Wall-clock timing for the runner loop.
//!
//! Simulation time is the step counter; this only measures how fast steps
//! run on the host so the runner can report a rate.
//!
//! # Example
//!
//! ```ignore
//! use physarum::time::Time;
//!
//! let mut time = Time::new();
//! loop {
//!     sim.advance()?;
//!     if time.update() {
//!         log::info!("{:.1} steps/s", time.fps());
//!     }
//! }
//! ```

use std::time::{Duration, Instant};

/// Step timing: elapsed time, delta time, step count and a periodic rate.
#[derive(Debug)]
pub struct Time {
    /// When the timer was created.
    start: Instant,
    /// When the last step finished.
    last_frame: Instant,
    /// Time since last step in seconds.
    delta_secs: f32,
    /// Total steps since start.
    frame_count: u64,
    /// Steps per second over the last interval.
    fps: f32,
    /// Step count at last rate update.
    fps_frame_count: u64,
    /// Time of last rate update.
    fps_update_time: Instant,
    /// How often to update the rate.
    fps_update_interval: Duration,
}

impl Time {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            start: now,
            last_frame: now,
            delta_secs: 0.0,
            frame_count: 0,
            fps: 0.0,
            fps_frame_count: 0,
            fps_update_time: now,
            fps_update_interval: Duration::from_secs(1),
        }
    }

    /// Set how often [`Self::fps`] is recomputed.
    pub fn with_fps_update_interval(mut self, interval: Duration) -> Self {
        self.fps_update_interval = interval;
        self
    }

    /// Record one finished step.
    ///
    /// Returns `true` when the rate was just recomputed.
    pub fn update(&mut self) -> bool {
        let now = Instant::now();
        self.delta_secs = now.duration_since(self.last_frame).as_secs_f32();
        self.last_frame = now;
        self.frame_count += 1;

        let fps_elapsed = now.duration_since(self.fps_update_time);
        if fps_elapsed >= self.fps_update_interval {
            let frames_since = self.frame_count - self.fps_frame_count;
            self.fps = frames_since as f32 / fps_elapsed.as_secs_f32();
            self.fps_frame_count = self.frame_count;
            self.fps_update_time = now;
            return true;
        }
        false
    }

    /// Total elapsed time in seconds since start.
    #[inline]
    pub fn elapsed(&self) -> f32 {
        self.start.elapsed().as_secs_f32()
    }

    /// Duration of the last step in seconds.
    #[inline]
    pub fn delta(&self) -> f32 {
        self.delta_secs
    }

    #[inline]
    pub fn frame(&self) -> u64 {
        self.frame_count
    }

    /// Steps per second over the last update interval.
    #[inline]
    pub fn fps(&self) -> f32 {
        self.fps
    }

    /// Mean steps per second since start.
    pub fn average_fps(&self) -> f32 {
        let elapsed = self.elapsed();
        if elapsed > 0.0 {
            self.frame_count as f32 / elapsed
        } else {
            0.0
        }
    }
}

impl Default for Time {
    fn default() -> Self {
        Self::new()
    }
}
