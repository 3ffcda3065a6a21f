//! Playback timing
//!
//! `PlaybackClock` turns elapsed time into a frame index. `FrameTimer` paces
//! a tick loop at a fixed rate.

use crate::codec::Metadata;
use std::time::{Duration, Instant};

// ============================================================================
// Playback Clock
// ============================================================================

/// Playback position for one asset
#[derive(Debug, Clone)]
pub struct PlaybackClock {
    position: f64,
    duration: f64,
    framerate: f64,
    frame_count: u32,
    speed: f64,
    looping: bool,
    playing: bool,
    scrubbing: bool,
}

impl PlaybackClock {
    /// `duration` is in seconds; progress and seeking are fractions of it
    pub fn new(framerate: f32, frame_count: u32, duration: f32, speed: f64, looping: bool) -> Self {
        Self {
            position: 0.0,
            duration: duration.max(0.0) as f64,
            framerate: framerate as f64,
            frame_count,
            speed,
            looping,
            playing: false,
            scrubbing: false,
        }
    }

    /// Clock for an asset, using the duration the asset reports
    pub fn for_metadata(metadata: &Metadata, speed: f64, looping: bool) -> Self {
        Self::new(
            metadata.framerate,
            metadata.frame_count,
            metadata.duration,
            speed,
            looping,
        )
    }

    /// Advance by `dt` unless paused or scrubbing. Returns true if time moved.
    pub fn advance(&mut self, dt: Duration) -> bool {
        if !self.playing || self.scrubbing {
            return false;
        }
        self.position += dt.as_secs_f64() * self.speed;

        if !self.looping && self.position >= self.duration {
            self.position = self.duration;
            self.playing = false;
        }
        true
    }

    /// Frame to show at the current position
    pub fn frame_index(&self) -> u32 {
        if self.frame_count == 0 {
            return 0;
        }
        let frame = (self.position * self.framerate).floor().max(0.0) as u64;
        if self.looping {
            (frame % self.frame_count as u64) as u32
        } else {
            frame.min(self.frame_count as u64 - 1) as u32
        }
    }

    /// Position as a fraction of the duration, in `0..1`
    pub fn progress(&self) -> f32 {
        if self.duration <= 0.0 {
            return 0.0;
        }
        let fraction = self.position / self.duration;
        if self.looping {
            (fraction % 1.0) as f32
        } else {
            fraction.min(1.0) as f32
        }
    }

    /// Jump to a fraction of the duration
    pub fn set_progress(&mut self, fraction: f32) {
        self.position = fraction.clamp(0.0, 1.0) as f64 * self.duration;
    }

    pub fn position_secs(&self) -> f64 {
        self.position
    }

    pub fn set_playing(&mut self, playing: bool) {
        self.playing = playing;
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn set_scrubbing(&mut self, scrubbing: bool) {
        self.scrubbing = scrubbing;
    }

    pub fn is_scrubbing(&self) -> bool {
        self.scrubbing
    }
}

// ============================================================================
// Frame Timer
// ============================================================================

/// Frame timer for paced tick loops
pub struct FrameTimer {
    target: Duration,
    last: Instant,
    count: u64,
    start: Instant,
}

impl FrameTimer {
    pub fn new(hz: f64) -> Self {
        let target = if hz > 0.0 {
            Duration::from_secs_f64(1.0 / hz)
        } else {
            Duration::from_millis(16)
        };
        Self {
            target,
            last: Instant::now(),
            count: 0,
            start: Instant::now(),
        }
    }

    pub fn interval(&self) -> Duration {
        self.target
    }

    /// Sleep until the next tick is due. Returns the time since the last tick.
    pub fn wait(&mut self) -> Duration {
        let elapsed = self.last.elapsed();
        if elapsed < self.target {
            std::thread::sleep(self.target - elapsed);
        }
        let now = Instant::now();
        let dt = now - self.last;
        self.last = now;
        self.count += 1;
        dt
    }

    pub fn ticks(&self) -> u64 {
        self.count
    }

    pub fn fps(&self) -> f64 {
        let secs = self.start.elapsed().as_secs_f64();
        if secs > 0.0 {
            self.count as f64 / secs
        } else {
            0.0
        }
    }

    pub fn reset(&mut self) {
        self.last = Instant::now();
        self.count = 0;
        self.start = Instant::now();
    }
}
