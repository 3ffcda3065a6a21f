//! # Spatial Player - Playback Driver
//!
//! Ties the clock, the decoder and a rendering collaborator together.
//! Once per update cycle the host calls `tick`:
//!
//! 1. advance the clock (unless paused or scrubbing)
//! 2. collect a finished decode, swap it in as the displayed frame and hand
//!    it to the `VolumeSink`
//! 3. if the frame the clock wants is not on screen and nothing is decoding,
//!    start decoding the nearest frame that can be decoded right now
//!
//! Core failures stop the driver. It keeps showing the last good frame and
//! reports the error through `state()` and `last_error()`.

use crate::cache::FrameRef;
use crate::clock::PlaybackClock;
use crate::codec::Metadata;
use crate::config::PlayerConfig;
use crate::decoder::SpatialDecoder;
use crate::error::SpatialError;
use crate::voxel::VoxelFrame;
use std::time::Duration;

// ============================================================================
// Rendering Collaborator
// ============================================================================

/// Model transform handed to the renderer with every frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelTransform {
    pub translation: [f32; 3],
    pub scale: [f32; 3],
}

impl ModelTransform {
    /// Unit-sized volume centered at the origin, longest axis 1.0
    pub fn for_metadata(metadata: &Metadata) -> Self {
        Self {
            translation: [0.0; 3],
            scale: metadata.normalized_extent(),
        }
    }

    /// Column-major 4x4 matrix
    pub fn to_matrix(&self) -> [[f32; 4]; 4] {
        let [sx, sy, sz] = self.scale;
        let [tx, ty, tz] = self.translation;
        [
            [sx, 0.0, 0.0, 0.0],
            [0.0, sy, 0.0, 0.0],
            [0.0, 0.0, sz, 0.0],
            [tx, ty, tz, 1.0],
        ]
    }
}

/// Receives decoded volumes for display
pub trait VolumeSink {
    /// Upload a new frame. The frame stays valid only for this call.
    fn upload(&mut self, index: u32, frame: &VoxelFrame, transform: &ModelTransform);

    /// Drop whatever is on screen
    fn clear(&mut self) {}
}

// ============================================================================
// Playback State
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackState {
    /// Nothing decoded or decoding yet
    Idle,
    /// A decode job is in flight
    Decoding,
    /// The displayed frame is the one the clock wants
    FrameReady,
    /// Paused with nothing left to decode
    Paused,
    /// A core error stopped playback
    Failed(String),
}

// ============================================================================
// Player
// ============================================================================

pub struct SpatialPlayer<S: VolumeSink> {
    decoder: SpatialDecoder,
    sink: S,
    config: PlayerConfig,
    metadata: Metadata,
    transform: ModelTransform,
    clock: PlaybackClock,
    current: Option<FrameRef>,
    state: PlaybackState,
    last_error: Option<String>,
}

impl<S: VolumeSink> SpatialPlayer<S> {
    pub fn new(decoder: SpatialDecoder, sink: S, config: PlayerConfig) -> Self {
        let metadata = decoder.metadata();
        let mut clock = PlaybackClock::for_metadata(&metadata, config.speed, config.looping);
        clock.set_playing(config.autoplay);

        Self {
            decoder,
            sink,
            transform: ModelTransform::for_metadata(&metadata),
            metadata,
            config,
            clock,
            current: None,
            state: PlaybackState::Idle,
            last_error: None,
        }
    }

    /// Run one update cycle
    pub fn tick(&mut self, dt: Duration) -> &PlaybackState {
        if matches!(self.state, PlaybackState::Failed(_)) {
            return &self.state;
        }

        self.clock.advance(dt);
        match self.step() {
            Ok(state) => self.state = state,
            Err(e) => self.halt(e),
        }
        &self.state
    }

    fn step(&mut self) -> Result<PlaybackState, SpatialError> {
        if self.decoder.is_decoding() {
            if let Some(frame) = self.decoder.try_get_decoded_frame()? {
                self.present(frame);
            }
        }

        let desired = self.clock.frame_index();
        if self.current_frame_index() != Some(desired) && !self.decoder.is_decoding() {
            let start = self.decoder.find_decodable_frame(desired)?;
            // the nearest decodable frame is already on screen; decode the
            // target directly and let the engine rebuild its dependencies
            let index = if self.current_frame_index() == Some(start) {
                desired
            } else {
                start
            };
            tracing::trace!("requesting frame {} (wanted {})", index, desired);
            self.decoder.start_decoding_frame(index)?;
        }

        Ok(if self.decoder.is_decoding() {
            PlaybackState::Decoding
        } else if !self.clock.is_playing() {
            PlaybackState::Paused
        } else if self.current.is_some() {
            PlaybackState::FrameReady
        } else {
            PlaybackState::Idle
        })
    }

    fn present(&mut self, frame: FrameRef) {
        if let Some(previous) = self.current.take() {
            self.decoder.release_frame(previous);
        }
        self.sink.upload(frame.index(), frame.frame(), &self.transform);
        self.current = Some(frame);
    }

    fn halt(&mut self, error: SpatialError) {
        tracing::error!("Playback stopped: {}", error);
        self.clock.set_playing(false);
        self.last_error = Some(error.to_string());
        self.state = PlaybackState::Failed(error.to_string());
    }

    // ========================================================================
    // Control Surface
    // ========================================================================

    pub fn pause_toggle(&mut self) {
        let playing = !self.clock.is_playing();
        self.clock.set_playing(playing);
    }

    pub fn is_playing(&self) -> bool {
        self.clock.is_playing()
    }

    /// Seek to a fraction of the duration
    pub fn set_progress(&mut self, fraction: f32) {
        self.clock.set_progress(fraction);
    }

    /// While scrubbing, time does not advance on its own
    pub fn set_scrubbing(&mut self, scrubbing: bool) {
        self.clock.set_scrubbing(scrubbing);
    }

    pub fn progress(&self) -> f32 {
        self.clock.progress()
    }

    /// (width, height, depth) in voxels
    pub fn resolution(&self) -> (u32, u32, u32) {
        self.metadata.resolution()
    }

    // ========================================================================
    // Status
    // ========================================================================

    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Index of the displayed frame
    pub fn current_frame_index(&self) -> Option<u32> {
        self.current.as_ref().map(FrameRef::index)
    }

    pub fn metadata(&self) -> Metadata {
        self.metadata
    }

    pub fn transform(&self) -> &ModelTransform {
        &self.transform
    }

    pub fn config(&self) -> &PlayerConfig {
        &self.config
    }

    pub fn decoder(&self) -> &SpatialDecoder {
        &self.decoder
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }
}

impl<S: VolumeSink> Drop for SpatialPlayer<S> {
    fn drop(&mut self) {
        self.sink.clear();
        if let Some(frame) = self.current.take() {
            self.decoder.release_frame(frame);
        }
        // the decoder joins any running worker when it drops
    }
}

// ============================================================================
// Tests
// ============================================================================
