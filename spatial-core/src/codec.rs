//! # Codec Boundary
//!
//! The spatial codec is an external collaborator. The decoder only needs
//! three things from it: per-asset metadata, frame dependency queries and a
//! decode primitive that turns a frame index plus its decoded dependencies
//! into a new `VoxelFrame`. Opening an asset is the codec's constructor and
//! closing it is its `Drop`.

use crate::voxel::VoxelFrame;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Failed to read asset: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid asset: {0}")]
    InvalidAsset(String),
    #[error("Frame {0} does not exist in the asset")]
    UnknownFrame(u32),
    #[error("Frame {frame} needs dependency {dependency} which was not supplied")]
    MissingDependency { frame: u32, dependency: u32 },
    #[error("Codec returned error code {0}")]
    Code(i32),
}

// ============================================================================
// Metadata
// ============================================================================

/// Immutable per-asset description, read once when the asset is opened
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    /// Volume width in voxels
    pub width: u32,
    /// Volume height in voxels
    pub height: u32,
    /// Volume depth in voxels
    pub depth: u32,
    /// Frames per second
    pub framerate: f32,
    /// Number of frames
    pub frame_count: u32,
    /// Duration in seconds
    pub duration: f32,
}

impl Metadata {
    pub fn new(width: u32, height: u32, depth: u32, framerate: f32, frame_count: u32) -> Self {
        let duration = if framerate > 0.0 {
            frame_count as f32 / framerate
        } else {
            0.0
        };
        Self {
            width,
            height,
            depth,
            framerate,
            frame_count,
            duration,
        }
    }

    /// (width, height, depth) in voxels
    pub fn resolution(&self) -> (u32, u32, u32) {
        (self.width, self.height, self.depth)
    }

    /// Each axis divided by the largest one, so the longest side is 1.0
    pub fn normalized_extent(&self) -> [f32; 3] {
        let max = self.width.max(self.height).max(self.depth).max(1) as f32;
        [
            self.width as f32 / max,
            self.height as f32 / max,
            self.depth as f32 / max,
        ]
    }

    /// Is `index` a valid frame index for this asset?
    pub fn contains(&self, index: u32) -> bool {
        index < self.frame_count
    }
}

// ============================================================================
// Codec Trait
// ============================================================================

/// Which dependency set to query for a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DependencyMode {
    /// Frames whose decoded data is a direct input to the decode
    Immediate,
    /// Every frame that has to be decoded, in order, before the immediate
    /// dependencies can be satisfied from scratch
    Transitive,
}

/// A decoded dependency handed to the decode primitive
#[derive(Debug, Clone, Copy)]
pub struct IndexedFrame<'a> {
    pub index: u32,
    pub frame: &'a VoxelFrame,
}

/// Codec trait - implemented by every spatial asset backend
pub trait SpatialCodec: Send + Sync {
    /// Asset metadata
    fn metadata(&self) -> Metadata;

    /// Dependency indices of a frame. Every returned index is lower than `index`.
    fn dependencies(&self, index: u32, mode: DependencyMode) -> Result<Vec<u32>, CodecError>;

    /// Decode a frame. `dependencies` holds the decoded immediate
    /// dependencies, ordered as returned by `dependencies(index, Immediate)`.
    fn decode(&self, index: u32, dependencies: &[IndexedFrame<'_>]) -> Result<VoxelFrame, CodecError>;

    /// Hand a decoded buffer back once its last holder is gone
    fn release_buffer(&self, frame: VoxelFrame) {
        drop(frame);
    }

    /// Codec name for logging
    fn name(&self) -> &str;
}
