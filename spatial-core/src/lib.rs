//! # Spatial Core
//!
//! Frame-accurate decoding and playback of volumetric (voxel brick) video.
//!
//! ```text
//! SpatialPlayer ──tick──► SpatialDecoder ──worker──► DecodeEngine
//!      │                                               │     │
//!      ▼                                            resolver  FrameCache
//! VolumeSink                                           │     │
//!                                                   SpatialCodec
//! ```

// ============================================================================
// Codec Interface
// ============================================================================
pub mod codec;
pub mod voxel;
pub mod manifest;

// ============================================================================
// Decoding
// ============================================================================
pub mod cache;
pub mod resolver;
pub mod engine;
pub mod decoder;
pub mod error;

// ============================================================================
// Playback
// ============================================================================
pub mod clock;
pub mod config;
pub mod player;

#[cfg(test)]
mod test_support;

pub use cache::{FrameCache, FrameRef};
pub use codec::{CodecError, DependencyMode, IndexedFrame, Metadata, SpatialCodec};
pub use config::PlayerConfig;
pub use decoder::SpatialDecoder;
pub use engine::{DecodeEngine, DecoderStats};
pub use error::SpatialError;
pub use manifest::ManifestCodec;
pub use player::{ModelTransform, PlaybackState, SpatialPlayer, VolumeSink};
pub use voxel::{Brick, VoxelFrame};

// ============================================================================
// Version
// ============================================================================
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
