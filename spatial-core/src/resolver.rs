//! Decode start point selection
//!
//! Walks backward from a target frame to the nearest frame that can be
//! decoded right now: either a frame without dependencies, or one whose
//! dependencies are all in the cache.

use crate::cache::FrameCache;
use crate::codec::{DependencyMode, SpatialCodec};
use crate::error::SpatialError;

/// Nearest frame at or before `target` whose dependencies are all cached
pub fn find_decodable_frame(
    codec: &dyn SpatialCodec,
    cache: &FrameCache,
    target: u32,
) -> Result<u32, SpatialError> {
    let frame_count = codec.metadata().frame_count;
    if target >= frame_count {
        return Err(SpatialError::OutOfRange {
            index: target,
            frame_count,
        });
    }

    for index in (0..=target).rev() {
        let dependencies = codec.dependencies(index, DependencyMode::Immediate)?;
        if dependencies.iter().all(|&dep| cache.contains(dep)) {
            if index != target {
                tracing::trace!(requested = target, index, "decoding from earlier frame");
            }
            return Ok(index);
        }
    }

    Err(SpatialError::NoDecodableFrame(target))
}
