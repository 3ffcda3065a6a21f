//! # Frame Cache - Reference-Counted Decoded Frames
//!
//! Decoded frames are shared between several holders at once: the cache
//! entry that keeps a frame alive as a future dependency, the result of an
//! in-flight decode job, and the consumer displaying it.
//!
//! ```text
//! ┌──────────────┐  insert   ┌────────────┐  retain   ┌──────────┐
//! │ DecodeEngine │──────────►│ FrameCache │──────────►│ FrameRef │ (job / consumer)
//! └──────────────┘           └─────┬──────┘           └────┬─────┘
//!                                  │ evict_except          │ release
//!                                  ▼                       ▼
//!                            drop cache holder       drop caller holder
//!                                  │                       │
//!                                  └──────────┬────────────┘
//!                                             ▼
//!                                   codec.release_buffer (last holder gone)
//! ```
//!
//! Every holder is a `FrameRef`. Acquiring a holder is explicit (`retain`),
//! releasing consumes the handle, and the buffer goes back to the codec
//! exactly once, when the last holder is gone.

use crate::codec::SpatialCodec;
use crate::voxel::VoxelFrame;
use std::collections::HashMap;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Frame {0} is not cached")]
    NotCached(u32),
    #[error("Frame {0} is already cached")]
    AlreadyCached(u32),
}

// ============================================================================
// Frame Reference
// ============================================================================

struct SharedFrame {
    index: u32,
    frame: VoxelFrame,
    codec: Arc<dyn SpatialCodec>,
}

impl Drop for SharedFrame {
    fn drop(&mut self) {
        let frame = std::mem::take(&mut self.frame);
        tracing::trace!(index = self.index, "releasing decoded frame");
        self.codec.release_buffer(frame);
    }
}

/// One live holder of a decoded frame
pub struct FrameRef {
    shared: Arc<SharedFrame>,
}

impl FrameRef {
    fn new(index: u32, frame: VoxelFrame, codec: Arc<dyn SpatialCodec>) -> Self {
        Self {
            shared: Arc::new(SharedFrame {
                index,
                frame,
                codec,
            }),
        }
    }

    /// Frame index this buffer was decoded from
    pub fn index(&self) -> u32 {
        self.shared.index
    }

    pub fn frame(&self) -> &VoxelFrame {
        &self.shared.frame
    }

    /// Acquire another holder of the same buffer
    pub fn retain(&self) -> FrameRef {
        FrameRef {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Give up this holder. The buffer is freed if it was the last one.
    pub fn release(self) {
        drop(self);
    }

    /// Number of live holders, this one included
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.shared)
    }

    /// Do both handles refer to the same decoded buffer?
    pub fn same_frame(&self, other: &FrameRef) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

impl Deref for FrameRef {
    type Target = VoxelFrame;

    fn deref(&self) -> &VoxelFrame {
        self.frame()
    }
}

impl fmt::Debug for FrameRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameRef")
            .field("index", &self.index())
            .field("refs", &self.ref_count())
            .finish()
    }
}

// ============================================================================
// Frame Cache
// ============================================================================

/// Decoded frames kept alive as dependencies for future decodes
pub struct FrameCache {
    entries: HashMap<u32, FrameRef>,
    codec: Arc<dyn SpatialCodec>,
}

impl FrameCache {
    pub fn new(codec: Arc<dyn SpatialCodec>) -> Self {
        Self {
            entries: HashMap::new(),
            codec,
        }
    }

    /// Peek at a cached frame without acquiring a holder
    pub fn lookup(&self, index: u32) -> Option<&FrameRef> {
        self.entries.get(&index)
    }

    pub fn contains(&self, index: u32) -> bool {
        self.entries.contains_key(&index)
    }

    /// Cache a freshly decoded buffer. The cache keeps one holder and the
    /// returned handle is a second one.
    pub fn insert(&mut self, index: u32, frame: VoxelFrame) -> Result<FrameRef, CacheError> {
        if self.entries.contains_key(&index) {
            // the buffer is ours now, hand it back instead of leaking it
            self.codec.release_buffer(frame);
            return Err(CacheError::AlreadyCached(index));
        }

        let entry = FrameRef::new(index, frame, Arc::clone(&self.codec));
        let handle = entry.retain();
        self.entries.insert(index, entry);
        Ok(handle)
    }

    /// Acquire a new holder of a cached frame
    pub fn retain(&self, index: u32) -> Result<FrameRef, CacheError> {
        self.entries
            .get(&index)
            .map(FrameRef::retain)
            .ok_or(CacheError::NotCached(index))
    }

    /// Drop the cache's holder of every frame not in `keep`.
    /// Returns the number of evicted entries.
    pub fn evict_except(&mut self, keep: &[u32]) -> usize {
        let before = self.entries.len();
        self.entries.retain(|index, entry| {
            let kept = keep.contains(index);
            if !kept {
                tracing::trace!(index, refs = entry.ref_count(), "evicting cached frame");
            }
            kept
        });
        before - self.entries.len()
    }

    /// Drop the cache's holder of every entry
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Cached frame indices in ascending order
    pub fn indices(&self) -> Vec<u32> {
        let mut indices: Vec<u32> = self.entries.keys().copied().collect();
        indices.sort_unstable();
        indices
    }
}

// ============================================================================
// Tests
// ============================================================================
