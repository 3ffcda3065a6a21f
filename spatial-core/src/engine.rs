//! # Decode Engine
//!
//! Decodes one frame at a time against the frame cache:
//!
//! 1. Cached frames are returned directly (one more holder, no codec call).
//! 2. If an immediate dependency is missing, every missing frame of the
//!    transitive dependency set is decoded first, depth-first, in the order
//!    the codec returns them.
//! 3. The immediate dependencies are handed to the codec decode primitive.
//! 4. The cache is trimmed to the immediate dependencies of the new frame,
//!    then the new frame is inserted.
//!
//! Trimming only happens for the outermost frame of a decode. Frames decoded
//! during step 2 are all needed by that outermost frame, so evicting between
//! them would throw away a sibling dependency that was just produced.

use crate::cache::{FrameCache, FrameRef};
use crate::codec::{DependencyMode, IndexedFrame, Metadata, SpatialCodec};
use crate::error::SpatialError;
use crate::resolver;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

// ============================================================================
// Statistics
// ============================================================================

/// Decode counters, readable from any thread while a decode is running
#[derive(Debug, Default)]
pub struct DecodeCounters {
    frames_decoded: AtomicU64,
    extra_frames_decoded: AtomicU64,
    cache_hits: AtomicU64,
    frames_evicted: AtomicU64,
    last_decode_us: AtomicU64,
    cached_frames: AtomicU64,
}

impl DecodeCounters {
    pub fn snapshot(&self) -> DecoderStats {
        DecoderStats {
            frames_decoded: self.frames_decoded.load(Ordering::Relaxed),
            extra_frames_decoded: self.extra_frames_decoded.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            frames_evicted: self.frames_evicted.load(Ordering::Relaxed),
            last_decode_ms: self.last_decode_us.load(Ordering::Relaxed) as f64 / 1000.0,
            cached_frames: self.cached_frames.load(Ordering::Relaxed) as usize,
        }
    }
}

/// Decoder statistics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecoderStats {
    /// Codec decode calls that succeeded
    pub frames_decoded: u64,
    /// Frames decoded only to rebuild a missing dependency chain
    pub extra_frames_decoded: u64,
    /// Requests served straight from the cache
    pub cache_hits: u64,
    /// Cache entries dropped by keep-set trimming
    pub frames_evicted: u64,
    /// Wall time of the most recent top-level decode
    pub last_decode_ms: f64,
    /// Cache size after the most recent top-level decode
    pub cached_frames: usize,
}

// ============================================================================
// Decode Engine
// ============================================================================

pub struct DecodeEngine {
    codec: Arc<dyn SpatialCodec>,
    cache: FrameCache,
    metadata: Metadata,
    counters: Arc<DecodeCounters>,
}

impl DecodeEngine {
    pub fn new(codec: Arc<dyn SpatialCodec>) -> Self {
        let metadata = codec.metadata();
        Self {
            cache: FrameCache::new(Arc::clone(&codec)),
            codec,
            metadata,
            counters: Arc::new(DecodeCounters::default()),
        }
    }

    pub fn metadata(&self) -> Metadata {
        self.metadata
    }

    pub fn cache(&self) -> &FrameCache {
        &self.cache
    }

    pub fn counters(&self) -> Arc<DecodeCounters> {
        Arc::clone(&self.counters)
    }

    /// Nearest frame at or before `target` that can be decoded from the
    /// current cache contents
    pub fn find_decodable_frame(&self, target: u32) -> Result<u32, SpatialError> {
        resolver::find_decodable_frame(&*self.codec, &self.cache, target)
    }

    /// Decode a frame, rebuilding missing dependencies as needed.
    ///
    /// The returned handle is one holder; the cache keeps another.
    pub fn decode_frame(&mut self, index: u32) -> Result<FrameRef, SpatialError> {
        if !self.metadata.contains(index) {
            return Err(SpatialError::OutOfRange {
                index,
                frame_count: self.metadata.frame_count,
            });
        }

        let started = Instant::now();
        let frame = self.decode_recursive(index, true)?;
        let elapsed = started.elapsed();

        self.counters
            .last_decode_us
            .store(elapsed.as_micros() as u64, Ordering::Relaxed);
        self.counters
            .cached_frames
            .store(self.cache.len() as u64, Ordering::Relaxed);
        tracing::debug!(
            "decoding frame {} took {:.2}ms (cached: {:?})",
            index,
            elapsed.as_secs_f64() * 1000.0,
            self.cache.indices()
        );

        Ok(frame)
    }

    fn immediate_dependencies(&self, index: u32) -> Result<Vec<u32>, SpatialError> {
        let dependencies = self.codec.dependencies(index, DependencyMode::Immediate)?;
        self.check_earlier(index, &dependencies)?;
        Ok(dependencies)
    }

    fn check_earlier(&self, index: u32, dependencies: &[u32]) -> Result<(), SpatialError> {
        match dependencies.iter().find(|&&dep| dep >= index) {
            Some(&dependency) => Err(SpatialError::InvalidDependency {
                frame: index,
                dependency,
            }),
            None => Ok(()),
        }
    }

    fn decode_recursive(&mut self, index: u32, outermost: bool) -> Result<FrameRef, SpatialError> {
        if let Some(cached) = self.cache.lookup(index) {
            self.counters.cache_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(cached.retain());
        }

        let dependencies = self.immediate_dependencies(index)?;

        if !dependencies.iter().all(|&dep| self.cache.contains(dep)) {
            let chain = self.codec.dependencies(index, DependencyMode::Transitive)?;
            self.check_earlier(index, &chain)?;

            for dependency in chain {
                if self.cache.contains(dependency) {
                    continue;
                }
                tracing::warn!("decoding extra frame {} for frame {}", dependency, index);
                self.counters
                    .extra_frames_decoded
                    .fetch_add(1, Ordering::Relaxed);
                // the cache keeps its own holder; ours is not needed
                self.decode_recursive(dependency, false)?.release();
            }

            if let Some(&dependency) = dependencies.iter().find(|&&dep| !self.cache.contains(dep)) {
                return Err(SpatialError::UnresolvedDependency {
                    frame: index,
                    dependency,
                });
            }
        }

        let decoded = {
            let held = dependencies
                .iter()
                .map(|&dep| self.cache.retain(dep))
                .collect::<Result<Vec<_>, _>>()?;
            let inputs: Vec<IndexedFrame<'_>> = held
                .iter()
                .map(|dep| IndexedFrame {
                    index: dep.index(),
                    frame: dep.frame(),
                })
                .collect();

            self.codec
                .decode(index, &inputs)
                .map_err(|source| SpatialError::Decode { index, source })?
        };

        if outermost {
            let evicted = self.cache.evict_except(&dependencies);
            if evicted > 0 {
                tracing::debug!("evicted {} cached frame(s) after decoding {}", evicted, index);
                self.counters
                    .frames_evicted
                    .fetch_add(evicted as u64, Ordering::Relaxed);
            }
        }

        let frame = self.cache.insert(index, decoded)?;
        self.counters.frames_decoded.fetch_add(1, Ordering::Relaxed);
        Ok(frame)
    }
}

// ============================================================================
// Tests
// ============================================================================
