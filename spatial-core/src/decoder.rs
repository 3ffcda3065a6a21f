//! # Spatial Decoder - Background Decode Scheduling
//!
//! Runs decodes on a worker thread while the control thread keeps ticking:
//!
//! ```text
//! control thread                       worker thread
//! ──────────────                       ─────────────
//! start_decoding_frame(i) ──spawn──►   engine.lock().decode_frame(i)
//! try_get_decoded_frame()  (not ready)        │
//! try_get_decoded_frame()  (not ready)        │
//! try_get_decoded_frame() ◄──join───   Result<FrameRef>
//! ```
//!
//! At most one job is in flight. Starting a job while another one is still
//! running joins the old worker first and releases its unclaimed frame, so
//! jobs never queue up. Polling never blocks.

use crate::cache::FrameRef;
use crate::codec::{Metadata, SpatialCodec};
use crate::engine::{DecodeCounters, DecodeEngine, DecoderStats};
use crate::error::SpatialError;
use crate::manifest::ManifestCodec;
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

struct DecodeJob {
    index: u32,
    started: Instant,
    worker: JoinHandle<Result<FrameRef, SpatialError>>,
}

impl DecodeJob {
    /// Wait for the worker and take its result
    fn finish(self) -> Result<FrameRef, SpatialError> {
        let index = self.index;
        let result = self
            .worker
            .join()
            .map_err(|_| SpatialError::WorkerPanicked(index))?;
        tracing::debug!(
            "decode job for frame {} finished after {:.2}ms",
            index,
            self.started.elapsed().as_secs_f64() * 1000.0
        );
        result
    }
}

/// Decoder for one spatial asset
pub struct SpatialDecoder {
    engine: Arc<Mutex<DecodeEngine>>,
    counters: Arc<DecodeCounters>,
    metadata: Metadata,
    codec_name: String,
    job: Option<DecodeJob>,
}

impl SpatialDecoder {
    pub fn new(codec: Arc<dyn SpatialCodec>) -> Self {
        let codec_name = codec.name().to_string();
        let engine = DecodeEngine::new(codec);
        let metadata = engine.metadata();
        tracing::info!(
            "Spatial decoder created ({}): {}x{}x{}, {} frames @ {} fps",
            codec_name,
            metadata.width,
            metadata.height,
            metadata.depth,
            metadata.frame_count,
            metadata.framerate
        );

        Self {
            counters: engine.counters(),
            engine: Arc::new(Mutex::new(engine)),
            metadata,
            codec_name,
            job: None,
        }
    }

    /// Open a manifest asset from disk
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SpatialError> {
        let codec = ManifestCodec::open(path)?;
        Ok(Self::new(Arc::new(codec)))
    }

    pub fn metadata(&self) -> Metadata {
        self.metadata
    }

    pub fn codec_name(&self) -> &str {
        &self.codec_name
    }

    /// Nearest frame at or before `target` that can be decoded right away.
    ///
    /// Waits for the engine if a decode is still running; callers that must
    /// not block check `is_decoding` first.
    pub fn find_decodable_frame(&self, target: u32) -> Result<u32, SpatialError> {
        self.engine.lock().find_decodable_frame(target)
    }

    /// Start decoding `index` on a worker thread.
    ///
    /// Blocks only if a previous job is still running: that job is joined and
    /// its unclaimed frame released before the new one starts.
    pub fn start_decoding_frame(&mut self, index: u32) -> Result<(), SpatialError> {
        if !self.metadata.contains(index) {
            return Err(SpatialError::OutOfRange {
                index,
                frame_count: self.metadata.frame_count,
            });
        }

        if let Some(previous) = self.job.take() {
            let previous_index = previous.index;
            tracing::debug!(
                "waiting for frame {} before decoding frame {}",
                previous_index,
                index
            );
            match previous.finish() {
                Ok(frame) => {
                    tracing::debug!("discarding unclaimed frame {}", previous_index);
                    frame.release();
                }
                Err(e) => tracing::warn!("discarded decode of frame {} failed: {}", previous_index, e),
            }
        }

        let engine = Arc::clone(&self.engine);
        let worker = thread::Builder::new()
            .name(format!("spatial-decode-{}", index))
            .spawn(move || {
                let result = engine.lock().decode_frame(index);
                result
            })
            .map_err(SpatialError::WorkerSpawn)?;

        self.job = Some(DecodeJob {
            index,
            started: Instant::now(),
            worker,
        });
        Ok(())
    }

    /// Collect the in-flight job if it has finished.
    ///
    /// `Ok(None)` means the worker is still running. A finished job hands its
    /// frame to the caller, who releases it when done. Fails with
    /// `NoActiveJob` when nothing is in flight.
    pub fn try_get_decoded_frame(&mut self) -> Result<Option<FrameRef>, SpatialError> {
        match self.job.take() {
            None => Err(SpatialError::NoActiveJob),
            Some(job) if !job.worker.is_finished() => {
                self.job = Some(job);
                Ok(None)
            }
            Some(job) => job.finish().map(Some),
        }
    }

    /// Release a frame obtained from `try_get_decoded_frame`.
    ///
    /// Consumes the caller's holder without touching the engine lock, so it
    /// never waits on a running decode. The cache entry, if any, keeps its
    /// own holder.
    pub fn release_frame(&self, frame: FrameRef) {
        tracing::trace!("releasing frame {}", frame.index());
        frame.release();
    }

    pub fn is_decoding(&self) -> bool {
        self.job.is_some()
    }

    /// Frame index of the in-flight job
    pub fn decoding_frame(&self) -> Option<u32> {
        self.job.as_ref().map(|job| job.index)
    }

    pub fn stats(&self) -> DecoderStats {
        self.counters.snapshot()
    }
}

impl Drop for SpatialDecoder {
    fn drop(&mut self) {
        if let Some(job) = self.job.take() {
            let index = job.index;
            match job.finish() {
                Ok(frame) => frame.release(),
                Err(e) => tracing::warn!("decode of frame {} failed during shutdown: {}", index, e),
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{marker_frame, FakeCodec};
    use std::time::Duration;

    fn decoder_for(codec: &Arc<FakeCodec>) -> SpatialDecoder {
        let codec: Arc<dyn SpatialCodec> = codec.clone();
        SpatialDecoder::new(codec)
    }

    fn wait_for_frame(decoder: &mut SpatialDecoder) -> Result<FrameRef, SpatialError> {
        for _ in 0..5000 {
            if let Some(frame) = decoder.try_get_decoded_frame()? {
                return Ok(frame);
            }
            thread::sleep(Duration::from_millis(1));
        }
        panic!("decode did not finish");
    }

    #[test]
    fn test_start_out_of_range() {
        let codec = FakeCodec::chain(5);
        let mut decoder = decoder_for(&codec);
        let err = decoder.start_decoding_frame(7).unwrap_err();
        assert!(matches!(err, SpatialError::OutOfRange { index: 7, frame_count: 5 }));
        assert!(!decoder.is_decoding());
    }

    #[test]
    fn test_poll_without_job() {
        let codec = FakeCodec::chain(2);
        let mut decoder = decoder_for(&codec);
        assert!(matches!(
            decoder.try_get_decoded_frame(),
            Err(SpatialError::NoActiveJob)
        ));

        decoder.start_decoding_frame(0).unwrap();
        let frame = wait_for_frame(&mut decoder).unwrap();
        decoder.release_frame(frame);

        // the job was collected, polling again is a caller bug
        assert!(matches!(
            decoder.try_get_decoded_frame(),
            Err(SpatialError::NoActiveJob)
        ));
    }

    #[test]
    fn test_poll_does_not_block() {
        let codec = FakeCodec::new(&[&[]], Duration::from_millis(200));
        let mut decoder = decoder_for(&codec);
        decoder.start_decoding_frame(0).unwrap();

        let started = Instant::now();
        assert!(decoder.try_get_decoded_frame().unwrap().is_none());
        assert!(started.elapsed() < Duration::from_millis(100));
        assert_eq!(decoder.decoding_frame(), Some(0));

        let frame = wait_for_frame(&mut decoder).unwrap();
        assert_eq!(frame.frame(), &marker_frame(0));
        assert!(!decoder.is_decoding());
    }

    #[test]
    fn test_result_ownership() {
        let codec = FakeCodec::chain(3);
        let mut decoder = decoder_for(&codec);

        decoder.start_decoding_frame(0).unwrap();
        let frame = wait_for_frame(&mut decoder).unwrap();
        assert_eq!(frame.ref_count(), 2);

        decoder.release_frame(frame);
        assert_eq!(codec.freed(), 0);
        assert_eq!(decoder.find_decodable_frame(1).unwrap(), 1);
    }

    #[test]
    fn test_single_flight() {
        let codec = FakeCodec::new(&[&[], &[0]], Duration::from_millis(50));
        let mut decoder = decoder_for(&codec);

        decoder.start_decoding_frame(0).unwrap();
        decoder.start_decoding_frame(1).unwrap();
        let frame = wait_for_frame(&mut decoder).unwrap();
        assert_eq!(frame.index(), 1);

        let calls = codec.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].index, 0);
        assert_eq!(calls[1].index, 1);
        assert!(calls[1].started >= calls[0].finished);

        // frame 0 was never collected; only the cache holds it now
        decoder.release_frame(frame);
        drop(decoder);
        assert_eq!(codec.allocated(), 2);
        assert_eq!(codec.live(), 0);
    }

    #[test]
    fn test_decode_failure_surfaces_on_poll() {
        let codec = FakeCodec::chain(2);
        codec.fail_on(0);
        let mut decoder = decoder_for(&codec);

        decoder.start_decoding_frame(0).unwrap();
        let err = wait_for_frame(&mut decoder).unwrap_err();
        assert!(matches!(err, SpatialError::Decode { index: 0, .. }));
        assert!(!decoder.is_decoding());
    }

    #[test]
    fn test_release_frame_leaves_cache_holder() {
        let codec = FakeCodec::new(&[&[], &[0]], Duration::from_millis(50));
        let mut decoder = decoder_for(&codec);

        decoder.start_decoding_frame(0).unwrap();
        let frame = wait_for_frame(&mut decoder).unwrap();
        decoder.start_decoding_frame(1).unwrap();

        // a decode is running; releasing must not wait for it
        let started = Instant::now();
        decoder.release_frame(frame);
        assert!(started.elapsed() < Duration::from_millis(25));
        assert_eq!(codec.freed(), 0);

        let next = wait_for_frame(&mut decoder).unwrap();
        assert_eq!(next.index(), 1);
        assert_eq!(codec.freed(), 0);
    }

    #[test]
    fn test_worker_panic_is_reported() {
        let codec = FakeCodec::new(&[&[], &[]], Duration::ZERO);
        codec.panic_on(0);
        let mut decoder = decoder_for(&codec);

        decoder.start_decoding_frame(0).unwrap();
        let err = wait_for_frame(&mut decoder).unwrap_err();
        assert!(matches!(err, SpatialError::WorkerPanicked(0)));
        assert!(!decoder.is_decoding());

        // the engine lock does not poison; the next job runs normally
        decoder.start_decoding_frame(1).unwrap();
        let frame = wait_for_frame(&mut decoder).unwrap();
        assert_eq!(frame.index(), 1);
    }

    #[test]
    fn test_drop_joins_running_job() {
        let codec = FakeCodec::new(&[&[]], Duration::from_millis(50));
        {
            let mut decoder = decoder_for(&codec);
            decoder.start_decoding_frame(0).unwrap();
        }
        assert_eq!(codec.decoded(), vec![0]);
        assert_eq!(codec.allocated(), 1);
        assert_eq!(codec.live(), 0);
    }

    #[test]
    fn test_stats() {
        let codec = FakeCodec::diamond();
        let mut decoder = decoder_for(&codec);

        decoder.start_decoding_frame(4).unwrap();
        wait_for_frame(&mut decoder).unwrap().release();

        let stats = decoder.stats();
        assert_eq!(stats.frames_decoded, 5);
        assert_eq!(stats.extra_frames_decoded, 4);
        assert_eq!(stats.cached_frames, 2);
    }
}
