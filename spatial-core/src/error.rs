//! Decoder error taxonomy

use crate::cache::CacheError;
use crate::codec::CodecError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SpatialError {
    #[error("Frame index {index} out of range (frame count {frame_count})")]
    OutOfRange { index: u32, frame_count: u32 },
    #[error("No decodable frame at or before {0}")]
    NoDecodableFrame(u32),
    #[error("Failed to decode frame {index}: {source}")]
    Decode {
        index: u32,
        #[source]
        source: CodecError,
    },
    #[error("No frame is being decoded")]
    NoActiveJob,
    #[error("Dependency {dependency} of frame {frame} could not be resolved")]
    UnresolvedDependency { frame: u32, dependency: u32 },
    #[error("Frame {frame} declares dependency {dependency} which is not an earlier frame")]
    InvalidDependency { frame: u32, dependency: u32 },
    #[error("Failed to spawn decode worker: {0}")]
    WorkerSpawn(#[source] std::io::Error),
    #[error("Decode worker panicked while decoding frame {0}")]
    WorkerPanicked(u32),
    #[error("Frame cache error: {0}")]
    Cache(#[from] CacheError),
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),
}
