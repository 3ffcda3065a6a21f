//! # Manifest Assets
//!
//! A plain JSON spatial asset, used for authoring test content and for
//! driving the player without a native codec:
//!
//! ```json
//! {
//!   "width": 64, "height": 64, "depth": 64, "framerate": 30.0,
//!   "frames": [
//!     { "bricks": [ { "position": [0, 0, 0], "color": [255, 0, 0, 255] } ] },
//!     { "dependencies": [0], "removed": [[0, 0, 0]],
//!       "bricks": [ { "position": [1, 0, 0], "color": [0, 255, 0, 255] } ] }
//!   ]
//! }
//! ```
//!
//! A frame is decoded by copying the bricks of its dependencies (later
//! dependencies win), dropping `removed` and then applying its own `bricks`.
//! Positions are brick coordinates; omitted occupancy means a solid brick.

use crate::codec::{CodecError, DependencyMode, IndexedFrame, Metadata, SpatialCodec};
use crate::voxel::{Brick, VoxelFrame, MAX_MAP_CELLS};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

// ============================================================================
// Asset Description
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestAsset {
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub framerate: f32,
    pub frames: Vec<ManifestFrame>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ManifestFrame {
    #[serde(default)]
    pub dependencies: Vec<u32>,
    #[serde(default)]
    pub removed: Vec<[u32; 3]>,
    #[serde(default)]
    pub bricks: Vec<ManifestBrick>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestBrick {
    pub position: [u32; 3],
    #[serde(default)]
    pub occupancy: Option<[u32; 16]>,
    pub color: [u8; 4],
}

impl ManifestBrick {
    fn to_brick(&self) -> Brick {
        match self.occupancy {
            Some(mask) => Brick::with_occupancy(mask, self.color),
            None => Brick::solid(self.color),
        }
    }
}

// ============================================================================
// Manifest Codec
// ============================================================================

pub struct ManifestCodec {
    asset: ManifestAsset,
    metadata: Metadata,
}

impl ManifestCodec {
    /// Read and validate a manifest asset
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CodecError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let asset: ManifestAsset = serde_json::from_str(&content)
            .map_err(|e| CodecError::InvalidAsset(format!("{}: {}", path.display(), e)))?;

        let codec = Self::from_asset(asset)?;
        tracing::info!(
            "Opened spatial asset {:?}: {} frames",
            path,
            codec.metadata.frame_count
        );
        Ok(codec)
    }

    pub fn from_asset(asset: ManifestAsset) -> Result<Self, CodecError> {
        validate(&asset)?;
        let metadata = Metadata::new(
            asset.width,
            asset.height,
            asset.depth,
            asset.framerate,
            asset.frames.len() as u32,
        );
        Ok(Self { asset, metadata })
    }

    pub fn asset(&self) -> &ManifestAsset {
        &self.asset
    }

    fn frame(&self, index: u32) -> Result<&ManifestFrame, CodecError> {
        self.asset
            .frames
            .get(index as usize)
            .ok_or(CodecError::UnknownFrame(index))
    }
}

fn validate(asset: &ManifestAsset) -> Result<(), CodecError> {
    let invalid = |msg: String| Err(CodecError::InvalidAsset(msg));

    if asset.frames.is_empty() {
        return invalid("asset has no frames".into());
    }
    if !(asset.framerate > 0.0) {
        return invalid(format!("framerate must be positive, got {}", asset.framerate));
    }
    if asset.width == 0 || asset.height == 0 || asset.depth == 0 {
        return invalid(format!(
            "dimensions must be non-zero, got {}x{}x{}",
            asset.width, asset.height, asset.depth
        ));
    }
    if !asset.frames[0].dependencies.is_empty() {
        return invalid("frame 0 must not have dependencies".into());
    }

    let (bw, bh, bd) = VoxelFrame::brick_dimensions(asset.width, asset.height, asset.depth);
    if VoxelFrame::map_cells(bw, bh, bd).is_none() {
        return invalid(format!(
            "volume {}x{}x{} exceeds {} bricks",
            asset.width, asset.height, asset.depth, MAX_MAP_CELLS
        ));
    }

    for (index, frame) in asset.frames.iter().enumerate() {
        if let Some(dep) = frame.dependencies.iter().find(|&&dep| dep as usize >= index) {
            return invalid(format!("frame {} depends on later frame {}", index, dep));
        }
        let positions = frame
            .bricks
            .iter()
            .map(|b| b.position)
            .chain(frame.removed.iter().copied());
        for [x, y, z] in positions {
            if x >= bw || y >= bh || z >= bd {
                return invalid(format!(
                    "frame {} has brick ({}, {}, {}) outside the volume",
                    index, x, y, z
                ));
            }
        }
    }
    Ok(())
}

impl SpatialCodec for ManifestCodec {
    fn metadata(&self) -> Metadata {
        self.metadata
    }

    fn dependencies(&self, index: u32, mode: DependencyMode) -> Result<Vec<u32>, CodecError> {
        let frame = self.frame(index)?;
        match mode {
            DependencyMode::Immediate => Ok(frame.dependencies.clone()),
            DependencyMode::Transitive => {
                // ascending order puts every frame after its own dependencies
                let mut closure = BTreeSet::new();
                let mut pending = frame.dependencies.clone();
                while let Some(dep) = pending.pop() {
                    if closure.insert(dep) {
                        pending.extend(self.frame(dep)?.dependencies.iter().copied());
                    }
                }
                Ok(closure.into_iter().collect())
            }
        }
    }

    fn decode(&self, index: u32, dependencies: &[IndexedFrame<'_>]) -> Result<VoxelFrame, CodecError> {
        let entry = self.frame(index)?;
        let mut frame = VoxelFrame::for_volume(self.asset.width, self.asset.height, self.asset.depth)
            .ok_or_else(|| CodecError::InvalidAsset("volume too large".into()))?;

        for &dependency in &entry.dependencies {
            let input = dependencies
                .iter()
                .find(|d| d.index == dependency)
                .ok_or(CodecError::MissingDependency {
                    frame: index,
                    dependency,
                })?;
            if !frame.overlay(input.frame) {
                return Err(CodecError::InvalidAsset(format!(
                    "dependency {} of frame {} has a different brick map size",
                    dependency, index
                )));
            }
        }

        for &[x, y, z] in &entry.removed {
            frame.remove_brick(x, y, z);
        }
        for brick in &entry.bricks {
            let [x, y, z] = brick.position;
            frame.set_brick(x, y, z, brick.to_brick());
        }

        Ok(frame)
    }

    fn name(&self) -> &str {
        "manifest"
    }
}

// ============================================================================
// Tests
// ============================================================================
