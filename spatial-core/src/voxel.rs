//! # Voxel Frames
//!
//! Decoded spatial frames are sparse voxel volumes split into cubic bricks of
//! `BRICK_SIZE` voxels per side:
//!
//! ```text
//! map (dense, one u32 per brick cell)     bricks (only occupied cells)
//! ┌────┬────┬────┐                        ┌─────────┬─────────┐
//! │ 0  │ -- │ 1  │  ──── index ────►      │ Brick 0 │ Brick 1 │
//! └────┴────┴────┘                        └─────────┴─────────┘
//! ```
//!
//! Empty cells hold `EMPTY_BRICK`. Both arrays are plain-old-data so the
//! renderer can upload them without copying.

use bytemuck::{Pod, Zeroable};

/// Voxels per brick side
pub const BRICK_SIZE: u32 = 8;

/// Map value for a cell without a brick
pub const EMPTY_BRICK: u32 = u32::MAX;

/// Largest brick map a frame may hold, in cells
pub const MAX_MAP_CELLS: usize = 1 << 24;

const BRICK_WORDS: usize = ((BRICK_SIZE * BRICK_SIZE * BRICK_SIZE) / 32) as usize;

// ============================================================================
// Brick
// ============================================================================

/// One 8x8x8 block of voxels
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct Brick {
    /// One bit per voxel, x fastest, then y, then z
    pub occupancy: [u32; BRICK_WORDS],
    /// RGBA8 color shared by every voxel in the brick
    pub color: [u8; 4],
}

impl Brick {
    /// Brick with every voxel set
    pub fn solid(color: [u8; 4]) -> Self {
        Self {
            occupancy: [u32::MAX; BRICK_WORDS],
            color,
        }
    }

    /// Brick with an explicit occupancy mask
    pub fn with_occupancy(occupancy: [u32; BRICK_WORDS], color: [u8; 4]) -> Self {
        Self { occupancy, color }
    }

    fn bit(x: u32, y: u32, z: u32) -> Option<(usize, u32)> {
        if x >= BRICK_SIZE || y >= BRICK_SIZE || z >= BRICK_SIZE {
            return None;
        }
        let idx = x + BRICK_SIZE * (y + BRICK_SIZE * z);
        Some(((idx / 32) as usize, idx % 32))
    }

    pub fn is_set(&self, x: u32, y: u32, z: u32) -> bool {
        Self::bit(x, y, z)
            .map(|(word, bit)| self.occupancy[word] & (1 << bit) != 0)
            .unwrap_or(false)
    }

    pub fn set(&mut self, x: u32, y: u32, z: u32, filled: bool) {
        if let Some((word, bit)) = Self::bit(x, y, z) {
            if filled {
                self.occupancy[word] |= 1 << bit;
            } else {
                self.occupancy[word] &= !(1 << bit);
            }
        }
    }

    /// Number of filled voxels
    pub fn voxel_count(&self) -> u32 {
        self.occupancy.iter().map(|w| w.count_ones()).sum()
    }
}

// ============================================================================
// Voxel Frame
// ============================================================================

/// A decoded brick map.
///
/// Dimensions are measured in bricks, not voxels.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VoxelFrame {
    width: u32,
    height: u32,
    depth: u32,
    map: Vec<u32>,
    bricks: Vec<Brick>,
}

impl VoxelFrame {
    /// Number of map cells for a map of the given size in bricks.
    /// `None` if it exceeds `MAX_MAP_CELLS`.
    pub fn map_cells(width: u32, height: u32, depth: u32) -> Option<usize> {
        (width as usize)
            .checked_mul(height as usize)?
            .checked_mul(depth as usize)
            .filter(|&cells| cells <= MAX_MAP_CELLS)
    }

    /// Map size in bricks for a volume of the given voxel size
    pub fn brick_dimensions(width: u32, height: u32, depth: u32) -> (u32, u32, u32) {
        (
            width.div_ceil(BRICK_SIZE),
            height.div_ceil(BRICK_SIZE),
            depth.div_ceil(BRICK_SIZE),
        )
    }

    /// Empty frame with the given size in bricks, or `None` if the map
    /// would exceed `MAX_MAP_CELLS`
    pub fn empty(width: u32, height: u32, depth: u32) -> Option<Self> {
        let cells = Self::map_cells(width, height, depth)?;
        Some(Self {
            width,
            height,
            depth,
            map: vec![EMPTY_BRICK; cells],
            bricks: Vec::new(),
        })
    }

    /// Empty frame large enough to hold a volume of the given voxel size
    pub fn for_volume(width: u32, height: u32, depth: u32) -> Option<Self> {
        let (w, h, d) = Self::brick_dimensions(width, height, depth);
        Self::empty(w, h, d)
    }

    /// Map size in bricks (width, height, depth)
    pub fn dimensions(&self) -> (u32, u32, u32) {
        (self.width, self.height, self.depth)
    }

    pub fn map(&self) -> &[u32] {
        &self.map
    }

    pub fn bricks(&self) -> &[Brick] {
        &self.bricks
    }

    pub fn brick_count(&self) -> usize {
        self.bricks.len()
    }

    pub fn voxel_count(&self) -> u64 {
        self.bricks.iter().map(|b| b.voxel_count() as u64).sum()
    }

    /// Raw map bytes for GPU upload
    pub fn map_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.map)
    }

    /// Raw brick bytes for GPU upload
    pub fn brick_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.bricks)
    }

    fn cell(&self, x: u32, y: u32, z: u32) -> Option<usize> {
        if x >= self.width || y >= self.height || z >= self.depth {
            return None;
        }
        Some(x as usize + self.width as usize * (y as usize + self.height as usize * z as usize))
    }

    fn coords(&self, cell: usize) -> (u32, u32, u32) {
        let w = self.width as usize;
        let h = self.height as usize;
        ((cell % w) as u32, ((cell / w) % h) as u32, (cell / (w * h)) as u32)
    }

    pub fn contains_cell(&self, x: u32, y: u32, z: u32) -> bool {
        self.cell(x, y, z).is_some()
    }

    pub fn brick_at(&self, x: u32, y: u32, z: u32) -> Option<&Brick> {
        let cell = self.cell(x, y, z)?;
        match self.map[cell] {
            EMPTY_BRICK => None,
            idx => self.bricks.get(idx as usize),
        }
    }

    /// Store a brick at a brick coordinate, replacing any existing one.
    /// Returns false if the coordinate is outside the map.
    pub fn set_brick(&mut self, x: u32, y: u32, z: u32, brick: Brick) -> bool {
        let Some(cell) = self.cell(x, y, z) else {
            return false;
        };
        match self.map[cell] {
            EMPTY_BRICK => {
                self.map[cell] = self.bricks.len() as u32;
                self.bricks.push(brick);
            }
            idx => self.bricks[idx as usize] = brick,
        }
        true
    }

    /// Remove the brick at a brick coordinate
    pub fn remove_brick(&mut self, x: u32, y: u32, z: u32) -> Option<Brick> {
        let cell = self.cell(x, y, z)?;
        let idx = self.map[cell];
        if idx == EMPTY_BRICK {
            return None;
        }
        self.map[cell] = EMPTY_BRICK;

        // swap_remove moves the last brick into the hole; repoint its cell
        let last = (self.bricks.len() - 1) as u32;
        let removed = self.bricks.swap_remove(idx as usize);
        if idx != last {
            if let Some(moved) = self.map.iter_mut().find(|v| **v == last) {
                *moved = idx;
            }
        }
        Some(removed)
    }

    /// Copy every brick of `other` into this frame.
    /// Returns false if the map sizes differ.
    pub fn overlay(&mut self, other: &VoxelFrame) -> bool {
        if self.dimensions() != other.dimensions() {
            return false;
        }
        for (cell, &idx) in other.map.iter().enumerate() {
            if idx == EMPTY_BRICK {
                continue;
            }
            let (x, y, z) = other.coords(cell);
            self.set_brick(x, y, z, other.bricks[idx as usize]);
        }
        true
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_brick_bits() {
        let mut brick = Brick::with_occupancy([0; BRICK_WORDS], [255, 0, 0, 255]);
        assert_eq!(brick.voxel_count(), 0);

        brick.set(7, 7, 7, true);
        brick.set(1, 2, 3, true);
        assert!(brick.is_set(7, 7, 7));
        assert!(brick.is_set(1, 2, 3));
        assert!(!brick.is_set(0, 0, 0));
        assert!(!brick.is_set(8, 0, 0));
        assert_eq!(brick.voxel_count(), 2);

        brick.set(7, 7, 7, false);
        assert_eq!(brick.voxel_count(), 1);
        assert_eq!(Brick::solid([0; 4]).voxel_count(), 512);
    }

    #[test]
    fn test_for_volume_rounds_up() {
        let frame = VoxelFrame::for_volume(64, 20, 1).unwrap();
        assert_eq!(frame.dimensions(), (8, 3, 1));
        assert_eq!(frame.map().len(), 24);
        assert!(frame.contains_cell(7, 2, 0));
        assert!(!frame.contains_cell(8, 0, 0));
        assert!(frame.map().iter().all(|&v| v == EMPTY_BRICK));
    }

    #[test]
    fn test_oversized_map_is_rejected() {
        assert!(VoxelFrame::empty(u32::MAX, u32::MAX, u32::MAX).is_none());
        assert!(VoxelFrame::for_volume(u32::MAX, u32::MAX, u32::MAX).is_none());
        assert!(VoxelFrame::empty(1 << 9, 1 << 9, 1 << 9).is_none());
        assert_eq!(VoxelFrame::map_cells(256, 256, 256), Some(MAX_MAP_CELLS));
        assert_eq!(
            VoxelFrame::brick_dimensions(u32::MAX, 1, 16),
            (u32::MAX / BRICK_SIZE + 1, 1, 2)
        );
    }

    #[test]
    fn test_set_and_remove_keeps_map_consistent() {
        let mut frame = VoxelFrame::empty(4, 4, 4).unwrap();
        assert!(frame.set_brick(0, 0, 0, Brick::solid([1, 0, 0, 255])));
        assert!(frame.set_brick(1, 2, 3, Brick::solid([2, 0, 0, 255])));
        assert!(frame.set_brick(3, 3, 3, Brick::solid([3, 0, 0, 255])));
        assert!(!frame.set_brick(4, 0, 0, Brick::solid([9, 0, 0, 255])));
        assert_eq!(frame.brick_count(), 3);

        let removed = frame.remove_brick(0, 0, 0).unwrap();
        assert_eq!(removed.color[0], 1);
        assert_eq!(frame.brick_count(), 2);
        assert!(frame.brick_at(0, 0, 0).is_none());

        // The last brick was moved into slot 0; lookups must still resolve
        assert_eq!(frame.brick_at(3, 3, 3).unwrap().color[0], 3);
        assert_eq!(frame.brick_at(1, 2, 3).unwrap().color[0], 2);
        assert!(frame.remove_brick(0, 0, 0).is_none());
    }

    #[test]
    fn test_overlay() {
        let mut base = VoxelFrame::empty(2, 2, 2).unwrap();
        base.set_brick(0, 0, 0, Brick::solid([1, 0, 0, 255]));
        base.set_brick(1, 1, 1, Brick::solid([1, 0, 0, 255]));

        let mut delta = VoxelFrame::empty(2, 2, 2).unwrap();
        delta.set_brick(1, 1, 1, Brick::solid([2, 0, 0, 255]));
        delta.set_brick(0, 1, 0, Brick::solid([2, 0, 0, 255]));

        assert!(base.overlay(&delta));
        assert_eq!(base.brick_count(), 3);
        assert_eq!(base.brick_at(1, 1, 1).unwrap().color[0], 2);
        assert_eq!(base.brick_at(0, 0, 0).unwrap().color[0], 1);

        assert!(!base.overlay(&VoxelFrame::empty(1, 1, 1).unwrap()));
    }

    #[test]
    fn test_upload_bytes() {
        let mut frame = VoxelFrame::empty(2, 1, 1).unwrap();
        frame.set_brick(1, 0, 0, Brick::solid([0, 0, 0, 0]));
        assert_eq!(frame.map_bytes().len(), 2 * 4);
        assert_eq!(frame.brick_bytes().len(), std::mem::size_of::<Brick>());
    }
}
