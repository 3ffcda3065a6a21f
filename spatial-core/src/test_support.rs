//! Instrumented fake codec shared by the unit tests

use crate::codec::{CodecError, DependencyMode, IndexedFrame, Metadata, SpatialCodec};
use crate::voxel::{Brick, VoxelFrame};
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// One decode call as seen by the fake codec
#[derive(Debug, Clone, Copy)]
pub(crate) struct CodecCall {
    pub index: u32,
    pub started: Instant,
    pub finished: Instant,
}

/// 1x1x1 brick frame whose color encodes the frame index
pub(crate) fn marker_frame(index: u32) -> VoxelFrame {
    let mut frame = VoxelFrame::empty(1, 1, 1).expect("1x1x1 map");
    frame.set_brick(0, 0, 0, Brick::solid([index as u8, 0, 0, 255]));
    frame
}

pub(crate) struct FakeCodec {
    metadata: Metadata,
    graph: Vec<Vec<u32>>,
    decode_delay: Duration,
    allocated: AtomicUsize,
    freed: AtomicUsize,
    failing: Mutex<HashSet<u32>>,
    panicking: Mutex<HashSet<u32>>,
    transitive: Mutex<HashMap<u32, Vec<u32>>>,
    calls: Mutex<Vec<CodecCall>>,
}

impl FakeCodec {
    pub fn new(graph: &[&[u32]], decode_delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            metadata: Metadata::new(8, 8, 8, 10.0, graph.len() as u32),
            graph: graph.iter().map(|deps| deps.to_vec()).collect(),
            decode_delay,
            allocated: AtomicUsize::new(0),
            freed: AtomicUsize::new(0),
            failing: Mutex::new(HashSet::new()),
            panicking: Mutex::new(HashSet::new()),
            transitive: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        })
    }

    /// `0:[]; 1:[0]; 2:[1]; ...`
    pub fn chain(frames: u32) -> Arc<Self> {
        let graph: Vec<Vec<u32>> = (0..frames)
            .map(|i| if i == 0 { vec![] } else { vec![i - 1] })
            .collect();
        let refs: Vec<&[u32]> = graph.iter().map(Vec::as_slice).collect();
        Self::new(&refs, Duration::ZERO)
    }

    /// `0:[]; 1:[0]; 2:[0]; 3:[1,2]; 4:[3]`
    pub fn diamond() -> Arc<Self> {
        Self::new(&[&[], &[0], &[0], &[1, 2], &[3]], Duration::ZERO)
    }

    /// Make every decode of `index` fail
    pub fn fail_on(&self, index: u32) {
        self.failing.lock().insert(index);
    }

    /// Make every decode of `index` panic
    pub fn panic_on(&self, index: u32) {
        self.panicking.lock().insert(index);
    }

    /// Answer transitive queries for `index` with `chain` instead of the
    /// closure of the graph
    pub fn override_transitive(&self, index: u32, chain: &[u32]) {
        self.transitive.lock().insert(index, chain.to_vec());
    }

    /// Produce a buffer the way `decode` would, counting the allocation
    pub fn allocate(&self, index: u32) -> VoxelFrame {
        self.allocated.fetch_add(1, Ordering::SeqCst);
        marker_frame(index)
    }

    pub fn allocated(&self) -> usize {
        self.allocated.load(Ordering::SeqCst)
    }

    pub fn freed(&self) -> usize {
        self.freed.load(Ordering::SeqCst)
    }

    /// Buffers allocated but not yet released
    pub fn live(&self) -> usize {
        self.allocated() - self.freed()
    }

    pub fn calls(&self) -> Vec<CodecCall> {
        self.calls.lock().clone()
    }

    /// Indices passed to `decode`, in call order
    pub fn decoded(&self) -> Vec<u32> {
        self.calls.lock().iter().map(|c| c.index).collect()
    }

    fn entry(&self, index: u32) -> Result<&Vec<u32>, CodecError> {
        self.graph
            .get(index as usize)
            .ok_or(CodecError::UnknownFrame(index))
    }
}

impl SpatialCodec for FakeCodec {
    fn metadata(&self) -> Metadata {
        self.metadata
    }

    fn dependencies(&self, index: u32, mode: DependencyMode) -> Result<Vec<u32>, CodecError> {
        let deps = self.entry(index)?;
        match mode {
            DependencyMode::Immediate => Ok(deps.clone()),
            DependencyMode::Transitive => {
                if let Some(chain) = self.transitive.lock().get(&index) {
                    return Ok(chain.clone());
                }
                let mut closure = BTreeSet::new();
                let mut pending = deps.clone();
                while let Some(dep) = pending.pop() {
                    if closure.insert(dep) {
                        pending.extend(self.entry(dep)?.iter().copied());
                    }
                }
                Ok(closure.into_iter().collect())
            }
        }
    }

    fn decode(&self, index: u32, dependencies: &[IndexedFrame<'_>]) -> Result<VoxelFrame, CodecError> {
        let started = Instant::now();
        for &dependency in self.entry(index)? {
            let supplied = dependencies
                .iter()
                .any(|d| d.index == dependency && *d.frame == marker_frame(dependency));
            if !supplied {
                return Err(CodecError::MissingDependency {
                    frame: index,
                    dependency,
                });
            }
        }

        if self.panicking.lock().contains(&index) {
            panic!("fake codec asked to panic on frame {}", index);
        }

        if !self.decode_delay.is_zero() {
            std::thread::sleep(self.decode_delay);
        }

        let result = if self.failing.lock().contains(&index) {
            Err(CodecError::Code(-3))
        } else {
            Ok(self.allocate(index))
        };

        self.calls.lock().push(CodecCall {
            index,
            started,
            finished: Instant::now(),
        });
        result
    }

    fn release_buffer(&self, frame: VoxelFrame) {
        self.freed.fetch_add(1, Ordering::SeqCst);
        drop(frame);
    }

    fn name(&self) -> &str {
        "fake"
    }
}
