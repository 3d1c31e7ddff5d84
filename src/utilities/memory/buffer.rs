use std::ops::{Deref, DerefMut, Index, IndexMut};

use glam::Vec4;

/// Grow-only buffer of 4-wide lanes.
///
/// Every element is a `Vec4`, so the storage is 16 byte aligned and can be loaded directly into SIMD registers.
/// The logical length only ever grows; shrinking the data that lives in the buffer is left to the owner, which keeps
/// add/remove churn free of reallocations.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LaneBuffer {
    lanes: Vec<Vec4>,
}

impl LaneBuffer {
    /// Creates an empty buffer without allocating.
    #[inline]
    pub const fn new() -> Self {
        Self { lanes: Vec::new() }
    }

    /// Returns the length of the buffer in lanes.
    #[inline]
    pub fn len(&self) -> usize {
        self.lanes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.lanes.is_empty()
    }

    /// Grows the buffer to hold at least `lane_count` lanes, preserving existing contents.
    /// New lanes are zeroed. Requests for fewer lanes than the buffer holds are ignored.
    /// Returns true if the buffer grew.
    pub fn ensure_len(&mut self, lane_count: usize) -> bool {
        if lane_count <= self.lanes.len() {
            return false;
        }
        self.lanes.resize(lane_count, Vec4::ZERO);
        true
    }

    /// Views the first `lane_count` lanes as raw bytes.
    #[inline]
    pub fn as_bytes(&self, lane_count: usize) -> &[u8] {
        debug_assert!(lane_count <= self.lanes.len(), "Byte view out of bounds.");
        bytemuck::cast_slice(&self.lanes[..lane_count])
    }

    /// Views the first `lane_count` lanes as mutable raw bytes.
    #[inline]
    pub fn as_bytes_mut(&mut self, lane_count: usize) -> &mut [u8] {
        debug_assert!(lane_count <= self.lanes.len(), "Byte view out of bounds.");
        bytemuck::cast_slice_mut(&mut self.lanes[..lane_count])
    }
}

impl Index<usize> for LaneBuffer {
    type Output = Vec4;

    #[inline(always)]
    fn index(&self, index: usize) -> &Self::Output {
        &self.lanes[index]
    }
}

impl IndexMut<usize> for LaneBuffer {
    #[inline(always)]
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        &mut self.lanes[index]
    }
}

impl Deref for LaneBuffer {
    type Target = [Vec4];

    fn deref(&self) -> &[Vec4] {
        &self.lanes
    }
}

impl DerefMut for LaneBuffer {
    fn deref_mut(&mut self) -> &mut [Vec4] {
        &mut self.lanes
    }
}
