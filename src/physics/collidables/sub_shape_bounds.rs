//! Batched storage of the bounding boxes of a compound's children.
//!
//! Boxes are stored four at a time in structure of arrays form: six buffers (min x, min y, min z, max x, max y,
//! max z) where lane `i` of block `b` belongs to child `4 * b + i`. Blocks past the last child are never read; slots
//! of the last block past the last child hold a copy of the last child's box.

use std::io::{Read, Write};

use glam::{Vec3, Vec4};
use log::trace;

use crate::utilities::bounding_box::BoundingBox;
use crate::utilities::bounding_box_wide::{BoundingBoxWide, BLOCK_WIDTH};
use crate::utilities::memory::LaneBuffer;
use crate::utilities::stream::{StreamIn, StreamOut};

const MIN_X: usize = 0;
const MIN_Y: usize = 1;
const MIN_Z: usize = 2;
const MAX_X: usize = 3;
const MAX_Y: usize = 4;
const MAX_Z: usize = 5;

/// Number of blocks needed to hold `sub_shape_count` boxes.
#[inline(always)]
pub fn block_count_for(sub_shape_count: usize) -> usize {
    sub_shape_count.div_ceil(BLOCK_WIDTH)
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SubShapeBounds {
    buffers: [LaneBuffer; 6],
}

impl SubShapeBounds {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of blocks that fit without growing.
    #[inline]
    pub fn block_capacity(&self) -> usize {
        self.buffers[MIN_X].len()
    }

    /// Grows every buffer so `sub_shape_count` boxes fit. Never shrinks.
    pub fn ensure_capacity(&mut self, sub_shape_count: usize) {
        let block_count = block_count_for(sub_shape_count);
        if block_count <= self.block_capacity() {
            return;
        }
        trace!(
            "Growing sub shape bounds from {} to {} blocks",
            self.block_capacity(),
            block_count
        );
        for buffer in &mut self.buffers {
            buffer.ensure_len(block_count);
        }
    }

    /// Loads block `block` into registers.
    #[inline(always)]
    pub fn block(&self, block: usize) -> BoundingBoxWide {
        BoundingBoxWide {
            min_x: self.buffers[MIN_X][block],
            min_y: self.buffers[MIN_Y][block],
            min_z: self.buffers[MIN_Z][block],
            max_x: self.buffers[MAX_X][block],
            max_y: self.buffers[MAX_Y][block],
            max_z: self.buffers[MAX_Z][block],
        }
    }

    #[inline(always)]
    pub fn set_block(&mut self, block: usize, bounds: &BoundingBoxWide) {
        debug_assert!(block < self.block_capacity(), "Capacity must be ensured before writing blocks.");
        self.buffers[MIN_X][block] = bounds.min_x;
        self.buffers[MIN_Y][block] = bounds.min_y;
        self.buffers[MIN_Z][block] = bounds.min_z;
        self.buffers[MAX_X][block] = bounds.max_x;
        self.buffers[MAX_Y][block] = bounds.max_y;
        self.buffers[MAX_Z][block] = bounds.max_z;
    }

    /// Union of all boxes in the first `block_count` blocks, or an empty box when there are none.
    pub fn union(&self, block_count: usize) -> BoundingBox {
        if block_count == 0 {
            return BoundingBox::empty();
        }
        debug_assert!(block_count <= self.block_capacity(), "Not enough blocks stored.");
        let reduce_min = |buffer: &LaneBuffer| {
            buffer
                .iter()
                .take(block_count)
                .fold(Vec4::splat(f32::MAX), |acc, block| acc.min(*block))
                .min_element()
        };
        let reduce_max = |buffer: &LaneBuffer| {
            buffer
                .iter()
                .take(block_count)
                .fold(Vec4::splat(-f32::MAX), |acc, block| acc.max(*block))
                .max_element()
        };
        BoundingBox::new(
            Vec3::new(
                reduce_min(&self.buffers[MIN_X]),
                reduce_min(&self.buffers[MIN_Y]),
                reduce_min(&self.buffers[MIN_Z]),
            ),
            Vec3::new(
                reduce_max(&self.buffers[MAX_X]),
                reduce_max(&self.buffers[MAX_Y]),
                reduce_max(&self.buffers[MAX_Z]),
            ),
        )
    }

    /// Writes the first `block_count` blocks of every buffer verbatim.
    pub fn save<W: Write + ?Sized>(&self, stream: &mut W, block_count: usize) -> std::io::Result<()> {
        for buffer in &self.buffers {
            stream.write_bytes(buffer.as_bytes(block_count))?;
        }
        Ok(())
    }

    /// Reads `block_count` blocks into every buffer, growing as needed.
    pub fn restore<R: Read + ?Sized>(&mut self, stream: &mut R, block_count: usize) -> std::io::Result<()> {
        self.ensure_capacity(block_count * BLOCK_WIDTH);
        for buffer in &mut self.buffers {
            stream.read_bytes(buffer.as_bytes_mut(block_count))?;
        }
        Ok(())
    }
}
