//! Read-only views over elements laid out at a fixed byte stride.

use std::marker::PhantomData;
use std::mem::size_of;

use bytemuck::Pod;

/// A sequence of `T` values that start every `stride` bytes within a byte buffer.
///
/// Lets callers hand over interleaved data (for example positions and rotations packed into one struct) or plain
/// arrays without copying them into a separate buffer first. Elements need not be aligned. A stride of 0 repeats
/// the first element forever.
#[derive(Clone, Copy, Debug)]
pub struct StridedSlice<'a, T: Pod> {
    bytes: &'a [u8],
    stride: usize,
    _marker: PhantomData<T>,
}

impl<'a, T: Pod> StridedSlice<'a, T> {
    /// Creates a view over `bytes` where element `i` starts at byte `i * stride`. Strides smaller than an element
    /// give overlapping elements.
    #[inline]
    pub fn new(bytes: &'a [u8], stride: usize) -> Self {
        Self {
            bytes,
            stride,
            _marker: PhantomData,
        }
    }

    /// Creates a view over a tightly packed slice.
    #[inline]
    pub fn from_slice(values: &'a [T]) -> Self {
        Self::new(bytemuck::cast_slice(values), size_of::<T>())
    }

    #[inline(always)]
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Number of complete elements the view can yield. Unbounded (`usize::MAX`) for a stride of 0.
    #[inline]
    pub fn len(&self) -> usize {
        if self.bytes.len() < size_of::<T>() {
            0
        } else if self.stride == 0 {
            usize::MAX
        } else {
            (self.bytes.len() - size_of::<T>()) / self.stride + 1
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reads element `index`, or `None` if it does not fit inside the buffer.
    #[inline]
    pub fn get(&self, index: usize) -> Option<T> {
        let start = index.checked_mul(self.stride)?;
        let end = start.checked_add(size_of::<T>())?;
        self.bytes
            .get(start..end)
            .map(bytemuck::pod_read_unaligned)
    }

    /// Iterates over all complete elements. Endless for a stride of 0.
    pub fn iter(&self) -> impl Iterator<Item = T> + 'a {
        let view = *self;
        (0..view.len()).map_while(move |index| view.get(index))
    }
}
