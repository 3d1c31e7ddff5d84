//! Memory primitives for the batched bounds storage.
//!
//! `LaneBuffer` holds SIMD aligned lanes that only ever grow, `StridedSlice` reads caller owned data laid out at an
//! arbitrary stride.

pub mod buffer;
pub mod strided_slice;

pub use buffer::LaneBuffer;
pub use strided_slice::StridedSlice;
