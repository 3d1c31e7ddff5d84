//! Binary stream helpers layered on `std::io`.
//!
//! Values are written verbatim in native byte order, so a stream can only be read back on a machine with the same
//! endianness. Framing and versioning are the responsibility of whoever owns the stream.

use std::io::{self, Read, Write};

use bytemuck::{Pod, Zeroable};

/// Append-only output stream.
pub trait StreamOut: Write {
    /// Writes raw bytes.
    #[inline]
    fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.write_all(bytes)
    }

    /// Writes a plain-old-data value.
    #[inline]
    fn write_value<T: Pod>(&mut self, value: &T) -> io::Result<()> {
        self.write_all(bytemuck::bytes_of(value))
    }
}

impl<W: Write + ?Sized> StreamOut for W {}

/// Consume-only input stream.
pub trait StreamIn: Read {
    /// Fills `bytes` completely from the stream.
    #[inline]
    fn read_bytes(&mut self, bytes: &mut [u8]) -> io::Result<()> {
        self.read_exact(bytes)
    }

    /// Reads a plain-old-data value.
    #[inline]
    fn read_value<T: Pod>(&mut self) -> io::Result<T> {
        let mut value: T = Zeroable::zeroed();
        self.read_exact(bytemuck::bytes_of_mut(&mut value))?;
        Ok(value)
    }
}

impl<R: Read + ?Sized> StreamIn for R {}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Quat, Vec3};

    #[test]
    fn values_round_trip_through_a_byte_vector() {
        let mut out = Vec::new();
        out.write_value(&Vec3::new(1.0, 2.0, 3.0)).unwrap();
        out.write_value(&Quat::from_rotation_x(0.5)).unwrap();
        out.write_value(&7u32).unwrap();
        assert_eq!(out.len(), 12 + 16 + 4);

        let mut input = out.as_slice();
        assert_eq!(input.read_value::<Vec3>().unwrap(), Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(input.read_value::<Quat>().unwrap(), Quat::from_rotation_x(0.5));
        assert_eq!(input.read_value::<u32>().unwrap(), 7);
        assert!(input.read_value::<u32>().is_err());
    }
}
