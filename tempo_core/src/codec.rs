//! The "SNAPSHOT" Codec - fixed-layout binary state encoding
//!
//! Every history entry is a flat byte payload produced by a
//! [`SnapshotWriter`] and consumed by a [`SnapshotReader`]. Values are
//! written little-endian in call order and must be read back in the same
//! order. Each payload starts with a `u16` schema version so a reader can
//! refuse a payload written by a different layout.

use thiserror::Error;

/// Errors raised while decoding a snapshot payload.
///
/// Any of these means the writer and reader disagree about the layout.
/// The payload is never partially applied or silently truncated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// Reader asked for more bytes than the payload holds
    #[error("payload truncated: requested {requested} bytes, {remaining} remaining")]
    Truncated { requested: usize, remaining: usize },

    /// Payload was written by a different schema version
    #[error("schema version mismatch: expected v{expected}, found v{found}")]
    VersionMismatch { expected: u16, found: u16 },

    /// Reader finished with bytes left over
    #[error("{0} trailing bytes after decode")]
    TrailingBytes(usize),

    /// A `bool` byte that is neither 0 nor 1
    #[error("invalid bool byte 0x{0:02x}")]
    InvalidBool(u8),
}

/// A value with a fixed binary layout.
///
/// Implementations must be bit-exact: `read(write(x)) == x` including the
/// bit pattern of floats.
pub trait SnapshotField: Sized {
    /// Encoded size in bytes.
    const SIZE: usize;

    /// Appends the encoded value to `out`.
    fn put(&self, out: &mut Vec<u8>);

    /// Decodes a value from exactly `SIZE` bytes.
    fn get(bytes: &[u8]) -> Result<Self, CodecError>;
}

macro_rules! impl_le_field {
    ($($ty:ty),* $(,)?) => {
        $(
            impl SnapshotField for $ty {
                const SIZE: usize = std::mem::size_of::<$ty>();

                fn put(&self, out: &mut Vec<u8>) {
                    out.extend_from_slice(&self.to_le_bytes());
                }

                fn get(bytes: &[u8]) -> Result<Self, CodecError> {
                    let mut raw = [0u8; std::mem::size_of::<$ty>()];
                    raw.copy_from_slice(bytes);
                    Ok(<$ty>::from_le_bytes(raw))
                }
            }
        )*
    };
}

impl_le_field!(u8, u16, u32, u64, i8, i16, i32, i64);

impl SnapshotField for f32 {
    const SIZE: usize = 4;

    fn put(&self, out: &mut Vec<u8>) {
        self.to_bits().put(out);
    }

    fn get(bytes: &[u8]) -> Result<Self, CodecError> {
        u32::get(bytes).map(f32::from_bits)
    }
}

impl SnapshotField for f64 {
    const SIZE: usize = 8;

    fn put(&self, out: &mut Vec<u8>) {
        self.to_bits().put(out);
    }

    fn get(bytes: &[u8]) -> Result<Self, CodecError> {
        u64::get(bytes).map(f64::from_bits)
    }
}

impl SnapshotField for bool {
    const SIZE: usize = 1;

    fn put(&self, out: &mut Vec<u8>) {
        out.push(u8::from(*self));
    }

    fn get(bytes: &[u8]) -> Result<Self, CodecError> {
        match bytes[0] {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(CodecError::InvalidBool(other)),
        }
    }
}

impl<T: SnapshotField, const N: usize> SnapshotField for [T; N] {
    const SIZE: usize = T::SIZE * N;

    fn put(&self, out: &mut Vec<u8>) {
        for item in self {
            item.put(out);
        }
    }

    fn get(bytes: &[u8]) -> Result<Self, CodecError> {
        let mut items = Vec::with_capacity(N);
        if T::SIZE == 0 {
            // Zero-width items carry no bytes to chunk.
            for _ in 0..N {
                items.push(T::get(&[])?);
            }
        } else {
            for chunk in bytes.chunks_exact(T::SIZE) {
                items.push(T::get(chunk)?);
            }
        }
        match items.try_into() {
            Ok(array) => Ok(array),
            Err(_) => Err(CodecError::Truncated {
                requested: Self::SIZE,
                remaining: bytes.len(),
            }),
        }
    }
}

/// Appends fixed-layout values to a reusable buffer.
///
/// The buffer keeps its capacity across snapshots; only the history entry
/// that stores the finished payload allocates.
#[derive(Debug, Default)]
pub struct SnapshotWriter {
    buf: Vec<u8>,
}

impl SnapshotWriter {
    /// Creates an empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a writer with pre-reserved capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    /// Starts a new payload tagged with a schema version.
    pub fn begin(&mut self, version: u16) {
        self.buf.clear();
        version.put(&mut self.buf);
    }

    /// Discards any partial payload.
    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// Appends one value.
    pub fn write<T: SnapshotField>(&mut self, value: &T) -> &mut Self {
        value.put(&mut self.buf);
        self
    }

    /// The payload written since the last `begin`.
    pub fn bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Copies the payload out as an owned boxed slice.
    pub fn to_payload(&self) -> Box<[u8]> {
        self.buf.as_slice().into()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

/// Reads fixed-layout values from a payload in write order.
#[derive(Debug)]
pub struct SnapshotReader<'a> {
    bytes: &'a [u8],
    cursor: usize,
}

impl<'a> SnapshotReader<'a> {
    /// Wraps a payload, positioned at its first byte.
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, cursor: 0 }
    }

    /// Reads the version header and checks it.
    pub fn expect_version(&mut self, expected: u16) -> Result<(), CodecError> {
        let found: u16 = self.read()?;
        if found != expected {
            return Err(CodecError::VersionMismatch { expected, found });
        }
        Ok(())
    }

    /// Reads the next value and advances the cursor.
    pub fn read<T: SnapshotField>(&mut self) -> Result<T, CodecError> {
        let remaining = self.remaining();
        if T::SIZE > remaining {
            return Err(CodecError::Truncated {
                requested: T::SIZE,
                remaining,
            });
        }
        let value = T::get(&self.bytes[self.cursor..self.cursor + T::SIZE])?;
        self.cursor += T::SIZE;
        Ok(value)
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.cursor
    }

    /// Asserts the whole payload was consumed.
    pub fn finish(self) -> Result<(), CodecError> {
        match self.remaining() {
            0 => Ok(()),
            n => Err(CodecError::TrailingBytes(n)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_sequential_reads_follow_write_order() {
        let mut writer = SnapshotWriter::new();
        writer.begin(3);
        writer.write(&42u64).write(&-7i32).write(&1.5f32).write(&true);

        let mut reader = SnapshotReader::new(writer.bytes());
        reader.expect_version(3).unwrap();
        assert_eq!(reader.read::<u64>().unwrap(), 42);
        assert_eq!(reader.read::<i32>().unwrap(), -7);
        assert_eq!(reader.read::<f32>().unwrap(), 1.5);
        assert!(reader.read::<bool>().unwrap());
        reader.finish().unwrap();
    }

    #[test]
    fn test_writer_reuses_buffer() {
        let mut writer = SnapshotWriter::with_capacity(64);
        writer.begin(1);
        writer.write(&[1u64; 4]);
        let first = writer.to_payload();

        writer.begin(1);
        writer.write(&9u8);
        assert_eq!(writer.len(), 3);
        assert_eq!(first.len(), 2 + 32);
    }

    #[test]
    fn test_over_read_is_truncation() {
        let mut writer = SnapshotWriter::new();
        writer.begin(1);
        writer.write(&7u16);

        let mut reader = SnapshotReader::new(writer.bytes());
        reader.expect_version(1).unwrap();
        let err = reader.read::<u64>().unwrap_err();
        assert_eq!(err, CodecError::Truncated { requested: 8, remaining: 2 });
    }

    #[test]
    fn test_version_and_trailing_checks() {
        let mut writer = SnapshotWriter::new();
        writer.begin(2);
        writer.write(&1u32);

        let mut reader = SnapshotReader::new(writer.bytes());
        assert_eq!(
            reader.expect_version(1).unwrap_err(),
            CodecError::VersionMismatch { expected: 1, found: 2 }
        );

        let mut reader = SnapshotReader::new(writer.bytes());
        reader.expect_version(2).unwrap();
        assert_eq!(reader.finish().unwrap_err(), CodecError::TrailingBytes(4));
    }

    #[test]
    fn test_invalid_bool_rejected() {
        let mut reader = SnapshotReader::new(&[2u8]);
        assert_eq!(reader.read::<bool>().unwrap_err(), CodecError::InvalidBool(2));
    }

    #[test]
    fn test_zero_width_array_items_read_without_bytes() {
        let mut writer = SnapshotWriter::new();
        writer.begin(4);
        writer.write(&[[0u8; 0]; 3]).write(&5u8);

        let mut reader = SnapshotReader::new(writer.bytes());
        reader.expect_version(4).unwrap();
        assert_eq!(reader.read::<[[u8; 0]; 3]>().unwrap(), [[0u8; 0]; 3]);
        assert_eq!(reader.read::<u8>().unwrap(), 5);
        reader.finish().unwrap();
    }

    #[test]
    fn test_nan_payload_is_bit_exact() {
        let weird = f64::from_bits(0x7ff8_dead_beef_0001);
        let mut writer = SnapshotWriter::new();
        writer.begin(0);
        writer.write(&weird);

        let mut reader = SnapshotReader::new(writer.bytes());
        reader.expect_version(0).unwrap();
        assert_eq!(reader.read::<f64>().unwrap().to_bits(), weird.to_bits());
    }

    proptest! {
        #[test]
        fn prop_mixed_record_roundtrip(
            tick in any::<u64>(),
            ore in any::<i64>(),
            growth in any::<[u32; 4]>(),
            speed_bits in any::<u32>(),
            pos_bits in any::<u64>(),
            flag in any::<bool>(),
        ) {
            let speed = f32::from_bits(speed_bits);
            let pos = f64::from_bits(pos_bits);

            let mut writer = SnapshotWriter::new();
            writer.begin(9);
            writer.write(&tick).write(&ore).write(&growth).write(&speed).write(&pos).write(&flag);

            let mut reader = SnapshotReader::new(writer.bytes());
            reader.expect_version(9).unwrap();
            prop_assert_eq!(reader.read::<u64>().unwrap(), tick);
            prop_assert_eq!(reader.read::<i64>().unwrap(), ore);
            prop_assert_eq!(reader.read::<[u32; 4]>().unwrap(), growth);
            prop_assert_eq!(reader.read::<f32>().unwrap().to_bits(), speed_bits);
            prop_assert_eq!(reader.read::<f64>().unwrap().to_bits(), pos_bits);
            prop_assert_eq!(reader.read::<bool>().unwrap(), flag);
            prop_assert!(reader.finish().is_ok());
        }
    }
}
