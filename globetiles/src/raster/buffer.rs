//! Typed sample storage.

use super::types::{ByteOrder, DataType, RasterError};

/// Owned sample buffer of one of the supported data types.
#[derive(Debug, Clone, PartialEq)]
pub enum RasterBuffer {
    Int8(Vec<i8>),
    Int16(Vec<i16>),
    Int32(Vec<i32>),
    Float32(Vec<f32>),
}

/// Allocate `len` copies of `fill`, reporting allocation failure.
fn try_filled<T: Clone>(len: usize, fill: T) -> Result<Vec<T>, RasterError> {
    let mut v = Vec::new();
    v.try_reserve_exact(len)
        .map_err(|_| RasterError::OutOfMemory {
            bytes: len.saturating_mul(std::mem::size_of::<T>()),
        })?;
    v.resize(len, fill);
    Ok(v)
}

impl RasterBuffer {
    /// Allocate `len` samples set to `fill`.
    pub fn filled(data_type: DataType, len: usize, fill: f64) -> Result<Self, RasterError> {
        Ok(match data_type {
            DataType::Int8 => Self::Int8(try_filled(len, to_int(fill, i8::MIN, i8::MAX) as i8)?),
            DataType::Int16 => {
                Self::Int16(try_filled(len, to_int(fill, i16::MIN, i16::MAX) as i16)?)
            }
            DataType::Int32 => {
                Self::Int32(try_filled(len, to_int(fill, i32::MIN, i32::MAX) as i32)?)
            }
            DataType::Float32 => Self::Float32(try_filled(len, fill as f32)?),
        })
    }

    /// Decode samples from raw bytes in the given byte order.
    pub fn from_bytes(
        data_type: DataType,
        byte_order: ByteOrder,
        bytes: &[u8],
    ) -> Result<Self, RasterError> {
        let size = data_type.size();
        if bytes.len() % size != 0 {
            return Err(RasterError::SizeMismatch {
                expected: bytes.len() / size * size,
                actual: bytes.len(),
            });
        }
        let len = bytes.len() / size;

        macro_rules! decode {
            ($variant:ident, $ty:ty, $n:expr) => {{
                let mut out: Vec<$ty> = Vec::new();
                out.try_reserve_exact(len)
                    .map_err(|_| RasterError::OutOfMemory { bytes: bytes.len() })?;
                out.extend(bytes.chunks_exact($n).map(|c| {
                    let mut raw = [0u8; $n];
                    raw.copy_from_slice(c);
                    match byte_order {
                        ByteOrder::LittleEndian => <$ty>::from_le_bytes(raw),
                        ByteOrder::BigEndian => <$ty>::from_be_bytes(raw),
                    }
                }));
                Self::$variant(out)
            }};
        }

        Ok(match data_type {
            DataType::Int8 => decode!(Int8, i8, 1),
            DataType::Int16 => decode!(Int16, i16, 2),
            DataType::Int32 => decode!(Int32, i32, 4),
            DataType::Float32 => decode!(Float32, f32, 4),
        })
    }

    pub fn data_type(&self) -> DataType {
        match self {
            Self::Int8(_) => DataType::Int8,
            Self::Int16(_) => DataType::Int16,
            Self::Int32(_) => DataType::Int32,
            Self::Float32(_) => DataType::Float32,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Int8(v) => v.len(),
            Self::Int16(v) => v.len(),
            Self::Int32(v) => v.len(),
            Self::Float32(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn byte_size(&self) -> usize {
        self.len() * self.data_type().size()
    }

    /// Sample `i` widened to `f64`.
    #[inline]
    pub fn get(&self, i: usize) -> f64 {
        match self {
            Self::Int8(v) => f64::from(v[i]),
            Self::Int16(v) => f64::from(v[i]),
            Self::Int32(v) => f64::from(v[i]),
            Self::Float32(v) => f64::from(v[i]),
        }
    }

    /// Encode all samples in the given byte order.
    pub fn to_bytes(&self, byte_order: ByteOrder) -> Vec<u8> {
        macro_rules! encode {
            ($v:expr) => {{
                let mut out = Vec::with_capacity(self.byte_size());
                for x in $v {
                    match byte_order {
                        ByteOrder::LittleEndian => out.extend_from_slice(&x.to_le_bytes()),
                        ByteOrder::BigEndian => out.extend_from_slice(&x.to_be_bytes()),
                    }
                }
                out
            }};
        }

        match self {
            Self::Int8(v) => encode!(v),
            Self::Int16(v) => encode!(v),
            Self::Int32(v) => encode!(v),
            Self::Float32(v) => encode!(v),
        }
    }

    /// Store `value` at `i`, rounding and saturating for integer types.
    #[inline]
    pub fn set(&mut self, i: usize, value: f64) {
        match self {
            Self::Int8(v) => v[i] = to_int(value, i8::MIN, i8::MAX) as i8,
            Self::Int16(v) => v[i] = to_int(value, i16::MIN, i16::MAX) as i16,
            Self::Int32(v) => v[i] = to_int(value, i32::MIN, i32::MAX) as i32,
            Self::Float32(v) => v[i] = value as f32,
        }
    }
}

fn to_int<T: Into<f64>>(value: f64, min: T, max: T) -> i64 {
    value.round().clamp(min.into(), max.into()) as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_int16_both_orders() {
        let le = RasterBuffer::from_bytes(DataType::Int16, ByteOrder::LittleEndian, &[0x01, 0x02])
            .unwrap();
        let be = RasterBuffer::from_bytes(DataType::Int16, ByteOrder::BigEndian, &[0x01, 0x02])
            .unwrap();
        assert_eq!(le.get(0), 513.0);
        assert_eq!(be.get(0), 258.0);
    }

    #[test]
    fn test_decode_float32() {
        let bytes = (-12.5f32).to_be_bytes();
        let buf = RasterBuffer::from_bytes(DataType::Float32, ByteOrder::BigEndian, &bytes).unwrap();
        assert_eq!(buf.get(0), -12.5);
        assert_eq!(buf.len(), 1);
    }

    #[test]
    fn test_encode_matches_decode_layout() {
        let mut buf = RasterBuffer::filled(DataType::Int16, 2, 0.0).unwrap();
        buf.set(0, 258.0);
        buf.set(1, -2.0);
        assert_eq!(buf.to_bytes(ByteOrder::BigEndian), vec![0x01, 0x02, 0xFF, 0xFE]);
        assert_eq!(buf.to_bytes(ByteOrder::LittleEndian), vec![0x02, 0x01, 0xFE, 0xFF]);
    }

    #[test]
    fn test_decode_rejects_partial_sample() {
        let result = RasterBuffer::from_bytes(DataType::Int32, ByteOrder::LittleEndian, &[1, 2, 3]);
        assert!(matches!(result, Err(RasterError::SizeMismatch { .. })));
    }

    #[test]
    fn test_set_saturates_and_rounds() {
        let mut buf = RasterBuffer::filled(DataType::Int8, 2, 0.0).unwrap();
        buf.set(0, 1000.0);
        buf.set(1, -2.6);
        assert_eq!(buf.get(0), 127.0);
        assert_eq!(buf.get(1), -3.0);
    }

    #[test]
    fn test_filled_reports_out_of_memory() {
        let result = RasterBuffer::filled(DataType::Float32, usize::MAX / 2, 0.0);
        assert!(matches!(result, Err(RasterError::OutOfMemory { .. })));
    }
}
