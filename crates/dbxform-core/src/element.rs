//! Scalar element types and the storage backing a [`TypedArray`](crate::TypedArray).

use std::fmt;

use serde::{Deserialize, Serialize};

/// Scalar element type of a typed array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementType {
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Float32,
    Float64,
    /// Index-sized integer (used for ids and connectivity).
    Id,
    /// Bit-packed boolean storage.
    Bit,
}

impl ElementType {
    /// Every element type, in declaration order.
    pub const ALL: [ElementType; 12] = [
        ElementType::Int8,
        ElementType::UInt8,
        ElementType::Int16,
        ElementType::UInt16,
        ElementType::Int32,
        ElementType::UInt32,
        ElementType::Int64,
        ElementType::UInt64,
        ElementType::Float32,
        ElementType::Float64,
        ElementType::Id,
        ElementType::Bit,
    ];

    /// Size in bytes of one element. Bit-packed storage reports zero.
    #[must_use]
    pub fn byte_width(self) -> usize {
        match self {
            Self::Int8 | Self::UInt8 => 1,
            Self::Int16 | Self::UInt16 => 2,
            Self::Int32 | Self::UInt32 | Self::Float32 => 4,
            Self::Int64 | Self::UInt64 | Self::Float64 | Self::Id => 8,
            Self::Bit => 0,
        }
    }

    /// Returns true for the two floating-point types.
    #[must_use]
    pub fn is_floating(self) -> bool {
        matches!(self, Self::Float32 | Self::Float64)
    }

    /// Canonical lowercase name, as used in cache kind tags and messages.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Int8 => "int8",
            Self::UInt8 => "uint8",
            Self::Int16 => "int16",
            Self::UInt16 => "uint16",
            Self::Int32 => "int32",
            Self::UInt32 => "uint32",
            Self::Int64 => "int64",
            Self::UInt64 => "uint64",
            Self::Float32 => "float32",
            Self::Float64 => "float64",
            Self::Id => "id",
            Self::Bit => "bit",
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Packed boolean storage, 64 values per word.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BitBuffer {
    words: Vec<u64>,
    len: usize,
}

impl BitBuffer {
    /// Packs a slice of booleans.
    pub fn from_bools(values: &[bool]) -> Self {
        let mut words = vec![0_u64; values.len().div_ceil(64)];
        for (i, &v) in values.iter().enumerate() {
            if v {
                words[i / 64] |= 1 << (i % 64);
            }
        }
        Self {
            words,
            len: values.len(),
        }
    }

    /// Number of stored bits.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if no bits are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Reads bit `i`, or `None` past the end.
    #[must_use]
    pub fn get(&self, i: usize) -> Option<bool> {
        (i < self.len).then(|| self.words[i / 64] & (1 << (i % 64)) != 0)
    }

    /// Raw packed words.
    #[must_use]
    pub fn words(&self) -> &[u64] {
        &self.words
    }
}

/// Homogeneous element storage for a typed array.
///
/// Values are stored flat, tuple-major: tuple `t` component `c` lives at
/// `t * num_components + c`.
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayData {
    Int8(Vec<i8>),
    UInt8(Vec<u8>),
    Int16(Vec<i16>),
    UInt16(Vec<u16>),
    Int32(Vec<i32>),
    UInt32(Vec<u32>),
    Int64(Vec<i64>),
    UInt64(Vec<u64>),
    Float32(Vec<f32>),
    Float64(Vec<f64>),
    Id(Vec<i64>),
    Bit(BitBuffer),
}

/// Matches every numeric [`ArrayData`] variant, binding the inner vector.
///
/// The numeric body is expanded once per element type, so it may use
/// primitive casts such as `x as f64`. Bit-packed storage takes the
/// separate `bit` arm.
#[macro_export]
macro_rules! with_numeric {
    ($data:expr, $v:ident => $body:expr, $b:ident => $bit:expr) => {
        match $data {
            $crate::element::ArrayData::Int8($v) => $body,
            $crate::element::ArrayData::UInt8($v) => $body,
            $crate::element::ArrayData::Int16($v) => $body,
            $crate::element::ArrayData::UInt16($v) => $body,
            $crate::element::ArrayData::Int32($v) => $body,
            $crate::element::ArrayData::UInt32($v) => $body,
            $crate::element::ArrayData::Int64($v) => $body,
            $crate::element::ArrayData::UInt64($v) => $body,
            $crate::element::ArrayData::Float32($v) => $body,
            $crate::element::ArrayData::Float64($v) => $body,
            $crate::element::ArrayData::Id($v) => $body,
            $crate::element::ArrayData::Bit($b) => $bit,
        }
    };
}

impl ArrayData {
    /// Element type of this storage.
    #[must_use]
    pub fn element_type(&self) -> ElementType {
        match self {
            Self::Int8(_) => ElementType::Int8,
            Self::UInt8(_) => ElementType::UInt8,
            Self::Int16(_) => ElementType::Int16,
            Self::UInt16(_) => ElementType::UInt16,
            Self::Int32(_) => ElementType::Int32,
            Self::UInt32(_) => ElementType::UInt32,
            Self::Int64(_) => ElementType::Int64,
            Self::UInt64(_) => ElementType::UInt64,
            Self::Float32(_) => ElementType::Float32,
            Self::Float64(_) => ElementType::Float64,
            Self::Id(_) => ElementType::Id,
            Self::Bit(_) => ElementType::Bit,
        }
    }

    /// Storage of `len` zero values of type `t`.
    #[must_use]
    pub fn zeros(t: ElementType, len: usize) -> Self {
        match t {
            ElementType::Int8 => Self::Int8(vec![0; len]),
            ElementType::UInt8 => Self::UInt8(vec![0; len]),
            ElementType::Int16 => Self::Int16(vec![0; len]),
            ElementType::UInt16 => Self::UInt16(vec![0; len]),
            ElementType::Int32 => Self::Int32(vec![0; len]),
            ElementType::UInt32 => Self::UInt32(vec![0; len]),
            ElementType::Int64 => Self::Int64(vec![0; len]),
            ElementType::UInt64 => Self::UInt64(vec![0; len]),
            ElementType::Float32 => Self::Float32(vec![0.0; len]),
            ElementType::Float64 => Self::Float64(vec![0.0; len]),
            ElementType::Id => Self::Id(vec![0; len]),
            ElementType::Bit => Self::Bit(BitBuffer::from_bools(&vec![false; len])),
        }
    }

    /// Total number of stored values.
    #[must_use]
    pub fn len(&self) -> usize {
        with_numeric!(self, v => v.len(), b => b.len())
    }

    /// Returns true if no values are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reads value `i` widened to `f64`.
    #[must_use]
    #[allow(clippy::cast_precision_loss, clippy::cast_lossless)]
    pub fn value_as_f64(&self, i: usize) -> Option<f64> {
        with_numeric!(
            self,
            v => v.get(i).map(|&x| x as f64),
            b => b.get(i).map(|x| if x { 1.0 } else { 0.0 })
        )
    }

    /// Raw bytes of the storage, for bitwise comparison.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        with_numeric!(self, v => bytemuck::cast_slice(v.as_slice()), b => bytemuck::cast_slice(b.words()))
    }
}
