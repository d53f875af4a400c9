//! Gathering array tuples through an index list.

use crate::array::TypedArray;
use crate::element::{ArrayData, BitBuffer};
use crate::error::{Result, TransformError};

fn gather<T: Copy>(values: &[T], components: usize, indices: &[usize]) -> Result<Vec<T>> {
    let tuples = values.len() / components;
    let mut out = Vec::with_capacity(indices.len() * components);
    for &i in indices {
        if i >= tuples {
            return Err(TransformError::IndexOutOfRange {
                index: i,
                len: tuples,
            });
        }
        out.extend_from_slice(&values[i * components..(i + 1) * components]);
    }
    Ok(out)
}

fn gather_bits(bits: &BitBuffer, components: usize, indices: &[usize]) -> Result<BitBuffer> {
    let tuples = bits.len() / components;
    let mut out = Vec::with_capacity(indices.len() * components);
    for &i in indices {
        if i >= tuples {
            return Err(TransformError::IndexOutOfRange {
                index: i,
                len: tuples,
            });
        }
        out.extend((i * components..(i + 1) * components).filter_map(|j| bits.get(j)));
    }
    Ok(BitBuffer::from_bools(&out))
}

/// Builds a new array whose tuple `i` is tuple `indices[i]` of `source`.
///
/// The result has exactly `indices.len()` tuples and the source's element
/// type, component count, name and offset. Any index past the end of the
/// source fails with [`TransformError::IndexOutOfRange`].
pub fn remap_array(source: &TypedArray, indices: &[usize]) -> Result<TypedArray> {
    let c = source.num_components();
    let data = match source.data() {
        ArrayData::Int8(v) => ArrayData::Int8(gather(v, c, indices)?),
        ArrayData::UInt8(v) => ArrayData::UInt8(gather(v, c, indices)?),
        ArrayData::Int16(v) => ArrayData::Int16(gather(v, c, indices)?),
        ArrayData::UInt16(v) => ArrayData::UInt16(gather(v, c, indices)?),
        ArrayData::Int32(v) => ArrayData::Int32(gather(v, c, indices)?),
        ArrayData::UInt32(v) => ArrayData::UInt32(gather(v, c, indices)?),
        ArrayData::Int64(v) => ArrayData::Int64(gather(v, c, indices)?),
        ArrayData::UInt64(v) => ArrayData::UInt64(gather(v, c, indices)?),
        ArrayData::Float32(v) => ArrayData::Float32(gather(v, c, indices)?),
        ArrayData::Float64(v) => ArrayData::Float64(gather(v, c, indices)?),
        ArrayData::Id(v) => ArrayData::Id(gather(v, c, indices)?),
        ArrayData::Bit(b) => ArrayData::Bit(gather_bits(b, c, indices)?),
    };
    source.derive(c, data)
}
