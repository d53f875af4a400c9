//! Homogeneous multi-component numeric arrays.

use crate::element::{ArrayData, BitBuffer, ElementType};
use crate::error::{Result, TransformError};
use crate::id::ObjectId;

/// An ordered sequence of fixed-size tuples of a single element type.
///
/// The component and tuple counts are fixed at creation. Arrays are shared
/// through `Arc<TypedArray>`; a dataset or cache entry holding the last
/// reference owns it.
#[derive(Debug)]
pub struct TypedArray {
    id: ObjectId,
    name: Option<String>,
    num_components: usize,
    data: ArrayData,
    /// Offset carried along for CSG provenance.
    offset: Option<[f64; 3]>,
}

impl TypedArray {
    /// Creates an array from flat storage.
    ///
    /// Fails if `num_components` is zero or does not divide the value count.
    pub fn new(name: Option<String>, num_components: usize, data: ArrayData) -> Result<Self> {
        if num_components == 0 {
            return Err(TransformError::InvalidDataset(
                "array component count must be positive".to_string(),
            ));
        }
        if data.len() % num_components != 0 {
            return Err(TransformError::SizeMismatch {
                expected: data.len().div_ceil(num_components) * num_components,
                actual: data.len(),
            });
        }
        Ok(Self {
            id: ObjectId::next(),
            name,
            num_components,
            data,
            offset: None,
        })
    }

    /// Creates a named array, panicking on a bad component count.
    ///
    /// Intended for literals in tests and fixtures.
    ///
    /// # Panics
    ///
    /// Panics if `num_components` does not divide the value count.
    pub fn named(name: &str, num_components: usize, data: ArrayData) -> Self {
        Self::new(Some(name.to_string()), num_components, data)
            .expect("component count must divide value count")
    }

    /// Creates a single-component `float32` array.
    pub fn from_f32(name: &str, values: Vec<f32>) -> Self {
        Self::named(name, 1, ArrayData::Float32(values))
    }

    /// Creates a single-component `float64` array.
    pub fn from_f64(name: &str, values: Vec<f64>) -> Self {
        Self::named(name, 1, ArrayData::Float64(values))
    }

    /// Creates a single-component bit array.
    pub fn from_bits(name: &str, values: &[bool]) -> Self {
        Self::named(name, 1, ArrayData::Bit(BitBuffer::from_bools(values)))
    }

    /// Identity used for reverse cache lookups.
    #[must_use]
    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// Array name, if any.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Replaces the name.
    pub fn set_name(&mut self, name: Option<String>) {
        self.name = name;
    }

    /// Element type of the stored values.
    #[must_use]
    pub fn element_type(&self) -> ElementType {
        self.data.element_type()
    }

    /// Number of components per tuple.
    #[must_use]
    pub fn num_components(&self) -> usize {
        self.num_components
    }

    /// Number of tuples.
    #[must_use]
    pub fn num_tuples(&self) -> usize {
        self.data.len() / self.num_components
    }

    /// Total number of stored values (`tuples * components`).
    #[must_use]
    pub fn num_values(&self) -> usize {
        self.data.len()
    }

    /// Underlying storage.
    #[must_use]
    pub fn data(&self) -> &ArrayData {
        &self.data
    }

    /// CSG provenance offset, if set.
    #[must_use]
    pub fn offset(&self) -> Option<[f64; 3]> {
        self.offset
    }

    /// Sets the CSG provenance offset.
    pub fn set_offset(&mut self, offset: Option<[f64; 3]>) {
        self.offset = offset;
    }

    /// Reads one value widened to `f64`.
    #[must_use]
    pub fn value(&self, tuple: usize, component: usize) -> Option<f64> {
        if component >= self.num_components {
            return None;
        }
        self.data.value_as_f64(tuple * self.num_components + component)
    }

    /// Reads one tuple widened to `f64`.
    #[must_use]
    pub fn tuple(&self, tuple: usize) -> Option<Vec<f64>> {
        (0..self.num_components)
            .map(|c| self.value(tuple, c))
            .collect()
    }

    /// Builds a derived array that inherits this array's name and offset.
    ///
    /// The derived array always gets a fresh identity.
    pub fn derive(&self, num_components: usize, data: ArrayData) -> Result<Self> {
        let mut out = Self::new(self.name.clone(), num_components, data)?;
        out.offset = self.offset;
        Ok(out)
    }

    /// Extracts one component into a single-component array of the same
    /// element type.
    pub fn component(&self, component: usize) -> Result<Self> {
        fn pick<T: Copy>(values: &[T], start: usize, stride: usize) -> Vec<T> {
            values.iter().skip(start).step_by(stride).copied().collect()
        }

        let nc = self.num_components;
        if component >= nc {
            return Err(TransformError::IndexOutOfRange {
                index: component,
                len: nc,
            });
        }
        let data = match &self.data {
            ArrayData::Int8(v) => ArrayData::Int8(pick(v, component, nc)),
            ArrayData::UInt8(v) => ArrayData::UInt8(pick(v, component, nc)),
            ArrayData::Int16(v) => ArrayData::Int16(pick(v, component, nc)),
            ArrayData::UInt16(v) => ArrayData::UInt16(pick(v, component, nc)),
            ArrayData::Int32(v) => ArrayData::Int32(pick(v, component, nc)),
            ArrayData::UInt32(v) => ArrayData::UInt32(pick(v, component, nc)),
            ArrayData::Int64(v) => ArrayData::Int64(pick(v, component, nc)),
            ArrayData::UInt64(v) => ArrayData::UInt64(pick(v, component, nc)),
            ArrayData::Float32(v) => ArrayData::Float32(pick(v, component, nc)),
            ArrayData::Float64(v) => ArrayData::Float64(pick(v, component, nc)),
            ArrayData::Id(v) => ArrayData::Id(pick(v, component, nc)),
            ArrayData::Bit(bits) => {
                let picked: Vec<bool> = (component..bits.len())
                    .step_by(nc)
                    .filter_map(|i| bits.get(i))
                    .collect();
                ArrayData::Bit(BitBuffer::from_bools(&picked))
            }
        };
        self.derive(1, data)
    }

    /// Bitwise value comparison, ignoring identity and name.
    #[must_use]
    pub fn same_values(&self, other: &TypedArray) -> bool {
        self.num_components == other.num_components
            && self.element_type() == other.element_type()
            && self.data.as_bytes() == other.data.as_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape() {
        let arr = TypedArray::named("v", 3, ArrayData::Int32(vec![1, 2, 3, 4, 5, 6]));
        assert_eq!(arr.num_tuples(), 2);
        assert_eq!(arr.num_components(), 3);
        assert_eq!(arr.num_values(), 6);
        assert_eq!(arr.tuple(1), Some(vec![4.0, 5.0, 6.0]));
        assert_eq!(arr.value(0, 3), None);
    }

    #[test]
    fn test_bad_component_count() {
        let err = TypedArray::new(None, 2, ArrayData::Float32(vec![1.0, 2.0, 3.0]));
        assert!(matches!(err, Err(TransformError::SizeMismatch { .. })));
        assert!(matches!(
            TypedArray::new(None, 0, ArrayData::Float32(vec![])),
            Err(TransformError::InvalidDataset(_))
        ));
    }

    #[test]
    fn test_derive_keeps_name_and_offset() {
        let mut arr = TypedArray::from_f64("pressure", vec![1.0, 2.0]);
        arr.set_offset(Some([1.0, 2.0, 3.0]));
        let derived = arr.derive(1, ArrayData::Float32(vec![1.0, 2.0])).unwrap();
        assert_eq!(derived.name(), Some("pressure"));
        assert_eq!(derived.offset(), Some([1.0, 2.0, 3.0]));
        assert_ne!(derived.id(), arr.id());
    }

    #[test]
    fn test_same_values_is_bitwise() {
        let a = TypedArray::from_f64("a", vec![f64::NAN, 1.0]);
        let b = TypedArray::from_f64("b", vec![f64::NAN, 1.0]);
        assert!(a.same_values(&b));
        let c = TypedArray::from_f32("c", vec![f32::NAN, 1.0]);
        assert!(!a.same_values(&c));
    }

    #[test]
    fn test_component_extraction() {
        let arr = TypedArray::named("xyz", 3, ArrayData::Int16(vec![1, 2, 3, 4, 5, 6]));
        let y = arr.component(1).unwrap();
        assert_eq!(y.num_components(), 1);
        assert_eq!(y.data(), &ArrayData::Int16(vec![2, 5]));
        assert_eq!(y.name(), Some("xyz"));
        assert!(matches!(
            arr.component(3),
            Err(TransformError::IndexOutOfRange { index: 3, len: 3 })
        ));
    }
}
