//! Element-type conversion of arrays and of dataset coordinates.
//!
//! Every function returns `Ok(None)` when nothing needed converting; a
//! `Some` result is always a new object with a fresh identity.

use std::sync::Arc;

use crate::array::TypedArray;
use crate::dataset::{Dataset, MeshStructure};
use crate::element::{ArrayData, ElementType};
use crate::error::{Result, TransformError};

/// Converts an array to `target`, which must be `Float32` or `Float64`.
///
/// Returns `Ok(None)` if the array already has the target type. Bit-packed
/// arrays have no conversion path in either direction.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_lossless
)]
pub fn convert_array(array: &TypedArray, target: ElementType) -> Result<Option<TypedArray>> {
    if array.element_type() == target {
        return Ok(None);
    }
    let data = match target {
        ElementType::Float32 => crate::with_numeric!(
            array.data(),
            v => ArrayData::Float32(v.iter().map(|&x| x as f32).collect()),
            _b => return Err(TransformError::UnsupportedElementType(ElementType::Bit))
        ),
        ElementType::Float64 => crate::with_numeric!(
            array.data(),
            v => ArrayData::Float64(v.iter().map(|&x| x as f64).collect()),
            _b => return Err(TransformError::UnsupportedElementType(ElementType::Bit))
        ),
        other => return Err(TransformError::UnsupportedElementType(other)),
    };
    array.derive(array.num_components(), data).map(Some)
}

/// Converts an array to `float32`.
pub fn convert_to_float(array: &TypedArray) -> Result<Option<TypedArray>> {
    convert_array(array, ElementType::Float32)
}

/// Converts an array to `float64`.
pub fn convert_to_double(array: &TypedArray) -> Result<Option<TypedArray>> {
    convert_array(array, ElementType::Float64)
}

/// Converts the coordinate arrays of a dataset to `float32` or `float64`.
///
/// Point-set structures convert their single point array. Rectilinear grids
/// convert all three axes or nothing. Image and CSG structures carry no
/// coordinate arrays and always yield `Ok(None)`. Field arrays are carried
/// over by reference.
pub fn convert_dataset(dataset: &Dataset, to_float: bool) -> Result<Option<Dataset>> {
    let target = if to_float {
        ElementType::Float32
    } else {
        ElementType::Float64
    };
    let structure = match dataset.structure() {
        MeshStructure::PolyData { points, cells } => {
            convert_array(points, target)?.map(|p| MeshStructure::PolyData {
                points: Arc::new(p),
                cells: cells.clone(),
            })
        }
        MeshStructure::Unstructured { points, cells } => {
            convert_array(points, target)?.map(|p| MeshStructure::Unstructured {
                points: Arc::new(p),
                cells: cells.clone(),
            })
        }
        MeshStructure::Structured { dims, points } => {
            convert_array(points, target)?.map(|p| MeshStructure::Structured {
                dims: *dims,
                points: Arc::new(p),
            })
        }
        MeshStructure::Rectilinear { dims, x, y, z } => {
            match (
                convert_array(x, target)?,
                convert_array(y, target)?,
                convert_array(z, target)?,
            ) {
                (Some(x), Some(y), Some(z)) => Some(MeshStructure::Rectilinear {
                    dims: *dims,
                    x: Arc::new(x),
                    y: Arc::new(y),
                    z: Arc::new(z),
                }),
                _ => None,
            }
        }
        MeshStructure::Image { .. } | MeshStructure::Csg(_) => None,
    };
    Ok(structure.map(|s| dataset.with_structure(s)))
}
