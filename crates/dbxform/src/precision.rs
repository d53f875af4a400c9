//! Decides which coordinate and field arrays need an element-type change.

use dbxform_core::{
    DataRequest, Dataset, DatabaseMetadata, ElementType, EnumKind, MeshStructure, PipelineConfig,
    PrecisionMode, TypedArray, VarKind, INTERNAL_ARRAY_PREFIX,
};

const FLOAT_WIDTH: usize = 4;
const DOUBLE_WIDTH: usize = 8;

/// Element type of a dataset's coordinates, if it has coordinate arrays.
///
/// Rectilinear grids report their X axis.
#[must_use]
pub fn coordinate_type(dataset: &Dataset) -> Option<ElementType> {
    match dataset.structure() {
        MeshStructure::Rectilinear { x, .. } => Some(x.element_type()),
        structure => structure.points().map(|p| p.element_type()),
    }
}

/// Precision decisions for one request under one pipeline configuration.
#[derive(Debug, Clone, Copy)]
pub struct PrecisionPolicy<'a> {
    mode: PrecisionMode,
    request: &'a DataRequest,
    metadata: &'a DatabaseMetadata,
}

impl<'a> PrecisionPolicy<'a> {
    pub fn new(
        config: &PipelineConfig,
        request: &'a DataRequest,
        metadata: &'a DatabaseMetadata,
    ) -> Self {
        Self {
            mode: config.precision,
            request,
            metadata,
        }
    }

    fn excess(&self, t: ElementType, needs_native: bool) -> bool {
        !needs_native
            && self.mode != PrecisionMode::Native
            && self.mode != PrecisionMode::Double
            && t.byte_width() > FLOAT_WIDTH
    }

    fn insufficient(&self, t: ElementType, needs_native: bool) -> bool {
        self.request
            .admissible_types
            .allows(ElementType::Float64)
            && !needs_native
            && self.mode != PrecisionMode::Native
            && self.mode != PrecisionMode::Float
            && t.byte_width() < DOUBLE_WIDTH
    }

    /// Whether the coordinates are candidates for demotion to `float32`.
    #[must_use]
    pub fn coordinates_have_excess_precision(&self, dataset: &Dataset, needs_native: bool) -> bool {
        coordinate_type(dataset).is_some_and(|t| self.excess(t, needs_native))
    }

    /// Whether the coordinates are candidates for promotion to `float64`.
    #[must_use]
    pub fn coordinates_have_insufficient_precision(
        &self,
        dataset: &Dataset,
        needs_native: bool,
    ) -> bool {
        coordinate_type(dataset).is_some_and(|t| self.insufficient(t, needs_native))
    }

    /// Whether a field array is a candidate for demotion to `float32`.
    #[must_use]
    pub fn data_has_excess_precision(&self, array: &TypedArray, needs_native: bool) -> bool {
        self.excess(array.element_type(), needs_native)
    }

    /// Whether a field array is a candidate for promotion to `float64`.
    ///
    /// Material and species fractions are never promoted.
    #[must_use]
    pub fn data_has_insufficient_precision(&self, array: &TypedArray, needs_native: bool) -> bool {
        let fractions = array.name().is_some_and(|name| {
            matches!(
                self.metadata.var_kind(name),
                VarKind::Material | VarKind::Species
            )
        });
        !fractions && self.insufficient(array.element_type(), needs_native)
    }

    /// Arrays owned by the pipeline itself, and bit-packed bitmask
    /// enumerations, take no part in precision decisions.
    #[must_use]
    pub fn is_ignored(&self, array: &TypedArray) -> bool {
        let Some(name) = array.name() else {
            return false;
        };
        name.starts_with(INTERNAL_ARRAY_PREFIX)
            || (array.element_type() == ElementType::Bit
                && self.metadata.enum_kind(name) == EnumKind::ByBitmask)
    }

    /// Whether the downstream pipeline cannot consume `t` at all.
    #[must_use]
    pub fn is_disallowed(&self, t: ElementType) -> bool {
        !self.request.admissible_types.allows(t)
    }

    /// Replacement type for a disallowed one: `float32` when admissible,
    /// else `float64`, else nothing.
    #[must_use]
    pub fn disallowed_target(&self) -> Option<ElementType> {
        [ElementType::Float32, ElementType::Float64]
            .into_iter()
            .find(|&t| self.request.admissible_types.allows(t))
    }

    fn target(&self, current: ElementType, excess: bool, insufficient: bool) -> Option<ElementType> {
        let target = if self.is_disallowed(current) {
            self.disallowed_target()
        } else if excess {
            Some(ElementType::Float32)
        } else if insufficient {
            Some(ElementType::Float64)
        } else {
            None
        };
        target.filter(|&t| t != current)
    }

    /// Element type the coordinates should be converted to, if any.
    #[must_use]
    pub fn coordinate_target(&self, dataset: &Dataset) -> Option<ElementType> {
        let current = coordinate_type(dataset)?;
        let needs_native = self.request.needs_native_precision;
        self.target(
            current,
            self.coordinates_have_excess_precision(dataset, needs_native),
            self.coordinates_have_insufficient_precision(dataset, needs_native),
        )
    }

    /// Element type a field array should be converted to, if any.
    #[must_use]
    pub fn data_target(&self, array: &TypedArray) -> Option<ElementType> {
        if self.is_ignored(array) {
            return None;
        }
        let needs_native = self.request.needs_native_precision;
        self.target(
            array.element_type(),
            self.data_has_excess_precision(array, needs_native),
            self.data_has_insufficient_precision(array, needs_native),
        )
    }
}
