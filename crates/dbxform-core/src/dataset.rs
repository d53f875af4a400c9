//! Mesh datasets: a structural part plus cell- and point-centered arrays.

use std::sync::Arc;

use glam::DVec3;

use crate::array::TypedArray;
use crate::csg::CsgMesh;
use crate::element::ArrayData;
use crate::error::{Result, TransformError};
use crate::id::ObjectId;

/// Arrays whose names start with this prefix belong to the pipeline itself.
pub const INTERNAL_ARRAY_PREFIX: &str = "__";

/// Cell array flagging ghost zones (`1`) synthesized by discretization.
pub const GHOST_ZONES_ARRAY: &str = "__ghost_zones";

/// Per-cell source zone of a discretized CSG mesh.
pub const ZONE_MAP_ARRAY: &str = "__csg_zone_map";

/// Kind of an explicit cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CellKind {
    Vertex,
    Line,
    PolyLine,
    Triangle,
    Quad,
    Polygon,
    TriangleStrip,
    Tetra,
    Hexahedron,
}

impl CellKind {
    /// Topological dimension of the cell.
    #[must_use]
    pub fn dimension(self) -> u8 {
        match self {
            Self::Vertex => 0,
            Self::Line | Self::PolyLine => 1,
            Self::Triangle | Self::Quad | Self::Polygon | Self::TriangleStrip => 2,
            Self::Tetra | Self::Hexahedron => 3,
        }
    }
}

/// Explicit cell connectivity in offsets + flat point-index form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellArray {
    kinds: Vec<CellKind>,
    offsets: Vec<usize>,
    connectivity: Vec<usize>,
}

impl Default for CellArray {
    fn default() -> Self {
        Self {
            kinds: Vec::new(),
            offsets: vec![0],
            connectivity: Vec::new(),
        }
    }
}

impl CellArray {
    /// Creates an empty cell array.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one cell.
    pub fn push(&mut self, kind: CellKind, points: &[usize]) {
        self.kinds.push(kind);
        self.connectivity.extend_from_slice(points);
        self.offsets.push(self.connectivity.len());
    }

    /// Number of cells.
    #[must_use]
    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    /// Returns true if there are no cells.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    /// Kind and point indices of cell `i`.
    #[must_use]
    pub fn cell(&self, i: usize) -> Option<(CellKind, &[usize])> {
        let kind = *self.kinds.get(i)?;
        Some((kind, &self.connectivity[self.offsets[i]..self.offsets[i + 1]]))
    }

    /// Iterates over `(kind, point indices)` for every cell.
    pub fn iter(&self) -> impl Iterator<Item = (CellKind, &[usize])> + '_ {
        (0..self.len()).filter_map(move |i| self.cell(i))
    }

    /// Total number of point references across all cells.
    #[must_use]
    pub fn connectivity_len(&self) -> usize {
        self.connectivity.len()
    }

    /// Legacy storage size: one count entry per cell plus every point reference.
    #[must_use]
    pub fn storage_size(&self) -> usize {
        self.connectivity.len() + self.kinds.len()
    }

    /// Flat point references.
    #[must_use]
    pub fn connectivity(&self) -> &[usize] {
        &self.connectivity
    }

    /// Rewrites every point reference through `map`.
    pub fn remap_points(&mut self, map: impl Fn(usize) -> usize) {
        for p in &mut self.connectivity {
            *p = map(*p);
        }
    }

    /// Returns true if any cell is a two-dimensional polygon or strip.
    #[must_use]
    pub fn has_surface_cells(&self) -> bool {
        self.kinds.iter().any(|k| k.dimension() == 2)
    }
}

/// Structural part of a dataset.
#[derive(Debug, Clone)]
pub enum MeshStructure {
    /// Explicit points with polygonal cells.
    PolyData {
        points: Arc<TypedArray>,
        cells: CellArray,
    },
    /// Explicit points with arbitrary cells.
    Unstructured {
        points: Arc<TypedArray>,
        cells: CellArray,
    },
    /// Curvilinear grid: explicit points, implicit hexahedral topology.
    Structured {
        dims: [usize; 3],
        points: Arc<TypedArray>,
    },
    /// Axis-aligned grid from three coordinate arrays.
    Rectilinear {
        dims: [usize; 3],
        x: Arc<TypedArray>,
        y: Arc<TypedArray>,
        z: Arc<TypedArray>,
    },
    /// Uniform voxel grid; carries no coordinate arrays.
    Image {
        dims: [usize; 3],
        origin: DVec3,
        spacing: DVec3,
    },
    /// Constructive-solid-geometry description.
    Csg(Arc<CsgMesh>),
}

fn implicit_cells(dims: [usize; 3]) -> usize {
    if dims.iter().any(|&d| d == 0) {
        return 0;
    }
    if dims.iter().all(|&d| d <= 1) {
        return 0;
    }
    dims.iter().map(|&d| (d.max(2)) - 1).product()
}

impl MeshStructure {
    /// Short type name for logs.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::PolyData { .. } => "PolyData",
            Self::Unstructured { .. } => "Unstructured",
            Self::Structured { .. } => "Structured",
            Self::Rectilinear { .. } => "Rectilinear",
            Self::Image { .. } => "Image",
            Self::Csg(_) => "Csg",
        }
    }

    /// Explicit point coordinates, for point-set structures.
    #[must_use]
    pub fn points(&self) -> Option<&Arc<TypedArray>> {
        match self {
            Self::PolyData { points, .. }
            | Self::Unstructured { points, .. }
            | Self::Structured { points, .. } => Some(points),
            _ => None,
        }
    }

    /// Explicit cells, for polydata and unstructured structures.
    #[must_use]
    pub fn cells(&self) -> Option<&CellArray> {
        match self {
            Self::PolyData { cells, .. } | Self::Unstructured { cells, .. } => Some(cells),
            _ => None,
        }
    }

    /// Number of points.
    #[must_use]
    pub fn num_points(&self) -> usize {
        match self {
            Self::PolyData { points, .. }
            | Self::Unstructured { points, .. }
            | Self::Structured { points, .. } => points.num_tuples(),
            Self::Rectilinear { dims, .. } | Self::Image { dims, .. } => dims.iter().product(),
            Self::Csg(_) => 0,
        }
    }

    /// Number of cells (zones for CSG).
    #[must_use]
    pub fn num_cells(&self) -> usize {
        match self {
            Self::PolyData { cells, .. } | Self::Unstructured { cells, .. } => cells.len(),
            Self::Structured { dims, .. }
            | Self::Rectilinear { dims, .. }
            | Self::Image { dims, .. } => implicit_cells(*dims),
            Self::Csg(mesh) => mesh.num_zones(),
        }
    }

    /// Logical dimensions of gridded structures.
    #[must_use]
    pub fn dims(&self) -> Option<[usize; 3]> {
        match self {
            Self::Structured { dims, .. }
            | Self::Rectilinear { dims, .. }
            | Self::Image { dims, .. } => Some(*dims),
            _ => None,
        }
    }

    /// Value comparison of two structures; arrays are compared bitwise.
    #[must_use]
    pub fn structurally_equal(&self, other: &MeshStructure) -> bool {
        match (self, other) {
            (
                Self::PolyData { points: p1, cells: c1 },
                Self::PolyData { points: p2, cells: c2 },
            )
            | (
                Self::Unstructured { points: p1, cells: c1 },
                Self::Unstructured { points: p2, cells: c2 },
            ) => c1 == c2 && p1.same_values(p2),
            (
                Self::Structured { dims: d1, points: p1 },
                Self::Structured { dims: d2, points: p2 },
            ) => d1 == d2 && p1.same_values(p2),
            (
                Self::Rectilinear { dims: d1, x: x1, y: y1, z: z1 },
                Self::Rectilinear { dims: d2, x: x2, y: y2, z: z2 },
            ) => d1 == d2 && x1.same_values(x2) && y1.same_values(y2) && z1.same_values(z2),
            (
                Self::Image { dims: d1, origin: o1, spacing: s1 },
                Self::Image { dims: d2, origin: o2, spacing: s2 },
            ) => d1 == d2 && o1 == o2 && s1 == s2,
            (Self::Csg(a), Self::Csg(b)) => Arc::ptr_eq(a, b) || a == b,
            _ => false,
        }
    }
}

/// Distinguished role an array may hold within its [`FieldData`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeRole {
    Scalars,
    Vectors,
    Tensors,
}

impl AttributeRole {
    const ALL: [AttributeRole; 3] = [Self::Scalars, Self::Vectors, Self::Tensors];

    fn slot(self) -> usize {
        match self {
            Self::Scalars => 0,
            Self::Vectors => 1,
            Self::Tensors => 2,
        }
    }
}

/// Named arrays attached to the cells or points of a dataset.
///
/// At most one array holds each [`AttributeRole`]; roles are tracked by
/// array name.
#[derive(Debug, Clone, Default)]
pub struct FieldData {
    arrays: Vec<Arc<TypedArray>>,
    roles: [Option<String>; 3],
}

impl FieldData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an array, replacing any array with the same name.
    pub fn add(&mut self, array: Arc<TypedArray>) {
        match self
            .arrays
            .iter()
            .position(|a| a.name().is_some() && a.name() == array.name())
        {
            Some(i) => self.arrays[i] = array,
            None => self.arrays.push(array),
        }
    }

    /// Adds an array and gives it `role`.
    pub fn add_with_role(&mut self, array: Arc<TypedArray>, role: AttributeRole) {
        let name = array.name().map(str::to_string);
        self.add(array);
        self.roles[role.slot()] = name;
    }

    /// Looks up an array by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<TypedArray>> {
        self.arrays.iter().find(|a| a.name() == Some(name))
    }

    /// Removes an array by name, clearing any role it held.
    pub fn remove(&mut self, name: &str) -> Option<Arc<TypedArray>> {
        let i = self.arrays.iter().position(|a| a.name() == Some(name))?;
        for slot in &mut self.roles {
            if slot.as_deref() == Some(name) {
                *slot = None;
            }
        }
        Some(self.arrays.remove(i))
    }

    /// Role held by the named array, if any.
    #[must_use]
    pub fn role_of(&self, name: &str) -> Option<AttributeRole> {
        AttributeRole::ALL
            .into_iter()
            .find(|r| self.roles[r.slot()].as_deref() == Some(name))
    }

    /// Array holding `role`, if any.
    #[must_use]
    pub fn with_role(&self, role: AttributeRole) -> Option<&Arc<TypedArray>> {
        self.roles[role.slot()]
            .as_deref()
            .and_then(|name| self.get(name))
    }

    /// The array holding the scalars role.
    #[must_use]
    pub fn scalars(&self) -> Option<&Arc<TypedArray>> {
        self.with_role(AttributeRole::Scalars)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<TypedArray>> {
        self.arrays.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.arrays.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.arrays.is_empty()
    }
}

/// A mesh plus its field arrays.
///
/// `Clone` keeps the identity: it is what `Arc::make_mut` uses for in-place
/// edits. Use [`Dataset::shallow_copy`] for a distinct object.
#[derive(Debug, Clone)]
pub struct Dataset {
    id: ObjectId,
    structure: MeshStructure,
    cell_data: FieldData,
    point_data: FieldData,
}

impl Dataset {
    /// Creates a dataset with no field arrays.
    pub fn new(structure: MeshStructure) -> Self {
        Self {
            id: ObjectId::next(),
            structure,
            cell_data: FieldData::new(),
            point_data: FieldData::new(),
        }
    }

    /// An unstructured grid with no points and no cells.
    pub fn empty_unstructured() -> Self {
        let points = TypedArray::named("points", 3, ArrayData::Float32(Vec::new()));
        Self::new(MeshStructure::Unstructured {
            points: Arc::new(points),
            cells: CellArray::new(),
        })
    }

    #[must_use]
    pub fn id(&self) -> ObjectId {
        self.id
    }

    #[must_use]
    pub fn structure(&self) -> &MeshStructure {
        &self.structure
    }

    pub fn structure_mut(&mut self) -> &mut MeshStructure {
        &mut self.structure
    }

    #[must_use]
    pub fn cell_data(&self) -> &FieldData {
        &self.cell_data
    }

    pub fn cell_data_mut(&mut self) -> &mut FieldData {
        &mut self.cell_data
    }

    #[must_use]
    pub fn point_data(&self) -> &FieldData {
        &self.point_data
    }

    pub fn point_data_mut(&mut self) -> &mut FieldData {
        &mut self.point_data
    }

    #[must_use]
    pub fn num_points(&self) -> usize {
        self.structure.num_points()
    }

    #[must_use]
    pub fn num_cells(&self) -> usize {
        self.structure.num_cells()
    }

    /// Same structure and arrays under a new identity.
    #[must_use]
    pub fn shallow_copy(&self) -> Self {
        Self {
            id: ObjectId::next(),
            ..self.clone()
        }
    }

    /// Same structure, no field arrays, new identity.
    #[must_use]
    pub fn copy_structure(&self) -> Self {
        Self::new(self.structure.clone())
    }

    /// New identity with a replaced structure and the same field arrays.
    #[must_use]
    pub fn with_structure(&self, structure: MeshStructure) -> Self {
        Self {
            id: ObjectId::next(),
            structure,
            cell_data: self.cell_data.clone(),
            point_data: self.point_data.clone(),
        }
    }

    /// Checks that every cell array has one tuple per cell and every point
    /// array one tuple per point.
    pub fn validate(&self) -> Result<()> {
        let cells = self.num_cells();
        for array in self.cell_data.iter() {
            if array.num_tuples() != cells {
                return Err(TransformError::SizeMismatch {
                    expected: cells,
                    actual: array.num_tuples(),
                });
            }
        }
        let points = self.num_points();
        for array in self.point_data.iter() {
            if array.num_tuples() != points {
                return Err(TransformError::SizeMismatch {
                    expected: points,
                    actual: array.num_tuples(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle() -> Dataset {
        let points = TypedArray::named(
            "points",
            3,
            ArrayData::Float64(vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0]),
        );
        let mut cells = CellArray::new();
        cells.push(CellKind::Triangle, &[0, 1, 2]);
        Dataset::new(MeshStructure::PolyData {
            points: Arc::new(points),
            cells,
        })
    }

    #[test]
    fn test_cell_array() {
        let mut cells = CellArray::new();
        cells.push(CellKind::Line, &[0, 1]);
        cells.push(CellKind::Quad, &[1, 2, 3, 4]);
        assert_eq!(cells.len(), 2);
        assert_eq!(cells.cell(1), Some((CellKind::Quad, &[1, 2, 3, 4][..])));
        assert_eq!(cells.connectivity_len(), 6);
        assert_eq!(cells.storage_size(), 8);
        assert!(cells.has_surface_cells());
        cells.remap_points(|p| p + 10);
        assert_eq!(cells.cell(0), Some((CellKind::Line, &[10, 11][..])));
    }

    #[test]
    fn test_implicit_cell_counts() {
        assert_eq!(implicit_cells([4, 1, 1]), 3);
        assert_eq!(implicit_cells([3, 3, 3]), 8);
        assert_eq!(implicit_cells([1, 1, 1]), 0);
        assert_eq!(implicit_cells([0, 5, 5]), 0);
    }

    #[test]
    fn test_roles_follow_names() {
        let mut fd = FieldData::new();
        fd.add_with_role(Arc::new(TypedArray::from_f32("t", vec![1.0])), AttributeRole::Scalars);
        fd.add(Arc::new(TypedArray::from_f32("u", vec![2.0])));
        assert_eq!(fd.role_of("t"), Some(AttributeRole::Scalars));
        assert_eq!(fd.role_of("u"), None);
        assert_eq!(fd.scalars().and_then(|a| a.name()), Some("t"));

        // Replacing by name keeps the role.
        fd.add(Arc::new(TypedArray::from_f64("t", vec![1.0])));
        assert_eq!(fd.len(), 2);
        assert_eq!(fd.scalars().map(|a| a.element_type()), Some(crate::ElementType::Float64));

        fd.remove("t");
        assert!(fd.scalars().is_none());
    }

    #[test]
    fn test_copies_get_new_ids() {
        let ds = triangle();
        assert_ne!(ds.shallow_copy().id(), ds.id());
        assert_ne!(ds.copy_structure().id(), ds.id());
        assert_eq!(ds.clone().id(), ds.id());
        assert!(ds.structure().structurally_equal(ds.shallow_copy().structure()));
    }

    #[test]
    fn test_validate() {
        let mut ds = triangle();
        ds.cell_data_mut()
            .add(Arc::new(TypedArray::from_f32("c", vec![1.0])));
        ds.point_data_mut()
            .add(Arc::new(TypedArray::from_f32("p", vec![1.0, 2.0, 3.0])));
        assert!(ds.validate().is_ok());
        ds.cell_data_mut()
            .add(Arc::new(TypedArray::from_f32("bad", vec![1.0, 2.0])));
        assert!(matches!(
            ds.validate(),
            Err(TransformError::SizeMismatch { expected: 1, actual: 2 })
        ));
    }
}
