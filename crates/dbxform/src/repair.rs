//! Repairs applied to datasets before precision conversion: vertex cells
//! for bare point sets, rectilinear repacking of curves, and merging of
//! coincident nodes.

use std::cmp::Ordering;
use std::sync::Arc;

use dbxform_core::{
    remap_array, ArrayData, AttributeRole, CacheKey, CellArray, CellKind, Dataset,
    DatabaseMetadata, FieldData, MeshStructure, ObjectId, Result, TransformError, TypedArray,
};

fn not_in_cache(what: &str, id: ObjectId) -> TransformError {
    TransformError::NotInCache(format!("{what} {id}"))
}

/// Gives a point set with no cells one vertex cell per point, in place.
///
/// The owning mesh is reclassified as a point mesh in `metadata`. Returns
/// whether the dataset changed. The cache key is only resolved once the
/// dataset is known to need the repair.
pub fn add_vertex_cells_to_points_only_dataset(
    dataset: &mut Arc<Dataset>,
    metadata: &mut DatabaseMetadata,
    resolve: &dyn Fn(ObjectId) -> Option<CacheKey>,
) -> Result<bool> {
    let points_only = matches!(
        dataset.structure(),
        MeshStructure::PolyData { .. } | MeshStructure::Unstructured { .. }
    ) && dataset.num_points() > 0
        && dataset.num_cells() == 0;
    if !points_only {
        return Ok(false);
    }
    let key = resolve(dataset.id()).ok_or_else(|| not_in_cache("dataset", dataset.id()))?;

    let n = dataset.num_points();
    if let MeshStructure::PolyData { cells, .. } | MeshStructure::Unstructured { cells, .. } =
        Arc::make_mut(dataset).structure_mut()
    {
        for i in 0..n {
            cells.push(CellKind::Vertex, &[i]);
        }
    }
    if let Some(mesh) = metadata.mesh_name_for_var(&key.var).map(str::to_string) {
        metadata.set_point_mesh(&mesh);
    }
    log::debug!("added {n} vertex cells to points-only dataset {}", key.var);
    Ok(true)
}

/// Cheap structural test for a dataset that could be a sampled curve.
fn looks_like_curve(dataset: &Dataset) -> bool {
    match dataset.structure() {
        MeshStructure::PolyData { cells, .. } | MeshStructure::Unstructured { cells, .. } => {
            let points = dataset.num_points();
            if points < 2 || cells.has_surface_cells() {
                return false;
            }
            let single_polyline = cells.len() == 1
                && cells
                    .cell(0)
                    .is_some_and(|(kind, ids)| kind == CellKind::PolyLine && ids.len() == points);
            cells.len() + 1 == points || single_polyline
        }
        MeshStructure::Structured { dims, .. } => {
            dims.iter().filter(|&&d| d > 1).count() == 1
        }
        MeshStructure::Rectilinear { .. } | MeshStructure::Image { .. } | MeshStructure::Csg(_) => {
            false
        }
    }
}

/// Repacks a one-dimensional dataset that serves a declared curve into a
/// rectilinear grid of dimensions `(n, 1, 1)`.
///
/// The dataset matches a curve when the key of its point scalars (or of the
/// dataset itself) names either the curve or its source variable.
/// X comes from the first coordinate of each point. Y comes from the point
/// scalars if present, otherwise from the second coordinate. The result
/// carries Y as a point scalar named after the curve. Returns `Ok(None)`
/// when the dataset is not a curve.
pub fn convert_curves_to_rect_grids(
    dataset: &Dataset,
    metadata: &DatabaseMetadata,
    resolve: &dyn Fn(ObjectId) -> Option<CacheKey>,
) -> Result<Option<Dataset>> {
    if metadata.curves().is_empty() || !looks_like_curve(dataset) {
        return Ok(None);
    }
    let Some(points) = dataset.structure().points() else {
        return Ok(None);
    };
    let n = points.num_tuples();
    let scalars = dataset
        .point_data()
        .scalars()
        .filter(|s| s.num_tuples() == n);

    let id = scalars.map_or(dataset.id(), |s| s.id());
    let key = resolve(id).ok_or_else(|| not_in_cache("curve source", id))?;
    let Some(curve) = metadata
        .curves()
        .iter()
        .find(|c| c.name == key.var || c.source_var.as_deref() == Some(key.var.as_str()))
    else {
        return Ok(None);
    };

    let x = points.component(0)?;
    let mut y = match scalars {
        Some(s) => s.component(0)?,
        None => points.component(1)?,
    };
    y.set_name(Some(curve.name.clone()));
    let flat = TypedArray::new(None, 1, ArrayData::zeros(x.element_type(), 1))?;
    let flat = Arc::new(flat);

    let mut out = Dataset::new(MeshStructure::Rectilinear {
        dims: [n, 1, 1],
        x: Arc::new(x),
        y: Arc::clone(&flat),
        z: flat,
    });
    out.point_data_mut()
        .add_with_role(Arc::new(y), AttributeRole::Scalars);
    log::debug!("repacked curve {} as a {n}-point rectilinear grid", curve.name);
    Ok(Some(out))
}

fn coordinate_key(points: &TypedArray, i: usize) -> [f64; 3] {
    // -0.0 and 0.0 are the same node.
    let c = |k: usize| {
        let v = points.value(i, k).unwrap_or(0.0);
        if v == 0.0 {
            0.0
        } else {
            v
        }
    };
    [c(0), c(1), c(2)]
}

fn cmp_keys(a: &[f64; 3], b: &[f64; 3]) -> Ordering {
    a[0].total_cmp(&b[0])
        .then(a[1].total_cmp(&b[1]))
        .then(a[2].total_cmp(&b[2]))
}

/// Merges coincident points of an unstructured grid.
///
/// Only grids whose connectivity list is shorter than their point array
/// qualify, that is `storage_size - cells < points`. A fully disconnected
/// grid whose cells reference every point exactly once has a connectivity
/// list as long as its point array and is left alone; merging needs
/// unreferenced points on top of the duplicates. Points compare by exact coordinate equality; the compacted
/// point array is ordered by X, then Y, then Z and keeps only referenced
/// points. Point arrays follow their points; cell arrays are untouched.
/// Returns `Ok(None)` when the grid does not qualify.
pub fn remove_duplicate_nodes(dataset: &Dataset) -> Result<Option<Dataset>> {
    let MeshStructure::Unstructured { points, cells } = dataset.structure() else {
        return Ok(None);
    };
    let count = points.num_tuples();
    if count == 0 || cells.storage_size() - cells.len() >= count {
        return Ok(None);
    }

    let mut referenced: Vec<usize> = cells.connectivity().to_vec();
    referenced.sort_unstable();
    referenced.dedup();
    if let Some(&bad) = referenced.last().filter(|&&p| p >= count) {
        return Err(TransformError::IndexOutOfRange {
            index: bad,
            len: count,
        });
    }
    let keys: Vec<[f64; 3]> = (0..count).map(|i| coordinate_key(points, i)).collect();
    referenced.sort_by(|&a, &b| cmp_keys(&keys[a], &keys[b]).then(a.cmp(&b)));

    let mut map = vec![usize::MAX; count];
    let mut representatives: Vec<usize> = Vec::new();
    for &old in &referenced {
        let same = representatives
            .last()
            .is_some_and(|&r| cmp_keys(&keys[r], &keys[old]) == Ordering::Equal);
        if !same {
            representatives.push(old);
        }
        map[old] = representatives.len() - 1;
    }

    let mut merged: CellArray = cells.clone();
    merged.remap_points(|p| map[p]);
    let compacted = remap_array(points, &representatives)?;
    let mut out = dataset.with_structure(MeshStructure::Unstructured {
        points: Arc::new(compacted),
        cells: merged,
    });
    *out.point_data_mut() = FieldData::new();
    for array in dataset.point_data().iter() {
        let remapped = Arc::new(remap_array(array, &representatives)?);
        match array
            .name()
            .and_then(|name| dataset.point_data().role_of(name))
        {
            Some(role) => out.point_data_mut().add_with_role(remapped, role),
            None => out.point_data_mut().add(remapped),
        }
    }
    log::debug!(
        "merged {count} points into {} unique nodes",
        representatives.len()
    );
    Ok(Some(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbxform_core::{kinds, MeshMetadata, MeshType, ALL_MATERIALS};

    fn key(var: &str) -> CacheKey {
        CacheKey::new(var, kinds::DATASET, 0, 0, ALL_MATERIALS)
    }

    fn points(coords: Vec<f32>) -> Arc<TypedArray> {
        Arc::new(TypedArray::named("points", 3, ArrayData::Float32(coords)))
    }

    fn unresolved(_: ObjectId) -> Option<CacheKey> {
        None
    }

    #[test]
    fn test_vertex_cells_for_bare_points() {
        let mut ds = Arc::new(Dataset::new(MeshStructure::Unstructured {
            points: points(vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 2.0, 0.0, 0.0]),
            cells: CellArray::new(),
        }));
        let id = ds.id();
        let mut md = DatabaseMetadata::new();
        md.add_mesh(MeshMetadata::new("cloud", MeshType::Unstructured, 3))
            .add_var("mass", "cloud", dbxform_core::VarKind::Scalar);

        let resolve = |_: ObjectId| Some(key("mass"));
        assert!(add_vertex_cells_to_points_only_dataset(&mut ds, &mut md, &resolve).unwrap());
        assert_eq!(ds.id(), id);
        assert_eq!(ds.num_cells(), 3);
        let cells = ds.structure().cells().unwrap();
        assert_eq!(cells.cell(2), Some((CellKind::Vertex, &[2_usize][..])));
        let mesh = md.mesh("cloud").unwrap();
        assert_eq!(mesh.mesh_type, MeshType::PointMesh);
        assert_eq!(mesh.topological_dimension, 0);
    }

    #[test]
    fn test_vertex_cells_skip_meshes_with_cells() {
        let mut cells = CellArray::new();
        cells.push(CellKind::Vertex, &[0]);
        let mut ds = Arc::new(Dataset::new(MeshStructure::PolyData {
            points: points(vec![0.0, 0.0, 0.0]),
            cells,
        }));
        let mut md = DatabaseMetadata::new();
        // No key lookup happens, so an unresolvable dataset is fine.
        assert!(!add_vertex_cells_to_points_only_dataset(&mut ds, &mut md, &unresolved).unwrap());

        let mut empty = Arc::new(Dataset::empty_unstructured());
        assert!(!add_vertex_cells_to_points_only_dataset(&mut empty, &mut md, &unresolved).unwrap());
    }

    #[test]
    fn test_vertex_cells_not_in_cache() {
        let mut ds = Arc::new(Dataset::new(MeshStructure::Unstructured {
            points: points(vec![0.0, 0.0, 0.0]),
            cells: CellArray::new(),
        }));
        let mut md = DatabaseMetadata::new();
        let err = add_vertex_cells_to_points_only_dataset(&mut ds, &mut md, &unresolved);
        assert!(err.unwrap_err().is_not_in_cache());
        assert_eq!(ds.num_cells(), 0);
    }

    fn polyline(n: usize) -> Dataset {
        let coords: Vec<f32> = (0..n)
            .flat_map(|i| [i as f32, (i * i) as f32, 0.0])
            .collect();
        let mut cells = CellArray::new();
        let ids: Vec<usize> = (0..n).collect();
        cells.push(CellKind::PolyLine, &ids);
        Dataset::new(MeshStructure::PolyData {
            points: points(coords),
            cells,
        })
    }

    fn curve_metadata() -> DatabaseMetadata {
        let mut md = DatabaseMetadata::new();
        md.add_curve("energy", Some("e"));
        md
    }

    #[test]
    fn test_curve_from_coordinates() {
        let ds = polyline(4);
        let resolve = |_: ObjectId| Some(key("energy"));
        let out = convert_curves_to_rect_grids(&ds, &curve_metadata(), &resolve)
            .unwrap()
            .unwrap();
        let MeshStructure::Rectilinear { dims, x, y, z } = out.structure() else {
            panic!("expected a rectilinear grid");
        };
        assert_eq!(*dims, [4, 1, 1]);
        assert_eq!(x.data(), &ArrayData::Float32(vec![0.0, 1.0, 2.0, 3.0]));
        assert_eq!(y.data(), &ArrayData::Float32(vec![0.0]));
        assert_eq!(z.num_tuples(), 1);
        let scalars = out.point_data().scalars().unwrap();
        assert_eq!(scalars.name(), Some("energy"));
        assert_eq!(scalars.data(), &ArrayData::Float32(vec![0.0, 1.0, 4.0, 9.0]));
        assert!(out.validate().is_ok());
    }

    #[test]
    fn test_curve_prefers_point_scalars() {
        let mut ds = polyline(3);
        let values = Arc::new(TypedArray::from_f64("e", vec![5.0, 6.0, 7.0]));
        let scalars_id = values.id();
        ds.point_data_mut()
            .add_with_role(values, AttributeRole::Scalars);
        let resolve = move |id: ObjectId| (id == scalars_id).then(|| key("energy"));
        let out = convert_curves_to_rect_grids(&ds, &curve_metadata(), &resolve)
            .unwrap()
            .unwrap();
        let scalars = out.point_data().scalars().unwrap();
        assert_eq!(scalars.data(), &ArrayData::Float64(vec![5.0, 6.0, 7.0]));
        assert_eq!(scalars.name(), Some("energy"));
    }

    #[test]
    fn test_curve_matched_by_source_variable() {
        let mut ds = polyline(3);
        let values = Arc::new(TypedArray::from_f32("e", vec![1.0, 2.0, 3.0]));
        ds.point_data_mut()
            .add_with_role(values, AttributeRole::Scalars);
        let resolve = |_: ObjectId| Some(key("e"));
        let out = convert_curves_to_rect_grids(&ds, &curve_metadata(), &resolve)
            .unwrap()
            .unwrap();
        let scalars = out.point_data().scalars().unwrap();
        assert_eq!(scalars.name(), Some("energy"));
        assert_eq!(scalars.data(), &ArrayData::Float32(vec![1.0, 2.0, 3.0]));
    }

    #[test]
    fn test_curve_cheap_rejections() {
        let md = curve_metadata();
        // None of these reach the key lookup.
        let mut tri = CellArray::new();
        tri.push(CellKind::Triangle, &[0, 1, 2]);
        let surface = Dataset::new(MeshStructure::PolyData {
            points: points(vec![0.0; 9]),
            cells: tri,
        });
        assert!(convert_curves_to_rect_grids(&surface, &md, &unresolved).unwrap().is_none());

        let sheet = Dataset::new(MeshStructure::Structured {
            dims: [3, 2, 1],
            points: points(vec![0.0; 18]),
        });
        assert!(convert_curves_to_rect_grids(&sheet, &md, &unresolved).unwrap().is_none());

        let mut sparse = CellArray::new();
        sparse.push(CellKind::Line, &[0, 1]);
        let mismatched = Dataset::new(MeshStructure::PolyData {
            points: points(vec![0.0; 12]),
            cells: sparse,
        });
        assert!(convert_curves_to_rect_grids(&mismatched, &md, &unresolved).unwrap().is_none());

        let no_curves = DatabaseMetadata::new();
        assert!(convert_curves_to_rect_grids(&polyline(3), &no_curves, &unresolved)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_curve_lookup_failures() {
        let md = curve_metadata();
        let err = convert_curves_to_rect_grids(&polyline(3), &md, &unresolved).unwrap_err();
        assert!(err.is_not_in_cache());

        let other = |_: ObjectId| Some(key("pressure"));
        assert!(convert_curves_to_rect_grids(&polyline(3), &md, &other).unwrap().is_none());
    }

    #[test]
    fn test_structured_line_is_a_curve() {
        let ds = Dataset::new(MeshStructure::Structured {
            dims: [1, 3, 1],
            points: points(vec![0.0, 1.0, 0.0, 1.0, 2.0, 0.0, 2.0, 4.0, 0.0]),
        });
        let resolve = |_: ObjectId| Some(key("energy"));
        let out = convert_curves_to_rect_grids(&ds, &curve_metadata(), &resolve)
            .unwrap()
            .unwrap();
        assert_eq!(out.structure().dims(), Some([3, 1, 1]));
    }

    /// Two coincident segments, each storing its own endpoints, plus
    /// unreferenced padding so the grid qualifies for merging.
    fn doubled_line() -> Dataset {
        let coords = vec![
            1.0, 0.0, 0.0, //
            0.0, 0.0, 0.0, //
            -0.0, 0.0, 0.0, //
            1.0, 0.0, 0.0, //
            9.0, 9.0, 9.0, //
            9.0, 9.0, 9.0, //
        ];
        let mut cells = CellArray::new();
        cells.push(CellKind::Line, &[1, 0]);
        cells.push(CellKind::Line, &[2, 3]);
        let mut ds = Dataset::new(MeshStructure::Unstructured {
            points: points(coords),
            cells,
        });
        ds.point_data_mut().add_with_role(
            Arc::new(TypedArray::from_f32("t", vec![1.0, 0.0, 0.0, 1.0, 7.0, 7.0])),
            AttributeRole::Scalars,
        );
        ds
    }

    #[test]
    fn test_disconnected_grid_without_spare_points_is_left_alone() {
        // Two segments with a shared coincident endpoint, every point used once.
        let mut cells = CellArray::new();
        cells.push(CellKind::Line, &[0, 1]);
        cells.push(CellKind::Line, &[2, 3]);
        let ds = Dataset::new(MeshStructure::Unstructured {
            points: points(vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0, 0.0, 2.0, 0.0, 0.0]),
            cells,
        });
        assert!(remove_duplicate_nodes(&ds).unwrap().is_none());
    }

    #[test]
    fn test_duplicate_nodes_merge() {
        let ds = doubled_line();
        let out = remove_duplicate_nodes(&ds).unwrap().unwrap();
        assert_eq!(out.num_points(), 2);
        let pts = out.structure().points().unwrap();
        assert_eq!(pts.tuple(0), Some(vec![0.0, 0.0, 0.0]));
        assert_eq!(pts.tuple(1), Some(vec![1.0, 0.0, 0.0]));
        let cells = out.structure().cells().unwrap();
        assert_eq!(cells.cell(0), Some((CellKind::Line, &[0_usize, 1][..])));
        assert_eq!(cells.cell(1), Some((CellKind::Line, &[0_usize, 1][..])));
        let t = out.point_data().scalars().unwrap();
        assert_eq!(t.data(), &ArrayData::Float32(vec![0.0, 1.0]));
        assert!(out.validate().is_ok());
    }

    #[test]
    fn test_every_node_is_referenced_after_merge() {
        let out = remove_duplicate_nodes(&doubled_line()).unwrap().unwrap();
        let cells = out.structure().cells().unwrap();
        for p in 0..out.num_points() {
            assert!(cells.connectivity().contains(&p));
        }
    }

    #[test]
    fn test_connected_grid_is_left_alone() {
        let coords: Vec<f32> = (0..8).flat_map(|i| [i as f32, 0.0, 0.0]).collect();
        let mut cells = CellArray::new();
        cells.push(CellKind::Hexahedron, &[0, 1, 2, 3, 4, 5, 6, 7]);
        let ds = Dataset::new(MeshStructure::Unstructured {
            points: points(coords),
            cells,
        });
        assert!(remove_duplicate_nodes(&ds).unwrap().is_none());
        assert!(remove_duplicate_nodes(&polyline(3)).unwrap().is_none());
    }
}
