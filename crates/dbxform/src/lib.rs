//! dbxform: precision transforms and CSG discretization for visualization
//! database pipelines.
//!
//! Every dataset a database serves passes through a [`TransformManager`]
//! before the rest of the pipeline sees it. The manager runs a fixed
//! sequence of stages:
//!
//! 1. CSG meshes are discretized into explicit cells.
//! 2. Point sets without cells get one vertex cell per point.
//! 3. Datasets serving a declared curve are repacked as 1-D rectilinear grids.
//! 4. Coincident nodes are merged, if the configuration asks for it.
//! 5. Coordinates and fields are converted to the requested precision.
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use dbxform::*;
//!
//! fn main() -> Result<()> {
//!     let config = PipelineConfig::from_json(r#"{"precision":"Float"}"#)?;
//!     let mut manager = TransformManager::new(config);
//!     let mut metadata = DatabaseMetadata::new();
//!     let upstream = ArtifactCache::new();
//!
//!     let points = TypedArray::named("points", 3, ArrayData::Float64(vec![0.0, 1.0, 2.0]));
//!     let mut cells = CellArray::new();
//!     cells.push(CellKind::Vertex, &[0]);
//!     let dataset = Arc::new(Dataset::new(MeshStructure::PolyData {
//!         points: Arc::new(points),
//!         cells,
//!     }));
//!
//!     let out = manager.transform_single_dataset(
//!         dataset,
//!         0,
//!         &DataRequest::new("mesh"),
//!         &mut metadata,
//!         &upstream,
//!     )?;
//!     assert_eq!(
//!         out.structure().points().map(|p| p.element_type()),
//!         Some(ElementType::Float32)
//!     );
//!     Ok(())
//! }
//! ```

// Documentation lints - internal functions don't need exhaustive panic/error docs
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]

pub mod manager;
pub mod precision;
pub mod repair;

pub use manager::TransformManager;
pub use precision::{coordinate_type, PrecisionPolicy};
pub use repair::{
    add_vertex_cells_to_points_only_dataset, convert_curves_to_rect_grids, remove_duplicate_nodes,
};

// Re-export core types
pub use dbxform_core::{
    convert_array, convert_dataset, convert_to_double, convert_to_float, kinds, remap_array,
    AdmissibleTypes, ArrayData, ArtifactCache, AttributeRole, BitBuffer, Bounds, CacheEntry,
    CacheKey, CellArray, CellKind, CsgMesh, CurveMetadata, DataRequest, DatabaseCache, Derived,
    DatabaseMetadata, Dataset, DiscretizationMode, DiscretizationRequest, ElementType, EnumKind,
    FieldData, Material, MeshMetadata, MeshStructure, MeshType, ObjectId, ParallelContext,
    PipelineConfig, PrecisionMode, Quadric, RegionExpr, Result, TransformError, TypedArray,
    VarKind, VarMetadata, WarningSink, ZoneMaterial, ALL_DOMAINS, ALL_MATERIALS,
    GHOST_ZONES_ARRAY, INTERNAL_ARRAY_PREFIX, PINNED_TIMESTEP, ZONE_MAP_ARRAY,
};

// Re-export CSG discretization
pub use dbxform_csg::{
    rank_block, rectilinear_decomposition, CsgDiscretizer, CsgPartition, DiscretizedDomain,
    DomainRequest, SampleGrid, ZoneSelector, MAX_MULTIPASS_BOUNDARIES,
};

pub use dbxform_core::DVec3;
