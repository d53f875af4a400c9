//! Core abstractions for dbxform.
//!
//! This crate provides the data model and leaf operations used throughout dbxform:
//! - [`TypedArray`] and [`Dataset`] with shared, reference-counted ownership
//! - [`CsgMesh`] constructive-solid-geometry descriptions
//! - [`ArtifactCache`] keyed artifact storage and the [`DatabaseCache`] trait
//! - Element-type conversion and index-list remapping of arrays
//! - [`PipelineConfig`] and per-request options

// Documentation lints - internal functions don't need exhaustive panic/error docs
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
// Builder patterns return Self which doesn't need must_use
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]

pub mod array;
pub mod cache;
pub mod convert;
pub mod csg;
pub mod dataset;
pub mod element;
pub mod error;
pub mod id;
pub mod material;
pub mod metadata;
pub mod options;
pub mod remap;
pub mod warnings;

pub use array::TypedArray;
pub use cache::{
    kinds, ArtifactCache, CacheEntry, CacheKey, DatabaseCache, Derived, ALL_DOMAINS,
    ALL_MATERIALS, PINNED_TIMESTEP,
};
pub use convert::{convert_array, convert_dataset, convert_to_double, convert_to_float};
pub use csg::{Bounds, CsgMesh, Quadric, RegionExpr};
pub use dataset::{
    AttributeRole, CellArray, CellKind, Dataset, FieldData, MeshStructure, GHOST_ZONES_ARRAY,
    INTERNAL_ARRAY_PREFIX, ZONE_MAP_ARRAY,
};
pub use element::{ArrayData, BitBuffer, ElementType};
pub use error::{Result, TransformError};
pub use id::ObjectId;
pub use material::{Material, ZoneMaterial};
pub use metadata::{
    CurveMetadata, DatabaseMetadata, EnumKind, MeshMetadata, MeshType, VarKind, VarMetadata,
};
pub use options::{
    AdmissibleTypes, DataRequest, DiscretizationMode, DiscretizationRequest, ParallelContext,
    PipelineConfig, PrecisionMode,
};
pub use remap::remap_array;
pub use warnings::WarningSink;

// Re-export glam types for convenience
pub use glam::DVec3;
