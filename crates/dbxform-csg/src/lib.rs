//! Constructive-solid-geometry discretization for dbxform.
//!
//! Turns a zone of a [`CsgMesh`](dbxform_core::CsgMesh) into an explicit mesh
//! using one of four strategies:
//! - boundary extraction, quads on the surface of the sampled region
//! - uniform sampling, one hexahedron per grid cell inside the region
//! - adaptive sampling, octree refinement driven by surface flatness
//! - multi-pass sampling over a per-rank block with a ghost halo
//!
//! [`CsgDiscretizer`] wraps the strategies with result caching, cross-timestep
//! reuse, and remapping of zone-centered arrays onto the output cells.

// Documentation lints - internal functions don't need exhaustive panic/error docs
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]

pub mod adaptive;
pub mod builder;
pub mod decompose;
pub mod discretizer;
pub mod grid;
pub mod multipass;
pub mod sampling;

pub use adaptive::{adaptive, ADAPTIVE_LEVELS};
pub use builder::{Discretized, MeshBuilder};
pub use decompose::{rank_block, rectilinear_decomposition};
pub use discretizer::{zone_indices, CsgDiscretizer, DiscretizedDomain, DomainRequest};
pub use grid::{IndexBox, SampleGrid, MAX_SAMPLE_CELLS};
pub use multipass::{CsgPartition, MAX_MULTIPASS_BOUNDARIES};
pub use sampling::{boundary_surface, uniform, ZoneSelector};
