//! Cache-aware discretization of one CSG domain.
//!
//! A request is served, in order, from the discretization cached at its own
//! timestep, from the one pinned at [`PINNED_TIMESTEP`] for its domain, or
//! by discretizing afresh. Fresh results are cached at the request's
//! timestep and pinned when the domain has no valid pin yet.

#![allow(
    clippy::cast_possible_wrap,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]

use std::any::Any;
use std::sync::Arc;

use dbxform_core::{
    kinds, remap_array, ArrayData, ArtifactCache, CacheEntry, CacheKey, CsgMesh, Dataset,
    DiscretizationMode, DiscretizationRequest, MeshStructure, ParallelContext, Result,
    TransformError, TypedArray, WarningSink, ALL_DOMAINS, GHOST_ZONES_ARRAY,
    INTERNAL_ARRAY_PREFIX, PINNED_TIMESTEP, ZONE_MAP_ARRAY,
};

use crate::adaptive::adaptive;
use crate::builder::Discretized;
use crate::multipass::CsgPartition;
use crate::sampling::{boundary_surface, uniform, ZoneSelector};

/// One domain of a CSG mesh to discretize.
#[derive(Debug, Clone)]
pub struct DomainRequest<'a> {
    /// Name of the mesh; the variable part of every cache key.
    pub mesh_name: &'a str,
    /// Dataset holding the CSG structure and its zone-centered arrays.
    pub source: &'a Dataset,
    pub selector: ZoneSelector,
    pub timestep: i32,
    pub domain: i32,
    pub material: &'a str,
    pub request: DiscretizationRequest,
    pub parallel: ParallelContext,
}

/// Result of discretizing a domain.
#[derive(Debug)]
pub struct DiscretizedDomain {
    /// The discretized mesh with every source cell array remapped onto it.
    pub dataset: Dataset,
    /// Per-cell source zone, also attached to `dataset` as [`ZONE_MAP_ARRAY`].
    pub zone_map: Arc<TypedArray>,
    /// Whether ghost zones were synthesized for this domain.
    pub ghost_zones_created: bool,
}

/// Cached mesh, zone map, and whether they came from this very timestep.
struct Resolved {
    mesh: Arc<Dataset>,
    zone_map: Arc<TypedArray>,
    same_timestep: bool,
}

/// Discretizes CSG domains against an [`ArtifactCache`].
pub struct CsgDiscretizer<'a> {
    cache: &'a mut ArtifactCache,
    warnings: &'a mut WarningSink,
}

impl<'a> CsgDiscretizer<'a> {
    pub fn new(cache: &'a mut ArtifactCache, warnings: &'a mut WarningSink) -> Self {
        Self { cache, warnings }
    }

    /// Discretizes one domain and remaps its cell arrays onto the result.
    ///
    /// A domain that cannot be discretized yields an empty unstructured grid
    /// and a warning. Fails if `source` does not hold a CSG structure or a
    /// source array has too few tuples for the zone map.
    pub fn discretize(&mut self, req: &DomainRequest<'_>) -> Result<DiscretizedDomain> {
        let MeshStructure::Csg(csg) = req.source.structure() else {
            return Err(TransformError::InvalidDataset(format!(
                "mesh {} is {}, not CSG",
                req.mesh_name,
                req.source.structure().type_name()
            )));
        };
        let key = CacheKey::new(
            req.mesh_name,
            kinds::DISCRETIZED,
            req.timestep,
            req.domain,
            req.material,
        );

        let resolved = match self.current(&key, req) {
            Some(hit) => hit,
            None => match self.pinned(&key, req) {
                Some(hit) => {
                    self.store(&key, req, &hit.mesh, &hit.zone_map);
                    hit
                }
                None => self.compute(&key, req, csg)?,
            },
        };
        self.assemble(&key, req, resolved)
    }

    fn current(&self, key: &CacheKey, req: &DomainRequest<'_>) -> Option<Resolved> {
        let mesh = self.cache.get_dataset(key)?;
        let spec = self
            .cache
            .get_request(&key.derived(req.mesh_name, kinds::DATA_SPECIFICATION))?;
        if !spec.is_compatible(&req.request) {
            log::debug!("cached discretization at {key} was made with other parameters");
            return None;
        }
        let zone_map = self
            .cache
            .get_array(&key.derived(req.mesh_name, kinds::ZONE_MAP))?;
        log::debug!("reusing discretization at {key}");
        Some(Resolved {
            mesh,
            zone_map,
            same_timestep: true,
        })
    }

    fn pin_key(key: &CacheKey, req: &DomainRequest<'_>, kind: &str) -> CacheKey {
        key.derived(req.mesh_name, kind).at(PINNED_TIMESTEP, req.domain)
    }

    fn pinned(&self, key: &CacheKey, req: &DomainRequest<'_>) -> Option<Resolved> {
        let source = self
            .cache
            .get_dataset(&Self::pin_key(key, req, kinds::PINNED_SOURCE))?;
        if !source.structure().structurally_equal(req.source.structure()) {
            log::debug!("pinned CSG source for {} changed", req.mesh_name);
            return None;
        }
        let spec = self
            .cache
            .get_request(&Self::pin_key(key, req, kinds::PINNED_DATA_SPECIFICATION))?;
        if !spec.is_compatible(&req.request) {
            return None;
        }
        let mesh = self
            .cache
            .get_dataset(&Self::pin_key(key, req, kinds::PINNED_DISCRETIZED))?;
        let zone_map = self
            .cache
            .get_array(&Self::pin_key(key, req, kinds::PINNED_ZONE_MAP))?;
        log::debug!(
            "reusing pinned discretization of {} domain {} at timestep {}",
            req.mesh_name,
            req.domain,
            req.timestep
        );
        Some(Resolved {
            mesh,
            zone_map,
            same_timestep: false,
        })
    }

    fn store(
        &mut self,
        key: &CacheKey,
        req: &DomainRequest<'_>,
        mesh: &Arc<Dataset>,
        zone_map: &Arc<TypedArray>,
    ) {
        self.cache.put(key.clone(), Arc::clone(mesh));
        self.cache.put(
            key.derived(req.mesh_name, kinds::DATA_SPECIFICATION),
            req.request,
        );
        self.cache
            .put(key.derived(req.mesh_name, kinds::ZONE_MAP), Arc::clone(zone_map));
    }

    fn pin(
        &mut self,
        key: &CacheKey,
        req: &DomainRequest<'_>,
        mesh: &Arc<Dataset>,
        zone_map: &Arc<TypedArray>,
    ) {
        self.cache.put(
            Self::pin_key(key, req, kinds::PINNED_SOURCE),
            Arc::new(req.source.shallow_copy()),
        );
        self.cache
            .put(Self::pin_key(key, req, kinds::PINNED_DISCRETIZED), Arc::clone(mesh));
        self.cache.put(
            Self::pin_key(key, req, kinds::PINNED_DATA_SPECIFICATION),
            req.request,
        );
        self.cache
            .put(Self::pin_key(key, req, kinds::PINNED_ZONE_MAP), Arc::clone(zone_map));
    }

    fn compute(
        &mut self,
        key: &CacheKey,
        req: &DomainRequest<'_>,
        csg: &Arc<CsgMesh>,
    ) -> Result<Resolved> {
        let discretized = match self.run_strategy(req, csg)? {
            Some(d) => d,
            None => {
                self.warnings.warn(format!(
                    "domain {} of CSG mesh {} could not be discretized; it will be empty",
                    req.domain, req.mesh_name
                ));
                Discretized {
                    mesh: Dataset::empty_unstructured(),
                    zone_map: Vec::new(),
                }
            }
        };

        let zones: Vec<i64> = discretized.zone_map.iter().map(|&z| z as i64).collect();
        let zone_map = Arc::new(TypedArray::new(
            Some(ZONE_MAP_ARRAY.to_string()),
            1,
            ArrayData::Id(zones),
        )?);
        let mesh = Arc::new(discretized.mesh);

        self.store(key, req, &mesh, &zone_map);
        // Both lookups failed, so any pin for this domain is stale or absent.
        self.pin(key, req, &mesh, &zone_map);
        Ok(Resolved {
            mesh,
            zone_map,
            same_timestep: false,
        })
    }

    fn run_strategy(
        &mut self,
        req: &DomainRequest<'_>,
        csg: &Arc<CsgMesh>,
    ) -> Result<Option<Discretized>> {
        if !req.selector.is_valid_for(csg) {
            log::debug!(
                "{:?} does not name a zone of {} ({} zones)",
                req.selector,
                req.mesh_name,
                csg.num_zones()
            );
            return Ok(None);
        }
        let tolerance = req.request.tolerance;
        if req.request.boundary_only {
            return boundary_surface(csg, req.selector, tolerance);
        }
        match req.request.mode {
            DiscretizationMode::Uniform => uniform(csg, req.selector, tolerance),
            DiscretizationMode::Adaptive => adaptive(csg, req.selector, &req.request, req.parallel),
            DiscretizationMode::MultiPass => match self.partition(req, csg) {
                Some(partition) => partition.discretize(req.selector).map(Some),
                None => {
                    self.warnings.warn(format!(
                        "multi-pass discretization of {} domain {} failed; using uniform mode",
                        req.mesh_name, req.domain
                    ));
                    uniform(csg, req.selector, tolerance)
                }
            },
        }
    }

    /// The multi-pass partition shared by every domain of this mesh.
    fn partition(&mut self, req: &DomainRequest<'_>, csg: &Arc<CsgMesh>) -> Option<Arc<CsgPartition>> {
        let key = CacheKey::new(
            req.mesh_name,
            kinds::MULTIPASS_PARTITION,
            PINNED_TIMESTEP,
            ALL_DOMAINS,
            req.material,
        );
        let spec_key = key.derived(req.mesh_name, kinds::MULTIPASS_DATA_SPECIFICATION);

        let cached = self.cache.get_payload::<CsgPartition>(&key).filter(|p| {
            p.is_valid_for(csg, &req.request, req.parallel)
                && self
                    .cache
                    .get_request(&spec_key)
                    .is_some_and(|s| s.is_compatible(&req.request))
        });
        if let Some(partition) = cached {
            log::debug!("reusing multi-pass partition of {}", req.mesh_name);
            return Some(partition);
        }

        let partition = Arc::new(CsgPartition::build(
            Arc::clone(csg),
            &req.request,
            req.parallel,
        )?);
        let payload: Arc<dyn Any + Send + Sync> = Arc::clone(&partition) as _;
        self.cache.put(key, CacheEntry::Payload(payload));
        self.cache.put(spec_key, req.request);
        Some(partition)
    }

    fn assemble(
        &mut self,
        key: &CacheKey,
        req: &DomainRequest<'_>,
        resolved: Resolved,
    ) -> Result<DiscretizedDomain> {
        let Resolved {
            mesh,
            zone_map,
            same_timestep,
        } = resolved;
        let indices = zone_indices(&zone_map);
        let mut dataset = mesh.copy_structure();

        for array in req.source.cell_data().iter() {
            let Some(name) = array.name() else {
                continue;
            };
            if name.starts_with(INTERNAL_ARRAY_PREFIX) {
                continue;
            }
            let remap_key = key.derived(name, kinds::REMAPPED_ARRAY);
            let cached = self
                .cache
                .get_array(&remap_key)
                .filter(|a| same_timestep && a.num_tuples() == indices.len());
            let remapped = match cached {
                Some(a) => a,
                None => {
                    let a = Arc::new(remap_array(array, &indices)?);
                    self.cache.put(remap_key, Arc::clone(&a));
                    a
                }
            };
            match req.source.cell_data().role_of(name) {
                Some(role) => dataset.cell_data_mut().add_with_role(remapped, role),
                None => dataset.cell_data_mut().add(remapped),
            }
        }

        let ghosts = mesh.cell_data().get(GHOST_ZONES_ARRAY).cloned();
        let ghost_zones_created = ghosts.is_some();
        if let Some(flags) = ghosts {
            dataset.cell_data_mut().add(flags);
        }
        dataset.cell_data_mut().add(Arc::clone(&zone_map));

        Ok(DiscretizedDomain {
            dataset,
            zone_map,
            ghost_zones_created,
        })
    }
}

/// Zone indices stored in a zone-map array. Negative entries map past any
/// valid zone so remapping rejects them.
#[must_use]
pub fn zone_indices(zone_map: &TypedArray) -> Vec<usize> {
    (0..zone_map.num_tuples())
        .map(|i| match zone_map.data() {
            ArrayData::Id(v) => usize::try_from(v[i]).unwrap_or(usize::MAX),
            _ => zone_map
                .value(i, 0)
                .filter(|v| *v >= 0.0)
                .map_or(usize::MAX, |v| v as usize),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbxform_core::{AttributeRole, Bounds, DVec3, Quadric, RegionExpr, ALL_MATERIALS};

    fn csg_dataset(radius: f64) -> Dataset {
        let csg = CsgMesh::new(
            Bounds::new(DVec3::ZERO, DVec3::splat(10.0)),
            vec![Quadric::sphere(DVec3::splat(5.0), radius)],
            vec![RegionExpr::Inner(0), RegionExpr::Outer(0)],
            vec![0, 1],
        )
        .unwrap();
        let mut ds = Dataset::new(MeshStructure::Csg(Arc::new(csg)));
        ds.cell_data_mut().add_with_role(
            Arc::new(TypedArray::from_f64("density", vec![7.5, 0.1])),
            AttributeRole::Scalars,
        );
        ds
    }

    fn request(tolerance: f64) -> DiscretizationRequest {
        DiscretizationRequest {
            tolerance,
            ..DiscretizationRequest::default()
        }
    }

    fn domain<'a>(source: &'a Dataset, ts: i32, request: DiscretizationRequest) -> DomainRequest<'a> {
        DomainRequest {
            mesh_name: "csgmesh",
            source,
            selector: ZoneSelector::One(0),
            timestep: ts,
            domain: 0,
            material: ALL_MATERIALS,
            request,
            parallel: ParallelContext::default(),
        }
    }

    fn points_of(ds: &Dataset) -> Arc<TypedArray> {
        Arc::clone(ds.structure().points().unwrap())
    }

    #[test]
    fn test_fields_are_remapped() {
        let mut cache = ArtifactCache::new();
        let mut warnings = WarningSink::new();
        let source = csg_dataset(4.0);
        let out = CsgDiscretizer::new(&mut cache, &mut warnings)
            .discretize(&domain(&source, 0, request(0.1)))
            .unwrap();

        let cells = out.dataset.num_cells();
        assert!(cells > 0);
        let density = out.dataset.cell_data().scalars().unwrap();
        assert_eq!(density.name(), Some("density"));
        assert_eq!(density.num_tuples(), cells);
        assert!((0..cells).all(|i| density.value(i, 0) == Some(7.5)));
        assert!(out.dataset.cell_data().get(ZONE_MAP_ARRAY).is_some());
        assert!(!out.ghost_zones_created);
        assert!(out.dataset.validate().is_ok());
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_same_timestep_hit() {
        let mut cache = ArtifactCache::new();
        let mut warnings = WarningSink::new();
        let source = csg_dataset(4.0);
        let mut disc = CsgDiscretizer::new(&mut cache, &mut warnings);
        let a = disc.discretize(&domain(&source, 0, request(0.1))).unwrap();
        let b = disc.discretize(&domain(&source, 0, request(0.1))).unwrap();
        assert!(Arc::ptr_eq(&points_of(&a.dataset), &points_of(&b.dataset)));
        assert!(Arc::ptr_eq(
            a.dataset.cell_data().get("density").unwrap(),
            b.dataset.cell_data().get("density").unwrap()
        ));
    }

    #[test]
    fn test_parameter_change_misses() {
        let mut cache = ArtifactCache::new();
        let mut warnings = WarningSink::new();
        let source = csg_dataset(4.0);
        let mut disc = CsgDiscretizer::new(&mut cache, &mut warnings);
        let base = request(0.1);
        let a = disc.discretize(&domain(&source, 0, base)).unwrap();
        let variants = [
            DiscretizationRequest {
                boundary_only: true,
                ..base
            },
            DiscretizationRequest {
                tolerance: 0.2,
                ..base
            },
            DiscretizationRequest {
                flat_tolerance: 0.5,
                ..base
            },
            DiscretizationRequest {
                mode: DiscretizationMode::Adaptive,
                ..base
            },
        ];
        for variant in variants {
            let b = disc.discretize(&domain(&source, 0, variant)).unwrap();
            assert!(!Arc::ptr_eq(&points_of(&a.dataset), &points_of(&b.dataset)));
        }
    }

    #[test]
    fn test_pinned_reuse_across_timesteps() {
        let mut cache = ArtifactCache::new();
        let mut warnings = WarningSink::new();
        let first = csg_dataset(4.0);
        let a = CsgDiscretizer::new(&mut cache, &mut warnings)
            .discretize(&domain(&first, 0, request(0.1)))
            .unwrap();
        cache.clear_timestep(0);

        // An equal mesh read again at the next timestep.
        let second = csg_dataset(4.0);
        let b = CsgDiscretizer::new(&mut cache, &mut warnings)
            .discretize(&domain(&second, 1, request(0.1)))
            .unwrap();
        assert!(Arc::ptr_eq(&points_of(&a.dataset), &points_of(&b.dataset)));
        let key = CacheKey::new("csgmesh", kinds::DISCRETIZED, 1, 0, ALL_MATERIALS);
        assert!(cache.contains(&key));

        // A changed mesh is discretized again and replaces the pin.
        let third = csg_dataset(3.0);
        let c = CsgDiscretizer::new(&mut cache, &mut warnings)
            .discretize(&domain(&third, 2, request(0.1)))
            .unwrap();
        assert!(!Arc::ptr_eq(&points_of(&a.dataset), &points_of(&c.dataset)));
        let pinned = cache
            .get_dataset(&CacheKey::new(
                "csgmesh",
                kinds::PINNED_SOURCE,
                PINNED_TIMESTEP,
                0,
                ALL_MATERIALS,
            ))
            .unwrap();
        assert!(pinned.structure().structurally_equal(third.structure()));
    }

    #[test]
    fn test_undiscretizable_domain_is_empty() {
        let mut cache = ArtifactCache::new();
        let mut warnings = WarningSink::new();
        let source = csg_dataset(4.0);
        let mut req = domain(&source, 0, request(0.1));
        req.selector = ZoneSelector::One(9);
        let out = CsgDiscretizer::new(&mut cache, &mut warnings)
            .discretize(&req)
            .unwrap();
        assert_eq!(out.dataset.num_cells(), 0);
        assert_eq!(out.dataset.num_points(), 0);
        assert_eq!(out.dataset.cell_data().get("density").unwrap().num_tuples(), 0);
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn test_non_csg_source_is_rejected() {
        let mut cache = ArtifactCache::new();
        let mut warnings = WarningSink::new();
        let source = Dataset::empty_unstructured();
        let result = CsgDiscretizer::new(&mut cache, &mut warnings)
            .discretize(&domain(&source, 0, request(0.1)));
        assert!(matches!(result, Err(TransformError::InvalidDataset(_))));
    }

    #[test]
    fn test_zone_indices() {
        let map = TypedArray::named("m", 1, ArrayData::Id(vec![2, 0, -1]));
        assert_eq!(zone_indices(&map), vec![2, 0, usize::MAX]);
        let map = TypedArray::named("m", 1, ArrayData::Int32(vec![1, 3]));
        assert_eq!(zone_indices(&map), vec![1, 3]);
    }
}
