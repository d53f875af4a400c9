//! The transform manager: runs every dataset pulled from a database through
//! the fixed sequence of transform stages.

use std::sync::Arc;

use dbxform_core::{
    convert_array, convert_dataset, kinds, ArtifactCache, CacheKey, DataRequest, Dataset,
    DatabaseCache, DatabaseMetadata, Derived, ElementType, FieldData, Material, MeshStructure,
    MeshType, ObjectId, PipelineConfig, Result, TransformError, TypedArray, WarningSink,
    ALL_MATERIALS,
};
use dbxform_csg::{zone_indices, CsgDiscretizer, DomainRequest, ZoneSelector};

use crate::precision::PrecisionPolicy;
use crate::repair::{
    add_vertex_cells_to_points_only_dataset, convert_curves_to_rect_grids, remove_duplicate_nodes,
};

/// Identities of the arrays a coordinate conversion reads.
fn coordinate_ids(dataset: &Dataset) -> Vec<ObjectId> {
    match dataset.structure() {
        MeshStructure::Rectilinear { x, y, z, .. } => vec![x.id(), y.id(), z.id()],
        structure => structure
            .points()
            .map_or_else(|| vec![dataset.id()], |p| vec![p.id()]),
    }
}

/// Applies discretization, repairs, and precision conversion to datasets.
///
/// The manager owns a private [`ArtifactCache`] for everything it derives.
/// Reverse key lookups consult the upstream database cache first and the
/// private cache second.
#[derive(Debug, Default)]
pub struct TransformManager {
    config: PipelineConfig,
    cache: ArtifactCache,
    warnings: WarningSink,
}

impl TransformManager {
    /// Creates a manager with an empty cache.
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            cache: ArtifactCache::new(),
            warnings: WarningSink::new(),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// The manager's private artifact cache.
    pub fn cache(&self) -> &ArtifactCache {
        &self.cache
    }

    /// Warnings recorded since the last call to [`take_warnings`](Self::take_warnings).
    pub fn warnings(&self) -> &[String] {
        self.warnings.messages()
    }

    /// Drains the recorded warnings.
    pub fn take_warnings(&mut self) -> Vec<String> {
        self.warnings.take()
    }

    fn resolve_key(&self, upstream: &dyn DatabaseCache, id: ObjectId) -> Option<CacheKey> {
        upstream
            .object_key(id)
            .or_else(|| self.cache.key_of(id).cloned())
    }

    /// Runs one dataset through every stage.
    ///
    /// A stage that cannot find what it needs in either cache ends the run,
    /// and the dataset is returned as it stood before that stage. Every
    /// other error propagates.
    pub fn transform_single_dataset(
        &mut self,
        dataset: Arc<Dataset>,
        domain: usize,
        request: &DataRequest,
        metadata: &mut DatabaseMetadata,
        upstream: &dyn DatabaseCache,
    ) -> Result<Arc<Dataset>> {
        let mut current = dataset;
        match self.run_stages(&mut current, domain, request, metadata, upstream) {
            Ok(()) => Ok(current),
            Err(e) if e.is_not_in_cache() => {
                log::debug!("passing dataset {} through: {e}", current.id());
                Ok(current)
            }
            Err(e) => Err(e),
        }
    }

    fn run_stages(
        &mut self,
        current: &mut Arc<Dataset>,
        domain: usize,
        request: &DataRequest,
        metadata: &mut DatabaseMetadata,
        upstream: &dyn DatabaseCache,
    ) -> Result<()> {
        *current = self.csg_to_discrete(metadata, request, Arc::clone(current), domain, upstream)?;

        {
            let resolve = |id: ObjectId| self.resolve_key(upstream, id);
            add_vertex_cells_to_points_only_dataset(current, metadata, &resolve)?;
            if let Some(curve) = convert_curves_to_rect_grids(current, metadata, &resolve)? {
                *current = Arc::new(curve);
            }
        }

        if self.config.remove_duplicate_nodes {
            if let Some(merged) = remove_duplicate_nodes(current)? {
                *current = Arc::new(merged);
            }
        }

        *current = self.native_to_float(metadata, request, Arc::clone(current), upstream)?;
        Ok(())
    }

    /// Discretizes a CSG dataset; any other dataset passes through.
    ///
    /// The domain is mapped to a region through the mesh metadata, and the
    /// mesh is flagged when ghost zones were synthesized for it.
    pub fn csg_to_discrete(
        &mut self,
        metadata: &mut DatabaseMetadata,
        request: &DataRequest,
        dataset: Arc<Dataset>,
        domain: usize,
        upstream: &dyn DatabaseCache,
    ) -> Result<Arc<Dataset>> {
        if !matches!(dataset.structure(), MeshStructure::Csg(_)) {
            return Ok(dataset);
        }
        let key = self
            .resolve_key(upstream, dataset.id())
            .ok_or_else(|| TransformError::NotInCache(format!("CSG dataset {}", dataset.id())))?;
        let mesh_name = metadata
            .mesh_name_for_var(&key.var)
            .unwrap_or(key.var.as_str())
            .to_string();
        let (block, region) = metadata
            .convert_csg_domain(&mesh_name, domain)
            .ok_or_else(|| {
                TransformError::InvalidDataset(format!(
                    "domain {domain} of CSG mesh {mesh_name} has no region"
                ))
            })?;
        log::debug!("discretizing {mesh_name} domain {domain} (block {block}, region {region})");

        let domain_request = DomainRequest {
            mesh_name: &mesh_name,
            source: &dataset,
            selector: ZoneSelector::One(region),
            timestep: key.timestep,
            domain: key.domain,
            material: &key.material,
            request: request.discretization,
            parallel: self.config.parallel,
        };
        let discretized =
            CsgDiscretizer::new(&mut self.cache, &mut self.warnings).discretize(&domain_request)?;
        if discretized.ghost_zones_created {
            metadata.set_ghost_zones_created(&mesh_name);
        }

        let out = Arc::new(discretized.dataset);
        self.cache
            .put(key.derived(&key.var, kinds::STAGE_OUTPUT), Arc::clone(&out));
        Ok(out)
    }

    /// Converts coordinates and field arrays to the precision the request
    /// and configuration call for.
    ///
    /// A first pass only decides whether anything needs converting. The
    /// second rebuilds the dataset, taking each conversion from the private
    /// cache, then the upstream cache, and only then computing it. Private
    /// entries are tagged with the arrays they were converted from and miss
    /// once those are replaced. Arrays that need nothing are shared with the
    /// input.
    pub fn native_to_float(
        &mut self,
        metadata: &DatabaseMetadata,
        request: &DataRequest,
        dataset: Arc<Dataset>,
        upstream: &dyn DatabaseCache,
    ) -> Result<Arc<Dataset>> {
        let policy = PrecisionPolicy::new(&self.config, request, metadata);

        let coordinates = policy.coordinate_target(&dataset);
        let fields_need = dataset
            .cell_data()
            .iter()
            .chain(dataset.point_data().iter())
            .any(|a| policy.data_target(a).is_some());
        if coordinates.is_none() && !fields_need {
            return Ok(dataset);
        }

        let structure = match coordinates {
            Some(target) => self.converted_structure(&dataset, target, upstream)?,
            None => None,
        };
        let mut out = match structure {
            Some(s) => Dataset::new(s),
            None => dataset.copy_structure(),
        };
        *out.cell_data_mut() = self.converted_fields(&policy, dataset.cell_data(), upstream)?;
        *out.point_data_mut() = self.converted_fields(&policy, dataset.point_data(), upstream)?;
        Ok(Arc::new(out))
    }

    fn converted_key(
        &self,
        upstream: &dyn DatabaseCache,
        id: ObjectId,
        target: ElementType,
    ) -> Option<CacheKey> {
        self.resolve_key(upstream, id)
            .map(|k| k.derived(&k.var, &kinds::converted(&k.kind, target)))
    }

    fn converted_structure(
        &mut self,
        dataset: &Dataset,
        target: ElementType,
        upstream: &dyn DatabaseCache,
    ) -> Result<Option<MeshStructure>> {
        let sources = coordinate_ids(dataset);
        let key = self.converted_key(upstream, dataset.id(), target);
        if let Some(key) = &key {
            let hit = self
                .cache
                .get_derived::<Dataset>(key, &sources)
                .or_else(|| upstream.get_object(key).and_then(|e| e.as_dataset()));
            if let Some(hit) = hit {
                log::debug!("using cached {target} coordinates at {key}");
                return Ok(Some(hit.structure().clone()));
            }
        }
        let Some(converted) = convert_dataset(dataset, target == ElementType::Float32)? else {
            return Ok(None);
        };
        let structure = converted.structure().clone();
        if let Some(key) = key {
            self.cache
                .put(key, Derived::new(sources, Arc::new(converted)));
        }
        Ok(Some(structure))
    }

    fn converted_array(
        &mut self,
        array: &Arc<TypedArray>,
        target: ElementType,
        upstream: &dyn DatabaseCache,
    ) -> Result<Arc<TypedArray>> {
        let sources = [array.id()];
        let key = self.converted_key(upstream, array.id(), target);
        if let Some(key) = &key {
            let hit = self
                .cache
                .get_derived::<TypedArray>(key, &sources)
                .or_else(|| upstream.get_object(key).and_then(|e| e.as_array()));
            if let Some(hit) = hit {
                log::debug!("using cached {target} array at {key}");
                return Ok(hit);
            }
        }
        let Some(converted) = convert_array(array, target)? else {
            return Ok(Arc::clone(array));
        };
        let converted = Arc::new(converted);
        if let Some(key) = key {
            self.cache
                .put(key, Derived::new(sources.to_vec(), Arc::clone(&converted)));
        }
        Ok(converted)
    }

    fn converted_fields(
        &mut self,
        policy: &PrecisionPolicy<'_>,
        fields: &FieldData,
        upstream: &dyn DatabaseCache,
    ) -> Result<FieldData> {
        let mut out = FieldData::new();
        for array in fields.iter() {
            let array = match policy.data_target(array) {
                Some(target) => self.converted_array(array, target, upstream)?,
                None => Arc::clone(array),
            };
            match array.name().and_then(|name| fields.role_of(name)) {
                Some(role) => out.add_with_role(array, role),
                None => out.add(array),
            }
        }
        Ok(out)
    }

    /// Remaps a material served for a discretized CSG domain onto the cells
    /// of the discretization.
    ///
    /// Returns `Ok(false)`, leaving `material` untouched, when its mesh is
    /// not CSG or the domain has not been discretized with the request's
    /// parameters yet. Fails with [`TransformError::NotInCache`] if the
    /// material is unknown upstream.
    pub fn transform_material_dataset(
        &mut self,
        metadata: &DatabaseMetadata,
        request: &DataRequest,
        material: &mut Arc<Material>,
        domain: usize,
        upstream: &dyn DatabaseCache,
    ) -> Result<bool> {
        let key = upstream
            .void_ref_key(material.id())
            .ok_or_else(|| TransformError::NotInCache(format!("material {}", material.id())))?;
        let Some(mesh) = metadata.mesh_for_var(&key.var) else {
            return Ok(false);
        };
        if mesh.mesh_type != MeshType::Csg
            || metadata.convert_csg_domain(&mesh.name, domain).is_none()
        {
            return Ok(false);
        }

        let lookup = |material_tag: &str| {
            let at = CacheKey::new(
                mesh.name.as_str(),
                kinds::DISCRETIZED,
                key.timestep,
                key.domain,
                material_tag,
            );
            let spec = self
                .cache
                .get_request(&at.derived(&mesh.name, kinds::DATA_SPECIFICATION))?;
            if !spec.is_compatible(&request.discretization) {
                return None;
            }
            self.cache.get_array(&at.derived(&mesh.name, kinds::ZONE_MAP))
        };
        let Some(zone_map) = lookup(&key.material).or_else(|| lookup(ALL_MATERIALS)) else {
            log::debug!(
                "no discretization of {} domain {domain} to remap {} onto",
                mesh.name,
                key.var
            );
            return Ok(false);
        };

        let sources = [material.id(), zone_map.id()];
        let remap_key = key.derived(&key.var, kinds::REMAPPED_MATERIAL);
        let remapped = match self.cache.get_derived::<Material>(&remap_key, &sources) {
            Some(hit) => hit,
            None => {
                let remapped = Arc::new(material.gather(&zone_indices(&zone_map))?);
                self.cache.put(
                    remap_key,
                    Derived::new(sources.to_vec(), Arc::clone(&remapped)),
                );
                remapped
            }
        };
        *material = remapped;
        Ok(true)
    }

    /// Evicts every artifact cached at timestep `last_timestep`.
    pub fn free_up_resources(&mut self, last_timestep: i32) -> usize {
        self.cache.clear_timestep(last_timestep)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbxform_core::{
        AdmissibleTypes, ArrayData, AttributeRole, CellArray, CellKind, PrecisionMode,
    };

    fn config(precision: PrecisionMode) -> PipelineConfig {
        PipelineConfig {
            precision,
            ..PipelineConfig::default()
        }
    }

    fn triangle(points: ArrayData) -> Dataset {
        let mut cells = CellArray::new();
        cells.push(CellKind::Triangle, &[0, 1, 2]);
        Dataset::new(MeshStructure::PolyData {
            points: Arc::new(TypedArray::named("points", 3, points)),
            cells,
        })
    }

    fn key(var: &str, kind: &str) -> CacheKey {
        CacheKey::new(var, kind, 0, 0, ALL_MATERIALS)
    }

    #[test]
    fn test_native_mode_passes_through() {
        let mut manager = TransformManager::new(config(PrecisionMode::Native));
        let upstream = ArtifactCache::new();
        let mut md = DatabaseMetadata::new();
        let ds = Arc::new(triangle(ArrayData::Float64(vec![0.0; 9])));
        let out = manager
            .transform_single_dataset(
                Arc::clone(&ds),
                0,
                &DataRequest::new("tri"),
                &mut md,
                &upstream,
            )
            .unwrap();
        assert!(Arc::ptr_eq(&ds, &out));
        assert!(manager.cache().is_empty());
    }

    #[test]
    fn test_demotion_keeps_roles_and_shares_untouched_arrays() {
        let mut manager = TransformManager::new(config(PrecisionMode::Float));
        let mut upstream = ArtifactCache::new();
        let mut md = DatabaseMetadata::new();

        let mut ds = triangle(ArrayData::Float64(vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0]));
        let pressure = Arc::new(TypedArray::from_f64("pressure", vec![2.5]));
        let ids = Arc::new(TypedArray::named("ids", 1, ArrayData::Int32(vec![7])));
        ds.cell_data_mut()
            .add_with_role(Arc::clone(&pressure), AttributeRole::Scalars);
        ds.cell_data_mut().add(Arc::clone(&ids));
        let ds = Arc::new(ds);
        upstream.put(key("tri", kinds::DATASET), Arc::clone(&ds));
        upstream.put(key("pressure", kinds::ARRAY), Arc::clone(&pressure));

        let out = manager
            .transform_single_dataset(ds, 0, &DataRequest::new("tri"), &mut md, &upstream)
            .unwrap();
        let points = out.structure().points().unwrap();
        assert_eq!(points.element_type(), ElementType::Float32);
        let scalars = out.cell_data().scalars().unwrap();
        assert_eq!(scalars.name(), Some("pressure"));
        assert_eq!(scalars.element_type(), ElementType::Float32);
        assert!(Arc::ptr_eq(out.cell_data().get("ids").unwrap(), &ids));

        let converted = key("pressure", &kinds::converted(kinds::ARRAY, ElementType::Float32));
        let cached = manager
            .cache()
            .get_derived::<TypedArray>(&converted, &[pressure.id()])
            .unwrap();
        assert!(Arc::ptr_eq(&cached, scalars));
        assert!(manager.cache().contains(&key(
            "tri",
            &kinds::converted(kinds::DATASET, ElementType::Float32)
        )));
    }

    #[test]
    fn test_upstream_conversion_is_reused() {
        let mut manager = TransformManager::new(config(PrecisionMode::Double));
        let mut upstream = ArtifactCache::new();
        let md = DatabaseMetadata::new();

        let temp = Arc::new(TypedArray::from_f32("temp", vec![1.0]));
        let widened = Arc::new(TypedArray::from_f64("temp", vec![1.0]));
        upstream.put(key("temp", kinds::ARRAY), Arc::clone(&temp));
        upstream.put(
            key("temp", &kinds::converted(kinds::ARRAY, ElementType::Float64)),
            Arc::clone(&widened),
        );
        let mut ds = triangle(ArrayData::Float64(vec![0.0; 9]));
        ds.cell_data_mut().add(temp);

        let out = manager
            .native_to_float(&md, &DataRequest::new("temp"), Arc::new(ds), &upstream)
            .unwrap();
        assert!(Arc::ptr_eq(out.cell_data().get("temp").unwrap(), &widened));
    }

    #[test]
    fn test_dataset_and_array_of_one_variable_cache_separately() {
        let mut manager = TransformManager::new(config(PrecisionMode::Float));
        let mut upstream = ArtifactCache::new();
        let md = DatabaseMetadata::new();

        let temp = Arc::new(TypedArray::from_f64("temp", vec![300.0]));
        let mut ds = triangle(ArrayData::Float64(vec![0.0; 9]));
        ds.cell_data_mut()
            .add_with_role(Arc::clone(&temp), AttributeRole::Scalars);
        let ds = Arc::new(ds);
        upstream.put(key("temp", kinds::DATASET), Arc::clone(&ds));
        upstream.put(key("temp", kinds::ARRAY), temp);

        let request = DataRequest::new("temp");
        let first = manager
            .native_to_float(&md, &request, Arc::clone(&ds), &upstream)
            .unwrap();
        let second = manager
            .native_to_float(&md, &request, ds, &upstream)
            .unwrap();
        assert_eq!(manager.cache().len(), 2);
        assert!(Arc::ptr_eq(
            first.structure().points().unwrap(),
            second.structure().points().unwrap()
        ));
        assert!(Arc::ptr_eq(
            first.cell_data().scalars().unwrap(),
            second.cell_data().scalars().unwrap()
        ));
    }

    #[test]
    fn test_unsupported_conversion_propagates() {
        let mut manager = TransformManager::new(config(PrecisionMode::Native));
        let upstream = ArtifactCache::new();
        let mut md = DatabaseMetadata::new();
        let mut ds = triangle(ArrayData::Float32(vec![0.0; 9]));
        ds.cell_data_mut()
            .add(Arc::new(TypedArray::from_bits("mask", &[true])));
        let request = DataRequest::new("tri").with_admissible_types(AdmissibleTypes::only(&[
            ElementType::Float32,
        ]));
        let err = manager
            .transform_single_dataset(Arc::new(ds), 0, &request, &mut md, &upstream)
            .unwrap_err();
        assert!(matches!(
            err,
            TransformError::UnsupportedElementType(ElementType::Bit)
        ));
    }

    #[test]
    fn test_free_up_resources() {
        let mut manager = TransformManager::new(config(PrecisionMode::Float));
        let mut upstream = ArtifactCache::new();
        let md = DatabaseMetadata::new();
        let ds = Arc::new(triangle(ArrayData::Float64(vec![0.0; 9])));
        upstream.put(key("tri", kinds::DATASET), Arc::clone(&ds));
        manager
            .native_to_float(&md, &DataRequest::new("tri"), ds, &upstream)
            .unwrap();
        assert_eq!(manager.cache().len(), 1);
        assert_eq!(manager.free_up_resources(1), 0);
        assert_eq!(manager.free_up_resources(0), 1);
        assert!(manager.cache().is_empty());
    }
}
