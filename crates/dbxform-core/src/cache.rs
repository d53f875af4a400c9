//! Keyed artifact storage with timestep eviction and reverse lookup.
//!
//! The same [`ArtifactCache`] type backs the transform manager's private cache
//! and, through the [`DatabaseCache`] trait, stands in for the upstream
//! generic-database cache.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::array::TypedArray;
use crate::dataset::Dataset;
use crate::id::ObjectId;
use crate::material::Material;
use crate::options::DiscretizationRequest;

/// Timestep sentinel for artifacts that survive timestep eviction.
pub const PINNED_TIMESTEP: i32 = -1;

/// Domain sentinel for artifacts shared by every domain.
pub const ALL_DOMAINS: i32 = -1;

/// Material tag for artifacts not restricted to one material.
pub const ALL_MATERIALS: &str = "all";

/// Artifact kind tags.
pub mod kinds {
    /// A dataset as served by the database.
    pub const DATASET: &str = "DATASET";
    /// A field array as served by the database.
    pub const ARRAY: &str = "ARRAY";
    /// A material object as served by the database.
    pub const MATERIAL: &str = "MATERIAL";
    /// The discretization request that produced a cached mesh.
    pub const DATA_SPECIFICATION: &str = "DATA_SPECIFICATION";
    /// A discretized CSG mesh at its own timestep.
    pub const DISCRETIZED: &str = "DISCRETIZED";
    /// Per-cell source zone of a discretized CSG mesh.
    pub const ZONE_MAP: &str = "CSG_ZONE_MAP";
    /// A zone-centered CSG array remapped onto a discretized mesh.
    pub const REMAPPED_ARRAY: &str = "REMAPPED_ARRAY";
    /// A material remapped onto a discretized mesh.
    pub const REMAPPED_MATERIAL: &str = "REMAPPED_MATERIAL";
    /// Source CSG mesh pinned at the sentinel timestep.
    pub const PINNED_SOURCE: &str = "PINNED_CSG_SOURCE";
    /// Discretized mesh pinned at the sentinel timestep.
    pub const PINNED_DISCRETIZED: &str = "PINNED_DISCRETIZED";
    /// Request that produced the pinned discretization.
    pub const PINNED_DATA_SPECIFICATION: &str = "PINNED_DATA_SPECIFICATION";
    /// Zone map of the pinned discretization.
    pub const PINNED_ZONE_MAP: &str = "PINNED_CSG_ZONE_MAP";
    /// Multi-pass boundary classification shared across domains.
    pub const MULTIPASS_PARTITION: &str = "MULTIPASS_PARTITION";
    /// Request that produced the multi-pass partition.
    pub const MULTIPASS_DATA_SPECIFICATION: &str = "MULTIPASS_DATA_SPECIFICATION";
    /// A dataset produced by a transform stage rather than read.
    pub const STAGE_OUTPUT: &str = "STAGE_OUTPUT";

    /// Kind tag for an artifact of kind `source_kind` converted to another
    /// element type.
    #[must_use]
    pub fn converted(source_kind: &str, target: crate::ElementType) -> String {
        format!("CONVERTED_{}_{source_kind}", target.as_str().to_uppercase())
    }
}

/// Logical address of a cached artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    pub var: String,
    pub kind: String,
    pub timestep: i32,
    pub domain: i32,
    pub material: String,
}

impl CacheKey {
    pub fn new(
        var: impl Into<String>,
        kind: impl Into<String>,
        timestep: i32,
        domain: i32,
        material: impl Into<String>,
    ) -> Self {
        Self {
            var: var.into(),
            kind: kind.into(),
            timestep,
            domain,
            material: material.into(),
        }
    }

    /// Same address with a different variable and kind.
    #[must_use]
    pub fn derived(&self, var: &str, kind: &str) -> Self {
        Self {
            var: var.to_string(),
            kind: kind.to_string(),
            ..self.clone()
        }
    }

    /// Same address at a different timestep and domain.
    #[must_use]
    pub fn at(&self, timestep: i32, domain: i32) -> Self {
        Self {
            timestep,
            domain,
            ..self.clone()
        }
    }

    /// Returns true if the key survives timestep eviction.
    #[must_use]
    pub fn is_pinned(&self) -> bool {
        self.timestep == PINNED_TIMESTEP
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {}, ts={}, dom={}, mat={})",
            self.var, self.kind, self.timestep, self.domain, self.material
        )
    }
}

/// A cached artifact. Every variant is reference counted; the cache holds
/// one strong reference per entry.
#[derive(Clone)]
pub enum CacheEntry {
    Array(Arc<TypedArray>),
    Dataset(Arc<Dataset>),
    Material(Arc<Material>),
    Request(Arc<DiscretizationRequest>),
    /// Any other derived payload.
    Payload(Arc<dyn Any + Send + Sync>),
}

impl fmt::Debug for CacheEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Array(a) => f.debug_tuple("Array").field(&a.id()).finish(),
            Self::Dataset(d) => f.debug_tuple("Dataset").field(&d.id()).finish(),
            Self::Material(m) => f.debug_tuple("Material").field(&m.id()).finish(),
            Self::Request(r) => f.debug_tuple("Request").field(r).finish(),
            Self::Payload(_) => f.write_str("Payload(..)"),
        }
    }
}

impl CacheEntry {
    /// Identity of the stored object, for entries that carry one.
    #[must_use]
    pub fn object_id(&self) -> Option<ObjectId> {
        match self {
            Self::Array(a) => Some(a.id()),
            Self::Dataset(d) => Some(d.id()),
            Self::Material(m) => Some(m.id()),
            Self::Request(_) | Self::Payload(_) => None,
        }
    }

    #[must_use]
    pub fn as_array(&self) -> Option<Arc<TypedArray>> {
        match self {
            Self::Array(a) => Some(Arc::clone(a)),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_dataset(&self) -> Option<Arc<Dataset>> {
        match self {
            Self::Dataset(d) => Some(Arc::clone(d)),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_material(&self) -> Option<Arc<Material>> {
        match self {
            Self::Material(m) => Some(Arc::clone(m)),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_request(&self) -> Option<DiscretizationRequest> {
        match self {
            Self::Request(r) => Some(**r),
            _ => None,
        }
    }

    /// Downcasts a payload entry.
    #[must_use]
    pub fn as_payload<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        match self {
            Self::Payload(p) => Arc::clone(p).downcast::<T>().ok(),
            _ => None,
        }
    }

    fn is_mesh_object(&self) -> bool {
        matches!(self, Self::Array(_) | Self::Dataset(_))
    }
}

impl From<Arc<TypedArray>> for CacheEntry {
    fn from(a: Arc<TypedArray>) -> Self {
        Self::Array(a)
    }
}

impl From<Arc<Dataset>> for CacheEntry {
    fn from(d: Arc<Dataset>) -> Self {
        Self::Dataset(d)
    }
}

impl From<Arc<Material>> for CacheEntry {
    fn from(m: Arc<Material>) -> Self {
        Self::Material(m)
    }
}

impl From<DiscretizationRequest> for CacheEntry {
    fn from(r: DiscretizationRequest) -> Self {
        Self::Request(Arc::new(r))
    }
}

/// A derived artifact tagged with the identities it was computed from.
///
/// A lookup only hits while the caller's sources are the recorded ones, so
/// an entry whose inputs were replaced under the same key reads as a miss.
#[derive(Debug)]
pub struct Derived<T> {
    sources: Vec<ObjectId>,
    value: Arc<T>,
}

impl<T> Derived<T> {
    pub fn new(sources: Vec<ObjectId>, value: Arc<T>) -> Self {
        Self { sources, value }
    }

    /// The value, if it was computed from exactly `sources`.
    #[must_use]
    pub fn value_for(&self, sources: &[ObjectId]) -> Option<Arc<T>> {
        (self.sources == sources).then(|| Arc::clone(&self.value))
    }
}

impl<T: Any + Send + Sync> From<Derived<T>> for CacheEntry {
    fn from(d: Derived<T>) -> Self {
        Self::Payload(Arc::new(d))
    }
}

/// Interface of the upstream generic-database cache.
pub trait DatabaseCache {
    /// Reverse lookup of an array or dataset.
    fn object_key(&self, id: ObjectId) -> Option<CacheKey>;

    /// Reverse lookup of any other reference-counted payload, such as a material.
    fn void_ref_key(&self, id: ObjectId) -> Option<CacheKey>;

    /// Forward lookup.
    fn get_object(&self, key: &CacheKey) -> Option<CacheEntry>;

    /// Stores a derived artifact.
    fn put_object(&mut self, key: CacheKey, entry: CacheEntry);
}

/// Key-value artifact store with a reverse identity index.
#[derive(Debug, Default)]
pub struct ArtifactCache {
    entries: HashMap<CacheKey, CacheEntry>,
    /// Object identity -> every key it is stored under, oldest first.
    reverse: HashMap<ObjectId, Vec<CacheKey>>,
}

impl ArtifactCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up an entry. A missing key is not an error.
    #[must_use]
    pub fn get(&self, key: &CacheKey) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    #[must_use]
    pub fn get_array(&self, key: &CacheKey) -> Option<Arc<TypedArray>> {
        self.get(key).and_then(CacheEntry::as_array)
    }

    #[must_use]
    pub fn get_dataset(&self, key: &CacheKey) -> Option<Arc<Dataset>> {
        self.get(key).and_then(CacheEntry::as_dataset)
    }

    #[must_use]
    pub fn get_material(&self, key: &CacheKey) -> Option<Arc<Material>> {
        self.get(key).and_then(CacheEntry::as_material)
    }

    #[must_use]
    pub fn get_request(&self, key: &CacheKey) -> Option<DiscretizationRequest> {
        self.get(key).and_then(CacheEntry::as_request)
    }

    #[must_use]
    pub fn get_payload<T: Any + Send + Sync>(&self, key: &CacheKey) -> Option<Arc<T>> {
        self.get(key).and_then(CacheEntry::as_payload)
    }

    /// A [`Derived`] value stored at `key`, if computed from `sources`.
    #[must_use]
    pub fn get_derived<T: Any + Send + Sync>(
        &self,
        key: &CacheKey,
        sources: &[ObjectId],
    ) -> Option<Arc<T>> {
        self.get_payload::<Derived<T>>(key)
            .and_then(|d| d.value_for(sources))
    }

    /// Stores an entry, returning (and releasing) any previous occupant.
    pub fn put(&mut self, key: CacheKey, entry: impl Into<CacheEntry>) -> Option<CacheEntry> {
        let entry = entry.into();
        if let Some(id) = entry.object_id() {
            self.reverse.entry(id).or_default().push(key.clone());
        }
        let previous = self.entries.insert(key.clone(), entry);
        if let Some(old) = &previous {
            self.unindex(old, &key);
        }
        previous
    }

    /// Removes one entry.
    pub fn remove(&mut self, key: &CacheKey) -> Option<CacheEntry> {
        let removed = self.entries.remove(key)?;
        self.unindex(&removed, key);
        Some(removed)
    }

    fn unindex(&mut self, entry: &CacheEntry, key: &CacheKey) {
        let Some(id) = entry.object_id() else {
            return;
        };
        if let Some(keys) = self.reverse.get_mut(&id) {
            if let Some(pos) = keys.iter().position(|k| k == key) {
                keys.remove(pos);
            }
            if keys.is_empty() {
                self.reverse.remove(&id);
            }
        }
    }

    /// Evicts every entry stored at timestep `ts` and returns how many went.
    ///
    /// Entries at [`PINNED_TIMESTEP`] are only affected by an explicit
    /// `clear_timestep(PINNED_TIMESTEP)`.
    pub fn clear_timestep(&mut self, ts: i32) -> usize {
        let doomed: Vec<CacheKey> = self
            .entries
            .keys()
            .filter(|k| k.timestep == ts)
            .cloned()
            .collect();
        for key in &doomed {
            self.remove(key);
        }
        if !doomed.is_empty() {
            log::debug!("evicted {} cache entries at timestep {ts}", doomed.len());
        }
        doomed.len()
    }

    /// Drops every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.reverse.clear();
    }

    /// First key an object is stored under.
    #[must_use]
    pub fn key_of(&self, id: ObjectId) -> Option<&CacheKey> {
        self.reverse.get(&id).and_then(|keys| keys.first())
    }

    #[must_use]
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries.contains_key(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keys stored at timestep `ts`, sorted.
    #[must_use]
    pub fn keys_for_timestep(&self, ts: i32) -> Vec<&CacheKey> {
        let mut keys: Vec<&CacheKey> = self.entries.keys().filter(|k| k.timestep == ts).collect();
        keys.sort();
        keys
    }
}

impl DatabaseCache for ArtifactCache {
    fn object_key(&self, id: ObjectId) -> Option<CacheKey> {
        let key = self.key_of(id)?;
        self.entries
            .get(key)
            .filter(|e| e.is_mesh_object())
            .map(|_| key.clone())
    }

    fn void_ref_key(&self, id: ObjectId) -> Option<CacheKey> {
        let key = self.key_of(id)?;
        self.entries
            .get(key)
            .filter(|e| !e.is_mesh_object())
            .map(|_| key.clone())
    }

    fn get_object(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.get(key).cloned()
    }

    fn put_object(&mut self, key: CacheKey, entry: CacheEntry) {
        self.put(key, entry);
    }
}
