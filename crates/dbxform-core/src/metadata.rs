//! Database metadata: what meshes and variables exist and how they relate.

use serde::{Deserialize, Serialize};

/// Classification of a mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum MeshType {
    #[default]
    Unstructured,
    Rectilinear,
    Curvilinear,
    Surface,
    /// Points only, topological dimension 0.
    PointMesh,
    /// Constructive solid geometry; must be discretized before use.
    Csg,
}

/// Classification of a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VarKind {
    Mesh,
    Scalar,
    Vector,
    Material,
    Species,
    Curve,
    Unknown,
}

/// How a scalar encodes enumerated values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum EnumKind {
    #[default]
    None,
    ByValue,
    /// Each bit flags one enumerant; used for bitmask material encodings.
    ByBitmask,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeshMetadata {
    pub name: String,
    pub mesh_type: MeshType,
    pub topological_dimension: u8,
    /// Set when ghost zones were synthesized rather than read from the data.
    #[serde(default)]
    pub ghost_zones_created: bool,
    /// Per-domain `(csg block, region)` pairs for CSG meshes. When empty a
    /// domain maps to region `domain` of block 0.
    #[serde(default)]
    pub csg_domains: Vec<(usize, usize)>,
}

impl MeshMetadata {
    pub fn new(name: impl Into<String>, mesh_type: MeshType, topological_dimension: u8) -> Self {
        Self {
            name: name.into(),
            mesh_type,
            topological_dimension,
            ghost_zones_created: false,
            csg_domains: Vec::new(),
        }
    }
}

/// A variable defined on a mesh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarMetadata {
    pub name: String,
    pub mesh_name: String,
    pub kind: VarKind,
    #[serde(default)]
    pub enum_kind: EnumKind,
}

/// A declared curve and the variable it is sampled from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurveMetadata {
    pub name: String,
    pub source_var: Option<String>,
}

/// Everything the transform stages need to know about a database.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseMetadata {
    meshes: Vec<MeshMetadata>,
    vars: Vec<VarMetadata>,
    curves: Vec<CurveMetadata>,
}

impl DatabaseMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_mesh(&mut self, mesh: MeshMetadata) -> &mut Self {
        self.meshes.push(mesh);
        self
    }

    pub fn add_var(&mut self, name: &str, mesh_name: &str, kind: VarKind) -> &mut Self {
        self.vars.push(VarMetadata {
            name: name.to_string(),
            mesh_name: mesh_name.to_string(),
            kind,
            enum_kind: EnumKind::None,
        });
        self
    }

    pub fn add_enum_scalar(&mut self, name: &str, mesh_name: &str, enum_kind: EnumKind) -> &mut Self {
        self.vars.push(VarMetadata {
            name: name.to_string(),
            mesh_name: mesh_name.to_string(),
            kind: VarKind::Scalar,
            enum_kind,
        });
        self
    }

    pub fn add_curve(&mut self, name: &str, source_var: Option<&str>) -> &mut Self {
        self.curves.push(CurveMetadata {
            name: name.to_string(),
            source_var: source_var.map(str::to_string),
        });
        self
    }

    #[must_use]
    pub fn mesh(&self, name: &str) -> Option<&MeshMetadata> {
        self.meshes.iter().find(|m| m.name == name)
    }

    pub fn mesh_mut(&mut self, name: &str) -> Option<&mut MeshMetadata> {
        self.meshes.iter_mut().find(|m| m.name == name)
    }

    #[must_use]
    pub fn var(&self, name: &str) -> Option<&VarMetadata> {
        self.vars.iter().find(|v| v.name == name)
    }

    /// Name of the mesh a variable lives on; a mesh name maps to itself.
    #[must_use]
    pub fn mesh_name_for_var<'a>(&'a self, var: &'a str) -> Option<&'a str> {
        if self.mesh(var).is_some() {
            return Some(var);
        }
        self.var(var).map(|v| v.mesh_name.as_str())
    }

    /// Metadata of the mesh a variable lives on.
    #[must_use]
    pub fn mesh_for_var(&self, var: &str) -> Option<&MeshMetadata> {
        self.mesh_name_for_var(var).and_then(|m| self.mesh(m))
    }

    /// Classification of a variable by name.
    #[must_use]
    pub fn var_kind(&self, var: &str) -> VarKind {
        if self.mesh(var).is_some() {
            return VarKind::Mesh;
        }
        if self.curves.iter().any(|c| c.name == var) {
            return VarKind::Curve;
        }
        self.var(var).map_or(VarKind::Unknown, |v| v.kind)
    }

    /// Enumeration encoding of a scalar.
    #[must_use]
    pub fn enum_kind(&self, var: &str) -> EnumKind {
        self.var(var).map_or(EnumKind::None, |v| v.enum_kind)
    }

    /// Maps a domain of a CSG mesh to its `(csg block, region)` pair.
    #[must_use]
    pub fn convert_csg_domain(&self, mesh_name: &str, domain: usize) -> Option<(usize, usize)> {
        let mesh = self.mesh(mesh_name)?;
        if mesh.csg_domains.is_empty() {
            return Some((0, domain));
        }
        mesh.csg_domains.get(domain).copied()
    }

    /// Records that ghost zones on `mesh_name` were synthesized.
    pub fn set_ghost_zones_created(&mut self, mesh_name: &str) {
        if let Some(mesh) = self.mesh_mut(mesh_name) {
            mesh.ghost_zones_created = true;
        }
    }

    /// Reclassifies a mesh as a point mesh of topological dimension zero.
    pub fn set_point_mesh(&mut self, mesh_name: &str) {
        if let Some(mesh) = self.mesh_mut(mesh_name) {
            mesh.mesh_type = MeshType::PointMesh;
            mesh.topological_dimension = 0;
        }
    }

    #[must_use]
    pub fn curves(&self) -> &[CurveMetadata] {
        &self.curves
    }

    /// Loads metadata from JSON.
    pub fn from_json(json: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
