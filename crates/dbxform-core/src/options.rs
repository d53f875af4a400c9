//! Pipeline configuration and per-request options.

use serde::{Deserialize, Serialize};

use crate::element::ElementType;

/// Preferred precision for coordinate and field arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum PrecisionMode {
    /// Keep whatever the reader produced.
    #[default]
    Native,
    /// Demote wider types to `float32`.
    Float,
    /// Promote narrower types to `float64`.
    Double,
}

/// Position of this process within a distributed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParallelContext {
    pub rank: usize,
    pub size: usize,
}

impl Default for ParallelContext {
    fn default() -> Self {
        Self { rank: 0, size: 1 }
    }
}

impl ParallelContext {
    /// Creates a context, clamping `size` to at least one and `rank` into range.
    pub fn new(rank: usize, size: usize) -> Self {
        let size = size.max(1);
        Self {
            rank: rank.min(size - 1),
            size,
        }
    }
}

/// Settings shared by every transform performed by one manager.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Global precision preference.
    #[serde(default)]
    pub precision: PrecisionMode,

    /// Whether to merge coincident points of disconnected unstructured grids.
    #[serde(default)]
    pub remove_duplicate_nodes: bool,

    /// Rank and process count; a lone process is rank 0 of 1.
    #[serde(default)]
    pub parallel: ParallelContext,
}

impl PipelineConfig {
    /// Loads a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Strategy used to discretize a CSG region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum DiscretizationMode {
    #[default]
    Uniform,
    Adaptive,
    MultiPass,
}

/// Parameters controlling CSG discretization.
///
/// Two requests share cached results only if every field is equal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DiscretizationRequest {
    /// Extract only the boundary surface, with no interior cells.
    pub boundary_only: bool,
    /// Cell size as a fraction of the longest bounding-box extent.
    pub tolerance: f64,
    /// Flatness tolerance for adaptive subdivision.
    pub flat_tolerance: f64,
    pub mode: DiscretizationMode,
}

impl Default for DiscretizationRequest {
    fn default() -> Self {
        Self {
            boundary_only: false,
            tolerance: 0.01,
            flat_tolerance: 0.01,
            mode: DiscretizationMode::Uniform,
        }
    }
}

impl DiscretizationRequest {
    /// Returns true if cached results for `other` may be reused for `self`.
    #[must_use]
    pub fn is_compatible(&self, other: &DiscretizationRequest) -> bool {
        self == other
    }
}

/// Element types a downstream stage can consume. Empty means "any".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdmissibleTypes(Vec<ElementType>);

impl AdmissibleTypes {
    /// Accepts every element type.
    pub fn any() -> Self {
        Self(Vec::new())
    }

    /// Accepts only the listed types.
    pub fn only(types: &[ElementType]) -> Self {
        Self(types.to_vec())
    }

    #[must_use]
    pub fn allows(&self, t: ElementType) -> bool {
        self.0.is_empty() || self.0.contains(&t)
    }
}

/// What the downstream pipeline asked for.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataRequest {
    /// Primary variable name.
    pub variable: String,
    #[serde(default)]
    pub admissible_types: AdmissibleTypes,
    /// The consumer needs values exactly as stored.
    #[serde(default)]
    pub needs_native_precision: bool,
    #[serde(default)]
    pub discretization: DiscretizationRequest,
}

impl DataRequest {
    pub fn new(variable: impl Into<String>) -> Self {
        Self {
            variable: variable.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_admissible_types(mut self, types: AdmissibleTypes) -> Self {
        self.admissible_types = types;
        self
    }

    #[must_use]
    pub fn with_discretization(mut self, discretization: DiscretizationRequest) -> Self {
        self.discretization = discretization;
        self
    }

    #[must_use]
    pub fn with_native_precision(mut self, needs_native: bool) -> Self {
        self.needs_native_precision = needs_native;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults_from_json() {
        let config = PipelineConfig::from_json("{}").unwrap();
        assert_eq!(config, PipelineConfig::default());
        assert_eq!(config.parallel, ParallelContext { rank: 0, size: 1 });

        let config =
            PipelineConfig::from_json(r#"{"precision":"Double","remove_duplicate_nodes":true}"#)
                .unwrap();
        assert_eq!(config.precision, PrecisionMode::Double);
        assert!(config.remove_duplicate_nodes);
    }

    #[test]
    fn test_bad_json() {
        assert!(matches!(
            PipelineConfig::from_json("{"),
            Err(crate::TransformError::Json(_))
        ));
    }

    #[test]
    fn test_parallel_clamps() {
        assert_eq!(ParallelContext::new(5, 0), ParallelContext { rank: 0, size: 1 });
        assert_eq!(ParallelContext::new(5, 4), ParallelContext { rank: 3, size: 4 });
    }

    #[test]
    fn test_admissible() {
        assert!(AdmissibleTypes::any().allows(ElementType::Int8));
        let only = AdmissibleTypes::only(&[ElementType::Float32]);
        assert!(only.allows(ElementType::Float32));
        assert!(!only.allows(ElementType::Float64));
    }

    #[test]
    fn test_request_compatibility() {
        let base = DiscretizationRequest::default();
        assert!(base.is_compatible(&base));
        let variants = [
            DiscretizationRequest { boundary_only: true, ..base },
            DiscretizationRequest { tolerance: 0.02, ..base },
            DiscretizationRequest { flat_tolerance: 0.5, ..base },
            DiscretizationRequest { mode: DiscretizationMode::Adaptive, ..base },
        ];
        for v in variants {
            assert!(!base.is_compatible(&v));
        }
    }
}
