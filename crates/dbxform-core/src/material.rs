//! Per-zone material assignment.

use crate::error::{Result, TransformError};
use crate::id::ObjectId;

/// Material content of one zone.
#[derive(Debug, Clone, PartialEq)]
pub enum ZoneMaterial {
    /// The zone is made of a single material.
    Clean(usize),
    /// The zone mixes several materials; `(material, volume fraction)` pairs.
    Mixed(Vec<(usize, f32)>),
}

/// Material assignment over the zones of one domain.
#[derive(Debug, Clone)]
pub struct Material {
    id: ObjectId,
    material_names: Vec<String>,
    zones: Vec<ZoneMaterial>,
}

impl Material {
    /// Creates a material, checking every material number is in range.
    pub fn new(material_names: Vec<String>, zones: Vec<ZoneMaterial>) -> Result<Self> {
        let n = material_names.len();
        for zone in &zones {
            let bad = match zone {
                ZoneMaterial::Clean(m) => (*m >= n).then_some(*m),
                ZoneMaterial::Mixed(parts) => parts.iter().map(|p| p.0).find(|&m| m >= n),
            };
            if let Some(m) = bad {
                return Err(TransformError::IndexOutOfRange { index: m, len: n });
            }
        }
        Ok(Self {
            id: ObjectId::next(),
            material_names,
            zones,
        })
    }

    #[must_use]
    pub fn id(&self) -> ObjectId {
        self.id
    }

    #[must_use]
    pub fn material_names(&self) -> &[String] {
        &self.material_names
    }

    #[must_use]
    pub fn zones(&self) -> &[ZoneMaterial] {
        &self.zones
    }

    #[must_use]
    pub fn num_zones(&self) -> usize {
        self.zones.len()
    }

    /// Builds a material with one zone per index, copying `zones[indices[i]]`.
    pub fn gather(&self, indices: &[usize]) -> Result<Self> {
        let zones = indices
            .iter()
            .map(|&i| {
                self.zones
                    .get(i)
                    .cloned()
                    .ok_or(TransformError::IndexOutOfRange {
                        index: i,
                        len: self.zones.len(),
                    })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            id: ObjectId::next(),
            material_names: self.material_names.clone(),
            zones,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names() -> Vec<String> {
        vec!["steel".to_string(), "air".to_string()]
    }

    #[test]
    fn test_out_of_range_material() {
        let err = Material::new(names(), vec![ZoneMaterial::Clean(2)]);
        assert!(matches!(err, Err(TransformError::IndexOutOfRange { index: 2, len: 2 })));
    }

    #[test]
    fn test_gather() {
        let mat = Material::new(
            names(),
            vec![
                ZoneMaterial::Clean(0),
                ZoneMaterial::Mixed(vec![(0, 0.25), (1, 0.75)]),
            ],
        )
        .unwrap();
        let out = mat.gather(&[1, 1, 0]).unwrap();
        assert_eq!(out.num_zones(), 3);
        assert_eq!(out.zones()[0], mat.zones()[1]);
        assert_eq!(out.zones()[2], ZoneMaterial::Clean(0));
        assert_ne!(out.id(), mat.id());
        assert!(mat.gather(&[5]).is_err());
    }
}
