//! Constructive-solid-geometry mesh description.
//!
//! A [`CsgMesh`] is a set of quadric boundaries, a forest of boolean region
//! expressions over the half-spaces those boundaries define, and a list of
//! zones. Each zone names one top-level region; zone-centered field arrays
//! carry one tuple per zone.

use glam::DVec3;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TransformError};

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: DVec3,
    pub max: DVec3,
}

impl Bounds {
    /// Creates a box from two corners.
    pub fn new(min: DVec3, max: DVec3) -> Self {
        Self { min, max }
    }

    /// Extent along each axis.
    #[must_use]
    pub fn extents(&self) -> DVec3 {
        self.max - self.min
    }

    /// Index of the longest axis. Exact ties resolve to the lowest index.
    #[must_use]
    pub fn longest_axis(&self) -> usize {
        let e = self.extents();
        let mut axis = 0;
        if e.y > e[axis] {
            axis = 1;
        }
        if e.z > e[axis] {
            axis = 2;
        }
        axis
    }

    /// Length of the longest axis.
    #[must_use]
    pub fn longest_extent(&self) -> f64 {
        self.extents()[self.longest_axis()]
    }

    /// Length of the box diagonal.
    #[must_use]
    pub fn diagonal(&self) -> f64 {
        self.extents().length()
    }

    /// Returns true if both corners are finite and ordered.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.min.is_finite() && self.max.is_finite() && self.max.cmpge(self.min).all()
    }
}

/// A quadric surface `f(p) = 0`; the inside half-space is `f(p) < 0`.
///
/// Coefficients are ordered `x², y², z², xy, yz, xz, x, y, z, 1`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quadric {
    coeffs: [f64; 10],
}

impl Quadric {
    /// General quadric from raw coefficients.
    pub fn general(coeffs: [f64; 10]) -> Self {
        Self { coeffs }
    }

    /// Plane `normal · p = offset`; inside is the side the normal points away from.
    pub fn plane(normal: DVec3, offset: f64) -> Self {
        Self::general([
            0.0, 0.0, 0.0, 0.0, 0.0, 0.0, normal.x, normal.y, normal.z, -offset,
        ])
    }

    /// Sphere; inside is the ball.
    pub fn sphere(center: DVec3, radius: f64) -> Self {
        Self::general([
            1.0,
            1.0,
            1.0,
            0.0,
            0.0,
            0.0,
            -2.0 * center.x,
            -2.0 * center.y,
            -2.0 * center.z,
            center.length_squared() - radius * radius,
        ])
    }

    /// Infinite cylinder parallel to `axis` (0, 1 or 2) through `center`.
    pub fn cylinder(axis: usize, center: DVec3, radius: f64) -> Self {
        let mut coeffs = [0.0; 10];
        let mut constant = -radius * radius;
        for a in (0..3).filter(|&a| a != axis) {
            coeffs[a] = 1.0;
            coeffs[6 + a] = -2.0 * center[a];
            constant += center[a] * center[a];
        }
        coeffs[9] = constant;
        Self::general(coeffs)
    }

    /// Raw coefficients.
    #[must_use]
    pub fn coeffs(&self) -> &[f64; 10] {
        &self.coeffs
    }

    /// Evaluates the quadric at `p`.
    #[must_use]
    pub fn evaluate(&self, p: DVec3) -> f64 {
        let c = &self.coeffs;
        c[0] * p.x * p.x
            + c[1] * p.y * p.y
            + c[2] * p.z * p.z
            + c[3] * p.x * p.y
            + c[4] * p.y * p.z
            + c[5] * p.x * p.z
            + c[6] * p.x
            + c[7] * p.y
            + c[8] * p.z
            + c[9]
    }

    /// Returns true if `p` is strictly inside.
    #[must_use]
    pub fn contains(&self, p: DVec3) -> bool {
        self.evaluate(p) < 0.0
    }
}

/// A node in a region expression tree.
///
/// Leaf nodes reference boundaries; interior nodes reference other regions by
/// index. Children always have a smaller index than their parent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegionExpr {
    /// Inside boundary `b`.
    Inner(usize),
    /// Outside boundary `b`.
    Outer(usize),
    Union(usize, usize),
    Intersect(usize, usize),
    /// Inside the first region and not the second.
    Difference(usize, usize),
    Complement(usize),
}

/// A constructive-solid-geometry mesh.
///
/// Deserialization goes through [`CsgMesh::new`], so a decoded mesh has been
/// validated like a constructed one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawCsgMesh")]
pub struct CsgMesh {
    bounds: Bounds,
    boundaries: Vec<Quadric>,
    regions: Vec<RegionExpr>,
    zones: Vec<usize>,
}

/// Unvalidated wire form of a [`CsgMesh`].
#[derive(Deserialize)]
struct RawCsgMesh {
    bounds: Bounds,
    boundaries: Vec<Quadric>,
    regions: Vec<RegionExpr>,
    zones: Vec<usize>,
}

impl TryFrom<RawCsgMesh> for CsgMesh {
    type Error = TransformError;

    fn try_from(raw: RawCsgMesh) -> Result<Self> {
        Self::new(raw.bounds, raw.boundaries, raw.regions, raw.zones)
    }
}

impl CsgMesh {
    /// Creates a CSG mesh, validating every cross reference.
    pub fn new(
        bounds: Bounds,
        boundaries: Vec<Quadric>,
        regions: Vec<RegionExpr>,
        zones: Vec<usize>,
    ) -> Result<Self> {
        for (i, region) in regions.iter().enumerate() {
            let ok = match *region {
                RegionExpr::Inner(b) | RegionExpr::Outer(b) => b < boundaries.len(),
                RegionExpr::Union(l, r)
                | RegionExpr::Intersect(l, r)
                | RegionExpr::Difference(l, r) => l < i && r < i,
                RegionExpr::Complement(c) => c < i,
            };
            if !ok {
                return Err(TransformError::InvalidDataset(format!(
                    "CSG region {i} has a dangling reference"
                )));
            }
        }
        if let Some(&bad) = zones.iter().find(|&&z| z >= regions.len()) {
            return Err(TransformError::InvalidDataset(format!(
                "CSG zone references missing region {bad}"
            )));
        }
        Ok(Self {
            bounds,
            boundaries,
            regions,
            zones,
        })
    }

    #[must_use]
    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    #[must_use]
    pub fn boundaries(&self) -> &[Quadric] {
        &self.boundaries
    }

    #[must_use]
    pub fn regions(&self) -> &[RegionExpr] {
        &self.regions
    }

    #[must_use]
    pub fn zones(&self) -> &[usize] {
        &self.zones
    }

    #[must_use]
    pub fn num_zones(&self) -> usize {
        self.zones.len()
    }

    /// Region expression index of a zone.
    #[must_use]
    pub fn zone_region(&self, zone: usize) -> Option<usize> {
        self.zones.get(zone).copied()
    }

    /// Evaluates region membership given a per-boundary inside test.
    pub fn classify(&self, region: usize, inside: &impl Fn(usize) -> bool) -> bool {
        match self.regions[region] {
            RegionExpr::Inner(b) => inside(b),
            RegionExpr::Outer(b) => !inside(b),
            RegionExpr::Union(l, r) => self.classify(l, inside) || self.classify(r, inside),
            RegionExpr::Intersect(l, r) => self.classify(l, inside) && self.classify(r, inside),
            RegionExpr::Difference(l, r) => self.classify(l, inside) && !self.classify(r, inside),
            RegionExpr::Complement(c) => !self.classify(c, inside),
        }
    }

    /// Returns true if `p` lies inside `region`.
    #[must_use]
    pub fn contains(&self, region: usize, p: DVec3) -> bool {
        self.classify(region, &|b| self.boundaries[b].contains(p))
    }

    /// Signed implicit value of `region` at `p`, negative inside.
    ///
    /// Unions take the minimum, intersections the maximum. The sign agrees
    /// with [`CsgMesh::contains`] away from the boundaries themselves.
    #[must_use]
    pub fn implicit_value(&self, region: usize, p: DVec3) -> f64 {
        match self.regions[region] {
            RegionExpr::Inner(b) => self.boundaries[b].evaluate(p),
            RegionExpr::Outer(b) => -self.boundaries[b].evaluate(p),
            RegionExpr::Union(l, r) => self.implicit_value(l, p).min(self.implicit_value(r, p)),
            RegionExpr::Intersect(l, r) => {
                self.implicit_value(l, p).max(self.implicit_value(r, p))
            }
            RegionExpr::Difference(l, r) => {
                self.implicit_value(l, p).max(-self.implicit_value(r, p))
            }
            RegionExpr::Complement(c) => -self.implicit_value(c, p),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_box() -> Bounds {
        Bounds::new(DVec3::ZERO, DVec3::splat(10.0))
    }

    #[test]
    fn test_deserialize_validates_references() {
        let mesh = CsgMesh::new(
            unit_box(),
            vec![Quadric::sphere(DVec3::splat(5.0), 2.0)],
            vec![RegionExpr::Inner(0)],
            vec![0],
        )
        .unwrap();
        let json = serde_json::to_string(&mesh).unwrap();
        let decoded: CsgMesh = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, mesh);

        let dangling = json.replace(r#"{"Inner":0}"#, r#"{"Inner":3}"#);
        assert_ne!(dangling, json);
        assert!(serde_json::from_str::<CsgMesh>(&dangling).is_err());
    }

    #[test]
    fn test_longest_axis_tie_prefers_lowest() {
        assert_eq!(unit_box().longest_axis(), 0);
        let b = Bounds::new(DVec3::ZERO, DVec3::new(1.0, 5.0, 5.0));
        assert_eq!(b.longest_axis(), 1);
        let b = Bounds::new(DVec3::ZERO, DVec3::new(1.0, 2.0, 7.0));
        assert_eq!(b.longest_axis(), 2);
        assert_eq!(b.longest_extent(), 7.0);
    }

    #[test]
    fn test_sphere_contains() {
        let s = Quadric::sphere(DVec3::splat(5.0), 2.0);
        assert!(s.contains(DVec3::splat(5.0)));
        assert!(!s.contains(DVec3::ZERO));
    }

    #[test]
    fn test_cylinder_ignores_axis() {
        let c = Quadric::cylinder(2, DVec3::new(1.0, 1.0, 0.0), 0.5);
        assert!(c.contains(DVec3::new(1.0, 1.0, 100.0)));
        assert!(!c.contains(DVec3::new(2.0, 1.0, 0.0)));
    }

    #[test]
    fn test_difference_region() {
        let mesh = CsgMesh::new(
            unit_box(),
            vec![
                Quadric::sphere(DVec3::splat(5.0), 4.0),
                Quadric::sphere(DVec3::splat(5.0), 2.0),
            ],
            vec![
                RegionExpr::Inner(0),
                RegionExpr::Inner(1),
                RegionExpr::Difference(0, 1),
            ],
            vec![2],
        )
        .unwrap();
        assert!(!mesh.contains(2, DVec3::splat(5.0)));
        assert!(mesh.contains(2, DVec3::new(5.0, 5.0, 8.0)));
        assert!(mesh.implicit_value(2, DVec3::new(5.0, 5.0, 8.0)) < 0.0);
        assert!(mesh.implicit_value(2, DVec3::splat(5.0)) > 0.0);
    }

    #[test]
    fn test_dangling_references_rejected() {
        let bad_boundary = CsgMesh::new(unit_box(), vec![], vec![RegionExpr::Inner(0)], vec![]);
        assert!(bad_boundary.is_err());
        let forward_ref = CsgMesh::new(
            unit_box(),
            vec![Quadric::sphere(DVec3::ZERO, 1.0)],
            vec![RegionExpr::Complement(1), RegionExpr::Inner(0)],
            vec![],
        );
        assert!(forward_ref.is_err());
        let bad_zone = CsgMesh::new(unit_box(), vec![], vec![], vec![0]);
        assert!(bad_zone.is_err());
    }
}
