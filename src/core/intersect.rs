use crate::core::geodetic::{GeodeticFrame, WGS84_A, WGS84_B};
use crate::types::{EcefVector, GeodeticCoordinate};

/// Smallest accepted ray parameter (meters along a unit direction)
const MIN_RAY_PARAMETER: f64 = 1e-6;

/// Resolves a world-space ray to the first surface point it hits
pub trait TerrainIntersector {
    /// `direction` is a unit ECEF vector; returns the ECEF hit point
    fn intersect(&self, origin: &EcefVector, direction: &EcefVector) -> Option<EcefVector>;
}

/// Ray parameter of the near intersection with the WGS84 ellipsoid.
///
/// Substitutes `origin + t * direction` into x²/a² + y²/a² + z²/b² = 1 and
/// takes the smaller root when it lies ahead of the origin, otherwise the
/// larger one (origin below the surface).
pub fn ellipsoid_ray_parameter(origin: &EcefVector, direction: &EcefVector) -> Option<f64> {
    let a2 = WGS84_A * WGS84_A;
    let b2 = WGS84_B * WGS84_B;
    let (x0, y0, z0) = (origin.x, origin.y, origin.z);
    let (dx, dy, dz) = (direction.x, direction.y, direction.z);

    let qa = (dx * dx + dy * dy) / a2 + (dz * dz) / b2;
    let qb = 2.0 * ((x0 * dx + y0 * dy) / a2 + (z0 * dz) / b2);
    let qc = (x0 * x0 + y0 * y0) / a2 + (z0 * z0) / b2 - 1.0;

    if qa <= 0.0 {
        return None;
    }

    let disc = qb * qb - 4.0 * qa * qc;
    if disc < 0.0 {
        return None;
    }

    let sqrt_disc = disc.sqrt();
    let near = (-qb - sqrt_disc) / (2.0 * qa);
    if near > MIN_RAY_PARAMETER {
        return Some(near);
    }
    let far = (-qb + sqrt_disc) / (2.0 * qa);
    if far > MIN_RAY_PARAMETER {
        return Some(far);
    }
    None
}

/// Intersect a ray with the WGS84 ellipsoid, `None` on a miss
pub fn intersect_ellipsoid(origin: &EcefVector, direction: &EcefVector) -> Option<GeodeticCoordinate> {
    EllipsoidIntersector
        .intersect(origin, direction)
        .map(|p| GeodeticFrame::ecef_vector_to_geodetic(&p))
}

/// Closed-form intersection with the bare WGS84 ellipsoid
#[derive(Debug, Clone, Copy, Default)]
pub struct EllipsoidIntersector;

impl TerrainIntersector for EllipsoidIntersector {
    fn intersect(&self, origin: &EcefVector, direction: &EcefVector) -> Option<EcefVector> {
        let norm = direction.norm();
        if !norm.is_finite() || norm == 0.0 {
            return None;
        }
        let unit = direction / norm;
        ellipsoid_ray_parameter(origin, &unit).map(|t| origin + unit * t)
    }
}

/// Tries a terrain surface first and falls back to the ellipsoid
pub struct FallbackIntersector<T> {
    terrain: Option<T>,
    fallback: EllipsoidIntersector,
}

impl<T: TerrainIntersector> FallbackIntersector<T> {
    pub fn new(terrain: Option<T>) -> Self {
        Self {
            terrain,
            fallback: EllipsoidIntersector,
        }
    }

    pub fn ellipsoid_only() -> Self {
        Self::new(None)
    }

    pub fn terrain(&self) -> Option<&T> {
        self.terrain.as_ref()
    }
}

impl<T: TerrainIntersector> TerrainIntersector for FallbackIntersector<T> {
    fn intersect(&self, origin: &EcefVector, direction: &EcefVector) -> Option<EcefVector> {
        if let Some(terrain) = &self.terrain {
            if let Some(hit) = terrain.intersect(origin, direction) {
                return Some(hit);
            }
            log::debug!("Terrain query missed, falling back to ellipsoid");
        }
        self.fallback.intersect(origin, direction)
    }
}

impl<T: TerrainIntersector + ?Sized> TerrainIntersector for &T {
    fn intersect(&self, origin: &EcefVector, direction: &EcefVector) -> Option<EcefVector> {
        (**self).intersect(origin, direction)
    }
}

impl<T: TerrainIntersector + ?Sized> TerrainIntersector for Box<T> {
    fn intersect(&self, origin: &EcefVector, direction: &EcefVector) -> Option<EcefVector> {
        (**self).intersect(origin, direction)
    }
}
