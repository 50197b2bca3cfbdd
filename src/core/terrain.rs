use crate::core::geodetic::GeodeticFrame;
use crate::core::intersect::TerrainIntersector;
use crate::types::{BoundingBox, DrapeError, DrapeResult, EcefVector, GeoTransform};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Ray marching parameters for DEM intersection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DemMarchParams {
    /// Distance between surface tests along the ray (meters)
    pub step_m: f64,
    /// Give up beyond this distance from the origin (meters)
    pub max_range_m: f64,
    /// Bisection passes once a crossing is bracketed
    pub refine_iterations: usize,
    /// Geoid undulation N added to every post (meters). SRTM posts are
    /// orthometric heights above EGM96; set this to the local N to
    /// compare them with ellipsoid heights.
    #[serde(default)]
    pub geoid_offset_m: f64,
}

impl Default for DemMarchParams {
    fn default() -> Self {
        Self {
            step_m: 30.0,          // ~1 arc-second SRTM posting
            max_range_m: 100_000.0,
            refine_iterations: 24, // 30 m / 2^24 is well below a millimeter
            geoid_offset_m: 0.0,
        }
    }
}

/// Terrain surface backed by a geographic height grid.
///
/// Grid values plus [`DemMarchParams::geoid_offset_m`] are treated as
/// heights above the WGS84 ellipsoid. Geoid-referenced grids such as SRTM
/// sit up to tens of meters off the ellipsoid unless that offset is set;
/// a single constant only corrects a small area.
#[derive(Debug, Clone)]
pub struct DemTerrain {
    heights: Array2<f32>,
    transform: GeoTransform,
    nodata: f32,
    params: DemMarchParams,
    max_height: f64,
}

impl DemTerrain {
    pub fn new(heights: Array2<f32>, transform: GeoTransform, nodata: f32) -> DrapeResult<Self> {
        Self::with_params(heights, transform, nodata, DemMarchParams::default())
    }

    pub fn with_params(
        heights: Array2<f32>,
        transform: GeoTransform,
        nodata: f32,
        params: DemMarchParams,
    ) -> DrapeResult<Self> {
        let (rows, cols) = heights.dim();
        if rows < 2 || cols < 2 {
            return Err(DrapeError::InvalidFormat(format!(
                "DEM must be at least 2x2, got {}x{}",
                rows, cols
            )));
        }
        if transform.pixel_width == 0.0 || transform.pixel_height == 0.0 {
            return Err(DrapeError::InvalidFormat(
                "DEM geotransform has zero pixel size".to_string(),
            ));
        }
        if !(params.step_m > 0.0) || !(params.max_range_m > 0.0) {
            return Err(DrapeError::InvalidFormat(
                "DEM march step and range must be positive".to_string(),
            ));
        }

        let max_height = heights
            .iter()
            .filter(|&&h| h != nodata && h.is_finite())
            .fold(f32::NEG_INFINITY, |a, &b| a.max(b));
        if !max_height.is_finite() {
            return Err(DrapeError::InvalidFormat(
                "DEM contains no valid elevations".to_string(),
            ));
        }

        let max_height = max_height as f64 + params.geoid_offset_m;

        log::debug!(
            "DEM terrain {}x{} cells, max height {:.1} m",
            rows, cols, max_height
        );

        Ok(Self {
            heights,
            transform,
            nodata,
            params,
            max_height,
        })
    }

    pub fn dim(&self) -> (usize, usize) {
        self.heights.dim()
    }

    pub fn bounds(&self) -> BoundingBox {
        let (rows, cols) = self.heights.dim();
        let lon_a = self.transform.top_left_x;
        let lon_b = lon_a + (cols - 1) as f64 * self.transform.pixel_width;
        let lat_a = self.transform.top_left_y;
        let lat_b = lat_a + (rows - 1) as f64 * self.transform.pixel_height;
        BoundingBox {
            min_lon: lon_a.min(lon_b),
            max_lon: lon_a.max(lon_b),
            min_lat: lat_a.min(lat_b),
            max_lat: lat_a.max(lat_b),
        }
    }

    /// Bilinearly interpolated height at lat/lon, `None` outside the grid or on no-data
    pub fn elevation_at(&self, lat: f64, lon: f64) -> Option<f64> {
        let (rows, cols) = self.heights.dim();
        let col = (lon - self.transform.top_left_x) / self.transform.pixel_width;
        let row = (lat - self.transform.top_left_y) / self.transform.pixel_height;

        if !(col >= 0.0 && row >= 0.0 && col <= (cols - 1) as f64 && row <= (rows - 1) as f64) {
            return None;
        }

        let x1 = (col.floor() as usize).min(cols - 2);
        let y1 = (row.floor() as usize).min(rows - 2);
        let x2 = x1 + 1;
        let y2 = y1 + 1;

        let dx = col - x1 as f64;
        let dy = row - y1 as f64;

        let v11 = self.heights[[y1, x1]];
        let v12 = self.heights[[y2, x1]];
        let v21 = self.heights[[y1, x2]];
        let v22 = self.heights[[y2, x2]];

        if [v11, v12, v21, v22].iter().any(|&v| v == self.nodata || !v.is_finite()) {
            return None;
        }

        let (v11, v12, v21, v22) = (v11 as f64, v12 as f64, v21 as f64, v22 as f64);
        Some(
            v11 * (1.0 - dx) * (1.0 - dy)
                + v21 * dx * (1.0 - dy)
                + v12 * (1.0 - dx) * dy
                + v22 * dx * dy
                + self.params.geoid_offset_m,
        )
    }

    /// Ellipsoid height of a point and its clearance above the terrain
    /// (`None` where the DEM has no value)
    fn sample(&self, point: &EcefVector) -> (f64, Option<f64>) {
        let geo = GeodeticFrame::ecef_vector_to_geodetic(point);
        let clearance = self
            .elevation_at(geo.latitude, geo.longitude)
            .map(|ground| geo.height - ground);
        (geo.height, clearance)
    }

    fn clearance(&self, point: &EcefVector) -> Option<f64> {
        self.sample(point).1
    }

    /// Bisect a bracketed crossing between ray parameters `lo` (above) and `hi` (below)
    fn refine(&self, origin: &EcefVector, direction: &EcefVector, mut lo: f64, mut hi: f64) -> f64 {
        for _ in 0..self.params.refine_iterations {
            let mid = 0.5 * (lo + hi);
            match self.clearance(&(origin + direction * mid)) {
                Some(c) if c > 0.0 => lo = mid,
                Some(_) => hi = mid,
                None => break,
            }
        }
        hi
    }
}

impl TerrainIntersector for DemTerrain {
    fn intersect(&self, origin: &EcefVector, direction: &EcefVector) -> Option<EcefVector> {
        let direction = direction.try_normalize(0.0)?;

        let (mut height, mut prev) = self.sample(origin);
        if matches!(prev, Some(c) if c <= 0.0) {
            return Some(*origin);
        }

        let mut t = 0.0;
        loop {
            // no post is higher than max_height and a unit step drops at most
            // one meter, so the gap above the ceiling can be skipped in one go
            let advance = self.params.step_m.max(height - self.max_height);
            let t_next = t + advance;
            if t_next > self.params.max_range_m {
                return None;
            }

            let point = origin + direction * t_next;
            let (next_height, current) = self.sample(&point);

            match (prev, current) {
                (Some(above), Some(below)) if above > 0.0 && below <= 0.0 => {
                    let hit = self.refine(origin, &direction, t, t_next);
                    return Some(origin + direction * hit);
                }
                (None, Some(below)) if below <= 0.0 => {
                    // entered the grid already under the surface
                    return Some(point);
                }
                _ => {}
            }

            t = t_next;
            height = next_height;
            prev = current;
        }
    }
}
