use nalgebra::{Matrix3, Vector3};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Earth-centered, earth-fixed position or direction in meters
pub type EcefVector = Vector3<f64>;

/// Row-major 3x3 matrix used for rotations, bases and homographies
pub type Mat3 = Matrix3<f64>;

/// RGBA pixel (straight alpha)
pub type Rgba = [u8; 4];

/// 2D RGBA raster (rows x columns)
pub type Raster = Array2<Rgba>;

/// Planar point in raster pixel coordinates (x right, y down)
pub type PixelPoint = [f64; 2];

/// Four ordered planar points: top-left, top-right, bottom-right, bottom-left
pub type Quad = [PixelPoint; 4];

/// Fully transparent black
pub const TRANSPARENT: Rgba = [0, 0, 0, 0];

/// Geodetic position on the reference ellipsoid
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeodeticCoordinate {
    pub latitude: f64,  // degrees
    pub longitude: f64, // degrees
    pub height: f64,    // meters above ellipsoid
}

impl GeodeticCoordinate {
    pub fn new(latitude: f64, longitude: f64, height: f64) -> Self {
        Self {
            latitude,
            longitude,
            height,
        }
    }
}

/// Geospatial bounding box
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub max_lon: f64,
    pub min_lat: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    /// Smallest box enclosing all coordinates, `None` for an empty slice
    pub fn enclosing(points: &[GeodeticCoordinate]) -> Option<Self> {
        let first = points.first()?;
        let mut bbox = BoundingBox {
            min_lon: first.longitude,
            max_lon: first.longitude,
            min_lat: first.latitude,
            max_lat: first.latitude,
        };
        for p in &points[1..] {
            bbox.min_lon = bbox.min_lon.min(p.longitude);
            bbox.max_lon = bbox.max_lon.max(p.longitude);
            bbox.min_lat = bbox.min_lat.min(p.latitude);
            bbox.max_lat = bbox.max_lat.max(p.latitude);
        }
        Some(bbox)
    }

    pub fn contains(&self, latitude: f64, longitude: f64) -> bool {
        latitude >= self.min_lat
            && latitude <= self.max_lat
            && longitude >= self.min_lon
            && longitude <= self.max_lon
    }
}

/// Affine raster georeferencing (GDAL ordering)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub top_left_x: f64,
    pub pixel_width: f64,
    pub rotation_x: f64,
    pub top_left_y: f64,
    pub rotation_y: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    /// North-up grid with the given top-left corner and square cell size in degrees
    pub fn north_up(top_left_lon: f64, top_left_lat: f64, cell_size_deg: f64) -> Self {
        Self {
            top_left_x: top_left_lon,
            pixel_width: cell_size_deg,
            rotation_x: 0.0,
            top_left_y: top_left_lat,
            rotation_y: 0.0,
            pixel_height: -cell_size_deg,
        }
    }
}

/// Error types for footprint and warp processing
#[derive(Debug, thiserror::Error)]
pub enum DrapeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Singular matrix: pivot {pivot:e} below epsilon {epsilon:e}")]
    SingularMatrix { pivot: f64, epsilon: f64 },

    #[error("Degenerate quadrilateral: {0}")]
    DegenerateQuad(String),

    #[error("Invalid metadata record: {0}")]
    InvalidRecord(String),

    #[error("Timestamp {timestamp} is not after last stored timestamp {last}")]
    OutOfOrder { timestamp: f64, last: f64 },

    #[error("Invalid data format: {0}")]
    InvalidFormat(String),

    #[error("Processing error: {0}")]
    Processing(String),
}

/// Result type for drape operations
pub type DrapeResult<T> = Result<T, DrapeError>;
