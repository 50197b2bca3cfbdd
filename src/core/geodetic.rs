use crate::types::{EcefVector, GeodeticCoordinate, Mat3};

/// WGS84 semi-major axis (meters)
pub const WGS84_A: f64 = 6_378_137.0;
/// WGS84 flattening
pub const WGS84_F: f64 = 1.0 / 298.257_223_563;
/// WGS84 semi-minor axis (meters)
pub const WGS84_B: f64 = WGS84_A * (1.0 - WGS84_F);
/// WGS84 first eccentricity squared
pub const WGS84_E2: f64 = WGS84_F * (2.0 - WGS84_F);

/// Latitude refinement passes in [`GeodeticFrame::ecef_to_geodetic`]
const ECEF_TO_GEODETIC_ITERATIONS: usize = 10;

/// Conversions between geodetic and earth-centered coordinates on WGS84
pub struct GeodeticFrame;

impl GeodeticFrame {
    /// Prime-vertical radius of curvature at a geodetic latitude (radians)
    pub fn prime_vertical_radius(lat_rad: f64) -> f64 {
        WGS84_A / (1.0 - WGS84_E2 * lat_rad.sin().powi(2)).sqrt()
    }

    /// Convert lat/lon (degrees) and ellipsoid height (meters) to ECEF
    pub fn geodetic_to_ecef(lat: f64, lon: f64, height: f64) -> EcefVector {
        let lat_rad = lat.to_radians();
        let lon_rad = lon.to_radians();
        let n = Self::prime_vertical_radius(lat_rad);

        EcefVector::new(
            (n + height) * lat_rad.cos() * lon_rad.cos(),
            (n + height) * lat_rad.cos() * lon_rad.sin(),
            (n * (1.0 - WGS84_E2) + height) * lat_rad.sin(),
        )
    }

    pub fn coordinate_to_ecef(coordinate: &GeodeticCoordinate) -> EcefVector {
        Self::geodetic_to_ecef(coordinate.latitude, coordinate.longitude, coordinate.height)
    }

    /// Convert ECEF to geodetic coordinates.
    ///
    /// Bowring-style fixed-point refinement with a fixed pass count and no
    /// convergence test; ten passes settle below a millimeter for terrestrial
    /// and airborne heights. Above 45° the height is taken from `z`, which
    /// stays finite on the polar axis where `p` is zero.
    pub fn ecef_to_geodetic(x: f64, y: f64, z: f64) -> GeodeticCoordinate {
        let lon = y.atan2(x);
        let p = x.hypot(y);
        let mut lat = z.atan2(p * (1.0 - WGS84_E2));
        let mut height = 0.0;

        for _ in 0..ECEF_TO_GEODETIC_ITERATIONS {
            let n = Self::prime_vertical_radius(lat);
            height = if lat.abs() > std::f64::consts::FRAC_PI_4 {
                z / lat.sin() - n * (1.0 - WGS84_E2)
            } else {
                p / lat.cos() - n
            };
            lat = z.atan2(p * (1.0 - WGS84_E2 * n / (n + height)));
        }

        GeodeticCoordinate {
            latitude: lat.to_degrees(),
            longitude: lon.to_degrees(),
            height,
        }
    }

    pub fn ecef_vector_to_geodetic(point: &EcefVector) -> GeodeticCoordinate {
        Self::ecef_to_geodetic(point.x, point.y, point.z)
    }

    /// ENU -> ECEF rotation at a geodetic point.
    ///
    /// Columns are the east, north and up unit vectors expressed in ECEF, so
    /// `basis * enu` yields an ECEF direction and `basis.transpose() * ecef`
    /// the local tangent-plane components.
    pub fn east_north_up_basis(lat: f64, lon: f64) -> Mat3 {
        let (sin_lat, cos_lat) = lat.to_radians().sin_cos();
        let (sin_lon, cos_lon) = lon.to_radians().sin_cos();

        Mat3::new(
            -sin_lon, -sin_lat * cos_lon, cos_lat * cos_lon,
            cos_lon, -sin_lat * sin_lon, cos_lat * sin_lon,
            0.0, cos_lat, sin_lat,
        )
    }

    /// Straight-line ECEF distance between two geodetic points (meters)
    pub fn ecef_distance(a: &GeodeticCoordinate, b: &GeodeticCoordinate) -> f64 {
        (Self::coordinate_to_ecef(a) - Self::coordinate_to_ecef(b)).norm()
    }
}
