use crate::core::geodetic::GeodeticFrame;
use crate::core::intersect::{EllipsoidIntersector, TerrainIntersector};
use crate::core::orientation::{CalibrationOffset, OrientationComposer, OrientationConvention};
use crate::io::telemetry::{MetadataFrame, TelemetryField};
use crate::types::{BoundingBox, EcefVector, GeodeticCoordinate, Quad};
use serde::{Deserialize, Serialize};

/// Platform attitude, gimbal angles, field of view and position (degrees, meters)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorState {
    pub platform_heading: f64,
    pub platform_pitch: f64,
    pub platform_roll: f64,
    pub sensor_azimuth: f64,
    pub sensor_elevation: f64,
    pub sensor_roll: f64,
    pub horizontal_fov: f64,
    pub vertical_fov: f64,
    pub position: GeodeticCoordinate,
}

impl SensorState {
    /// Read the sensor model fields from a telemetry frame (absent fields are 0)
    pub fn from_frame(frame: &MetadataFrame) -> Self {
        Self {
            platform_heading: frame.get(TelemetryField::PlatformHeadingAngle),
            platform_pitch: frame.get(TelemetryField::PlatformPitchAngle),
            platform_roll: frame.get(TelemetryField::PlatformRollAngle),
            sensor_azimuth: frame.get(TelemetryField::SensorRelativeAzimuthAngle),
            sensor_elevation: frame.get(TelemetryField::SensorRelativeElevationAngle),
            sensor_roll: frame.get(TelemetryField::SensorRelativeRollAngle),
            horizontal_fov: frame.get(TelemetryField::SensorHorizontalFieldOfView),
            vertical_fov: frame.get(TelemetryField::SensorVerticalFieldOfView),
            position: frame.sensor_position(),
        }
    }
}

/// Image corner, in footprint order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Corner {
    TopLeft,
    TopRight,
    BottomRight,
    BottomLeft,
}

impl Corner {
    pub const ALL: [Corner; 4] = [
        Corner::TopLeft,
        Corner::TopRight,
        Corner::BottomRight,
        Corner::BottomLeft,
    ];

    /// (azimuth, elevation) offset from boresight for the given half angles
    pub fn offset(&self, half_h: f64, half_v: f64) -> (f64, f64) {
        match self {
            Corner::TopLeft => (-half_h, half_v),
            Corner::TopRight => (half_h, half_v),
            Corner::BottomRight => (half_h, -half_v),
            Corner::BottomLeft => (-half_h, -half_v),
        }
    }
}

/// Sensor model configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FootprintParams {
    pub convention: OrientationConvention,
    pub calibration: CalibrationOffset,
}

/// Ground quadrilateral seen by the sensor for one telemetry frame
#[derive(Debug, Clone, PartialEq)]
pub struct Footprint {
    pub sensor_position: EcefVector,
    /// Top-left, top-right, bottom-right, bottom-left
    pub corners: [EcefVector; 4],
    pub coordinates: [GeodeticCoordinate; 4],
    /// Boresight ground point, if the boresight ray hit
    pub frame_center: Option<GeodeticCoordinate>,
}

impl Footprint {
    pub fn corner(&self, corner: Corner) -> &GeodeticCoordinate {
        &self.coordinates[corner as usize]
    }

    pub fn bounds(&self) -> BoundingBox {
        let b = &self.coordinates;
        BoundingBox {
            min_lon: b.iter().map(|c| c.longitude).fold(f64::INFINITY, f64::min),
            max_lon: b.iter().map(|c| c.longitude).fold(f64::NEG_INFINITY, f64::max),
            min_lat: b.iter().map(|c| c.latitude).fold(f64::INFINITY, f64::min),
            max_lat: b.iter().map(|c| c.latitude).fold(f64::NEG_INFINITY, f64::max),
        }
    }

    /// Corners placed in a `width` x `height` raster spanning the footprint's
    /// bounding box (x east, y south), in corner order
    pub fn raster_quad(&self, width: usize, height: usize) -> Quad {
        let bounds = self.bounds();
        // extents compared in radians so the floor matches a sub-millimeter span
        let lon_extent = (bounds.max_lon - bounds.min_lon).to_radians().max(1e-9);
        let lat_extent = (bounds.max_lat - bounds.min_lat).to_radians().max(1e-9);

        let mut quad = [[0.0; 2]; 4];
        for (p, c) in quad.iter_mut().zip(self.coordinates.iter()) {
            p[0] = (c.longitude - bounds.min_lon).to_radians() / lon_extent * width as f64;
            p[1] = (bounds.max_lat - c.latitude).to_radians() / lat_extent * height as f64;
        }
        quad
    }

    /// Closed ring (first corner repeated) for polygon consumers
    pub fn polygon(&self) -> Vec<GeodeticCoordinate> {
        let mut ring = self.coordinates.to_vec();
        ring.push(self.coordinates[0]);
        ring
    }
}

/// Projects sensor corner rays onto a surface
pub struct FootprintComputer<I = EllipsoidIntersector> {
    composer: OrientationComposer,
    intersector: I,
}

impl FootprintComputer<EllipsoidIntersector> {
    pub fn ellipsoid(params: FootprintParams) -> Self {
        Self::new(params, EllipsoidIntersector)
    }
}

impl<I: TerrainIntersector> FootprintComputer<I> {
    pub fn new(params: FootprintParams, intersector: I) -> Self {
        Self {
            composer: OrientationComposer::new(params.convention, params.calibration),
            intersector,
        }
    }

    pub fn composer(&self) -> &OrientationComposer {
        &self.composer
    }

    pub fn intersector(&self) -> &I {
        &self.intersector
    }

    /// Unit ECEF look direction with an extra (azimuth, elevation) offset
    pub fn look_direction(&self, state: &SensorState, offset: (f64, f64)) -> EcefVector {
        let platform = self.composer.platform_orientation(
            state.platform_heading,
            state.platform_pitch,
            state.platform_roll,
        );
        let sensor = self.composer.sensor_orientation(
            state.sensor_azimuth,
            state.sensor_elevation,
            state.sensor_roll,
            offset,
        );
        let orientation = self.composer.compose(&platform, &sensor);
        self.composer.forward_direction(
            &orientation,
            state.position.latitude,
            state.position.longitude,
        )
    }

    /// Compute the four corner ground points; `None` unless all four hit
    pub fn compute(&self, state: &SensorState) -> Option<Footprint> {
        let origin = GeodeticFrame::coordinate_to_ecef(&state.position);
        let half_h = state.horizontal_fov / 2.0;
        let half_v = state.vertical_fov / 2.0;

        let mut corners = [EcefVector::zeros(); 4];
        for (slot, corner) in corners.iter_mut().zip(Corner::ALL.iter()) {
            let direction = self.look_direction(state, corner.offset(half_h, half_v));
            match self.intersector.intersect(&origin, &direction) {
                Some(hit) => *slot = hit,
                None => {
                    log::debug!("{:?} ray missed the surface, footprint unavailable", corner);
                    return None;
                }
            }
        }

        let coordinates = corners.map(|c| GeodeticFrame::ecef_vector_to_geodetic(&c));
        let frame_center = self
            .intersector
            .intersect(&origin, &self.look_direction(state, (0.0, 0.0)))
            .map(|p| GeodeticFrame::ecef_vector_to_geodetic(&p));

        log::debug!(
            "Footprint corners: {:?}",
            coordinates
                .iter()
                .map(|c| (c.latitude, c.longitude))
                .collect::<Vec<_>>()
        );

        Some(Footprint {
            sensor_position: origin,
            corners,
            coordinates,
            frame_center,
        })
    }

    /// Boresight ground point alone
    pub fn frame_center(&self, state: &SensorState) -> Option<GeodeticCoordinate> {
        let origin = GeodeticFrame::coordinate_to_ecef(&state.position);
        self.intersector
            .intersect(&origin, &self.look_direction(state, (0.0, 0.0)))
            .map(|p| GeodeticFrame::ecef_vector_to_geodetic(&p))
    }

    /// ECEF distance (meters) between the computed boresight point and the
    /// frame center reported in the telemetry
    pub fn frame_center_residual(&self, frame: &MetadataFrame) -> Option<f64> {
        let reported = frame.frame_center()?;
        let computed = self.frame_center(&SensorState::from_frame(frame))?;
        Some(GeodeticFrame::ecef_distance(&computed, &reported))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn oblique_state() -> SensorState {
        SensorState {
            platform_heading: 0.0,
            platform_pitch: 0.0,
            platform_roll: 0.0,
            sensor_azimuth: 0.0,
            sensor_elevation: -60.0,
            sensor_roll: 0.0,
            horizontal_fov: 20.0,
            vertical_fov: 10.0,
            position: GeodeticCoordinate::new(45.0, 10.0, 3000.0),
        }
    }

    struct Miss;

    impl TerrainIntersector for Miss {
        fn intersect(&self, _: &EcefVector, _: &EcefVector) -> Option<EcefVector> {
            None
        }
    }

    /// Hits the ellipsoid for the first `n` rays only
    struct HitsFirst(std::cell::Cell<usize>);

    impl TerrainIntersector for HitsFirst {
        fn intersect(&self, origin: &EcefVector, direction: &EcefVector) -> Option<EcefVector> {
            let left = self.0.get();
            if left == 0 {
                return None;
            }
            self.0.set(left - 1);
            EllipsoidIntersector.intersect(origin, direction)
        }
    }

    #[test]
    fn test_corner_order_matches_image_layout() {
        let computer = FootprintComputer::ellipsoid(FootprintParams::default());
        let state = oblique_state();
        let footprint = computer.compute(&state).unwrap();
        let center = footprint.frame_center.unwrap();

        let tl = footprint.corner(Corner::TopLeft);
        let tr = footprint.corner(Corner::TopRight);
        let br = footprint.corner(Corner::BottomRight);
        let bl = footprint.corner(Corner::BottomLeft);

        // looking north: top edge is the far edge
        assert!(tl.latitude > center.latitude && tl.longitude < center.longitude);
        assert!(tr.latitude > center.latitude && tr.longitude > center.longitude);
        assert!(br.latitude < center.latitude && br.longitude > center.longitude);
        assert!(bl.latitude < center.latitude && bl.longitude < center.longitude);

        for c in &footprint.coordinates {
            assert_abs_diff_eq!(c.height, 0.0, epsilon = 1e-3);
        }
    }

    #[test]
    fn test_any_corner_miss_invalidates_footprint() {
        let state = oblique_state();
        assert!(FootprintComputer::new(FootprintParams::default(), Miss).compute(&state).is_none());

        for hits in 0..4 {
            let partial = FootprintComputer::new(
                FootprintParams::default(),
                HitsFirst(std::cell::Cell::new(hits)),
            );
            assert!(partial.compute(&state).is_none(), "{} hits accepted", hits);
        }
    }

    #[test]
    fn test_looking_at_horizon_has_no_footprint() {
        let computer = FootprintComputer::ellipsoid(FootprintParams::default());
        let mut state = oblique_state();
        state.sensor_elevation = 10.0;
        assert!(computer.compute(&state).is_none());
    }

    #[test]
    fn test_boresight_centred_in_symmetric_footprint() {
        let computer = FootprintComputer::ellipsoid(FootprintParams::default());
        let state = oblique_state();
        let footprint = computer.compute(&state).unwrap();
        let center = footprint.frame_center.unwrap();

        // left and right edges mirror about the boresight meridian
        let tl = footprint.corner(Corner::TopLeft);
        let tr = footprint.corner(Corner::TopRight);
        assert_abs_diff_eq!(tl.latitude, tr.latitude, epsilon = 1e-9);
        assert_abs_diff_eq!(
            center.longitude - tl.longitude,
            tr.longitude - center.longitude,
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_raster_quad_spans_raster() {
        let computer = FootprintComputer::ellipsoid(FootprintParams::default());
        let footprint = computer.compute(&oblique_state()).unwrap();
        let quad = footprint.raster_quad(512, 256);

        let xs: Vec<f64> = quad.iter().map(|p| p[0]).collect();
        let ys: Vec<f64> = quad.iter().map(|p| p[1]).collect();
        assert_abs_diff_eq!(xs.iter().cloned().fold(f64::INFINITY, f64::min), 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(xs.iter().cloned().fold(f64::NEG_INFINITY, f64::max), 512.0, epsilon = 1e-9);
        assert_abs_diff_eq!(ys.iter().cloned().fold(f64::INFINITY, f64::min), 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(ys.iter().cloned().fold(f64::NEG_INFINITY, f64::max), 256.0, epsilon = 1e-9);

        // top-left is up and to the left of bottom-right
        assert!(quad[0][0] < quad[2][0]);
        assert!(quad[0][1] < quad[2][1]);

        let ring = footprint.polygon();
        assert_eq!(ring.len(), 5);
        assert_eq!(ring[0], ring[4]);
    }

    #[test]
    fn test_state_from_frame_defaults_missing_fields() {
        let frame = MetadataFrame::new(1.0)
            .with(TelemetryField::SensorLatitude, 54.0)
            .with(TelemetryField::SensorHorizontalFieldOfView, 12.0);
        let state = SensorState::from_frame(&frame);
        assert_eq!(state.position.latitude, 54.0);
        assert_eq!(state.position.height, 0.0);
        assert_eq!(state.horizontal_fov, 12.0);
        assert_eq!(state.platform_heading, 0.0);
    }
}
