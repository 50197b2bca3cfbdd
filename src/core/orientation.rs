//! Heading/pitch/roll composition into world-frame look directions.
//!
//! Rotations are composed as unit quaternions in the local east-north-up
//! frame (x = east, y = north, z = up before any heading is applied) and the
//! resulting local forward axis is carried into ECEF through the tangent
//! plane basis at the sensor. Sign, offset and axis-order choices live in
//! [`OrientationConvention`] because telemetry sources disagree on them.

use crate::core::geodetic::GeodeticFrame;
use crate::types::{EcefVector, Mat3};
use nalgebra::{UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

/// Where the sensor-relative roll is applied relative to the gimbal az/el
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SensorRollPlacement {
    /// Roll about the boresight after azimuth and elevation (inner)
    Boresight,
    /// Roll of the gimbal mount about the platform x axis (outer)
    Mount,
}

/// How the tangent-plane basis is applied to local directions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnuBasisMode {
    /// Multiply by the ENU -> ECEF basis
    Standard,
    /// Multiply by its transpose (rows taken as the east/north/up vectors)
    Transposed,
}

/// Angle sign, offset and axis conventions for a telemetry source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrientationConvention {
    /// Multiplier on platform heading before the offset is added
    pub heading_sign: f64,
    /// Added to the signed heading (degrees)
    pub heading_offset_deg: f64,
    pub pitch_sign: f64,
    pub roll_sign: f64,
    pub azimuth_sign: f64,
    pub elevation_sign: f64,
    pub sensor_roll_sign: f64,
    pub sensor_roll: SensorRollPlacement,
    pub basis: EnuBasisMode,
}

impl OrientationConvention {
    /// Aerospace convention: heading clockwise from north, pitch and
    /// elevation positive up, azimuth clockwise, roll right-wing-down.
    pub fn standard() -> Self {
        Self {
            heading_sign: -1.0,
            heading_offset_deg: 90.0,
            pitch_sign: -1.0,
            roll_sign: 1.0,
            azimuth_sign: -1.0,
            elevation_sign: -1.0,
            sensor_roll_sign: 1.0,
            sensor_roll: SensorRollPlacement::Boresight,
            basis: EnuBasisMode::Standard,
        }
    }

    /// Convention fitted against ST 0601 reference telemetry together with a
    /// per-installation [`CalibrationOffset`].
    pub fn klv_calibrated() -> Self {
        Self {
            heading_sign: 1.0,
            heading_offset_deg: 0.0,
            pitch_sign: 1.0,
            roll_sign: 1.0,
            azimuth_sign: 1.0,
            elevation_sign: -1.0,
            sensor_roll_sign: 1.0,
            sensor_roll: SensorRollPlacement::Mount,
            basis: EnuBasisMode::Transposed,
        }
    }
}

impl Default for OrientationConvention {
    fn default() -> Self {
        Self::standard()
    }
}

/// Fixed boresight bias added to raw sensor-relative angles
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CalibrationOffset {
    pub azimuth_deg: f64,
    pub elevation_deg: f64,
}

impl CalibrationOffset {
    pub fn new(azimuth_deg: f64, elevation_deg: f64) -> Self {
        Self {
            azimuth_deg,
            elevation_deg,
        }
    }

    /// Apply to raw (azimuth, elevation); azimuth wraps into [0, 360)
    pub fn apply(&self, azimuth_deg: f64, elevation_deg: f64) -> (f64, f64) {
        (
            (azimuth_deg + self.azimuth_deg).rem_euclid(360.0),
            elevation_deg + self.elevation_deg,
        )
    }
}

/// Unit rotation; renormalized after every composition
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Orientation(UnitQuaternion<f64>);

impl Orientation {
    pub fn identity() -> Self {
        Self(UnitQuaternion::identity())
    }

    /// Intrinsic z-y-x rotation: `Rz(yaw) * Ry(pitch) * Rx(roll)`, radians
    pub fn from_yaw_pitch_roll(yaw: f64, pitch: f64, roll: f64) -> Self {
        let z = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), yaw);
        let y = UnitQuaternion::from_axis_angle(&Vector3::y_axis(), pitch);
        let x = UnitQuaternion::from_axis_angle(&Vector3::x_axis(), roll);
        Self(z * y * x).renormalized()
    }

    pub fn about_x(angle: f64) -> Self {
        Self(UnitQuaternion::from_axis_angle(&Vector3::x_axis(), angle))
    }

    /// `self` applied after `inner`
    pub fn then_inner(&self, inner: &Orientation) -> Self {
        Self(self.0 * inner.0).renormalized()
    }

    fn renormalized(mut self) -> Self {
        self.0.renormalize();
        self
    }

    pub fn quaternion(&self) -> &UnitQuaternion<f64> {
        &self.0
    }

    pub fn matrix(&self) -> Mat3 {
        self.0.to_rotation_matrix().into_inner()
    }

    pub fn rotate(&self, v: &Vector3<f64>) -> Vector3<f64> {
        self.0 * v
    }

    /// Rotation matrix is orthonormal with determinant +1
    pub fn is_proper(&self) -> bool {
        let m = self.matrix();
        approx::relative_eq!(m.determinant(), 1.0, epsilon = 1e-9)
            && approx::abs_diff_eq!(m.transpose() * m, Mat3::identity(), epsilon = 1e-9)
    }
}

/// Builds world-frame look directions from platform and gimbal angles
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrientationComposer {
    pub convention: OrientationConvention,
    pub calibration: CalibrationOffset,
}

impl OrientationComposer {
    pub fn new(convention: OrientationConvention, calibration: CalibrationOffset) -> Self {
        Self {
            convention,
            calibration,
        }
    }

    /// Platform attitude in the tangent frame (degrees in)
    pub fn platform_orientation(&self, heading: f64, pitch: f64, roll: f64) -> Orientation {
        let c = &self.convention;
        Orientation::from_yaw_pitch_roll(
            (c.heading_sign * heading + c.heading_offset_deg).to_radians(),
            (c.pitch_sign * pitch).to_radians(),
            (c.roll_sign * roll).to_radians(),
        )
    }

    /// Gimbal rotation relative to the platform (degrees in).
    ///
    /// The calibration bias and any corner offset are added to the raw
    /// azimuth/elevation before the convention's signs are applied.
    pub fn sensor_orientation(
        &self,
        azimuth: f64,
        elevation: f64,
        roll: f64,
        corner_offset: (f64, f64),
    ) -> Orientation {
        let c = &self.convention;
        let (az, el) = self.calibration.apply(azimuth, elevation);
        let az = (c.azimuth_sign * (az + corner_offset.0)).to_radians();
        let el = (c.elevation_sign * (el + corner_offset.1)).to_radians();
        let roll = (c.sensor_roll_sign * roll).to_radians();

        let gimbal = Orientation::from_yaw_pitch_roll(az, el, 0.0);
        let roll = Orientation::about_x(roll);
        match c.sensor_roll {
            SensorRollPlacement::Boresight => gimbal.then_inner(&roll),
            SensorRollPlacement::Mount => roll.then_inner(&gimbal),
        }
    }

    /// Platform outer, sensor inner
    pub fn compose(&self, platform: &Orientation, sensor: &Orientation) -> Orientation {
        platform.then_inner(sensor)
    }

    /// Rotate the local forward axis through `orientation` and into ECEF at
    /// the given geodetic point; the result is unit length.
    pub fn forward_direction(&self, orientation: &Orientation, lat: f64, lon: f64) -> EcefVector {
        let local = orientation.rotate(&Vector3::x());
        let basis = GeodeticFrame::east_north_up_basis(lat, lon);
        let world = match self.convention.basis {
            EnuBasisMode::Standard => basis * local,
            EnuBasisMode::Transposed => basis.transpose() * local,
        };
        world.normalize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_composition_stays_proper() {
        let composer = OrientationComposer::default();
        let mut orientation = composer.platform_orientation(86.1, 3.36, 0.52);
        let step = composer.sensor_orientation(46.1, -4.41, 358.2, (0.5, -0.25));

        for _ in 0..10_000 {
            orientation = orientation.then_inner(&step);
        }
        assert!(orientation.is_proper());
        assert_abs_diff_eq!(orientation.quaternion().norm(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_standard_heading_is_clockwise_from_north() {
        let composer = OrientationComposer::default();
        let lat = 45.0;
        let lon = 10.0;
        let basis = GeodeticFrame::east_north_up_basis(lat, lon);
        let sensor = composer.sensor_orientation(0.0, 0.0, 0.0, (0.0, 0.0));

        let north = composer.compose(&composer.platform_orientation(0.0, 0.0, 0.0), &sensor);
        let dir = composer.forward_direction(&north, lat, lon);
        assert_abs_diff_eq!(dir, basis.column(1).into_owned(), epsilon = 1e-12);

        let east = composer.compose(&composer.platform_orientation(90.0, 0.0, 0.0), &sensor);
        let dir = composer.forward_direction(&east, lat, lon);
        assert_abs_diff_eq!(dir, basis.column(0).into_owned(), epsilon = 1e-12);
    }

    #[test]
    fn test_standard_elevation_down_points_at_nadir() {
        let composer = OrientationComposer::default();
        let lat = -12.0;
        let lon = 130.0;
        let platform = composer.platform_orientation(137.0, 0.0, 0.0);
        let sensor = composer.sensor_orientation(25.0, -90.0, 0.0, (0.0, 0.0));

        let dir = composer.forward_direction(&composer.compose(&platform, &sensor), lat, lon);
        let up = GeodeticFrame::east_north_up_basis(lat, lon).column(2).into_owned();
        assert_abs_diff_eq!(dir, -up, epsilon = 1e-12);
    }

    #[test]
    fn test_platform_pitch_up_raises_look_direction() {
        let composer = OrientationComposer::default();
        let sensor = composer.sensor_orientation(0.0, 0.0, 0.0, (0.0, 0.0));
        let pitched = composer.compose(&composer.platform_orientation(0.0, 10.0, 0.0), &sensor);
        let local = pitched.rotate(&Vector3::x());
        assert_abs_diff_eq!(local.z, 10.0_f64.to_radians().sin(), epsilon = 1e-12);
    }

    #[test]
    fn test_calibration_offset_wraps_azimuth() {
        let offset = CalibrationOffset::new(214.26655882, 28.48278847);
        let (az, el) = offset.apply(346.0, -4.0);
        assert_abs_diff_eq!(az, 200.26655882, epsilon = 1e-9);
        assert_abs_diff_eq!(el, 24.48278847, epsilon = 1e-9);
    }

    #[test]
    fn test_mount_roll_differs_from_boresight_roll() {
        let mount = OrientationComposer::new(
            OrientationConvention {
                sensor_roll: SensorRollPlacement::Mount,
                ..OrientationConvention::standard()
            },
            CalibrationOffset::default(),
        );
        let boresight = OrientationComposer::default();

        // boresight roll leaves the forward axis alone, mount roll moves it
        let a = boresight
            .sensor_orientation(30.0, -20.0, 15.0, (0.0, 0.0))
            .rotate(&Vector3::x());
        let b = boresight
            .sensor_orientation(30.0, -20.0, 0.0, (0.0, 0.0))
            .rotate(&Vector3::x());
        assert_abs_diff_eq!(a, b, epsilon = 1e-12);

        let c = mount
            .sensor_orientation(30.0, -20.0, 15.0, (0.0, 0.0))
            .rotate(&Vector3::x());
        assert!((c - b).norm() > 1e-3);
    }
}
