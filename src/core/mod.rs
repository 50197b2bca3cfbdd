//! Sensor model, homography warping and the update pipeline

pub mod geodetic;
pub mod orientation;
pub mod intersect;
pub mod terrain;
pub mod footprint;
pub mod homography;
pub mod warp;
pub mod pipeline;

// Re-export main types
pub use geodetic::GeodeticFrame;
pub use orientation::{CalibrationOffset, Orientation, OrientationComposer, OrientationConvention};
pub use intersect::{intersect_ellipsoid, EllipsoidIntersector, FallbackIntersector, TerrainIntersector};
pub use terrain::{DemMarchParams, DemTerrain};
pub use footprint::{Corner, Footprint, FootprintComputer, FootprintParams, SensorState};
pub use homography::{compute_homography, invert_3x3, Homography, HomographyParams};
pub use warp::{FrameBuffers, HomographyWarper, WarpFilter, WarpParams};
pub use pipeline::{DrapePipeline, GateStatus, UpdateGate, UpdateOutcome};
