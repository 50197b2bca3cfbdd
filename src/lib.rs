//! geodrape: sensor footprint geolocation and video draping
//!
//! Turns platform and gimbal telemetry into the ground quadrilateral a
//! camera sees, intersecting corner rays with the WGS84 ellipsoid or an
//! elevation model, and warps video frames into that quadrilateral with a
//! planar homography.

pub mod types;
pub mod io;
pub mod core;

#[cfg(feature = "python")]
mod python;

// Re-export main types and functions for easier access
pub use types::{
    BoundingBox, DrapeError, DrapeResult, EcefVector, GeoTransform, GeodeticCoordinate, Quad,
    Raster, Rgba,
};

pub use crate::core::{
    DrapePipeline, FootprintComputer, FootprintParams, GeodeticFrame, HomographyWarper,
    OrientationConvention, SensorState, WarpParams,
};
pub use io::{DemReader, MetadataFrame, MetadataTimeline, TelemetryField};
