use crate::core::footprint::{FootprintComputer, FootprintParams, SensorState};
use crate::core::geodetic::GeodeticFrame;
use crate::core::intersect::intersect_ellipsoid;
use crate::core::orientation::{CalibrationOffset, OrientationConvention};
use crate::core::warp::{HomographyWarper, WarpFilter, WarpParams};
use crate::io::metadata::MetadataTimeline;
use crate::io::telemetry::MetadataFrame;
use crate::types::{DrapeError, EcefVector, Quad};
use ndarray::{Array2, Array3};
use numpy::{IntoPyArray, PyArray3, PyReadonlyArray3};
use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;

fn to_py_err(e: DrapeError) -> PyErr {
    PyErr::new::<PyRuntimeError, _>(format!("{}", e))
}

/// Python module definition
#[pymodule]
fn geodrape(_py: Python, m: &PyModule) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(geodetic_to_ecef, m)?)?;
    m.add_function(wrap_pyfunction!(ecef_to_geodetic, m)?)?;
    m.add_function(wrap_pyfunction!(py_intersect_ellipsoid, m)?)?;
    m.add_function(wrap_pyfunction!(compute_footprint, m)?)?;
    m.add_function(wrap_pyfunction!(warp_image, m)?)?;
    m.add_class::<PyMetadataTimeline>()?;
    Ok(())
}

#[pyfunction]
fn geodetic_to_ecef(lat: f64, lon: f64, height: f64) -> (f64, f64, f64) {
    let p = GeodeticFrame::geodetic_to_ecef(lat, lon, height);
    (p.x, p.y, p.z)
}

#[pyfunction]
fn ecef_to_geodetic(x: f64, y: f64, z: f64) -> (f64, f64, f64) {
    let g = GeodeticFrame::ecef_to_geodetic(x, y, z);
    (g.latitude, g.longitude, g.height)
}

#[pyfunction]
#[pyo3(name = "intersect_ellipsoid")]
fn py_intersect_ellipsoid(origin: (f64, f64, f64), direction: (f64, f64, f64)) -> Option<(f64, f64, f64)> {
    let origin = EcefVector::new(origin.0, origin.1, origin.2);
    let direction = EcefVector::new(direction.0, direction.1, direction.2);
    intersect_ellipsoid(&origin, &direction).map(|g| (g.latitude, g.longitude, g.height))
}

/// Corner ground points (lat, lon, height) for one JSON telemetry record
#[pyfunction]
#[pyo3(signature = (record, convention = "standard", azimuth_offset = 0.0, elevation_offset = 0.0))]
fn compute_footprint(
    record: &str,
    convention: &str,
    azimuth_offset: f64,
    elevation_offset: f64,
) -> PyResult<Option<Vec<(f64, f64, f64)>>> {
    let convention = match convention {
        "standard" => OrientationConvention::standard(),
        "klv" | "klv_calibrated" => OrientationConvention::klv_calibrated(),
        other => {
            return Err(PyErr::new::<PyValueError, _>(format!(
                "Invalid convention: {}",
                other
            )))
        }
    };
    let frame = MetadataFrame::from_json_str(record).map_err(to_py_err)?;
    let computer = FootprintComputer::ellipsoid(FootprintParams {
        convention,
        calibration: CalibrationOffset::new(azimuth_offset, elevation_offset),
    });

    Ok(computer.compute(&SensorState::from_frame(&frame)).map(|fp| {
        fp.coordinates
            .iter()
            .map(|c| (c.latitude, c.longitude, c.height))
            .collect()
    }))
}

/// Warp an (H, W, 4) uint8 image onto a destination quad
#[pyfunction]
#[pyo3(signature = (image, quad, width, height, sobel = false))]
fn warp_image<'py>(
    py: Python<'py>,
    image: PyReadonlyArray3<u8>,
    quad: Vec<(f64, f64)>,
    width: usize,
    height: usize,
    sobel: bool,
) -> PyResult<&'py PyArray3<u8>> {
    let view = image.as_array();
    let (rows, cols, channels) = view.dim();
    if channels != 4 {
        return Err(PyErr::new::<PyValueError, _>(format!(
            "Expected RGBA image, got {} channels",
            channels
        )));
    }
    if quad.len() != 4 {
        return Err(PyErr::new::<PyValueError, _>(format!(
            "Expected 4 destination corners, got {}",
            quad.len()
        )));
    }

    let source = Array2::from_shape_fn((rows, cols), |(r, c)| {
        [view[[r, c, 0]], view[[r, c, 1]], view[[r, c, 2]], view[[r, c, 3]]]
    });
    let mut destination: Quad = [[0.0; 2]; 4];
    for (slot, (x, y)) in destination.iter_mut().zip(quad) {
        *slot = [x, y];
    }

    let params = WarpParams {
        filter: if sobel { WarpFilter::sobel() } else { WarpFilter::Normal },
        ..WarpParams::default()
    };
    let warped = HomographyWarper::new(params, width, height)
        .warp(&source, &destination)
        .map_err(to_py_err)?;

    let out = Array3::from_shape_fn((height, width, 4), |(r, c, k)| warped[[r, c]][k]);
    Ok(out.into_pyarray(py))
}

/// Python wrapper for MetadataTimeline
#[pyclass(name = "MetadataTimeline")]
struct PyMetadataTimeline {
    inner: MetadataTimeline,
}

#[pymethods]
impl PyMetadataTimeline {
    #[new]
    fn new() -> Self {
        PyMetadataTimeline {
            inner: MetadataTimeline::new(),
        }
    }

    fn load_path(&mut self, path: String) -> PyResult<usize> {
        self.inner.load_path(&path).map_err(to_py_err)
    }

    fn push_json(&mut self, record: &str) -> PyResult<bool> {
        let value: serde_json::Value = serde_json::from_str(record)
            .map_err(|e| PyErr::new::<PyValueError, _>(format!("{}", e)))?;
        self.inner.push_json(&value).map_err(to_py_err)
    }

    /// Nearest record as a JSON string
    fn get(&self, timestamp: f64) -> Option<String> {
        self.inner.get(timestamp).map(|f| f.to_json().to_string())
    }

    fn __len__(&self) -> usize {
        self.inner.len()
    }

    fn __repr__(&self) -> String {
        format!(
            "MetadataTimeline(frames={}, span={:.3}s)",
            self.inner.len(),
            self.inner.span()
        )
    }
}
