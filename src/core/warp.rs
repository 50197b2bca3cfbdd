//! Per-pixel inverse-homography resampling of a source raster into a
//! destination quadrilateral.

use crate::core::homography::{Homography, HomographyParams};
use crate::types::{DrapeError, DrapeResult, Mat3, Quad, Raster, Rgba, TRANSPARENT};
use ndarray::Array2;
#[cfg(not(feature = "parallel"))]
use ndarray::Zip;
use serde::{Deserialize, Serialize};

/// Fragment shading applied to each destination pixel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WarpFilter {
    /// Plain bilinear sample of the source
    Normal,
    /// Sobel edge overlay: `edge_color` where the luminance gradient
    /// crosses `threshold`, softened over `thickness`
    Sobel {
        edge_color: Rgba,
        threshold: f64,
        thickness: f64,
    },
}

impl WarpFilter {
    /// White edges, threshold 0.1, thickness 0.2
    pub fn sobel() -> Self {
        WarpFilter::Sobel {
            edge_color: [255, 255, 255, 255],
            threshold: 0.1,
            thickness: 0.2,
        }
    }

    /// Sobel filter with threshold and thickness clamped into [0, 1]
    pub fn sobel_with(edge_color: Rgba, threshold: f64, thickness: f64) -> Self {
        WarpFilter::Sobel {
            edge_color,
            threshold: threshold.clamp(0.0, 1.0),
            thickness: thickness.clamp(0.0, 1.0),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarpParams {
    pub homography: HomographyParams,
    pub filter: WarpFilter,
    /// Fill inside the quad beneath the shaded sample
    pub background: Rgba,
}

impl Default for WarpParams {
    fn default() -> Self {
        Self {
            homography: HomographyParams::default(),
            filter: WarpFilter::Normal,
            background: TRANSPARENT,
        }
    }
}

/// Source corners in pixel space, matching footprint corner order
pub fn source_quad(width: usize, height: usize) -> Quad {
    let (w, h) = (width as f64, height as f64);
    [[0.0, 0.0], [w, 0.0], [w, h], [0.0, h]]
}

/// Warps rasters onto a fixed-size destination.
///
/// Each destination pixel center is mapped through the inverse homography;
/// pixels whose normalized source coordinate falls outside [0, 1]² are
/// left transparent. Inside, the filtered sample is composited over the
/// background color.
#[derive(Debug, Clone)]
pub struct HomographyWarper {
    params: WarpParams,
    width: usize,
    height: usize,
}

impl HomographyWarper {
    pub fn new(params: WarpParams, width: usize, height: usize) -> Self {
        Self {
            params,
            width,
            height,
        }
    }

    /// Destination (width, height)
    pub fn size(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    pub fn params(&self) -> &WarpParams {
        &self.params
    }

    pub fn set_filter(&mut self, filter: WarpFilter) {
        self.params.filter = filter;
    }

    /// Homography from the full source raster to `destination`
    pub fn homography(&self, source: &Raster, destination: &Quad) -> DrapeResult<Homography> {
        let (rows, cols) = source.dim();
        if rows == 0 || cols == 0 {
            return Err(DrapeError::InvalidFormat("source raster is empty".to_string()));
        }
        Homography::from_correspondences(&source_quad(cols, rows), destination, &self.params.homography)
    }

    /// Warp into a newly allocated destination raster
    pub fn warp(&self, source: &Raster, destination: &Quad) -> DrapeResult<Raster> {
        let mut target = Array2::from_elem((self.height, self.width), TRANSPARENT);
        self.warp_into(source, destination, &mut target)?;
        Ok(target)
    }

    /// Warp into `target`, which is resized if needed.
    ///
    /// The transform is solved before `target` is touched, so a failed solve
    /// leaves it unchanged.
    pub fn warp_into(&self, source: &Raster, destination: &Quad, target: &mut Raster) -> DrapeResult<()> {
        let homography = self.homography(source, destination)?;
        let inverse = *homography.inverse();

        if target.dim() != (self.height, self.width) {
            *target = Array2::from_elem((self.height, self.width), TRANSPARENT);
        }

        log::debug!(
            "Warping {}x{} source into {}x{} ({:?})",
            source.ncols(), source.nrows(), self.width, self.height, self.params.filter
        );

        #[cfg(feature = "parallel")]
        {
            use rayon::prelude::*;

            target
                .axis_iter_mut(ndarray::Axis(0))
                .into_par_iter()
                .enumerate()
                .for_each(|(row, mut line)| {
                    for (col, pixel) in line.iter_mut().enumerate() {
                        *pixel = self.shade(source, &inverse, col, row);
                    }
                });
        }

        #[cfg(not(feature = "parallel"))]
        {
            Zip::indexed(target.view_mut()).for_each(|(row, col), pixel| {
                *pixel = self.shade(source, &inverse, col, row);
            });
        }

        Ok(())
    }

    fn shade(&self, source: &Raster, inverse: &Mat3, col: usize, row: usize) -> Rgba {
        let x = col as f64 + 0.5;
        let y = row as f64 + 0.5;

        let w = inverse[(2, 0)] * x + inverse[(2, 1)] * y + inverse[(2, 2)];
        let sx = (inverse[(0, 0)] * x + inverse[(0, 1)] * y + inverse[(0, 2)]) / w;
        let sy = (inverse[(1, 0)] * x + inverse[(1, 1)] * y + inverse[(1, 2)]) / w;

        let u = sx / source.ncols() as f64;
        let v = sy / source.nrows() as f64;
        // NaN fails both comparisons and is clipped too
        if !(u >= 0.0 && u <= 1.0 && v >= 0.0 && v <= 1.0) {
            return TRANSPARENT;
        }

        let background = to_unit(self.params.background);
        let fragment = match &self.params.filter {
            WarpFilter::Normal => Some(sample_bilinear(source, u, v)),
            WarpFilter::Sobel {
                edge_color,
                threshold,
                thickness,
            } => sobel_fragment(source, u, v, *edge_color, *threshold, *thickness),
        };

        match fragment {
            Some(color) => from_unit(blend_over(color, background)),
            None => self.params.background,
        }
    }
}

/// Bilinear sample at normalized (u, v) with clamp-to-edge addressing;
/// texel centers sit at (i + 0.5) / size. An empty raster samples as
/// transparent black.
pub fn sample_bilinear(source: &Raster, u: f64, v: f64) -> [f64; 4] {
    let (rows, cols) = source.dim();
    if rows == 0 || cols == 0 {
        return [0.0; 4];
    }
    let fx = u * cols as f64 - 0.5;
    let fy = v * rows as f64 - 0.5;

    let x0 = fx.floor();
    let y0 = fy.floor();
    let dx = fx - x0;
    let dy = fy - y0;

    let clamp = |i: f64, n: usize| (i.max(0.0) as usize).min(n - 1);
    let xa = clamp(x0, cols);
    let xb = clamp(x0 + 1.0, cols);
    let ya = clamp(y0, rows);
    let yb = clamp(y0 + 1.0, rows);

    let p11 = source[[ya, xa]];
    let p21 = source[[ya, xb]];
    let p12 = source[[yb, xa]];
    let p22 = source[[yb, xb]];

    let mut out = [0.0; 4];
    for (k, channel) in out.iter_mut().enumerate() {
        let value = p11[k] as f64 * (1.0 - dx) * (1.0 - dy)
            + p21[k] as f64 * dx * (1.0 - dy)
            + p12[k] as f64 * (1.0 - dx) * dy
            + p22[k] as f64 * dx * dy;
        *channel = value / 255.0;
    }
    out
}

fn luminance(c: [f64; 4]) -> f64 {
    0.299 * c[0] + 0.587 * c[1] + 0.114 * c[2]
}

/// Edge color with smoothstepped alpha, `None` where no edge is drawn
fn sobel_fragment(
    source: &Raster,
    u: f64,
    v: f64,
    edge_color: Rgba,
    threshold: f64,
    thickness: f64,
) -> Option<[f64; 4]> {
    let tx = 1.0 / source.ncols() as f64;
    let ty = 1.0 / source.nrows() as f64;
    let lum = |du: f64, dv: f64| luminance(sample_bilinear(source, u + du * tx, v + dv * ty));

    let c00 = lum(-1.0, -1.0);
    let c10 = lum(0.0, -1.0);
    let c20 = lum(1.0, -1.0);
    let c01 = lum(-1.0, 0.0);
    let c21 = lum(1.0, 0.0);
    let c02 = lum(-1.0, 1.0);
    let c12 = lum(0.0, 1.0);
    let c22 = lum(1.0, 1.0);

    let gx = -c00 - 2.0 * c01 - c02 + c20 + 2.0 * c21 + c22;
    let gy = -c00 - 2.0 * c10 - c20 + c02 + 2.0 * c12 + c22;
    let g = gx.hypot(gy) / 8.0;

    let t = thickness.clamp(1e-4, 0.5);
    let edge = smoothstep(threshold - t, threshold + t, g);
    let color = to_unit(edge_color);
    let alpha = edge * color[3];
    if alpha <= 0.001 {
        return None;
    }
    Some([color[0], color[1], color[2], alpha])
}

fn smoothstep(edge0: f64, edge1: f64, x: f64) -> f64 {
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// Straight-alpha "over" compositing in [0, 1]
fn blend_over(src: [f64; 4], dst: [f64; 4]) -> [f64; 4] {
    let alpha = src[3] + dst[3] * (1.0 - src[3]);
    if alpha <= 0.0 {
        return [0.0; 4];
    }
    let mut out = [0.0, 0.0, 0.0, alpha];
    for k in 0..3 {
        out[k] = (src[k] * src[3] + dst[k] * dst[3] * (1.0 - src[3])) / alpha;
    }
    out
}

fn to_unit(c: Rgba) -> [f64; 4] {
    [
        c[0] as f64 / 255.0,
        c[1] as f64 / 255.0,
        c[2] as f64 / 255.0,
        c[3] as f64 / 255.0,
    ]
}

fn from_unit(c: [f64; 4]) -> Rgba {
    let q = |v: f64| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
    [q(c[0]), q(c[1]), q(c[2]), q(c[3])]
}

/// Two-slot buffer: one slot is written while the other is exposed.
///
/// `front` is `None` until the first successful write; a failed write
/// leaves the exposed slot untouched.
#[derive(Debug, Clone)]
pub struct FrameBuffers<T> {
    slots: [T; 2],
    front: usize,
    ready: bool,
    generation: u64,
}

impl<T> FrameBuffers<T> {
    pub fn new(a: T, b: T) -> Self {
        Self {
            slots: [a, b],
            front: 0,
            ready: false,
            generation: 0,
        }
    }

    /// Last completed frame
    pub fn front(&self) -> Option<&T> {
        if self.ready {
            Some(&self.slots[self.front])
        } else {
            None
        }
    }

    /// Number of completed writes
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Write the back slot and swap it to the front on success
    pub fn write_with<E, F>(&mut self, write: F) -> Result<(), E>
    where
        F: FnOnce(&mut T) -> Result<(), E>,
    {
        let back = 1 - self.front;
        write(&mut self.slots[back])?;
        self.front = back;
        self.ready = true;
        self.generation += 1;
        Ok(())
    }
}

impl FrameBuffers<Raster> {
    /// Pair of transparent rasters (`width` x `height`)
    pub fn rasters(width: usize, height: usize) -> Self {
        let blank = Array2::from_elem((height, width), TRANSPARENT);
        Self::new(blank.clone(), blank)
    }
}
