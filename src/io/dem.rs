use crate::core::terrain::{DemMarchParams, DemTerrain};
use crate::io::is_gzip_content;
use crate::types::{BoundingBox, DrapeError, DrapeResult, GeoTransform};
use flate2::read::GzDecoder;
use ndarray::Array2;
use std::io::Read;
use std::path::{Path, PathBuf};

/// SRTM void marker
pub const SRTM_NODATA: f32 = -32768.0;

/// Base URL of the public AWS "skadi" SRTM mirror
const SKADI_BASE_URL: &str = "https://s3.amazonaws.com/elevation-tiles-prod/skadi";

/// Reader for SRTM height tiles (`.hgt`, optionally gzipped)
pub struct DemReader;

impl DemReader {
    /// Read an SRTM tile into a terrain surface.
    ///
    /// The tile's south-west corner comes from its file name (`N45W111.hgt`,
    /// `S12E130.hgt.gz`). SRTM heights are orthometric (EGM96); they are used
    /// as ellipsoid heights shifted by `params.geoid_offset_m`.
    pub fn read_hgt<P: AsRef<Path>>(path: P) -> DrapeResult<DemTerrain> {
        Self::read_hgt_with_params(path, DemMarchParams::default())
    }

    pub fn read_hgt_with_params<P: AsRef<Path>>(
        path: P,
        params: DemMarchParams,
    ) -> DrapeResult<DemTerrain> {
        let path = path.as_ref();
        log::info!("Reading SRTM tile from: {}", path.display());

        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| DrapeError::InvalidFormat(format!("Bad tile path: {}", path.display())))?;
        let (sw_lat, sw_lon) = Self::parse_tile_name(name)?;

        let raw = std::fs::read(path)?;
        let bytes = if is_gzip_content(&raw) {
            log::debug!("Decompressing gzipped HGT file");
            let mut decompressed = Vec::new();
            GzDecoder::new(raw.as_slice()).read_to_end(&mut decompressed)?;
            decompressed
        } else {
            raw
        };

        let (heights, transform) = Self::decode_hgt(&bytes, sw_lat, sw_lon)?;
        DemTerrain::with_params(heights, transform, SRTM_NODATA, params)
    }

    /// Decode raw big-endian i16 posts of a 1201² (3") or 3601² (1") tile
    pub fn decode_hgt(bytes: &[u8], sw_lat: i32, sw_lon: i32) -> DrapeResult<(Array2<f32>, GeoTransform)> {
        let samples = bytes.len() / 2;
        let side = match samples {
            n if n == 1201 * 1201 => 1201,
            n if n == 3601 * 3601 => 3601,
            _ => {
                return Err(DrapeError::InvalidFormat(format!(
                    "HGT payload of {} bytes is neither 1201x1201 nor 3601x3601",
                    bytes.len()
                )))
            }
        };
        log::debug!("HGT tile {}x{} posts", side, side);

        let data: Vec<f32> = bytes
            .chunks_exact(2)
            .map(|pair| i16::from_be_bytes([pair[0], pair[1]]) as f32)
            .collect();
        let heights = Array2::from_shape_vec((side, side), data)
            .map_err(|e| DrapeError::Processing(format!("Failed to reshape HGT data: {}", e)))?;

        // posts are pixel-is-point; the first row is the northern edge
        let cell = 1.0 / (side - 1) as f64;
        let transform = GeoTransform::north_up(sw_lon as f64, (sw_lat + 1) as f64, cell);
        Ok((heights, transform))
    }

    /// South-west corner (lat, lon) encoded in an SRTM tile name
    pub fn parse_tile_name(name: &str) -> DrapeResult<(i32, i32)> {
        let bad = || DrapeError::InvalidFormat(format!("Not an SRTM tile name: {}", name));
        let stem = name.get(..7).filter(|s| s.is_ascii()).ok_or_else(bad)?;
        let chars: Vec<char> = stem.chars().collect();

        let lat_sign = match chars[0].to_ascii_uppercase() {
            'N' => 1,
            'S' => -1,
            _ => return Err(bad()),
        };
        let lon_sign = match chars[3].to_ascii_uppercase() {
            'E' => 1,
            'W' => -1,
            _ => return Err(bad()),
        };
        let lat: i32 = stem[1..3].parse().map_err(|_| bad())?;
        let lon: i32 = stem[4..7].parse().map_err(|_| bad())?;
        if lat > 90 || lon > 180 {
            return Err(bad());
        }
        Ok((lat_sign * lat, lon_sign * lon))
    }

    /// Names of the 1x1 degree tiles covering a bounding box
    pub fn tile_names(bbox: &BoundingBox) -> Vec<String> {
        let min_lat = bbox.min_lat.floor() as i32;
        let max_lat = bbox.max_lat.floor() as i32;
        let min_lon = bbox.min_lon.floor() as i32;
        let max_lon = bbox.max_lon.floor() as i32;

        let mut tiles = Vec::new();
        for lat in min_lat..=max_lat {
            for lon in min_lon..=max_lon {
                let lat_prefix = if lat >= 0 { "N" } else { "S" };
                let lon_prefix = if lon >= 0 { "E" } else { "W" };
                tiles.push(format!(
                    "{}{:02}{}{:03}",
                    lat_prefix,
                    lat.abs(),
                    lon_prefix,
                    lon.abs()
                ));
            }
        }

        log::debug!("Required SRTM tiles: {:?}", tiles);
        tiles
    }

    /// Download a gzipped tile from the public mirror into `cache_dir`,
    /// reusing a previously cached copy.
    pub fn download_tile<P: AsRef<Path>>(tile: &str, cache_dir: P) -> DrapeResult<PathBuf> {
        Self::parse_tile_name(tile)?;
        let cache_dir = cache_dir.as_ref();
        std::fs::create_dir_all(cache_dir)?;

        let output_path = cache_dir.join(format!("{}.hgt.gz", tile));
        if output_path.exists() {
            log::info!("SRTM tile {} already cached, skipping download", tile);
            return Ok(output_path);
        }

        let url = format!("{}/{}/{}.hgt.gz", SKADI_BASE_URL, &tile[..3], tile);
        log::info!("Downloading SRTM tile from: {}", url);

        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(300))
            .user_agent(concat!("geodrape/", env!("CARGO_PKG_VERSION")))
            .build()?;
        let response = client.get(&url).send()?;
        if !response.status().is_success() {
            return Err(DrapeError::Processing(format!(
                "HTTP {} for {}",
                response.status().as_u16(),
                url
            )));
        }

        let content = response.bytes()?;
        if !is_gzip_content(&content) {
            return Err(DrapeError::InvalidFormat(format!(
                "Downloaded tile {} is not gzip data",
                tile
            )));
        }
        std::fs::write(&output_path, &content)?;
        log::debug!("Wrote {} bytes to {}", content.len(), output_path.display());
        Ok(output_path)
    }
}
