//! Single-band GeoTIFF elevation models.
//!
//! Georeferencing comes from ModelPixelScale + ModelTiepoint, the CRS from the
//! GeoKey directory and nodata from the GDAL_NODATA tag. Rotated rasters
//! (ModelTransformation) are not supported.
use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;

use anyhow::{bail, Context, Result};
use tiff::decoder::{Decoder, DecodingResult};
use tiff::tags::Tag;
use tiff::ColorType;
use vtmap_core::coords::{Crs, Extent};
use vtmap_core::raster::{GridSpec, Raster};

// ── GeoKeys ──────────────────────────────────────────────────────────────────

const GT_MODEL_TYPE: u16 = 1024;
const GT_RASTER_TYPE: u16 = 1025;
const GEOGRAPHIC_TYPE: u16 = 2048;
const PROJECTED_CS_TYPE: u16 = 3072;

const RASTER_PIXEL_IS_AREA: u16 = 1;
pub const RASTER_PIXEL_IS_POINT: u16 = 2;
pub const MODEL_PROJECTED: u16 = 1;
pub const MODEL_GEOGRAPHIC: u16 = 2;

/// The GeoKey values this reader understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GeoKeys {
    pub model_type: Option<u16>,
    pub raster_type: Option<u16>,
    pub geographic: Option<u16>,
    pub projected: Option<u16>,
}

impl GeoKeys {
    /// Parse a GeoKeyDirectory: a 4-value header followed by
    /// `(key, location, count, value)` entries. Only inline short values
    /// (location 0) are read.
    pub fn parse(dir: &[u16]) -> Result<Self> {
        if dir.len() < 4 {
            bail!("GeoKey directory too short ({} values)", dir.len());
        }
        let count = dir[3] as usize;
        let entries = &dir[4..];
        if entries.len() < count * 4 {
            bail!("GeoKey directory declares {count} keys but holds {}", entries.len() / 4);
        }
        let mut keys = GeoKeys::default();
        for entry in entries.chunks_exact(4).take(count) {
            let (key, location, value) = (entry[0], entry[1], entry[3]);
            if location != 0 {
                continue;
            }
            match key {
                GT_MODEL_TYPE => keys.model_type = Some(value),
                GT_RASTER_TYPE => keys.raster_type = Some(value),
                GEOGRAPHIC_TYPE => keys.geographic = Some(value),
                PROJECTED_CS_TYPE => keys.projected = Some(value),
                _ => {}
            }
        }
        Ok(keys)
    }

    pub fn crs(&self) -> Result<Crs> {
        match (self.model_type, self.projected, self.geographic) {
            (Some(MODEL_GEOGRAPHIC), _, Some(code)) | (None, None, Some(code)) => Ok(Crs::from_epsg(code as u32)),
            (_, Some(code), _) => Ok(Crs::from_epsg(code as u32)),
            (Some(MODEL_GEOGRAPHIC), _, None) => Ok(Crs::Wgs84),
            _ => bail!("GeoTIFF has no EPSG code for its coordinate system"),
        }
    }

    pub fn pixel_is_point(&self) -> bool {
        self.raster_type == Some(RASTER_PIXEL_IS_POINT)
    }

    /// Directory for `crs` with pixel-is-area semantics.
    pub fn directory_for(crs: &Crs) -> Vec<u16> {
        let code = crs.epsg().unwrap_or(0) as u16;
        let (model, crs_key) = if crs.is_geographic() {
            (MODEL_GEOGRAPHIC, GEOGRAPHIC_TYPE)
        } else {
            (MODEL_PROJECTED, PROJECTED_CS_TYPE)
        };
        vec![
            1, 1, 0, 3,
            GT_MODEL_TYPE, 0, 1, model,
            GT_RASTER_TYPE, 0, 1, RASTER_PIXEL_IS_AREA,
            crs_key, 0, 1, code,
        ]
    }
}

// ── Reader ───────────────────────────────────────────────────────────────────

pub fn read_dem(path: &Path) -> Result<Raster> {
    let file = File::open(path).with_context(|| format!("Cannot open {}", path.display()))?;
    decode_dem(BufReader::new(file)).with_context(|| format!("Invalid GeoTIFF {}", path.display()))
}

pub fn decode_dem<R: Read + Seek>(reader: R) -> Result<Raster> {
    let mut decoder = Decoder::new(reader).context("not a TIFF file")?;
    let (width, height) = decoder.dimensions()?;
    match decoder.colortype()? {
        ColorType::Gray(_) => {}
        other => bail!("expected a single-band raster, found {other:?}"),
    }

    let scale = decoder
        .get_tag_f64_vec(Tag::ModelPixelScaleTag)
        .context("missing ModelPixelScale tag")?;
    let tiepoint = decoder
        .get_tag_f64_vec(Tag::ModelTiepointTag)
        .context("missing ModelTiepoint tag")?;
    if scale.len() < 2 || tiepoint.len() < 6 {
        bail!("malformed georeferencing tags");
    }
    let geokeys = match decoder.find_tag(Tag::GeoKeyDirectoryTag)? {
        Some(value) => GeoKeys::parse(&value.into_u16_vec()?)?,
        None => bail!("missing GeoKeyDirectory tag"),
    };
    let nodata = match decoder.find_tag(Tag::GdalNodata)? {
        Some(value) => {
            let text = value.into_string()?;
            let text = text.trim_matches(char::from(0)).trim();
            Some(text.parse::<f32>().with_context(|| format!("bad GDAL_NODATA value {text:?}"))?)
        }
        None => None,
    };

    let (sx, sy) = (scale[0], scale[1]);
    let (i, j, x, y) = (tiepoint[0], tiepoint[1], tiepoint[3], tiepoint[4]);
    let mut min_x = x - i * sx;
    let mut max_y = y + j * sy;
    if geokeys.pixel_is_point() {
        min_x -= sx / 2.0;
        max_y += sy / 2.0;
    }
    let (w, h) = (width as usize, height as usize);
    let extent = Extent::new(min_x, max_y - h as f64 * sy, min_x + w as f64 * sx, max_y);
    let grid = GridSpec::new(geokeys.crs()?, extent, w, h);

    let data: Vec<f32> = match decoder.read_image()? {
        DecodingResult::F32(v) => v,
        DecodingResult::F64(v) => v.into_iter().map(|s| s as f32).collect(),
        DecodingResult::I16(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::U16(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::I32(v) => v.into_iter().map(|s| s as f32).collect(),
        DecodingResult::U32(v) => v.into_iter().map(|s| s as f32).collect(),
        DecodingResult::U8(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::I8(v) => v.into_iter().map(f32::from).collect(),
        _ => bail!("unsupported sample format"),
    };
    log::info!("DEM {}x{} in {}, nodata {:?}", w, h, grid.crs, nodata);
    Ok(Raster::from_data(grid, data, nodata)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::write_geotiff;

    #[test]
    fn geokeys_projected_pixel_is_point() {
        let dir = [1, 1, 0, 3, 1024, 0, 1, 1, 1025, 0, 1, 2, 3072, 0, 1, 32633];
        let keys = GeoKeys::parse(&dir).unwrap();
        assert!(keys.pixel_is_point());
        assert_eq!(keys.crs().unwrap(), Crs::Utm { zone: 33, north: true });
    }

    #[test]
    fn geokeys_geographic_and_truncated() {
        let keys = GeoKeys::parse(&[1, 1, 0, 1, 2048, 0, 1, 4326]).unwrap();
        assert_eq!(keys.crs().unwrap(), Crs::Wgs84);
        assert!(!keys.pixel_is_point());
        assert!(GeoKeys::parse(&[1, 1, 0, 2, 2048, 0, 1, 4326]).is_err());
        assert!(GeoKeys::parse(&[1, 1, 0, 0]).unwrap().crs().is_err());
    }

    #[test]
    fn written_geotiff_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dem.tif");
        let crs = Crs::Utm { zone: 32, north: false };
        let grid = GridSpec::new(crs.clone(), Extent::new(400_000.0, 6_000_000.0, 400_300.0, 6_000_200.0), 3, 2);
        let raster = Raster::from_data(grid, vec![1.0, 2.0, 3.0, -9999.0, 5.5, 6.0], Some(-9999.0)).unwrap();
        write_geotiff(&path, &raster).unwrap();

        let back = read_dem(&path).unwrap();
        assert_eq!(back.grid.crs, crs);
        assert_eq!((back.width(), back.height()), (3, 2));
        assert_eq!(back.grid.extent, raster.grid.extent);
        assert_eq!(back.data, raster.data);
        assert_eq!(back.nodata, Some(-9999.0));
    }
}
