//! Land/water classification of an elevation raster.

use crate::raster::{Raster, RasterError, RasterOps, ReclassRule};

/// Mask value for water cells.
pub const WATER: f32 = 255.0;
/// Mask value for land cells.
pub const LAND: f32 = 0.0;

/// A cell is land iff `elevation >= sea_level + epsilon`, so a cell exactly
/// at sea level is land when epsilon is zero.
#[inline]
pub fn is_water(elevation: f32, sea_level: f32, epsilon: f32) -> bool {
    elevation < sea_level + epsilon
}

/// `{LAND, WATER}` mask on the grid of the elevation it was derived from.
#[derive(Debug, Clone)]
pub struct WaterMask {
    pub raster: Raster,
}

impl WaterMask {
    pub fn water_fraction(&self) -> f64 {
        let n = self.raster.data.len().max(1);
        self.raster.data.iter().filter(|&&v| v == WATER).count() as f64 / n as f64
    }
}

/// Classify `elevation` into land and water. Nodata cells count as land.
pub fn classify_water(
    ops: &dyn RasterOps,
    elevation: &Raster,
    sea_level: f32,
    epsilon: f32,
) -> Result<WaterMask, RasterError> {
    let threshold = sea_level + epsilon;
    let table = [
        ReclassRule { min: f32::NEG_INFINITY, max: threshold, value: WATER },
        ReclassRule { min: threshold, max: f32::INFINITY, value: LAND },
    ];
    let classes = ops.reclassify(elevation, &table)?;
    let raster = ops.calc(&[&classes], None, &|px| if px[0] == WATER { WATER } else { LAND })?;
    Ok(WaterMask { raster })
}
