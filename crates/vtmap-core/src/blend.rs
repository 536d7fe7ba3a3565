//! Mixes land elevation and the synthetic water surface into raw height steps.

use crate::bathymetry::WaterSurface;
use crate::config::Calibration;
use crate::raster::{Raster, RasterError, RasterOps};

/// Raw step of a land cell `terrain_m` metres above sea level.
#[inline]
pub fn land_steps(terrain_m: f32, cal: &Calibration) -> f32 {
    terrain_m.max(0.0) / cal.altitude_step_m + cal.land_offset_steps
}

/// `round(clamp(land·w + water·(1 − w), 0, max_steps))` per cell.
///
/// Weights of exactly 0 or 1 take the pure term so binary masks reproduce
/// the land and water levels bit for bit.
pub fn blend_terrain(
    ops: &dyn RasterOps,
    terrain: &Raster,
    surface: &WaterSurface,
    cal: &Calibration,
) -> Result<Raster, RasterError> {
    let rounding = surface.rounding;
    let max_steps = cal.max_steps;
    ops.calc(&[terrain, &surface.land_weight, &surface.water_steps], None, &|px| {
        let terrain_m = if terrain.is_nodata(px[0]) { 0.0 } else { px[0] };
        let land = land_steps(terrain_m, cal);
        let water = px[2];
        let w = px[1].clamp(0.0, 1.0);
        let raw = if w >= 1.0 {
            land
        } else if w <= 0.0 {
            water
        } else {
            land * w + water * (1.0 - w)
        };
        rounding.apply(raw.clamp(0.0, max_steps))
    })
}
