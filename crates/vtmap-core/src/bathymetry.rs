//! Synthetic bathymetry: what the terrain looks like below the water line.
//!
//! Elevation models carry no usable depth data, so the water surface is
//! replaced by a generated seabed. Each [`BathymetryStrategy`] produces a
//! [`WaterSurface`] on the output grid that the blender mixes with the land.
use crate::classify::{classify_water, LAND, WATER};
use crate::config::{BathymetryConfig, Calibration, ShorelineBias};
use crate::error::{ExportError, Result, StageExt};
use crate::pipeline::StageRunner;
use crate::raster::{DistanceUnits, ProximityOptions, Raster, RasterOps, Resampling, SlopeUnits, WarpOptions};

/// Marks hires cells away from the shore in the shore-slope seed raster.
const SHORE_NODATA: f32 = -9999.0;

/// How blended raw steps are rounded to integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rounding {
    /// Nearest, ties to even.
    Nearest,
    Floor,
}

impl Rounding {
    #[inline]
    pub fn apply(self, v: f32) -> f32 {
        match self {
            Rounding::Nearest => v.round_ties_even(),
            Rounding::Floor => v.floor(),
        }
    }
}

/// Strategy output, all on the output grid.
#[derive(Debug, Clone)]
pub struct WaterSurface {
    /// Seabed level in raw steps; defined everywhere, used where land weight < 1.
    pub water_steps: Raster,
    /// 1 = land, 0 = water, fractional along the shore.
    pub land_weight: Raster,
    pub rounding: Rounding,
}

/// Rasters a strategy may draw on.
pub struct BathymetryInput<'a> {
    /// DEM clipped to the map area at its own resolution, in metres.
    pub hires_source: &'a Raster,
    /// Terrain in metres above sea level (never negative) on the output grid;
    /// nodata where the elevation model has no coverage.
    pub lores_terrain: &'a Raster,
    pub sea_level: f32,
    pub calibration: &'a Calibration,
}

pub trait BathymetryStrategy {
    fn name(&self) -> &'static str;

    /// Margin above sea level below which a cell counts as water.
    fn shoreline_epsilon(&self) -> f32;

    /// Number of [`StageRunner::begin`] calls made by `synthesize`.
    fn stage_count(&self) -> usize;

    fn synthesize(
        &self,
        input: &BathymetryInput<'_>,
        ops: &dyn RasterOps,
        stages: &mut StageRunner<'_>,
    ) -> Result<WaterSurface>;
}

/// Build and validate the strategy selected in the settings.
pub fn strategy_for(config: &BathymetryConfig, cal: &Calibration) -> Result<Box<dyn BathymetryStrategy>> {
    match *config {
        BathymetryConfig::SlopeProjection { shoreline_bias } => Ok(Box::new(SlopeProjection { shoreline_bias })),
        BathymetryConfig::WaterFalloff { distance_m } => {
            let strategy = WaterFalloff { distance_m };
            let max = strategy.max_distance_px(cal);
            if !(max.is_finite() && max >= 2.0) {
                return Err(ExportError::InvalidSettings(format!(
                    "water falloff of {distance_m} m spans {max:.2} px; at least two output pixels ({} m) are needed",
                    2.0 * cal.horizontal_resolution_m
                )));
            }
            Ok(Box::new(strategy))
        }
    }
}

/// Projects the steepness of the coast out to sea: steep cliffs drop into
/// deep water quickly, flat beaches shelve gently.
#[derive(Debug, Clone, Copy)]
pub struct SlopeProjection {
    pub shoreline_bias: ShorelineBias,
}

/// Depth in metres (≤ 0) at `distance` metres from shore below a coast of
/// `slope_pct` percent.
///
/// The seabed follows the shore slope but always falls at least one height
/// step per output pixel and never below `floor`.
pub fn projected_depth(distance: f32, slope_pct: f32, resolution: f32, step: f32, floor: f32) -> f32 {
    let along_slope = -(distance * slope_pct / 100.0);
    let one_step_per_pixel = -(distance / resolution * step);
    along_slope.min(one_step_per_pixel).max(floor)
}

impl BathymetryStrategy for SlopeProjection {
    fn name(&self) -> &'static str {
        "slope projection"
    }

    fn shoreline_epsilon(&self) -> f32 {
        0.0
    }

    fn stage_count(&self) -> usize {
        5
    }

    fn synthesize(
        &self,
        input: &BathymetryInput<'_>,
        ops: &dyn RasterOps,
        stages: &mut StageRunner<'_>,
    ) -> Result<WaterSurface> {
        let cal = input.calibration;
        let target = &input.lores_terrain.grid;

        stages.begin("Detecting shorelines")?;
        let water = classify_water(ops, input.hires_source, input.sea_level, self.shoreline_epsilon())
            .stage("classify water")?;
        log::debug!("hires water fraction {:.3}", water.water_fraction());
        stages.persist("hires_water", &water.raster)?;

        stages.begin("Measuring shoreline steepness")?;
        let slope = ops.slope(input.hires_source, SlopeUnits::Percent).stage("slope")?;
        stages.persist("hires_slope", &slope)?;
        let shore = ops
            .proximity(
                &water.raster,
                &ProximityOptions {
                    target_values: vec![WATER],
                    units: DistanceUnits::Pixels,
                    max_distance: Some(cal.shore_search_px),
                    replace: Some(1.0),
                    nodata: 0.0,
                },
            )
            .stage("shore mask")?;
        stages.persist("hires_shore", &shore)?;
        let seed = ops
            .calc(&[&shore, &slope], Some(SHORE_NODATA), &|px| {
                if px[0] > 0.0 && !slope.is_nodata(px[1]) {
                    px[1]
                } else {
                    SHORE_NODATA
                }
            })
            .stage("shore slope")?;
        stages.persist("hires_shore_slope", &seed)?;

        stages.begin("Downsampling shoreline")?;
        let land_fraction = ops
            .calc(&[&water.raster], None, &|px| if px[0] == WATER { 0.0 } else { 1.0 })
            .stage("land fraction")?;
        let weight = ops
            .reproject(&land_fraction, &WarpOptions::onto(target, Resampling::Average))
            .stage("downsample land weight")?;
        stages.persist("lores_land_weight", &weight)?;
        let lores_seed = ops
            .reproject(&seed, &WarpOptions::onto(target, Resampling::Maximum))
            .stage("downsample shore slope")?;
        stages.persist("lores_shore_slope", &lores_seed)?;

        stages.begin("Extending shore slopes offshore")?;
        let bathy_slope = ops
            .fill_nodata(&lores_seed, cal.fill_search_px, cal.fill_iterations)
            .stage("fill shore slope")?;
        stages.persist("lores_bathy_slope", &bathy_slope)?;
        let cap = cal.bathymetry_cap_px * cal.horizontal_resolution_m;
        let distance = ops
            .proximity(
                &weight,
                &ProximityOptions {
                    target_values: vec![1.0],
                    units: DistanceUnits::Georeferenced,
                    max_distance: Some(cap),
                    replace: None,
                    nodata: cap as f32,
                },
            )
            .stage("distance to shore")?;
        stages.persist("lores_shore_distance", &distance)?;

        stages.begin("Synthesizing bathymetry")?;
        let step = cal.altitude_step_m;
        let resolution = cal.horizontal_resolution_m as f32;
        let floor = cal.bathymetry_floor_m;
        let depth = ops
            .calc(&[&distance, &bathy_slope], None, &|px| {
                // Shore slope never reached this cell: fall one step per pixel.
                let slope_pct = if bathy_slope.is_nodata(px[1]) { 0.0 } else { px[1] };
                projected_depth(px[0], slope_pct, resolution, step, floor)
            })
            .stage("bathymetry")?;
        stages.persist("lores_bathymetry", &depth)?;

        let zero_offset = cal.zero_offset_m();
        let water_steps = ops
            .calc(&[&depth], None, &|px| (px[0] + zero_offset) / step)
            .stage("water steps")?;
        let retention = self.shoreline_bias.water_retention();
        let land_weight = ops
            .calc(&[&weight], None, &|px| {
                if weight.is_nodata(px[0]) {
                    1.0
                } else {
                    px[0].clamp(0.0, 1.0).powf(retention)
                }
            })
            .stage("blend weight")?;
        stages.persist("lores_blend_weight", &land_weight)?;

        Ok(WaterSurface { water_steps, land_weight, rounding: Rounding::Nearest })
    }
}

/// Linear drop from the shallowest to the deepest water step over a fixed
/// distance from land.
#[derive(Debug, Clone, Copy)]
pub struct WaterFalloff {
    pub distance_m: f64,
}

impl WaterFalloff {
    /// Falloff distance in output pixels.
    pub fn max_distance_px(&self, cal: &Calibration) -> f64 {
        self.distance_m / cal.horizontal_resolution_m
    }
}

/// Water step at `distance` pixels from land: `water_steps` right at the
/// shore (d = 1), falling to 1 at `max_distance` and beyond.
pub fn falloff_step(distance: f32, max_distance: f32, water_steps: u32) -> f32 {
    let n = water_steps as f32;
    let d = distance.clamp(1.0, max_distance);
    (n - (d - 1.0) * n / (max_distance - 1.0)).round_ties_even().clamp(1.0, n)
}

impl BathymetryStrategy for WaterFalloff {
    fn name(&self) -> &'static str {
        "water falloff"
    }

    fn shoreline_epsilon(&self) -> f32 {
        0.5
    }

    fn stage_count(&self) -> usize {
        2
    }

    fn synthesize(
        &self,
        input: &BathymetryInput<'_>,
        ops: &dyn RasterOps,
        stages: &mut StageRunner<'_>,
    ) -> Result<WaterSurface> {
        let cal = input.calibration;

        stages.begin("Detecting shorelines")?;
        // Terrain is already relative to sea level.
        let water = classify_water(ops, input.lores_terrain, 0.0, self.shoreline_epsilon())
            .stage("classify water")?;
        log::debug!("lores water fraction {:.3}", water.water_fraction());
        stages.persist("lores_water", &water.raster)?;

        stages.begin("Applying water falloff")?;
        let max_distance = self.max_distance_px(cal);
        let distance = ops
            .proximity(
                &water.raster,
                &ProximityOptions {
                    target_values: vec![LAND],
                    units: DistanceUnits::Pixels,
                    max_distance: Some(max_distance),
                    replace: None,
                    nodata: max_distance as f32,
                },
            )
            .stage("distance to land")?;
        stages.persist("lores_water_distance", &distance)?;

        let max = max_distance as f32;
        let n = cal.water_steps;
        let water_steps = ops
            .calc(&[&distance], None, &|px| falloff_step(px[0], max, n))
            .stage("water steps")?;
        stages.persist("lores_water_steps", &water_steps)?;
        let land_weight = ops
            .calc(&[&water.raster], None, &|px| if px[0] == WATER { 0.0 } else { 1.0 })
            .stage("blend weight")?;

        Ok(WaterSurface { water_steps, land_weight, rounding: Rounding::Floor })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blend::blend_terrain;
    use crate::coords::{Crs, Extent};
    use crate::pipeline::{CancelToken, LogFeedback};
    use crate::raster::{GridSpec, NativeOps};
    use approx::assert_relative_eq;

    fn utm_grid(size: f64, n: usize) -> GridSpec {
        GridSpec::new(Crs::Utm { zone: 33, north: true }, Extent::new(0.0, 0.0, size, size), n, n)
    }

    /// Blended step and land weight of one output pixel whose footprint is
    /// half land (10 m) and half water (-10 m).
    fn half_land_pixel(bias: ShorelineBias) -> (f32, f32) {
        let cal = Calibration::default();
        let hires = Raster::from_data(utm_grid(2.0, 2), vec![10.0, -10.0, 10.0, -10.0], None).unwrap();
        let lores = Raster::new(utm_grid(2.0, 1), 10.0);
        let input = BathymetryInput { hires_source: &hires, lores_terrain: &lores, sea_level: 0.0, calibration: &cal };
        let mut stages = StageRunner::new(&LogFeedback, CancelToken::new(), None, 5);
        let surface = SlopeProjection { shoreline_bias: bias }.synthesize(&input, &NativeOps, &mut stages).unwrap();
        let blended = blend_terrain(&NativeOps, &lores, &surface, &cal).unwrap();
        (blended.get(0, 0), surface.land_weight.get(0, 0))
    }

    #[test]
    fn shoreline_bias_shapes_the_downsampled_weight() {
        let (land_step, land_w) = half_land_pixel(ShorelineBias::MaximumLand);
        let (water_step, water_w) = half_land_pixel(ShorelineBias::MaximumWater);
        let (_, balanced_w) = half_land_pixel(ShorelineBias::Balanced);
        assert_relative_eq!(balanced_w, 0.5, epsilon = 1e-6);
        assert_relative_eq!(land_w, 0.5f32.powf(0.2), epsilon = 1e-5);
        assert_relative_eq!(water_w, 0.5f32.powf(5.0), epsilon = 1e-5);
        assert!(land_step > water_step, "maximum land {land_step}, maximum water {water_step}");
    }

    #[test]
    fn falloff_endpoints() {
        assert_eq!(falloff_step(1.0, 10.0, 12), 12.0);
        assert_eq!(falloff_step(10.0, 10.0, 12), 1.0);
        assert_eq!(falloff_step(40.0, 10.0, 12), 1.0);
        // Land cells (d = 0) behave like the first water cell.
        assert_eq!(falloff_step(0.0, 10.0, 12), 12.0);
    }

    #[test]
    fn falloff_is_monotonic() {
        let steps: Vec<f32> = (1..=10).map(|d| falloff_step(d as f32, 10.0, 12)).collect();
        assert!(steps.windows(2).all(|w| w[0] >= w[1]), "{steps:?}");
    }

    #[test]
    fn projected_depth_bounds() {
        let step = 1520.0 / 255.0;
        // On the shore.
        assert_eq!(projected_depth(0.0, 30.0, 153.6, step, -80.0), 0.0);
        // Gentle beach: at least one step per pixel.
        assert_relative_eq!(projected_depth(153.6, 1.0, 153.6, step, -80.0), -step, epsilon = 1e-4);
        // Steep cliff: follows the slope.
        assert_relative_eq!(projected_depth(153.6, 20.0, 153.6, step, -80.0), -30.72, epsilon = 1e-3);
        // Never below the floor.
        assert_eq!(projected_depth(1996.8, 100.0, 153.6, step, -80.0), -80.0);
    }

    #[test]
    fn rounding_modes() {
        assert_eq!(Rounding::Nearest.apply(14.677), 15.0);
        assert_eq!(Rounding::Nearest.apply(2.5), 2.0);
        assert_eq!(Rounding::Floor.apply(14.677), 14.0);
    }

    #[test]
    fn short_falloff_is_rejected() {
        let cal = Calibration::default();
        assert!(strategy_for(&BathymetryConfig::WaterFalloff { distance_m: 200.0 }, &cal).is_err());
        let s = strategy_for(&BathymetryConfig::WaterFalloff { distance_m: 1536.0 }, &cal).unwrap();
        assert_eq!(s.name(), "water falloff");
        assert_eq!(s.shoreline_epsilon(), 0.5);
        let s = strategy_for(&BathymetryConfig::default(), &cal).unwrap();
        assert_eq!(s.shoreline_epsilon(), 0.0);
    }
}
