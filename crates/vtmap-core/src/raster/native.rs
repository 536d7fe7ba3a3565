use super::{
    fill, proximity, rasterize, slope, vectorize, warp, GridSpec, ProximityOptions, Raster, RasterError, RasterOps,
    ReclassRule, SlopeUnits, WarpOptions,
};
use crate::vector::Feature;

/// In-process implementation of every raster operator.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeOps;

impl RasterOps for NativeOps {
    fn reproject(&self, input: &Raster, options: &WarpOptions) -> Result<Raster, RasterError> {
        warp::reproject(input, options)
    }

    fn calc(
        &self,
        inputs: &[&Raster],
        nodata: Option<f32>,
        formula: &dyn Fn(&[f32]) -> f32,
    ) -> Result<Raster, RasterError> {
        let first = inputs
            .first()
            .ok_or_else(|| RasterError::InvalidParameter("calc needs at least one input".into()))?;
        if inputs.iter().any(|r| !r.grid.aligned_with(&first.grid)) {
            return Err(RasterError::GridMismatch);
        }
        let mut px = vec![0.0f32; inputs.len()];
        let data = (0..first.data.len())
            .map(|i| {
                for (slot, r) in px.iter_mut().zip(inputs) {
                    *slot = r.data[i];
                }
                formula(&px)
            })
            .collect();
        Raster::from_data(first.grid.clone(), data, nodata)
    }

    fn proximity(&self, input: &Raster, options: &ProximityOptions) -> Result<Raster, RasterError> {
        proximity::proximity(input, options)
    }

    fn fill_nodata(&self, input: &Raster, search_distance: f64, iterations: u32) -> Result<Raster, RasterError> {
        fill::fill_nodata(input, search_distance, iterations)
    }

    fn reclassify(&self, input: &Raster, table: &[ReclassRule]) -> Result<Raster, RasterError> {
        if let Some(bad) = table.iter().find(|r| r.min.is_nan() || r.max.is_nan() || r.min >= r.max) {
            return Err(RasterError::InvalidParameter(format!(
                "reclass range [{}, {}) is empty",
                bad.min, bad.max
            )));
        }
        let mut out = input.clone();
        for v in out.data.iter_mut().filter(|v| !input.is_nodata(**v)) {
            if let Some(rule) = table.iter().find(|r| r.min <= *v && *v < r.max) {
                *v = rule.value;
            }
        }
        Ok(out)
    }

    fn rasterize(
        &self,
        features: &[Feature],
        value_field: &str,
        grid: &GridSpec,
        background: f32,
    ) -> Result<Raster, RasterError> {
        rasterize::rasterize(features, value_field, grid, background)
    }

    fn vectorize(&self, input: &Raster, class_field: &str) -> Result<Vec<Feature>, RasterError> {
        vectorize::vectorize(input, class_field)
    }

    fn slope(&self, input: &Raster, units: SlopeUnits) -> Result<Raster, RasterError> {
        slope::slope(input, units)
    }

    fn preserves_paint_order(&self) -> bool {
        true
    }
}
