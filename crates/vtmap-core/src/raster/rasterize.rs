//! Polygon burning: even-odd scanline fill sampled at pixel centres.

use super::{GridSpec, Raster, RasterError};
use crate::vector::{Feature, Polygon};

/// Burn `features` in slice order; a later feature overwrites earlier ones.
pub(crate) fn rasterize(features: &[Feature], value_field: &str, grid: &GridSpec, background: f32) -> Result<Raster, RasterError> {
    let mut out = Raster::new(grid.clone(), background);
    let mut crossings = Vec::new();
    for (index, feature) in features.iter().enumerate() {
        let value = feature.number(value_field).ok_or_else(|| RasterError::MissingAttribute {
            field: value_field.to_string(),
            index,
        })? as f32;
        for polygon in &feature.polygons {
            burn_polygon(&mut out, polygon, value, &mut crossings);
        }
    }
    Ok(out)
}

fn burn_polygon(out: &mut Raster, polygon: &Polygon, value: f32, crossings: &mut Vec<f64>) {
    let grid = out.grid.clone();
    let (pw, ph) = (grid.pixel_width(), grid.pixel_height());
    let Some(bounds) = crate::coords::Extent::from_points(polygon.exterior.iter().map(|&[x, y]| (x, y))) else {
        return;
    };
    // Rows whose centre y falls inside the polygon's y-range.
    let first_row = ((grid.extent.max_y - bounds.max_y) / ph - 0.5).ceil().max(0.0) as usize;
    let last_row = ((grid.extent.max_y - bounds.min_y) / ph - 0.5).floor();
    if last_row < 0.0 {
        return;
    }
    let last_row = (last_row as usize).min(grid.height.saturating_sub(1));

    for row in first_row..=last_row {
        let y = grid.extent.max_y - (row as f64 + 0.5) * ph;
        crossings.clear();
        for ring in polygon.rings() {
            for edge in ring.windows(2) {
                let ([x0, y0], [x1, y1]) = (edge[0], edge[1]);
                // Half-open in y so shared vertices count once.
                if (y0 <= y && y < y1) || (y1 <= y && y < y0) {
                    crossings.push(x0 + (y - y0) / (y1 - y0) * (x1 - x0));
                }
            }
        }
        crossings.sort_by(f64::total_cmp);
        for span in crossings.chunks_exact(2) {
            // Columns whose centre x lies in [span[0], span[1]).
            let c0 = ((span[0] - grid.extent.min_x) / pw - 0.5).ceil().max(0.0) as usize;
            let c1 = ((span[1] - grid.extent.min_x) / pw - 0.5).ceil().max(0.0) as usize;
            for col in c0..c1.min(grid.width) {
                out.set(row, col, value);
            }
        }
    }
}
