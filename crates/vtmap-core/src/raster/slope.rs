//! Horn (1981) 3×3 slope.

use super::{Raster, RasterError, SlopeUnits};

/// Written where the centre cell is nodata.
pub(crate) const SLOPE_NODATA: f32 = -9999.0;

/// Horn weighted 3×3 gradient at `(r, c)`.
///
/// Returns `(dz_dx, dz_dy)` as rise/run. Neighbours outside the raster are
/// replicated from the nearest edge cell and nodata neighbours take the
/// centre value, so every valid cell gets a gradient.
///
/// ```text
///   NW(-1,-1)  N(-1, 0)  NE(-1,+1)
///   W ( 0,-1)  *         E ( 0,+1)
///   SW(+1,-1)  S(+1, 0)  SE(+1,+1)
/// ```
///
/// `dz/dx = ((NE + 2E + SE) − (NW + 2W + SW)) / (8 · dx)`
/// `dz/dy = ((NW + 2N + NE) − (SW + 2S + SE)) / (8 · dy)`
pub(crate) fn horn_gradient(r: &Raster, row: usize, col: usize, dx: f64, dy: f64) -> Option<(f64, f64)> {
    let centre = r.valid(row, col)? as f64;
    let at = |dr: isize, dc: isize| -> f64 {
        let rr = (row as isize + dr).clamp(0, r.height() as isize - 1) as usize;
        let cc = (col as isize + dc).clamp(0, r.width() as isize - 1) as usize;
        r.valid(rr, cc).map_or(centre, f64::from)
    };
    let nw = at(-1, -1);
    let n = at(-1, 0);
    let ne = at(-1, 1);
    let w = at(0, -1);
    let e = at(0, 1);
    let sw = at(1, -1);
    let s = at(1, 0);
    let se = at(1, 1);

    let dz_dx = ((ne + 2.0 * e + se) - (nw + 2.0 * w + sw)) / (8.0 * dx);
    let dz_dy = ((nw + 2.0 * n + ne) - (sw + 2.0 * s + se)) / (8.0 * dy);
    Some((dz_dx, dz_dy))
}

/// Slope of a raster whose values share the unit of its CRS (metres on metres).
pub(crate) fn slope(input: &Raster, units: SlopeUnits) -> Result<Raster, RasterError> {
    if input.grid.crs.is_geographic() {
        return Err(RasterError::InvalidParameter(
            "slope needs a projected raster; warp it first".into(),
        ));
    }
    let dx = input.grid.pixel_width();
    let dy = input.grid.pixel_height();
    let mut out = Raster::new(input.grid.clone(), SLOPE_NODATA).with_nodata(Some(SLOPE_NODATA));
    for row in 0..input.height() {
        for col in 0..input.width() {
            if let Some((gx, gy)) = horn_gradient(input, row, col, dx, dy) {
                let rise = gx.hypot(gy);
                let v = match units {
                    SlopeUnits::Percent => 100.0 * rise,
                    SlopeUnits::Degrees => rise.atan().to_degrees(),
                };
                out.set(row, col, v as f32);
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coords::{Crs, Extent};
    use crate::raster::GridSpec;
    use approx::assert_relative_eq;

    fn ramp(w: usize, h: usize, cell: f64, rise_per_m: f64) -> Raster {
        let grid = GridSpec::new(Crs::Utm { zone: 1, north: true }, Extent::new(0.0, 0.0, w as f64 * cell, h as f64 * cell), w, h);
        let data = (0..h)
            .flat_map(|_| (0..w).map(move |c| (c as f64 * cell * rise_per_m) as f32))
            .collect();
        Raster::from_data(grid, data, None).unwrap()
    }

    #[test]
    fn flat_surface_has_zero_slope() {
        let out = slope(&ramp(5, 5, 30.0, 0.0), SlopeUnits::Percent).unwrap();
        assert!(out.data.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn interior_ramp_slope_in_percent_and_degrees() {
        let r = ramp(7, 7, 10.0, 0.1);
        let pct = slope(&r, SlopeUnits::Percent).unwrap();
        assert_relative_eq!(pct.get(3, 3), 10.0, epsilon = 1e-4);
        let deg = slope(&r, SlopeUnits::Degrees).unwrap();
        assert_relative_eq!(deg.get(3, 3) as f64, 0.1f64.atan().to_degrees(), epsilon = 1e-4);
        // Replicated edge halves the x-difference.
        assert_relative_eq!(pct.get(3, 0), 5.0, epsilon = 1e-4);
    }

    #[test]
    fn nodata_centre_stays_nodata() {
        let mut r = ramp(3, 3, 10.0, 0.1).with_nodata(Some(-1.0));
        r.set(1, 1, -1.0);
        let out = slope(&r, SlopeUnits::Percent).unwrap();
        assert_eq!(out.get(1, 1), SLOPE_NODATA);
        assert_ne!(out.get(0, 0), SLOPE_NODATA);
    }

    #[test]
    fn geographic_input_is_rejected() {
        let grid = GridSpec::new(Crs::Wgs84, Extent::new(0.0, 0.0, 1.0, 1.0), 2, 2);
        assert!(slope(&Raster::new(grid, 0.0), SlopeUnits::Percent).is_err());
    }
}
