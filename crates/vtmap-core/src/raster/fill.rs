//! Nodata gap filling by inverse-distance interpolation.

use super::{Raster, RasterError};

const DIRECTIONS: [(isize, isize); 8] = [(-1, -1), (-1, 0), (-1, 1), (0, -1), (0, 1), (1, -1), (1, 0), (1, 1)];

/// Fill nodata cells from the nearest valid cell along each of eight rays
/// (weighted by 1/d²), up to `search_distance` pixels away, then run
/// `iterations` passes of 3×3 mean smoothing over the filled cells only.
/// Cells with no valid cell in reach stay nodata.
pub(crate) fn fill_nodata(input: &Raster, search_distance: f64, iterations: u32) -> Result<Raster, RasterError> {
    if search_distance.is_nan() || search_distance < 0.0 {
        return Err(RasterError::InvalidParameter(format!("search distance {search_distance} must be non-negative")));
    }
    let (w, h) = (input.width() as isize, input.height() as isize);
    let mut out = input.clone();
    let mut filled = Vec::new();

    for row in 0..h {
        for col in 0..w {
            if input.valid(row as usize, col as usize).is_some() {
                continue;
            }
            let mut acc = 0.0f64;
            let mut weight = 0.0f64;
            for &(dr, dc) in &DIRECTIONS {
                let unit = ((dr * dr + dc * dc) as f64).sqrt();
                let mut step = 1;
                loop {
                    let dist = step as f64 * unit;
                    let (r, c) = (row + dr * step, col + dc * step);
                    if dist > search_distance || r < 0 || c < 0 || r >= h || c >= w {
                        break;
                    }
                    if let Some(v) = input.valid(r as usize, c as usize) {
                        let k = 1.0 / (dist * dist);
                        acc += k * v as f64;
                        weight += k;
                        break;
                    }
                    step += 1;
                }
            }
            if weight > 0.0 {
                let idx = (row * w + col) as usize;
                out.data[idx] = (acc / weight) as f32;
                filled.push(idx);
            }
        }
    }

    for _ in 0..iterations {
        let prev = out.data.clone();
        for &idx in &filled {
            let (row, col) = ((idx / w as usize) as isize, (idx % w as usize) as isize);
            let mut sum = 0.0f64;
            let mut n = 0u32;
            for r in (row - 1).max(0)..=(row + 1).min(h - 1) {
                for c in (col - 1).max(0)..=(col + 1).min(w - 1) {
                    let v = prev[(r * w + c) as usize];
                    if !out.is_nodata(v) {
                        sum += v as f64;
                        n += 1;
                    }
                }
            }
            out.data[idx] = (sum / n as f64) as f32;
        }
    }

    log::debug!("fill_nodata: filled {} of {} nodata cells", filled.len(), input.nodata_count());
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coords::{Crs, Extent};
    use crate::raster::GridSpec;
    use approx::assert_relative_eq;

    const ND: f32 = -9999.0;

    fn line(values: &[f32]) -> Raster {
        let grid = GridSpec::new(Crs::Utm { zone: 1, north: true }, Extent::new(0.0, 0.0, values.len() as f64, 1.0), values.len(), 1);
        Raster::from_data(grid, values.to_vec(), Some(ND)).unwrap()
    }

    #[test]
    fn gap_is_interpolated_by_inverse_distance() {
        let r = line(&[10.0, ND, ND, 40.0]);
        let out = fill_nodata(&r, 20.0, 0).unwrap();
        // Cell 1: 10 at d=1, 40 at d=2 → (10 + 10) / 1.25.
        assert_relative_eq!(out.get(0, 1), 16.0, epsilon = 1e-4);
        assert_relative_eq!(out.get(0, 2), 34.0, epsilon = 1e-4);
        assert_eq!(out.get(0, 0), 10.0);
    }

    #[test]
    fn search_distance_limits_reach() {
        let r = line(&[5.0, ND, ND, ND, ND]);
        let out = fill_nodata(&r, 2.0, 0).unwrap();
        assert_eq!(&out.data, &[5.0, 5.0, 5.0, ND, ND]);
    }

    #[test]
    fn smoothing_touches_only_filled_cells() {
        let r = line(&[0.0, ND, 30.0, 30.0]);
        let out = fill_nodata(&r, 20.0, 1).unwrap();
        // Filled value (0·1 + 30·1)/2 = 15, then 3-cell mean (0 + 15 + 30)/3.
        assert_relative_eq!(out.get(0, 1), 15.0, epsilon = 1e-4);
        assert_eq!(out.get(0, 0), 0.0);
        assert_eq!(out.get(0, 2), 30.0);
    }

    #[test]
    fn all_nodata_stays_nodata() {
        let r = line(&[ND, ND, ND]);
        let out = fill_nodata(&r, 20.0, 3).unwrap();
        assert!(out.data.iter().all(|&v| v == ND));
    }
}
