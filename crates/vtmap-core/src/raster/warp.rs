//! Inverse-mapping warp: every target pixel centre is transformed into the
//! source grid and resampled there.
#[cfg(feature = "threading")]
use rayon::prelude::*;

use super::{DataType, GridSpec, Raster, RasterError, Resampling, WarpOptions};
use crate::coords::CoordTransform;

/// Fill value for target cells no source cell contributes to, when the
/// source declares no nodata value of its own.
pub(crate) const DEFAULT_NODATA: f32 = -9999.0;

pub(crate) fn reproject(input: &Raster, options: &WarpOptions) -> Result<Raster, RasterError> {
    let grid = target_grid(input, options)?;
    let inverse = CoordTransform::new(&grid.crs, &input.grid.crs)?;
    let nodata = input.nodata.unwrap_or(DEFAULT_NODATA);
    let method = options.resampling;

    log::debug!(
        "warp {}x{} {} -> {}x{} {} ({})",
        input.width(),
        input.height(),
        input.grid.crs,
        grid.width,
        grid.height,
        grid.crs,
        method
    );

    let mut data = vec![nodata; grid.len()];
    let fill_row = |(row, out): (usize, &mut [f32])| {
        let mut scratch = Vec::new();
        for (col, cell) in out.iter_mut().enumerate() {
            let footprint = Footprint::locate(&grid, &input.grid, &inverse, row, col);
            if let Some(v) = resample(input, &footprint, method, &mut scratch) {
                *cell = v;
            }
        }
    };
    #[cfg(feature = "threading")]
    data.par_chunks_mut(grid.width).enumerate().for_each(fill_row);
    #[cfg(not(feature = "threading"))]
    data.chunks_mut(grid.width).enumerate().for_each(fill_row);

    let missing = data.iter().any(|&v| v == nodata);
    if options.data_type == DataType::Byte {
        for v in data.iter_mut().filter(|v| **v != nodata) {
            *v = v.round().clamp(0.0, 255.0);
        }
    }
    let out_nodata = if missing || input.nodata.is_some() { Some(nodata) } else { None };
    Raster::from_data(grid, data, out_nodata)
}

fn target_grid(input: &Raster, options: &WarpOptions) -> Result<GridSpec, RasterError> {
    let forward = CoordTransform::new(&input.grid.crs, &options.target_crs)?;
    let extent = options
        .extent
        .unwrap_or_else(|| forward.transform_extent(&input.grid.extent));
    if extent.is_empty() {
        return Err(RasterError::InvalidParameter("warp target extent is empty".into()));
    }

    let (width, height) = match (options.size, options.resolution) {
        (Some(size), _) => size,
        (None, Some((rx, ry))) => (cells(extent.width(), rx), cells(extent.height(), ry)),
        (None, None) => {
            let res = carried_resolution(input, &forward);
            (cells(extent.width(), res), cells(extent.height(), res))
        }
    };
    if width == 0 || height == 0 {
        return Err(RasterError::InvalidParameter(format!("warp target size {width}x{height} is empty")));
    }
    Ok(GridSpec::new(options.target_crs.clone(), extent, width, height))
}

fn cells(span: f64, res: f64) -> usize {
    if res > 0.0 && res.is_finite() {
        (span / res + 0.5).floor().max(1.0) as usize
    } else {
        0
    }
}

/// Source pixel size expressed in target units, measured at the source centre.
fn carried_resolution(input: &Raster, forward: &CoordTransform) -> f64 {
    let g = &input.grid;
    if forward.is_identity() {
        return (g.pixel_width() + g.pixel_height()) / 2.0;
    }
    let (cx, cy) = g.extent.center();
    let p0 = forward.apply(cx, cy);
    let px = forward.apply(cx + g.pixel_width(), cy);
    let py = forward.apply(cx, cy + g.pixel_height());
    let dx = (px.0 - p0.0).hypot(px.1 - p0.1);
    let dy = (py.0 - p0.0).hypot(py.1 - p0.1);
    (dx + dy) / 2.0
}

/// Target pixel projected into the source grid: continuous (col, row) of the
/// centre plus the footprint size in source pixels.
struct Footprint {
    col: f64,
    row: f64,
    scale_x: f64,
    scale_y: f64,
}

impl Footprint {
    fn locate(target: &GridSpec, source: &GridSpec, inverse: &CoordTransform, row: usize, col: usize) -> Self {
        let (x, y) = target.pixel_center(row, col);
        let (sx, sy) = inverse.apply(x, y);
        let (fc, fr) = source.world_to_pixel(sx, sy);
        if inverse.is_identity() {
            return Self {
                col: fc,
                row: fr,
                scale_x: target.pixel_width() / source.pixel_width(),
                scale_y: target.pixel_height() / source.pixel_height(),
            };
        }
        let (ax, ay) = inverse.apply(x + target.pixel_width(), y);
        let (bx, by) = inverse.apply(x, y - target.pixel_height());
        let (ac, ar) = source.world_to_pixel(ax, ay);
        let (bc, br) = source.world_to_pixel(bx, by);
        Self {
            col: fc,
            row: fr,
            scale_x: (ac - fc).hypot(ar - fr),
            scale_y: (bc - fc).hypot(br - fr),
        }
    }
}

fn resample(src: &Raster, fp: &Footprint, method: Resampling, scratch: &mut Vec<f32>) -> Option<f32> {
    match method {
        Resampling::Nearest => nearest(src, fp.col, fp.row),
        Resampling::Bilinear => convolve(src, fp, 1.0, bilinear),
        Resampling::Cubic => convolve(src, fp, 2.0, cubic),
        Resampling::CubicSpline => convolve(src, fp, 2.0, cubic_spline),
        Resampling::Lanczos => convolve(src, fp, 3.0, lanczos),
        _ => {
            collect_footprint(src, fp, scratch);
            if scratch.is_empty() {
                // Upsampling: the footprint holds no source centre.
                return nearest(src, fp.col, fp.row);
            }
            Some(statistic(method, scratch))
        }
    }
}

fn nearest(src: &Raster, col: f64, row: f64) -> Option<f32> {
    if col < 0.0 || row < 0.0 {
        return None;
    }
    let (c, r) = (col.floor() as usize, row.floor() as usize);
    if c >= src.width() || r >= src.height() {
        return None;
    }
    src.valid(r, c)
}

/// Separable kernel resampling; the kernel is stretched by the footprint
/// when downsampling so every covered source pixel contributes.
fn convolve(src: &Raster, fp: &Footprint, radius: f64, kernel: fn(f64) -> f64) -> Option<f32> {
    let sx = fp.scale_x.max(1.0);
    let sy = fp.scale_y.max(1.0);
    // Index space where pixel i has its centre at i.
    let cx = fp.col - 0.5;
    let cy = fp.row - 0.5;
    let rx = radius * sx;
    let ry = radius * sy;

    let c0 = ((cx - rx).ceil().max(0.0)) as usize;
    let r0 = ((cy - ry).ceil().max(0.0)) as usize;
    let c1 = (cx + rx).floor();
    let r1 = (cy + ry).floor();
    if c1 < 0.0 || r1 < 0.0 {
        return None;
    }
    let c1 = (c1 as usize).min(src.width().saturating_sub(1));
    let r1 = (r1 as usize).min(src.height().saturating_sub(1));
    if c0 > c1 || r0 > r1 {
        return None;
    }

    let mut sum = 0.0f64;
    let mut weight = 0.0f64;
    for r in r0..=r1 {
        let wy = kernel((r as f64 - cy) / sy);
        if wy == 0.0 {
            continue;
        }
        for c in c0..=c1 {
            let wx = kernel((c as f64 - cx) / sx);
            if wx == 0.0 {
                continue;
            }
            if let Some(v) = src.valid(r, c) {
                let w = wx * wy;
                sum += w * v as f64;
                weight += w;
            }
        }
    }
    (weight.abs() > 1e-9).then(|| (sum / weight) as f32)
}

fn bilinear(x: f64) -> f64 {
    (1.0 - x.abs()).max(0.0)
}

/// Keys cubic convolution, a = -0.5.
fn cubic(x: f64) -> f64 {
    let x = x.abs();
    if x <= 1.0 {
        1.5 * x * x * x - 2.5 * x * x + 1.0
    } else if x < 2.0 {
        -0.5 * x * x * x + 2.5 * x * x - 4.0 * x + 2.0
    } else {
        0.0
    }
}

/// Cubic B-spline.
fn cubic_spline(x: f64) -> f64 {
    let x = x.abs();
    if x < 1.0 {
        (4.0 - 6.0 * x * x + 3.0 * x * x * x) / 6.0
    } else if x < 2.0 {
        (2.0 - x).powi(3) / 6.0
    } else {
        0.0
    }
}

/// Lanczos windowed sinc, a = 3.
fn lanczos(x: f64) -> f64 {
    const A: f64 = 3.0;
    if x == 0.0 {
        return 1.0;
    }
    if x.abs() >= A {
        return 0.0;
    }
    let px = std::f64::consts::PI * x;
    A * px.sin() * (px / A).sin() / (px * px)
}

/// Valid source values whose centres fall inside the target footprint.
fn collect_footprint(src: &Raster, fp: &Footprint, out: &mut Vec<f32>) {
    out.clear();
    let hx = fp.scale_x / 2.0;
    let hy = fp.scale_y / 2.0;
    let first = |lo: f64| (lo - 0.5).ceil().max(0.0) as usize;
    let end = |hi: f64, n: usize| ((hi - 0.5).ceil().max(0.0) as usize).min(n);
    let (c0, c1) = (first(fp.col - hx), end(fp.col + hx, src.width()));
    let (r0, r1) = (first(fp.row - hy), end(fp.row + hy, src.height()));
    for r in r0..r1 {
        for c in c0..c1 {
            if let Some(v) = src.valid(r, c) {
                out.push(v);
            }
        }
    }
}

fn statistic(method: Resampling, values: &mut [f32]) -> f32 {
    match method {
        Resampling::Average => (values.iter().map(|&v| v as f64).sum::<f64>() / values.len() as f64) as f32,
        Resampling::Maximum => values.iter().copied().fold(f32::NEG_INFINITY, f32::max),
        Resampling::Minimum => values.iter().copied().fold(f32::INFINITY, f32::min),
        Resampling::Mode => {
            values.sort_by(f32::total_cmp);
            let mut best = (values[0], 0usize);
            let mut run = (values[0], 0usize);
            for &v in values.iter() {
                run = if v == run.0 { (v, run.1 + 1) } else { (v, 1) };
                if run.1 > best.1 {
                    best = run;
                }
            }
            best.0
        }
        Resampling::Median => quantile(values, 0.5),
        Resampling::Q1 => quantile(values, 0.25),
        Resampling::Q3 => quantile(values, 0.75),
        // Kernel methods never reach here.
        _ => values[0],
    }
}

fn quantile(values: &mut [f32], q: f64) -> f32 {
    values.sort_by(f32::total_cmp);
    let idx = ((values.len() - 1) as f64 * q).round() as usize;
    values[idx]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coords::{Crs, Extent};
    use approx::assert_relative_eq;

    const UTM: Crs = Crs::Utm { zone: 32, north: true };

    fn raster(w: usize, h: usize, cell: f64, f: impl Fn(usize, usize) -> f32) -> Raster {
        let grid = GridSpec::new(UTM, Extent::new(0.0, 0.0, w as f64 * cell, h as f64 * cell), w, h);
        let data = (0..h).flat_map(|r| (0..w).map(move |c| (r, c))).map(|(r, c)| f(r, c)).collect();
        Raster::from_data(grid, data, None).unwrap()
    }

    fn onto(w: usize, h: usize, size: f64, method: Resampling) -> WarpOptions {
        WarpOptions::onto(&GridSpec::new(UTM, Extent::new(0.0, 0.0, size, size), w, h), method)
    }

    #[test]
    fn same_grid_is_identity_for_every_method() {
        let src = raster(6, 6, 10.0, |r, c| (r * 6 + c) as f32);
        // The cubic B-spline approximates rather than interpolates.
        for method in Resampling::ALL.into_iter().filter(|&m| m != Resampling::CubicSpline) {
            let out = reproject(&src, &onto(6, 6, 60.0, method)).unwrap();
            for (a, b) in out.data.iter().zip(&src.data) {
                assert_relative_eq!(*a, *b, epsilon = 1e-4);
            }
        }
    }

    #[test]
    fn statistical_downsample_uses_2x2_blocks() {
        // Block (0,0) holds 0, 1, 4, 5.
        let src = raster(4, 4, 1.0, |r, c| (r * 4 + c) as f32);
        let avg = reproject(&src, &onto(2, 2, 4.0, Resampling::Average)).unwrap();
        assert_relative_eq!(avg.get(0, 0), 2.5);
        let max = reproject(&src, &onto(2, 2, 4.0, Resampling::Maximum)).unwrap();
        assert_eq!(max.get(0, 0), 5.0);
        assert_eq!(max.get(1, 1), 15.0);
        let min = reproject(&src, &onto(2, 2, 4.0, Resampling::Minimum)).unwrap();
        assert_eq!(min.get(1, 0), 8.0);
    }

    #[test]
    fn mode_prefers_most_frequent_then_smallest() {
        let src = raster(2, 2, 1.0, |r, c| if (r, c) == (1, 1) { 7.0 } else { 3.0 });
        let out = reproject(&src, &onto(1, 1, 2.0, Resampling::Mode)).unwrap();
        assert_eq!(out.get(0, 0), 3.0);
    }

    #[test]
    fn nodata_is_excluded_and_propagated() {
        let mut src = raster(2, 2, 1.0, |_, _| 4.0).with_nodata(Some(-1.0));
        src.set(0, 0, -1.0);
        let avg = reproject(&src, &onto(1, 1, 2.0, Resampling::Average)).unwrap();
        assert_eq!(avg.get(0, 0), 4.0);

        // Target larger than the source: uncovered cells become nodata.
        let wide = reproject(&src, &onto(4, 4, 4.0, Resampling::Nearest)).unwrap();
        assert_eq!(wide.nodata, Some(-1.0));
        assert_eq!(wide.get(3, 3), -1.0);
        assert_eq!(wide.get(2, 0), -1.0);
        assert_eq!(wide.get(2, 1), 4.0);
    }

    #[test]
    fn bilinear_upsample_interpolates_linear_ramp() {
        let src = raster(4, 1, 1.0, |_, c| c as f32 * 10.0);
        let out = reproject(&src, &WarpOptions::onto(&GridSpec::new(UTM, Extent::new(0.0, 0.0, 4.0, 1.0), 8, 1), Resampling::Bilinear)).unwrap();
        // Target centre x=1.25 sits between source centres 0.5 and 1.5.
        assert_relative_eq!(out.get(0, 2), 7.5, epsilon = 1e-4);
        assert_relative_eq!(out.get(0, 3), 12.5, epsilon = 1e-4);
    }

    #[test]
    fn byte_output_rounds_and_clamps() {
        let src = raster(2, 1, 1.0, |_, c| if c == 0 { 300.0 } else { 2.6 });
        let mut opts = onto(2, 1, 2.0, Resampling::Nearest);
        opts.extent = Some(Extent::new(0.0, 0.0, 2.0, 1.0));
        opts.data_type = DataType::Byte;
        let out = reproject(&src, &opts).unwrap();
        assert_eq!(out.data, vec![255.0, 3.0]);
    }

    #[test]
    fn clip_keeps_source_resolution() {
        let src = raster(100, 100, 30.0, |_, _| 1.0);
        let out = reproject(&src, &WarpOptions::clip(&UTM, Extent::new(300.0, 300.0, 1500.0, 1500.0), Resampling::Nearest)).unwrap();
        assert_eq!((out.width(), out.height()), (40, 40));
        assert_eq!(out.nodata, None);
    }

    #[test]
    fn wgs84_source_warps_into_utm() {
        // 0.1° square around 45°N 9°E, constant value.
        let grid = GridSpec::new(Crs::Wgs84, Extent::new(8.9, 44.9, 9.1, 45.1), 200, 200);
        let src = Raster::from_data(grid, vec![42.0; 40_000], Some(-9999.0)).unwrap();
        let (e, n) = crate::utm::to_utm(crate::coords::LatLon::new(45.0, 9.0), 32, true);
        let target = GridSpec::new(UTM, Extent::square(e, n, 3000.0), 20, 20);
        let out = reproject(&src, &WarpOptions::onto(&target, Resampling::Lanczos)).unwrap();
        assert_eq!(out.nodata_count(), 0);
        assert!(out.data.iter().all(|&v| (v - 42.0).abs() < 1e-3));
    }

    #[test]
    fn unknown_crs_fails() {
        let src = raster(2, 2, 1.0, |_, _| 0.0);
        let mut opts = onto(2, 2, 2.0, Resampling::Nearest);
        opts.target_crs = Crs::Other("EPSG:3857".into());
        assert!(matches!(reproject(&src, &opts), Err(RasterError::UnsupportedTransform { .. })));
    }
}
