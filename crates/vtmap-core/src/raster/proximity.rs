//! Exact Euclidean distance to the nearest target cell.
//!
//! Squared distances come from the separable lower-envelope transform
//! (Felzenszwalb & Huttenlocher), one pass down the columns and one along the
//! rows, so anisotropic pixels are handled by scaling each pass.
use super::{DistanceUnits, ProximityOptions, Raster, RasterError};

pub(crate) fn proximity(input: &Raster, options: &ProximityOptions) -> Result<Raster, RasterError> {
    if let Some(max) = options.max_distance {
        if max.is_nan() || max < 0.0 {
            return Err(RasterError::InvalidParameter(format!("max distance {max} must be non-negative")));
        }
    }
    let (w, h) = (input.width(), input.height());
    let (step_x, step_y) = match options.units {
        DistanceUnits::Pixels => (1.0, 1.0),
        DistanceUnits::Georeferenced => (input.grid.pixel_width(), input.grid.pixel_height()),
    };

    let mut dist: Vec<f64> = input
        .data
        .iter()
        .map(|&v| {
            let target = !input.is_nodata(v) && options.target_values.contains(&v);
            if target { 0.0 } else { f64::INFINITY }
        })
        .collect();

    let mut env = Envelope::default();
    let mut line = Vec::with_capacity(w.max(h));
    let mut out = vec![0.0; w.max(h)];

    for col in 0..w {
        line.clear();
        line.extend((0..h).map(|row| dist[row * w + col]));
        env.transform(&line, step_y, &mut out[..h]);
        for row in 0..h {
            dist[row * w + col] = out[row];
        }
    }
    for row in 0..h {
        line.clear();
        line.extend_from_slice(&dist[row * w..(row + 1) * w]);
        env.transform(&line, step_x, &mut out[..w]);
        dist[row * w..(row + 1) * w].copy_from_slice(&out[..w]);
    }

    let limit = options.max_distance.unwrap_or(f64::INFINITY);
    let data = dist
        .into_iter()
        .map(|d2| {
            let d = d2.sqrt();
            if !d.is_finite() || d > limit {
                options.nodata
            } else {
                options.replace.unwrap_or(d as f32)
            }
        })
        .collect();
    Raster::from_data(input.grid.clone(), data, Some(options.nodata))
}

/// Scratch buffers for the 1-D transform, reused across lines.
#[derive(Default)]
struct Envelope {
    /// Indices of the parabolas forming the lower envelope.
    sites: Vec<usize>,
    /// Left boundary of each parabola's region.
    bounds: Vec<f64>,
}

impl Envelope {
    /// `out[q] = min_p (q - p)²·step² + f[p]`; infinite entries are not sites.
    fn transform(&mut self, f: &[f64], step: f64, out: &mut [f64]) {
        self.sites.clear();
        self.bounds.clear();
        for (q, &fq) in f.iter().enumerate() {
            if !fq.is_finite() {
                continue;
            }
            let pq = q as f64 * step;
            while let Some(&last) = self.sites.last() {
                let pl = last as f64 * step;
                let s = ((fq + pq * pq) - (f[last] + pl * pl)) / (2.0 * (pq - pl));
                let left = self.bounds[self.bounds.len() - 1];
                if s <= left {
                    self.sites.pop();
                    self.bounds.pop();
                } else {
                    self.sites.push(q);
                    self.bounds.push(s);
                    break;
                }
            }
            if self.sites.is_empty() {
                self.sites.push(q);
                self.bounds.push(f64::NEG_INFINITY);
            }
        }

        if self.sites.is_empty() {
            out.fill(f64::INFINITY);
            return;
        }
        let mut k = 0;
        for (q, slot) in out.iter_mut().enumerate() {
            let pq = q as f64 * step;
            while k + 1 < self.sites.len() && self.bounds[k + 1] < pq {
                k += 1;
            }
            let site = self.sites[k];
            let d = pq - site as f64 * step;
            *slot = d * d + f[site];
        }
    }
}
