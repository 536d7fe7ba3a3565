//! Raster abstraction and the operator interface every pipeline stage goes
//! through.
//!
//! Stages never touch pixels of another stage in place: each operator
//! returns a new [`Raster`]. [`NativeOps`] implements the whole interface in
//! process; other backends only need to implement [`RasterOps`].
mod fill;
mod grid;
mod native;
mod proximity;
mod rasterize;
mod slope;
mod vectorize;
mod warp;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::coords::{Crs, Extent};
use crate::vector::Feature;

pub use grid::{GridSpec, Raster};
pub use native::NativeOps;

/// Failure of a single raster operator.
#[derive(Debug, Error)]
pub enum RasterError {
    #[error("no transform available from {from} to {to}")]
    UnsupportedTransform { from: String, to: String },
    #[error("input rasters are not on the same grid")]
    GridMismatch,
    #[error("invalid operator parameter: {0}")]
    InvalidParameter(String),
    #[error("feature {index} has no numeric `{field}` attribute")]
    MissingAttribute { field: String, index: usize },
    #[error("raster operator failed: {0}")]
    Backend(String),
}

/// Resampling method used when warping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resampling {
    Nearest,
    Bilinear,
    Cubic,
    CubicSpline,
    #[default]
    Lanczos,
    Average,
    Mode,
    Maximum,
    Minimum,
    Median,
    Q1,
    Q3,
}

impl Resampling {
    pub const ALL: [Resampling; 12] = [
        Resampling::Nearest,
        Resampling::Bilinear,
        Resampling::Cubic,
        Resampling::CubicSpline,
        Resampling::Lanczos,
        Resampling::Average,
        Resampling::Mode,
        Resampling::Maximum,
        Resampling::Minimum,
        Resampling::Median,
        Resampling::Q1,
        Resampling::Q3,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Resampling::Nearest => "nearest",
            Resampling::Bilinear => "bilinear",
            Resampling::Cubic => "cubic",
            Resampling::CubicSpline => "cubicspline",
            Resampling::Lanczos => "lanczos",
            Resampling::Average => "average",
            Resampling::Mode => "mode",
            Resampling::Maximum => "maximum",
            Resampling::Minimum => "minimum",
            Resampling::Median => "median",
            Resampling::Q1 => "q1",
            Resampling::Q3 => "q3",
        }
    }
}

impl fmt::Display for Resampling {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Resampling {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|r| r.name() == lower)
            .ok_or_else(|| format!("unknown resampling method `{s}`"))
    }
}

/// Output cell type of a warp. Everything is stored as f32; `Byte` rounds
/// and clamps valid cells into 0..=255.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DataType {
    Byte,
    #[default]
    Float32,
}

/// Parameters of [`RasterOps::reproject`].
///
/// Without `extent` the source extent is transformed into `target_crs`.
/// `size` wins over `resolution`; with neither, the source pixel size is
/// carried over.
#[derive(Debug, Clone)]
pub struct WarpOptions {
    pub target_crs: Crs,
    pub extent: Option<Extent>,
    pub resolution: Option<(f64, f64)>,
    pub size: Option<(usize, usize)>,
    pub resampling: Resampling,
    pub data_type: DataType,
}

impl WarpOptions {
    /// Clip to `extent` in `crs`, keeping the source resolution.
    pub fn clip(crs: &Crs, extent: Extent, resampling: Resampling) -> Self {
        Self {
            target_crs: crs.clone(),
            extent: Some(extent),
            resolution: None,
            size: None,
            resampling,
            data_type: DataType::Float32,
        }
    }

    /// Resample onto exactly `grid`.
    pub fn onto(grid: &GridSpec, resampling: Resampling) -> Self {
        Self {
            target_crs: grid.crs.clone(),
            extent: Some(grid.extent),
            resolution: None,
            size: Some((grid.width, grid.height)),
            resampling,
            data_type: DataType::Float32,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistanceUnits {
    Pixels,
    Georeferenced,
}

/// Parameters of [`RasterOps::proximity`].
#[derive(Debug, Clone)]
pub struct ProximityOptions {
    /// Cells whose value is in this list are targets (distance 0).
    pub target_values: Vec<f32>,
    pub units: DistanceUnits,
    /// Cells farther than this get `nodata`.
    pub max_distance: Option<f64>,
    /// Write this value instead of the distance for cells within range.
    pub replace: Option<f32>,
    pub nodata: f32,
}

/// One row of a reclassification table: `min <= v < max` maps to `value`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReclassRule {
    pub min: f32,
    pub max: f32,
    pub value: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlopeUnits {
    Degrees,
    Percent,
}

/// Raster operators consumed by the export pipeline.
pub trait RasterOps {
    fn reproject(&self, input: &Raster, options: &WarpOptions) -> Result<Raster, RasterError>;

    /// Per-cell algebra. `formula` receives the values of `inputs` in order
    /// (nodata included as stored); all inputs must share one grid.
    fn calc(
        &self,
        inputs: &[&Raster],
        nodata: Option<f32>,
        formula: &dyn Fn(&[f32]) -> f32,
    ) -> Result<Raster, RasterError>;

    fn proximity(&self, input: &Raster, options: &ProximityOptions) -> Result<Raster, RasterError>;

    fn fill_nodata(&self, input: &Raster, search_distance: f64, iterations: u32) -> Result<Raster, RasterError>;

    /// First matching rule wins; unmatched and nodata cells keep their value.
    fn reclassify(&self, input: &Raster, table: &[ReclassRule]) -> Result<Raster, RasterError>;

    /// Burn polygon features in slice order; later features overwrite earlier
    /// ones only if [`RasterOps::preserves_paint_order`] holds.
    fn rasterize(
        &self,
        features: &[Feature],
        value_field: &str,
        grid: &GridSpec,
        background: f32,
    ) -> Result<Raster, RasterError>;

    fn vectorize(&self, input: &Raster, class_field: &str) -> Result<Vec<Feature>, RasterError>;

    fn slope(&self, input: &Raster, units: SlopeUnits) -> Result<Raster, RasterError>;

    /// Whether [`RasterOps::rasterize`] guarantees last-write-wins in input order.
    fn preserves_paint_order(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resampling_names_roundtrip() {
        for r in Resampling::ALL {
            assert_eq!(r.name().parse::<Resampling>(), Ok(r));
        }
        assert_eq!("Lanczos".parse::<Resampling>(), Ok(Resampling::Lanczos));
        assert!("sinc".parse::<Resampling>().is_err());
        assert_eq!(Resampling::default(), Resampling::Lanczos);
        assert_eq!(serde_json::to_string(&Resampling::CubicSpline).unwrap(), "\"cubicspline\"");
    }
}
