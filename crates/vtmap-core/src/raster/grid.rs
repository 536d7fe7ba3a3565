use super::RasterError;
use crate::coords::{Crs, Extent};

/// Pixel grid of a raster: CRS, extent and dimensions.
/// Row 0 is the north edge; pixels are areas, not points.
#[derive(Debug, Clone, PartialEq)]
pub struct GridSpec {
    pub crs: Crs,
    pub extent: Extent,
    pub width: usize,
    pub height: usize,
}

impl GridSpec {
    pub fn new(crs: Crs, extent: Extent, width: usize, height: usize) -> Self {
        Self { crs, extent, width, height }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.width * self.height
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pixel size along x in CRS units.
    pub fn pixel_width(&self) -> f64 {
        self.extent.width() / self.width as f64
    }

    /// Pixel size along y in CRS units (positive).
    pub fn pixel_height(&self) -> f64 {
        self.extent.height() / self.height as f64
    }

    /// World coordinates of the centre of pixel (row, col).
    pub fn pixel_center(&self, row: usize, col: usize) -> (f64, f64) {
        (
            self.extent.min_x + (col as f64 + 0.5) * self.pixel_width(),
            self.extent.max_y - (row as f64 + 0.5) * self.pixel_height(),
        )
    }

    /// Continuous (col, row) position of a world point; integer values lie
    /// on pixel edges.
    pub fn world_to_pixel(&self, x: f64, y: f64) -> (f64, f64) {
        (
            (x - self.extent.min_x) / self.pixel_width(),
            (self.extent.max_y - y) / self.pixel_height(),
        )
    }

    /// Same CRS, same dimensions and extents equal to a thousandth of a pixel.
    pub fn aligned_with(&self, other: &GridSpec) -> bool {
        if self.crs != other.crs || self.width != other.width || self.height != other.height {
            return false;
        }
        let tol_x = self.pixel_width() * 1e-3;
        let tol_y = self.pixel_height() * 1e-3;
        (self.extent.min_x - other.extent.min_x).abs() <= tol_x
            && (self.extent.max_x - other.extent.max_x).abs() <= tol_x
            && (self.extent.min_y - other.extent.min_y).abs() <= tol_y
            && (self.extent.max_y - other.extent.max_y).abs() <= tol_y
    }
}

/// Single-band raster storing f32 values row-major on a [`GridSpec`].
/// Coordinate math uses f64; cell values use f32.
#[derive(Debug, Clone)]
pub struct Raster {
    /// Row-major cell values, row 0 north.
    pub data: Vec<f32>,
    pub grid: GridSpec,
    /// Value marking missing cells. NaN cells are always missing.
    pub nodata: Option<f32>,
}

impl Raster {
    /// Create a raster filled with the given value.
    pub fn new(grid: GridSpec, fill: f32) -> Self {
        Self { data: vec![fill; grid.len()], grid, nodata: None }
    }

    /// Wrap existing row-major data; the length must match the grid.
    pub fn from_data(grid: GridSpec, data: Vec<f32>, nodata: Option<f32>) -> Result<Self, RasterError> {
        if data.len() != grid.len() {
            return Err(RasterError::InvalidParameter(format!(
                "raster data holds {} cells, grid {}x{} needs {}",
                data.len(),
                grid.width,
                grid.height,
                grid.len()
            )));
        }
        Ok(Self { data, grid, nodata })
    }

    pub fn with_nodata(mut self, nodata: Option<f32>) -> Self {
        self.nodata = nodata;
        self
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.grid.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.grid.height
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f32 {
        self.data[row * self.grid.width + col]
    }

    #[inline]
    pub fn set(&mut self, row: usize, col: usize, val: f32) {
        self.data[row * self.grid.width + col] = val;
    }

    #[inline]
    pub fn is_nodata(&self, v: f32) -> bool {
        v.is_nan() || self.nodata == Some(v)
    }

    /// Cell value, or `None` if it is nodata.
    #[inline]
    pub fn valid(&self, row: usize, col: usize) -> Option<f32> {
        let v = self.get(row, col);
        (!self.is_nodata(v)).then_some(v)
    }

    /// Number of nodata cells.
    pub fn nodata_count(&self) -> usize {
        self.data.iter().filter(|&&v| self.is_nodata(v)).count()
    }

    /// (min, max) over valid cells, `None` if every cell is nodata.
    pub fn value_range(&self) -> Option<(f32, f32)> {
        self.data
            .iter()
            .filter(|&&v| !self.is_nodata(v))
            .fold(None, |acc, &v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
    }
}
