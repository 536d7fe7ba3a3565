//! Export configuration.
//!
//! All tunables live here and are passed explicitly into every stage.
//! `Calibration` defaults are the engine's fixed constants; `ExportSettings`
//! defaults match a plain export with no options changed.
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::area::AreaOverrides;
use crate::error::{ExportError, Result};
use crate::raster::Resampling;

/// Engine constants relating metres to height steps and map size to pixels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Calibration {
    /// Metres per height step (1520 / 255).
    pub altitude_step_m: f32,
    /// Steps reserved below sea level; step `land_offset_steps` is the shoreline.
    pub land_offset_steps: f32,
    /// Distinct water depth steps available to synthetic bathymetry.
    pub water_steps: u32,
    /// Highest encodable raw step (4 × 255).
    pub max_steps: f32,
    /// Ground size of one output pixel in metres.
    pub horizontal_resolution_m: f64,
    pub chunk_size_m: f64,
    pub pixels_per_chunk: usize,
    pub min_chunks: u32,
    pub max_chunks: u32,
    /// Synthetic bathymetry never goes deeper than this.
    pub bathymetry_floor_m: f32,
    /// Width in source pixels of the band treated as shoreline.
    pub shore_search_px: f64,
    pub fill_search_px: f64,
    pub fill_iterations: u32,
    /// Distance from shore, in output pixels, at which depth stops growing.
    pub bathymetry_cap_px: f64,
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            altitude_step_m: 1520.0 / 255.0,
            land_offset_steps: 13.0,
            water_steps: 12,
            max_steps: 1020.0,
            horizontal_resolution_m: 153.6,
            chunk_size_m: 3072.0,
            pixels_per_chunk: 20,
            min_chunks: 8,
            max_chunks: 64,
            bathymetry_floor_m: -80.0,
            shore_search_px: 3.0,
            fill_search_px: 20.0,
            fill_iterations: 3,
            bathymetry_cap_px: 13.0,
        }
    }
}

impl Calibration {
    /// Height in metres of the land offset, i.e. where sea level sits above step 0.
    pub fn zero_offset_m(&self) -> f32 {
        self.land_offset_steps * self.altitude_step_m
    }

    /// Highest encodable altitude in metres above step 0.
    pub fn max_altitude_m(&self) -> f32 {
        self.max_steps * self.altitude_step_m
    }

    /// Output raster width and height for a map of `chunks` chunks.
    pub fn target_size(&self, chunks: u32) -> usize {
        chunks as usize * self.pixels_per_chunk + 1
    }

    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("altitude_step_m", self.altitude_step_m as f64),
            ("max_steps", self.max_steps as f64),
            ("horizontal_resolution_m", self.horizontal_resolution_m),
            ("chunk_size_m", self.chunk_size_m),
            ("pixels_per_chunk", self.pixels_per_chunk as f64),
            ("water_steps", self.water_steps as f64),
        ];
        if let Some((name, v)) = positive.iter().find(|(_, v)| !(v.is_finite() && *v > 0.0)) {
            return Err(ExportError::InvalidSettings(format!("calibration {name} must be positive, got {v}")));
        }
        if self.land_offset_steps < 0.0 || self.land_offset_steps > self.max_steps {
            return Err(ExportError::InvalidSettings(format!(
                "calibration land_offset_steps {} outside 0..={}",
                self.land_offset_steps, self.max_steps
            )));
        }
        if self.min_chunks == 0 || self.min_chunks > self.max_chunks {
            return Err(ExportError::InvalidSettings(format!(
                "calibration chunk range {}..={} is empty",
                self.min_chunks, self.max_chunks
            )));
        }
        Ok(())
    }
}

/// How strongly partially-water pixels lean towards water when downsampling
/// the shoreline. The value is the exponent applied to the land fraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ShorelineBias {
    MaximumLand,
    MoreLand,
    #[default]
    Balanced,
    MoreWater,
    MaximumWater,
}

impl ShorelineBias {
    pub const ALL: [ShorelineBias; 5] = [
        ShorelineBias::MaximumLand,
        ShorelineBias::MoreLand,
        ShorelineBias::Balanced,
        ShorelineBias::MoreWater,
        ShorelineBias::MaximumWater,
    ];

    pub fn water_retention(self) -> f32 {
        match self {
            ShorelineBias::MaximumLand => 0.2,
            ShorelineBias::MoreLand => 0.5,
            ShorelineBias::Balanced => 1.0,
            ShorelineBias::MoreWater => 2.5,
            ShorelineBias::MaximumWater => 5.0,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ShorelineBias::MaximumLand => "maximum-land",
            ShorelineBias::MoreLand => "more-land",
            ShorelineBias::Balanced => "balanced",
            ShorelineBias::MoreWater => "more-water",
            ShorelineBias::MaximumWater => "maximum-water",
        }
    }
}

impl fmt::Display for ShorelineBias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ShorelineBias {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase().replace(['_', ' '], "-");
        Self::ALL
            .into_iter()
            .find(|b| b.name() == lower)
            .ok_or_else(|| format!("unknown shoreline bias `{s}` (expected one of maximum-land, more-land, balanced, more-water, maximum-water)"))
    }
}

pub const DEFAULT_WATER_FALLOFF_M: f64 = 1536.0;

fn default_water_falloff() -> f64 {
    DEFAULT_WATER_FALLOFF_M
}

/// Which synthetic bathymetry to generate under water.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "kebab-case")]
pub enum BathymetryConfig {
    /// Extend shoreline steepness out to sea.
    SlopeProjection {
        #[serde(default)]
        shoreline_bias: ShorelineBias,
    },
    /// Drop linearly through the water steps over a fixed distance.
    WaterFalloff {
        #[serde(default = "default_water_falloff")]
        distance_m: f64,
    },
}

impl Default for BathymetryConfig {
    fn default() -> Self {
        BathymetryConfig::SlopeProjection { shoreline_bias: ShorelineBias::default() }
    }
}

/// Which height images to write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    /// `height0..height3.png`, full 1021-step precision.
    Split,
    /// `height.png`, 256 steps.
    Single,
    #[default]
    Both,
}

impl Encoding {
    pub fn writes_split(self) -> bool {
        matches!(self, Encoding::Split | Encoding::Both)
    }

    pub fn writes_single(self) -> bool {
        matches!(self, Encoding::Single | Encoding::Both)
    }
}

impl FromStr for Encoding {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "split" => Ok(Encoding::Split),
            "single" => Ok(Encoding::Single),
            "both" => Ok(Encoding::Both),
            _ => Err(format!("unknown encoding `{s}` (expected split, single or both)")),
        }
    }
}

/// Everything a single export run needs besides its inputs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportSettings {
    /// Elevation (metres, DEM datum) treated as the shoreline.
    pub sea_level_m: f32,
    pub bathymetry: BathymetryConfig,
    /// Resampling used to bring terrain down to the output resolution.
    pub resampling: Resampling,
    pub encoding: Encoding,
    /// Persist every intermediate raster.
    pub debug: bool,
    pub overrides: AreaOverrides,
    pub calibration: Calibration,
}

impl ExportSettings {
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| ExportError::InvalidSettings(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        if !self.sea_level_m.is_finite() {
            return Err(ExportError::InvalidSettings(format!("sea level {} is not finite", self.sea_level_m)));
        }
        self.calibration.validate()
    }
}
