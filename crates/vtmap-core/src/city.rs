//! City footprints: validation, burning onto the output grid, coverage stats.
//!
//! Each city polygon carries a `City Level` from 1 (rural) to 5 (downtown).
//! Where footprints overlap the higher level wins.
use std::fmt;

use crate::coords::{CoordTransform, Crs};
use crate::error::{ExportError, Result, StageExt};
use crate::raster::{GridSpec, Raster, RasterOps};
use crate::vector::{Feature, FeatureCollection, Polygon};

/// Attribute holding the city level.
pub const CITY_LEVEL_FIELD: &str = "City Level";
/// Sequential feature id written after sorting.
pub const CITY_FID_FIELD: &str = "fid";
pub const MAX_CITY_LEVEL: u8 = 5;

/// Engine population limits in km².
pub const LEVEL_AREA_LIMIT_KM2: f64 = 300.0;
pub const TOTAL_AREA_LIMIT_KM2: f64 = 400.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CityLevel {
    Rural = 1,
    Suburb = 2,
    Midtown = 3,
    DowntownI = 4,
    DowntownII = 5,
}

impl CityLevel {
    pub const ALL: [CityLevel; 5] =
        [CityLevel::Rural, CityLevel::Suburb, CityLevel::Midtown, CityLevel::DowntownI, CityLevel::DowntownII];

    pub fn from_level(level: u8) -> Option<Self> {
        Self::ALL.get((level as usize).checked_sub(1)?).copied()
    }

    pub fn level(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            CityLevel::Rural => "Rural",
            CityLevel::Suburb => "Suburb",
            CityLevel::Midtown => "Midtown",
            CityLevel::DowntownI => "Downtown I",
            CityLevel::DowntownII => "Downtown II",
        }
    }
}

impl fmt::Display for CityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Integer level 1..=5 from a number or numeric string attribute.
fn parse_level(feature: &Feature) -> Option<u8> {
    let v = feature.number(CITY_LEVEL_FIELD)?;
    if v.fract() != 0.0 || !(1.0..=MAX_CITY_LEVEL as f64).contains(&v) {
        return None;
    }
    Some(v as u8)
}

/// A validated city layer in the map CRS, sorted ascending by level.
#[derive(Debug, Clone)]
pub struct CityLayer {
    pub name: String,
    features: Vec<Feature>,
    levels: Vec<u8>,
}

impl CityLayer {
    /// Validate `collection` and bring it into `target_crs`.
    ///
    /// Features are stable-sorted by level (ties keep input order), their
    /// level normalized to a number and re-indexed through `fid`.
    pub fn from_collection(collection: &FeatureCollection, target_crs: &Crs) -> Result<Self> {
        let name = collection.name.clone().unwrap_or_else(|| "cities".to_string());
        if !collection.features.is_empty() && !collection.field_names().contains(CITY_LEVEL_FIELD) {
            return Err(ExportError::NotACityLayer(name));
        }

        let mut leveled = Vec::with_capacity(collection.features.len());
        for (index, feature) in collection.features.iter().enumerate() {
            let level = parse_level(feature).ok_or_else(|| ExportError::InvalidCityLevel {
                index,
                value: feature.text(CITY_LEVEL_FIELD).unwrap_or_else(|| "null".to_string()),
            })?;
            leveled.push((level, feature));
        }
        leveled.sort_by_key(|(level, _)| *level);

        let transform = CoordTransform::new(&collection.crs, target_crs)
            .map_err(|e| ExportError::InvalidSource(format!("city layer \"{name}\": {e}")))?;

        let mut features = Vec::with_capacity(leveled.len());
        let mut levels = Vec::with_capacity(leveled.len());
        for (fid, (level, feature)) in leveled.into_iter().enumerate() {
            let mut out = if transform.is_identity() {
                feature.clone()
            } else {
                Feature {
                    polygons: feature.polygons.iter().map(|p| reproject(p, &transform)).collect(),
                    properties: feature.properties.clone(),
                }
            };
            out.properties.insert(CITY_LEVEL_FIELD.to_string(), level.into());
            out.properties.insert(CITY_FID_FIELD.to_string(), (fid as u64).into());
            features.push(out);
            levels.push(level);
        }
        Ok(Self { name, features, levels })
    }

    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    fn with_level(&self, level: u8) -> Vec<Feature> {
        self.features
            .iter()
            .zip(&self.levels)
            .filter(|(_, &l)| l == level)
            .map(|(f, _)| f.clone())
            .collect()
    }
}

fn reproject(polygon: &Polygon, transform: &CoordTransform) -> Polygon {
    let ring = |r: &Vec<[f64; 2]>| -> Vec<[f64; 2]> {
        r.iter()
            .map(|&[x, y]| {
                let (x, y) = transform.apply(x, y);
                [x, y]
            })
            .collect()
    };
    Polygon { exterior: ring(&polygon.exterior), holes: polygon.holes.iter().map(ring).collect() }
}

/// City level per output pixel, 0 where there is no city.
#[derive(Debug, Clone)]
pub struct CityRaster {
    raster: Raster,
}

impl CityRaster {
    /// Accepts only integer values in 0..=5.
    pub fn from_raster(raster: Raster) -> Result<Self> {
        if let Some(&bad) = raster
            .data
            .iter()
            .find(|&&v| v.is_nan() || v.fract() != 0.0 || !(0.0..=MAX_CITY_LEVEL as f32).contains(&v))
        {
            return Err(ExportError::InvalidCityRaster(bad));
        }
        Ok(Self { raster: raster.with_nodata(None) })
    }

    pub fn empty(grid: &GridSpec) -> Self {
        Self { raster: Raster::new(grid.clone(), 0.0) }
    }

    pub fn raster(&self) -> &Raster {
        &self.raster
    }

    /// Level at flat index `idx`.
    #[inline]
    pub fn level(&self, idx: usize) -> u8 {
        self.raster.data[idx] as u8
    }
}

/// Burn `layer` onto `grid` so that higher levels cover lower ones.
pub fn burn_cities(ops: &dyn RasterOps, layer: &CityLayer, grid: &GridSpec) -> Result<CityRaster> {
    if layer.is_empty() {
        log::warn!("city layer \"{}\" has no features; no cities burned", layer.name);
        return Ok(CityRaster::empty(grid));
    }

    let raster = if ops.preserves_paint_order() {
        ops.rasterize(layer.features(), CITY_LEVEL_FIELD, grid, 0.0).stage("burn cities")?
    } else {
        // One pass per level, each painted over the previous result.
        let mut burned = Raster::new(grid.clone(), 0.0);
        for level in 1..=MAX_CITY_LEVEL {
            let subset = layer.with_level(level);
            if subset.is_empty() {
                continue;
            }
            let pass = ops.rasterize(&subset, CITY_LEVEL_FIELD, grid, 0.0).stage("burn cities")?;
            burned = ops
                .calc(&[&burned, &pass], None, &|px| if px[1] > 0.0 { px[1] } else { px[0] })
                .stage("burn cities")?;
        }
        burned
    };
    CityRaster::from_raster(raster)
}

/// Footprint area per level, measured on the city polygons in the map CRS.
///
/// Each level is rounded to 0.1 km² before the limits are checked, so
/// overlapping polygons count once per polygon, not once per burned pixel.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CityStats {
    /// km² for levels 1..=5.
    pub area_km2: [f64; 5],
}

impl CityStats {
    pub fn from_layer(layer: &CityLayer) -> Self {
        let mut area_m2 = [0.0f64; 5];
        for feature in layer.features() {
            if let Some(level) = feature.number(CITY_LEVEL_FIELD).and_then(|l| CityLevel::from_level(l as u8)) {
                area_m2[level.level() as usize - 1] += feature.area();
            }
        }
        Self { area_km2: area_m2.map(|a| (a / 1e5).round() / 10.0) }
    }

    pub fn area(&self, level: CityLevel) -> f64 {
        self.area_km2[level.level() as usize - 1]
    }

    pub fn total_km2(&self) -> f64 {
        self.area_km2.iter().sum()
    }

    /// Levels or totals at or above the engine's population limits.
    pub fn warnings(&self) -> Vec<String> {
        let mut out: Vec<String> = CityLevel::ALL
            .iter()
            .filter(|&&l| self.area(l) >= LEVEL_AREA_LIMIT_KM2)
            .map(|&l| format!("{l}: {:.1} km² exceeds {LEVEL_AREA_LIMIT_KM2} km²", self.area(l)))
            .collect();
        if self.total_km2() >= TOTAL_AREA_LIMIT_KM2 {
            out.push(format!("total: {:.1} km² exceeds {TOTAL_AREA_LIMIT_KM2} km²", self.total_km2()));
        }
        out
    }

    pub fn log(&self) {
        for level in CityLevel::ALL {
            log::info!("{level}: {:.1} km²", self.area(level));
        }
        log::info!("total: {:.1} km²", self.total_km2());
        for w in self.warnings() {
            log::warn!("population limit: {w}");
        }
    }
}
