//! Map area descriptor: the square, chunk-aligned region being exported.
//!
//! Areas are stored as single-feature polygon layers carrying the map
//! attributes. [`MapAreaBuilder`] creates them from a rough user extent;
//! [`MapArea::from_layer`] reads them back for export.
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::Calibration;
use crate::coords::{CoordTransform, Crs, Extent, LatLon};
use crate::error::{ExportError, Result};
use crate::raster::GridSpec;
use crate::vector::{Feature, FeatureCollection, Polygon};

/// Metres per degree of latitude used by the longitude correction.
const METRES_PER_DEGREE: f64 = 111_320.0;

macro_rules! named_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn name(self) -> &'static str {
                match self {
                    $($name::$variant => stringify!($variant)),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.name())
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                let wanted = s.trim();
                Self::ALL
                    .iter()
                    .copied()
                    .find(|v| v.name().eq_ignore_ascii_case(wanted))
                    .ok_or_else(|| {
                        let names: Vec<&str> = Self::ALL.iter().map(|v| v.name()).collect();
                        format!("unknown {} `{}` (expected one of {})", stringify!($name).to_lowercase(), s, names.join(", "))
                    })
            }
        }
    };
}

named_enum!(
    /// Terrain texture set used by the engine.
    Biome { Boreal, Desert, Arctic }
);
named_enum!(
    /// What lies beyond the map border.
    Edge { Water, Hills, Coast }
);
named_enum!(
    /// Side of the map facing the sea when the edge is `Coast`.
    CoastSide { North, South, East, West }
);

/// Per-export replacements for the attributes stored on the area layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AreaOverrides {
    pub biome: Option<Biome>,
    pub edge: Option<Edge>,
    pub coast: Option<CoastSide>,
}

/// A validated export area.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapArea {
    pub name: Option<String>,
    pub crs: Crs,
    pub extent: Extent,
    pub chunks: u32,
    pub biome: Biome,
    pub edge: Edge,
    /// Only meaningful when `edge` is [`Edge::Coast`].
    pub coast: Option<CoastSide>,
    /// Latitude of the south-west corner.
    pub latitude: f64,
    /// Longitude of the south-west corner, possibly GPS-corrected.
    pub longitude: f64,
}

const REQUIRED_FIELDS: [&str; 7] = ["size", "chunks", "biome", "edge", "coast", "latitude", "longitude"];

impl MapArea {
    /// Read the area from the first feature of a map-area layer.
    pub fn from_layer(layer: &FeatureCollection, overrides: &AreaOverrides, cal: &Calibration) -> Result<Self> {
        let feature = layer
            .features
            .first()
            .ok_or_else(|| ExportError::InvalidArea("map area layer has no features".into()))?;
        if let Some(missing) = REQUIRED_FIELDS.iter().find(|f| !feature.properties.contains_key(**f)) {
            return Err(ExportError::MissingAreaField(*missing));
        }

        let number = |field: &'static str| {
            feature
                .number(field)
                .ok_or_else(|| ExportError::InvalidArea(format!("field \"{field}\" is not a number")))
        };
        let chunks = number("chunks")?;
        if chunks.fract() != 0.0 || chunks < 0.0 {
            return Err(ExportError::InvalidArea(format!("chunks must be a whole number, got {chunks}")));
        }
        let size = number("size")?;
        let latitude = number("latitude")?;
        let longitude = number("longitude")?;

        let parse = |field: &'static str| feature.text(field).unwrap_or_default();
        let biome = match overrides.biome {
            Some(b) => b,
            None => parse("biome").parse().map_err(ExportError::InvalidArea)?,
        };
        let edge = match overrides.edge {
            Some(e) => e,
            None => parse("edge").parse().map_err(ExportError::InvalidArea)?,
        };
        let coast = match overrides.coast {
            Some(c) => Some(c),
            None => parse("coast").parse().ok(),
        };

        let extent = layer
            .bounds()
            .ok_or_else(|| ExportError::InvalidArea("map area feature has no geometry".into()))?;

        let area = Self {
            name: feature.text("name").filter(|n| !n.is_empty()),
            crs: layer.crs.clone(),
            extent,
            chunks: chunks as u32,
            biome,
            edge,
            coast,
            latitude,
            longitude,
        };
        area.validate(cal)?;
        if (size - area.size_m(cal)).abs() > 0.5 {
            return Err(ExportError::InvalidArea(format!(
                "size field {size} does not match {} chunks ({} m)",
                area.chunks,
                area.size_m(cal)
            )));
        }
        Ok(area)
    }

    pub fn validate(&self, cal: &Calibration) -> Result<()> {
        if !(cal.min_chunks..=cal.max_chunks).contains(&self.chunks) {
            return Err(ExportError::InvalidArea(format!(
                "chunks must be within {}..={}, got {}",
                cal.min_chunks, cal.max_chunks, self.chunks
            )));
        }
        if self.crs.is_geographic() {
            return Err(ExportError::InvalidArea(format!(
                "map area must use a projected CRS in metres, got {}",
                self.crs
            )));
        }
        let size = self.size_m(cal);
        let tolerance = 0.5;
        if (self.extent.width() - size).abs() > tolerance || (self.extent.height() - size).abs() > tolerance {
            return Err(ExportError::InvalidArea(format!(
                "extent {:.1} x {:.1} m is not a {} m square",
                self.extent.width(),
                self.extent.height(),
                size
            )));
        }
        if !(-90.0..=90.0).contains(&self.latitude) || !(-180.0..=180.0).contains(&self.longitude) {
            return Err(ExportError::InvalidArea(format!(
                "reference position {}, {} is not a valid latitude/longitude",
                self.latitude, self.longitude
            )));
        }
        if self.edge == Edge::Coast && self.coast.is_none() {
            return Err(ExportError::InvalidArea("edge is Coast but no coast side is set".into()));
        }
        Ok(())
    }

    /// Side length in metres.
    pub fn size_m(&self, cal: &Calibration) -> f64 {
        self.chunks as f64 * cal.chunk_size_m
    }

    /// Output grid: `chunks × 20 + 1` pixels square over the area extent.
    pub fn target_grid(&self, cal: &Calibration) -> GridSpec {
        let n = cal.target_size(self.chunks);
        GridSpec::new(self.crs.clone(), self.extent, n, n)
    }

    /// Single-feature layer carrying every attribute [`MapArea::from_layer`] reads.
    pub fn to_layer(&self, cal: &Calibration) -> FeatureCollection {
        let name = self.name.clone().unwrap_or_default();
        let feature = Feature::new(vec![Polygon::rect(&self.extent)])
            .with_property("name", name.clone())
            .with_property("size", self.size_m(cal) as i64)
            .with_property("chunks", self.chunks)
            .with_property("biome", self.biome.name())
            .with_property("edge", self.edge.name())
            .with_property("coast", self.coast.unwrap_or(CoastSide::North).name())
            .with_property("latitude", self.latitude)
            .with_property("longitude", self.longitude);
        FeatureCollection::new(self.crs.clone(), vec![feature]).with_name(&format!("Map-Area: {name}"))
    }
}

/// Builds a [`MapArea`] in the UTM zone of a chosen location.
#[derive(Debug, Clone)]
pub struct MapAreaBuilder {
    name: Option<String>,
    biome: Biome,
    edge: Edge,
    coast: CoastSide,
    improve_gps: bool,
    calibration: Calibration,
}

impl Default for MapAreaBuilder {
    fn default() -> Self {
        Self {
            name: None,
            biome: Biome::Boreal,
            edge: Edge::Water,
            coast: CoastSide::North,
            improve_gps: true,
            calibration: Calibration::default(),
        }
    }
}

impl MapAreaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn biome(mut self, biome: Biome) -> Self {
        self.biome = biome;
        self
    }

    pub fn edge(mut self, edge: Edge) -> Self {
        self.edge = edge;
        self
    }

    pub fn coast(mut self, coast: CoastSide) -> Self {
        self.coast = coast;
        self
    }

    /// Shift the reference longitude so in-game GPS readouts land closer
    /// to the real positions away from the equator.
    pub fn improve_gps(mut self, enabled: bool) -> Self {
        self.improve_gps = enabled;
        self
    }

    pub fn calibration(mut self, calibration: Calibration) -> Self {
        self.calibration = calibration;
        self
    }

    /// Largest chunk count fitting inside `extent` (WGS84 degrees), centred
    /// on its centre.
    pub fn from_wgs84_extent(&self, extent: &Extent) -> Result<MapArea> {
        if extent.is_empty() {
            return Err(ExportError::InvalidArea("reference extent is empty".into()));
        }
        let (lon, lat) = extent.center();
        let center = LatLon::new(lat, lon);
        let crs = Crs::utm_for(center);
        let to_utm = CoordTransform::new(&Crs::Wgs84, &crs).map_err(|e| ExportError::InvalidArea(e.to_string()))?;
        let utm_extent = to_utm.transform_extent(extent);
        let fit = (utm_extent.width().min(utm_extent.height()) / self.calibration.chunk_size_m).floor();
        let chunks = (fit.max(0.0) as u32).clamp(self.calibration.min_chunks, self.calibration.max_chunks);
        self.build(center, crs, chunks)
    }

    /// Area of exactly `chunks` chunks centred on `center`.
    pub fn from_center(&self, center: LatLon, chunks: u32) -> Result<MapArea> {
        let cal = &self.calibration;
        if !(cal.min_chunks..=cal.max_chunks).contains(&chunks) {
            return Err(ExportError::InvalidArea(format!(
                "chunks must be within {}..={}, got {chunks}",
                cal.min_chunks, cal.max_chunks
            )));
        }
        self.build(center, Crs::utm_for(center), chunks)
    }

    fn build(&self, center: LatLon, crs: Crs, chunks: u32) -> Result<MapArea> {
        if !(-80.0..=84.0).contains(&center.lat) || !(-180.0..=180.0).contains(&center.lon) {
            return Err(ExportError::InvalidArea(format!(
                "location {}, {} is outside the UTM range",
                center.lat, center.lon
            )));
        }
        let size = chunks as f64 * self.calibration.chunk_size_m;
        let err = |e: crate::raster::RasterError| ExportError::InvalidArea(e.to_string());
        let to_utm = CoordTransform::new(&Crs::Wgs84, &crs).map_err(err)?;
        let to_wgs = CoordTransform::new(&crs, &Crs::Wgs84).map_err(err)?;

        let (cx, cy) = to_utm.apply(center.lon, center.lat);
        let extent = Extent::square(cx, cy, size);
        let (sw_lon, sw_lat) = to_wgs.apply(extent.min_x, extent.min_y);
        let (_, centre_lat) = to_wgs.apply(cx, cy);

        let longitude = if self.improve_gps {
            sw_lon + gps_correction(size, centre_lat)
        } else {
            sw_lon
        };
        log::info!(
            "Map area: {} chunks ({} m) in {}, south-west corner {:.6}, {:.6}",
            chunks,
            size,
            crs,
            sw_lat,
            longitude
        );

        Ok(MapArea {
            name: self.name.clone(),
            crs,
            extent,
            chunks,
            biome: self.biome,
            edge: self.edge,
            coast: Some(self.coast),
            latitude: sw_lat,
            longitude,
        })
    }
}

/// Longitude offset in degrees for a map of `size_m` at latitude `phi_deg`.
pub fn gps_correction(size_m: f64, phi_deg: f64) -> f64 {
    size_m / (2.0 * METRES_PER_DEGREE) * (1.0 / phi_deg.to_radians().cos() - 1.0)
}
