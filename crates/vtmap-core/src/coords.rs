/// Coordinate reference systems, extents and point transforms.
/// All coordinate math uses f64 for precision.
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::raster::RasterError;
use crate::utm;

/// A point on the ellipsoid in geographic coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLon {
    /// Latitude in degrees, -90 to +90.
    pub lat: f64,
    /// Longitude in degrees, -180 to +180.
    pub lon: f64,
}

impl LatLon {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Convert to radians.
    pub fn to_radians(self) -> (f64, f64) {
        (self.lat.to_radians(), self.lon.to_radians())
    }
}

/// Coordinate reference system of a raster or vector layer.
///
/// Only WGS84 and the WGS84 UTM zones can be transformed natively; any other
/// authority string is carried through untouched so that layers sharing it
/// can still be combined without a transform.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Crs {
    /// EPSG:4326, x = longitude, y = latitude.
    Wgs84,
    /// EPSG:326zz (north) / EPSG:327zz (south).
    Utm { zone: u8, north: bool },
    Other(String),
}

impl Crs {
    pub fn from_epsg(code: u32) -> Self {
        match code {
            4326 => Crs::Wgs84,
            32601..=32660 => Crs::Utm { zone: (code - 32600) as u8, north: true },
            32701..=32760 => Crs::Utm { zone: (code - 32700) as u8, north: false },
            _ => Crs::Other(format!("EPSG:{code}")),
        }
    }

    /// Parse `EPSG:nnnn`, OGC URNs (`urn:ogc:def:crs:EPSG::nnnn`) and CRS84.
    pub fn parse(s: &str) -> Self {
        let trimmed = s.trim();
        if trimmed.ends_with("CRS84") {
            return Crs::Wgs84;
        }
        let code = trimmed
            .strip_prefix("EPSG:")
            .or_else(|| trimmed.strip_prefix("epsg:"))
            .or_else(|| trimmed.strip_prefix("urn:ogc:def:crs:EPSG::"))
            .and_then(|c| c.parse::<u32>().ok());
        match code {
            Some(c) => Self::from_epsg(c),
            None => Crs::Other(trimmed.to_string()),
        }
    }

    /// UTM zone CRS containing `ll` (zone of the longitude, hemisphere of the latitude).
    pub fn utm_for(ll: LatLon) -> Self {
        Crs::Utm { zone: utm::zone_for(ll.lon), north: ll.lat >= 0.0 }
    }

    pub fn epsg(&self) -> Option<u32> {
        match self {
            Crs::Wgs84 => Some(4326),
            Crs::Utm { zone, north: true } => Some(32600 + *zone as u32),
            Crs::Utm { zone, north: false } => Some(32700 + *zone as u32),
            Crs::Other(s) => s.strip_prefix("EPSG:").and_then(|c| c.parse().ok()),
        }
    }

    pub fn is_geographic(&self) -> bool {
        matches!(self, Crs::Wgs84)
    }

    pub fn authid(&self) -> String {
        match self {
            Crs::Other(s) => s.clone(),
            _ => format!("EPSG:{}", self.epsg().unwrap_or_default()),
        }
    }

    fn to_geographic(&self, x: f64, y: f64) -> LatLon {
        match *self {
            Crs::Utm { zone, north } => utm::from_utm(x, y, zone, north),
            _ => LatLon::new(y, x),
        }
    }

    fn from_geographic(&self, ll: LatLon) -> (f64, f64) {
        match *self {
            Crs::Utm { zone, north } => utm::to_utm(ll, zone, north),
            _ => (ll.lon, ll.lat),
        }
    }
}

impl From<String> for Crs {
    fn from(s: String) -> Self {
        Crs::parse(&s)
    }
}

impl From<Crs> for String {
    fn from(crs: Crs) -> Self {
        crs.authid()
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.authid())
    }
}

/// Axis-aligned rectangle in CRS units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Extent {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Extent {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self { min_x, min_y, max_x, max_y }
    }

    /// Square of side `size` centred on `(cx, cy)`.
    pub fn square(cx: f64, cy: f64, size: f64) -> Self {
        let half = size / 2.0;
        Self::new(cx - half, cy - half, cx + half, cy + half)
    }

    /// Bounding box of a point set. `None` for an empty set.
    pub fn from_points<I: IntoIterator<Item = (f64, f64)>>(points: I) -> Option<Self> {
        points.into_iter().fold(None, |acc, (x, y)| {
            Some(match acc {
                None => Self::new(x, y, x, y),
                Some(e) => Self::new(e.min_x.min(x), e.min_y.min(y), e.max_x.max(x), e.max_y.max(y)),
            })
        })
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    pub fn center(&self) -> (f64, f64) {
        ((self.min_x + self.max_x) / 2.0, (self.min_y + self.max_y) / 2.0)
    }

    pub fn is_empty(&self) -> bool {
        !(self.width() > 0.0 && self.height() > 0.0)
    }

    /// True when width and height differ by at most `tolerance` CRS units.
    pub fn is_square(&self, tolerance: f64) -> bool {
        (self.width() - self.height()).abs() <= tolerance
    }
}

/// Point transform between two CRSs, routed through WGS84.
#[derive(Debug, Clone)]
pub struct CoordTransform {
    from: Crs,
    to: Crs,
    identity: bool,
}

impl CoordTransform {
    pub fn new(from: &Crs, to: &Crs) -> Result<Self, RasterError> {
        if from == to {
            return Ok(Self { from: from.clone(), to: to.clone(), identity: true });
        }
        let supported = |c: &Crs| !matches!(c, Crs::Other(_));
        if !supported(from) || !supported(to) {
            return Err(RasterError::UnsupportedTransform {
                from: from.authid(),
                to: to.authid(),
            });
        }
        Ok(Self { from: from.clone(), to: to.clone(), identity: false })
    }

    pub fn is_identity(&self) -> bool {
        self.identity
    }

    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        if self.identity {
            return (x, y);
        }
        self.to.from_geographic(self.from.to_geographic(x, y))
    }

    /// Transform an extent by densifying its edges (21 points per side).
    pub fn transform_extent(&self, e: &Extent) -> Extent {
        if self.identity {
            return *e;
        }
        const STEPS: usize = 20;
        let mut points = Vec::with_capacity(4 * (STEPS + 1));
        for i in 0..=STEPS {
            let t = i as f64 / STEPS as f64;
            let x = e.min_x + t * e.width();
            let y = e.min_y + t * e.height();
            points.push(self.apply(x, e.min_y));
            points.push(self.apply(x, e.max_y));
            points.push(self.apply(e.min_x, y));
            points.push(self.apply(e.max_x, y));
        }
        Extent::from_points(points).unwrap_or(*e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_epsg_variants() {
        assert_eq!(Crs::parse("EPSG:4326"), Crs::Wgs84);
        assert_eq!(Crs::parse("EPSG:32633"), Crs::Utm { zone: 33, north: true });
        assert_eq!(Crs::parse("urn:ogc:def:crs:EPSG::32733"), Crs::Utm { zone: 33, north: false });
        assert_eq!(Crs::parse("urn:ogc:def:crs:OGC:1.3:CRS84"), Crs::Wgs84);
        assert_eq!(Crs::parse("EPSG:3857"), Crs::Other("EPSG:3857".into()));
        assert_eq!(Crs::Utm { zone: 5, north: false }.authid(), "EPSG:32705");
    }

    #[test]
    fn serde_uses_authority_string() {
        let json = serde_json::to_string(&Crs::Utm { zone: 32, north: true }).unwrap();
        assert_eq!(json, "\"EPSG:32632\"");
        let back: Crs = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Crs::Utm { zone: 32, north: true });
    }

    #[test]
    fn unknown_crs_pair_is_rejected() {
        let err = CoordTransform::new(&Crs::Other("EPSG:3857".into()), &Crs::Wgs84);
        assert!(matches!(err, Err(RasterError::UnsupportedTransform { .. })));
        // Identical unknown CRSs need no transform.
        let same = Crs::Other("EPSG:3857".into());
        assert!(CoordTransform::new(&same, &same).unwrap().is_identity());
    }

    #[test]
    fn wgs84_utm_roundtrip_within_tolerance() {
        let utm = Crs::Utm { zone: 32, north: true };
        let fwd = CoordTransform::new(&Crs::Wgs84, &utm).unwrap();
        let inv = CoordTransform::new(&utm, &Crs::Wgs84).unwrap();
        for &(lon, lat) in &[(9.0, 45.0), (7.5, 47.2), (11.9, 60.1), (6.2, 0.5)] {
            let (e, n) = fwd.apply(lon, lat);
            let (lon2, lat2) = inv.apply(e, n);
            assert!((lon - lon2).abs() < 1e-7, "lon {lon} → {lon2}");
            assert!((lat - lat2).abs() < 1e-7, "lat {lat} → {lat2}");
        }
    }

    #[test]
    fn extent_helpers() {
        let e = Extent::square(100.0, 200.0, 50.0);
        assert_eq!(e.width(), 50.0);
        assert!(e.is_square(1e-9));
        assert_eq!(e.center(), (100.0, 200.0));
        let b = Extent::from_points([(1.0, 5.0), (-2.0, 3.0), (4.0, -1.0)]).unwrap();
        assert_eq!(b, Extent::new(-2.0, -1.0, 4.0, 5.0));
        assert!(Extent::from_points(std::iter::empty()).is_none());
    }
}
