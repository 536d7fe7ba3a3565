//! Universal Transverse Mercator on the WGS84 ellipsoid.
//!
//! Krüger series to third order in the third flattening `n`, which is
//! accurate to well below a millimetre inside a zone.
use crate::coords::LatLon;

const A: f64 = 6_378_137.0;
const F: f64 = 1.0 / 298.257_223_563;
const K0: f64 = 0.9996;
const FALSE_EASTING: f64 = 500_000.0;
const FALSE_NORTHING_SOUTH: f64 = 10_000_000.0;

struct Series {
    /// Rectifying radius.
    big_a: f64,
    alpha: [f64; 3],
    beta: [f64; 3],
    delta: [f64; 3],
    n: f64,
}

fn series() -> Series {
    let n = F / (2.0 - F);
    let n2 = n * n;
    let n3 = n2 * n;
    Series {
        big_a: A / (1.0 + n) * (1.0 + n2 / 4.0 + n2 * n2 / 64.0),
        alpha: [
            n / 2.0 - 2.0 * n2 / 3.0 + 5.0 * n3 / 16.0,
            13.0 * n2 / 48.0 - 3.0 * n3 / 5.0,
            61.0 * n3 / 240.0,
        ],
        beta: [
            n / 2.0 - 2.0 * n2 / 3.0 + 37.0 * n3 / 96.0,
            n2 / 48.0 + n3 / 15.0,
            17.0 * n3 / 480.0,
        ],
        delta: [
            2.0 * n - 2.0 * n2 / 3.0 - 2.0 * n3,
            7.0 * n2 / 3.0 - 8.0 * n3 / 5.0,
            56.0 * n3 / 15.0,
        ],
        n,
    }
}

/// Zone number (1–60) containing longitude `lon` in degrees.
pub fn zone_for(lon: f64) -> u8 {
    let zone = ((lon + 180.0) / 6.0).floor() as i64 + 1;
    zone.clamp(1, 60) as u8
}

/// Central meridian of `zone` in degrees.
pub fn central_meridian(zone: u8) -> f64 {
    zone as f64 * 6.0 - 183.0
}

/// Geographic → (easting, northing) in metres.
pub fn to_utm(ll: LatLon, zone: u8, north: bool) -> (f64, f64) {
    let s = series();
    let (phi, lambda) = ll.to_radians();
    let dl = lambda - central_meridian(zone).to_radians();

    let c = 2.0 * s.n.sqrt() / (1.0 + s.n);
    let t = (phi.sin().atanh() - c * (c * phi.sin()).atanh()).sinh();
    let xi_p = t.atan2(dl.cos());
    let eta_p = (dl.sin() / (1.0 + t * t).sqrt()).atanh();

    let mut xi = xi_p;
    let mut eta = eta_p;
    for (j, a) in s.alpha.iter().enumerate() {
        let k = 2.0 * (j + 1) as f64;
        xi += a * (k * xi_p).sin() * (k * eta_p).cosh();
        eta += a * (k * xi_p).cos() * (k * eta_p).sinh();
    }

    let easting = FALSE_EASTING + K0 * s.big_a * eta;
    let northing = K0 * s.big_a * xi + if north { 0.0 } else { FALSE_NORTHING_SOUTH };
    (easting, northing)
}

/// (easting, northing) in metres → geographic.
pub fn from_utm(easting: f64, northing: f64, zone: u8, north: bool) -> LatLon {
    let s = series();
    let n0 = if north { 0.0 } else { FALSE_NORTHING_SOUTH };
    let xi = (northing - n0) / (K0 * s.big_a);
    let eta = (easting - FALSE_EASTING) / (K0 * s.big_a);

    let mut xi_p = xi;
    let mut eta_p = eta;
    for (j, b) in s.beta.iter().enumerate() {
        let k = 2.0 * (j + 1) as f64;
        xi_p -= b * (k * xi).sin() * (k * eta).cosh();
        eta_p -= b * (k * xi).cos() * (k * eta).sinh();
    }

    let chi = (xi_p.sin() / eta_p.cosh()).asin();
    let mut phi = chi;
    for (j, d) in s.delta.iter().enumerate() {
        let k = 2.0 * (j + 1) as f64;
        phi += d * (k * chi).sin();
    }
    let lambda = central_meridian(zone).to_radians() + eta_p.sinh().atan2(xi_p.cos());

    LatLon::new(phi.to_degrees(), lambda.to_degrees())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zone_numbers() {
        assert_eq!(zone_for(-180.0), 1);
        assert_eq!(zone_for(0.5), 31);
        assert_eq!(zone_for(9.0), 32);
        assert_eq!(zone_for(179.9), 60);
        assert_eq!(zone_for(180.0), 60);
        assert_eq!(central_meridian(32), 9.0);
    }

    #[test]
    fn central_meridian_maps_to_false_easting() {
        let (e, n) = to_utm(LatLon::new(0.0, 3.0), 31, true);
        assert!((e - 500_000.0).abs() < 1e-6);
        assert!(n.abs() < 1e-6);
    }

    #[test]
    fn known_point_on_45th_parallel() {
        // Meridian arc to 45° is 4 984 944.378 m; scaled by k0.
        let (e, n) = to_utm(LatLon::new(45.0, 9.0), 32, true);
        assert!((e - 500_000.0).abs() < 1e-6);
        assert!((n - 4_982_950.4).abs() < 0.5, "northing {n}");
    }

    #[test]
    fn southern_hemisphere_roundtrip() {
        let ll = LatLon::new(-33.86, 151.21);
        let zone = zone_for(ll.lon);
        let (e, n) = to_utm(ll, zone, false);
        assert!(n > 6_000_000.0 && n < 6_400_000.0);
        let back = from_utm(e, n, zone, false);
        assert!((back.lat - ll.lat).abs() < 1e-8);
        assert!((back.lon - ll.lon).abs() < 1e-8);
    }
}
