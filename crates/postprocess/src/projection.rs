//! Sensor-position projection
//!
//! Converts polar measurements (bearing from true north, slant range,
//! optional target altitude) taken by a sensor at a known WGS-84 position
//! into target latitude and longitude.
//!
//! The measurement is placed in the sensor's local east-north-up frame,
//! rotated into earth-centred earth-fixed coordinates and converted back to
//! geodetic.

use contracts::SensorPosition;
use nalgebra::{Matrix3, Vector3};

/// WGS-84 semi-major axis in meters
const WGS84_A: f64 = 6_378_137.0;
/// WGS-84 flattening
const WGS84_F: f64 = 1.0 / 298.257_223_563;
/// Iterations of the geodetic latitude fixpoint
const GEODETIC_ITERATIONS: usize = 6;

fn eccentricity_sq() -> f64 {
    WGS84_F * (2.0 - WGS84_F)
}

/// Geodetic degrees and ellipsoidal height to ECEF meters
pub fn geodetic_to_ecef(lat_deg: f64, lon_deg: f64, height: f64) -> Vector3<f64> {
    let e2 = eccentricity_sq();
    let (sin_lat, cos_lat) = lat_deg.to_radians().sin_cos();
    let (sin_lon, cos_lon) = lon_deg.to_radians().sin_cos();
    let n = WGS84_A / (1.0 - e2 * sin_lat * sin_lat).sqrt();
    Vector3::new(
        (n + height) * cos_lat * cos_lon,
        (n + height) * cos_lat * sin_lon,
        (n * (1.0 - e2) + height) * sin_lat,
    )
}

/// ECEF meters to geodetic `(lat_deg, lon_deg, height)`
pub fn ecef_to_geodetic(ecef: &Vector3<f64>) -> (f64, f64, f64) {
    let e2 = eccentricity_sq();
    let lon = ecef.y.atan2(ecef.x);
    let p = ecef.x.hypot(ecef.y);

    let mut lat = ecef.z.atan2(p * (1.0 - e2));
    let mut height = 0.0;
    for _ in 0..GEODETIC_ITERATIONS {
        let sin_lat = lat.sin();
        let n = WGS84_A / (1.0 - e2 * sin_lat * sin_lat).sqrt();
        height = if lat.cos().abs() > 1e-12 {
            p / lat.cos() - n
        } else {
            ecef.z.abs() - n * (1.0 - e2)
        };
        lat = ecef.z.atan2(p * (1.0 - e2 * n / (n + height)));
    }
    (lat.to_degrees(), lon.to_degrees(), height)
}

/// Projection frame anchored at one sensor
#[derive(Debug, Clone)]
pub struct ProjectionContext {
    origin_ecef: Vector3<f64>,
    /// Columns are the east, north and up unit vectors in ECEF
    enu_to_ecef: Matrix3<f64>,
    origin_altitude: f64,
}

impl ProjectionContext {
    pub fn new(position: &SensorPosition) -> Self {
        let (sin_lat, cos_lat) = position.latitude.to_radians().sin_cos();
        let (sin_lon, cos_lon) = position.longitude.to_radians().sin_cos();

        let east = Vector3::new(-sin_lon, cos_lon, 0.0);
        let north = Vector3::new(-sin_lat * cos_lon, -sin_lat * sin_lon, cos_lat);
        let up = Vector3::new(cos_lat * cos_lon, cos_lat * sin_lon, sin_lat);

        Self {
            origin_ecef: geodetic_to_ecef(position.latitude, position.longitude, position.altitude_m),
            enu_to_ecef: Matrix3::from_columns(&[east, north, up]),
            origin_altitude: position.altitude_m,
        }
    }

    /// Local east-north-up offset of a polar measurement.
    ///
    /// With a target altitude the slant range is reduced to its ground
    /// component; without one the range is taken as horizontal.
    pub fn polar_to_enu(&self, bearing_deg: f64, range_m: f64, altitude_m: Option<f64>) -> Vector3<f64> {
        let (ground, up) = match altitude_m {
            Some(altitude) => {
                let dz = altitude - self.origin_altitude;
                ((range_m * range_m - dz * dz).max(0.0).sqrt(), dz)
            }
            None => (range_m, 0.0),
        };
        let (sin_b, cos_b) = bearing_deg.to_radians().sin_cos();
        Vector3::new(ground * sin_b, ground * cos_b, up)
    }

    /// Project a polar measurement to `(latitude, longitude)` in degrees
    pub fn project(&self, bearing_deg: f64, range_m: f64, altitude_m: Option<f64>) -> (f64, f64) {
        let enu = self.polar_to_enu(bearing_deg, range_m, altitude_m);
        let ecef = self.origin_ecef + self.enu_to_ecef * enu;
        let (lat, lon, _) = ecef_to_geodetic(&ecef);
        (lat, lon)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position(lat: f64, lon: f64, alt: f64) -> SensorPosition {
        SensorPosition {
            sensor: "psr_north".into(),
            latitude: lat,
            longitude: lon,
            altitude_m: alt,
        }
    }

    #[test]
    fn test_geodetic_round_trip() {
        let ecef = geodetic_to_ecef(48.35, 11.78, 450.0);
        let (lat, lon, h) = ecef_to_geodetic(&ecef);
        assert!((lat - 48.35).abs() < 1e-9);
        assert!((lon - 11.78).abs() < 1e-9);
        assert!((h - 450.0).abs() < 1e-4);
    }

    #[test]
    fn test_zero_range_is_sensor_position() {
        let ctx = ProjectionContext::new(&position(50.03, 8.57, 110.0));
        let (lat, lon) = ctx.project(123.0, 0.0, None);
        assert!((lat - 50.03).abs() < 1e-9);
        assert!((lon - 8.57).abs() < 1e-9);
    }

    #[test]
    fn test_north_and_east_offsets_at_equator() {
        let ctx = ProjectionContext::new(&position(0.0, 0.0, 0.0));

        let (lat, lon) = ctx.project(0.0, 1_000.0, None);
        // one degree of latitude at the equator is about 110.57 km
        assert!((lat - 1_000.0 / 110_574.0).abs() < 1e-4);
        assert!(lon.abs() < 1e-9);

        let (lat, lon) = ctx.project(90.0, 1_000.0, None);
        assert!(lat.abs() < 1e-6);
        assert!((lon - 1_000.0 / 111_320.0).abs() < 1e-4);
    }

    #[test]
    fn test_slant_range_reduced_by_altitude() {
        let ctx = ProjectionContext::new(&position(45.0, 7.0, 100.0));
        let enu = ctx.polar_to_enu(0.0, 5_000.0, Some(3_100.0));
        assert!((enu.y - 4_000.0).abs() < 1e-9);
        assert!((enu.z - 3_000.0).abs() < 1e-9);

        // altitude difference larger than range clamps the ground distance
        let enu = ctx.polar_to_enu(0.0, 100.0, Some(1_000.0));
        assert_eq!(enu.y, 0.0);
    }
}
