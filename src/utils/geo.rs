// src/utils/geo.rs

//! Great-circle distance between coordinates.

/// Mean Earth radius in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Default radius within which a facility counts as nearby.
pub const NEARBY_RADIUS_M: f64 = 100_000.0;

/// Meters spanned by one degree of latitude.
pub const METERS_PER_DEGREE_LAT: f64 = EARTH_RADIUS_M * std::f64::consts::PI / 180.0;

/// Haversine distance in meters between two `(lat, lon)` points in degrees.
///
/// NaN inputs produce NaN.
pub fn distance_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    // Canonical argument order keeps the result bit-for-bit symmetric.
    let ((lat1, lon1), (lat2, lon2)) = if (lat1, lon1) > (lat2, lon2) {
        ((lat2, lon2), (lat1, lon1))
    } else {
        ((lat1, lon1), (lat2, lon2))
    };

    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_M * c
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEOUL_CITY_HALL: (f64, f64) = (37.5663, 126.9779);
    const BUSAN_STATION: (f64, f64) = (35.1151, 129.0422);

    #[test]
    fn test_identity_is_zero() {
        let (lat, lon) = SEOUL_CITY_HALL;
        assert_eq!(distance_m(lat, lon, lat, lon), 0.0);
    }

    #[test]
    fn test_symmetry() {
        let points = [
            SEOUL_CITY_HALL,
            BUSAN_STATION,
            (0.0, 0.0),
            (-33.8688, 151.2093),
            (89.9, -179.9),
        ];
        for &(a_lat, a_lon) in &points {
            for &(b_lat, b_lon) in &points {
                assert_eq!(
                    distance_m(a_lat, a_lon, b_lat, b_lon),
                    distance_m(b_lat, b_lon, a_lat, a_lon)
                );
            }
        }
    }

    #[test]
    fn test_seoul_to_busan() {
        let d = distance_m(
            SEOUL_CITY_HALL.0,
            SEOUL_CITY_HALL.1,
            BUSAN_STATION.0,
            BUSAN_STATION.1,
        );
        // ~329 km as the crow flies
        assert!((320_000.0..340_000.0).contains(&d), "got {d}");
        assert!(d > NEARBY_RADIUS_M);
    }

    #[test]
    fn test_one_degree_of_latitude() {
        let d = distance_m(10.0, 20.0, 11.0, 20.0);
        assert!((d - METERS_PER_DEGREE_LAT).abs() < 1e-6);
    }

    #[test]
    fn test_nan_propagates() {
        assert!(distance_m(f64::NAN, 0.0, 0.0, 0.0).is_nan());
        // NaN never passes a radius check
        assert!(!(distance_m(f64::NAN, 0.0, 0.0, 0.0) <= NEARBY_RADIUS_M));
    }
}
