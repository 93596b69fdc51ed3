// src/services/nearby.rs

//! In-memory nearby-pharmacy index.
//!
//! Pharmacies are read once in bulk and joined against hospitals in memory,
//! instead of issuing one geo query per hospital.

use crate::models::{NearbyPharmacy, Pharmacy};
use crate::utils::geo::{self, METERS_PER_DEGREE_LAT};

/// Immutable snapshot of pharmacies with known coordinates.
#[derive(Debug, Clone, Default)]
pub struct NearbyIndex {
    /// Candidates sorted by latitude
    candidates: Vec<(f64, f64, Pharmacy)>,
    radius_m: f64,
    limit: usize,
}

impl NearbyIndex {
    /// Build an index from a bulk pharmacy read.
    ///
    /// Pharmacies without usable coordinates are dropped.
    pub fn new(pharmacies: Vec<Pharmacy>, radius_m: f64, limit: usize) -> Self {
        let mut candidates: Vec<(f64, f64, Pharmacy)> = pharmacies
            .into_iter()
            .filter_map(|p| p.position().map(|(lat, lon)| (lat, lon, p)))
            .collect();
        candidates.sort_by(|a, b| a.0.total_cmp(&b.0));

        Self {
            candidates,
            radius_m,
            limit,
        }
    }

    /// An index with no candidates.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Pharmacies within the radius of `position`, closest first.
    ///
    /// `None` (no coordinates) yields an empty list.
    pub fn nearby(&self, position: Option<(f64, f64)>) -> Vec<NearbyPharmacy> {
        let Some((lat, lon)) = position else {
            return Vec::new();
        };
        if self.limit == 0 || !lat.is_finite() || !lon.is_finite() {
            return Vec::new();
        }

        // Latitude band: nothing outside it can be within the radius.
        let band = self.radius_m / METERS_PER_DEGREE_LAT;
        let lower = self
            .candidates
            .partition_point(|(c_lat, _, _)| *c_lat < lat - band);

        let mut found: Vec<NearbyPharmacy> = self.candidates[lower..]
            .iter()
            .take_while(|(c_lat, _, _)| *c_lat <= lat + band)
            .filter_map(|(c_lat, c_lon, pharmacy)| {
                let distance = geo::distance_m(lat, lon, *c_lat, *c_lon);
                (distance <= self.radius_m).then(|| NearbyPharmacy {
                    pharmacy: pharmacy.clone(),
                    distance,
                })
            })
            .collect();

        found.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        found.truncate(self.limit);
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::geo::NEARBY_RADIUS_M;

    fn pharmacy(name: &str, lat: f64, lon: f64) -> Pharmacy {
        Pharmacy {
            yadm_nm: Some(name.into()),
            lat: Some(lat),
            lon: Some(lon),
            ..Pharmacy::default()
        }
    }

    fn index() -> NearbyIndex {
        NearbyIndex::new(
            vec![
                pharmacy("광화문약국", 37.5720, 126.9769),
                pharmacy("신촌약국", 37.5597, 126.9423),
                pharmacy("해운대약국", 35.1631, 129.1635),
                Pharmacy {
                    yadm_nm: Some("좌표없음약국".into()),
                    ..Pharmacy::default()
                },
            ],
            NEARBY_RADIUS_M,
            50,
        )
    }

    #[test]
    fn test_drops_pharmacies_without_coordinates() {
        assert_eq!(index().len(), 3);
    }

    #[test]
    fn test_nearby_within_radius_sorted() {
        let found = index().nearby(Some((37.5663, 126.9779)));

        let names: Vec<_> = found
            .iter()
            .map(|n| n.pharmacy.yadm_nm.as_deref().unwrap())
            .collect();
        assert_eq!(names, vec!["광화문약국", "신촌약국"]);
        assert!(found.iter().all(|n| n.distance <= NEARBY_RADIUS_M));
        assert!(found[0].distance < found[1].distance);
    }

    #[test]
    fn test_missing_position_is_empty() {
        assert!(index().nearby(None).is_empty());
    }

    #[test]
    fn test_limit_truncates_closest_first() {
        let limited = NearbyIndex::new(
            vec![
                pharmacy("far", 37.60, 126.98),
                pharmacy("near", 37.567, 126.978),
            ],
            NEARBY_RADIUS_M,
            1,
        );
        let found = limited.nearby(Some((37.5663, 126.9779)));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].pharmacy.yadm_nm.as_deref(), Some("near"));
    }

    #[test]
    fn test_band_filter_matches_brute_force() {
        let pharmacies: Vec<Pharmacy> = (0..200)
            .map(|i| {
                let lat = 33.0 + (i as f64) * 0.03;
                let lon = 126.0 + ((i * 7) % 30) as f64 * 0.1;
                pharmacy(&format!("p{i}"), lat, lon)
            })
            .collect();
        let index = NearbyIndex::new(pharmacies.clone(), NEARBY_RADIUS_M, usize::MAX);
        let origin = (36.0, 127.5);

        let expected = pharmacies
            .iter()
            .filter(|p| {
                geo::distance_m(origin.0, origin.1, p.lat.unwrap(), p.lon.unwrap())
                    <= NEARBY_RADIUS_M
            })
            .count();

        assert_eq!(index.nearby(Some(origin)).len(), expected);
        assert!(expected > 0);
    }
}
