/// Calculate distance between two coordinates using Haversine formula
/// Returns distance in kilometers
pub fn haversine_distance(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    const EARTH_RADIUS_KM: f64 = 6371.0;

    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let delta_lat = (lat2 - lat1).to_radians();
    let delta_lng = (lng2 - lng1).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();

    EARTH_RADIUS_KM * c
}

/// Check if a point lies within `max_radius_km` of a search center
pub fn is_within_radius(
    point_lat: f64,
    point_lng: f64,
    center_lat: f64,
    center_lng: f64,
    max_radius_km: f64,
) -> bool {
    haversine_distance(point_lat, point_lng, center_lat, center_lng) <= max_radius_km
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_haversine_chamonix_zermatt() {
        // Chamonix trailhead
        let chamonix = (45.9237, 6.8694);
        // Zermatt trailhead
        let zermatt = (46.0207, 7.7491);

        let distance = haversine_distance(chamonix.0, chamonix.1, zermatt.0, zermatt.1);
        // Should be approximately 65-75 km
        assert!(distance > 55.0 && distance < 85.0);
    }

    #[test]
    fn test_within_radius() {
        let center = (45.9237, 6.8694); // Chamonix
        let nearby = (45.93, 6.87);     // Very close to center

        assert!(is_within_radius(nearby.0, nearby.1, center.0, center.1, 10.0));

        let far = (46.0207, 7.7491);    // Zermatt
        assert!(!is_within_radius(far.0, far.1, center.0, center.1, 10.0));
    }
}
