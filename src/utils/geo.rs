const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance in meters between two WGS84 points.
pub fn haversine_distance_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (phi1, phi2) = (lat1.to_radians(), lat2.to_radians());
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * a.sqrt().asin()
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeofenceCheck {
    pub distance_m: f64,
    pub outside: bool,
}

/// Returns `None` when the site has no usable location or radius.
pub fn check_geofence(
    site_latitude: Option<f64>,
    site_longitude: Option<f64>,
    radius_m: Option<f64>,
    latitude: f64,
    longitude: f64,
) -> Option<GeofenceCheck> {
    let (site_lat, site_lon, radius) = (site_latitude?, site_longitude?, radius_m?);
    if radius <= 0.0 {
        return None;
    }
    let distance_m = haversine_distance_m(site_lat, site_lon, latitude, longitude);
    Some(GeofenceCheck {
        distance_m,
        outside: distance_m > radius,
    })
}
