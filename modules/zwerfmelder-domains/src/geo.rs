use std::f64::consts::PI;

const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Haversine great-circle distance between two lat/lng points in meters.
/// Out-of-range inputs propagate as NaN; callers validate coordinate ranges.
pub fn haversine_meters(lat_a: f64, lng_a: f64, lat_b: f64, lng_b: f64) -> f64 {
    let to_rad = |deg: f64| deg * PI / 180.0;

    let d_lat = to_rad(lat_b - lat_a);
    let d_lng = to_rad(lng_b - lng_a);

    let a = (d_lat / 2.0).sin().powi(2)
        + to_rad(lat_a).cos() * to_rad(lat_b).cos() * (d_lng / 2.0).sin().powi(2);

    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_METERS * c
}
