//! Great-circle math for the geo index
//!
//! Distances use the haversine formula on a sphere with the same earth
//! radius the reference store uses, so results agree with data indexed by
//! other writers to within floating-point noise.

/// Earth radius in meters
pub const EARTH_RADIUS_M: f64 = 6_372_797.560_856;

/// Valid longitude range
pub const LONGITUDE_RANGE: (f64, f64) = (-180.0, 180.0);

/// Valid latitude range (the web-mercator band geohashes can encode)
pub const LATITUDE_RANGE: (f64, f64) = (-85.051_128_78, 85.051_128_78);

/// Reject coordinates outside the indexable band
pub fn validate_coordinates(longitude: f64, latitude: f64) -> Result<(), String> {
    if !longitude.is_finite() || !(LONGITUDE_RANGE.0..=LONGITUDE_RANGE.1).contains(&longitude) {
        return Err(format!("longitude {longitude} outside [-180, 180]"));
    }
    if !latitude.is_finite() || !(LATITUDE_RANGE.0..=LATITUDE_RANGE.1).contains(&latitude) {
        return Err(format!(
            "latitude {latitude} outside [{}, {}]",
            LATITUDE_RANGE.0, LATITUDE_RANGE.1
        ));
    }
    Ok(())
}

/// Haversine distance in meters between two `(longitude, latitude)` points
pub fn haversine_m(lon1: f64, lat1: f64, lon2: f64, lat2: f64) -> f64 {
    let lat1r = lat1.to_radians();
    let lat2r = lat2.to_radians();
    let u = ((lat2r - lat1r) / 2.0).sin();
    let v = ((lon2 - lon1).to_radians() / 2.0).sin();
    let a = u * u + lat1r.cos() * lat2r.cos() * v * v;
    2.0 * EARTH_RADIUS_M * a.sqrt().asin()
}
