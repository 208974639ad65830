//! Pure geographic helpers: grid generation and great-circle distance.

/// Meters per degree of latitude, the flat-earth-enough approximation
/// used for grid spacing. Longitude degrees shrink by cos(latitude).
const METERS_PER_DEGREE: f64 = 111_000.0;

const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Generates an ordered square lattice of sample points covering the
/// bounding square of side `2 * radius_m` around the center, spaced by
/// `step_m`. The cover is a square, not a disk; callers post-filter by
/// [`haversine_m`] where a circular boundary matters.
pub(crate) fn generate_grid(
    center_lat: f64,
    center_lon: f64,
    radius_m: u32,
    step_m: u32,
) -> Vec<(f64, f64)> {
    let radius = radius_m as f64;
    let step = step_m.max(1) as f64;

    let lat_rad = center_lat.to_radians();
    let step_deg_lat = step / METERS_PER_DEGREE;
    let step_deg_lon = step / (METERS_PER_DEGREE * lat_rad.cos());

    let lat_min = center_lat - radius / METERS_PER_DEGREE;
    let lat_max = center_lat + radius / METERS_PER_DEGREE;
    let lon_min = center_lon - radius / (METERS_PER_DEGREE * lat_rad.cos());
    let lon_max = center_lon + radius / (METERS_PER_DEGREE * lat_rad.cos());

    let mut points = Vec::new();
    let mut lat = lat_min;
    while lat < lat_max {
        let mut lon = lon_min;
        while lon < lon_max {
            points.push((lat, lon));
            lon += step_deg_lon;
        }
        lat += step_deg_lat;
    }
    points
}

/// Default grid step for a given search radius: a third of the radius,
/// capped at 1 km.
pub(crate) fn default_grid_step(radius_m: u32) -> u32 {
    (radius_m / 3).min(1000).max(1)
}

/// Great-circle distance in meters between two (lat, lon) points.
pub(crate) fn haversine_m(a: (f64, f64), b: (f64, f64)) -> f64 {
    let (lat1, lon1) = (a.0.to_radians(), a.1.to_radians());
    let (lat2, lon2) = (b.0.to_radians(), b.1.to_radians());
    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().asin()
}
