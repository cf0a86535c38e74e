//! # Geo
//!
//! Great-circle distances for "nearby" lookups.
//!
//! Haversine on the mean earth radius, rounded to whole meters.
use serde::{Deserialize, Serialize};

use crate::error::Error;

pub const EARTH_RADIUS_METERS: f64 = 6_371_008.8;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Result<Self, Error> {
        let point = GeoPoint { lat, lng };
        point.validate()?;

        Ok(point)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if !self.lat.is_finite() || !(-90.0..=90.0).contains(&self.lat) {
            return Err(Error::invalid(format!("Invalid latitude: {}", self.lat)));
        }
        if !self.lng.is_finite() || !(-180.0..=180.0).contains(&self.lng) {
            return Err(Error::invalid(format!("Invalid longitude: {}", self.lng)));
        }

        Ok(())
    }
}

pub fn distance_meters(a: GeoPoint, b: GeoPoint) -> f64 {
    let (lat_a, lat_b) = (a.lat.to_radians(), b.lat.to_radians());
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat_a.cos() * lat_b.cos() * (d_lng / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    (EARTH_RADIUS_METERS * c).round()
}

/// Candidates within `radius_km` of `origin`, closest first, at most `limit`.
pub fn nearest<T, F>(
    origin: GeoPoint,
    radius_km: f64,
    candidates: impl IntoIterator<Item = T>,
    locate: F,
    limit: usize,
) -> Vec<(T, f64)>
where
    F: Fn(&T) -> Option<GeoPoint>,
{
    let max_meters = radius_km * 1000.0;

    let mut within: Vec<(T, f64)> = candidates
        .into_iter()
        .filter_map(|candidate| {
            let distance = distance_meters(origin, locate(&candidate)?);
            (distance <= max_meters).then_some((candidate, distance))
        })
        .collect();

    within.sort_by(|a, b| a.1.total_cmp(&b.1));
    within.truncate(limit);

    within
}
