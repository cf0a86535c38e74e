use axum::extract::{FromRequest, FromRequestParts};
use bank::{BloodGroup, GeoPoint, Role, User};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;

/// JSON body, malformed input becomes a 400 envelope.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct Payload<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(AppError))]
pub struct Params<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(AppError))]
pub struct PathId<T>(pub T);

#[derive(Debug, Deserialize)]
pub struct LocationInput {
    pub lat: f64,
    pub lng: f64,
}

impl LocationInput {
    pub fn point(&self) -> Result<GeoPoint, AppError> {
        Ok(GeoPoint::new(self.lat, self.lng)?)
    }
}

const DEFAULT_RADIUS_KM: f64 = 10.0;

/// Origin and radius in kilometres of a nearby search, 10 km unless given.
pub fn search_area(
    lat: Option<f64>,
    lng: Option<f64>,
    radius: Option<f64>,
) -> Result<(GeoPoint, f64), AppError> {
    let (Some(lat), Some(lng)) = (lat, lng) else {
        return Err(AppError::validation("Please provide latitude and longitude"));
    };
    let origin = LocationInput { lat, lng }.point()?;

    let radius = radius.unwrap_or(DEFAULT_RADIUS_KM);
    if !radius.is_finite() || radius <= 0.0 {
        return Err(AppError::validation("Radius must be a positive number of kilometres"));
    }

    Ok((origin, radius))
}

/// Query strings decode `+` as a space, so `?bloodGroup=A+` arrives as `A `.
pub fn parse_blood_group(raw: &str) -> Result<BloodGroup, AppError> {
    Ok(raw.trim_start().replace(' ', "+").parse::<BloodGroup>()?)
}

/// Own account, or any account for an admin.
pub fn ensure_self_or_admin(user: &User, target: Uuid) -> Result<(), AppError> {
    if user.id == target || user.role == Role::Admin {
        Ok(())
    } else {
        Err(AppError::Forbidden(
            "Not authorized to update this user".to_string(),
        ))
    }
}
