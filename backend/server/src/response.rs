use std::time::Duration;

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header::SET_COOKIE},
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::auth::TOKEN_COOKIE;

#[derive(Serialize)]
struct Envelope<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    count: Option<usize>,
    data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

/// `{ success, data, count?, message?, token? }`, optionally setting the session cookie.
pub struct Reply<T> {
    status: StatusCode,
    envelope: Envelope<T>,
    cookie: Option<String>,
}

impl<T: Serialize> Reply<T> {
    pub fn ok(data: T) -> Self {
        Self {
            status: StatusCode::OK,
            envelope: Envelope {
                success: true,
                token: None,
                count: None,
                data,
                message: None,
            },
            cookie: None,
        }
    }

    pub fn created(data: T) -> Self {
        Self {
            status: StatusCode::CREATED,
            ..Self::ok(data)
        }
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.envelope.message = Some(message.into());
        self
    }

    pub fn session(mut self, token: String, max_age: Duration) -> Self {
        self.cookie = Some(format!(
            "{TOKEN_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
            max_age.as_secs()
        ));
        self.envelope.token = Some(token);
        self
    }

    pub fn end_session(mut self) -> Self {
        self.cookie = Some(format!(
            "{TOKEN_COOKIE}=none; Path=/; HttpOnly; SameSite=Lax; Max-Age=0"
        ));
        self
    }
}

impl<T: Serialize> Reply<Vec<T>> {
    pub fn list(items: Vec<T>) -> Self {
        let count = items.len();
        let mut reply = Self::ok(items);
        reply.envelope.count = Some(count);
        reply
    }
}

impl<T: Serialize> IntoResponse for Reply<T> {
    fn into_response(self) -> Response {
        let mut response = (self.status, Json(self.envelope)).into_response();

        if let Some(cookie) = self.cookie.and_then(|cookie| HeaderValue::from_str(&cookie).ok()) {
            response.headers_mut().insert(SET_COOKIE, cookie);
        }

        response
    }
}
