//! HTTP route handlers for the gateway's own pages.

pub mod login;
pub mod setup;
pub mod user_admin;

use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};

/// A `302 Found` redirect.
///
/// Form posts rely on this: browsers follow a 302 after POST with a GET, so
/// redirect-after-write lands on the page variant of each route.
pub fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_owned())]).into_response()
}
