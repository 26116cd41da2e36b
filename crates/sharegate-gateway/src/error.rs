//! HTTP error type for the gateway.
//!
//! This server speaks HTML to browsers, so errors render as styled pages,
//! not JSON. Expected failures (bad credentials, validation) are handled as
//! redirects inside the handlers; [`AppError`] covers the unexpected rest.

use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};

use sharegate_vault::error::StoreError;

use crate::pages;

/// Application-level error returned from HTTP handlers.
///
/// One variant is enough: every expected failure already turned into a
/// redirect by the time an error reaches this type.
#[derive(Debug)]
pub struct AppError(pub String);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        tracing::error!(error = %self.0, "internal error while handling request");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Html(pages::render_internal_error()),
        )
            .into_response()
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        Self(err.to_string())
    }
}
