//! Request body extractors.

use axum::extract::FromRequest;

use crate::error::ApiError;

/// `Json` whose rejections answer with the JSON error body.
///
/// Malformed bodies, a wrong content type and type mismatches all become
/// `400 validation_error`.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);
