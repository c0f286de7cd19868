//! # Error Handling
//!
//! This module defines the service's error type and how it is turned into an HTTP response.
//!
//! ## Error Categories:
//! - **Client errors** (400): the upload is missing, has an empty filename, is too large
//!   or the multipart body itself is malformed
//! - **Processing errors** (500): decoding, transforming or encoding the audio failed
//! - **Internal errors** (500): scratch file I/O, blocking worker pool failures
//!
//! ## Response Shape:
//! Every error, whatever its category, is rendered the same way so clients only need
//! to handle a single format:
//! ```json
//! { "success": false, "error": "No audio file provided" }
//! ```
//!
//! ## Key Rust Concepts:
//! - **ResponseError trait**: actix-web calls `error_response()` whenever a handler
//!   returns `Err(AppError)`, so handlers can simply use `?`
//! - **From trait**: lets `?` convert `anyhow::Error` and `std::io::Error` into
//!   `AppError` automatically

use actix_web::http::StatusCode;        // Type-safe HTTP status codes
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;                   // For building the JSON error body
use std::fmt;                           // For implementing Display

/// Errors that can escape a request handler.
///
/// ## Usage Example:
/// ```rust
/// return Err(AppError::BadRequest("Empty filename".to_string()));
/// ```
#[derive(Debug)]
pub enum AppError {
    /// Client sent an unusable upload (missing field, empty filename, too large)
    BadRequest(String),

    /// The anonymization pipeline failed (corrupt input, silent signal, encode failure)
    Processing(String),

    /// Server-side failures unrelated to the audio itself (scratch I/O, thread pool)
    Internal(String),
}

impl AppError {
    /// The bare message that is sent to the client in the `error` field.
    pub fn message(&self) -> &str {
        match self {
            AppError::BadRequest(msg) | AppError::Processing(msg) | AppError::Internal(msg) => msg,
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::Processing(msg) => write!(f, "Processing error: {}", msg),
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

/// Converts an `AppError` into the `{success:false, error}` JSON response.
///
/// ## HTTP Status Code Mapping:
/// - BadRequest → 400 (Bad Request)
/// - Processing/Internal → 500 (Internal Server Error)
///
/// The client only ever sees the bare message; the category prefix from `Display`
/// is kept for logs.
impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,  // 400
            AppError::Processing(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,  // 500
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({
            "success": false,
            "error": self.message()
        }))
    }
}

/// Pipeline failures arrive as `anyhow::Error` with a context chain.
///
/// ## Why the alternate format:
/// `{:#}` renders the whole chain on one line ("Failed to decode audio: end of stream"),
/// which is far more useful to a client than the outermost context alone.
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Processing(format!("{:#}", err))
    }
}

/// Scratch file reads and writes that fail are server-side problems.
impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

/// Shorthand for `Result<T, AppError>`.
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::MessageBody;

    fn body_json(err: &AppError) -> serde_json::Value {
        let bytes = err
            .error_response()
            .into_body()
            .try_into_bytes()
            .ok()
            .expect("json body is buffered");
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_bad_request_maps_to_400() {
        let err = AppError::BadRequest("Empty filename".to_string());
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);

        let body = body_json(&err);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "Empty filename");
    }

    #[test]
    fn test_processing_error_maps_to_500() {
        let err = AppError::Processing("cannot normalize silent audio".to_string());
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(&err)["error"], "cannot normalize silent audio");
    }

    #[test]
    fn test_anyhow_chain_is_flattened() {
        let err: AppError = anyhow::anyhow!("end of stream")
            .context("Failed to decode audio")
            .into();

        assert!(matches!(err, AppError::Processing(_)));
        assert_eq!(err.message(), "Failed to decode audio: end of stream");
    }

    #[test]
    fn test_io_error_is_internal() {
        let err: AppError = std::io::Error::new(std::io::ErrorKind::Other, "disk full").into();
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.to_string().starts_with("Internal error"));
    }
}
