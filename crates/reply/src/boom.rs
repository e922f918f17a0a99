//! HTTP-facing errors and the policy that maps arbitrary errors onto them.
//!
//! An [`HttpError`] is the triple a failed response is made of: a status, extra headers
//! and a JSON payload of the form
//!
//! ```json
//! { "statusCode": 404, "error": "Not Found", "message": "missing.txt" }
//! ```
//!
//! Server errors (5xx) never leak their message to the client: the payload carries a
//! generic message while the original error stays available as the source for logging.

use crate::error::{BoxError, TransmitError};
use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, StatusCode};
use serde_json::json;
use std::fmt;

const INTERNAL_MESSAGE: &str = "An internal server error occurred";

#[derive(Debug)]
pub struct HttpError {
    status: StatusCode,
    message: String,
    headers: HeaderMap,
    source: Option<BoxError>,
}

impl HttpError {
    pub fn new<S: ToString>(status: StatusCode, message: S) -> Self {
        Self { status, message: message.to_string(), headers: HeaderMap::new(), source: None }
    }

    pub fn bad_request<S: ToString>(message: S) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn forbidden<S: ToString>(message: S) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn not_found<S: ToString>(message: S) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn internal<E: Into<BoxError>>(source: E) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_MESSAGE).with_source(source)
    }

    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    #[must_use]
    pub fn with_source<E: Into<BoxError>>(mut self, source: E) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn is_server(&self) -> bool {
        self.status.is_server_error()
    }

    /// The JSON body sent to the client.
    pub fn payload(&self) -> serde_json::Value {
        let message = if self.is_server() { INTERNAL_MESSAGE } else { self.message.as_str() };
        json!({
            "statusCode": self.status.as_u16(),
            "error": self.status.canonical_reason().unwrap_or("Unknown"),
            "message": message,
        })
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.status, self.message)
    }
}

impl std::error::Error for HttpError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Converts arbitrary errors into [`HttpError`]s.
pub trait ErrorMapper: Send + Sync {
    fn map(&self, error: BoxError) -> HttpError;
}

/// Keeps typed [`HttpError`]s (also when wrapped as the source of a marshal error) and
/// turns everything else into a 500.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultErrorMapper;

impl ErrorMapper for DefaultErrorMapper {
    fn map(&self, error: BoxError) -> HttpError {
        let error = match error.downcast::<HttpError>() {
            Ok(http_error) => return *http_error,
            Err(error) => error,
        };

        match error.downcast::<TransmitError>() {
            Ok(transmit_error) => match *transmit_error {
                TransmitError::Marshal { source: Some(source), .. } => self.map(source),
                other => HttpError::internal(other),
            },
            Err(error) => HttpError::internal(error),
        }
    }
}

impl<F> ErrorMapper for F
where
    F: Fn(BoxError) -> HttpError + Send + Sync,
{
    fn map(&self, error: BoxError) -> HttpError {
        self(error)
    }
}
