//! Response head types.
//!
//! The head of a response is represented by `http::Response<()>`: status, version and
//! header map without a body. The payload is streamed separately as [`PayloadItem`]s.
//!
//! [`PayloadItem`]: crate::protocol::PayloadItem

use http::{HeaderMap, Response, StatusCode};

/// Type alias for the head of an HTTP response.
pub type ResponseHead = Response<()>;

/// Builds a response head from a status and a finished header map.
pub fn response_head(status: StatusCode, headers: HeaderMap) -> ResponseHead {
    let mut head = Response::new(());
    *head.status_mut() = status;
    *head.headers_mut() = headers;
    head
}
