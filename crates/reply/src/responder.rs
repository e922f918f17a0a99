//! Conversion of handler results into response envelopes.
//!
//! The [`Responder`] trait defines how a value a handler returns becomes an
//! [`Envelope`]. Values become a 200 with a content type inferred from their shape,
//! errors become error envelopes and envelopes pass through unchanged.

use crate::boom::HttpError;
use crate::envelope::Envelope;
use crate::error::BoxError;
use crate::payload::Payload;
use bytes::Bytes;
use http::StatusCode;
use serde::Serialize;
use std::convert::Infallible;

/// A trait for types that can be converted into a response envelope.
pub trait Responder {
    fn into_envelope(self) -> Envelope;
}

/// Normalizes a handler result into an envelope. Pure: no I/O happens here.
pub fn wrap<R: Responder>(result: R) -> Envelope {
    result.into_envelope()
}

/// Serializes the wrapped value as `application/json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Json<T>(pub T);

impl Responder for Envelope {
    fn into_envelope(self) -> Envelope {
        self
    }
}

impl Responder for HttpError {
    fn into_envelope(self) -> Envelope {
        Envelope::from_http_error(self)
    }
}

/// Errors are mapped by the transmitter's error mapper; `Ok` values respond as usual.
impl<T, E> Responder for Result<T, E>
where
    T: Responder,
    E: Into<BoxError>,
{
    fn into_envelope(self) -> Envelope {
        match self {
            Ok(t) => t.into_envelope(),
            Err(e) => Envelope::failure(e),
        }
    }
}

/// `None` responds with an empty body.
impl<T: Responder> Responder for Option<T> {
    fn into_envelope(self) -> Envelope {
        match self {
            Some(t) => t.into_envelope(),
            None => Envelope::empty(),
        }
    }
}

impl<T: Responder> Responder for (StatusCode, T) {
    fn into_envelope(self) -> Envelope {
        let (status, responder) = self;
        responder.into_envelope().code(status)
    }
}

impl<T: Responder> Responder for Box<T> {
    fn into_envelope(self) -> Envelope {
        (*self).into_envelope()
    }
}

impl Responder for () {
    fn into_envelope(self) -> Envelope {
        Envelope::empty()
    }
}

impl Responder for &'static str {
    fn into_envelope(self) -> Envelope {
        Envelope::text(self)
    }
}

impl Responder for String {
    fn into_envelope(self) -> Envelope {
        Envelope::text(self)
    }
}

impl Responder for Bytes {
    fn into_envelope(self) -> Envelope {
        Envelope::buffer(self)
    }
}

impl Responder for Vec<u8> {
    fn into_envelope(self) -> Envelope {
        Envelope::buffer(self)
    }
}

impl Responder for serde_json::Value {
    fn into_envelope(self) -> Envelope {
        Envelope::json(self)
    }
}

impl<T> Responder for Json<T>
where
    T: Serialize + Send + 'static,
{
    fn into_envelope(self) -> Envelope {
        Envelope::json(self.0)
    }
}

/// A ready payload is streamed as is.
impl Responder for Payload {
    fn into_envelope(self) -> Envelope {
        Envelope::payload(self)
    }
}

impl Responder for Infallible {
    fn into_envelope(self) -> Envelope {
        match self {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::Variety;
    use serde_json::json;
    use std::io;

    #[test]
    fn string_is_plain() {
        let envelope = wrap("hello");
        assert_eq!(envelope.status(), StatusCode::OK);
        assert_eq!(envelope.variety(), Variety::Plain);
    }

    #[test]
    fn bytes_are_buffers() {
        assert_eq!(wrap(vec![1u8, 2, 3]).variety(), Variety::Buffer);
        assert_eq!(wrap(Bytes::from_static(b"x")).variety(), Variety::Buffer);
    }

    #[test]
    fn status_tuple() {
        let envelope = wrap((StatusCode::CREATED, Json(json!({"id": 7}))));
        assert_eq!(envelope.status(), StatusCode::CREATED);
    }

    #[test]
    fn none_is_empty() {
        let envelope = wrap(None::<String>);
        assert_eq!(envelope.status(), StatusCode::OK);
        assert!(!envelope.is_error());
    }

    #[test]
    fn error_result_is_deferred_to_the_mapper() {
        let result: Result<String, io::Error> = Err(io::Error::other("boom"));
        let envelope = wrap(result);
        assert!(envelope.is_error());
        assert!(envelope.failure.is_some());
    }

    #[test]
    fn http_error_is_mapped_immediately() {
        let envelope = wrap(HttpError::not_found("nope"));
        assert_eq!(envelope.status(), StatusCode::NOT_FOUND);
        assert!(envelope.failure.is_none());
    }

    #[test]
    fn envelope_passes_through() {
        let envelope = wrap(Envelope::text("x").code(StatusCode::ACCEPTED));
        assert_eq!(envelope.status(), StatusCode::ACCEPTED);
    }

    #[test]
    fn payload_is_a_stream() {
        assert_eq!(wrap(Payload::empty()).variety(), Variety::Stream);
    }
}
