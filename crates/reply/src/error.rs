use micro_wire::protocol::SendError;
use std::error::Error;
use std::io;
use thiserror::Error;

pub type BoxError = Box<dyn Error + Send + Sync>;

/// Everything that can go wrong between a handler result and the last byte on the wire.
#[derive(Debug, Error)]
pub enum TransmitError {
    /// The payload could not be produced (serialization, file access, ...).
    #[error("marshal error: {reason}")]
    Marshal {
        reason: String,
        #[source]
        source: Option<BoxError>,
    },

    /// A declared header could not be applied.
    #[error("invalid header: {reason}")]
    Header { reason: String },

    /// Malformed `Accept-Encoding`; never fatal, negotiation falls back to identity.
    #[error("malformed accept-encoding: {reason}")]
    Negotiation { reason: String },

    /// I/O failure while the payload was being transmitted.
    #[error("stream error: {source}")]
    Stream {
        #[source]
        source: BoxError,
    },

    /// The peer went away before the response was complete.
    #[error("request aborted")]
    Aborted,
}

impl TransmitError {
    pub fn marshal<S: ToString>(reason: S) -> Self {
        Self::Marshal { reason: reason.to_string(), source: None }
    }

    pub fn marshal_with<S: ToString, E: Into<BoxError>>(reason: S, source: E) -> Self {
        Self::Marshal { reason: reason.to_string(), source: Some(source.into()) }
    }

    pub fn header<S: ToString>(reason: S) -> Self {
        Self::Header { reason: reason.to_string() }
    }

    pub fn negotiation<S: ToString>(reason: S) -> Self {
        Self::Negotiation { reason: reason.to_string() }
    }

    pub fn stream<E: Into<BoxError>>(e: E) -> Self {
        Self::Stream { source: e.into() }
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted)
    }
}

impl From<io::Error> for TransmitError {
    fn from(e: io::Error) -> Self {
        Self::stream(e)
    }
}

impl From<SendError> for TransmitError {
    fn from(e: SendError) -> Self {
        Self::stream(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marshal_keeps_source() {
        let err = TransmitError::marshal_with("can't open file", io::Error::from(io::ErrorKind::NotFound));
        assert_eq!(err.to_string(), "marshal error: can't open file");
        assert!(err.source().is_some());
    }

    #[test]
    fn send_error_becomes_stream_error() {
        let err: TransmitError = SendError::invalid_body("short").into();
        assert!(matches!(err, TransmitError::Stream { .. }));
        assert!(!err.is_aborted());
    }
}
