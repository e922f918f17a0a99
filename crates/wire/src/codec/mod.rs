//! Encoding of outbound HTTP/1.1 responses.
//!
//! [`ResponseEncoder`] is a state machine fed with [`Message`] items: one response head,
//! then payload chunks until EOF. The head is serialized by the header encoder and the
//! payload by a framing encoder chosen from the head's [`PayloadSize`]:
//!
//! - fixed length (`Content-Length`)
//! - chunked transfer encoding
//! - no body at all (empty, or omitted for HEAD / 304)
//!
//! [`Message`]: crate::protocol::Message
//! [`PayloadSize`]: crate::protocol::PayloadSize

mod body;
mod header_encoder;
mod response_encoder;

pub use header_encoder::HeaderEncoder;
pub use response_encoder::ResponseEncoder;

use bytes::{BufMut, BytesMut};
use std::io;

/// `io::Write` over a `BytesMut`, used to `write!` formatted framing into the buffer.
pub(crate) struct FastWrite<'a>(pub(crate) &'a mut BytesMut);

impl io::Write for FastWrite<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.put_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
