use crate::protocol::{PayloadItem, SendError};
use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::Encoder;
use tracing::warn;

/// Writes a payload announced with `Content-Length`, refusing to go over or under it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LengthEncoder {
    remaining: u64,
    eof: bool,
}

impl LengthEncoder {
    pub fn new(length: u64) -> Self {
        Self { remaining: length, eof: false }
    }

    pub fn is_finish(&self) -> bool {
        self.eof
    }
}

impl<D: Buf> Encoder<PayloadItem<D>> for LengthEncoder {
    type Error = SendError;

    fn encode(&mut self, item: PayloadItem<D>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if self.eof {
            return Err(SendError::AlreadyFinished);
        }

        match item {
            PayloadItem::Chunk(bytes) => {
                if !bytes.has_remaining() {
                    return Ok(());
                }
                let size = bytes.remaining() as u64;
                if size > self.remaining {
                    warn!(size, remaining = self.remaining, "payload exceeds declared content-length");
                    return Err(SendError::invalid_body("payload exceeds declared content-length"));
                }
                dst.put(bytes);
                self.remaining -= size;
                Ok(())
            }
            PayloadItem::Eof => {
                self.eof = true;
                if self.remaining > 0 {
                    return Err(SendError::invalid_body(format!(
                        "payload ended {} bytes short of declared content-length",
                        self.remaining
                    )));
                }
                Ok(())
            }
        }
    }
}
