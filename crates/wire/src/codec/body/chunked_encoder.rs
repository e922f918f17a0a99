use crate::codec::FastWrite;
use crate::protocol::{PayloadItem, SendError};
use bytes::{Buf, BufMut, BytesMut};
use std::io::Write;

use tokio_util::codec::Encoder;

/// Frames payload items as `Transfer-Encoding: chunked`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkedEncoder {
    eof: bool,
    sent: u64,
}

impl ChunkedEncoder {
    pub fn new() -> Self {
        Self { eof: false, sent: 0 }
    }

    pub fn is_finish(&self) -> bool {
        self.eof
    }

    pub fn sent(&self) -> u64 {
        self.sent
    }
}

impl<D: Buf> Encoder<PayloadItem<D>> for ChunkedEncoder {
    type Error = SendError;

    fn encode(&mut self, item: PayloadItem<D>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if self.eof {
            return Err(SendError::AlreadyFinished);
        }

        match item {
            PayloadItem::Chunk(bytes) => {
                let size = bytes.remaining();
                // a zero sized chunk would terminate the body early
                if size == 0 {
                    return Ok(());
                }
                write!(FastWrite(dst), "{size:X}\r\n")?;
                dst.reserve(size + 2);
                dst.put(bytes);
                dst.extend_from_slice(b"\r\n");
                self.sent += size as u64;
                Ok(())
            }
            PayloadItem::Eof => {
                self.eof = true;
                dst.extend_from_slice(b"0\r\n\r\n");
                Ok(())
            }
        }
    }
}
