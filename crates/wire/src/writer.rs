//! Buffered async writer for outbound responses.

use crate::codec::ResponseEncoder;
use crate::protocol::{Message, PayloadItem, PayloadSize, ResponseHead, SendError};
use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::codec::Encoder;
use tracing::trace;

const DEFAULT_BUFFER_SIZE: usize = 8 * 1024;

/// Writes a response head and its payload to an [`AsyncWrite`].
///
/// Encoded bytes are staged in an internal buffer that is flushed once it grows past
/// the buffer size, so every [`write_chunk`](Self::write_chunk) awaits the sink when it
/// falls behind: a slow peer slows the producer down instead of growing the buffer.
#[derive(Debug)]
pub struct ResponseWriter<W> {
    writer: W,
    buffer: BytesMut,
    buffer_size: usize,
    encoder: ResponseEncoder,
    body_bytes: u64,
}

impl<W> ResponseWriter<W>
where
    W: AsyncWrite + Unpin,
{
    pub fn new(writer: W) -> Self {
        Self::with_capacity(writer, DEFAULT_BUFFER_SIZE)
    }

    pub fn with_capacity(writer: W, buffer_size: usize) -> Self {
        Self { writer, buffer: BytesMut::with_capacity(buffer_size), buffer_size, encoder: ResponseEncoder::new(), body_bytes: 0 }
    }

    #[inline]
    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    #[inline]
    pub fn get_mut(&mut self) -> &mut W {
        &mut self.writer
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    /// Payload bytes accepted so far, before transfer framing.
    pub fn body_bytes(&self) -> u64 {
        self.body_bytes
    }

    /// True when the last written response reached its eof.
    pub fn is_complete(&self) -> bool {
        self.encoder.is_idle()
    }

    /// Encodes the status line and header block. Bodiless responses are flushed right
    /// away, others wait for the first chunk to share the write.
    pub async fn write_head(&mut self, head: ResponseHead, payload_size: PayloadSize) -> Result<(), SendError> {
        self.encoder.encode(Message::<_, Bytes>::Header((head, payload_size)), &mut self.buffer)?;
        if payload_size.is_bodiless() {
            self.flush().await?;
        }
        Ok(())
    }

    pub async fn write_chunk(&mut self, chunk: Bytes) -> Result<(), SendError> {
        let len = chunk.len() as u64;
        self.encoder.encode(Message::<(ResponseHead, PayloadSize)>::Payload(PayloadItem::Chunk(chunk)), &mut self.buffer)?;
        self.body_bytes += len;

        if self.buffer.len() >= self.buffer_size {
            trace!(buffered = self.buffer.len(), "write buffer full, flushing");
            self.flush().await?;
        }
        Ok(())
    }

    /// Marks the payload complete (writes the chunked terminator if any) and flushes.
    pub async fn write_eof(&mut self) -> Result<(), SendError> {
        self.encoder.encode(Message::<(ResponseHead, PayloadSize)>::Payload(PayloadItem::Eof), &mut self.buffer)?;
        self.flush().await
    }

    pub async fn flush(&mut self) -> Result<(), SendError> {
        if !self.buffer.is_empty() {
            self.writer.write_all(&self.buffer).await?;
            self.buffer.clear();
        }
        Ok(self.writer.flush().await?)
    }

    /// Flushes whatever is buffered and shuts the write half down.
    ///
    /// An unfinished payload is not completed: the peer sees a truncated body.
    pub async fn shutdown(&mut self) -> Result<(), SendError> {
        self.flush().await?;
        Ok(self.writer.shutdown().await?)
    }
}
