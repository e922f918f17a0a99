//! Streaming content-encoding transforms.
//!
//! [`EncodedBody`] sits between a payload and the connection, compressing every frame
//! it pulls through a `flate2` encoder. `deflate` is the zlib-wrapped format, which is
//! what HTTP's `deflate` coding means in practice.

use bytes::{Buf, Bytes, BytesMut};
use flate2::Compression;
use flate2::write::{GzEncoder, ZlibEncoder};
use http_body::{Body, Frame, SizeHint};
use pin_project_lite::pin_project;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::io::Write;
use std::pin::Pin;
use std::task::{Context, Poll, ready};
use tracing::trace;

/// A content coding the server knows how to produce.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    Gzip,
    Deflate,
    Identity,
}

impl Encoding {
    pub fn as_str(self) -> &'static str {
        match self {
            Encoding::Gzip => "gzip",
            Encoding::Deflate => "deflate",
            Encoding::Identity => "identity",
        }
    }

    /// Matches a coding token case-insensitively (`x-gzip` is accepted as gzip).
    pub fn from_token(token: &str) -> Option<Self> {
        if token.eq_ignore_ascii_case("gzip") || token.eq_ignore_ascii_case("x-gzip") {
            Some(Encoding::Gzip)
        } else if token.eq_ignore_ascii_case("deflate") {
            Some(Encoding::Deflate)
        } else if token.eq_ignore_ascii_case("identity") {
            Some(Encoding::Identity)
        } else {
            None
        }
    }

    pub fn is_compression(self) -> bool {
        !matches!(self, Encoding::Identity)
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// inspired by actix-http's encoder
pub(crate) struct Writer {
    buf: BytesMut,
}

impl Writer {
    fn new() -> Self {
        Self { buf: BytesMut::with_capacity(4096) }
    }

    fn take(&mut self) -> Bytes {
        self.buf.split().freeze()
    }
}

impl io::Write for Writer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

pub(crate) enum Encoder {
    Gzip(GzEncoder<Writer>),
    Deflate(ZlibEncoder<Writer>),
}

impl Encoder {
    /// Returns `None` for identity: nothing to insert into the pipeline.
    pub(crate) fn new(encoding: Encoding, level: u32) -> Option<Self> {
        let level = Compression::new(level.min(9));
        match encoding {
            Encoding::Gzip => Some(Self::Gzip(GzEncoder::new(Writer::new(), level))),
            Encoding::Deflate => Some(Self::Deflate(ZlibEncoder::new(Writer::new(), level))),
            Encoding::Identity => None,
        }
    }

    fn encoding(&self) -> Encoding {
        match self {
            Self::Gzip(_) => Encoding::Gzip,
            Self::Deflate(_) => Encoding::Deflate,
        }
    }

    fn write(&mut self, data: &[u8]) -> io::Result<()> {
        let result = match self {
            Self::Gzip(encoder) => encoder.write_all(data),
            Self::Deflate(encoder) => encoder.write_all(data),
        };
        if let Err(e) = &result {
            trace!(encoding = %self.encoding(), cause = %e, "error encoding chunk");
        }
        result
    }

    fn take(&mut self) -> Bytes {
        match self {
            Self::Gzip(encoder) => encoder.get_mut().take(),
            Self::Deflate(encoder) => encoder.get_mut().take(),
        }
    }

    fn finish(self) -> io::Result<Bytes> {
        let writer = match self {
            Self::Gzip(encoder) => encoder.finish()?,
            Self::Deflate(encoder) => encoder.finish()?,
        };
        Ok(writer.buf.freeze())
    }
}

pin_project! {
    /// A body whose frames are compressed on the way through.
    pub(crate) struct EncodedBody<B> {
        #[pin]
        inner: B,
        encoder: Option<Encoder>,
    }
}

impl<B> EncodedBody<B> {
    pub(crate) fn new(inner: B, encoder: Encoder) -> Self {
        Self { inner, encoder: Some(encoder) }
    }
}

impl<B> Body for EncodedBody<B>
where
    B: Body<Data = Bytes, Error = io::Error>,
{
    type Data = Bytes;
    type Error = io::Error;

    fn poll_frame(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let mut this = self.project();

        loop {
            // the encoder is taken once the inner body ended and the trailer was produced
            let Some(encoder) = this.encoder.as_mut() else {
                return Poll::Ready(None);
            };

            match ready!(this.inner.as_mut().poll_frame(cx)) {
                Some(Ok(frame)) => {
                    let Ok(data) = frame.into_data() else {
                        // trailers have no meaning once the body is re-encoded
                        continue;
                    };
                    encoder.write(data.chunk())?;
                    let bytes = encoder.take();
                    if bytes.is_empty() {
                        continue;
                    }
                    return Poll::Ready(Some(Ok(Frame::data(bytes))));
                }
                Some(Err(e)) => return Poll::Ready(Some(Err(e))),
                None => {
                    let Some(encoder) = this.encoder.take() else {
                        return Poll::Ready(None);
                    };
                    let bytes = encoder.finish()?;
                    return if bytes.is_empty() { Poll::Ready(None) } else { Poll::Ready(Some(Ok(Frame::data(bytes)))) };
                }
            }
        }
    }

    fn is_end_stream(&self) -> bool {
        self.encoder.is_none()
    }

    fn size_hint(&self) -> SizeHint {
        SizeHint::default()
    }
}
