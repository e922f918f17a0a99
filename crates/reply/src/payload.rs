//! The producible byte sequence behind a response.
//!
//! A [`Payload`] is one of three shapes sharing the `http_body::Body` interface:
//!
//! - a buffer, produced in a single frame (JSONP-wrappable)
//! - a stream of frames (an upstream body, a generator, ...)
//! - a file, streamed from disk
//!
//! Besides the bytes, a payload may carry pass-through headers and an upstream status
//! (from a proxied response or file metadata) and a precomputed gzip variant of itself.
//!
//! Every payload is released exactly once: explicitly through [`Payload::release`] when
//! the transmitter swaps it for another source, or on drop otherwise. File-backed
//! payloads are *closed*, stream-backed ones *destroyed*; the registered release hook
//! is told which.

use bytes::{Bytes, BytesMut};
use futures::Stream;
use http::{HeaderMap, StatusCode};
use http_body::{Body, Frame, SizeHint};
use http_body_util::StreamBody;
use http_body_util::combinators::UnsyncBoxBody;
use std::fmt;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::fs::File;
use tokio_util::io::ReaderStream;

/// How the resources behind a payload are given back.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Release {
    /// in-memory buffer, nothing to give back
    Buffer,
    /// file handle closed
    Close,
    /// stream / upstream connection destroyed
    Destroy,
}

type ReleaseHook = Box<dyn FnOnce(Release) + Send>;

pub struct Payload {
    kind: Kind,
    release: Release,
    headers: Option<HeaderMap>,
    status: Option<StatusCode>,
    length: Option<u64>,
    gzipped: Option<Box<Payload>>,
    jsonp: bool,
    on_release: Option<ReleaseHook>,
    released: bool,
}

enum Kind {
    Once(Option<Bytes>),
    Stream(UnsyncBoxBody<Bytes, io::Error>),
}

impl Payload {
    fn with_kind(kind: Kind, release: Release) -> Self {
        Self {
            kind,
            release,
            headers: None,
            status: None,
            length: None,
            gzipped: None,
            jsonp: false,
            on_release: None,
            released: false,
        }
    }

    /// An already-ended payload: zero bytes, immediate completion.
    pub fn empty() -> Self {
        Self::with_kind(Kind::Once(None), Release::Buffer)
    }

    pub fn buffer(bytes: impl Into<Bytes>) -> Self {
        let bytes = bytes.into();
        if bytes.is_empty() { Self::empty() } else { Self::with_kind(Kind::Once(Some(bytes)), Release::Buffer) }
    }

    /// A payload produced by an arbitrary body.
    pub fn body<B>(body: B) -> Self
    where
        B: Body<Data = Bytes, Error = io::Error> + Send + 'static,
    {
        Self::with_kind(Kind::Stream(UnsyncBoxBody::new(body)), Release::Destroy)
    }

    /// A payload produced by a stream of byte chunks.
    pub fn stream<S>(stream: S) -> Self
    where
        S: Stream<Item = io::Result<Bytes>> + Send + 'static,
    {
        use futures::TryStreamExt;
        Self::body(StreamBody::new(stream.map_ok(Frame::data)))
    }

    /// A payload reading an opened file to its end.
    pub fn file(file: File, length: Option<u64>) -> Self {
        let mut payload = Self::stream(ReaderStream::new(file));
        payload.release = Release::Close;
        payload.length = length;
        payload
    }

    /// Headers to merge into the response when pass-through is enabled.
    #[must_use]
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = Some(headers);
        self
    }

    /// Status of the upstream response this payload comes from.
    #[must_use]
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = Some(status);
        self
    }

    /// Declares the exact number of bytes a stream will produce.
    #[must_use]
    pub fn with_length(mut self, length: u64) -> Self {
        self.length = Some(length);
        self
    }

    /// Attaches a precomputed gzip encoding of the same content.
    #[must_use]
    pub fn with_gzipped(mut self, gzipped: Payload) -> Self {
        self.gzipped = Some(Box::new(gzipped));
        self
    }

    /// Registers a hook invoked once when the payload's resources are released.
    #[must_use]
    pub fn on_release<F>(mut self, hook: F) -> Self
    where
        F: FnOnce(Release) + Send + 'static,
    {
        self.on_release = Some(Box::new(hook));
        self
    }

    pub(crate) fn allow_jsonp(&mut self) {
        self.jsonp = matches!(self.kind, Kind::Once(_));
    }

    pub fn headers(&self) -> Option<&HeaderMap> {
        self.headers.as_ref()
    }

    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    pub fn release_kind(&self) -> Release {
        self.release
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    pub fn has_gzipped(&self) -> bool {
        self.gzipped.is_some()
    }

    pub(crate) fn take_gzipped(&mut self) -> Option<Payload> {
        self.gzipped.take().map(|gzipped| *gzipped)
    }

    /// Exact number of bytes this payload produces, when known up front.
    pub fn exact_size(&self) -> Option<u64> {
        match &self.kind {
            Kind::Once(None) => Some(0),
            Kind::Once(Some(bytes)) => Some(bytes.len() as u64),
            Kind::Stream(body) => self.length.or_else(|| body.size_hint().exact()),
        }
    }

    pub fn supports_jsonp(&self) -> bool {
        self.jsonp
    }

    /// Wraps a buffer payload in a call to `callback`: `/**/callback(<payload>);`.
    ///
    /// U+2028 and U+2029 are escaped: they are valid in JSON but end a line in script.
    pub fn jsonp(&mut self, callback: &str) {
        if !self.jsonp {
            return;
        }

        let body = match &mut self.kind {
            Kind::Once(bytes) => bytes.take().unwrap_or_default(),
            Kind::Stream(_) => return,
        };

        let mut wrapped = BytesMut::with_capacity(body.len() + callback.len() + 8);
        wrapped.extend_from_slice(b"/**/");
        wrapped.extend_from_slice(callback.as_bytes());
        wrapped.extend_from_slice(b"(");
        escape_line_separators(&body, &mut wrapped);
        wrapped.extend_from_slice(b");");
        self.kind = Kind::Once(Some(wrapped.freeze()));
    }

    /// Gives back the resources behind this payload (and its unused gzip variant).
    /// Calling it again is a no-op.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.kind = Kind::Once(None);

        if let Some(mut gzipped) = self.gzipped.take() {
            gzipped.release();
        }
        if let Some(hook) = self.on_release.take() {
            hook(self.release);
        }
    }
}

fn escape_line_separators(src: &[u8], dst: &mut BytesMut) {
    let mut rest = src;
    while let Some(pos) = rest.windows(3).position(|w| w == "\u{2028}".as_bytes() || w == "\u{2029}".as_bytes()) {
        dst.extend_from_slice(&rest[..pos]);
        dst.extend_from_slice(if rest[pos + 2] == 0xA8 { b"\\u2028" } else { b"\\u2029" });
        rest = &rest[pos + 3..];
    }
    dst.extend_from_slice(rest);
}

impl Drop for Payload {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Payload")
            .field("release", &self.release)
            .field("exact_size", &self.exact_size())
            .field("status", &self.status)
            .field("gzipped", &self.gzipped.is_some())
            .field("released", &self.released)
            .finish_non_exhaustive()
    }
}

impl Body for Payload {
    type Data = Bytes;
    type Error = io::Error;

    fn poll_frame(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        match &mut self.get_mut().kind {
            Kind::Once(bytes) => Poll::Ready(bytes.take().map(|bytes| Ok(Frame::data(bytes)))),
            Kind::Stream(body) => Pin::new(body).poll_frame(cx),
        }
    }

    fn is_end_stream(&self) -> bool {
        match &self.kind {
            Kind::Once(bytes) => bytes.is_none(),
            Kind::Stream(body) => body.is_end_stream(),
        }
    }

    fn size_hint(&self) -> SizeHint {
        match self.exact_size() {
            Some(exact) => SizeHint::with_exact(exact),
            None => SizeHint::default(),
        }
    }
}
