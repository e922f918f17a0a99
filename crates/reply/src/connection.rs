//! The connection a response is transmitted over.
//!
//! A [`Connection`] exposes the inbound request head, an outbound sink (head, chunks,
//! eof, end) and a channel of inbound [`Signal`]s the transport raises when the peer
//! aborts, the socket closes or errors. [`StreamConnection`] implements it over any
//! [`AsyncWrite`] through a [`ResponseWriter`].

use async_trait::async_trait;
use bytes::Bytes;
use http::request::Parts;
use http::{HeaderMap, HeaderName, HeaderValue, Method, Uri, Version};
use micro_wire::ResponseWriter;
use micro_wire::protocol::{PayloadSize, ResponseHead, SendError};
use std::io;
use tokio::io::AsyncWrite;
use tokio::sync::mpsc;

/// The parts of the inbound request transmission looks at.
#[derive(Debug, Clone)]
pub struct RequestHead {
    method: Method,
    uri: Uri,
    version: Version,
    headers: HeaderMap,
}

impl RequestHead {
    pub fn new(method: Method, uri: Uri) -> Self {
        Self { method, uri, version: Version::HTTP_11, headers: HeaderMap::new() }
    }

    pub fn get(uri: &'static str) -> Self {
        Self::new(Method::GET, Uri::from_static(uri))
    }

    pub fn head(uri: &'static str) -> Self {
        Self::new(Method::HEAD, Uri::from_static(uri))
    }

    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    #[must_use]
    pub fn with_version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn header(&self, name: HeaderName) -> Option<&HeaderValue> {
        self.headers.get(name)
    }

    pub fn is_head(&self) -> bool {
        self.method == Method::HEAD
    }

    /// First value of a query string parameter; `None` when missing or malformed.
    pub fn query_param(&self, name: &str) -> Option<String> {
        let query = self.uri.query()?;
        let pairs: Vec<(String, String)> = serde_urlencoded::from_str(query).ok()?;
        pairs.into_iter().find(|(key, _)| key == name).map(|(_, value)| value)
    }
}

impl From<Parts> for RequestHead {
    fn from(parts: Parts) -> Self {
        Self { method: parts.method, uri: parts.uri, version: parts.version, headers: parts.headers }
    }
}

impl<B> From<&http::Request<B>> for RequestHead {
    fn from(request: &http::Request<B>) -> Self {
        Self {
            method: request.method().clone(),
            uri: request.uri().clone(),
            version: request.version(),
            headers: request.headers().clone(),
        }
    }
}

/// Something the transport observed on the connection.
#[derive(Debug)]
pub enum Signal {
    /// the client aborted the request
    Aborted,
    /// the underlying socket closed
    Closed,
    /// the outbound side failed
    Errored(io::Error),
}

/// Transport side of the signal channel.
#[derive(Debug, Clone)]
pub struct SignalSender {
    tx: mpsc::UnboundedSender<Signal>,
}

impl SignalSender {
    /// Returns false once nobody listens anymore.
    pub fn send(&self, signal: Signal) -> bool {
        self.tx.send(signal).is_ok()
    }

    pub fn aborted(&self) -> bool {
        self.send(Signal::Aborted)
    }

    pub fn closed(&self) -> bool {
        self.send(Signal::Closed)
    }

    pub fn errored(&self, e: io::Error) -> bool {
        self.send(Signal::Errored(e))
    }
}

/// Transmitter side of the signal channel.
#[derive(Debug)]
pub struct Signals {
    rx: mpsc::UnboundedReceiver<Signal>,
}

impl Signals {
    /// Waits for the next signal. Once every sender is gone this never resolves: a
    /// transport that went away without a word has nothing to report.
    pub async fn next(&mut self) -> Signal {
        match self.rx.recv().await {
            Some(signal) => signal,
            None => std::future::pending().await,
        }
    }
}

pub fn signal_channel() -> (SignalSender, Signals) {
    let (tx, rx) = mpsc::unbounded_channel();
    (SignalSender { tx }, Signals { rx })
}

/// A live connection a single response is written to.
///
/// The transmitter calls `write_head` once, then `write_chunk` for each payload chunk
/// and `write_eof` when the payload ended. `end` finishes the outbound side: after
/// `write_eof` it completes the response, without it the peer sees a truncated body.
#[async_trait]
pub trait Connection: Send {
    fn request(&self) -> &RequestHead;

    /// The inbound signal channel; handed out once.
    fn signals(&mut self) -> Option<Signals>;

    async fn write_head(&mut self, head: ResponseHead, size: PayloadSize) -> Result<(), SendError>;

    async fn write_chunk(&mut self, chunk: Bytes) -> Result<(), SendError>;

    async fn write_eof(&mut self) -> Result<(), SendError>;

    async fn end(&mut self) -> Result<(), SendError>;
}

/// A [`Connection`] writing HTTP/1.1 to an async writer.
#[derive(Debug)]
pub struct StreamConnection<W> {
    request: RequestHead,
    writer: ResponseWriter<W>,
    signals: Option<Signals>,
}

impl<W> StreamConnection<W>
where
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(request: RequestHead, writer: W) -> (Self, SignalSender) {
        Self::from_writer(request, ResponseWriter::new(writer))
    }

    pub fn with_capacity(request: RequestHead, writer: W, buffer_size: usize) -> (Self, SignalSender) {
        Self::from_writer(request, ResponseWriter::with_capacity(writer, buffer_size))
    }

    fn from_writer(request: RequestHead, writer: ResponseWriter<W>) -> (Self, SignalSender) {
        let (sender, signals) = signal_channel();
        (Self { request, writer, signals: Some(signals) }, sender)
    }

    pub fn writer(&self) -> &ResponseWriter<W> {
        &self.writer
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

#[async_trait]
impl<W> Connection for StreamConnection<W>
where
    W: AsyncWrite + Unpin + Send,
{
    fn request(&self) -> &RequestHead {
        &self.request
    }

    fn signals(&mut self) -> Option<Signals> {
        self.signals.take()
    }

    async fn write_head(&mut self, mut head: ResponseHead, size: PayloadSize) -> Result<(), SendError> {
        *head.version_mut() = self.request.version;
        self.writer.write_head(head, size).await
    }

    async fn write_chunk(&mut self, chunk: Bytes) -> Result<(), SendError> {
        self.writer.write_chunk(chunk).await
    }

    async fn write_eof(&mut self) -> Result<(), SendError> {
        self.writer.write_eof().await
    }

    async fn end(&mut self) -> Result<(), SendError> {
        self.writer.shutdown().await
    }
}
