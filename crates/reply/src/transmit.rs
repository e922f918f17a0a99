//! The transmitter: from a handler result to the last byte on the wire.
//!
//! A transmission runs its stages strictly in order:
//!
//! 1. **prepare**: wrap the result, marshal the payload, resolve headers. A failure
//!    turns the response into an error response once; if that fails too a bare `500`
//!    is sent
//! 2. **freshness**: conditional GET may downgrade a success to `304`
//! 3. **negotiate**: pick a content coding, swap in a precomputed variant or plan a
//!    compressing transform; HEAD and `304` get an empty payload instead
//! 4. **stream**: head first, then payload -> tap -> compression -> connection, one
//!    chunk in flight at a time
//!
//! Everything after the start races against the transmission's cancellation token and
//! the connection's signals. Whichever terminal event comes first goes through the
//! [latch](crate::State); teardown, the log record and the completion callback happen
//! exactly once after it.

use crate::boom::{DefaultErrorMapper, ErrorMapper, HttpError};
use crate::config::TransmitConfig;
use crate::connection::{Connection, RequestHead, Signal, SignalSender, Signals, StreamConnection};
use crate::encoding::{EncodedBody, Encoder, Encoding};
use crate::envelope::Envelope;
use crate::error::TransmitError;
use crate::freshness;
use crate::headers;
use crate::latch::{Latch, State};
use crate::log::{LogSink, Outcome, TracingSink};
use crate::marshal::marshal;
use crate::negotiate::Negotiator;
use crate::payload::Payload;
use crate::responder::{Responder, wrap};
use crate::tap::{Observer, Tapped};
use bytes::Bytes;
use http::header::{ACCEPT_ENCODING, CONTENT_ENCODING, CONTENT_LENGTH};
use http::{HeaderMap, HeaderValue, StatusCode};
use http_body_util::BodyExt;
use http_body_util::combinators::UnsyncBoxBody;
use micro_wire::protocol::{PayloadSize, ResponseHead, response_head};
use std::fmt;
use std::io;
use std::sync::Arc;
use tokio::io::AsyncWrite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

type CompletionCallback = Box<dyn FnOnce(&Outcome) + Send>;

/// Sends responses over connections. Cheap to clone; one per server is enough.
#[derive(Clone)]
pub struct Transmitter {
    negotiator: Negotiator,
    errors: Arc<dyn ErrorMapper>,
    log: Arc<dyn LogSink>,
    config: TransmitConfig,
}

impl Default for Transmitter {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl fmt::Debug for Transmitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transmitter").field("negotiator", &self.negotiator).field("config", &self.config).finish_non_exhaustive()
    }
}

pub struct TransmitterBuilder {
    config: TransmitConfig,
    errors: Option<Arc<dyn ErrorMapper>>,
    log: Option<Arc<dyn LogSink>>,
}

impl fmt::Debug for TransmitterBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransmitterBuilder").field("config", &self.config).finish_non_exhaustive()
    }
}

impl TransmitterBuilder {
    fn new() -> Self {
        Self { config: TransmitConfig::default(), errors: None, log: None }
    }

    pub fn config(mut self, config: TransmitConfig) -> Self {
        self.config = config;
        self
    }

    pub fn encodings(mut self, encodings: Vec<Encoding>) -> Self {
        self.config.encodings = encodings;
        self
    }

    pub fn compression_level(mut self, level: u32) -> Self {
        self.config.compression_level = level;
        self
    }

    pub fn error_mapper(mut self, errors: impl ErrorMapper + 'static) -> Self {
        self.errors = Some(Arc::new(errors));
        self
    }

    pub fn log_sink(mut self, log: impl LogSink + 'static) -> Self {
        self.log = Some(Arc::new(log));
        self
    }

    pub fn build(self) -> Transmitter {
        let errors: Arc<dyn ErrorMapper> = match self.errors {
            Some(errors) => errors,
            None => Arc::new(DefaultErrorMapper),
        };
        let log: Arc<dyn LogSink> = match self.log {
            Some(log) => log,
            None => Arc::new(TracingSink),
        };
        Transmitter { negotiator: Negotiator::new(self.config.encodings.clone()), errors, log, config: self.config }
    }
}

impl Transmitter {
    pub fn builder() -> TransmitterBuilder {
        TransmitterBuilder::new()
    }

    pub fn config(&self) -> &TransmitConfig {
        &self.config
    }

    /// A connection over `writer` using the configured write buffer.
    pub fn connect<W>(&self, request: RequestHead, writer: W) -> (StreamConnection<W>, SignalSender)
    where
        W: AsyncWrite + Unpin + Send,
    {
        StreamConnection::with_capacity(request, writer, self.config.write_buffer)
    }

    /// A transmission that can be observed and aborted while it runs.
    pub fn transmission(&self) -> Transmission {
        Transmission {
            transmitter: self.clone(),
            latch: Arc::new(Latch::new()),
            token: CancellationToken::new(),
            on_complete: None,
        }
    }

    /// Transmits `reply` over `conn` and reports how it went.
    pub async fn send<R, C>(&self, reply: R, conn: &mut C) -> Outcome
    where
        R: Responder,
        C: Connection + ?Sized,
    {
        self.transmission().run(reply, conn).await
    }

    async fn prepare(&self, mut envelope: Envelope, request: &RequestHead) -> Prepared {
        if let Some(failure) = envelope.failure.take() {
            let http_error = self.errors.map(failure);
            if http_error.is_server() {
                warn!(status = http_error.status().as_u16(), cause = %http_error, "handler failed");
            }
            return self.fail(http_error, request).await;
        }

        match setup(&mut envelope, request).await {
            Ok(payload) => {
                if !envelope.error {
                    envelope.status = freshness::evaluate(request, envelope.status, &envelope.headers);
                }
                Prepared::new(envelope, payload)
            }
            Err(e) => {
                warn!(cause = %e, "response setup failed, sending error response");
                let http_error = self.errors.map(e.into());
                self.fail(http_error, request).await
            }
        }
    }

    async fn fail(&self, http_error: HttpError, request: &RequestHead) -> Prepared {
        let mut envelope = Envelope::from_http_error(http_error);
        match setup(&mut envelope, request).await {
            Ok(payload) => Prepared::new(envelope, payload),
            Err(e) => {
                error!(cause = %e, "error response setup failed, sending bare 500");
                Prepared::new(Envelope::bare(StatusCode::INTERNAL_SERVER_ERROR), Payload::empty())
            }
        }
    }

    /// Picks the payload actually sent and the transform it goes through.
    fn negotiate(&self, prepared: &mut Prepared, request: &RequestHead) -> Option<Encoder> {
        if request.is_head() || prepared.status == StatusCode::NOT_MODIFIED {
            prepared.omitted = true;
            prepared.swap(Payload::empty());
            return None;
        }

        // nothing to compress: keep the declared length, no coding
        let empty = prepared.payload.exact_size() == Some(0);

        let mut encoder = None;
        if prepared.compressible && !empty && !prepared.headers.contains_key(CONTENT_ENCODING) {
            let encoding = self.negotiator.preferred(request.header(ACCEPT_ENCODING));
            debug!(%encoding, "negotiated content encoding");

            if encoding.is_compression() {
                prepared.headers.remove(CONTENT_LENGTH);
                prepared.headers.insert(CONTENT_ENCODING, HeaderValue::from_static(encoding.as_str()));
                headers::append_vary(&mut prepared.headers, "accept-encoding");

                match prepared.payload.take_gzipped() {
                    Some(gzipped) if encoding == Encoding::Gzip => prepared.swap(gzipped),
                    unused => {
                        drop(unused);
                        encoder = Encoder::new(encoding, self.config.compression_level);
                    }
                }
            }
        }

        if let Some(mut unused) = prepared.payload.take_gzipped() {
            unused.release();
        }
        encoder
    }
}

async fn setup(envelope: &mut Envelope, request: &RequestHead) -> Result<Payload, TransmitError> {
    let mut payload = marshal(envelope).await?;
    headers::jsonp(envelope, &mut payload, request)?;
    headers::apply(envelope, &payload)?;

    if envelope.settings.pass_through {
        if let Some(upstream) = payload.headers() {
            headers::merge_pass_through(&mut envelope.headers, upstream);
        }
    }
    Ok(payload)
}

struct Prepared {
    status: StatusCode,
    headers: HeaderMap,
    payload: Payload,
    tap: Option<Box<dyn Observer>>,
    compressible: bool,
    omitted: bool,
}

impl Prepared {
    fn new(envelope: Envelope, payload: Payload) -> Self {
        Self {
            status: envelope.status,
            headers: envelope.headers,
            payload,
            tap: envelope.tap,
            compressible: envelope.settings.compressible,
            omitted: false,
        }
    }

    /// Replaces the payload, releasing the original right away.
    fn swap(&mut self, payload: Payload) {
        let mut original = std::mem::replace(&mut self.payload, payload);
        original.release();
    }

    fn payload_size(&self, encoded: bool) -> PayloadSize {
        if self.omitted {
            return PayloadSize::Omitted;
        }
        if encoded {
            return PayloadSize::Chunked;
        }
        let declared = self.headers.get(CONTENT_LENGTH).and_then(|value| value.to_str().ok()?.parse::<u64>().ok());
        match declared {
            Some(length) => PayloadSize::from_exact(Some(length)),
            None => PayloadSize::from_exact(self.payload.exact_size()),
        }
    }
}

/// Observes and aborts a running [`Transmission`].
#[derive(Debug, Clone)]
pub struct TransmissionHandle {
    latch: Arc<Latch>,
    token: CancellationToken,
}

impl TransmissionHandle {
    /// Aborts the transmission: the payload is released, the connection is not ended.
    pub fn abort(&self) {
        self.token.cancel();
    }

    pub fn state(&self) -> State {
        self.latch.state()
    }
}

/// A single response transmission.
pub struct Transmission {
    transmitter: Transmitter,
    latch: Arc<Latch>,
    token: CancellationToken,
    on_complete: Option<CompletionCallback>,
}

impl fmt::Debug for Transmission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transmission").field("state", &self.latch.state()).finish_non_exhaustive()
    }
}

enum Exit {
    Finished,
    Aborted,
    Closed,
    Failed(TransmitError),
}

impl From<Signal> for Exit {
    fn from(signal: Signal) -> Self {
        match signal {
            Signal::Aborted => Exit::Aborted,
            Signal::Closed => Exit::Closed,
            Signal::Errored(e) => Exit::Failed(TransmitError::stream(e)),
        }
    }
}

impl Transmission {
    /// Runs `callback` once the transmission reached its terminal state and was torn down.
    #[must_use]
    pub fn on_complete<F>(mut self, callback: F) -> Self
    where
        F: FnOnce(&Outcome) + Send + 'static,
    {
        self.on_complete = Some(Box::new(callback));
        self
    }

    pub fn handle(&self) -> TransmissionHandle {
        TransmissionHandle { latch: Arc::clone(&self.latch), token: self.token.clone() }
    }

    pub async fn run<R, C>(self, reply: R, conn: &mut C) -> Outcome
    where
        R: Responder,
        C: Connection + ?Sized,
    {
        let mut signals = conn.signals();
        let request = conn.request().clone();
        let envelope = wrap(reply);
        // provisional until prepared: an unmapped failure has no status of its own yet
        let status = envelope.status();

        let mut prepared = tokio::select! {
            biased;
            () = self.token.cancelled() => return self.finish(conn, Exit::Aborted, status, 0).await,
            signal = next_signal(&mut signals) => return self.finish(conn, signal.into(), status, 0).await,
            prepared = self.transmitter.prepare(envelope, &request) => prepared,
        };

        let encoder = self.transmitter.negotiate(&mut prepared, &request);
        let size = prepared.payload_size(encoder.is_some());
        let status = prepared.status;
        let head = response_head(status, prepared.headers);

        let tapped = Tapped::new(prepared.payload, prepared.tap);
        let body = match encoder {
            Some(encoder) => UnsyncBoxBody::new(EncodedBody::new(tapped, encoder)),
            None => UnsyncBoxBody::new(tapped),
        };

        let mut bytes_sent = 0;
        let exit = tokio::select! {
            biased;
            () = self.token.cancelled() => Exit::Aborted,
            signal = next_signal(&mut signals) => signal.into(),
            result = stream(conn, &self.latch, head, size, body, &mut bytes_sent) => match result {
                Ok(()) => Exit::Finished,
                Err(e) => Exit::Failed(e),
            },
        };
        drop(signals);

        self.finish(conn, exit, status, bytes_sent).await
    }

    async fn finish<C>(mut self, conn: &mut C, exit: Exit, status: StatusCode, bytes_sent: u64) -> Outcome
    where
        C: Connection + ?Sized,
    {
        // a finished transmission already ended the sink; an aborted one must not
        let (state, error, end_sink) = match exit {
            Exit::Finished => (State::Completed, None, false),
            Exit::Closed => (State::Completed, None, true),
            Exit::Aborted => (State::Aborted, Some(TransmitError::Aborted), false),
            Exit::Failed(e) => (State::Errored, Some(e), true),
        };

        let outcome = Outcome { state, status, bytes_sent, error };
        if !self.latch.terminate(state) {
            return outcome;
        }

        if end_sink {
            if let Err(e) = conn.end().await {
                debug!(cause = %e, "failed to end connection");
            }
        }

        self.transmitter.log.record(&outcome);
        if let Some(callback) = self.on_complete.take() {
            callback(&outcome);
        }
        outcome
    }
}

async fn next_signal(signals: &mut Option<Signals>) -> Signal {
    match signals {
        Some(signals) => signals.next().await,
        None => std::future::pending().await,
    }
}

async fn stream<C>(
    conn: &mut C,
    latch: &Latch,
    head: ResponseHead,
    size: PayloadSize,
    mut body: UnsyncBoxBody<Bytes, io::Error>,
    bytes_sent: &mut u64,
) -> Result<(), TransmitError>
where
    C: Connection + ?Sized,
{
    conn.write_head(head, size).await?;
    latch.advance(State::Idle, State::HeadersSent);
    latch.advance(State::HeadersSent, State::Streaming);

    while let Some(frame) = body.frame().await {
        let Ok(chunk) = frame?.into_data() else {
            continue;
        };
        if chunk.is_empty() {
            continue;
        }
        let len = chunk.len() as u64;
        conn.write_chunk(chunk).await?;
        *bytes_sent += len;
    }
    drop(body);

    conn.write_eof().await?;
    conn.end().await?;
    Ok(())
}
