//! HTTP response transmission.
//!
//! This crate takes whatever a handler produced (a value, an error, a stream, a file)
//! and gets it onto a connection:
//!
//! - [`wrap`] normalizes the result into an [`Envelope`]
//! - the payload is marshalled and the final header set resolved, with JSONP, charset,
//!   `Content-Length` and pass-through headers of proxied payloads
//! - [`freshness`] answers conditional GETs with `304 Not Modified`
//! - a [`Negotiator`] picks gzip, deflate or identity from `Accept-Encoding`
//! - the [`Transmitter`] streams the payload through the optional tap and compression
//!   to the [`Connection`], and completes exactly once whatever happens first: the
//!   payload ends or fails, the peer aborts, the socket closes
//!
//! # Example
//!
//! ```no_run
//! use micro_reply::{Json, RequestHead, Transmitter};
//! use serde_json::json;
//!
//! # async fn run() {
//! let transmitter = Transmitter::builder().build();
//! let (mut conn, _signals) = transmitter.connect(RequestHead::get("/x"), tokio::io::stdout());
//!
//! let outcome = transmitter.send(Json(json!({"a": 1})), &mut conn).await;
//! assert!(outcome.is_success());
//! # }
//! ```

mod boom;
mod config;
mod connection;
mod encoding;
mod envelope;
mod error;
mod headers;
mod latch;
mod log;
mod marshal;
mod negotiate;
mod payload;
mod responder;
mod tap;
mod transmit;

pub mod freshness;

pub use boom::{DefaultErrorMapper, ErrorMapper, HttpError};
pub use config::TransmitConfig;
pub use connection::{Connection, RequestHead, Signal, SignalSender, Signals, StreamConnection, signal_channel};
pub use encoding::Encoding;
pub use envelope::{Envelope, Settings, Variety};
pub use error::{BoxError, TransmitError};
pub use headers::append_vary;
pub use latch::State;
pub use log::{LogSink, Outcome, TracingSink};
pub use negotiate::Negotiator;
pub use payload::{Payload, Release};
pub use responder::{Json, Responder, wrap};
pub use tap::Observer;
pub use transmit::{Transmission, TransmissionHandle, Transmitter, TransmitterBuilder};

pub use micro_wire::protocol::{PayloadSize, ResponseHead, SendError};
