//! Outbound HTTP/1.1 response encoding.
//!
//! This crate is the wire half of `micro-reply`: it turns a response head plus a stream
//! of payload chunks into bytes on an async writer.
//!
//! # Components
//!
//! - [`protocol`]: message, framing and error types
//! - [`codec`]: the head-then-payload [`codec::ResponseEncoder`] state machine
//! - [`ResponseWriter`]: buffered writer over any [`tokio::io::AsyncWrite`]
//!
//! # Example
//!
//! ```no_run
//! use bytes::Bytes;
//! use http::{HeaderMap, StatusCode};
//! use micro_wire::ResponseWriter;
//! use micro_wire::protocol::{PayloadSize, response_head};
//!
//! # async fn run() -> Result<(), micro_wire::protocol::SendError> {
//! let mut writer = ResponseWriter::new(tokio::io::stdout());
//! writer.write_head(response_head(StatusCode::OK, HeaderMap::new()), PayloadSize::Chunked).await?;
//! writer.write_chunk(Bytes::from_static(b"hello")).await?;
//! writer.write_eof().await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Limitations
//!
//! - HTTP/1.0 and HTTP/1.1 only
//! - No request parsing; the inbound side belongs to the surrounding server

pub mod codec;
pub mod protocol;

mod writer;
pub use writer::ResponseWriter;
