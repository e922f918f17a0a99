//! Serializes a response head (status line + header block) into raw bytes.
//!
//! The framing headers are reconciled with the [`PayloadSize`] chosen for the body:
//! `Content-Length` for fixed-length and empty payloads, `Transfer-Encoding: chunked`
//! otherwise. For [`PayloadSize::Omitted`] the head is written exactly as given so that
//! a HEAD or 304 response carries the same framing headers its full variant would.

use crate::codec::FastWrite;
use crate::protocol::{PayloadSize, ResponseHead, SendError};

use bytes::{BufMut, BytesMut};

use http::{HeaderValue, Version, header};
use std::io::Write;
use tracing::error;

/// Initial buffer size allocated for header serialization
const INIT_HEADER_SIZE: usize = 4 * 1024;

const CHUNKED: HeaderValue = HeaderValue::from_static("chunked");
const ZERO: HeaderValue = HeaderValue::from_static("0");

#[derive(Debug)]
pub struct HeaderEncoder;

impl tokio_util::codec::Encoder<(ResponseHead, PayloadSize)> for HeaderEncoder {
    type Error = SendError;

    fn encode(&mut self, item: (ResponseHead, PayloadSize), dst: &mut BytesMut) -> Result<(), Self::Error> {
        let (mut head, payload_size) = item;

        dst.reserve(INIT_HEADER_SIZE);
        let version = match head.version() {
            Version::HTTP_11 => "HTTP/1.1",
            Version::HTTP_10 => "HTTP/1.0",
            v => {
                error!(http_version = ?v, "unsupported http version");
                return Err(SendError::invalid_head(format!("unsupported http version {v:?}")));
            }
        };

        let status = head.status();
        write!(FastWrite(dst), "{} {} {}\r\n", version, status.as_str(), status.canonical_reason().unwrap_or(""))?;

        let headers = head.headers_mut();
        match payload_size {
            PayloadSize::Length(n) => {
                headers.remove(header::TRANSFER_ENCODING);
                headers.insert(header::CONTENT_LENGTH, n.into());
            }
            PayloadSize::Chunked => {
                headers.remove(header::CONTENT_LENGTH);
                headers.insert(header::TRANSFER_ENCODING, CHUNKED);
            }
            PayloadSize::Empty => {
                headers.remove(header::TRANSFER_ENCODING);
                headers.insert(header::CONTENT_LENGTH, ZERO);
            }
            PayloadSize::Omitted => {}
        }

        // multi-valued headers (set-cookie) are yielded once per value
        for (name, value) in head.headers() {
            dst.put_slice(name.as_ref());
            dst.put_slice(b": ");
            dst.put_slice(value.as_ref());
            dst.put_slice(b"\r\n");
        }
        dst.put_slice(b"\r\n");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::response_head;
    use http::{HeaderMap, StatusCode};
    use indoc::indoc;
    use tokio_util::codec::Encoder;

    fn encode(head: ResponseHead, size: PayloadSize) -> String {
        let mut dst = BytesMut::new();
        HeaderEncoder.encode((head, size), &mut dst).unwrap();
        String::from_utf8(dst.to_vec()).unwrap()
    }

    fn crlf(s: &str) -> String {
        s.replace('\n', "\r\n")
    }

    #[test]
    fn fixed_length_head() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let out = encode(response_head(StatusCode::OK, headers), PayloadSize::Length(7));
        let expected = indoc! {"
            HTTP/1.1 200 OK
            content-type: application/json
            content-length: 7

        "};
        assert_eq!(out, crlf(expected));
    }

    #[test]
    fn chunked_replaces_stale_content_length() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("100"));

        let out = encode(response_head(StatusCode::OK, headers), PayloadSize::Chunked);
        assert!(out.contains("transfer-encoding: chunked\r\n"));
        assert!(!out.contains("content-length"));
    }

    #[test]
    fn omitted_keeps_declared_length() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("42"));

        let out = encode(response_head(StatusCode::NOT_MODIFIED, headers), PayloadSize::Omitted);
        let expected = indoc! {"
            HTTP/1.1 304 Not Modified
            content-length: 42

        "};
        assert_eq!(out, crlf(expected));
    }

    #[test]
    fn every_cookie_gets_its_own_line() {
        let mut headers = HeaderMap::new();
        headers.append(header::SET_COOKIE, HeaderValue::from_static("b=2"));
        headers.append(header::SET_COOKIE, HeaderValue::from_static("a=1"));

        let out = encode(response_head(StatusCode::OK, headers), PayloadSize::Empty);
        let b = out.find("set-cookie: b=2\r\n").unwrap();
        let a = out.find("set-cookie: a=1\r\n").unwrap();
        assert!(b < a);
        assert!(out.contains("content-length: 0\r\n"));
    }

    #[test]
    fn unknown_status_has_empty_reason() {
        let status = StatusCode::from_u16(599).unwrap();
        let out = encode(response_head(status, HeaderMap::new()), PayloadSize::Empty);
        assert!(out.starts_with("HTTP/1.1 599 \r\n"));
    }
}
