use crate::codec::body::PayloadEncoder;
use crate::codec::HeaderEncoder;
use crate::protocol::{Message, PayloadSize, ResponseHead, SendError};
use bytes::{Buf, BytesMut};
use tokio_util::codec::Encoder;
use tracing::error;

/// Encodes one response head followed by its payload items, then becomes idle again.
#[derive(Debug)]
pub struct ResponseEncoder {
    header_encoder: HeaderEncoder,
    payload_encoder: Option<PayloadEncoder>,
}

impl ResponseEncoder {
    pub fn new() -> Self {
        Default::default()
    }

    /// True while no response is in flight: either nothing was written yet, or the last
    /// payload reached its eof.
    pub fn is_idle(&self) -> bool {
        self.payload_encoder.is_none()
    }
}

impl Default for ResponseEncoder {
    fn default() -> Self {
        Self { header_encoder: HeaderEncoder, payload_encoder: None }
    }
}

impl<D: Buf> Encoder<Message<(ResponseHead, PayloadSize), D>> for ResponseEncoder {
    type Error = SendError;

    fn encode(&mut self, item: Message<(ResponseHead, PayloadSize), D>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            Message::Header((head, payload_size)) => {
                if self.payload_encoder.is_some() {
                    error!("expect payload item but receive response head");
                    return Err(SendError::invalid_head("response head already written"));
                }

                self.header_encoder.encode((head, payload_size), dst)?;
                self.payload_encoder = Some(PayloadEncoder::new(payload_size));
                Ok(())
            }

            Message::Payload(payload_item) => {
                let Some(payload_encoder) = &mut self.payload_encoder else {
                    error!("expect response head but receive payload item");
                    return Err(SendError::invalid_body("payload written before response head"));
                };

                let result = payload_encoder.encode(payload_item, dst);

                if payload_encoder.is_finish() {
                    self.payload_encoder.take();
                }

                result
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{PayloadItem, response_head};
    use bytes::Bytes;
    use http::{HeaderMap, StatusCode};

    type Item = Message<(ResponseHead, PayloadSize)>;

    fn head(size: PayloadSize) -> Item {
        Message::Header((response_head(StatusCode::OK, HeaderMap::new()), size))
    }

    #[test]
    fn chunked_response_round() {
        let mut encoder = ResponseEncoder::new();
        let mut dst = BytesMut::new();

        encoder.encode(head(PayloadSize::Chunked), &mut dst).unwrap();
        assert!(!encoder.is_idle());

        encoder.encode(Item::from(Bytes::from_static(b"abc")), &mut dst).unwrap();
        encoder.encode(Item::Payload(PayloadItem::Eof), &mut dst).unwrap();
        assert!(encoder.is_idle());

        let out = String::from_utf8(dst.to_vec()).unwrap();
        assert!(out.ends_with("\r\n\r\n3\r\nabc\r\n0\r\n\r\n"));
    }

    #[test]
    fn payload_before_head_fails() {
        let mut encoder = ResponseEncoder::new();
        let mut dst = BytesMut::new();

        let result = encoder.encode(Item::from(Bytes::from_static(b"abc")), &mut dst);
        assert!(matches!(result, Err(SendError::InvalidBody { .. })));
    }

    #[test]
    fn second_head_fails_while_in_flight() {
        let mut encoder = ResponseEncoder::new();
        let mut dst = BytesMut::new();

        encoder.encode(head(PayloadSize::Length(3)), &mut dst).unwrap();
        let result = encoder.encode(head(PayloadSize::Empty), &mut dst);
        assert!(matches!(result, Err(SendError::InvalidHead { .. })));
    }

    #[test]
    fn omitted_body_rejects_bytes() {
        let mut encoder = ResponseEncoder::new();
        let mut dst = BytesMut::new();

        encoder.encode(head(PayloadSize::Omitted), &mut dst).unwrap();
        let result = encoder.encode(Item::from(Bytes::from_static(b"abc")), &mut dst);
        assert!(matches!(result, Err(SendError::InvalidBody { .. })));
    }
}
