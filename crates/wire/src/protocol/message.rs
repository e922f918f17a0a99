use bytes::{Buf, Bytes};

/// An outbound HTTP message item: either the response head or a piece of the payload.
///
/// `Data` is the buffer type carried by payload chunks (defaults to `Bytes`).
pub enum Message<T, Data: Buf = Bytes> {
    /// The response head, written once before any payload item
    Header(T),
    /// A chunk of payload data or the EOF marker
    Payload(PayloadItem<Data>),
}

/// An item of the outbound payload stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadItem<Data: Buf = Bytes> {
    /// A chunk of payload data
    Chunk(Data),
    /// Marks the end of the payload stream
    Eof,
}

/// How the payload following a response head is framed on the wire.
///
/// - `Length`: exactly `n` bytes follow, announced with `Content-Length`
/// - `Chunked`: unknown length, `Transfer-Encoding: chunked`
/// - `Empty`: no payload, `Content-Length: 0`
/// - `Omitted`: no payload is sent but the headers still describe the one that would
///   have been (HEAD requests, `304 Not Modified`); framing headers are left untouched
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PayloadSize {
    Length(u64),
    Chunked,
    Empty,
    Omitted,
}

impl PayloadSize {
    /// Returns true if the payload uses chunked transfer encoding
    #[inline]
    pub fn is_chunked(&self) -> bool {
        matches!(self, PayloadSize::Chunked)
    }

    /// Returns true if no payload byte will follow the head
    #[inline]
    pub fn is_bodiless(&self) -> bool {
        matches!(self, PayloadSize::Empty | PayloadSize::Omitted)
    }

    /// Picks the framing for a body with the given exact size, if known.
    pub fn from_exact(exact: Option<u64>) -> Self {
        match exact {
            Some(0) => PayloadSize::Empty,
            Some(length) => PayloadSize::Length(length),
            None => PayloadSize::Chunked,
        }
    }
}

impl<T, D: Buf> Message<T, D> {
    #[inline]
    pub fn is_payload(&self) -> bool {
        matches!(self, Message::Payload(_))
    }

    #[inline]
    pub fn is_header(&self) -> bool {
        matches!(self, Message::Header(_))
    }
}

impl<T> From<Bytes> for Message<T> {
    fn from(bytes: Bytes) -> Self {
        Self::Payload(PayloadItem::Chunk(bytes))
    }
}

impl<D: Buf> PayloadItem<D> {
    #[inline]
    pub fn is_eof(&self) -> bool {
        matches!(self, PayloadItem::Eof)
    }

    #[inline]
    pub fn is_chunk(&self) -> bool {
        matches!(self, PayloadItem::Chunk(_))
    }

    /// Number of payload bytes carried by this item.
    pub fn len(&self) -> usize {
        match self {
            PayloadItem::Chunk(data) => data.remaining(),
            PayloadItem::Eof => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_from_exact() {
        assert_eq!(PayloadSize::from_exact(Some(0)), PayloadSize::Empty);
        assert_eq!(PayloadSize::from_exact(Some(12)), PayloadSize::Length(12));
        assert_eq!(PayloadSize::from_exact(None), PayloadSize::Chunked);
    }

    #[test]
    fn omitted_is_bodiless() {
        assert!(PayloadSize::Omitted.is_bodiless());
        assert!(PayloadSize::Empty.is_bodiless());
        assert!(!PayloadSize::Length(1).is_bodiless());
    }

    #[test]
    fn item_len() {
        let item: PayloadItem = PayloadItem::Chunk(Bytes::from_static(b"hello"));
        assert_eq!(item.len(), 5);
        assert_eq!(PayloadItem::<Bytes>::Eof.len(), 0);
    }
}
