//! The normalized response a transmission starts from.
//!
//! An [`Envelope`] is produced by [`wrap`](crate::wrap) from whatever the handler
//! returned. It stays mutable (status, headers, settings) until the transmitter takes it;
//! header declarations made through [`Envelope::header`] are validated only then, so a
//! bad declaration turns the response into an error response instead of panicking here.

use crate::boom::HttpError;
use crate::error::BoxError;
use crate::headers;
use crate::payload::Payload;
use crate::tap::Observer;
use bytes::Bytes;
use http::{HeaderMap, HeaderValue, StatusCode};
use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;

/// How the payload of an envelope gets produced.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Variety {
    /// a value serialized in memory
    Plain,
    /// a raw byte buffer
    Buffer,
    /// a caller provided stream or body
    Stream,
    /// a file read from disk
    File,
}

/// Per-response transmission settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct Settings {
    /// merge headers (and status) carried by the payload, e.g. from a proxied response
    pub pass_through: bool,
    /// name of the query parameter holding a JSONP callback
    pub jsonp: Option<String>,
    /// whether the payload may be compressed on the fly
    pub compressible: bool,
    /// charset appended to textual content types
    pub charset: Option<String>,
    /// serve `<path>.gz` as the precomputed gzip variant of a file
    pub lookup_compressed: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            pass_through: true,
            jsonp: None,
            compressible: true,
            charset: Some("utf-8".to_string()),
            lookup_compressed: false,
        }
    }
}

type Serializer = Box<dyn FnOnce() -> serde_json::Result<Vec<u8>> + Send>;

pub(crate) enum Source {
    Empty,
    Text(String),
    Json(Serializer),
    Bytes(Bytes),
    Payload(Payload),
    File(PathBuf),
}

impl Source {
    fn variety(&self) -> Variety {
        match self {
            Source::Empty | Source::Text(_) | Source::Json(_) => Variety::Plain,
            Source::Bytes(_) => Variety::Buffer,
            Source::Payload(_) => Variety::Stream,
            Source::File(_) => Variety::File,
        }
    }
}

/// A raw header declaration, validated when the response is prepared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Declared {
    pub(crate) name: String,
    pub(crate) value: String,
    pub(crate) append: bool,
}

pub struct Envelope {
    pub(crate) status: StatusCode,
    pub(crate) status_set: bool,
    pub(crate) headers: HeaderMap,
    pub(crate) declared: Vec<Declared>,
    pub(crate) content_type: Option<String>,
    pub(crate) source: Source,
    pub(crate) settings: Settings,
    pub(crate) tap: Option<Box<dyn Observer>>,
    pub(crate) failure: Option<BoxError>,
    pub(crate) error: bool,
}

impl Envelope {
    pub(crate) fn with_source(source: Source) -> Self {
        Self {
            status: StatusCode::OK,
            status_set: false,
            headers: HeaderMap::new(),
            declared: Vec::new(),
            content_type: None,
            source,
            settings: Settings::default(),
            tap: None,
            failure: None,
            error: false,
        }
    }

    pub fn empty() -> Self {
        Self::with_source(Source::Empty)
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::with_source(Source::Text(text.into()))
    }

    pub fn buffer(bytes: impl Into<Bytes>) -> Self {
        Self::with_source(Source::Bytes(bytes.into()))
    }

    /// Serializes `value` as JSON when the response is marshalled.
    pub fn json<T>(value: T) -> Self
    where
        T: serde::Serialize + Send + 'static,
    {
        Self::with_source(Source::Json(Box::new(move || serde_json::to_vec(&value))))
    }

    pub fn payload(payload: Payload) -> Self {
        Self::with_source(Source::Payload(payload))
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::with_source(Source::File(path.into()))
    }

    /// An envelope for an error not yet mapped to an HTTP status; the transmitter's
    /// error mapper decides what it becomes.
    pub fn failure<E: Into<BoxError>>(error: E) -> Self {
        let mut envelope = Self::empty();
        envelope.failure = Some(error.into());
        envelope
    }

    /// The standard error response: the error's status and headers, its JSON payload.
    pub fn from_http_error(error: HttpError) -> Self {
        let payload = error.payload();
        let mut envelope = Self::json(payload);
        envelope.status = error.status();
        envelope.status_set = true;
        envelope.error = true;
        for (name, value) in error.headers() {
            envelope.headers.append(name.clone(), value.clone());
        }
        envelope
    }

    /// The last-resort response when even the error response could not be prepared.
    pub(crate) fn bare(status: StatusCode) -> Self {
        let mut envelope = Self::empty();
        envelope.status = status;
        envelope.status_set = true;
        envelope.error = true;
        envelope.headers.insert(http::header::CONTENT_LENGTH, HeaderValue::from_static("0"));
        envelope
    }

    #[must_use]
    pub fn code(mut self, status: StatusCode) -> Self {
        self.status = status;
        self.status_set = true;
        self
    }

    /// Declares a header, replacing previous values of the same name.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.declared.push(Declared { name: name.into(), value: value.into(), append: false });
        self
    }

    /// Declares an additional value for a header (`Set-Cookie`, ...).
    #[must_use]
    pub fn append_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.declared.push(Declared { name: name.into(), value: value.into(), append: true });
        self
    }

    #[must_use]
    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Adds `header` to `Vary` unless already listed.
    #[must_use]
    pub fn vary(mut self, header: &str) -> Self {
        headers::append_vary(&mut self.headers, header);
        self
    }

    #[must_use]
    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    #[must_use]
    pub fn tap<O: Observer + 'static>(mut self, observer: O) -> Self {
        self.tap = Some(Box::new(observer));
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn variety(&self) -> Variety {
        self.source.variety()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn settings_ref(&self) -> &Settings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    pub fn is_error(&self) -> bool {
        self.error || self.failure.is_some()
    }

    pub(crate) fn take_source(&mut self) -> Source {
        std::mem::replace(&mut self.source, Source::Empty)
    }
}

impl fmt::Debug for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Envelope")
            .field("status", &self.status)
            .field("variety", &self.variety())
            .field("headers", &self.headers)
            .field("declared", &self.declared)
            .field("settings", &self.settings)
            .field("failure", &self.failure)
            .finish_non_exhaustive()
    }
}
