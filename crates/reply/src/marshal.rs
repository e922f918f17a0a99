//! Turns an envelope's source into the payload that gets transmitted.

use crate::boom::HttpError;
use crate::envelope::{Envelope, Source};
use crate::error::TransmitError;
use crate::payload::Payload;
use http::HeaderValue;
use http::header::LAST_MODIFIED;
use mime::Mime;
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tracing::debug;

pub(crate) async fn marshal(envelope: &mut Envelope) -> Result<Payload, TransmitError> {
    let payload = match envelope.take_source() {
        Source::Empty => plain(Payload::empty()),
        Source::Text(text) => {
            default_type(envelope, &mime::TEXT_PLAIN);
            plain(Payload::buffer(text))
        }
        Source::Json(serialize) => {
            let bytes = serialize().map_err(|e| TransmitError::marshal_with("can't serialize payload", e))?;
            default_type(envelope, &mime::APPLICATION_JSON);
            plain(Payload::buffer(bytes))
        }
        Source::Bytes(bytes) => {
            default_type(envelope, &mime::APPLICATION_OCTET_STREAM);
            Payload::buffer(bytes)
        }
        Source::Payload(payload) => payload,
        Source::File(path) => open(envelope, path).await?,
    };

    if envelope.settings.pass_through && !envelope.status_set {
        if let Some(status) = payload.status() {
            envelope.status = status;
        }
    }

    Ok(payload)
}

fn plain(mut payload: Payload) -> Payload {
    payload.allow_jsonp();
    payload
}

fn default_type(envelope: &mut Envelope, mime: &Mime) {
    if envelope.content_type.is_none() {
        envelope.content_type = Some(mime.to_string());
    }
}

async fn open(envelope: &mut Envelope, path: PathBuf) -> Result<Payload, TransmitError> {
    let file = File::open(&path).await.map_err(|e| file_error(&path, e))?;
    let metadata = file.metadata().await.map_err(|e| file_error(&path, e))?;
    if metadata.is_dir() {
        return Err(TransmitError::marshal_with(
            format!("{} is a directory", path.display()),
            HttpError::forbidden("Access to directory denied"),
        ));
    }

    if !envelope.headers.contains_key(LAST_MODIFIED) {
        if let Ok(modified) = metadata.modified() {
            let value = httpdate::fmt_http_date(modified);
            if let Ok(value) = HeaderValue::from_str(&value) {
                envelope.headers.insert(LAST_MODIFIED, value);
            }
        }
    }
    default_type(envelope, &mime::APPLICATION_OCTET_STREAM);

    let mut payload = Payload::file(file, Some(metadata.len()));
    if envelope.settings.lookup_compressed {
        if let Some(gzipped) = open_gzipped(&path).await {
            payload = payload.with_gzipped(gzipped);
        }
    }
    Ok(payload)
}

/// The precomputed `<path>.gz` sibling, when there is a readable one.
async fn open_gzipped(path: &Path) -> Option<Payload> {
    let mut gz_path = OsString::from(path.as_os_str());
    gz_path.push(".gz");
    let gz_path = PathBuf::from(gz_path);

    let file = match File::open(&gz_path).await {
        Ok(file) => file,
        Err(e) => {
            debug!(path = %gz_path.display(), cause = %e, "no precompressed variant");
            return None;
        }
    };
    let metadata = file.metadata().await.ok().filter(|metadata| metadata.is_file())?;
    Some(Payload::file(file, Some(metadata.len())))
}

fn file_error(path: &Path, e: io::Error) -> TransmitError {
    let reason = format!("can't open {}: {e}", path.display());
    let http_error = match e.kind() {
        io::ErrorKind::NotFound => HttpError::not_found("File not found").with_source(e),
        io::ErrorKind::PermissionDenied => HttpError::forbidden("Access to file denied").with_source(e),
        _ => HttpError::internal(e),
    };
    TransmitError::marshal_with(reason, http_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boom::{DefaultErrorMapper, ErrorMapper};
    use crate::envelope::Settings;
    use http::StatusCode;
    use http_body_util::BodyExt;
    use serde::ser::{Serialize, Serializer};

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("micro-reply-marshal-{}-{name}", std::process::id()))
    }

    fn mapped_status(err: TransmitError) -> StatusCode {
        DefaultErrorMapper.map(err.into()).status()
    }

    #[tokio::test]
    async fn text_payload() {
        let mut envelope = Envelope::text("hello");
        let payload = marshal(&mut envelope).await.unwrap();

        assert_eq!(envelope.content_type.as_deref(), Some("text/plain"));
        assert!(payload.supports_jsonp());
        assert_eq!(payload.collect().await.unwrap().to_bytes(), "hello");
    }

    #[tokio::test]
    async fn json_payload() {
        let mut envelope = Envelope::json(serde_json::json!({"a": 1}));
        let payload = marshal(&mut envelope).await.unwrap();

        assert_eq!(envelope.content_type.as_deref(), Some("application/json"));
        assert_eq!(payload.collect().await.unwrap().to_bytes(), r#"{"a":1}"#);
    }

    #[tokio::test]
    async fn declared_type_is_kept() {
        let mut envelope = Envelope::buffer(vec![1, 2, 3]).content_type("image/png");
        let payload = marshal(&mut envelope).await.unwrap();

        assert_eq!(envelope.content_type.as_deref(), Some("image/png"));
        assert!(!payload.supports_jsonp());
    }

    struct Unserializable;

    impl Serialize for Unserializable {
        fn serialize<S: Serializer>(&self, _serializer: S) -> Result<S::Ok, S::Error> {
            Err(serde::ser::Error::custom("nope"))
        }
    }

    #[tokio::test]
    async fn serialization_failure_is_a_marshal_error() {
        let mut envelope = Envelope::json(Unserializable);
        let err = marshal(&mut envelope).await.unwrap_err();
        assert!(matches!(err, TransmitError::Marshal { .. }));
        assert_eq!(mapped_status(err), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn upstream_status_is_adopted() {
        let mut envelope = Envelope::payload(Payload::empty().with_status(StatusCode::CREATED));
        marshal(&mut envelope).await.unwrap();
        assert_eq!(envelope.status(), StatusCode::CREATED);

        let mut envelope = Envelope::payload(Payload::empty().with_status(StatusCode::CREATED)).code(StatusCode::ACCEPTED);
        marshal(&mut envelope).await.unwrap();
        assert_eq!(envelope.status(), StatusCode::ACCEPTED);

        let settings = Settings { pass_through: false, ..Settings::default() };
        let mut envelope = Envelope::payload(Payload::empty().with_status(StatusCode::CREATED)).settings(settings);
        marshal(&mut envelope).await.unwrap();
        assert_eq!(envelope.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn file_payload() {
        let path = temp_path("file.txt");
        tokio::fs::write(&path, b"file contents").await.unwrap();

        let mut envelope = Envelope::file(&path);
        let payload = marshal(&mut envelope).await.unwrap();

        assert_eq!(payload.exact_size(), Some(13));
        assert!(envelope.headers().contains_key(LAST_MODIFIED));
        assert_eq!(envelope.content_type.as_deref(), Some("application/octet-stream"));
        assert_eq!(payload.collect().await.unwrap().to_bytes(), "file contents");

        tokio::fs::remove_file(&path).await.unwrap();
    }

    #[tokio::test]
    async fn precompressed_variant() {
        let path = temp_path("asset.js");
        let mut gz_path = path.clone().into_os_string();
        gz_path.push(".gz");
        tokio::fs::write(&path, b"plain").await.unwrap();
        tokio::fs::write(&gz_path, b"gz").await.unwrap();

        let settings = Settings { lookup_compressed: true, ..Settings::default() };
        let mut envelope = Envelope::file(&path).settings(settings);
        assert!(marshal(&mut envelope).await.unwrap().has_gzipped());

        let mut envelope = Envelope::file(&path);
        assert!(!marshal(&mut envelope).await.unwrap().has_gzipped());

        tokio::fs::remove_file(&path).await.unwrap();
        tokio::fs::remove_file(&gz_path).await.unwrap();
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let mut envelope = Envelope::file(temp_path("does-not-exist"));
        let err = marshal(&mut envelope).await.unwrap_err();
        assert_eq!(mapped_status(err), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn directory_is_forbidden() {
        let mut envelope = Envelope::file(std::env::temp_dir());
        let err = marshal(&mut envelope).await.unwrap_err();
        assert_eq!(mapped_status(err), StatusCode::FORBIDDEN);
    }
}
