//! Resolution of the final header set.

use crate::boom::HttpError;
use crate::connection::RequestHead;
use crate::envelope::Envelope;
use crate::error::TransmitError;
use crate::payload::Payload;
use http::header::{CONTENT_LENGTH, CONTENT_TYPE, SET_COOKIE, VARY};
use http::{HeaderMap, HeaderName, HeaderValue};
use mime::Mime;
use tracing::debug;

const JAVASCRIPT: &str = "text/javascript";

/// Wraps a JSONP-capable payload in the callback named by the request's query string.
pub(crate) fn jsonp(envelope: &mut Envelope, payload: &mut Payload, request: &RequestHead) -> Result<(), TransmitError> {
    let Some(param) = envelope.settings.jsonp.as_deref() else {
        return Ok(());
    };
    let Some(callback) = request.query_param(param) else {
        return Ok(());
    };

    if !is_valid_callback(&callback) {
        return Err(TransmitError::marshal_with(
            format!("invalid jsonp callback {callback:?}"),
            HttpError::bad_request("Invalid JSONP parameter value"),
        ));
    }

    if payload.supports_jsonp() {
        envelope.content_type = Some(JAVASCRIPT.to_string());
        envelope.headers.remove(CONTENT_TYPE);
        payload.jsonp(&callback);
    }
    Ok(())
}

fn is_valid_callback(callback: &str) -> bool {
    !callback.is_empty() && callback.bytes().all(|b| b.is_ascii_alphanumeric() || b"_$[].".contains(&b))
}

/// Applies the declared headers, the content type and the content length.
pub(crate) fn apply(envelope: &mut Envelope, payload: &Payload) -> Result<(), TransmitError> {
    for declared in std::mem::take(&mut envelope.declared) {
        let name = HeaderName::from_bytes(declared.name.as_bytes())
            .map_err(|_| TransmitError::header(format!("invalid header name {:?}", declared.name)))?;
        let value = HeaderValue::from_str(&declared.value)
            .map_err(|_| TransmitError::header(format!("invalid value for header {name}")))?;

        if declared.append {
            envelope.headers.append(name, value);
        } else {
            envelope.headers.insert(name, value);
        }
    }

    let content_type = match envelope.headers.get(CONTENT_TYPE) {
        Some(value) => Some(value.to_str().map_err(|_| TransmitError::header("non visible content-type"))?.to_string()),
        None => envelope.content_type.clone(),
    };
    if let Some(content_type) = content_type {
        let content_type = with_charset(&content_type, envelope.settings.charset.as_deref())?;
        let value = HeaderValue::from_str(&content_type)
            .map_err(|_| TransmitError::header(format!("invalid content-type {content_type:?}")))?;
        envelope.headers.insert(CONTENT_TYPE, value);
    }

    if !envelope.headers.contains_key(CONTENT_LENGTH) {
        if let Some(size) = payload.exact_size() {
            envelope.headers.insert(CONTENT_LENGTH, HeaderValue::from(size));
        }
    }

    Ok(())
}

fn with_charset(content_type: &str, charset: Option<&str>) -> Result<String, TransmitError> {
    let Some(charset) = charset else {
        return Ok(content_type.to_string());
    };

    let mime: Mime = content_type
        .parse()
        .map_err(|_| TransmitError::header(format!("invalid content-type {content_type:?}")))?;

    let textual = mime.type_() == mime::TEXT
        || (mime.type_() == mime::APPLICATION
            && (mime.subtype() == mime::JSON
                || mime.subtype() == mime::JAVASCRIPT
                || mime.suffix() == Some(mime::JSON)));

    if textual && mime.get_param(mime::CHARSET).is_none() {
        Ok(format!("{content_type}; charset={charset}"))
    } else {
        Ok(content_type.to_string())
    }
}

/// Merges headers carried by the payload under the envelope's own: explicit values win,
/// except `Set-Cookie` where the payload's cookies come first and the explicit ones are
/// appended after them.
pub(crate) fn merge_pass_through(local: &mut HeaderMap, upstream: &HeaderMap) {
    let mut merged = upstream.clone();
    for name in local.keys() {
        if name != SET_COOKIE {
            merged.remove(name);
        }
    }
    for (name, value) in local.iter() {
        merged.append(name.clone(), value.clone());
    }
    *local = merged;
}

/// Adds `token` to `Vary` as a distinct entry. `Vary: *` already covers everything.
pub fn append_vary(headers: &mut HeaderMap, token: &str) {
    let tokens: Vec<&str> = headers
        .get_all(VARY)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .collect();

    if tokens.iter().any(|existing| *existing == "*" || existing.eq_ignore_ascii_case(token)) {
        return;
    }

    let mut value = tokens.join(", ");
    if !value.is_empty() {
        value.push_str(", ");
    }
    value.push_str(token);

    match HeaderValue::from_str(&value) {
        Ok(value) => {
            headers.insert(VARY, value);
        }
        Err(e) => debug!(cause = %e, token, "skip invalid vary token"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::Settings;
    use bytes::Bytes;
    use http::header::{ETAG, SERVER};
    use http_body_util::BodyExt;

    fn buffer_payload(body: &'static str) -> Payload {
        let mut payload = Payload::buffer(body);
        payload.allow_jsonp();
        payload
    }

    #[test]
    fn declared_headers_are_applied() {
        let mut envelope = Envelope::text("x").header("x-one", "1").append_header("x-one", "2").header("etag", "\"v1\"");
        apply(&mut envelope, &Payload::buffer("x")).unwrap();

        let values: Vec<_> = envelope.headers.get_all("x-one").iter().collect();
        assert_eq!(values, ["1", "2"]);
        assert_eq!(envelope.headers[ETAG], "\"v1\"");
        assert_eq!(envelope.headers[CONTENT_LENGTH], "1");
    }

    #[test]
    fn invalid_declaration_fails() {
        let mut envelope = Envelope::text("x").header("bad name", "1");
        assert!(matches!(apply(&mut envelope, &Payload::empty()), Err(TransmitError::Header { .. })));

        let mut envelope = Envelope::text("x").header("x-ok", "line\nbreak");
        assert!(matches!(apply(&mut envelope, &Payload::empty()), Err(TransmitError::Header { .. })));
    }

    #[test]
    fn charset_for_textual_types() {
        let mut envelope = Envelope::text("x").content_type("application/json");
        apply(&mut envelope, &Payload::empty()).unwrap();
        assert_eq!(envelope.headers[CONTENT_TYPE], "application/json; charset=utf-8");

        let mut envelope = Envelope::text("x").content_type("text/html; charset=iso-8859-1");
        apply(&mut envelope, &Payload::empty()).unwrap();
        assert_eq!(envelope.headers[CONTENT_TYPE], "text/html; charset=iso-8859-1");

        let mut envelope = Envelope::text("x").content_type("image/png");
        apply(&mut envelope, &Payload::empty()).unwrap();
        assert_eq!(envelope.headers[CONTENT_TYPE], "image/png");
    }

    #[test]
    fn no_charset_setting() {
        let settings = Settings { charset: None, ..Settings::default() };
        let mut envelope = Envelope::text("x").content_type("text/plain").settings(settings);
        apply(&mut envelope, &Payload::empty()).unwrap();
        assert_eq!(envelope.headers[CONTENT_TYPE], "text/plain");
    }

    #[test]
    fn explicit_content_length_is_kept() {
        let mut envelope = Envelope::text("x").header("content-length", "3");
        apply(&mut envelope, &Payload::buffer("abcdef")).unwrap();
        assert_eq!(envelope.headers[CONTENT_LENGTH], "3");
    }

    #[test]
    fn unknown_size_has_no_length() {
        let mut envelope = Envelope::text("x");
        apply(&mut envelope, &Payload::stream(futures::stream::empty())).unwrap();
        assert!(!envelope.headers.contains_key(CONTENT_LENGTH));
    }

    #[test]
    fn pass_through_merge() {
        let mut local = HeaderMap::new();
        local.append(SET_COOKIE, HeaderValue::from_static("A"));
        local.insert(SERVER, HeaderValue::from_static("local"));

        let mut upstream = HeaderMap::new();
        upstream.append(SET_COOKIE, HeaderValue::from_static("B"));
        upstream.insert(SERVER, HeaderValue::from_static("upstream"));
        upstream.insert(ETAG, HeaderValue::from_static("\"up\""));

        merge_pass_through(&mut local, &upstream);

        let cookies: Vec<_> = local.get_all(SET_COOKIE).iter().collect();
        assert_eq!(cookies, ["B", "A"]);
        assert_eq!(local[SERVER], "local");
        assert_eq!(local[ETAG], "\"up\"");
    }

    #[test]
    fn vary_tokens() {
        let mut headers = HeaderMap::new();
        headers.insert(VARY, HeaderValue::from_static("Origin"));
        append_vary(&mut headers, "accept-encoding");
        append_vary(&mut headers, "Accept-Encoding");
        assert_eq!(headers[VARY], "Origin, accept-encoding");

        let mut headers = HeaderMap::new();
        headers.insert(VARY, HeaderValue::from_static("*"));
        append_vary(&mut headers, "accept-encoding");
        assert_eq!(headers[VARY], "*");
    }

    #[tokio::test]
    async fn jsonp_wraps_and_retypes() {
        let settings = Settings { jsonp: Some("callback".to_string()), ..Settings::default() };
        let mut envelope = Envelope::json(serde_json::json!({"a": 1})).settings(settings).content_type("application/json");
        let mut payload = buffer_payload(r#"{"a":1}"#);

        jsonp(&mut envelope, &mut payload, &RequestHead::get("/x?callback=cb")).unwrap();
        apply(&mut envelope, &payload).unwrap();

        assert_eq!(envelope.headers[CONTENT_TYPE], "text/javascript; charset=utf-8");
        let body = payload.collect().await.unwrap().to_bytes();
        assert_eq!(body, Bytes::from(r#"/**/cb({"a":1});"#));
    }

    #[test]
    fn jsonp_requires_the_query_parameter() {
        let settings = Settings { jsonp: Some("callback".to_string()), ..Settings::default() };
        let mut envelope = Envelope::text("x").settings(settings);
        let mut payload = buffer_payload("x");

        jsonp(&mut envelope, &mut payload, &RequestHead::get("/x")).unwrap();
        assert!(envelope.content_type.is_none());
    }

    #[test]
    fn invalid_jsonp_callback() {
        let settings = Settings { jsonp: Some("callback".to_string()), ..Settings::default() };
        let mut envelope = Envelope::text("x").settings(settings);
        let mut payload = buffer_payload("x");

        let err = jsonp(&mut envelope, &mut payload, &RequestHead::get("/x?callback=alert(1)")).unwrap_err();
        assert!(matches!(err, TransmitError::Marshal { .. }));
    }
}
