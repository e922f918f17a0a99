//! Conditional GET: decides whether a response can be answered with `304 Not Modified`.

use crate::connection::RequestHead;
use http::header::{ETAG, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED};
use http::{HeaderMap, HeaderValue, Method, StatusCode};
use std::time::SystemTime;

/// True when the client's cached copy is still valid. Only GET and HEAD requests
/// answered with a success status qualify.
///
/// The entity tag is compared byte for byte; otherwise the dates are compared when
/// both sides parse as HTTP dates.
pub fn is_fresh(request: &RequestHead, status: StatusCode, headers: &HeaderMap) -> bool {
    if !matches!(*request.method(), Method::GET | Method::HEAD) || !status.is_success() {
        return false;
    }

    if let (Some(etag), Some(if_none_match)) = (headers.get(ETAG), request.header(IF_NONE_MATCH)) {
        if etag.as_bytes() == if_none_match.as_bytes() {
            return true;
        }
    }

    match (http_date(request.header(IF_MODIFIED_SINCE)), http_date(headers.get(LAST_MODIFIED))) {
        (Some(if_modified_since), Some(last_modified)) => if_modified_since >= last_modified,
        _ => false,
    }
}

/// Returns the status to send: `304` when the client's copy is fresh, `status` otherwise.
pub fn evaluate(request: &RequestHead, status: StatusCode, headers: &HeaderMap) -> StatusCode {
    if is_fresh(request, status, headers) { StatusCode::NOT_MODIFIED } else { status }
}

fn http_date(value: Option<&HeaderValue>) -> Option<SystemTime> {
    let value = value?.to_str().ok()?;
    httpdate::parse_http_date(value).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const MODIFIED: &str = "Wed, 21 Oct 2015 07:28:00 GMT";
    const LATER: &str = "Wed, 21 Oct 2015 08:00:00 GMT";
    const EARLIER: &str = "Tue, 20 Oct 2015 07:28:00 GMT";

    fn etagged(etag: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(ETAG, HeaderValue::from_static(etag));
        headers
    }

    fn modified(at: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(LAST_MODIFIED, HeaderValue::from_static(at));
        headers
    }

    #[test]
    fn matching_etag() {
        let request = RequestHead::get("/").with_header(IF_NONE_MATCH, HeaderValue::from_static("\"v1\""));
        assert_eq!(evaluate(&request, StatusCode::OK, &etagged("\"v1\"")), StatusCode::NOT_MODIFIED);
        assert_eq!(evaluate(&request, StatusCode::OK, &etagged("\"v2\"")), StatusCode::OK);
    }

    #[test]
    fn etag_comparison_is_exact() {
        let request = RequestHead::get("/").with_header(IF_NONE_MATCH, HeaderValue::from_static("W/\"v1\""));
        assert!(!is_fresh(&request, StatusCode::OK, &etagged("\"v1\"")));
    }

    #[test]
    fn head_requests_qualify() {
        let request = RequestHead::head("/").with_header(IF_NONE_MATCH, HeaderValue::from_static("\"v1\""));
        assert!(is_fresh(&request, StatusCode::OK, &etagged("\"v1\"")));
    }

    #[test]
    fn other_methods_do_not() {
        let request = RequestHead::new(Method::POST, http::Uri::from_static("/"))
            .with_header(IF_NONE_MATCH, HeaderValue::from_static("\"v1\""));
        assert!(!is_fresh(&request, StatusCode::OK, &etagged("\"v1\"")));
    }

    #[test]
    fn errors_are_never_downgraded() {
        let request = RequestHead::get("/").with_header(IF_NONE_MATCH, HeaderValue::from_static("\"v1\""));
        assert!(!is_fresh(&request, StatusCode::NOT_FOUND, &etagged("\"v1\"")));
        assert!(!is_fresh(&request, StatusCode::FOUND, &etagged("\"v1\"")));
    }

    #[test]
    fn modified_since() {
        for (since, fresh) in [(MODIFIED, true), (LATER, true), (EARLIER, false)] {
            let request = RequestHead::get("/").with_header(IF_MODIFIED_SINCE, HeaderValue::from_static(since));
            assert_eq!(is_fresh(&request, StatusCode::OK, &modified(MODIFIED)), fresh, "{since}");
        }
    }

    #[test]
    fn unparsable_dates_are_ignored() {
        let request = RequestHead::get("/").with_header(IF_MODIFIED_SINCE, HeaderValue::from_static("yesterday"));
        assert!(!is_fresh(&request, StatusCode::OK, &modified(MODIFIED)));
    }

    #[test]
    fn system_time_round_trip() {
        let at = SystemTime::UNIX_EPOCH + Duration::from_secs(1_445_412_480);
        let value = HeaderValue::from_str(&httpdate::fmt_http_date(at)).unwrap();
        assert_eq!(http_date(Some(&value)), Some(at));
    }
}
