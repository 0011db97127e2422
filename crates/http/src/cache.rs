//! HTTP caching for read endpoints: strong ETags, conditional GETs and
//! `Cache-Control` policies. Mutations are marked [`NoStore`].
//!
//! The ETag is the BLAKE3 digest of the serialized body, so two responses
//! carrying the same JSON always carry the same validator.

use axum::{
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    /// Shared caches may store the response.
    Public,
    /// Per-user response; varies on `Authorization`.
    Private,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    pub max_age: u32,
    pub visibility: Visibility,
}

impl CachePolicy {
    pub const fn public(max_age: u32) -> Self {
        Self {
            max_age,
            visibility: Visibility::Public,
        }
    }

    pub const fn private(max_age: u32) -> Self {
        Self {
            max_age,
            visibility: Visibility::Private,
        }
    }

    pub fn cache_control(&self) -> String {
        let scope = match self.visibility {
            Visibility::Public => "public",
            Visibility::Private => "private",
        };
        format!("{scope}, max-age={}", self.max_age)
    }

    fn apply(&self, etag: &str, headers: &mut HeaderMap) {
        if let Ok(value) = HeaderValue::from_str(etag) {
            headers.insert(header::ETAG, value);
        }
        if let Ok(value) = HeaderValue::from_str(&self.cache_control()) {
            headers.insert(header::CACHE_CONTROL, value);
        }
        if self.visibility == Visibility::Private {
            headers.insert(header::VARY, HeaderValue::from_static("Authorization"));
        }
    }
}

/// Quoted strong validator for a response body.
pub fn etag_for(body: &[u8]) -> String {
    format!("\"{}\"", blake3::hash(body).to_hex())
}

/// Weak comparison of an `If-None-Match` header against `etag`.
///
/// Accepts a single tag, a comma-separated list, `W/` prefixed tags and `*`.
pub fn if_none_match(headers: &HeaderMap, etag: &str) -> bool {
    let wanted = strip_weak(etag);
    headers
        .get_all(header::IF_NONE_MATCH)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(str::trim)
        .any(|candidate| candidate == "*" || strip_weak(candidate) == wanted)
}

fn strip_weak(tag: &str) -> &str {
    tag.strip_prefix("W/").unwrap_or(tag)
}

/// Serialize `body` and answer `304 Not Modified` when the client already
/// holds this representation, otherwise `200` with validators attached.
pub fn cached_json<T: Serialize>(
    request_headers: &HeaderMap,
    policy: CachePolicy,
    body: &T,
) -> Result<Response, AppError> {
    let bytes = serde_json::to_vec(body).map_err(anyhow::Error::from)?;
    let etag = etag_for(&bytes);

    let mut response = if if_none_match(request_headers, &etag) {
        tracing::debug!(etag = %etag, "conditional request matched");
        StatusCode::NOT_MODIFIED.into_response()
    } else {
        let mut ok = (StatusCode::OK, bytes).into_response();
        ok.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        ok
    };
    policy.apply(&etag, response.headers_mut());
    Ok(response)
}

/// Marks a response as never cacheable.
#[derive(Debug, Clone)]
pub struct NoStore<R>(pub R);

impl<R: IntoResponse> IntoResponse for NoStore<R> {
    fn into_response(self) -> Response {
        let mut response = self.0.into_response();
        let headers = response.headers_mut();
        headers.insert(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store, no-cache, must-revalidate, max-age=0"),
        );
        headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
        headers.insert(header::EXPIRES, HeaderValue::from_static("0"));
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use serde_json::json;

    fn with_if_none_match(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::IF_NONE_MATCH, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn etag_is_quoted_and_stable() {
        let a = etag_for(br#"{"a":1}"#);
        assert!(a.starts_with('"') && a.ends_with('"'));
        assert_eq!(a, etag_for(br#"{"a":1}"#));
        assert_ne!(a, etag_for(br#"{"a":2}"#));
    }

    #[test]
    fn if_none_match_forms() {
        let etag = etag_for(b"x");
        assert!(if_none_match(&with_if_none_match(&etag), &etag));
        assert!(if_none_match(&with_if_none_match(&format!("W/{etag}")), &etag));
        assert!(if_none_match(&with_if_none_match(&format!("\"other\", {etag}")), &etag));
        assert!(if_none_match(&with_if_none_match("*"), &etag));
        assert!(!if_none_match(&with_if_none_match("\"other\""), &etag));
        assert!(!if_none_match(&HeaderMap::new(), &etag));
    }

    #[tokio::test]
    async fn fresh_response_carries_validators() {
        let body = json!({"success": true, "data": []});
        let response = cached_json(&HeaderMap::new(), CachePolicy::public(60), &body).unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CACHE_CONTROL], "public, max-age=60");
        assert!(response.headers().get(header::VARY).is_none());
        let etag = response.headers()[header::ETAG].to_str().unwrap().to_string();

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(etag, etag_for(&bytes));
    }

    #[tokio::test]
    async fn matching_validator_yields_empty_304() {
        let body = json!({"success": true});
        let first = cached_json(&HeaderMap::new(), CachePolicy::private(30), &body).unwrap();
        let etag = first.headers()[header::ETAG].to_str().unwrap().to_string();

        let second = cached_json(&with_if_none_match(&etag), CachePolicy::private(30), &body).unwrap();
        assert_eq!(second.status(), StatusCode::NOT_MODIFIED);
        assert_eq!(second.headers()[header::ETAG], etag.as_str());
        assert_eq!(second.headers()[header::CACHE_CONTROL], "private, max-age=30");
        assert_eq!(second.headers()[header::VARY], "Authorization");
        let bytes = to_bytes(second.into_body(), usize::MAX).await.unwrap();
        assert!(bytes.is_empty());
    }

    #[test]
    fn no_store_headers() {
        let response = NoStore(StatusCode::OK).into_response();
        let headers = response.headers();
        assert_eq!(
            headers[header::CACHE_CONTROL],
            "no-store, no-cache, must-revalidate, max-age=0"
        );
        assert_eq!(headers[header::PRAGMA], "no-cache");
        assert_eq!(headers[header::EXPIRES], "0");
    }
}
