//! Request values handed to the transport.
//!
//! A [`Request`] carries the target URL, method, header fields and an optional
//! pre-encoded body. Bodies are built from raw bytes, from any `Serialize`
//! value (JSON) or from a string-keyed form mapping
//! (`application/x-www-form-urlencoded`).

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use bytes::Bytes;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::Serialize;

use crate::codec;
use crate::error::NetworkResult;

/// Header fields as supplied by the caller. Keys are kept verbatim.
pub type HeaderFields = HashMap<String, String>;

/// Form fields, encoded in key order.
pub type FormFields = BTreeMap<String, String>;

/// Content type of JSON bodies.
pub const CONTENT_TYPE_JSON: &str = "application/json";

/// Content type of form bodies.
pub const CONTENT_TYPE_FORM: &str = "application/x-www-form-urlencoded";

/// Characters left as-is in form keys and values.
const FORM_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'*')
    .remove(b'-')
    .remove(b'.')
    .remove(b'_');

/// Supported HTTP methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
}

impl HttpMethod {
    /// Returns the method token as sent on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request to be submitted through the download manager.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    url: String,
    method: HttpMethod,
    headers: HeaderFields,
    body: Option<Bytes>,
}

impl Request {
    /// Creates a request with no headers and no body.
    pub fn new(url: impl Into<String>, method: HttpMethod) -> Self {
        Self {
            url: url.into(),
            method,
            headers: HeaderFields::new(),
            body: None,
        }
    }

    /// Creates a GET request.
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(url, HttpMethod::Get)
    }

    /// Creates a POST request without a body.
    pub fn post(url: impl Into<String>) -> Self {
        Self::new(url, HttpMethod::Post)
    }

    /// Adds every header from `headers`, replacing values for existing keys.
    pub fn with_headers(mut self, headers: HeaderFields) -> Self {
        self.headers.extend(headers);
        self
    }

    /// Adds a single header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Sets a raw body.
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Sets the body to the JSON encoding of `value`.
    pub fn with_json<T: Serialize + ?Sized>(mut self, value: &T) -> NetworkResult<Self> {
        self.body = Some(codec::encode(value)?);
        Ok(self)
    }

    /// Sets the body to the form encoding of `fields`.
    pub fn with_form(mut self, fields: &FormFields) -> Self {
        self.body = Some(Bytes::from(encode_form(fields)));
        self
    }

    /// Adds a `Content-Type` header unless one is already present
    /// (compared case-insensitively).
    pub fn with_default_content_type(mut self, content_type: &str) -> Self {
        if self.header("content-type").is_none() {
            self.headers
                .insert("Content-Type".to_string(), content_type.to_string());
        }
        self
    }

    /// The target URL. Also the coalescing key.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn method(&self) -> HttpMethod {
        self.method
    }

    pub fn headers(&self) -> &HeaderFields {
        &self.headers
    }

    /// Looks up a header value, ignoring ASCII case of the name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }
}

/// Encodes form fields as `key=value` pairs joined by `&`.
pub fn encode_form(fields: &FormFields) -> String {
    fields
        .iter()
        .map(|(key, value)| {
            format!(
                "{}={}",
                utf8_percent_encode(key, FORM_COMPONENT),
                utf8_percent_encode(value, FORM_COMPONENT)
            )
        })
        .collect::<Vec<_>>()
        .join("&")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NetworkError;

    fn form(pairs: &[(&str, &str)]) -> FormFields {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_get_has_no_body() {
        let request = Request::get("https://x/a");
        assert_eq!(request.method(), HttpMethod::Get);
        assert_eq!(request.url(), "https://x/a");
        assert!(request.body().is_none());
    }

    #[test]
    fn test_post_without_body_is_distinct_from_post_with_body() {
        let empty = Request::post("https://x/b");
        let with_body = Request::post("https://x/b").with_body("payload");
        assert!(empty.body().is_none());
        assert_ne!(empty, with_body);
    }

    #[test]
    fn test_form_single_pair() {
        let request = Request::post("https://x/b").with_form(&form(&[("k", "v")]));
        assert_eq!(request.body().unwrap().as_ref(), b"k=v");
    }

    #[test]
    fn test_form_pairs_joined_in_key_order() {
        let encoded = encode_form(&form(&[("page", "2"), ("category", "nature")]));
        assert_eq!(encoded, "category=nature&page=2");
    }

    #[test]
    fn test_form_escapes_reserved_characters() {
        let encoded = encode_form(&form(&[("q", "a b&c=d")]));
        assert_eq!(encoded, "q=a%20b%26c%3Dd");
    }

    #[test]
    fn test_empty_form_is_empty_body() {
        let request = Request::post("https://x/b").with_form(&FormFields::new());
        assert_eq!(request.body().unwrap().len(), 0);
    }

    #[test]
    fn test_with_json_encodes_body() {
        let mut body = BTreeMap::new();
        body.insert("name", "value");
        let request = Request::post("https://x/b").with_json(&body).unwrap();
        assert_eq!(request.body().unwrap().as_ref(), br#"{"name":"value"}"#);
    }

    #[test]
    fn test_with_json_failure_is_encode_error() {
        let mut body = HashMap::new();
        body.insert(vec![1u8], 1);
        let result = Request::post("https://x/b").with_json(&body);
        assert!(matches!(result, Err(NetworkError::Encode(_))));
    }

    #[test]
    fn test_headers_keep_supplied_case() {
        let mut headers = HeaderFields::new();
        headers.insert("X-Api-Key".to_string(), "secret".to_string());
        let request = Request::get("https://x/a").with_headers(headers);

        assert!(request.headers().contains_key("X-Api-Key"));
        assert!(!request.headers().contains_key("x-api-key"));
        assert_eq!(request.header("x-api-key"), Some("secret"));
    }

    #[test]
    fn test_default_content_type_respects_caller() {
        let request = Request::post("https://x/b")
            .with_header("content-type", "text/plain")
            .with_default_content_type(CONTENT_TYPE_JSON);
        assert_eq!(request.header("Content-Type"), Some("text/plain"));
        assert_eq!(request.headers().len(), 1);

        let request = Request::post("https://x/b").with_default_content_type(CONTENT_TYPE_FORM);
        assert_eq!(request.header("content-type"), Some(CONTENT_TYPE_FORM));
    }
}
