//! # HTTP Response
//!
//! What handlers and middlewares return; converted to a hyper response at
//! the edge of the server.

use crate::error::Result;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::StatusCode;
use serde::Serialize;
use std::collections::HashMap;

/// Body sent when no route matches
pub const NOT_FOUND_BODY: &str = "404 - Page not found!";

/// HTTP response
#[derive(Debug, Clone)]
pub struct Response {
    /// HTTP status code
    pub status: u16,
    /// Response body
    pub body: String,
    /// Content type
    pub content_type: String,
    /// Response headers
    pub headers: HashMap<String, String>,
}

impl Default for Response {
    fn default() -> Self {
        Self {
            status: 200,
            body: String::new(),
            content_type: "text/html; charset=utf-8".to_string(),
            headers: HashMap::new(),
        }
    }
}

impl Response {
    /// Create a JSON response from an encoded body
    #[must_use]
    pub fn json(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            content_type: "application/json".to_string(),
            ..Self::default()
        }
    }

    /// Encode a value as a JSON response
    ///
    /// # Errors
    ///
    /// Returns `Error::Json` if the value cannot be serialized.
    pub fn json_value<T: Serialize>(value: &T) -> Result<Self> {
        Ok(Self::json(crate::json::to_json(value)?))
    }

    /// Create a text response
    #[must_use]
    pub fn text(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            content_type: "text/plain".to_string(),
            ..Self::default()
        }
    }

    /// Create an HTML response
    #[must_use]
    pub fn html(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            ..Self::default()
        }
    }

    /// The response sent when no route matches
    #[must_use]
    pub fn not_found() -> Self {
        Self::html(NOT_FOUND_BODY).with_status(404)
    }

    /// Set status code
    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    /// Set header
    #[must_use]
    pub fn with_header(mut self, key: &str, value: &str) -> Self {
        self.set_header(key, value);
        self
    }

    /// Set or override a header
    pub fn set_header(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        if key.eq_ignore_ascii_case("content-type") {
            self.content_type = value;
        } else {
            self.headers.retain(|k, _| !k.eq_ignore_ascii_case(key));
            self.headers.insert(key.to_string(), value);
        }
    }

    /// Read a header, ignoring case
    #[must_use]
    pub fn header(&self, key: &str) -> Option<&str> {
        if key.eq_ignore_ascii_case("content-type") {
            return Some(&self.content_type);
        }
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// Convert to hyper Response
    #[must_use]
    pub fn into_hyper(self) -> hyper::Response<Full<Bytes>> {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut response = hyper::Response::new(Full::new(Bytes::from(self.body)));
        *response.status_mut() = status;

        let headers = response.headers_mut();
        if let Ok(value) = self.content_type.parse() {
            headers.insert(hyper::header::CONTENT_TYPE, value);
        }
        for (k, v) in &self.headers {
            if let (Ok(name), Ok(value)) = (
                hyper::header::HeaderName::from_bytes(k.as_bytes()),
                hyper::header::HeaderValue::from_str(v),
            ) {
                headers.insert(name, value);
            }
        }
        response
    }
}

impl From<&str> for Response {
    fn from(body: &str) -> Self {
        Self::html(body)
    }
}

impl From<String> for Response {
    fn from(body: String) -> Self {
        Self::html(body)
    }
}

impl From<serde_json::Value> for Response {
    fn from(value: serde_json::Value) -> Self {
        Self::json(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_response_json() {
        let resp = Response::json(r#"{"status": "ok"}"#);
        assert_eq!(resp.status, 200);
        assert_eq!(resp.content_type, "application/json");
    }

    #[test]
    fn test_response_with_status() {
        let resp = Response::text("Gone").with_status(410);
        assert_eq!(resp.status, 410);
    }

    #[test]
    fn test_not_found() {
        let resp = Response::not_found();
        assert_eq!(resp.status, 404);
        assert_eq!(resp.body, "404 - Page not found!");
    }

    #[test]
    fn test_header_case_insensitive() {
        let mut resp = Response::text("x").with_header("X-Request-Id", "abc");
        assert_eq!(resp.header("x-request-id"), Some("abc"));

        resp.set_header("x-request-id", "def");
        assert_eq!(resp.headers.len(), 1);
        assert_eq!(resp.header("X-REQUEST-ID"), Some("def"));

        resp.set_header("Content-Type", "application/xml");
        assert_eq!(resp.content_type, "application/xml");
    }

    #[test]
    fn test_from_value() {
        let resp: Response = json!({"id": 1}).into();
        assert_eq!(resp.content_type, "application/json");
        assert_eq!(resp.body, r#"{"id":1}"#);
    }

    #[test]
    fn test_into_hyper() {
        let resp = Response::not_found().with_header("X-Trace", "1").into_hyper();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(resp.headers()["x-trace"], "1");
        assert_eq!(resp.headers()["content-type"], "text/html; charset=utf-8");
    }
}
