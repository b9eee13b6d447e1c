//! # HTTP Request
//!
//! Snapshot of the inbound parameters plus a mutable overlay of custom values
//! set while the request travels through the pipeline.
//!
//! The core never reads raw wire bytes itself: the hosting environment hands
//! over two groups, the input fields keyed by verb and the server metadata
//! (CGI names such as `REQUEST_URI`, `REQUEST_METHOD`, `HTTP_HOST`, `HTTPS`).

use crate::error::{Error, Result};
use crate::route::Route;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::body::{Body, Bytes};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::net::SocketAddr;

/// Input groups in lookup order
pub const INPUT_GROUPS: [&str; 5] = ["GET", "POST", "PUT", "PATCH", "DELETE"];

/// Server metadata key holding the request path
pub const REQUEST_URI: &str = "REQUEST_URI";
/// Server metadata key holding the raw HTTP method
pub const REQUEST_METHOD: &str = "REQUEST_METHOD";
/// Server metadata key holding the `Host` header
pub const HTTP_HOST: &str = "HTTP_HOST";
/// Server metadata key holding the configured server name
pub const SERVER_NAME: &str = "SERVER_NAME";
/// Server metadata key set when the request arrived over TLS
pub const HTTPS: &str = "HTTPS";
/// Server metadata key holding the peer address
pub const REMOTE_ADDR: &str = "REMOTE_ADDR";
/// Server metadata key holding the raw query string
pub const QUERY_STRING: &str = "QUERY_STRING";

/// Field used by HTML forms to tunnel PUT/PATCH/DELETE through POST
pub const METHOD_OVERRIDE: &str = "_method";

/// An inbound request
///
/// Input and server data are fixed at construction; only the overlay (and
/// the bound route, set once by the kernel) change during dispatch.
#[derive(Debug, Clone, Default)]
pub struct Request {
    /// Input fields grouped by verb
    input: HashMap<String, Map<String, Value>>,
    /// Protocol and environment facts
    server: HashMap<String, Value>,
    /// Values set during dispatch, looked up first
    overlay: HashMap<String, Value>,
    /// Route bound by the router for this request
    route: Option<Route>,
}

impl Request {
    /// Create a request from the two environment groups
    #[must_use]
    pub fn new(input: HashMap<String, Map<String, Value>>, server: HashMap<String, Value>) -> Self {
        Self {
            input,
            server,
            overlay: HashMap::new(),
            route: None,
        }
    }

    /// Forge a request for a method and URI (tests, internal sub-requests)
    #[must_use]
    pub fn forge(method: &str, uri: &str) -> Self {
        Self::default()
            .with_server(REQUEST_METHOD, method)
            .with_server(REQUEST_URI, uri)
    }

    /// Add an input field to a verb group
    #[must_use]
    pub fn with_input(mut self, group: &str, key: &str, value: impl Into<Value>) -> Self {
        self.input
            .entry(group.to_ascii_uppercase())
            .or_default()
            .insert(key.to_string(), value.into());
        self
    }

    /// Add a server metadata entry
    #[must_use]
    pub fn with_server(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.server.insert(key.to_string(), value.into());
        self
    }

    /// Build a request from already-split HTTP parts
    ///
    /// The query string feeds the `GET` group; the body feeds the group of
    /// the request verb and is decoded as JSON or as a urlencoded form
    /// depending on `content_type`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidBody` when the body cannot be decoded.
    pub fn from_parts(
        method: &str,
        path: &str,
        query: Option<&str>,
        host: Option<&str>,
        content_type: Option<&str>,
        body: &[u8],
        remote_addr: Option<SocketAddr>,
    ) -> Result<Self> {
        let method = method.to_ascii_uppercase();
        let mut request = Self::forge(&method, path);

        if let Some(q) = query {
            request.input.insert("GET".to_string(), parse_form(q)?);
            request = request.with_server(QUERY_STRING, q);
        }

        if let Some(h) = host {
            let name = h.split(':').next().unwrap_or(h);
            request = request
                .with_server(HTTP_HOST, h)
                .with_server(SERVER_NAME, name);
        }

        if let Some(addr) = remote_addr {
            request = request.with_server(REMOTE_ADDR, addr.ip().to_string());
        }

        if !body.is_empty() && method != "GET" && INPUT_GROUPS.contains(&method.as_str()) {
            let fields = decode_body(content_type, body)?;
            request.input.insert(method, fields);
        }

        Ok(request)
    }

    /// Create from hyper request with body size limit
    ///
    /// The body is read through [`Limited`], so a stream without a
    /// `Content-Length` is cut off as soon as it passes `max_body_size`.
    ///
    /// # Errors
    ///
    /// Returns `Error::PayloadTooLarge` when the declared or streamed body
    /// exceeds `max_body_size`, and `Error::InvalidBody` when the body
    /// cannot be read or decoded.
    pub async fn from_hyper_with_limit<B>(
        req: hyper::Request<B>,
        max_body_size: usize,
        remote_addr: Option<SocketAddr>,
    ) -> Result<Self>
    where
        B: Body<Data = Bytes>,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let (parts, body) = req.into_parts();

        if let Some(content_len) = parts
            .headers
            .get(hyper::header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<usize>().ok())
        {
            if content_len > max_body_size {
                return Err(Error::PayloadTooLarge {
                    limit: max_body_size,
                    actual: content_len,
                });
            }
        }

        let bytes = match Limited::new(body, max_body_size).collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) if e.is::<LengthLimitError>() => {
                return Err(Error::PayloadTooLarge {
                    limit: max_body_size,
                    actual: max_body_size.saturating_add(1),
                });
            }
            Err(e) => {
                return Err(Error::InvalidBody {
                    reason: e.to_string(),
                });
            }
        };

        let header = |name: hyper::header::HeaderName| {
            parts.headers.get(name).and_then(|v| v.to_str().ok())
        };

        Self::from_parts(
            parts.method.as_str(),
            parts.uri.path(),
            parts.uri.query(),
            header(hyper::header::HOST),
            header(hyper::header::CONTENT_TYPE),
            &bytes,
            remote_addr,
        )
    }

    /// Look up an input value
    ///
    /// The overlay wins, then the verb groups in `INPUT_GROUPS` order, then
    /// the server metadata.
    #[must_use]
    pub fn input(&self, key: &str) -> Option<&Value> {
        if let Some(v) = self.overlay.get(key) {
            return Some(v);
        }
        INPUT_GROUPS
            .iter()
            .filter_map(|group| self.input.get(*group))
            .find_map(|fields| fields.get(key))
            .or_else(|| self.server.get(key))
    }

    /// Look up an input value as a string slice
    #[must_use]
    pub fn input_str(&self, key: &str) -> Option<&str> {
        self.input(key).and_then(Value::as_str)
    }

    /// All fields of one verb group
    #[must_use]
    pub fn input_group(&self, group: &str) -> Option<&Map<String, Value>> {
        self.input.get(&group.to_ascii_uppercase())
    }

    /// Set a custom value unless one is already present
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.overlay.entry(key.into()).or_insert_with(|| value.into());
        self
    }

    /// Set a custom value, replacing any previous one
    pub fn force_set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.overlay.insert(key.into(), value.into());
        self
    }

    /// Read a server metadata entry (overlay first)
    #[must_use]
    pub fn server(&self, key: &str) -> Option<&str> {
        self.overlay
            .get(key)
            .or_else(|| self.server.get(key))
            .and_then(Value::as_str)
    }

    /// Request path normalized to end with exactly one `/`
    ///
    /// The query string, if the host left one on the URI, is dropped.
    #[must_use]
    pub fn uri(&self) -> String {
        let raw = self.server(REQUEST_URI).unwrap_or("");
        let path = raw.split('?').next().unwrap_or(raw);
        format!("{}/", path.trim_end_matches('/'))
    }

    /// The method as sent on the wire
    #[must_use]
    pub fn raw_method(&self) -> &str {
        self.server(REQUEST_METHOD).unwrap_or("")
    }

    /// The method used for routing
    ///
    /// A raw `POST` carrying a non-empty `_method` field is routed as that
    /// method instead.
    #[must_use]
    pub fn method(&self) -> String {
        let raw = self.raw_method();
        if raw.trim() == "POST" {
            if let Some(pseudo) = self.input_str(METHOD_OVERRIDE).filter(|m| !m.trim().is_empty()) {
                return pseudo.trim().to_string();
            }
        }
        raw.trim().to_string()
    }

    /// The website domain
    #[must_use]
    pub fn domain(&self) -> Option<&str> {
        self.server(SERVER_NAME).or_else(|| self.server(HTTP_HOST))
    }

    /// Whether the request arrived over TLS
    #[must_use]
    pub fn is_secure(&self) -> bool {
        self.server(HTTPS).is_some_and(|v| v != "off")
    }

    /// Scheme and domain, e.g. `https://example.com`
    #[must_use]
    pub fn home_url(&self) -> String {
        let protocol = if self.is_secure() { "https" } else { "http" };
        format!("{protocol}://{}", self.domain().unwrap_or(""))
    }

    /// Home URL followed by the normalized request URI
    #[must_use]
    pub fn current_url(&self) -> String {
        format!("{}{}", self.home_url(), self.uri())
    }

    /// The route bound to this request, if one matched
    #[must_use]
    pub fn route(&self) -> Option<&Route> {
        self.route.as_ref()
    }

    /// Attach the matched route
    pub fn bind_route(&mut self, route: Route) {
        self.route = Some(route);
    }

    /// A placeholder value of the bound route
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.route.as_ref().and_then(|r| r.variable(name))
    }
}

/// Decode a urlencoded form into string fields (last duplicate wins)
///
/// # Errors
///
/// Returns `Error::InvalidBody` if the input is not valid urlencoded data.
pub fn parse_form(raw: &str) -> Result<Map<String, Value>> {
    let pairs: Vec<(String, String)> =
        serde_urlencoded::from_str(raw).map_err(|e| Error::InvalidBody {
            reason: e.to_string(),
        })?;
    Ok(pairs
        .into_iter()
        .map(|(k, v)| (k, Value::String(v)))
        .collect())
}

fn decode_body(content_type: Option<&str>, body: &[u8]) -> Result<Map<String, Value>> {
    let is_json = content_type.is_some_and(|ct| ct.contains("application/json"));
    if is_json {
        let mut bytes = body.to_vec();
        return match crate::json::parse_json_bytes::<Value>(&mut bytes)? {
            Value::Object(fields) => Ok(fields),
            _ => Ok(Map::new()),
        };
    }

    let text = std::str::from_utf8(body).map_err(|e| Error::InvalidBody {
        reason: e.to_string(),
    })?;
    parse_form(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_uri_trailing_slash_normalized() {
        assert_eq!(Request::forge("GET", "/racers").uri(), "/racers/");
        assert_eq!(Request::forge("GET", "/racers///").uri(), "/racers/");
        assert_eq!(Request::forge("GET", "").uri(), "/");
        assert_eq!(Request::forge("GET", "/").uri(), "/");
    }

    #[test]
    fn test_uri_drops_query_string() {
        let req = Request::forge("GET", "/racers/42?sort=asc");
        assert_eq!(req.uri(), "/racers/42/");
    }

    #[test]
    fn test_input_group_order() {
        let req = Request::forge("POST", "/")
            .with_input("POST", "name", "from-post")
            .with_input("GET", "name", "from-get");
        assert_eq!(req.input_str("name"), Some("from-get"));
    }

    #[test]
    fn test_overlay_wins_over_input_and_server() {
        let mut req = Request::forge("GET", "/home")
            .with_input("GET", "team", "ferrari");
        req.set("team", "mclaren");
        req.set(REQUEST_URI, "/elsewhere");

        assert_eq!(req.input_str("team"), Some("mclaren"));
        assert_eq!(req.server(REQUEST_URI), Some("/elsewhere"));
    }

    #[test]
    fn test_set_does_not_overwrite_unless_forced() {
        let mut req = Request::forge("GET", "/");
        req.set("user", 1);
        req.set("user", 2);
        assert_eq!(req.input("user"), Some(&json!(1)));

        req.force_set("user", 3);
        assert_eq!(req.input("user"), Some(&json!(3)));
    }

    #[test]
    fn test_method_override_on_post() {
        let req = Request::forge("POST", "/racers/1")
            .with_input("POST", METHOD_OVERRIDE, "DELETE");
        assert_eq!(req.raw_method(), "POST");
        assert_eq!(req.method(), "DELETE");
    }

    #[test]
    fn test_method_override_ignored_on_get() {
        let req = Request::forge("GET", "/racers/1")
            .with_input("GET", METHOD_OVERRIDE, "DELETE");
        assert_eq!(req.method(), "GET");
    }

    #[test]
    fn test_empty_method_override_ignored() {
        let req = Request::forge("POST", "/").with_input("POST", METHOD_OVERRIDE, "  ");
        assert_eq!(req.method(), "POST");
    }

    #[test]
    fn test_home_and_current_url() {
        let req = Request::forge("GET", "/racers")
            .with_server(HTTP_HOST, "example.com")
            .with_server(HTTPS, "on");
        assert_eq!(req.home_url(), "https://example.com");
        assert_eq!(req.current_url(), "https://example.com/racers/");

        let plain = Request::forge("GET", "/")
            .with_server(SERVER_NAME, "pitlane.local")
            .with_server(HTTP_HOST, "ignored")
            .with_server(HTTPS, "off");
        assert_eq!(plain.home_url(), "http://pitlane.local");
    }

    #[test]
    fn test_parse_form_url_encoded() {
        let result = parse_form("name=John+Doe&city=New%20York").unwrap();
        assert_eq!(result.get("name"), Some(&json!("John Doe")));
        assert_eq!(result.get("city"), Some(&json!("New York")));
    }

    #[test]
    fn test_from_parts_query_and_form_body() {
        let req = Request::from_parts(
            "post",
            "/racers",
            Some("page=2"),
            Some("localhost:8000"),
            Some("application/x-www-form-urlencoded"),
            b"name=Lewis&_method=PUT",
            None,
        )
        .unwrap();

        assert_eq!(req.raw_method(), "POST");
        assert_eq!(req.method(), "PUT");
        assert_eq!(req.input_str("page"), Some("2"));
        assert_eq!(req.input_group("post").and_then(|g| g.get("name")), Some(&json!("Lewis")));
        assert_eq!(req.domain(), Some("localhost"));
        assert_eq!(req.server(HTTP_HOST), Some("localhost:8000"));
    }

    #[test]
    fn test_from_parts_json_body() {
        let req = Request::from_parts(
            "PATCH",
            "/racers/7",
            None,
            None,
            Some("application/json"),
            br#"{"points": 25, "name": "Max"}"#,
            None,
        )
        .unwrap();

        assert_eq!(req.input("points"), Some(&json!(25)));
        assert_eq!(req.input_str("name"), Some("Max"));
    }

    #[test]
    fn test_from_parts_invalid_json_body() {
        let result = Request::from_parts(
            "POST",
            "/",
            None,
            None,
            Some("application/json"),
            b"{not json",
            None,
        );
        assert!(matches!(result, Err(Error::InvalidBody { .. })));
    }

    struct FailingBody;

    impl Body for FailingBody {
        type Data = Bytes;
        type Error = std::io::Error;

        fn poll_frame(
            self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<Option<std::result::Result<hyper::body::Frame<Bytes>, Self::Error>>> {
            std::task::Poll::Ready(Some(Err(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "connection reset mid-body",
            ))))
        }
    }

    #[tokio::test]
    async fn test_streamed_body_over_limit_is_rejected() {
        // No Content-Length header, so only the streaming limit applies.
        let req = hyper::Request::post("/racers")
            .body(http_body_util::Full::new(Bytes::from(vec![b'a'; 64])))
            .unwrap();

        let result = Request::from_hyper_with_limit(req, 16, None).await;
        assert!(matches!(
            result,
            Err(Error::PayloadTooLarge { limit: 16, actual: 17 })
        ));
    }

    #[tokio::test]
    async fn test_body_within_limit_is_decoded() {
        let req = hyper::Request::post("/racers")
            .header("content-type", "application/x-www-form-urlencoded")
            .body(http_body_util::Full::new(Bytes::from_static(b"name=Lando")))
            .unwrap();

        let request = Request::from_hyper_with_limit(req, 1024, None).await.unwrap();
        assert_eq!(request.input_str("name"), Some("Lando"));
    }

    #[tokio::test]
    async fn test_body_read_failure_is_invalid_body() {
        let req = hyper::Request::post("/racers").body(FailingBody).unwrap();

        let result = Request::from_hyper_with_limit(req, 1024, None).await;
        assert!(matches!(result, Err(Error::InvalidBody { .. })));
    }
}
