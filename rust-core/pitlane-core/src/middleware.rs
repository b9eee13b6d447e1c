//! # Middleware System
//!
//! Onion-style request/response interception for logging, timing, CORS, etc.
//!
//! A middleware receives the request and a [`Next`] continuation. Calling
//! `next.run(request)` hands control inward and returns the inner response,
//! which the middleware may then alter. Returning without calling `next`
//! short-circuits everything further in, handler included.
//!
//! Routes refer to middlewares by string identifier; the
//! [`MiddlewareRegistry`] turns identifiers into instances.

use crate::error::{Error, Result};
use crate::pipeline::Next;
use crate::request::{Request, REMOTE_ADDR};
use crate::response::Response;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, info};

/// Middleware trait for request/response interception
pub trait Middleware: Send + Sync {
    /// Process the request, usually by calling `next.run(request)` once
    ///
    /// # Errors
    ///
    /// Errors propagate outward through every enclosing middleware.
    fn handle(&self, request: &mut Request, next: Next<'_>) -> Result<Response>;

    /// Middleware name for logging
    fn name(&self) -> &'static str {
        "Unknown"
    }
}

/// Builds a middleware instance
pub type MiddlewareFactory = Arc<dyn Fn() -> Arc<dyn Middleware> + Send + Sync>;

/// Identifier to middleware mapping
#[derive(Default, Clone)]
pub struct MiddlewareRegistry {
    factories: HashMap<String, MiddlewareFactory>,
}

impl fmt::Debug for MiddlewareRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.factories.keys().collect();
        names.sort();
        f.debug_struct("MiddlewareRegistry").field("names", &names).finish()
    }
}

impl MiddlewareRegistry {
    /// Create a new empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a middleware type, built with `Default` on each resolution
    pub fn register<M: Middleware + Default + 'static>(&mut self, name: impl Into<String>) {
        self.register_with(name, M::default);
    }

    /// Register a factory closure
    ///
    /// Middlewares that keep state across requests (rate limiting) return
    /// clones sharing that state.
    pub fn register_with<F, M>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> M + Send + Sync + 'static,
        M: Middleware + 'static,
    {
        let factory: MiddlewareFactory = Arc::new(move || Arc::new(factory()) as Arc<dyn Middleware>);
        self.factories.insert(name.into(), factory);
    }

    /// Instantiate the middleware registered under `name`
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidMiddleware` for an unknown identifier.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Middleware>> {
        self.factories
            .get(name)
            .map(|factory| factory())
            .ok_or_else(|| Error::InvalidMiddleware {
                name: name.to_string(),
            })
    }

    /// Whether `name` is registered
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Number of registered identifiers
    #[must_use]
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    /// Check if registry is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

/// Logging middleware - logs requests in structured form
#[derive(Default)]
pub struct LoggingMiddleware;

impl LoggingMiddleware {
    /// Create a new logging middleware
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Middleware for LoggingMiddleware {
    fn handle(&self, request: &mut Request, next: Next<'_>) -> Result<Response> {
        let method = request.method();
        let uri = request.uri();
        let request_id = request.input_str("request_id").unwrap_or("-").to_string();
        info!(method = %method, uri = %uri, request_id = %request_id, "Request received");

        let response = next.run(request)?;

        info!(
            method = %method,
            uri = %uri,
            status = response.status,
            request_id = %request_id,
            "Response sent"
        );
        Ok(response)
    }

    fn name(&self) -> &'static str {
        "LoggingMiddleware"
    }
}

/// Timing middleware - measures time spent further in
#[derive(Default)]
pub struct TimingMiddleware;

impl TimingMiddleware {
    /// Create a new timing middleware
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Middleware for TimingMiddleware {
    fn handle(&self, request: &mut Request, next: Next<'_>) -> Result<Response> {
        let start = Instant::now();
        let mut response = next.run(request)?;
        let duration = start.elapsed();

        debug!(
            uri = %request.uri(),
            duration_ms = %duration.as_millis(),
            "Request timing"
        );
        response.set_header("X-Response-Time", format!("{}ms", duration.as_millis()));
        Ok(response)
    }

    fn name(&self) -> &'static str {
        "TimingMiddleware"
    }
}

/// CORS middleware - adds Cross-Origin Resource Sharing headers
#[derive(Clone)]
pub struct CorsMiddleware {
    allow_origin: String,
    allow_methods: String,
    allow_headers: String,
}

impl Default for CorsMiddleware {
    fn default() -> Self {
        Self {
            allow_origin: "*".to_string(),
            allow_methods: "GET, POST, PUT, DELETE, PATCH, OPTIONS".to_string(),
            allow_headers: "Content-Type, Authorization".to_string(),
        }
    }
}

impl CorsMiddleware {
    /// Create a new CORS middleware with default settings
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set allowed origin
    #[must_use]
    pub fn allow_origin(mut self, origin: impl Into<String>) -> Self {
        self.allow_origin = origin.into();
        self
    }

    /// Set allowed methods
    #[must_use]
    pub fn allow_methods(mut self, methods: impl Into<String>) -> Self {
        self.allow_methods = methods.into();
        self
    }

    /// Set allowed headers
    #[must_use]
    pub fn allow_headers(mut self, headers: impl Into<String>) -> Self {
        self.allow_headers = headers.into();
        self
    }

    /// Get the Access-Control-Allow-Origin header value
    #[must_use]
    pub fn origin(&self) -> &str {
        &self.allow_origin
    }
}

impl Middleware for CorsMiddleware {
    fn handle(&self, request: &mut Request, next: Next<'_>) -> Result<Response> {
        let mut response = next.run(request)?;
        response.set_header("Access-Control-Allow-Origin", &self.allow_origin);
        response.set_header("Access-Control-Allow-Methods", &self.allow_methods);
        response.set_header("Access-Control-Allow-Headers", &self.allow_headers);
        Ok(response)
    }

    fn name(&self) -> &'static str {
        "CorsMiddleware"
    }
}

/// Client count above which idle, full buckets are dropped
const SWEEP_THRESHOLD: usize = 1024;

/// Token bucket rate limiting middleware
///
/// Clones share buckets, so a registry factory returning clones enforces
/// one limit across requests.
#[derive(Clone)]
pub struct RateLimitMiddleware {
    /// Maximum burst capacity
    capacity: u64,
    /// Tokens refilled per second
    refill_per_sec: u64,
    /// Per-client buckets
    state: Arc<Mutex<HashMap<String, Bucket>>>,
}

/// Internal token bucket state
struct Bucket {
    tokens: u64,
    last_refill: Instant,
}

impl RateLimitMiddleware {
    /// Create a new rate limiter
    #[must_use]
    pub fn new(capacity: u64, refill_per_sec: u64) -> Self {
        Self {
            capacity,
            refill_per_sec,
            state: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    fn refilled(&self, bucket: &Bucket, now: Instant) -> u64 {
        let elapsed = now.duration_since(bucket.last_refill);
        (elapsed.as_secs_f64() * self.refill_per_sec as f64) as u64
    }

    fn allow(&self, key: &str) -> bool {
        let mut map = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let now = Instant::now();

        // A full bucket is indistinguishable from a fresh one.
        if map.len() >= SWEEP_THRESHOLD && !map.contains_key(key) {
            map.retain(|_, bucket| {
                bucket.tokens.saturating_add(self.refilled(bucket, now)) < self.capacity
            });
        }

        let bucket = map.entry(key.to_string()).or_insert(Bucket {
            tokens: self.capacity,
            last_refill: now,
        });
        let refill = self.refilled(bucket, now);
        if refill > 0 {
            bucket.tokens = bucket.tokens.saturating_add(refill).min(self.capacity);
            bucket.last_refill = now;
        }
        if bucket.tokens == 0 {
            return false;
        }
        bucket.tokens -= 1;
        true
    }

    #[cfg(test)]
    fn tracked_clients(&self) -> usize {
        self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner).len()
    }
}

impl Middleware for RateLimitMiddleware {
    fn handle(&self, request: &mut Request, next: Next<'_>) -> Result<Response> {
        let key = request.server(REMOTE_ADDR).unwrap_or("unknown").to_string();
        if self.allow(&key) {
            return next.run(request);
        }

        debug!(client = %key, "Rate limit exceeded");
        Ok(Response::json(r#"{"error":"Rate limit exceeded"}"#).with_status(429))
    }

    fn name(&self) -> &'static str {
        "RateLimitMiddleware"
    }
}
