//! # Router
//!
//! Ordered route table with regex placeholder matching.
//!
//! ## Features
//!
//! - Path placeholders (`/racers/{id}`) capturing ASCII alphanumerics
//! - First registered match wins
//! - Literal fast path for static routes
//! - Routes declared in configuration (`load_declarations`)
//! - Reverse routing by name

use crate::error::{Error, Result};
use crate::request::Request;
use crate::route::{Handler, Route};
use serde_json::Value;
use std::str::FromStr;
use tracing::{debug, warn};

/// HTTP methods supported by the router
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// HTTP GET
    Get,
    /// HTTP POST
    Post,
    /// HTTP PUT
    Put,
    /// HTTP PATCH
    Patch,
    /// HTTP DELETE
    Delete,
}

impl Method {
    /// Upper-case wire name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }

    /// Case-insensitive comparison with a method taken off a request
    #[must_use]
    pub fn matches(self, method: &str) -> bool {
        self.as_str().eq_ignore_ascii_case(method.trim())
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "PATCH" => Ok(Self::Patch),
            "DELETE" => Ok(Self::Delete),
            _ => Err(Error::InvalidMethod {
                method: s.to_string(),
            }),
        }
    }
}

/// Ordered route table
///
/// Routes are tried in registration order and the first one whose method
/// and pattern both match is returned as a bound copy.
#[derive(Debug, Clone, Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    /// Create a new empty router
    #[must_use]
    pub fn new() -> Self {
        Self { routes: Vec::new() }
    }

    /// Register a route
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRoutePattern` if the path cannot be compiled.
    pub fn add(
        &mut self,
        method: Method,
        name: &str,
        path: &str,
        handler: Handler,
        middlewares: &[&str],
    ) -> Result<()> {
        let middlewares = middlewares.iter().map(|m| (*m).to_string()).collect();
        self.push(Route::new(method, name, path, handler, middlewares)?);
        Ok(())
    }

    /// Register a route whose handler and middlewares come as loose values
    ///
    /// `middlewares` may be `null` or a list of string identifiers.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidMethod`, `Error::InvalidRouteHandler` or
    /// `Error::InvalidRouteMiddleware` when a piece has the wrong shape.
    pub fn register_value(
        &mut self,
        method: &str,
        name: &str,
        path: &str,
        handler: &Value,
        middlewares: &Value,
    ) -> Result<()> {
        let method = method.parse()?;
        let handler = Handler::from_value(handler)?;
        let middlewares = middleware_ids(middlewares)?;
        self.push(Route::new(method, name, path, handler, middlewares)?);
        Ok(())
    }

    /// Register every route of a declaration list
    ///
    /// Each entry is a table with `method`, `name`, `path`, `handler` and an
    /// optional `middlewares` list. Returns the number of routes added.
    ///
    /// # Errors
    ///
    /// Fails on the first malformed entry; earlier entries stay registered.
    pub fn load_declarations(&mut self, declarations: &Value) -> Result<usize> {
        let Some(entries) = declarations.as_array() else {
            return Err(Error::InvalidRouteHandler {
                handler: declarations.to_string(),
            });
        };

        for entry in entries {
            let field = |key: &str| entry.get(key).and_then(Value::as_str);
            let method = field("method").ok_or_else(|| Error::InvalidMethod {
                method: entry.get("method").map_or_else(String::new, Value::to_string),
            })?;
            let path = field("path").ok_or_else(|| Error::InvalidRoutePattern {
                pattern: entry.to_string(),
                reason: "missing path".to_string(),
            })?;

            self.register_value(
                method,
                field("name").unwrap_or_default(),
                path,
                entry.get("handler").unwrap_or(&Value::Null),
                entry.get("middlewares").unwrap_or(&Value::Null),
            )?;
        }

        debug!(count = entries.len(), "Loaded declared routes");
        Ok(entries.len())
    }

    fn push(&mut self, route: Route) {
        if !route.name().is_empty() && self.route(route.name()).is_some() {
            warn!(name = %route.name(), "Duplicate route name, lookups return the first one");
        }
        debug!(method = %route.method(), path = %route.path(), pattern = %route.pattern(), "Registered route");
        self.routes.push(route);
    }

    /// Convenience method to add a GET route
    ///
    /// # Errors
    ///
    /// See [`Router::add`].
    pub fn get(&mut self, name: &str, path: &str, handler: Handler, middlewares: &[&str]) -> Result<()> {
        self.add(Method::Get, name, path, handler, middlewares)
    }

    /// Convenience method to add a POST route
    ///
    /// # Errors
    ///
    /// See [`Router::add`].
    pub fn post(&mut self, name: &str, path: &str, handler: Handler, middlewares: &[&str]) -> Result<()> {
        self.add(Method::Post, name, path, handler, middlewares)
    }

    /// Convenience method to add a PUT route
    ///
    /// # Errors
    ///
    /// See [`Router::add`].
    pub fn put(&mut self, name: &str, path: &str, handler: Handler, middlewares: &[&str]) -> Result<()> {
        self.add(Method::Put, name, path, handler, middlewares)
    }

    /// Convenience method to add a PATCH route
    ///
    /// # Errors
    ///
    /// See [`Router::add`].
    pub fn patch(&mut self, name: &str, path: &str, handler: Handler, middlewares: &[&str]) -> Result<()> {
        self.add(Method::Patch, name, path, handler, middlewares)
    }

    /// Convenience method to add a DELETE route
    ///
    /// # Errors
    ///
    /// See [`Router::add`].
    pub fn delete(&mut self, name: &str, path: &str, handler: Handler, middlewares: &[&str]) -> Result<()> {
        self.add(Method::Delete, name, path, handler, middlewares)
    }

    /// Find the route for a request
    ///
    /// Uses the routing method (`_method` override applied) and the
    /// normalized URI.
    #[must_use]
    pub fn resolve(&self, request: &Request) -> Option<Route> {
        self.resolve_uri(&request.method(), &request.uri())
    }

    /// Find the route for a method and a normalized URI (`/`-terminated)
    #[must_use]
    pub fn resolve_uri(&self, method: &str, uri: &str) -> Option<Route> {
        let depth = uri.split('/').count();

        for route in &self.routes {
            if !route.method().matches(method) {
                continue;
            }

            if route.is_literal_match(uri) {
                debug!(route = %route.name(), "Matched static route");
                return Some(route.clone());
            }

            if route.depth() != depth {
                continue;
            }

            if let Some(variables) = route.capture(uri) {
                debug!(route = %route.name(), ?variables, "Matched route");
                return Some(route.bind(variables));
            }
        }

        None
    }

    /// First route registered under `name`
    #[must_use]
    pub fn route(&self, name: &str) -> Option<&Route> {
        self.routes.iter().find(|r| r.name() == name)
    }

    /// Build the URL of a named route
    ///
    /// # Errors
    ///
    /// Returns `Error::RouteNotFound` for an unknown name and
    /// `Error::MissingRouteVariable` when a placeholder has no value.
    pub fn url<I, K, V>(&self, name: &str, values: I) -> Result<String>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: ToString,
    {
        self.route(name)
            .ok_or_else(|| Error::RouteNotFound {
                name: name.to_string(),
            })?
            .url(values)
    }

    /// All routes in registration order
    #[must_use]
    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// Number of registered routes
    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Whether no route is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// Validate a loose middleware list into identifiers
fn middleware_ids(value: &Value) -> Result<Vec<String>> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| Error::InvalidRouteMiddleware {
                        found: item.to_string(),
                    })
            })
            .collect(),
        other => Err(Error::InvalidRouteMiddleware {
            found: other.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn home() -> Handler {
        Handler::invoke("HomeController")
    }

    #[test]
    fn test_basic_routing() {
        let mut router = Router::new();
        router.get("home", "/", home(), &[]).unwrap();
        router.get("racers.index", "/racers", home(), &[]).unwrap();
        router.post("racers.store", "/racers", home(), &[]).unwrap();

        assert_eq!(router.resolve_uri("GET", "/").unwrap().name(), "home");
        assert_eq!(router.resolve_uri("GET", "/racers/").unwrap().name(), "racers.index");
        assert_eq!(router.resolve_uri("POST", "/racers/").unwrap().name(), "racers.store");
    }

    #[test]
    fn test_static_route_literal_fast_path() {
        let mut router = Router::new();
        router.get("about", "about/", home(), &[]).unwrap();

        let route = router.resolve(&Request::forge("GET", "/about")).unwrap();
        assert_eq!(route.name(), "about");
        assert!(route.variables().is_empty());
    }

    #[test]
    fn test_placeholder_binding() {
        let mut router = Router::new();
        router
            .get("racers.show", "/racers/{id}/", Handler::action("RacerController", "show"), &[])
            .unwrap();

        let route = router.resolve(&Request::forge("GET", "/racers/42")).unwrap();
        assert_eq!(route.variable("id"), Some("42"));
    }

    #[test]
    fn test_first_match_wins() {
        let mut router = Router::new();
        router.get("first", "/racers/{id}", home(), &[]).unwrap();
        router.get("second", "/racers/{slug}", home(), &[]).unwrap();

        let route = router.resolve_uri("GET", "/racers/hamilton/").unwrap();
        assert_eq!(route.name(), "first");
        assert_eq!(route.variable("id"), Some("hamilton"));
    }

    #[test]
    fn test_method_is_case_insensitive() {
        let mut router = Router::new();
        router.put("racers.update", "/racers/{id}", home(), &[]).unwrap();

        assert!(router.resolve_uri("put", "/racers/1/").is_some());
        assert!(router.resolve_uri("Put", "/racers/1/").is_some());
        assert!(router.resolve_uri("GET", "/racers/1/").is_none());
    }

    #[test]
    fn test_method_override_routes_as_pseudo_method() {
        let mut router = Router::new();
        router.delete("racers.destroy", "/racers/{id}", home(), &[]).unwrap();

        let request = Request::forge("POST", "/racers/9")
            .with_input("POST", crate::request::METHOD_OVERRIDE, "DELETE");
        assert_eq!(router.resolve(&request).unwrap().name(), "racers.destroy");
    }

    #[test]
    fn test_segment_count_must_match() {
        let mut router = Router::new();
        router.get("racers.show", "/racers/{id}", home(), &[]).unwrap();

        assert!(router.resolve_uri("GET", "/racers/").is_none());
        assert!(router.resolve_uri("GET", "/racers/1/laps/").is_none());
    }

    #[test]
    fn test_route_not_found() {
        let router = Router::new();
        assert!(router.resolve(&Request::forge("GET", "/nonexistent")).is_none());
    }

    #[test]
    fn test_register_value_rejects_integer_handler() {
        let mut router = Router::new();
        let err = router
            .register_value("GET", "broken", "/broken", &json!(42), &Value::Null)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidRouteHandler { .. }));
        assert!(router.is_empty());
    }

    #[test]
    fn test_register_value_rejects_non_string_middleware() {
        let mut router = Router::new();
        let err = router
            .register_value("GET", "x", "/x", &json!("A::b"), &json!(["auth", 7]))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidRouteMiddleware { ref found } if found == "7"));
    }

    #[test]
    fn test_register_value_rejects_unknown_method() {
        let mut router = Router::new();
        let err = router
            .register_value("TRACE", "x", "/x", &json!("A::b"), &Value::Null)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidMethod { .. }));
    }

    #[test]
    fn test_load_declarations() {
        let mut router = Router::new();
        let declared = json!([
            { "method": "get", "name": "teams.index", "path": "/teams", "handler": "TeamController::index" },
            { "method": "GET", "name": "teams.show", "path": "/teams/{team}", "handler": ["TeamController", "show"], "middlewares": ["cors"] },
        ]);

        assert_eq!(router.load_declarations(&declared).unwrap(), 2);
        let route = router.resolve_uri("GET", "/teams/ferrari/").unwrap();
        assert_eq!(route.name(), "teams.show");
        assert_eq!(route.middlewares(), &["cors".to_string()]);
    }

    #[test]
    fn test_url_by_name() {
        let mut router = Router::new();
        router.get("racers.show", "/racers/{id}/", home(), &[]).unwrap();

        assert_eq!(router.url("racers.show", [("id", 44)]).unwrap(), "/racers/44/");
        assert!(matches!(
            router.url("missing", [("id", 1)]),
            Err(Error::RouteNotFound { .. })
        ));
    }

    #[test]
    fn test_duplicate_name_keeps_first_registration() {
        let mut router = Router::new();
        router.get("racers.show", "/racers/{id}/", home(), &[]).unwrap();
        router.get("racers.show", "/drivers/{id}/", home(), &[]).unwrap();

        assert_eq!(router.len(), 2);
        assert_eq!(router.route("racers.show").unwrap().path(), "/racers/{id}/");
        assert_eq!(router.url("racers.show", [("id", 7)]).unwrap(), "/racers/7/");
    }

    #[test]
    fn test_method_from_str() {
        assert_eq!("patch".parse::<Method>().unwrap(), Method::Patch);
        assert!("HEAD".parse::<Method>().is_err());
    }
}
