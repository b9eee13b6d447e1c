//! # Route Definition
//!
//! One registered endpoint: method, name, path pattern, handler and the
//! middleware identifiers that wrap it.
//!
//! Paths use `{placeholder}` segments. At registration each placeholder
//! becomes a capturing group accepting one or more ASCII alphanumerics;
//! literal segments are matched verbatim.

use crate::context::Context;
use crate::error::{Error, Result};
use crate::request::Request;
use crate::response::Response;
use crate::router::Method;
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Regex fragment a placeholder segment compiles to
pub const PLACEHOLDER_PATTERN: &str = "([0-9A-Za-z]+)";

/// Closure handler signature
pub type HandlerFn = Arc<dyn Fn(&Context, &mut Request) -> Result<Response> + Send + Sync>;

/// What runs when a route matches
///
/// The shape is settled at registration; dispatch never inspects raw input.
#[derive(Clone)]
pub enum Handler {
    /// A closure called directly
    Call(HandlerFn),
    /// A controller instantiated per request, then the named action called on it
    Action {
        /// Controller registry name
        controller: String,
        /// Action name
        action: String,
    },
    /// A single-action controller, instantiated and invoked
    Invoke {
        /// Controller registry name
        controller: String,
    },
}

impl Handler {
    /// Wrap a closure
    pub fn call<F>(f: F) -> Self
    where
        F: Fn(&Context, &mut Request) -> Result<Response> + Send + Sync + 'static,
    {
        Self::Call(Arc::new(f))
    }

    /// Controller/action pair
    pub fn action(controller: impl Into<String>, action: impl Into<String>) -> Self {
        Self::Action {
            controller: controller.into(),
            action: action.into(),
        }
    }

    /// Single-action controller
    pub fn invoke(controller: impl Into<String>) -> Self {
        Self::Invoke {
            controller: controller.into(),
        }
    }

    /// Parse a declared handler
    ///
    /// Accepts `"Controller::action"`, `["Controller", "action"]` and
    /// `["Controller"]`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRouteHandler` for any other shape. Empty and
    /// longer arrays name nothing callable, so they fail here rather than at
    /// dispatch.
    pub fn from_value(value: &Value) -> Result<Self> {
        let invalid = || Error::InvalidRouteHandler {
            handler: value.to_string(),
        };

        match value {
            Value::String(s) => s.parse(),
            Value::Array(items) => {
                let parts = items
                    .iter()
                    .map(|item| item.as_str().ok_or_else(invalid))
                    .collect::<Result<Vec<_>>>()?;
                match parts.as_slice() {
                    [controller] => Ok(Self::invoke(*controller)),
                    [controller, action] => Ok(Self::action(*controller, *action)),
                    _ => Err(invalid()),
                }
            }
            _ => Err(invalid()),
        }
    }
}

impl FromStr for Handler {
    type Err = Error;

    /// Parse the `"Controller::action"` form
    fn from_str(s: &str) -> Result<Self> {
        match s.split("::").collect::<Vec<_>>().as_slice() {
            [controller, action] => Ok(Self::action(*controller, *action)),
            _ => Err(Error::InvalidRouteHandler {
                handler: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Call(_) => write!(f, "<closure>"),
            Self::Action { controller, action } => write!(f, "{controller}::{action}"),
            Self::Invoke { controller } => write!(f, "{controller}"),
        }
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handler({self})")
    }
}

/// Whether a path segment is a `{placeholder}`
#[must_use]
pub fn is_placeholder(segment: &str) -> bool {
    segment.len() >= 2 && segment.starts_with('{') && segment.ends_with('}')
}

/// Placeholder name with braces removed, spaces and hyphens turned into `_`
#[must_use]
pub fn sanitize_placeholder(segment: &str) -> String {
    segment
        .replace(['{', '}'], "")
        .replace([' ', '-'], "_")
}

/// A registered route, or a bound copy of one after a successful match
#[derive(Debug, Clone)]
pub struct Route {
    method: Method,
    name: String,
    /// Path as registered, used for reverse routing
    path: String,
    /// Registered path without empty segments, always `/`-terminated
    canonical: String,
    pattern: Regex,
    variable_names: Vec<String>,
    /// Filled only on bound copies
    variables: HashMap<String, String>,
    handler: Handler,
    middlewares: Vec<String>,
}

impl Route {
    /// Compile a route definition
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRoutePattern` if the compiled pattern is
    /// rejected by the regex engine.
    pub fn new(
        method: Method,
        name: impl Into<String>,
        path: impl Into<String>,
        handler: Handler,
        middlewares: Vec<String>,
    ) -> Result<Self> {
        let path = path.into();
        let (pattern, variable_names) = compile_path(&path);
        let pattern = Regex::new(&pattern).map_err(|e| Error::InvalidRoutePattern {
            pattern: path.clone(),
            reason: e.to_string(),
        })?;

        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let canonical = if segments.is_empty() {
            "/".to_string()
        } else {
            format!("/{}/", segments.join("/"))
        };

        Ok(Self {
            method,
            name: name.into(),
            path,
            canonical,
            pattern,
            variable_names,
            variables: HashMap::new(),
            handler,
            middlewares,
        })
    }

    /// HTTP method
    #[must_use]
    pub fn method(&self) -> Method {
        self.method
    }

    /// Route name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Path as registered
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Compiled regex source
    #[must_use]
    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    /// Placeholder names in declaration order
    #[must_use]
    pub fn variable_names(&self) -> &[String] {
        &self.variable_names
    }

    /// Placeholder values, empty unless this is a bound copy
    #[must_use]
    pub fn variables(&self) -> &HashMap<String, String> {
        &self.variables
    }

    /// A single placeholder value
    #[must_use]
    pub fn variable(&self, name: &str) -> Option<&str> {
        self.variables.get(name).map(String::as_str)
    }

    /// The handler
    #[must_use]
    pub fn handler(&self) -> &Handler {
        &self.handler
    }

    /// Middleware identifiers, outermost first
    #[must_use]
    pub fn middlewares(&self) -> &[String] {
        &self.middlewares
    }

    /// Number of `/`-separated pieces of the canonical path
    pub(crate) fn depth(&self) -> usize {
        self.canonical.split('/').count()
    }

    /// Static routes whose canonical path is exactly `uri`
    pub(crate) fn is_literal_match(&self, uri: &str) -> bool {
        self.variable_names.is_empty() && self.canonical == uri
    }

    /// Run the compiled pattern; captured groups are zipped positionally
    /// with the placeholder names
    pub(crate) fn capture(&self, uri: &str) -> Option<HashMap<String, String>> {
        let captures = self.pattern.captures(uri)?;
        let values = captures
            .iter()
            .skip(1)
            .flatten()
            .map(|m| m.as_str().to_string());

        Some(self.variable_names.iter().cloned().zip(values).collect())
    }

    /// Copy of this route carrying placeholder values
    pub(crate) fn bind(&self, variables: HashMap<String, String>) -> Self {
        Self {
            variables,
            ..self.clone()
        }
    }

    /// Rebuild a URL by substituting placeholder segments
    ///
    /// # Errors
    ///
    /// Returns `Error::MissingRouteVariable` if a placeholder has no value.
    pub fn url<I, K, V>(&self, values: I) -> Result<String>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: ToString,
    {
        let values: HashMap<String, String> = values
            .into_iter()
            .map(|(k, v)| (k.into(), v.to_string()))
            .collect();

        let segments = self
            .path
            .split('/')
            .map(|segment| {
                if !is_placeholder(segment) {
                    return Ok(segment.to_string());
                }
                let variable = sanitize_placeholder(segment);
                values
                    .get(&variable)
                    .cloned()
                    .ok_or_else(|| Error::MissingRouteVariable {
                        route: self.name.clone(),
                        variable,
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(segments.join("/"))
    }
}

/// Turn a registered path into an anchored regex and its placeholder names
fn compile_path(path: &str) -> (String, Vec<String>) {
    let mut variables = Vec::new();
    let segments: Vec<String> = path
        .split('/')
        .filter(|segment| !segment.is_empty())
        .map(|segment| {
            if is_placeholder(segment) {
                variables.push(sanitize_placeholder(segment));
                PLACEHOLDER_PATTERN.to_string()
            } else {
                regex::escape(segment)
            }
        })
        .collect();

    let pattern = if segments.is_empty() {
        "^/$".to_string()
    } else {
        format!("^/{}/$", segments.join("/"))
    };

    (pattern, variables)
}
