//! # Middleware Pipeline
//!
//! Folds an ordered list of middlewares around a core handler.
//!
//! For `[A, B, C]` the call order is `A -> B -> C -> core` and responses
//! travel back `core -> C -> B -> A`. Every identifier is resolved before
//! anything runs, so an unknown identifier fails the request without
//! touching the handler.

use crate::error::Result;
use crate::middleware::{Middleware, MiddlewareRegistry};
use crate::request::Request;
use crate::response::Response;
use std::sync::Arc;
use tracing::debug;

/// A boxed step of the onion
pub type Continuation<'a> = Box<dyn Fn(&mut Request) -> Result<Response> + 'a>;

/// The rest of the pipeline, as seen by one middleware
pub struct Next<'a> {
    inner: &'a dyn Fn(&mut Request) -> Result<Response>,
}

impl<'a> Next<'a> {
    /// Wrap an inner step
    pub fn new(inner: &'a dyn Fn(&mut Request) -> Result<Response>) -> Self {
        Self { inner }
    }

    /// Hand the request to the next layer
    ///
    /// # Errors
    ///
    /// Whatever the inner layers return.
    pub fn run(self, request: &mut Request) -> Result<Response> {
        (self.inner)(request)
    }
}

/// Ordered middleware identifiers bound to a registry
pub struct Pipeline<'r> {
    registry: &'r MiddlewareRegistry,
    middlewares: Vec<String>,
}

impl<'r> Pipeline<'r> {
    /// Create a pipeline; `middlewares` is outermost first
    #[must_use]
    pub fn new(registry: &'r MiddlewareRegistry, middlewares: Vec<String>) -> Self {
        Self {
            registry,
            middlewares,
        }
    }

    /// Identifiers in execution order
    #[must_use]
    pub fn middlewares(&self) -> &[String] {
        &self.middlewares
    }

    /// Send the request through every middleware, then `core`
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidMiddleware` if an identifier is unknown, before
    /// any middleware or the core run. Otherwise returns whatever the layers
    /// return.
    pub fn run<'a, F>(&self, request: &mut Request, core: F) -> Result<Response>
    where
        F: Fn(&mut Request) -> Result<Response> + 'a,
    {
        let layers = self
            .middlewares
            .iter()
            .rev()
            .map(|name| self.registry.resolve(name))
            .collect::<Result<Vec<_>>>()?;

        debug!(middlewares = ?self.middlewares, "Running pipeline");
        let stack = compose(layers, Box::new(core));
        stack(request)
    }
}

/// Wrap `core` in `layers`, which are given innermost first
fn compose<'a>(layers: Vec<Arc<dyn Middleware>>, core: Continuation<'a>) -> Continuation<'a> {
    layers.into_iter().fold(core, |next, layer| {
        let step: Continuation<'a> =
            Box::new(move |request: &mut Request| layer.handle(request, Next::new(next.as_ref())));
        step
    })
}
