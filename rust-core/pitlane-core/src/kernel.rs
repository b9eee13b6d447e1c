//! # Kernel
//!
//! Per-request orchestration: resolve the route, bind it to the request,
//! then run global and route middlewares around the dispatcher.
//!
//! Middleware order is `before`, then the route's own list, then `after`.
//! When nothing matches, the global middlewares still run around the
//! not-found response.

use crate::context::Context;
use crate::dispatcher::Dispatcher;
use crate::error::Result;
use crate::pipeline::Pipeline;
use crate::request::Request;
use crate::response::Response;
use crate::route::Route;
use std::sync::Arc;
use tracing::debug;

/// Request entry point
#[derive(Debug, Clone)]
pub struct Kernel {
    context: Arc<Context>,
    before: Vec<String>,
    after: Vec<String>,
}

impl Kernel {
    /// Create a kernel without global middlewares
    #[must_use]
    pub fn new(context: Context) -> Self {
        Self {
            context: Arc::new(context),
            before: Vec::new(),
            after: Vec::new(),
        }
    }

    /// Middlewares wrapped around every request, outside route middlewares
    #[must_use]
    pub fn before(mut self, middlewares: &[&str]) -> Self {
        self.before = middlewares.iter().map(|m| (*m).to_string()).collect();
        self
    }

    /// Middlewares wrapped around every request, inside route middlewares
    #[must_use]
    pub fn after(mut self, middlewares: &[&str]) -> Self {
        self.after = middlewares.iter().map(|m| (*m).to_string()).collect();
        self
    }

    /// Shared context
    #[must_use]
    pub fn context(&self) -> &Arc<Context> {
        &self.context
    }

    /// Handle one request
    ///
    /// # Errors
    ///
    /// Unknown middleware identifiers, unresolvable controller actions and
    /// handler errors. An unmatched route is not an error; it yields the
    /// not-found response.
    pub fn handle(&self, mut request: Request) -> Result<Response> {
        let route = self.context.router().resolve(&request);
        let middlewares = self.middlewares_for(route.as_ref());

        match &route {
            Some(r) => {
                debug!(route = %r.name(), handler = %r.handler(), "Route resolved");
                request.bind_route(r.clone());
            }
            None => debug!(method = %request.method(), uri = %request.uri(), "No route matched"),
        }

        let dispatcher = Dispatcher::new(&self.context);
        let handler = route.as_ref().map(Route::handler);

        Pipeline::new(self.context.middlewares(), middlewares).run(&mut request, |req| match handler {
            Some(h) => dispatcher.invoke(h, req),
            None => Ok(Response::not_found()),
        })
    }

    fn middlewares_for(&self, route: Option<&Route>) -> Vec<String> {
        let route_middlewares = route.map(Route::middlewares).unwrap_or_default();
        self.before
            .iter()
            .chain(route_middlewares)
            .chain(&self.after)
            .cloned()
            .collect()
    }

    /// Release shared resources
    pub async fn shutdown(&self) {
        self.context.close().await;
    }
}
