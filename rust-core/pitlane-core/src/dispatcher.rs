//! # Dispatcher
//!
//! Invokes a route handler: a closure directly, or a controller built fresh
//! from the [`ControllerRegistry`] for every request.

use crate::context::Context;
use crate::error::{Error, Result};
use crate::request::Request;
use crate::response::Response;
use crate::route::Handler;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// A request handler grouping several actions
///
/// Both methods default to `None`, meaning "not handled here"; the
/// dispatcher reports that as an ambiguous action.
pub trait Controller {
    /// Run the named action
    fn call(&self, _action: &str, _ctx: &Context, _request: &mut Request) -> Option<Result<Response>> {
        None
    }

    /// Run a single-action controller
    fn invoke(&self, _ctx: &Context, _request: &mut Request) -> Option<Result<Response>> {
        None
    }
}

/// Builds a controller instance
pub type ControllerFactory = Arc<dyn Fn() -> Box<dyn Controller> + Send + Sync>;

/// Controller name to factory mapping
#[derive(Default, Clone)]
pub struct ControllerRegistry {
    factories: HashMap<String, ControllerFactory>,
}

impl fmt::Debug for ControllerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.factories.keys().collect();
        names.sort();
        f.debug_struct("ControllerRegistry").field("names", &names).finish()
    }
}

impl ControllerRegistry {
    /// Create a new empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a controller type constructed with `Default`
    pub fn register<C: Controller + Default + 'static>(&mut self, name: impl Into<String>) {
        self.register_with(name, C::default);
    }

    /// Register a factory closure
    pub fn register_with<F, C>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> C + Send + Sync + 'static,
        C: Controller + 'static,
    {
        let factory: ControllerFactory = Arc::new(move || Box::new(factory()) as Box<dyn Controller>);
        self.factories.insert(name.into(), factory);
    }

    /// Fresh instance of the controller registered under `name`
    #[must_use]
    pub fn instantiate(&self, name: &str) -> Option<Box<dyn Controller>> {
        self.factories.get(name).map(|factory| factory())
    }

    /// Whether `name` is registered
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }
}

/// Invokes handlers against a context
pub struct Dispatcher<'c> {
    context: &'c Context,
}

impl<'c> Dispatcher<'c> {
    /// Create a dispatcher
    #[must_use]
    pub fn new(context: &'c Context) -> Self {
        Self { context }
    }

    /// Run `handler` for `request`
    ///
    /// # Errors
    ///
    /// Returns `Error::AmbiguousAction` when the controller is unknown, lacks
    /// the action, or is not invokable. Handler errors pass through.
    pub fn invoke(&self, handler: &Handler, request: &mut Request) -> Result<Response> {
        let ambiguous = || Error::AmbiguousAction {
            handler: handler.to_string(),
        };

        debug!(handler = %handler, "Dispatching");
        match handler {
            Handler::Call(f) => f(self.context, request),
            Handler::Action { controller, action } => self
                .context
                .controllers()
                .instantiate(controller)
                .ok_or_else(ambiguous)?
                .call(action, self.context, request)
                .ok_or_else(ambiguous)?,
            Handler::Invoke { controller } => self
                .context
                .controllers()
                .instantiate(controller)
                .ok_or_else(ambiguous)?
                .invoke(self.context, request)
                .ok_or_else(ambiguous)?,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[derive(Default)]
    struct RacerController;

    impl Controller for RacerController {
        fn call(&self, action: &str, _ctx: &Context, request: &mut Request) -> Option<Result<Response>> {
            match action {
                "show" => Some(Ok(Response::text(format!(
                    "racer {}",
                    request.input_str("id").unwrap_or("?")
                )))),
                _ => None,
            }
        }
    }

    #[derive(Default)]
    struct HomeController;

    impl Controller for HomeController {
        fn invoke(&self, _ctx: &Context, _request: &mut Request) -> Option<Result<Response>> {
            Some(Ok("home".into()))
        }
    }

    fn context() -> Context {
        let mut ctx = Context::new(Config::new("config"));
        ctx.controllers_mut().register::<RacerController>("RacerController");
        ctx.controllers_mut().register::<HomeController>("HomeController");
        ctx
    }

    #[test]
    fn test_closure_handler() {
        let ctx = context();
        let handler = Handler::call(|_, req| Ok(Response::text(req.uri())));
        let resp = Dispatcher::new(&ctx)
            .invoke(&handler, &mut Request::forge("GET", "/laps"))
            .unwrap();
        assert_eq!(resp.body, "/laps/");
    }

    #[test]
    fn test_controller_action() {
        let ctx = context();
        let mut request = Request::forge("GET", "/").with_input("GET", "id", "44");
        let resp = Dispatcher::new(&ctx)
            .invoke(&Handler::action("RacerController", "show"), &mut request)
            .unwrap();
        assert_eq!(resp.body, "racer 44");
    }

    #[test]
    fn test_single_action_controller() {
        let ctx = context();
        let resp = Dispatcher::new(&ctx)
            .invoke(&Handler::invoke("HomeController"), &mut Request::forge("GET", "/"))
            .unwrap();
        assert_eq!(resp.body, "home");
    }

    #[test]
    fn test_ambiguous_actions() {
        let ctx = context();
        let dispatcher = Dispatcher::new(&ctx);

        for handler in [
            Handler::action("RacerController", "missing"),
            Handler::action("UnknownController", "show"),
            Handler::invoke("RacerController"),
        ] {
            let result = dispatcher.invoke(&handler, &mut Request::forge("GET", "/"));
            assert!(matches!(result, Err(Error::AmbiguousAction { .. })));
        }
    }
}
