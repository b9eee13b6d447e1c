//! Route, controller and middleware registration

use crate::controllers::{HomeController, RacerController};
use pitlane_core::{
    Context, CorsMiddleware, Error, Handler, LoggingMiddleware, RateLimitMiddleware, Response,
    Result, TimingMiddleware,
};
use tracing::info;

/// Requests allowed per client in a burst
const THROTTLE_CAPACITY: u64 = 60;
/// Tokens returned per second
const THROTTLE_REFILL: u64 = 10;

/// Register the built-in middlewares under their identifiers
pub fn register_middlewares(ctx: &mut Context) {
    let limiter = RateLimitMiddleware::new(THROTTLE_CAPACITY, THROTTLE_REFILL);

    let middlewares = ctx.middlewares_mut();
    middlewares.register::<LoggingMiddleware>("logging");
    middlewares.register::<TimingMiddleware>("timing");
    middlewares.register::<CorsMiddleware>("cors");
    middlewares.register_with("throttle", move || limiter.clone());
}

/// Register controllers by the names route declarations use
pub fn register_controllers(ctx: &mut Context) {
    let controllers = ctx.controllers_mut();
    controllers.register::<HomeController>("HomeController");
    controllers.register::<RacerController>("RacerController");
}

/// Register routes defined in code, then any declared in `routes.toml`
///
/// # Errors
///
/// Registration errors, and configuration errors other than a missing
/// `routes` file.
pub fn register_routes(ctx: &mut Context) -> Result<()> {
    let router = ctx.router_mut();
    router.get("home", "/", Handler::invoke("HomeController"), &[])?;
    router.get("health", "/health", Handler::call(|_, _| Ok(Response::text("OK"))), &[])?;
    router.get("racers.index", "/racers", Handler::action("RacerController", "index"), &["cors"])?;
    router.get("racers.show", "/racers/{id}", Handler::action("RacerController", "show"), &["cors"])?;
    router.post("racers.store", "/racers", Handler::action("RacerController", "store"), &["throttle"])?;

    match ctx.config().get("routes.routes") {
        Ok(declarations) => {
            let count = ctx.router_mut().load_declarations(&declarations)?;
            info!(count, "Loaded routes from configuration");
        }
        Err(Error::InvalidConfigFile { .. }) => {}
        Err(e) => return Err(e),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pitlane_core::{Config, Kernel, Request};
    use std::fs;

    fn kernel(config_dir: &std::path::Path) -> Kernel {
        let mut ctx = Context::new(Config::new(config_dir));
        register_middlewares(&mut ctx);
        register_controllers(&mut ctx);
        register_routes(&mut ctx).unwrap();
        Kernel::new(ctx).before(&["logging", "timing"])
    }

    #[test]
    fn test_home_route() {
        let dir = tempfile::tempdir().unwrap();
        let response = kernel(dir.path())
            .handle(Request::forge("GET", "/").with_server("HTTP_HOST", "localhost"))
            .unwrap();
        assert_eq!(response.status, 200);
        assert!(response.body.contains("http://localhost/"));
        assert!(response.header("X-Response-Time").is_some());
    }

    #[test]
    fn test_unknown_path_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let response = kernel(dir.path()).handle(Request::forge("GET", "/garage")).unwrap();
        assert_eq!(response.status, 404);
    }

    #[test]
    fn test_declared_routes_are_loaded() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("routes.toml"),
            "[[routes]]\nmethod = \"GET\"\nname = \"about\"\npath = \"/about\"\nhandler = [\"HomeController\"]\n",
        )
        .unwrap();

        let kernel = kernel(dir.path());
        assert!(kernel.context().router().route("about").is_some());
        assert_eq!(kernel.handle(Request::forge("GET", "/about")).unwrap().status, 200);
    }

    #[test]
    fn test_malformed_declared_route_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("routes.toml"),
            "[[routes]]\nmethod = \"GET\"\nname = \"bad\"\npath = \"/bad\"\nhandler = 42\n",
        )
        .unwrap();

        let mut ctx = Context::new(Config::new(dir.path()));
        assert!(matches!(
            register_routes(&mut ctx),
            Err(Error::InvalidRouteHandler { .. })
        ));
    }
}
