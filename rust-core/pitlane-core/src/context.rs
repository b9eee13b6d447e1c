//! # Application Context
//!
//! Everything a request needs that outlives it: configuration, the route
//! table, the controller and middleware registries, and the lazily opened
//! database connection.
//!
//! Built once at startup, then shared read-only behind an `Arc`.

use crate::config::Config;
use crate::database::{Backend, Credentials, DbHandler};
use crate::dispatcher::ControllerRegistry;
use crate::error::{Error, Result};
use crate::middleware::MiddlewareRegistry;
use crate::router::Router;
use std::cell::Cell;
use std::fmt;
use std::future::Future;
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::sync::OnceCell;
use tracing::info;

/// Application-wide state
pub struct Context {
    config: Config,
    router: Router,
    controllers: ControllerRegistry,
    middlewares: MiddlewareRegistry,
    db: OnceCell<DbHandler>,
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("config", &self.config.dir())
            .field("routes", &self.router.len())
            .field("controllers", &self.controllers)
            .field("middlewares", &self.middlewares)
            .field("db", &self.db.get())
            .finish()
    }
}

impl Context {
    /// Create a context with empty registries
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            config,
            router: Router::new(),
            controllers: ControllerRegistry::new(),
            middlewares: MiddlewareRegistry::new(),
            db: OnceCell::new(),
        }
    }

    /// Configuration
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Route table
    #[must_use]
    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Route table, for registration
    pub fn router_mut(&mut self) -> &mut Router {
        &mut self.router
    }

    /// Controller registry
    #[must_use]
    pub fn controllers(&self) -> &ControllerRegistry {
        &self.controllers
    }

    /// Controller registry, for registration
    pub fn controllers_mut(&mut self) -> &mut ControllerRegistry {
        &mut self.controllers
    }

    /// Middleware registry
    #[must_use]
    pub fn middlewares(&self) -> &MiddlewareRegistry {
        &self.middlewares
    }

    /// Middleware registry, for registration
    pub fn middlewares_mut(&mut self) -> &mut MiddlewareRegistry {
        &mut self.middlewares
    }

    /// The shared database handler, connected on first use
    ///
    /// The backend comes from `db.handler`; credentials from the rest of the
    /// `db` file, completed by `DB_*` environment variables.
    ///
    /// # Errors
    ///
    /// Configuration, credential and connection errors. A failed attempt
    /// is retried on the next call.
    pub async fn db(&self) -> Result<&DbHandler> {
        self.db
            .get_or_try_init(|| async {
                let backend: Backend = self.config.get_as::<String>("db.handler")?.parse()?;
                let explicit: Credentials = self.config.get_as("db")?;
                DbHandler::connect(backend, &Credentials::resolve(explicit)).await
            })
            .await
    }

    /// Use an already opened handler instead of the configured one
    ///
    /// Returns `false` if a handler was already in place.
    pub fn set_db(&self, handler: DbHandler) -> bool {
        self.db.set(handler).is_ok()
    }

    /// Run a future to completion from synchronous code
    ///
    /// On a multi-threaded runtime this works from any thread, worker
    /// threads included; a worker hands its queue to another thread while
    /// it blocks. On a current-thread runtime blocking is only allowed
    /// inside [`allow_blocking`], which the server wraps around dispatch.
    ///
    /// # Errors
    ///
    /// Returns `Error::Runtime` when no Tokio runtime is reachable, or when
    /// blocking would stall a current-thread runtime.
    pub fn block_on<F: Future>(&self, future: F) -> Result<F::Output> {
        let handle = Handle::try_current().map_err(|e| Error::Runtime {
            message: e.to_string(),
        })?;

        match handle.runtime_flavor() {
            RuntimeFlavor::MultiThread => {
                Ok(tokio::task::block_in_place(|| handle.block_on(future)))
            }
            _ if BLOCKING_ALLOWED.get() => Ok(handle.block_on(future)),
            _ => Err(Error::Runtime {
                message: "cannot block a current-thread runtime outside allow_blocking".to_string(),
            }),
        }
    }

    /// Close the database pool if one was opened
    pub async fn close(&self) {
        if let Some(db) = self.db.get() {
            info!(backend = %db.backend(), "Closing database connection");
            db.close().await;
        }
    }
}

thread_local! {
    static BLOCKING_ALLOWED: Cell<bool> = const { Cell::new(false) };
}

/// Run `f` with [`Context::block_on`] permitted on a current-thread runtime
///
/// Only call this off the runtime thread, e.g. inside `spawn_blocking`.
pub fn allow_blocking<R>(f: impl FnOnce() -> R) -> R {
    struct Reset(bool);

    impl Drop for Reset {
        fn drop(&mut self) {
            BLOCKING_ALLOWED.set(self.0);
        }
    }

    let _reset = Reset(BLOCKING_ALLOWED.replace(true));
    f()
}
