//! # Pitlane Core
//!
//! Core library for the Pitlane dispatch layer.
//! Matches incoming requests to registered handlers and runs them inside a
//! composable chain of middlewares.
//!
//! ## Architecture
//!
//! A [`Kernel`] owns the application [`Context`]. For each request it asks the
//! [`Router`] for the first matching route, binds it to the request, then runs
//! a [`Pipeline`] of middlewares (global `before`, the route's own, global
//! `after`) whose innermost step is the [`Dispatcher`].
//!
//! ## Modules
//!
//! - `server` - HTTP server built on Hyper
//! - `kernel` - Per-request orchestration
//! - `context` - Shared configuration, registries and database handle
//! - `router` - Ordered route table with regex placeholder matching
//! - `route` - Route definition and handler variants
//! - `pipeline` - Onion-style middleware composition
//! - `middleware` - Middleware trait, registry and built-in middlewares
//! - `dispatcher` - Controller registry and handler invocation
//! - `request` - Request snapshot with mutable overlay
//! - `response` - Response value
//! - `config` - TOML configuration lookups
//! - `env` - Environment variables and `.env` files
//! - `database` - SQLx database access (PostgreSQL, MySQL, SQLite)
//! - `json` - JSON parsing with simd-json
//! - `telemetry` - Tracing subscriber setup
//! - `error` - Error types and handling

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod context;
pub mod database;
pub mod dispatcher;
pub mod env;
pub mod error;
pub mod json;
pub mod kernel;
pub mod middleware;
pub mod pipeline;
pub mod request;
pub mod response;
pub mod route;
pub mod router;
pub mod server;
pub mod telemetry;

pub use config::Config;
pub use context::Context;
pub use database::{Backend, Credentials, DbHandler, DbValue, Record};
pub use dispatcher::{Controller, ControllerRegistry, Dispatcher};
pub use env::Env;
pub use error::{Error, Result};
pub use json::{parse_json, to_json};
pub use kernel::Kernel;
pub use middleware::{
    CorsMiddleware, LoggingMiddleware, Middleware, MiddlewareRegistry, RateLimitMiddleware,
    TimingMiddleware,
};
pub use pipeline::{Next, Pipeline};
pub use request::Request;
pub use response::Response;
pub use route::{Handler, Route};
pub use router::{Method, Router};
pub use server::{Server, ServerConfig};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
