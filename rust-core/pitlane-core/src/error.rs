//! # Error Handling
//!
//! Centralized error types for Pitlane core.
//! Uses `thiserror` for ergonomic error definitions.
//!
//! Registration and resolution errors are never caught inside the core; they
//! travel back to the bootstrap code, which turns them into an error response.

use thiserror::Error;

/// Result type alias for Pitlane operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for the Pitlane runtime
#[derive(Error, Debug)]
pub enum Error {
    /// Route handler shape was not recognized at registration
    #[error("Invalid route handler: {handler}")]
    InvalidRouteHandler {
        /// Printable form of the rejected handler
        handler: String,
    },

    /// A route middleware entry was not a string identifier
    #[error("Route middlewares must be expressed as a list of identifiers, found: {found}")]
    InvalidRouteMiddleware {
        /// Printable form of the offending entry
        found: String,
    },

    /// Middleware identifier did not resolve to a middleware
    #[error("{name} is not a valid middleware")]
    InvalidMiddleware {
        /// The identifier that failed to resolve
        name: String,
    },

    /// Controller handler could not be turned into a callable action
    #[error(
        "Invalid required action {handler}: specify a closure, a single-action controller or a controller/action pair"
    )]
    AmbiguousAction {
        /// Printable form of the handler
        handler: String,
    },

    /// Unknown HTTP method name
    #[error("Unsupported HTTP method: {method}")]
    InvalidMethod {
        /// The method as given
        method: String,
    },

    /// Compiled route pattern was rejected by the regex engine
    #[error("Invalid route pattern: {pattern}: {reason}")]
    InvalidRoutePattern {
        /// The invalid pattern
        pattern: String,
        /// Reason for invalidity
        reason: String,
    },

    /// No route registered under the given name
    #[error("No route named '{name}'")]
    RouteNotFound {
        /// The name that was looked up
        name: String,
    },

    /// Reverse routing was asked for a URL without a value for a placeholder
    #[error("No value supplied for variable '{variable}' of route '{route}'")]
    MissingRouteVariable {
        /// Route name
        route: String,
        /// Placeholder name
        variable: String,
    },

    /// Configuration key does not exist
    #[error("Error while retrieving configuration: key '{path}' does not exist")]
    InvalidConfig {
        /// The dotted path that was requested
        path: String,
    },

    /// Configuration file does not exist
    #[error("The config file '{file}' doesn't exist")]
    InvalidConfigFile {
        /// File that was looked up
        file: String,
    },

    /// Configuration file exists but is not valid TOML
    #[error("Failed to parse config file '{file}': {source}")]
    ConfigParse {
        /// File that failed to parse
        file: String,
        /// The underlying TOML error
        #[source]
        source: toml::de::Error,
    },

    /// Unknown database backend selector
    #[error("Unknown database handler: {handler}")]
    InvalidDbHandler {
        /// The selector found in configuration
        handler: String,
    },

    /// Required database credentials are missing
    #[error("The following database credentials are required but missing: {missing}")]
    InvalidDbCredentials {
        /// Comma separated list of missing fields
        missing: String,
    },

    /// Database name is missing from the credentials
    #[error("The database name is required")]
    InvalidDbCredentialMissingDatabase,

    /// Raw environment assignment without `=`
    #[error("Invalid environment signature: {pair}")]
    InvalidEnvironmentVariable {
        /// The malformed pair
        pair: String,
    },

    /// Database error
    #[error("Database error: {message}")]
    Database {
        /// Error message from database
        message: String,
    },

    /// A blocking call needed an async runtime that is not running
    #[error("Runtime error: {message}")]
    Runtime {
        /// What was attempted
        message: String,
    },

    /// Server failed to bind to the specified address
    #[error("Failed to bind server to {address}: {source}")]
    BindError {
        /// The address we tried to bind to
        address: String,
        /// The underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// Request payload too large
    #[error("Payload too large: limit={limit} bytes, received at least {actual} bytes")]
    PayloadTooLarge {
        /// Max allowed size
        limit: usize,
        /// Declared size, or `limit + 1` when a streamed body overran
        actual: usize,
    },

    /// Request body could not be decoded
    #[error("Invalid request body: {reason}")]
    InvalidBody {
        /// Decoder message
        reason: String,
    },

    /// HTTP protocol error
    #[error("HTTP error: {0}")]
    Http(#[from] hyper::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
