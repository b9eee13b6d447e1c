//! # HTTP Server
//!
//! HTTP/1 front end built on Hyper and Tokio.
//! Implements graceful shutdown with signal handling.
//!
//! ## Key Features
//!
//! - Async accept loop, one task per connection
//! - Kernel dispatch on the blocking pool, so handlers may block on the
//!   database through [`Context::block_on`](crate::context::Context::block_on)
//! - Request body size limit
//! - Graceful shutdown on Ctrl-C with a drain timeout

use crate::context::allow_blocking;
use crate::error::{Error, Result};
use crate::kernel::Kernel;
use crate::request::Request;
use crate::response::Response;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// HTTP Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the server to
    pub address: SocketAddr,
    /// Shutdown timeout for graceful shutdown (default: 30 seconds)
    pub shutdown_timeout: Duration,
    /// Max request body size in bytes
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: ([127, 0, 0, 1], 8000).into(),
            shutdown_timeout: Duration::from_secs(30),
            max_body_size: 1024 * 1024,
        }
    }
}

/// HTTP server driving a [`Kernel`]
pub struct Server {
    config: ServerConfig,
    kernel: Arc<Kernel>,
}

impl Server {
    /// Create a new Server instance
    #[must_use]
    pub fn new(kernel: Arc<Kernel>) -> Self {
        Self {
            config: ServerConfig::default(),
            kernel,
        }
    }

    /// Bind the server to an address
    #[must_use]
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.config.address = addr;
        self
    }

    /// Set max request body size
    pub fn set_max_body_size(&mut self, bytes: usize) {
        self.config.max_body_size = bytes;
    }

    /// Current configuration
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Start the server with graceful shutdown
    ///
    /// # Errors
    ///
    /// Returns `Error::BindError` if the address cannot be bound, or an IO
    /// error if accepting fails.
    pub async fn serve(&self) -> Result<()> {
        let addr = self.config.address;

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|source| Error::BindError {
                address: addr.to_string(),
                source,
            })?;

        info!("Server listening on http://{}", addr);

        let active = Arc::new(AtomicUsize::new(0));
        let max_body_size = self.config.max_body_size;

        loop {
            tokio::select! {
                accept_result = listener.accept() => {
                    let (stream, remote_addr) = accept_result?;
                    let io = TokioIo::new(stream);

                    let kernel = Arc::clone(&self.kernel);
                    let active = Arc::clone(&active);

                    tokio::task::spawn(async move {
                        active.fetch_add(1, Ordering::Relaxed);

                        if let Err(err) = http1::Builder::new()
                            .serve_connection(io, service_fn(move |req| {
                                let kernel = Arc::clone(&kernel);
                                async move {
                                    let method = req.method().clone();
                                    let path = req.uri().path().to_string();
                                    let version = format!("{:?}", req.version());

                                    let response = handle_request(req, kernel, remote_addr, max_body_size).await;
                                    info!("    {} - \"{} {} {}\" {}",
                                        remote_addr,
                                        method,
                                        path,
                                        version,
                                        response.status()
                                    );
                                    Ok::<_, hyper::Error>(response)
                                }
                            }))
                            .await
                        {
                            error!("Error serving connection: {:?}", err);
                        }
                        active.fetch_sub(1, Ordering::Relaxed);
                    });
                }
                () = shutdown_signal() => {
                    info!("Shutdown signal received, stopping server...");
                    break;
                }
            }
        }

        let timeout = self.config.shutdown_timeout;
        let drain = async {
            while active.load(Ordering::Relaxed) != 0 {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        };
        if tokio::time::timeout(timeout, drain).await.is_err() {
            info!("Shutdown timeout reached with connections still open");
        }
        Ok(())
    }

    /// Execute a request directly without the network stack
    ///
    /// Applies the same error mapping as a network request.
    pub async fn test_request(&self, request: Request) -> Response {
        dispatch(Arc::clone(&self.kernel), request).await
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to install Ctrl-C handler: {}", e);
        std::future::pending::<()>().await;
    }
}

/// Run the kernel on the blocking pool and turn errors into responses
async fn dispatch(kernel: Arc<Kernel>, mut request: Request) -> Response {
    let request_id = generate_request_id();
    request.force_set("request_id", request_id.as_str());

    let result =
        tokio::task::spawn_blocking(move || allow_blocking(|| kernel.handle(request))).await;

    let mut response = match result {
        Ok(Ok(response)) => response,
        Ok(Err(e)) => {
            error!(request_id = %request_id, "Request failed: {}", e);
            Response::text("Internal Server Error").with_status(500)
        }
        Err(e) => {
            error!(request_id = %request_id, "Request task failed: {}", e);
            Response::text("Internal Server Error").with_status(500)
        }
    };
    response.set_header("x-request-id", request_id);
    response
}

async fn handle_request(
    req: hyper::Request<hyper::body::Incoming>,
    kernel: Arc<Kernel>,
    remote_addr: SocketAddr,
    max_body_size: usize,
) -> hyper::Response<Full<Bytes>> {
    let request = match Request::from_hyper_with_limit(req, max_body_size, Some(remote_addr)).await {
        Ok(r) => r,
        Err(e @ Error::PayloadTooLarge { .. }) => {
            info!("Rejected request: {}", e);
            return Response::text("Payload Too Large").with_status(413).into_hyper();
        }
        Err(e) => {
            error!("Failed to parse request: {}", e);
            return Response::text("Bad Request").with_status(400).into_hyper();
        }
    };

    dispatch(kernel, request).await.into_hyper()
}

static REQUEST_COUNTER: AtomicUsize = AtomicUsize::new(1);

fn generate_request_id() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    let counter = REQUEST_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{:x}-{:x}", now.as_nanos(), counter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::context::Context;
    use crate::route::Handler;

    fn server() -> Server {
        let mut ctx = Context::new(Config::new("config"));
        ctx.router_mut()
            .get("home", "/", Handler::call(|_, _| Ok("home".into())), &[])
            .unwrap();
        ctx.router_mut()
            .get(
                "broken",
                "/broken",
                Handler::call(|_, _| {
                    Err(Error::AmbiguousAction {
                        handler: "broken".to_string(),
                    })
                }),
                &[],
            )
            .unwrap();
        ctx.router_mut()
            .get(
                "blocking",
                "/blocking",
                Handler::call(|ctx, _| ctx.block_on(async { Response::text("waited") })),
                &[],
            )
            .unwrap();
        Server::new(Arc::new(Kernel::new(ctx)))
    }

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.address.port(), 8000);
        assert_eq!(config.max_body_size, 1024 * 1024);
    }

    #[tokio::test]
    async fn test_request_gets_request_id() {
        let resp = server().test_request(Request::forge("GET", "/")).await;
        assert_eq!(resp.status, 200);
        assert_eq!(resp.body, "home");
        assert!(resp.header("x-request-id").is_some());
    }

    #[tokio::test]
    async fn test_handler_error_becomes_500() {
        let resp = server().test_request(Request::forge("GET", "/broken")).await;
        assert_eq!(resp.status, 500);
    }

    #[test]
    fn test_request_ids_are_unique() {
        assert_ne!(generate_request_id(), generate_request_id());
    }

    #[tokio::test]
    async fn test_request_id_ignores_client_input() {
        let request = Request::forge("GET", "/").with_input("GET", "request_id", "chosen");
        let resp = server().test_request(request).await;
        assert_ne!(resp.header("x-request-id"), Some("chosen"));
    }

    #[tokio::test]
    async fn test_handler_may_block_on_current_thread_runtime() {
        let resp = server().test_request(Request::forge("GET", "/blocking")).await;
        assert_eq!(resp.status, 200);
        assert_eq!(resp.body, "waited");
    }

    #[tokio::test]
    async fn test_kernel_blocking_from_async_current_thread_is_an_error() {
        let resp = server().kernel.handle(Request::forge("GET", "/blocking"));
        assert!(matches!(resp, Err(Error::Runtime { .. })));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_kernel_blocking_from_async_multi_thread() {
        let resp = server().kernel.handle(Request::forge("GET", "/blocking")).unwrap();
        assert_eq!(resp.body, "waited");
    }
}
