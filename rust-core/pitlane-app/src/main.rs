//! # Pitlane
//!
//! Application server: loads the environment and configuration, registers
//! controllers, middlewares and routes, then serves HTTP until Ctrl-C.

mod controllers;
mod routes;

use anyhow::Context as _;
use clap::Parser;
use pitlane_core::{telemetry, Config, Context, Env, Kernel, Server};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "pitlane")]
#[command(about = "Pitlane HTTP dispatch server", long_about = None)]
struct Cli {
    /// Directory holding the TOML configuration files
    #[arg(short, long, env = "PITLANE_CONFIG_DIR", default_value = "config")]
    config_dir: PathBuf,

    /// Environment file loaded before anything else
    #[arg(short, long, default_value = ".env")]
    env_file: PathBuf,

    /// Address to listen on
    #[arg(short, long, env = "PITLANE_BIND", default_value = "127.0.0.1:8000")]
    bind: SocketAddr,

    /// Maximum request body size in bytes
    #[arg(long, default_value_t = 1024 * 1024)]
    max_body_size: usize,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let env_loaded = if cli.env_file.is_file() {
        Some(Env::load_file(&cli.env_file).with_context(|| {
            format!("failed to load environment file {}", cli.env_file.display())
        })?)
    } else {
        None
    };

    telemetry::init_tracing(cli.json_logs);
    match env_loaded {
        Some(count) => info!(file = %cli.env_file.display(), count, "Environment loaded"),
        None => warn!(file = %cli.env_file.display(), "No environment file found"),
    }

    let mut ctx = Context::new(Config::new(&cli.config_dir));
    routes::register_middlewares(&mut ctx);
    routes::register_controllers(&mut ctx);
    routes::register_routes(&mut ctx).context("failed to register routes")?;
    info!(routes = ctx.router().len(), "Routes registered");

    let kernel = Arc::new(Kernel::new(ctx).before(&["logging", "timing"]));
    let mut server = Server::new(Arc::clone(&kernel)).bind(cli.bind);
    server.set_max_body_size(cli.max_body_size);

    server.serve().await.context("server failed")?;
    kernel.shutdown().await;
    info!("Shutdown complete");
    Ok(())
}
