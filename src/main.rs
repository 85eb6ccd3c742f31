//! dispatch-server binary.
//!
//! ```text
//! dispatch-server [--config FILE] [--bind ADDR]
//!     → load + validate config (defaults when no file)
//!     → logging, optional Prometheus exporter
//!     → bind TCP input, register demo handlers
//!     → start; SIGINT/SIGTERM → Lifecycle::set_quitting(true) → join
//! ```

use std::path::PathBuf;

use clap::Parser;

use dispatch_server::config::{load_config, ServerConfig};
use dispatch_server::handler::{EchoHandler, RedirectHandler, VersionHandler, DEFAULT_COMMAND};
use dispatch_server::lifecycle::{spawn_signal_listener, Lifecycle};
use dispatch_server::net::TcpInput;
use dispatch_server::observability::{logging, metrics};
use dispatch_server::{Error, Server};

#[derive(Debug, Parser)]
#[command(name = "dispatch-server", version, about = "Request dispatch server")]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override `listener.bind_address`.
    #[arg(long)]
    bind: Option<String>,
}

fn main() -> Result<(), Error> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ServerConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
    }

    logging::init(&config.observability.log_level);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), config = ?cli.config, "dispatch-server starting");

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let input = TcpInput::bind(&config.listener)?;
    let lifecycle = Lifecycle::global().clone();
    let server = Server::builder(config, input)
        .lifecycle(lifecycle.clone())
        .build()?;

    server.register_handler("/version", VersionHandler);
    server.register_handler("/echo", EchoHandler);
    server.register_handler("/go", RedirectHandler::new("/version").allow_override(true));
    server.register_handler(DEFAULT_COMMAND, EchoHandler);

    server.start()?;
    spawn_signal_listener(server.handle(), lifecycle);
    server.join();

    tracing::info!("Shutdown complete");
    Ok(())
}
