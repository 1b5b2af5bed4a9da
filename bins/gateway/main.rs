//! # Market Data Gateway
//!
//! TCP command gateway in front of a callback-driven market data provider.
//! The shipped binary runs against the in-process simulated provider, loaded
//! from an instrument listing file.
//!
//! ## Command-line Options
//! - `--tcp-addr` / `-t`: TCP listen address (default `127.0.0.1:9999`).
//! - `--instruments` / `-i`: Instrument listing, one `code|name|market` per line.
//! - `--log-level` / `-l`: Log level (`error`, `warn`, `info`, `debug`, `trace`).
//! - `--request-timeout-ms`: Maximum wait for each response page.
//! - `--connect-timeout-ms`: Maximum wait for the provider login.
//! - `--max-pages`: Upper bound on pages fetched per request.
//! - `--latency-ms`: Callback delay of the simulated provider.

use market_gateway::defs::{
    CONNECT_TIMEOUT_MS, MAX_PAGES, REQUEST_TIMEOUT_MS, SIMULATED_LATENCY_MS,
};
use market_gateway::errors::CliError;
use market_gateway::gateway::{Gateway, GatewayConfig};
use market_gateway::simulated::SimulatedProvider;
use market_gateway::tcp_server::TcpServer;
use std::sync::Arc;
use std::time::Duration;
use structopt::StructOpt;

/// Command-line options for the gateway
#[derive(Debug, StructOpt)]
#[structopt(
    name = "market_gateway",
    about = "TCP command gateway for a callback-driven market data provider"
)]
struct Opt {
    /// TCP listen address, e.g., 127.0.0.1:9999
    #[structopt(short, long, default_value = "127.0.0.1:9999")]
    tcp_addr: String,

    /// Path to the instrument listing (code|name|market per line)
    #[structopt(short, long)]
    instruments: String,

    /// Log level: error, warn, info, debug, trace
    #[structopt(short, long, default_value = "info")]
    log_level: String,

    /// Maximum wait for each response page, in milliseconds
    #[structopt(long)]
    request_timeout_ms: Option<u64>,

    /// Maximum wait for the provider login, in milliseconds
    #[structopt(long)]
    connect_timeout_ms: Option<u64>,

    /// Upper bound on pages fetched by one request
    #[structopt(long)]
    max_pages: Option<usize>,

    /// Callback delay of the simulated provider, in milliseconds
    #[structopt(long)]
    latency_ms: Option<u64>,
}

impl Opt {
    fn gateway_config(&self) -> Result<GatewayConfig, CliError> {
        let max_pages = self.max_pages.unwrap_or(MAX_PAGES);
        if max_pages == 0 {
            return Err(CliError::GeneralError("--max-pages must be at least 1".into()));
        }
        Ok(GatewayConfig {
            request_timeout: Duration::from_millis(
                self.request_timeout_ms.unwrap_or(REQUEST_TIMEOUT_MS),
            ),
            connect_timeout: Duration::from_millis(
                self.connect_timeout_ms.unwrap_or(CONNECT_TIMEOUT_MS),
            ),
            max_pages,
        })
    }
}

/// Initializes the logger using env_logger with the given level
fn init_logger(level: &str) -> Result<(), CliError> {
    let mut builder = env_logger::Builder::new();

    let log_level = match level.to_lowercase().as_str() {
        "error" => log::LevelFilter::Error,
        "warn" => log::LevelFilter::Warn,
        "info" => log::LevelFilter::Info,
        "debug" => log::LevelFilter::Debug,
        "trace" => log::LevelFilter::Trace,
        _ => log::LevelFilter::Info,
    };

    builder.filter_level(log_level);
    builder.format_timestamp_micros();
    builder.format_module_path(false);
    builder.format_target(false);
    builder
        .try_init()
        .map_err(|e| CliError::GeneralError(e.to_string()))
}

fn main() -> Result<(), CliError> {
    // Parse CLI arguments
    let opt = Opt::from_args();

    // Initialize logger
    init_logger(&opt.log_level)?;

    log::info!("Starting Market Data Gateway");
    log::debug!("Command line options: {:?}", opt);
    let config = opt.gateway_config()?;

    // Provider with its own callback thread
    let latency = Duration::from_millis(opt.latency_ms.unwrap_or(SIMULATED_LATENCY_MS));
    let provider = Arc::new(SimulatedProvider::from_config(&opt.instruments, latency)?);

    // Login and directory; failures here are fatal
    let gateway = Arc::new(Gateway::start(provider, &config)?);
    log::info!(
        "Gateway ready with {} instruments. Starting TCP server on {}",
        gateway.directory().len(),
        opt.tcp_addr
    );

    // Start TCP server
    let tcp_server = TcpServer::new(&opt.tcp_addr, gateway)?;

    log::info!("TCP server initialized. Waiting for client connections...");

    // Run server (blocking call)
    tcp_server.start()?;

    log::info!("Server shutdown complete");
    Ok(())
}
