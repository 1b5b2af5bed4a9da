//! # Market Data Gateway
//!
//! This crate exposes a callback-driven market data provider as a simple,
//! synchronous TCP command service. The provider accepts one logical session,
//! answers requests asynchronously on its own thread and paginates large
//! responses; clients send one pipe-delimited command per connection and get
//! one JSON document back.
//!
//! ## Architecture Overview
//!
//! - [`provider`](crate::provider) — The provider capability trait and its event types.
//! - [`session`](crate::session) — Login handshake and the exclusive request lease.
//! - [`dispatcher`](crate::dispatcher) — Request kinds, handler registry and event routing.
//! - [`collectors`](crate::collectors) — Blocking bridges, one per request kind, with pagination.
//! - [`directory`](crate::directory) — Instrument name and code directory.
//! - [`period`](crate::period) — Lookback period labels.
//! - [`command`](crate::command) — Client command parsing.
//! - [`gateway`](crate::gateway) — Startup wiring and command execution.
//! - [`tcp_server`](crate::tcp_server) — One-command-per-connection TCP front end.
//! - [`simulated`](crate::simulated) — Synthetic provider used by the gateway binary.
//! - [`defs`](crate::defs) — Shared constants and default limits.
//! - [`errors`](crate::errors) — Error types used across modules.
//!
//! ## Request Flow
//!
//! 1. The TCP handler reads one command and passes it to the gateway.
//! 2. The gateway resolves instrument names and takes the session lease.
//! 3. The collector sends the request and waits on a condition variable.
//! 4. The provider calls back on its own thread; the dispatcher routes the page
//!    by request name to the collector's handler, which checks the echoed
//!    screen against the call in flight and wakes the waiter.
//! 5. Continuation pages are requested while the caller needs older data.
//! 6. Rows are parsed, ordered and serialized back to the client.
//!
//! ## TCP Protocol
//!
//! Each command ends with a newline (`\n`) or with the client closing its write
//! side. Fields are separated by `|`:
//!
//! - `nameOrCode|period` — daily closes, period one of `1개월`, `3개월`,
//!   `6개월`, `1년`, `3년`.
//! - `SHORT|nameOrCode|YYYYMMDD|YYYYMMDD` — short-sale statistics.
//! - `THEME|themeCode|lookbackDays` — theme constituents.
//! - `THEMEGROUP|days|searchMode|themeName|code|rankMode` — theme ranking.
//! - `INST|nameOrCode|YYYYMMDD|YYYYMMDD` — investor flow breakdown.
//! - `CODEMAP` — the `{name: code}` directory.
//! - `PING` — gateway status.
//!
//! Failures are answered with `{"error": "..."}`. The connection is closed
//! after every response.
//!
//! ## Example: Running the Gateway
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use market_gateway::gateway::{Gateway, GatewayConfig};
//! use market_gateway::simulated::SimulatedProvider;
//! use market_gateway::tcp_server::TcpServer;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Load the instrument listing and start the provider's callback thread
//!     let provider = Arc::new(SimulatedProvider::from_config("instruments.txt", Duration::from_millis(20))?);
//!
//!     // Register collectors, log in and build the directory
//!     let gateway = Arc::new(Gateway::start(provider, &GatewayConfig::default())?);
//!
//!     // Serve commands
//!     let tcp = TcpServer::new("127.0.0.1:9999", gateway)?;
//!     tcp.start()?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![deny(unreachable_pub)]

pub mod collectors;
pub mod command;
pub mod defs;
pub mod directory;
pub mod dispatcher;
pub mod errors;
pub mod gateway;
pub mod period;
pub mod provider;
pub mod session;
pub mod simulated;
pub mod tcp_server;

#[cfg(test)]
pub(crate) mod test_support;
