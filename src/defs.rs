/// Default TCP address the command server listens on.
pub const DEFAULT_TCP_ADDR: &str = "127.0.0.1:9999";

/// Maximum time (in milliseconds) to wait for the provider's login callback.
///
/// If the provider does not report the handshake result within this bound,
/// startup fails.
pub const CONNECT_TIMEOUT_MS: u64 = 30_000;

/// Maximum time (in milliseconds) a collector waits for a single page of a
/// provider response.
///
/// A paginated request may wait up to this long for every page it fetches.
pub const REQUEST_TIMEOUT_MS: u64 = 10_000;

/// Upper bound on the number of pages a collector fetches for one request.
///
/// Reaching the bound stops pagination and returns the rows gathered so far.
pub const MAX_PAGES: usize = 50;

/// Read timeout (in milliseconds) applied to client connections while the
/// command is being received.
pub const CLIENT_READ_TIMEOUT_MS: u64 = 5_000;

/// Largest command payload accepted from a client, in bytes.
pub const MAX_COMMAND_BYTES: usize = 4096;

/// Width of a provider instrument code. Shorter all-digit codes are
/// left-padded with zeros.
pub const INSTRUMENT_CODE_WIDTH: usize = 6;

/// Delay (in milliseconds) the simulated provider waits before delivering a
/// callback, imitating the round trip to the vendor.
pub const SIMULATED_LATENCY_MS: u64 = 20;

/// Number of rows the simulated provider puts on one page.
pub const SIMULATED_PAGE_SIZE: usize = 100;

/// Number of trading days of history the simulated provider can serve.
pub const SIMULATED_HISTORY_DAYS: usize = 800;

/// Daily price volatility used by the simulated provider's random walk.
pub const SIMULATED_VOLATILITY: f64 = 0.018;

/// Number of screen numbers each request kind rotates through.
///
/// Every call of a kind is sent on the next screen of its rotation, and the
/// provider echoes the screen back with each page. A page carrying any other
/// screen than the one of the call in flight is dropped.
pub const SCREEN_ROTATION: u32 = 50;
