//! Boundary with the external market data provider.
//!
//! The provider is a callback-driven control: outbound calls return
//! immediately and results arrive later, on the provider's own thread,
//! through the [`EventSink`] installed at startup.

use crate::errors::ProviderError;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Callback installed into the provider. Every inbound event goes through it.
pub type EventSink = Arc<dyn Fn(ProviderEvent) + Send + Sync + 'static>;

/// Market segment used when enumerating instruments.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Market {
    /// KOSPI main board.
    Kospi,
    /// KOSDAQ board.
    Kosdaq,
}

impl Market {
    /// All markets enumerated when building the instrument directory.
    pub const ALL: [Market; 2] = [Market::Kospi, Market::Kosdaq];

    /// Provider identifier of the market.
    pub fn code(&self) -> &'static str {
        match self {
            Market::Kospi => "0",
            Market::Kosdaq => "10",
        }
    }

    /// Parses a market from its provider identifier or its name.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "0" | "KOSPI" => Some(Market::Kospi),
            "10" | "KOSDAQ" => Some(Market::Kosdaq),
            _ => None,
        }
    }
}

/// One row of a provider response: provider field name to raw text value.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawRow(BTreeMap<String, String>);

impl RawRow {
    /// Creates an empty row.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a field, returning the row (builder style).
    pub fn with(mut self, field: &str, value: impl Into<String>) -> Self {
        self.0.insert(field.to_string(), value.into());
        self
    }

    /// Returns the trimmed value of `field`, if present.
    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(|v| v.trim())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for RawRow {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        RawRow(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// An outbound data request.
#[derive(Clone, Debug, PartialEq)]
pub struct OutboundRequest {
    /// Correlation key echoed back in the completion event.
    pub request_name: String,
    /// Provider query identifier (e.g. `opt10081`).
    pub query_id: String,
    /// Provider screen number the request is bound to.
    pub screen_id: String,
    /// Continuation token of the page to fetch; `None` for the first page.
    pub continuation: Option<String>,
    /// Input values set before the request is issued, in order.
    pub inputs: Vec<(String, String)>,
}

impl OutboundRequest {
    /// Returns the value of the named input, if it was set.
    pub fn input(&self, name: &str) -> Option<&str> {
        self.inputs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Completion of one page of a data request.
#[derive(Clone, Debug, PartialEq)]
pub struct DataEvent {
    /// Request name the provider echoes back.
    pub request_name: String,
    /// Screen number of the request this page answers, echoed back.
    pub screen_id: String,
    /// Rows of this page, in provider order.
    pub rows: Vec<RawRow>,
    /// Token to request the next page with; `None` when no more data remains.
    pub continuation: Option<String>,
}

/// Events the provider delivers through the [`EventSink`].
#[derive(Clone, Debug, PartialEq)]
pub enum ProviderEvent {
    /// Login result. `0` means success.
    Connected {
        /// Provider result code.
        code: i32,
    },
    /// A page of data for a previously issued request.
    Data(DataEvent),
}

/// Capability interface of the external provider.
///
/// Implementations must be callable from several threads, but the gateway
/// guarantees that at most one data request is outstanding at a time.
pub trait Provider: Send + Sync {
    /// Installs the callback that receives all inbound events.
    fn install_sink(&self, sink: EventSink);

    /// Starts the login handshake. The result arrives as [`ProviderEvent::Connected`].
    fn comm_connect(&self) -> Result<(), ProviderError>;

    /// Issues a data request. Fire-and-forget: completion arrives as [`ProviderEvent::Data`].
    fn request(&self, request: OutboundRequest) -> Result<(), ProviderError>;

    /// Lists the instrument codes of a market.
    fn code_list_by_market(&self, market: Market) -> Result<Vec<String>, ProviderError>;

    /// Returns the display name of an instrument code.
    fn master_code_name(&self, code: &str) -> Option<String>;
}

impl fmt::Debug for dyn Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Provider")
    }
}
