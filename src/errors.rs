use thiserror::Error;

/// Errors reported by a [`Provider`](crate::provider::Provider) implementation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    /// The provider control could not be reached or refused the call.
    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    /// The provider configuration (e.g. instrument listing) is malformed or missing.
    #[error("Invalid provider config: {0}")]
    InvalidConfig(String),
}

/// Errors raised by the provider [`Session`](crate::session::Session).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    /// The provider reported a failed login.
    ///
    /// Fatal at startup: the gateway cannot serve any request without a session.
    #[error("Provider login failed with code {code}")]
    Authentication {
        /// Error code returned by the provider's connect callback.
        code: i32,
    },

    /// The provider never reported the login result.
    #[error("Provider login did not complete within {0} ms")]
    ConnectTimeout(u64),

    /// `connect` was called on a session that already left the disconnected state.
    #[error("Session already started")]
    AlreadyStarted,

    /// A request was issued before the session was authenticated.
    #[error("Session is not authenticated")]
    NotAuthenticated,

    /// The provider rejected an outbound call.
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),
}

/// Errors raised while building the request registry.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegistryError {
    /// Two handlers were registered for the same request name.
    ///
    /// This is a startup configuration bug.
    #[error("Request name already registered: {0}")]
    DuplicateRequestName(String),
}

/// Errors produced while parsing a client command.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CommandError {
    /// The command shape or verb is not recognised.
    #[error("Unsupported command: {0}")]
    UnsupportedCommand(String),

    /// The command is recognised but one of its arguments is malformed.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// Errors returned by a collector request.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CollectorError {
    /// The provider did not deliver a response within the configured bound.
    ///
    /// The session stays usable for the next request.
    #[error("Request {request_name} timed out")]
    RequestTimeout {
        /// Name of the request that timed out.
        request_name: String,
    },

    /// The provider returned malformed or unexpected fields.
    #[error("Unexpected data for {request_name}: {message}")]
    UpstreamData {
        /// Name of the request whose response could not be assembled.
        request_name: String,
        /// Description of the offending field.
        message: String,
    },

    /// The collector is not bound to the session the lease was taken from.
    #[error("Request {request_name} is not bound to this session")]
    UnboundSession {
        /// Name of the request that was refused.
        request_name: String,
    },

    /// The request could not be sent through the session.
    #[error("Session error: {0}")]
    Session(#[from] SessionError),
}

/// Errors returned from the [`Gateway`](crate::gateway::Gateway).
///
/// Startup variants are fatal; the rest are turned into `{"error": ...}`
/// payloads by the command server.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Session establishment failed.
    #[error("{0}")]
    Session(#[from] SessionError),

    /// Collector registration failed.
    #[error("{0}")]
    Registry(#[from] RegistryError),

    /// The instrument directory could not be built.
    #[error("{0}")]
    Provider(#[from] ProviderError),

    /// The client command was rejected.
    #[error("{0}")]
    Command(#[from] CommandError),

    /// A collector request failed.
    #[error("{0}")]
    Collector(#[from] CollectorError),

    /// The result could not be serialized.
    #[error("Failed to serialize response: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors produced by the TCP server subsystem.
#[derive(Error, Debug)]
pub enum TcpServerError {
    /// The TCP listener failed to bind to the specified address/port.
    #[error("Failed to bind TCP listener: {0}")]
    BindError(String),

    /// Error while accepting an incoming TCP client connection.
    #[error("Failed to accept TCP connection: {0}")]
    AcceptError(String),

    /// I/O error during communication with a specific client.
    #[error("Client IO error: {0}")]
    ClientIoError(String),

    /// The client sent a command that could not be framed.
    #[error("Invalid command received: {0}")]
    InvalidCommand(String),
}

/// High-level errors returned by the gateway and client binaries.
#[derive(Error, Debug)]
pub enum CliError {
    /// General wrapper around any textual failure.
    #[error("Cli failed with error: {0}")]
    GeneralError(String),
}

impl From<GatewayError> for CliError {
    fn from(err: GatewayError) -> Self {
        CliError::GeneralError(err.to_string())
    }
}

impl From<ProviderError> for CliError {
    fn from(err: ProviderError) -> Self {
        CliError::GeneralError(err.to_string())
    }
}

impl From<TcpServerError> for CliError {
    fn from(err: TcpServerError) -> Self {
        CliError::GeneralError(err.to_string())
    }
}
