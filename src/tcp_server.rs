use crate::defs::{CLIENT_READ_TIMEOUT_MS, MAX_COMMAND_BYTES};
use crate::errors::TcpServerError;
use crate::gateway::Gateway;

use serde_json::json;
use std::io::{BufRead, BufReader, ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// TCP server that answers one command per connection.
///
/// A client sends a pipe-delimited command terminated by `\n` (or by closing
/// its write side), receives a single JSON document followed by `\n`, and the
/// connection is closed.
pub struct TcpServer {
    /// TCP listener socket
    listener: TcpListener,

    /// Gateway executing the commands
    gateway: Arc<Gateway>,
}

impl TcpServer {
    /// Creates a new TCP server bound to the given address.
    ///
    /// # Arguments
    /// * `addr` - Address to bind, e.g., `"127.0.0.1:9999"`.
    /// * `gateway` - Shared, started [`Gateway`].
    ///
    /// # Returns
    /// * `Ok(TcpServer)` if binding succeeds.
    /// * `Err(TcpServerError::BindError)` if the port is unavailable.
    pub fn new(addr: &str, gateway: Arc<Gateway>) -> Result<Self, TcpServerError> {
        log::info!("Binding TCP server to address: {}", addr);
        let listener =
            TcpListener::bind(addr).map_err(|e| TcpServerError::BindError(e.to_string()))?;
        log::info!("TCP server successfully bound to: {}", addr);

        Ok(Self { listener, gateway })
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, TcpServerError> {
        self.listener
            .local_addr()
            .map_err(|e| TcpServerError::BindError(e.to_string()))
    }

    /// Starts the TCP server in an infinite loop.
    ///
    /// Every connection is handled on its own thread. Requests that reach the
    /// provider are still served one at a time by the gateway.
    pub fn start(&self) -> Result<(), TcpServerError> {
        log::info!("TCP server starting main loop");
        loop {
            match self.listener.accept() {
                Ok((stream, addr)) => {
                    log::debug!("New TCP connection from: {}", addr);
                    let gateway = self.gateway.clone();
                    thread::spawn(move || {
                        if let Err(e) = handle_connection(stream, addr, gateway) {
                            log::warn!("Connection handler error for {}: {}", addr, e);
                        }
                    });
                }
                Err(e) => {
                    log::error!("Failed to accept TCP connection: {}", e);
                    return Err(TcpServerError::AcceptError(e.to_string()));
                }
            }
        }
    }
}

/// Reads one command, writes the response and closes the connection.
fn handle_connection(
    mut stream: TcpStream,
    addr: SocketAddr,
    gateway: Arc<Gateway>,
) -> Result<(), TcpServerError> {
    let response = match read_command(&stream) {
        Ok(payload) => {
            log::info!("[tcp] {} -> '{}'", addr, payload.trim());
            gateway.respond(&payload)
        }
        Err(e) => {
            log::warn!("Rejecting command from {}: {}", addr, e);
            json!({ "error": e.to_string() }).to_string()
        }
    };
    log::debug!("[tcp] {} <- {} bytes", addr, response.len());

    stream
        .write_all(response.as_bytes())
        .and_then(|_| stream.write_all(b"\n"))
        .and_then(|_| stream.flush())
        .map_err(|e| TcpServerError::ClientIoError(e.to_string()))?;

    // The peer may already be gone; nothing left to report.
    let _ = stream.shutdown(Shutdown::Both);
    Ok(())
}

/// Reads bytes up to the first `\n` or end of stream.
///
/// # Errors
/// * [`TcpServerError::InvalidCommand`] for oversized or non UTF-8 payloads,
///   or when the client stays silent past the read timeout.
/// * [`TcpServerError::ClientIoError`] for other socket failures.
fn read_command(stream: &TcpStream) -> Result<String, TcpServerError> {
    stream
        .set_read_timeout(Some(Duration::from_millis(CLIENT_READ_TIMEOUT_MS)))
        .map_err(|e| TcpServerError::ClientIoError(e.to_string()))?;

    // One byte over the limit is enough to tell an oversized command apart.
    let mut reader = BufReader::new(stream.take(MAX_COMMAND_BYTES as u64 + 1));
    let mut buf = Vec::new();
    match reader.read_until(b'\n', &mut buf) {
        Ok(_) => {}
        Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
            return Err(TcpServerError::InvalidCommand(format!(
                "no command received within {} ms",
                CLIENT_READ_TIMEOUT_MS
            )));
        }
        Err(e) => return Err(TcpServerError::ClientIoError(e.to_string())),
    }

    if buf.last() == Some(&b'\n') {
        buf.pop();
    }
    if buf.len() > MAX_COMMAND_BYTES {
        return Err(TcpServerError::InvalidCommand(format!(
            "command exceeds {} bytes",
            MAX_COMMAND_BYTES
        )));
    }
    String::from_utf8(buf)
        .map_err(|_| TcpServerError::InvalidCommand("command is not valid UTF-8".into()))
}
