use market_gateway::defs::{CLIENT_READ_TIMEOUT_MS, DEFAULT_TCP_ADDR, MAX_PAGES, REQUEST_TIMEOUT_MS};
use std::io::{self, BufRead, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::time::Duration;
use structopt::StructOpt;

/// Command-line options for the client
#[derive(Debug, StructOpt)]
#[structopt(name = "gateway_client", about = "TCP client for the market data gateway")]
struct Opt {
    /// Gateway address, e.g., 127.0.0.1:9999
    #[structopt(short, long)]
    server_addr: Option<String>,

    /// Seconds to wait for a response. Defaults to the longest a fully
    /// paginated request may take.
    #[structopt(short, long)]
    wait_sec: Option<u64>,

    /// Print responses as indented JSON
    #[structopt(short, long)]
    pretty: bool,

    /// Command to send, e.g. "SHORT|005930|20240101|20240131". Starts an
    /// interactive prompt when omitted.
    command: Option<String>,
}

/// Longest a request may take on the gateway: every page of it waiting the
/// full page timeout.
fn default_wait() -> Duration {
    Duration::from_millis(MAX_PAGES as u64 * REQUEST_TIMEOUT_MS)
}

/// Sends one command on a fresh connection and returns the raw response
fn send_command(addr: &str, command: &str, wait: Duration) -> io::Result<String> {
    let mut stream = TcpStream::connect(addr)?;
    stream.set_write_timeout(Some(Duration::from_millis(CLIENT_READ_TIMEOUT_MS)))?;
    stream.set_read_timeout(Some(wait))?;

    stream.write_all(command.as_bytes())?;
    stream.write_all(b"\n")?;
    stream.flush()?;
    stream.shutdown(Shutdown::Write)?;

    let mut response = String::new();
    stream.read_to_string(&mut response)?;
    if response.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "Server closed connection without a response",
        ));
    }
    Ok(response.trim_end().to_string())
}

/// Re-indents a JSON response; anything else is returned unchanged
fn render(response: &str, pretty: bool) -> String {
    if !pretty {
        return response.to_string();
    }
    serde_json::from_str::<serde_json::Value>(response)
        .and_then(|value| serde_json::to_string_pretty(&value))
        .unwrap_or_else(|_| response.to_string())
}

fn main() -> io::Result<()> {
    let opt = Opt::from_args();
    let addr = opt.server_addr.as_deref().unwrap_or(DEFAULT_TCP_ADDR);
    let wait = opt
        .wait_sec
        .map(Duration::from_secs)
        .unwrap_or_else(default_wait);

    if let Some(command) = &opt.command {
        let response = send_command(addr, command, wait)?;
        println!("{}", render(&response, opt.pretty));
        return Ok(());
    }

    // Interactive CLI loop
    println!("Sending commands to gateway at {}. Type EXIT to quit.", addr);
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("gateway> ");
        io::stdout().flush()?;

        let Some(input) = lines.next() else {
            break;
        };
        let input = input?;
        let command = input.trim();

        if command.is_empty() {
            continue;
        }
        if command.eq_ignore_ascii_case("EXIT") {
            println!("Exiting client.");
            break;
        }

        match send_command(addr, command, wait) {
            Ok(response) => println!("{}", render(&response, opt.pretty)),
            Err(e) => eprintln!("Command failed: {}", e),
        }
    }

    Ok(())
}
