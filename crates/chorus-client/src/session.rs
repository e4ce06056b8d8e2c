//! Connection and the two byte pumps of a session.

use std::{
    io::{self, BufRead, Read, Write},
    net::{Shutdown, TcpStream},
    thread,
};

use crate::error::ClientError;

/// Host dialled when none is given.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Relay port dialled when none is given.
pub const DEFAULT_PORT: u16 = 9001;

/// Input line that ends the session.
const QUIT: &str = "exit";

/// Connect to the relay at `host:port`.
///
/// `host` may be a name or a literal address; every resolved address is tried
/// in order.
pub fn connect(host: &str, port: u16) -> Result<TcpStream, ClientError> {
    let stream = TcpStream::connect((host, port))
        .map_err(|source| ClientError::Connect { addr: format!("{host}:{port}"), source })?;
    tracing::info!(host, port, "connected");
    Ok(stream)
}

/// What to do with one line of user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Send these bytes to the relay.
    Send(Vec<u8>),
    /// End the session.
    Quit,
}

/// Classify `line` (with or without its line ending) and format it for the
/// wire, prefixed with `name: ` when a name is set.
pub fn outbound(name: Option<&str>, line: &str) -> Outbound {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim() == QUIT {
        return Outbound::Quit;
    }

    let text = match name {
        Some(name) => format!("{name}: {line}\n"),
        None => format!("{line}\n"),
    };
    Outbound::Send(text.into_bytes())
}

/// One connection to the relay, driven until either side ends it.
#[derive(Debug)]
pub struct Session {
    stream: TcpStream,
    name: Option<String>,
}

impl Session {
    /// Wrap a connected stream. `name` prefixes every outbound line.
    pub fn new(stream: TcpStream, name: Option<String>) -> Self {
        Self { stream, name }
    }

    /// Send `input` lines from a background thread while copying everything
    /// the relay sends into `output`.
    ///
    /// Quitting (an `exit` line or end of input) half-closes the connection;
    /// the session then ends once the relay closes its side. A relay hang-up
    /// ends the session straight away, even with the input still open.
    pub fn run<I, O>(self, input: I, output: O) -> Result<(), ClientError>
    where
        I: BufRead + Send + 'static,
        O: Write,
    {
        let writer = self.stream.try_clone()?;
        let name = self.name;

        let sender = thread::Builder::new().name("chorus-input".to_string()).spawn(move || {
            let result = send_lines(input, name.as_deref(), &writer);
            if let Err(e) = writer.shutdown(Shutdown::Write) {
                tracing::debug!(error = %e, "half-close failed");
            }
            result
        })?;

        let received = copy_output(&self.stream, output)?;
        tracing::info!(received, "relay closed the connection");

        // A sender still blocked on input is left behind; the process is
        // about to exit anyway.
        if sender.is_finished() {
            match sender.join() {
                Ok(result) => result?,
                Err(_) => tracing::error!("input thread panicked"),
            }
        }
        Ok(())
    }
}

/// Forward input lines to the relay until `exit` or end of input.
pub(crate) fn send_lines<I: BufRead, W: Write>(
    input: I,
    name: Option<&str>,
    mut relay: W,
) -> Result<(), ClientError> {
    for line in input.lines() {
        match outbound(name, &line?) {
            Outbound::Send(bytes) => relay.write_all(&bytes)?,
            Outbound::Quit => {
                tracing::debug!("quit requested");
                break;
            },
        }
    }
    Ok(())
}

/// Copy relay bytes to `output` until the relay closes, returning the count.
///
/// Each read is flushed at once so messages show up as they arrive.
pub(crate) fn copy_output<R: Read, O: Write>(mut relay: R, mut output: O) -> io::Result<u64> {
    let mut buf = [0u8; 1024];
    let mut total = 0u64;
    loop {
        match relay.read(&mut buf) {
            Ok(0) => return Ok(total),
            Ok(n) => {
                output.write_all(&buf[..n])?;
                output.flush()?;
                total += n as u64;
            },
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {},
            Err(e) if e.kind() == io::ErrorKind::ConnectionReset => {
                tracing::debug!(error = %e, "connection reset");
                return Ok(total);
            },
            Err(e) => return Err(e),
        }
    }
}
