//! Client errors.

use std::io;

use thiserror::Error;

/// Errors a client session can end with.
#[derive(Debug, Error)]
pub enum ClientError {
    /// No address for the relay accepted the connection.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        /// The `host:port` that was dialled.
        addr: String,
        /// Error from the last address tried.
        #[source]
        source: io::Error,
    },

    /// Reading or writing the connection or the terminal failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_error_names_the_address() {
        let err = ClientError::Connect {
            addr: "127.0.0.1:9001".to_string(),
            source: io::ErrorKind::ConnectionRefused.into(),
        };
        assert!(err.to_string().starts_with("failed to connect to 127.0.0.1:9001"));
    }
}
