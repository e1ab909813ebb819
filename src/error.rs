//! Error types for httpsock.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for httpsock operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Error constructing or reading a capture session
    #[error("capture error: {0}")]
    Capture(#[from] CaptureError),

    /// Error binding or running the subscriber transport
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while opening or reading a capture session.
///
/// Construction failures are fatal at startup: the process must not begin
/// serving subscribers with a broken capture source.
#[derive(Error, Debug)]
pub enum CaptureError {
    /// Could not open the named interface for live capture
    #[error("failed to open device {device}: {source}")]
    Device { device: String, source: pcap::Error },

    /// Could not open the capture file for offline replay
    #[error("failed to open capture file {}: {source}", path.display())]
    File { path: PathBuf, source: pcap::Error },

    /// The BPF filter expression did not compile
    #[error("invalid filter expression {filter:?}: {source}")]
    Filter { filter: String, source: pcap::Error },

    /// Could not open the output capture file for writing
    #[error("failed to open output capture {}: {source}", path.display())]
    Outfile { path: PathBuf, source: pcap::Error },

    /// Reading from the capture handle failed
    #[error("capture read failed: {0}")]
    Read(pcap::Error),
}

/// Errors raised by the WebSocket transport.
#[derive(Error, Debug)]
pub enum TransportError {
    /// Could not bind the listening socket
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
