//! httpsock - reconstruct HTTP exchanges from network traffic.
//!
//! This library tracks TCP sessions from a live interface or a recorded
//! capture file, rebuilds the raw HTTP request/response exchanges flowing
//! over them, and broadcasts each exchange as a compact binary frame to
//! WebSocket subscribers. Offline replay retains the whole frame history
//! for late subscribers; live capture delivers only from the moment a
//! subscriber connects.
//!
//! # Example
//!
//! ```no_run
//! use httpsock::capture::{CaptureConfig, CaptureMode, PacketSource};
//!
//! fn main() -> anyhow::Result<()> {
//!     let mode = CaptureMode::detect("capture.pcap");
//!     let source = PacketSource::open(&mode, &CaptureConfig::default())?;
//!     // Feed packets through decode, the tracker, and the reconstructor...
//!     let _ = source.link_type();
//!     Ok(())
//! }
//! ```

pub mod broadcast;
pub mod capture;
pub mod cli;
pub mod decode;
pub mod error;
pub mod frame;
pub mod http;
pub mod pipeline;
pub mod server;
pub mod track;

pub use error::{Error, Result};
