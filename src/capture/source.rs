//! Packet acquisition over live and offline pcap captures.

use pcap::{Active, Capture, Linktype, Offline, Savefile};
use tracing::debug;

use super::{CaptureConfig, CaptureMode};
use crate::error::CaptureError;

/// Read timeout for live captures, so the capture loop can observe shutdown
/// between packets.
const READ_TIMEOUT_MS: i32 = 100;

/// Outcome of polling the capture handle once.
#[derive(Debug)]
pub enum Captured {
    /// A packet was read.
    Packet(Vec<u8>),
    /// Live read timed out with no traffic; poll again.
    Idle,
    /// Offline file fully consumed.
    Done,
}

enum SourceInner {
    Live {
        capture: Capture<Active>,
        outfile: Option<Savefile>,
    },
    Offline {
        capture: Capture<Offline>,
    },
}

/// Unified packet source for live interfaces and capture files.
pub struct PacketSource {
    inner: SourceInner,
    link: Linktype,
}

impl PacketSource {
    /// Open the capture described by `mode` and `config`.
    ///
    /// Any failure here (unknown device, unreadable file, bad filter,
    /// unwritable output path) is fatal: callers abort startup before the
    /// transport ever binds.
    pub fn open(mode: &CaptureMode, config: &CaptureConfig) -> Result<Self, CaptureError> {
        match mode {
            CaptureMode::Offline { path } => {
                let mut capture =
                    Capture::from_file(path).map_err(|source| CaptureError::File {
                        path: path.clone(),
                        source,
                    })?;
                apply_filter(&mut capture, config)?;

                let link = capture.get_datalink();
                debug!(path = %path.display(), link = link.0, "offline capture opened");
                Ok(Self {
                    inner: SourceInner::Offline { capture },
                    link,
                })
            }
            CaptureMode::Live { device } => {
                let mut builder = Capture::from_device(device.as_str())
                    .map_err(|source| CaptureError::Device {
                        device: device.clone(),
                        source,
                    })?
                    .promisc(config.promisc)
                    .immediate_mode(true)
                    .timeout(READ_TIMEOUT_MS);
                if config.monitor {
                    builder = builder.rfmon(true);
                }

                let mut capture = builder.open().map_err(|source| CaptureError::Device {
                    device: device.clone(),
                    source,
                })?;
                apply_filter(&mut capture, config)?;

                let outfile = match config.outfile_for(mode) {
                    Some(path) => Some(capture.savefile(path).map_err(|source| {
                        CaptureError::Outfile {
                            path: path.to_path_buf(),
                            source,
                        }
                    })?),
                    None => None,
                };

                let link = capture.get_datalink();
                debug!(device, link = link.0, "live capture opened");
                Ok(Self {
                    inner: SourceInner::Live { capture, outfile },
                    link,
                })
            }
        }
    }

    /// Link type of the capture, for packet decoding.
    pub fn link_type(&self) -> i32 {
        self.link.0
    }

    /// Poll for the next packet. Mirrors every live packet into the output
    /// capture when one is configured.
    pub fn next_packet(&mut self) -> Result<Captured, CaptureError> {
        match &mut self.inner {
            SourceInner::Live { capture, outfile } => match capture.next_packet() {
                Ok(packet) => {
                    if let Some(savefile) = outfile {
                        savefile.write(&packet);
                    }
                    Ok(Captured::Packet(packet.data.to_vec()))
                }
                Err(pcap::Error::TimeoutExpired) => Ok(Captured::Idle),
                Err(pcap::Error::NoMorePackets) => Ok(Captured::Done),
                Err(source) => Err(CaptureError::Read(source)),
            },
            SourceInner::Offline { capture } => match capture.next_packet() {
                Ok(packet) => Ok(Captured::Packet(packet.data.to_vec())),
                Err(pcap::Error::NoMorePackets) => Ok(Captured::Done),
                Err(source) => Err(CaptureError::Read(source)),
            },
        }
    }
}

fn apply_filter<T: pcap::Activated>(
    capture: &mut Capture<T>,
    config: &CaptureConfig,
) -> Result<(), CaptureError> {
    if let Some(filter) = config.filter.as_deref() {
        capture
            .filter(filter, true)
            .map_err(|source| CaptureError::Filter {
                filter: filter.to_string(),
                source,
            })?;
    }
    Ok(())
}
