//! Capture-mode selection.

use std::path::{Path, PathBuf};

use crate::broadcast::Retention;

/// How to acquire packets, decided once at startup from the target string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureMode {
    /// Bind the named interface and capture live traffic.
    Live { device: String },
    /// Replay a previously recorded capture file.
    Offline { path: PathBuf },
}

impl CaptureMode {
    /// Probe `target`: an existing non-directory path selects offline
    /// replay; anything else is treated as an interface name.
    pub fn detect(target: &str) -> Self {
        match std::fs::metadata(target) {
            Ok(meta) if !meta.is_dir() => CaptureMode::Offline {
                path: PathBuf::from(target),
            },
            _ => CaptureMode::Live {
                device: target.to_string(),
            },
        }
    }

    /// Replay-buffer policy implied by the mode: offline replay retains the
    /// whole frame history for late subscribers, live capture retains
    /// nothing.
    pub fn retention(&self) -> Retention {
        match self {
            CaptureMode::Live { .. } => Retention::None,
            CaptureMode::Offline { .. } => Retention::Unbounded,
        }
    }
}

/// Options applied to the capture engine.
#[derive(Debug, Clone, Default)]
pub struct CaptureConfig {
    /// BPF filter expression.
    pub filter: Option<String>,
    /// Put the interface into monitor mode (live capture only).
    pub monitor: bool,
    /// Put the interface into promiscuous mode (live capture only).
    pub promisc: bool,
    /// Also write captured packets to this file (live capture only; ignored
    /// when replaying offline).
    pub outfile: Option<PathBuf>,
}

impl CaptureConfig {
    /// The output path, if the mode supports one.
    pub fn outfile_for(&self, mode: &CaptureMode) -> Option<&Path> {
        match mode {
            CaptureMode::Live { .. } => self.outfile.as_deref(),
            CaptureMode::Offline { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_existing_file_selects_offline() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"not really a capture").unwrap();

        let mode = CaptureMode::detect(file.path().to_str().unwrap());

        assert_eq!(
            mode,
            CaptureMode::Offline {
                path: file.path().to_path_buf()
            }
        );
        assert_eq!(mode.retention(), Retention::Unbounded);
    }

    #[test]
    fn test_missing_path_selects_live() {
        let mode = CaptureMode::detect("eth0");

        assert_eq!(
            mode,
            CaptureMode::Live {
                device: "eth0".to_string()
            }
        );
        assert_eq!(mode.retention(), Retention::None);
    }

    #[test]
    fn test_directory_selects_live() {
        let dir = tempfile::tempdir().unwrap();

        let mode = CaptureMode::detect(dir.path().to_str().unwrap());

        assert!(matches!(mode, CaptureMode::Live { .. }));
    }

    #[test]
    fn test_outfile_ignored_in_offline_mode() {
        let config = CaptureConfig {
            outfile: Some(PathBuf::from("out.pcap")),
            ..Default::default()
        };

        let live = CaptureMode::Live {
            device: "eth0".into(),
        };
        let offline = CaptureMode::Offline {
            path: "trace.pcap".into(),
        };

        assert_eq!(config.outfile_for(&live), Some(Path::new("out.pcap")));
        assert_eq!(config.outfile_for(&offline), None);
    }
}
