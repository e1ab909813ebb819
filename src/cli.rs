//! Command-line argument definitions.

use std::path::PathBuf;

use clap::Parser;

/// Intercept or replay network traffic and stream reconstructed HTTP
/// exchanges to WebSocket subscribers.
#[derive(Parser, Debug)]
#[command(name = "httpsock")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Network interface to capture on, or a capture file to replay
    #[arg(value_name = "IFACE|FILE")]
    pub target: String,

    /// BPF filter expression applied to the capture
    #[arg(value_name = "FILTER")]
    pub filter: Option<String>,

    /// Bind the WebSocket server to this host
    #[arg(long = "host", default_value = "127.0.0.1")]
    pub host: String,

    /// Bind the WebSocket server to this port
    #[arg(short = 'p', long = "port", default_value_t = 8080)]
    pub port: u16,

    /// Use monitor mode
    #[arg(short = 'm', long = "monitor")]
    pub monitor: bool,

    /// Use promiscuous mode
    #[arg(short = 's', long = "promisc")]
    pub promisc: bool,

    /// Write captured packets to a pcap file (live capture only)
    #[arg(short = 'w', long = "write", value_name = "FILE")]
    pub write: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_invocation() {
        let args = Args::parse_from(["httpsock", "eth0"]);

        assert_eq!(args.target, "eth0");
        assert_eq!(args.filter, None);
        assert_eq!(args.host, "127.0.0.1");
        assert_eq!(args.port, 8080);
        assert!(!args.monitor);
        assert!(!args.promisc);
    }

    #[test]
    fn test_full_invocation() {
        let args = Args::parse_from([
            "httpsock", "eth0", "tcp port 80", "--host", "0.0.0.0", "-p", "9090", "-m", "-s",
            "-w", "out.pcap", "-vv",
        ]);

        assert_eq!(args.filter.as_deref(), Some("tcp port 80"));
        assert_eq!(args.host, "0.0.0.0");
        assert_eq!(args.port, 9090);
        assert!(args.monitor);
        assert!(args.promisc);
        assert_eq!(args.write, Some(PathBuf::from("out.pcap")));
        assert_eq!(args.verbose, 2);
    }
}
