//! httpsock CLI entry point.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, info, trace, warn};
use tracing_subscriber::EnvFilter;

use httpsock::broadcast::BroadcastQueue;
use httpsock::capture::{CaptureConfig, CaptureMode, Captured, PacketSource};
use httpsock::cli::Args;
use httpsock::decode;
use httpsock::pipeline::{Pipeline, SharedQueue};
use httpsock::server::{WsServer, WsSubscriber};
use httpsock::track::TcpTracker;

fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging
    let filter = match args.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .init();

    // Capture construction is fatal before the transport ever binds.
    let mode = CaptureMode::detect(&args.target);
    let config = CaptureConfig {
        filter: args.filter.clone(),
        monitor: args.monitor,
        promisc: args.promisc,
        outfile: args.write.clone(),
    };
    let source = PacketSource::open(&mode, &config)
        .with_context(|| format!("failed to open capture target {}", args.target))?;

    match &mode {
        CaptureMode::Offline { path } => info!("reading traffic from {}", path.display()),
        CaptureMode::Live { device } => info!("intercepting traffic on {device}"),
    }

    let queue: SharedQueue<WsSubscriber> = Arc::new(Mutex::new(BroadcastQueue::new(
        mode.retention(),
    )));

    let runtime = tokio::runtime::Runtime::new().context("failed to start runtime")?;
    runtime.block_on(run(args, source, queue))
}

async fn run(
    args: Args,
    source: PacketSource,
    queue: SharedQueue<WsSubscriber>,
) -> Result<()> {
    let server = WsServer::bind(&args.host, args.port, queue.clone())
        .await
        .context("failed to bind subscriber transport")?;
    info!("socket serving on ws://{}:{}", args.host, args.port);

    let stop = Arc::new(AtomicBool::new(false));
    let capture_thread = std::thread::spawn({
        let stop = stop.clone();
        move || capture_loop(source, queue, stop)
    });

    tokio::select! {
        _ = server.run() => {}
        result = tokio::signal::ctrl_c() => {
            result.context("failed to listen for shutdown signal")?;
            info!("shutting down");
        }
    }

    // Let the capture loop notice the flag, drop the capture handles (which
    // flushes any output file), and exit. Partial sessions are discarded.
    stop.store(true, Ordering::Relaxed);
    let _ = tokio::task::spawn_blocking(move || capture_thread.join()).await;

    Ok(())
}

/// Synchronous pipeline: poll packets, decode, track, reconstruct, broadcast.
fn capture_loop(
    mut source: PacketSource,
    queue: SharedQueue<WsSubscriber>,
    stop: Arc<AtomicBool>,
) {
    let link = source.link_type();
    let mut tracker = TcpTracker::new();
    let mut pipeline = Pipeline::new(queue);
    let mut skipped: u64 = 0;

    while !stop.load(Ordering::Relaxed) {
        match source.next_packet() {
            Ok(Captured::Packet(data)) => match decode::tcp_segment(link, &data) {
                Some(segment) => tracker.track(&segment, &mut pipeline),
                None => {
                    skipped += 1;
                    trace!(len = data.len(), "packet skipped (not a decodable TCP segment)");
                }
            },
            Ok(Captured::Idle) => continue,
            Ok(Captured::Done) => {
                tracker.finish(&mut pipeline);
                debug!("capture exhausted");
                break;
            }
            Err(e) => {
                // Per-packet trouble is not fatal; keep tracking what decodes.
                warn!(error = %e, "capture read error");
            }
        }
    }

    debug!(
        skipped,
        untracked = tracker.untracked_segments(),
        "capture loop finished"
    );
}
