//! WebSocket transport for frame subscribers.

use std::sync::PoisonError;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::broadcast::Subscriber;
use crate::error::TransportError;
use crate::frame::Frame;
use crate::pipeline::SharedQueue;

/// Queue-side handle to one connected WebSocket client.
///
/// Frames go into an unbounded channel drained by the connection's writer
/// task, so the capture loop never waits on a slow client.
pub struct WsSubscriber {
    tx: mpsc::UnboundedSender<Frame>,
}

impl Subscriber for WsSubscriber {
    fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }

    fn send(&self, frame: Frame) {
        // A failed send means the connection is going away; the handle gets
        // pruned on the next fanout.
        let _ = self.tx.send(frame);
    }
}

/// Accepts subscriber connections and feeds them broadcast frames.
pub struct WsServer {
    listener: TcpListener,
    queue: SharedQueue<WsSubscriber>,
}

impl WsServer {
    /// Bind the listening socket. Fatal on failure.
    pub async fn bind(
        host: &str,
        port: u16,
        queue: SharedQueue<WsSubscriber>,
    ) -> Result<Self, TransportError> {
        let addr = format!("{host}:{port}");
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| TransportError::Bind { addr, source })?;
        Ok(Self { listener, queue })
    }

    /// Accept subscribers until the task is dropped.
    pub async fn run(self) {
        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    info!(%peer, "subscriber connected");
                    tokio::spawn(handle_connection(stream, self.queue.clone()));
                }
                Err(e) => {
                    warn!(error = %e, "accept failed");
                }
            }
        }
    }
}

async fn handle_connection(stream: TcpStream, queue: SharedQueue<WsSubscriber>) {
    let ws = match tokio_tungstenite::accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            debug!(error = %e, "websocket handshake failed");
            return;
        }
    };
    let (mut sink, mut stream) = ws.split();

    let (tx, mut rx) = mpsc::unbounded_channel();
    {
        // Replay and registration under one lock: nothing produced afterwards
        // can reach this subscriber before its history does.
        let mut queue = queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        queue.subscribe(WsSubscriber { tx });
    }

    loop {
        tokio::select! {
            frame = rx.recv() => {
                let Some(frame) = frame else { break };
                if sink.send(Message::binary(frame.to_vec())).await.is_err() {
                    break;
                }
            }
            message = stream.next() => {
                match message {
                    // Inbound payloads are ignored; the stream is one-way.
                    Some(Ok(msg)) if !msg.is_close() => continue,
                    _ => break,
                }
            }
        }
    }
    debug!("subscriber disconnected");
}
