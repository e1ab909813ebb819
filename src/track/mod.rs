//! TCP session tracking and per-direction byte-stream delivery.
//!
//! Sessions are picked up from their opening SYN and keyed by the
//! (client, server) address pair. Each direction is reassembled into ordered
//! bytes and handed to a [`SessionSink`] as typed events; events for one
//! session are strictly ordered, cross-session order is unconstrained.

mod reassembly;

pub use reassembly::FlowReassembler;

use std::collections::HashMap;
use std::net::SocketAddr;

use tracing::{debug, trace};

use crate::decode::TcpSegment;

/// Tracker-assigned session identity.
pub type SessionId = u64;

/// Address pair identifying a tracked session, initiator first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub client: SocketAddr,
    pub server: SocketAddr,
}

/// Lifecycle and data events for tracked sessions.
#[derive(Debug, PartialEq, Eq)]
pub enum SessionEvent<'a> {
    /// A new session was picked up from its opening SYN.
    Established { id: SessionId },
    /// In-order client-to-server bytes.
    DataSend { id: SessionId, bytes: &'a [u8] },
    /// In-order server-to-client bytes.
    DataRecv { id: SessionId, bytes: &'a [u8] },
    /// The session ended (FIN from both sides, RST, or tracker teardown).
    Closed { id: SessionId },
}

/// Receives session events from the tracker.
pub trait SessionSink {
    fn on_session_event(&mut self, event: SessionEvent<'_>);
}

struct TrackedSession {
    id: SessionId,
    /// Client-to-server byte stream.
    client_flow: FlowReassembler,
    /// Server-to-client byte stream; created once the server side is seen.
    server_flow: Option<FlowReassembler>,
    client_fin: bool,
    server_fin: bool,
}

/// Tracks TCP sessions across packets and delivers their byte streams.
///
/// Only sessions whose opening SYN was observed are tracked; mid-stream
/// traffic for unknown sessions is counted and ignored.
#[derive(Default)]
pub struct TcpTracker {
    sessions: HashMap<SessionKey, TrackedSession>,
    next_id: SessionId,
    untracked: u64,
}

impl TcpTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of sessions currently tracked.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Segments seen for sessions whose start was never observed.
    pub fn untracked_segments(&self) -> u64 {
        self.untracked
    }

    /// Process one decoded TCP segment.
    pub fn track(&mut self, segment: &TcpSegment<'_>, sink: &mut impl SessionSink) {
        if segment.syn && !segment.ack {
            let key = SessionKey {
                client: segment.src,
                server: segment.dst,
            };
            // Port reuse: a fresh SYN supersedes any previous session state.
            self.close(key, sink);

            let id = self.next_id;
            self.next_id += 1;
            self.sessions.insert(
                key,
                TrackedSession {
                    id,
                    // The SYN occupies one sequence number; payload (TCP fast
                    // open) is not delivered.
                    client_flow: FlowReassembler::new(segment.seq.wrapping_add(1)),
                    server_flow: None,
                    client_fin: false,
                    server_fin: false,
                },
            );
            debug!(session = id, client = %key.client, server = %key.server, "session tracked");
            sink.on_session_event(SessionEvent::Established { id });
            return;
        }

        let client_key = SessionKey {
            client: segment.src,
            server: segment.dst,
        };
        if self.sessions.contains_key(&client_key) {
            self.client_segment(client_key, segment, sink);
            return;
        }

        let server_key = SessionKey {
            client: segment.dst,
            server: segment.src,
        };
        if self.sessions.contains_key(&server_key) {
            self.server_segment(server_key, segment, sink);
            return;
        }

        self.untracked += 1;
        trace!(src = %segment.src, dst = %segment.dst, "segment for untracked session ignored");
    }

    /// Close all remaining sessions, e.g. at end of an offline file. Partial
    /// per-session state is discarded, never flushed.
    pub fn finish(&mut self, sink: &mut impl SessionSink) {
        for (_, session) in self.sessions.drain() {
            sink.on_session_event(SessionEvent::Closed { id: session.id });
        }
    }

    fn close(&mut self, key: SessionKey, sink: &mut impl SessionSink) {
        if let Some(session) = self.sessions.remove(&key) {
            sink.on_session_event(SessionEvent::Closed { id: session.id });
        }
    }

    fn client_segment(
        &mut self,
        key: SessionKey,
        segment: &TcpSegment<'_>,
        sink: &mut impl SessionSink,
    ) {
        if segment.rst {
            self.close(key, sink);
            return;
        }
        let Some(session) = self.sessions.get_mut(&key) else {
            return;
        };

        let mut data = Vec::new();
        session.client_flow.push(segment.seq, segment.payload, &mut data);

        let id = session.id;
        if segment.fin {
            session.client_fin = true;
        }
        let done = session.client_fin && session.server_fin;

        if !data.is_empty() {
            sink.on_session_event(SessionEvent::DataSend { id, bytes: &data });
        }
        if done {
            self.close(key, sink);
        }
    }

    fn server_segment(
        &mut self,
        key: SessionKey,
        segment: &TcpSegment<'_>,
        sink: &mut impl SessionSink,
    ) {
        if segment.rst {
            self.close(key, sink);
            return;
        }
        let Some(session) = self.sessions.get_mut(&key) else {
            return;
        };

        let mut data = Vec::new();
        if segment.syn {
            // SYN-ACK pins the server's initial sequence number.
            session.server_flow = Some(FlowReassembler::new(segment.seq.wrapping_add(1)));
        } else {
            // If the SYN-ACK was missed, start delivery at this segment.
            let flow = session
                .server_flow
                .get_or_insert_with(|| FlowReassembler::new(segment.seq));
            flow.push(segment.seq, segment.payload, &mut data);
        }

        let id = session.id;
        if segment.fin {
            session.server_fin = true;
        }
        let done = session.client_fin && session.server_fin;

        if !data.is_empty() {
            sink.on_session_event(SessionEvent::DataRecv { id, bytes: &data });
        }
        if done {
            self.close(key, sink);
        }
    }
}
