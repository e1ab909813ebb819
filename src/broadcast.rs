//! Frame retention and fanout to subscribers.

use tracing::trace;

use crate::frame::Frame;

/// Replay-buffer retention policy, fixed for the lifetime of one run.
///
/// Live capture keeps nothing (subscribers only see traffic from the moment
/// they connect); offline replay keeps everything so late subscribers can
/// catch up on the whole file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retention {
    /// Never retain frames.
    None,
    /// Retain every frame ever produced.
    Unbounded,
}

/// A transport-owned handle to a connected client.
///
/// The queue only checks readiness and writes frames; connection lifecycle
/// stays with the transport.
pub trait Subscriber {
    /// Whether the subscriber can currently accept frames.
    fn is_open(&self) -> bool;

    /// Deliver one frame. Failures are the transport's concern and must not
    /// propagate back into the queue.
    fn send(&self, frame: Frame);
}

/// Retains frames per the retention policy and fans them out to all open
/// subscribers. A subscriber registered mid-stream first receives the full
/// retained history, in order, before any frame produced afterwards.
pub struct BroadcastQueue<S> {
    retention: Retention,
    buffer: Vec<Frame>,
    subscribers: Vec<S>,
}

impl<S: Subscriber> BroadcastQueue<S> {
    pub fn new(retention: Retention) -> Self {
        Self {
            retention,
            buffer: Vec::new(),
            subscribers: Vec::new(),
        }
    }

    /// Accept a newly produced frame: retain it if the policy says so, then
    /// push it to every open subscriber. Handles whose connection has gone
    /// away are dropped from the fanout list; closing the connection itself
    /// is the transport's job.
    pub fn on_frame(&mut self, frame: Frame) {
        if self.retention == Retention::Unbounded {
            self.buffer.push(frame.clone());
        }

        self.subscribers.retain(|s| s.is_open());
        for subscriber in &self.subscribers {
            subscriber.send(frame.clone());
        }
    }

    /// Register a subscriber, replaying the retained buffer to it first.
    ///
    /// Callers serialize this against `on_frame`, so a subscriber can never
    /// observe a later frame before an earlier one.
    pub fn subscribe(&mut self, subscriber: S) {
        trace!(replayed = self.buffer.len(), "subscriber registered");
        for frame in &self.buffer {
            subscriber.send(frame.clone());
        }
        self.subscribers.push(subscriber);
    }

    /// Number of retained frames.
    pub fn retained(&self) -> usize {
        self.buffer.len()
    }

    /// Number of registered subscriber handles (open or not).
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}
