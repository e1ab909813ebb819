//! Wiring from session events to broadcast frames.

use std::sync::{Arc, Mutex, PoisonError};

use crate::broadcast::{BroadcastQueue, Subscriber};
use crate::frame;
use crate::http::{Exchange, ExchangeSink, HttpReconstructor};
use crate::track::{SessionEvent, SessionSink};

/// Shared handle to the broadcast queue, owned jointly by the capture loop
/// and the transport's accept path.
pub type SharedQueue<S> = Arc<Mutex<BroadcastQueue<S>>>;

/// Drives the reconstruction engine and pushes each completed exchange,
/// encoded as a frame, into the broadcast queue.
pub struct Pipeline<S> {
    reconstructor: HttpReconstructor,
    queue: SharedQueue<S>,
}

impl<S: Subscriber> Pipeline<S> {
    pub fn new(queue: SharedQueue<S>) -> Self {
        Self {
            reconstructor: HttpReconstructor::new(),
            queue,
        }
    }
}

impl<S: Subscriber> SessionSink for Pipeline<S> {
    fn on_session_event(&mut self, event: SessionEvent<'_>) {
        let mut sink = FrameSink { queue: &self.queue };
        self.reconstructor.handle(event, &mut sink);
    }
}

/// Encodes exchanges and enqueues the resulting frames.
struct FrameSink<'a, S> {
    queue: &'a Mutex<BroadcastQueue<S>>,
}

impl<S: Subscriber> ExchangeSink for FrameSink<'_, S> {
    fn on_exchange(&mut self, exchange: Exchange) {
        let frame = frame::encode(&exchange.request, &exchange.response);
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .on_frame(frame);
    }
}
