//! Per-direction TCP byte-stream reassembly.

use std::collections::BTreeMap;

use tracing::trace;

/// Cap on buffered out-of-order segments per flow. Segments past the cap
/// are dropped; the resulting gap simply stalls HTTP decoding for the flow.
const MAX_PENDING_SEGMENTS: usize = 1024;

/// Sequence-number comparison on the 32-bit circle.
fn seq_before(a: u32, b: u32) -> bool {
    (a.wrapping_sub(b) as i32) < 0
}

/// Reassembles one direction of a TCP flow into in-order payload bytes.
///
/// Segments at the expected sequence number are delivered immediately;
/// segments from the future are parked until the gap closes; duplicate and
/// overlapping prefixes are trimmed.
pub struct FlowReassembler {
    /// Next expected sequence number.
    next_seq: u32,
    /// Out-of-order segments keyed by starting sequence number.
    pending: BTreeMap<u32, Vec<u8>>,
}

impl FlowReassembler {
    /// Start a flow whose first payload byte will carry `initial_seq`.
    pub fn new(initial_seq: u32) -> Self {
        Self {
            next_seq: initial_seq,
            pending: BTreeMap::new(),
        }
    }

    /// Feed one segment, appending any newly in-order bytes to `out`.
    pub fn push(&mut self, seq: u32, payload: &[u8], out: &mut Vec<u8>) {
        if payload.is_empty() {
            return;
        }

        let end = seq.wrapping_add(payload.len() as u32);
        if !seq_before(self.next_seq, end) {
            // Wholly retransmitted data.
            return;
        }

        if seq_before(seq, self.next_seq) {
            // Overlaps already-delivered bytes; keep only the new tail.
            let skip = self.next_seq.wrapping_sub(seq) as usize;
            self.deliver(&payload[skip..], out);
        } else if seq == self.next_seq {
            self.deliver(payload, out);
        } else {
            if self.pending.len() >= MAX_PENDING_SEGMENTS {
                trace!(seq, "out-of-order buffer full, segment dropped");
                return;
            }
            // Keep the longer segment on duplicate starting points.
            let entry = self.pending.entry(seq).or_default();
            if entry.len() < payload.len() {
                *entry = payload.to_vec();
            }
        }

        self.flush_pending(out);
    }

    /// Bytes currently parked out of order.
    pub fn pending_segments(&self) -> usize {
        self.pending.len()
    }

    fn deliver(&mut self, payload: &[u8], out: &mut Vec<u8>) {
        out.extend_from_slice(payload);
        self.next_seq = self.next_seq.wrapping_add(payload.len() as u32);
    }

    /// Drain parked segments that have become deliverable or obsolete.
    fn flush_pending(&mut self, out: &mut Vec<u8>) {
        loop {
            // BTreeMap ordering is on raw u32, which is not circular order,
            // so scan for a segment starting at or before the delivery point.
            let candidate = self
                .pending
                .iter()
                .find(|(seq, _)| !seq_before(self.next_seq, **seq))
                .map(|(seq, _)| *seq);

            let Some(seq) = candidate else {
                return;
            };
            let Some(payload) = self.pending.remove(&seq) else {
                return;
            };

            let end = seq.wrapping_add(payload.len() as u32);
            if !seq_before(self.next_seq, end) {
                // Entirely behind the delivery point now.
                continue;
            }
            let skip = self.next_seq.wrapping_sub(seq) as usize;
            self.deliver(&payload[skip..], out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(reassembler: &mut FlowReassembler, seq: u32, payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        reassembler.push(seq, payload, &mut out);
        out
    }

    #[test]
    fn test_in_order_delivery() {
        let mut flow = FlowReassembler::new(100);

        assert_eq!(collect(&mut flow, 100, b"hello"), b"hello");
        assert_eq!(collect(&mut flow, 105, b" world"), b" world");
    }

    #[test]
    fn test_out_of_order_segment_parked_then_flushed() {
        let mut flow = FlowReassembler::new(0);

        assert_eq!(collect(&mut flow, 5, b"world"), b"");
        assert_eq!(flow.pending_segments(), 1);

        assert_eq!(collect(&mut flow, 0, b"hello"), b"helloworld");
        assert_eq!(flow.pending_segments(), 0);
    }

    #[test]
    fn test_duplicate_segment_dropped() {
        let mut flow = FlowReassembler::new(0);

        assert_eq!(collect(&mut flow, 0, b"abcde"), b"abcde");
        assert_eq!(collect(&mut flow, 0, b"abcde"), b"");
    }

    #[test]
    fn test_overlapping_retransmit_trimmed() {
        let mut flow = FlowReassembler::new(0);

        assert_eq!(collect(&mut flow, 0, b"abcde"), b"abcde");
        assert_eq!(collect(&mut flow, 3, b"defgh"), b"fgh");
    }

    #[test]
    fn test_multiple_gaps_fill_in_any_order() {
        let mut flow = FlowReassembler::new(0);

        assert_eq!(collect(&mut flow, 8, b"cc"), b"");
        assert_eq!(collect(&mut flow, 4, b"bb"), b"");
        assert_eq!(flow.pending_segments(), 2);

        assert_eq!(collect(&mut flow, 0, b"aaaa"), b"aaaabb");
        assert_eq!(collect(&mut flow, 6, b"xx"), b"xxcc");
        assert_eq!(flow.pending_segments(), 0);
    }

    #[test]
    fn test_sequence_wraparound() {
        let start = u32::MAX - 2;
        let mut flow = FlowReassembler::new(start);

        assert_eq!(collect(&mut flow, start, b"abcdef"), b"abcdef");
        // Continues past the wrap point.
        assert_eq!(collect(&mut flow, start.wrapping_add(6), b"gh"), b"gh");
    }

    #[test]
    fn test_wraparound_out_of_order() {
        let start = u32::MAX - 1;
        let mut flow = FlowReassembler::new(start);

        // Segment on the far side of the wrap arrives first.
        assert_eq!(collect(&mut flow, start.wrapping_add(4), b"late"), b"");
        assert_eq!(collect(&mut flow, start, b"earl"), b"earllate");
    }
}
