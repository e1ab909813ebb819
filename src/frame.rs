//! Binary frame encoding for reconstructed exchanges.
//!
//! Each completed exchange is shipped to subscribers as one frame:
//!
//! ```text
//! offset 0..4    uint32 big-endian format tag
//! offset 4..8    uint32 big-endian request length L
//! offset 8..8+L  request bytes
//! offset 8+L..   response bytes (length implied by the frame length)
//! ```

use bytes::{BufMut, Bytes, BytesMut};

/// A frame ready for broadcast.
pub type Frame = Bytes;

/// Format tag for HTTP exchange frames. Tags 1 and 2 identify the raw-frame
/// and raw-session stream formats of earlier wire revisions.
pub const FORMAT_HTTP: u32 = 3;

/// Length of the fixed frame header (format tag + request length).
pub const HEADER_LEN: usize = 8;

/// Encode a request/response pair into a frame.
///
/// Callers only hand in completed exchanges, so both slices are non-empty;
/// encoding itself never fails.
pub fn encode(request: &[u8], response: &[u8]) -> Frame {
    let mut frame = BytesMut::with_capacity(HEADER_LEN + request.len() + response.len());
    frame.put_u32(FORMAT_HTTP);
    frame.put_u32(request.len() as u32);
    frame.put_slice(request);
    frame.put_slice(response);
    frame.freeze()
}

/// Decode a frame back into its format tag, request, and response segments.
///
/// Returns `None` if the frame is shorter than its header or the request
/// length points past the end of the frame.
pub fn decode(frame: &[u8]) -> Option<(u32, &[u8], &[u8])> {
    if frame.len() < HEADER_LEN {
        return None;
    }

    let tag = u32::from_be_bytes([frame[0], frame[1], frame[2], frame[3]]);
    let request_len = u32::from_be_bytes([frame[4], frame[5], frame[6], frame[7]]) as usize;

    let rest = &frame[HEADER_LEN..];
    if request_len > rest.len() {
        return None;
    }

    let (request, response) = rest.split_at(request_len);
    Some((tag, request, response))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let request = b"GET / HTTP/1.1\r\n\r\n";
        let response = b"HTTP/1.1 200 OK\r\n\r\nhello";

        let frame = encode(request, response);
        let (tag, req, res) = decode(&frame).unwrap();

        assert_eq!(tag, FORMAT_HTTP);
        assert_eq!(req, request);
        assert_eq!(res, response);
    }

    #[test]
    fn test_layout() {
        let frame = encode(b"abc", b"de");

        assert_eq!(frame.len(), HEADER_LEN + 5);
        assert_eq!(&frame[0..4], &[0, 0, 0, 3]);
        assert_eq!(&frame[4..8], &[0, 0, 0, 3]);
        assert_eq!(&frame[8..11], b"abc");
        assert_eq!(&frame[11..], b"de");
    }

    #[test]
    fn test_decode_truncated_header() {
        assert!(decode(&[0, 0, 0]).is_none());
        assert!(decode(&[]).is_none());
    }

    #[test]
    fn test_decode_request_length_past_end() {
        let mut frame = encode(b"abc", b"de").to_vec();
        frame[7] = 200;
        assert!(decode(&frame).is_none());
    }

    #[test]
    fn test_round_trip_binary_payloads() {
        let request: Vec<u8> = (0..=255).collect();
        let response = vec![0u8, 0xff, 0x80];

        let frame = encode(&request, &response);
        let (tag, req, res) = decode(&frame).unwrap();

        assert_eq!(tag, FORMAT_HTTP);
        assert_eq!(req, &request[..]);
        assert_eq!(res, &response[..]);
    }
}
