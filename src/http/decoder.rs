//! Incremental HTTP/1.x message decoder.
//!
//! One decoder per stream direction. Bytes arrive in arbitrary chunks from
//! TCP reassembly; the decoder buffers them, recognizes message heads with
//! `httparse`, tracks body framing (Content-Length, chunked, read-to-close),
//! and emits typed events. Chunked payloads are delivered with the chunk
//! framing stripped.

use httparse::Status;
use tracing::debug;

/// Maximum number of headers accepted in a single message head.
const MAX_HEADERS: usize = 64;

/// Which side of the conversation this decoder parses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Request,
    Response,
}

/// Events produced while decoding one direction of a stream.
///
/// Header names keep their original casing and wire order; values are kept
/// as raw bytes since the wire permits non-UTF-8 octets.
#[derive(Debug, PartialEq, Eq)]
pub enum HttpEvent {
    /// A complete request head was recognized.
    RequestHead {
        method: String,
        target: String,
        version: (u8, u8),
        headers: Vec<(String, Vec<u8>)>,
    },
    /// A complete response head was recognized.
    ResponseHead {
        version: (u8, u8),
        status: u16,
        reason: String,
        headers: Vec<(String, Vec<u8>)>,
    },
    /// Body payload bytes, in order. Chunked framing is already stripped.
    Body(Vec<u8>),
    /// The current message ended; the decoder is back in the head phase.
    MessageComplete,
}

/// Body framing derived from a message head.
#[derive(Debug)]
enum BodyFraming {
    /// Exactly this many payload bytes remain.
    Length(u64),
    /// Chunked transfer coding.
    Chunked(ChunkPhase),
    /// Response body delimited by connection close; never completes here.
    UntilClose,
}

#[derive(Debug)]
enum ChunkPhase {
    /// Expecting a chunk-size line.
    Size,
    /// Inside chunk data with this many bytes left.
    Data { remaining: u64 },
    /// Expecting the CRLF that terminates a chunk's data.
    DataEnd,
    /// Consuming trailer lines after the final zero-size chunk.
    Trailer,
}

#[derive(Debug)]
enum Phase {
    Head,
    Body(BodyFraming),
}

/// Incremental decoder for one direction of one session.
pub struct MessageDecoder {
    role: Role,
    buf: Vec<u8>,
    phase: Phase,
    /// Set when input stops being parseable; all further bytes are ignored.
    poisoned: bool,
}

impl MessageDecoder {
    pub fn new(role: Role) -> Self {
        Self {
            role,
            buf: Vec::new(),
            phase: Phase::Head,
            poisoned: false,
        }
    }

    /// Feed reassembled stream bytes, appending any decoded events to `events`.
    pub fn push(&mut self, bytes: &[u8], events: &mut Vec<HttpEvent>) {
        if self.poisoned {
            return;
        }
        self.buf.extend_from_slice(bytes);

        loop {
            let progressed = match self.phase {
                Phase::Head => self.decode_head(events),
                Phase::Body(_) => self.decode_body(events),
            };
            if !progressed || self.poisoned {
                return;
            }
        }
    }

    fn decode_head(&mut self, events: &mut Vec<HttpEvent>) -> bool {
        if self.buf.is_empty() {
            return false;
        }

        let mut header_storage = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let (head_len, event, framing) = match self.role {
            Role::Request => {
                let mut req = httparse::Request::new(&mut header_storage);
                match req.parse(&self.buf) {
                    Ok(Status::Complete(head_len)) => {
                        let headers = collect_headers(req.headers);
                        let framing = request_framing(&headers);
                        let event = HttpEvent::RequestHead {
                            method: req.method.unwrap_or_default().to_string(),
                            target: req.path.unwrap_or_default().to_string(),
                            version: (1, req.version.unwrap_or(1) as u8),
                            headers,
                        };
                        (head_len, event, framing)
                    }
                    Ok(Status::Partial) => return false,
                    Err(e) => {
                        debug!(error = %e, "unparseable request head, direction abandoned");
                        self.poisoned = true;
                        return false;
                    }
                }
            }
            Role::Response => {
                let mut res = httparse::Response::new(&mut header_storage);
                match res.parse(&self.buf) {
                    Ok(Status::Complete(head_len)) => {
                        let status = res.code.unwrap_or_default();
                        let headers = collect_headers(res.headers);
                        let framing = response_framing(status, &headers);
                        let event = HttpEvent::ResponseHead {
                            version: (1, res.version.unwrap_or(1) as u8),
                            status,
                            reason: res.reason.unwrap_or_default().to_string(),
                            headers,
                        };
                        (head_len, event, framing)
                    }
                    Ok(Status::Partial) => return false,
                    Err(e) => {
                        debug!(error = %e, "unparseable response head, direction abandoned");
                        self.poisoned = true;
                        return false;
                    }
                }
            }
        };

        self.buf.drain(..head_len);
        events.push(event);

        match framing {
            Some(framing) => self.phase = Phase::Body(framing),
            None => events.push(HttpEvent::MessageComplete),
        }
        true
    }

    fn decode_body(&mut self, events: &mut Vec<HttpEvent>) -> bool {
        let framing = match &mut self.phase {
            Phase::Body(framing) => framing,
            Phase::Head => return false,
        };

        match framing {
            BodyFraming::Length(remaining) => {
                if self.buf.is_empty() {
                    return false;
                }
                let take = (*remaining).min(self.buf.len() as u64) as usize;
                if take > 0 {
                    let payload: Vec<u8> = self.buf.drain(..take).collect();
                    *remaining -= take as u64;
                    events.push(HttpEvent::Body(payload));
                }
                if *remaining == 0 {
                    events.push(HttpEvent::MessageComplete);
                    self.phase = Phase::Head;
                    return true;
                }
                false
            }
            BodyFraming::UntilClose => {
                // Delimited by connection close, which tears the session down
                // before a completion event could ever fire.
                if self.buf.is_empty() {
                    return false;
                }
                let payload: Vec<u8> = self.buf.drain(..).collect();
                events.push(HttpEvent::Body(payload));
                false
            }
            BodyFraming::Chunked(phase) => {
                let (consumed, done) =
                    match decode_chunked(&self.buf, phase, events) {
                        Ok(step) => step,
                        Err(()) => {
                            debug!("malformed chunked body, direction abandoned");
                            self.poisoned = true;
                            return false;
                        }
                    };
                self.buf.drain(..consumed);
                if done {
                    events.push(HttpEvent::MessageComplete);
                    self.phase = Phase::Head;
                    return true;
                }
                consumed > 0
            }
        }
    }
}

/// Advance the chunked-body state machine over `buf`.
///
/// Returns the number of bytes consumed and whether the body is complete.
fn decode_chunked(
    buf: &[u8],
    phase: &mut ChunkPhase,
    events: &mut Vec<HttpEvent>,
) -> Result<(usize, bool), ()> {
    let mut pos = 0;

    loop {
        match phase {
            ChunkPhase::Size => {
                let Some(line_end) = find_crlf(&buf[pos..]) else {
                    return Ok((pos, false));
                };
                let line = &buf[pos..pos + line_end];
                // Chunk extensions after ';' are ignored.
                let size_text = match line.iter().position(|&b| b == b';') {
                    Some(semi) => &line[..semi],
                    None => line,
                };
                let size_text = std::str::from_utf8(size_text).map_err(|_| ())?;
                let size = u64::from_str_radix(size_text.trim(), 16).map_err(|_| ())?;
                pos += line_end + 2;
                *phase = if size == 0 {
                    ChunkPhase::Trailer
                } else {
                    ChunkPhase::Data { remaining: size }
                };
            }
            ChunkPhase::Data { remaining } => {
                let available = &buf[pos..];
                if available.is_empty() {
                    return Ok((pos, false));
                }
                let take = (*remaining).min(available.len() as u64) as usize;
                events.push(HttpEvent::Body(available[..take].to_vec()));
                *remaining -= take as u64;
                pos += take;
                if *remaining == 0 {
                    *phase = ChunkPhase::DataEnd;
                }
            }
            ChunkPhase::DataEnd => {
                if buf.len() < pos + 2 {
                    return Ok((pos, false));
                }
                if &buf[pos..pos + 2] != b"\r\n" {
                    return Err(());
                }
                pos += 2;
                *phase = ChunkPhase::Size;
            }
            ChunkPhase::Trailer => {
                let Some(line_end) = find_crlf(&buf[pos..]) else {
                    return Ok((pos, false));
                };
                let blank = line_end == 0;
                pos += line_end + 2;
                if blank {
                    *phase = ChunkPhase::Size;
                    return Ok((pos, true));
                }
            }
        }
    }
}

fn find_crlf(data: &[u8]) -> Option<usize> {
    data.windows(2).position(|w| w == b"\r\n")
}

fn collect_headers(headers: &[httparse::Header<'_>]) -> Vec<(String, Vec<u8>)> {
    headers
        .iter()
        .map(|h| (h.name.to_string(), h.value.to_vec()))
        .collect()
}

fn header_value<'a>(headers: &'a [(String, Vec<u8>)], name: &str) -> Option<&'a [u8]> {
    headers
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_slice())
}

fn is_chunked(headers: &[(String, Vec<u8>)]) -> bool {
    header_value(headers, "transfer-encoding")
        .and_then(|v| std::str::from_utf8(v).ok())
        .map(|v| v.to_ascii_lowercase().contains("chunked"))
        .unwrap_or(false)
}

fn content_length(headers: &[(String, Vec<u8>)]) -> Option<u64> {
    header_value(headers, "content-length")
        .and_then(|v| std::str::from_utf8(v).ok())
        .and_then(|v| v.trim().parse().ok())
}

/// Body framing for a request head. Requests without explicit framing have
/// no body.
fn request_framing(headers: &[(String, Vec<u8>)]) -> Option<BodyFraming> {
    if is_chunked(headers) {
        return Some(BodyFraming::Chunked(ChunkPhase::Size));
    }
    match content_length(headers) {
        Some(0) | None => None,
        Some(n) => Some(BodyFraming::Length(n)),
    }
}

/// Body framing for a response head. Responses without explicit framing are
/// delimited by connection close, except statuses that never carry a body.
fn response_framing(status: u16, headers: &[(String, Vec<u8>)]) -> Option<BodyFraming> {
    if (100..200).contains(&status) || status == 204 || status == 304 {
        return None;
    }
    if is_chunked(headers) {
        return Some(BodyFraming::Chunked(ChunkPhase::Size));
    }
    match content_length(headers) {
        Some(0) => None,
        Some(n) => Some(BodyFraming::Length(n)),
        None => Some(BodyFraming::UntilClose),
    }
}
