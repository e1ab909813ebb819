//! Per-session HTTP exchange reconstruction.
//!
//! Consumes tracker session events, runs one [`MessageDecoder`] per
//! direction, and rebuilds the raw request/response byte representations.
//! When a response completes and its matching request is present, the pair
//! is emitted as an [`Exchange`].

use std::collections::HashMap;

use bytes::{BufMut, Bytes, BytesMut};
use tracing::{debug, trace};

use super::decoder::{HttpEvent, MessageDecoder, Role};
use crate::track::{SessionEvent, SessionId};

/// One reconstructed request paired with its response, as raw bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exchange {
    pub request: Bytes,
    pub response: Bytes,
}

/// Receives completed exchanges from the reconstructor.
pub trait ExchangeSink {
    fn on_exchange(&mut self, exchange: Exchange);
}

/// Collecting sink for tests and batch callers.
impl ExchangeSink for Vec<Exchange> {
    fn on_exchange(&mut self, exchange: Exchange) {
        self.push(exchange);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Active,
    /// The session's first request was CONNECT: traffic past this point may
    /// be encrypted, so the session is opaque from here on. Terminal.
    Tunnel,
}

struct Session {
    state: SessionState,
    request_decoder: MessageDecoder,
    response_decoder: MessageDecoder,
    request: Option<BytesMut>,
    response: Option<BytesMut>,
}

impl Session {
    fn new() -> Self {
        Self {
            state: SessionState::Active,
            request_decoder: MessageDecoder::new(Role::Request),
            response_decoder: MessageDecoder::new(Role::Response),
            request: None,
            response: None,
        }
    }
}

/// Rebuilds HTTP exchanges for every tracked session.
///
/// Construct exactly one per run and drive it from the capture loop.
#[derive(Default)]
pub struct HttpReconstructor {
    sessions: HashMap<SessionId, Session>,
}

impl HttpReconstructor {
    pub fn new() -> Self {
        Self {
            sessions: HashMap::new(),
        }
    }

    /// Number of sessions currently being reconstructed.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Process one session event, emitting any completed exchanges to `out`.
    pub fn handle(&mut self, event: SessionEvent<'_>, out: &mut impl ExchangeSink) {
        match event {
            SessionEvent::Established { id } => {
                trace!(session = id, "session established");
                self.sessions.insert(id, Session::new());
            }
            SessionEvent::DataSend { id, bytes } => {
                let Some(session) = self.sessions.get_mut(&id) else {
                    return;
                };
                if session.state == SessionState::Tunnel {
                    return;
                }
                let mut events = Vec::new();
                session.request_decoder.push(bytes, &mut events);
                for http_event in events {
                    if !apply_request_event(id, session, http_event) {
                        break;
                    }
                }
            }
            SessionEvent::DataRecv { id, bytes } => {
                let Some(session) = self.sessions.get_mut(&id) else {
                    return;
                };
                if session.state == SessionState::Tunnel {
                    return;
                }
                let mut events = Vec::new();
                session.response_decoder.push(bytes, &mut events);
                for http_event in events {
                    apply_response_event(id, session, http_event, out);
                }
            }
            SessionEvent::Closed { id } => {
                trace!(session = id, "session closed");
                self.sessions.remove(&id);
            }
        }
    }
}

/// Apply one request-side event. Returns false once the session turns into a
/// tunnel, so remaining events for the same push are discarded.
fn apply_request_event(id: SessionId, session: &mut Session, event: HttpEvent) -> bool {
    match event {
        HttpEvent::RequestHead {
            method,
            target,
            version,
            headers,
        } => {
            if method == "CONNECT" {
                debug!(session = id, %target, "CONNECT tunnel, session now opaque");
                session.state = SessionState::Tunnel;
                session.request = None;
                session.response = None;
                return false;
            }
            session.request = Some(build_request_head(&method, &target, version, &headers));
        }
        HttpEvent::Body(bytes) => {
            if let Some(buf) = session.request.as_mut() {
                buf.put_slice(&bytes);
            }
        }
        HttpEvent::MessageComplete => {}
        HttpEvent::ResponseHead { .. } => {}
    }
    true
}

/// Apply one response-side event, emitting an exchange on completion.
fn apply_response_event(
    id: SessionId,
    session: &mut Session,
    event: HttpEvent,
    out: &mut impl ExchangeSink,
) {
    match event {
        HttpEvent::ResponseHead {
            version,
            status,
            reason,
            headers,
        } => {
            session.response = Some(build_response_head(version, status, &reason, &headers));
        }
        HttpEvent::Body(bytes) => {
            if let Some(buf) = session.response.as_mut() {
                buf.put_slice(&bytes);
            }
        }
        HttpEvent::MessageComplete => {
            let complete = matches!((&session.request, &session.response),
                (Some(req), Some(res)) if !req.is_empty() && !res.is_empty());
            if complete {
                // Both buffers reset here: each completed response pairs with
                // exactly one request, so the next exchange on this session
                // starts from scratch.
                let request = session.request.take().map(BytesMut::freeze);
                let response = session.response.take().map(BytesMut::freeze);
                if let (Some(request), Some(response)) = (request, response) {
                    trace!(
                        session = id,
                        request_len = request.len(),
                        response_len = response.len(),
                        "exchange complete"
                    );
                    out.on_exchange(Exchange { request, response });
                }
            }
        }
        HttpEvent::RequestHead { .. } => {}
    }
}

/// Rebuild a request head: request line, headers in wire order, blank line.
///
/// The head line renders the minor version on both sides of the dot; the
/// frame stream's consumers parse this exact rendering, so it stays as-is.
fn build_request_head(
    method: &str,
    target: &str,
    version: (u8, u8),
    headers: &[(String, Vec<u8>)],
) -> BytesMut {
    let (_, minor) = version;
    let mut head = BytesMut::new();
    head.put_slice(format!("{method} {target} HTTP/{minor}.{minor}\r\n").as_bytes());
    put_headers(&mut head, headers);
    head
}

/// Rebuild a response head with the same header-join rules as the request.
fn build_response_head(
    version: (u8, u8),
    status: u16,
    reason: &str,
    headers: &[(String, Vec<u8>)],
) -> BytesMut {
    let (_, minor) = version;
    let mut head = BytesMut::new();
    head.put_slice(format!("HTTP/{minor}.{minor} {status} {reason}\r\n").as_bytes());
    put_headers(&mut head, headers);
    head
}

fn put_headers(head: &mut BytesMut, headers: &[(String, Vec<u8>)]) {
    for (name, value) in headers {
        head.put_slice(name.as_bytes());
        head.put_slice(b": ");
        head.put_slice(value);
        head.put_slice(b"\r\n");
    }
    head.put_slice(b"\r\n");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn established(reconstructor: &mut HttpReconstructor, id: SessionId) -> Vec<Exchange> {
        let mut out = Vec::new();
        reconstructor.handle(SessionEvent::Established { id }, &mut out);
        out
    }

    fn send(reconstructor: &mut HttpReconstructor, id: SessionId, bytes: &[u8]) -> Vec<Exchange> {
        let mut out = Vec::new();
        reconstructor.handle(SessionEvent::DataSend { id, bytes }, &mut out);
        out
    }

    fn recv(reconstructor: &mut HttpReconstructor, id: SessionId, bytes: &[u8]) -> Vec<Exchange> {
        let mut out = Vec::new();
        reconstructor.handle(SessionEvent::DataRecv { id, bytes }, &mut out);
        out
    }

    #[test]
    fn test_header_join_fidelity() {
        let head = build_request_head(
            "GET",
            "/",
            (1, 1),
            &[
                ("Host".to_string(), b"example.com".to_vec()),
                ("X-Test".to_string(), b"1".to_vec()),
            ],
        );
        assert_eq!(
            &head[..],
            b"GET / HTTP/1.1\r\nHost: example.com\r\nX-Test: 1\r\n\r\n"
        );
    }

    #[test]
    fn test_version_renders_minor_twice() {
        let head = build_request_head("GET", "/", (2, 0), &[]);
        assert_eq!(&head[..], b"GET / HTTP/0.0\r\n\r\n");

        let head = build_response_head((2, 0), 200, "OK", &[]);
        assert_eq!(&head[..], b"HTTP/0.0 200 OK\r\n\r\n");
    }

    #[test]
    fn test_simple_exchange() {
        let mut reconstructor = HttpReconstructor::new();
        established(&mut reconstructor, 1);

        assert!(send(
            &mut reconstructor,
            1,
            b"GET /index.html HTTP/1.1\r\nHost: example.com\r\n\r\n"
        )
        .is_empty());

        let exchanges = recv(
            &mut reconstructor,
            1,
            b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello",
        );

        assert_eq!(exchanges.len(), 1);
        assert_eq!(
            &exchanges[0].request[..],
            b"GET /index.html HTTP/1.1\r\nHost: example.com\r\n\r\n"
        );
        assert_eq!(
            &exchanges[0].response[..],
            b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello"
        );
    }

    #[test]
    fn test_connect_makes_session_opaque() {
        let mut reconstructor = HttpReconstructor::new();
        established(&mut reconstructor, 1);

        assert!(send(
            &mut reconstructor,
            1,
            b"CONNECT example.com:443 HTTP/1.1\r\nHost: example.com:443\r\n\r\n"
        )
        .is_empty());

        // Whatever flows afterwards, even well-formed HTTP, emits nothing.
        assert!(recv(
            &mut reconstructor,
            1,
            b"HTTP/1.1 200 Connection Established\r\nContent-Length: 0\r\n\r\n"
        )
        .is_empty());
        assert!(send(&mut reconstructor, 1, b"GET / HTTP/1.1\r\nHost: x\r\n\r\n").is_empty());
        assert!(recv(
            &mut reconstructor,
            1,
            b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok"
        )
        .is_empty());
    }

    #[test]
    fn test_response_without_request_emits_nothing() {
        let mut reconstructor = HttpReconstructor::new();
        established(&mut reconstructor, 1);

        let exchanges = recv(
            &mut reconstructor,
            1,
            b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok",
        );
        assert!(exchanges.is_empty());
    }

    #[test]
    fn test_keepalive_emits_one_exchange_per_pair() {
        let mut reconstructor = HttpReconstructor::new();
        established(&mut reconstructor, 1);

        send(&mut reconstructor, 1, b"GET /one HTTP/1.1\r\nHost: a\r\n\r\n");
        let first = recv(
            &mut reconstructor,
            1,
            b"HTTP/1.1 200 OK\r\nContent-Length: 3\r\n\r\none",
        );
        assert_eq!(first.len(), 1);
        assert!(first[0].request.starts_with(b"GET /one "));
        assert!(first[0].response.ends_with(b"one"));

        send(&mut reconstructor, 1, b"GET /two HTTP/1.1\r\nHost: a\r\n\r\n");
        let second = recv(
            &mut reconstructor,
            1,
            b"HTTP/1.1 200 OK\r\nContent-Length: 3\r\n\r\ntwo",
        );
        assert_eq!(second.len(), 1);
        assert!(second[0].request.starts_with(b"GET /two "));
        assert!(!second[0].request.starts_with(b"GET /one "));
        assert!(second[0].response.ends_with(b"two"));
    }

    #[test]
    fn test_second_response_without_new_request_emits_nothing() {
        let mut reconstructor = HttpReconstructor::new();
        established(&mut reconstructor, 1);

        send(&mut reconstructor, 1, b"GET / HTTP/1.1\r\nHost: a\r\n\r\n");
        let first = recv(
            &mut reconstructor,
            1,
            b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok",
        );
        assert_eq!(first.len(), 1);

        // Request buffer was consumed by the first exchange.
        let second = recv(
            &mut reconstructor,
            1,
            b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok",
        );
        assert!(second.is_empty());
    }

    #[test]
    fn test_request_body_appended() {
        let mut reconstructor = HttpReconstructor::new();
        established(&mut reconstructor, 1);

        send(
            &mut reconstructor,
            1,
            b"POST /api HTTP/1.1\r\nContent-Length: 4\r\n\r\ndata",
        );
        let exchanges = recv(
            &mut reconstructor,
            1,
            b"HTTP/1.1 201 Created\r\nContent-Length: 0\r\n\r\n",
        );

        assert_eq!(exchanges.len(), 1);
        assert_eq!(
            &exchanges[0].request[..],
            b"POST /api HTTP/1.1\r\nContent-Length: 4\r\n\r\ndata"
        );
        assert_eq!(
            &exchanges[0].response[..],
            b"HTTP/1.1 201 Created\r\nContent-Length: 0\r\n\r\n"
        );
    }

    #[test]
    fn test_bytes_split_across_segments() {
        let mut reconstructor = HttpReconstructor::new();
        established(&mut reconstructor, 1);

        send(&mut reconstructor, 1, b"GET / HTTP/1.1\r\nHo");
        send(&mut reconstructor, 1, b"st: example.com\r\n\r\n");

        let mut exchanges = recv(&mut reconstructor, 1, b"HTTP/1.1 200 OK\r\nContent-Le");
        exchanges.extend(recv(&mut reconstructor, 1, b"ngth: 5\r\n\r\nhel"));
        exchanges.extend(recv(&mut reconstructor, 1, b"lo"));

        assert_eq!(exchanges.len(), 1);
        assert_eq!(
            &exchanges[0].request[..],
            b"GET / HTTP/1.1\r\nHost: example.com\r\n\r\n"
        );
        assert!(exchanges[0].response.ends_with(b"hello"));
    }

    #[test]
    fn test_closed_session_discards_state() {
        let mut reconstructor = HttpReconstructor::new();
        established(&mut reconstructor, 1);

        send(&mut reconstructor, 1, b"GET / HTTP/1.1\r\nHost: a\r\n\r\n");
        let mut out = Vec::new();
        reconstructor.handle(SessionEvent::Closed { id: 1 }, &mut out);
        assert!(out.is_empty());
        assert_eq!(reconstructor.session_count(), 0);

        // Data for a closed (or never-established) session is ignored.
        assert!(recv(
            &mut reconstructor,
            1,
            b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok"
        )
        .is_empty());
    }

    #[test]
    fn test_sessions_are_independent() {
        let mut reconstructor = HttpReconstructor::new();
        established(&mut reconstructor, 1);
        established(&mut reconstructor, 2);

        send(&mut reconstructor, 1, b"GET /a HTTP/1.1\r\nHost: a\r\n\r\n");
        send(&mut reconstructor, 2, b"CONNECT x:443 HTTP/1.1\r\n\r\n");

        // Session 2 is a tunnel; session 1 still reconstructs.
        let exchanges = recv(
            &mut reconstructor,
            1,
            b"HTTP/1.1 200 OK\r\nContent-Length: 1\r\n\r\na",
        );
        assert_eq!(exchanges.len(), 1);

        assert!(recv(
            &mut reconstructor,
            2,
            b"HTTP/1.1 200 OK\r\nContent-Length: 1\r\n\r\na"
        )
        .is_empty());
    }
}
