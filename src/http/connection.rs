//! Per-connection state machine
//!
//! The event loop owns one [`Connection`] per accepted socket and calls
//! [`Connection::on_readable`] / [`Connection::on_writable`] whenever the
//! registry reports the socket ready. Neither call blocks.
//!
//! ```text
//!        ┌──────────┐  request complete   ┌──────────┐
//!   ───▶ │   Idle   │ ──────────────────▶ │  Piping  │  (GET)
//!        └──────────┘ ◀────────────────── └──────────┘
//!          │    ▲          pipe done
//!    POST  │    │ body complete
//!          ▼    │
//!        ┌──────────────┐
//!        │ AwaitingBody │
//!        └──────────────┘
//! ```
//!
//! Exactly one request is handled at a time: nothing is parsed while a
//! pipe is active, so responses go out in request order.

use super::handler::{self, error_response};
use super::{Error, ParseState, Request, RequestParser};
use crate::config::Config;
use crate::net::{FileStreamPipe, GrowBuffer, PipeStatus, RecvStatus};
use std::io::{Read, Write};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Lifecycle status of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnStatus {
    /// Between requests, or reading a request line and headers
    Idle,
    /// Headers parsed, body not complete yet
    AwaitingBody,
    /// Streaming a response body
    Piping,
}

/// What the event loop should do with the connection after an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Next {
    Continue,
    Close,
}

/// One client connection
pub struct Connection<S> {
    stream: S,
    config: Arc<Config>,
    input: GrowBuffer,
    output: GrowBuffer,
    parser: RequestParser,
    pipe: Option<FileStreamPipe>,
    /// Close once all pending output is flushed
    closing: bool,
    /// Close immediately
    broken: bool,
}

impl<S: Read + Write> Connection<S> {
    pub fn new(stream: S, config: Arc<Config>) -> Self {
        let parser = RequestParser::new(config.http_version);
        Connection {
            stream,
            config,
            input: GrowBuffer::new(),
            output: GrowBuffer::new(),
            parser,
            pipe: None,
            closing: false,
            broken: false,
        }
    }

    pub fn stream(&self) -> &S {
        &self.stream
    }

    pub fn stream_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    pub fn status(&self) -> ConnStatus {
        if self.pipe.is_some() {
            ConnStatus::Piping
        } else if let ParseState::AwaitingBody(_) = self.parser.state() {
            ConnStatus::AwaitingBody
        } else {
            ConnStatus::Idle
        }
    }

    pub fn parse_state(&self) -> ParseState {
        self.parser.state()
    }

    pub fn is_closing(&self) -> bool {
        self.closing || self.broken
    }

    /// True while the connection accepts more request bytes
    ///
    /// Reading pauses during piping so no second request starts early.
    pub fn wants_read(&self) -> bool {
        !self.is_closing() && self.pipe.is_none()
    }

    /// True while there is response data waiting for the socket
    pub fn wants_write(&self) -> bool {
        !self.broken && (!self.output.is_empty() || self.pipe.is_some())
    }

    /// Pull in everything the socket has and handle complete requests
    pub fn on_readable(&mut self) -> Next {
        match self.input.recv(&mut self.stream) {
            Ok(RecvStatus::Closed) => return Next::Close,
            Ok(RecvStatus::Received(_)) | Ok(RecvStatus::WouldBlock) => {}
            Err(e) => {
                error!("recv failed: {}", e);
                return Next::Close;
            }
        }

        self.process();
        self.next()
    }

    /// Flush buffered response bytes, then advance the pipe by one step
    pub fn on_writable(&mut self) -> Next {
        if let Err(e) = self.output.send(&mut self.stream) {
            error!("send failed: {}", e);
            return Next::Close;
        }

        if self.output.is_empty() {
            if let Some(pipe) = self.pipe.as_mut() {
                match pipe.step(&mut self.stream) {
                    Ok(PipeStatus::Continue) => {}
                    Ok(PipeStatus::Done) => {
                        debug!("response body sent");
                        self.pipe = None;
                        // Requests that arrived while piping
                        self.process();
                    }
                    Err(e) => {
                        error!("pipe failed: {}", e);
                        return Next::Close;
                    }
                }
            }
        }

        self.next()
    }

    fn next(&self) -> Next {
        if self.broken || (self.closing && !self.wants_write()) {
            Next::Close
        } else {
            Next::Continue
        }
    }

    /// Parse and dispatch buffered requests, one at a time
    fn process(&mut self) {
        while !self.is_closing() && self.pipe.is_none() {
            match self.parser.parse(&mut self.input) {
                Ok(Some(request)) => self.dispatch(request),
                Ok(None) => break,
                Err(e) => self.fail(e),
            }
        }
        self.input.shrink_if_idle();
    }

    fn dispatch(&mut self, request: Request) {
        match handler::handle(&request, &self.config, &mut self.output) {
            Ok(pipe) => {
                self.pipe = pipe;
                if request.wants_close() {
                    debug!("client asked to close");
                    self.closing = true;
                }
            }
            Err(e) => self.fail(e),
        }
    }

    /// Answer with an error status and close, or drop the connection
    fn fail(&mut self, err: Error) {
        self.parser.reset();
        self.closing = true;

        let Some(status) = err.status() else {
            error!("transport error: {}", err);
            self.broken = true;
            return;
        };

        warn!(status = status.code(), "{}", err);
        if let Err(e) = error_response(&self.config, status).write_to(&mut self.output) {
            error!("cannot queue error response: {}", e);
            self.broken = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::testing::{MockStream, Step};
    use std::fs;
    use tempfile::TempDir;

    fn setup(steps: Vec<Step>) -> (TempDir, Connection<MockStream>) {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("index.html"), b"<p>hi</p>").unwrap();
        fs::write(dir.path().join("big.bin"), vec![b'b'; 30_000]).unwrap();
        let config = Arc::new(Config::new(dir.path()));
        (dir, Connection::new(MockStream::new(steps), config))
    }

    fn data(bytes: &[u8]) -> Step {
        Step::Data(bytes.to_vec())
    }

    /// Call on_writable until there is nothing left to write
    fn drain(conn: &mut Connection<MockStream>) -> Next {
        for _ in 0..1000 {
            let next = conn.on_writable();
            if next == Next::Close || !conn.wants_write() {
                return next;
            }
        }
        panic!("connection never drained");
    }

    fn output_text(conn: &mut Connection<MockStream>) -> String {
        String::from_utf8(conn.stream_mut().take_output()).unwrap()
    }

    #[test]
    fn test_get_then_keep_alive() {
        let (_dir, mut conn) = setup(vec![data(b"GET /index.html HTTP/1.1\r\n\r\n")]);

        assert_eq!(conn.on_readable(), Next::Continue);
        assert_eq!(conn.status(), ConnStatus::Piping);
        assert!(!conn.wants_read());

        assert_eq!(drain(&mut conn), Next::Continue);
        let out = output_text(&mut conn);
        assert!(out.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(out.contains("Connection: keep-alive\r\n"));
        assert!(out.ends_with("\r\n\r\n<p>hi</p>"));

        assert_eq!(conn.status(), ConnStatus::Idle);
        assert_eq!(conn.parse_state(), ParseState::NoRequest);
        assert!(conn.wants_read());

        conn.stream_mut().push(data(b"HEAD / HTTP/1.1\r\n\r\n"));
        assert_eq!(conn.on_readable(), Next::Continue);
        assert_eq!(drain(&mut conn), Next::Continue);
        let out = output_text(&mut conn);
        assert!(out.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(out.contains("Content-Length: 9\r\n"));
        assert!(out.ends_with("\r\n\r\n"));
    }

    #[test]
    fn test_connection_close_after_body() {
        let (_dir, mut conn) = setup(vec![data(
            b"GET /big.bin HTTP/1.1\r\nConnection: close\r\n\r\n",
        )]);

        assert_eq!(conn.on_readable(), Next::Continue);
        assert!(conn.is_closing());
        assert_eq!(drain(&mut conn), Next::Close);

        let out = conn.stream_mut().take_output();
        let split = out.windows(4).position(|w| w == b"\r\n\r\n").unwrap();
        assert_eq!(out.len() - split - 4, 30_000);
    }

    #[test]
    fn test_missing_file_is_404_and_closes() {
        let (_dir, mut conn) = setup(vec![data(b"GET /missing.html HTTP/1.1\r\n\r\n")]);

        assert_eq!(conn.on_readable(), Next::Continue);
        assert_ne!(conn.status(), ConnStatus::Piping);
        assert_eq!(drain(&mut conn), Next::Close);
        assert!(output_text(&mut conn).starts_with("HTTP/1.1 404 Not Found\r\n"));
    }

    #[test]
    fn test_post_waits_for_body_then_501() {
        let (_dir, mut conn) = setup(vec![data(
            b"POST /cgi HTTP/1.1\r\nContent-Length: 5\r\n\r\nabc",
        )]);

        assert_eq!(conn.on_readable(), Next::Continue);
        assert_eq!(conn.status(), ConnStatus::AwaitingBody);
        assert_eq!(conn.parse_state(), ParseState::AwaitingBody(5));
        assert!(!conn.wants_write());

        conn.stream_mut().push(data(b"de"));
        assert_eq!(conn.on_readable(), Next::Continue);
        assert_eq!(drain(&mut conn), Next::Close);
        assert!(output_text(&mut conn).starts_with("HTTP/1.1 501 Not Implemented\r\n"));
    }

    #[test]
    fn test_fragmented_request() {
        let (_dir, mut conn) = setup(vec![]);
        let wire = b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n";

        for byte in wire.iter() {
            assert_eq!(conn.status(), ConnStatus::Idle);
            conn.stream_mut().push(Step::Data(vec![*byte]));
            assert_eq!(conn.on_readable(), Next::Continue);
        }
        assert_eq!(conn.status(), ConnStatus::Piping);
        drain(&mut conn);
        assert!(output_text(&mut conn).ends_with("<p>hi</p>"));
    }

    #[test]
    fn test_pipelined_requests_answered_in_order() {
        let (_dir, mut conn) = setup(vec![data(
            b"GET /index.html HTTP/1.1\r\n\r\nGET /nope HTTP/1.1\r\n\r\n",
        )]);

        assert_eq!(conn.on_readable(), Next::Continue);
        assert_eq!(conn.status(), ConnStatus::Piping);
        assert_eq!(drain(&mut conn), Next::Close);

        let out = output_text(&mut conn);
        let ok = out.find("200 OK").unwrap();
        let body = out.find("<p>hi</p>").unwrap();
        let missing = out.find("404 Not Found").unwrap();
        assert!(ok < body && body < missing);
    }

    #[test]
    fn test_bad_request_line() {
        let (_dir, mut conn) = setup(vec![data(b"GET /x\r\n")]);

        assert_eq!(conn.on_readable(), Next::Continue);
        assert!(!conn.wants_read());
        assert_eq!(drain(&mut conn), Next::Close);
        let out = output_text(&mut conn);
        assert!(out.starts_with("HTTP/1.1 400 Bad Request\r\n"));
        assert!(out.contains("Connection: close\r\n"));
    }

    #[test]
    fn test_unsupported_method_and_version() {
        let (_dir, mut conn) = setup(vec![data(b"DELETE / HTTP/1.1\r\n")]);
        conn.on_readable();
        drain(&mut conn);
        assert!(output_text(&mut conn).starts_with("HTTP/1.1 405 Method Not Allowed\r\n"));

        let (_dir, mut conn) = setup(vec![data(b"GET / HTTP/1.0\r\n")]);
        conn.on_readable();
        drain(&mut conn);
        assert!(output_text(&mut conn).starts_with("HTTP/1.1 505 HTTP Version Not Supported\r\n"));
    }

    #[test]
    fn test_post_without_length() {
        let (_dir, mut conn) = setup(vec![data(b"POST / HTTP/1.1\r\n\r\n")]);
        conn.on_readable();
        drain(&mut conn);
        assert!(output_text(&mut conn).starts_with("HTTP/1.1 411 Length Required\r\n"));
    }

    #[test]
    fn test_peer_close() {
        let (_dir, mut conn) = setup(vec![Step::Eof]);
        assert_eq!(conn.on_readable(), Next::Close);
    }

    #[test]
    fn test_recv_error_closes() {
        let (_dir, mut conn) = setup(vec![Step::Fail(std::io::ErrorKind::ConnectionReset)]);
        assert_eq!(conn.on_readable(), Next::Close);
    }

    #[test]
    fn test_slow_socket_keeps_piping() {
        let (_dir, mut conn) = setup(vec![data(b"GET /big.bin HTTP/1.1\r\n\r\n")]);
        conn.on_readable();

        *conn.stream_mut() = MockStream::new(vec![]).with_write_budget(100);
        assert_eq!(conn.on_writable(), Next::Continue);
        assert_eq!(conn.status(), ConnStatus::Piping);
        assert!(conn.wants_write());

        conn.stream_mut().add_write_budget(usize::MAX / 2);
        assert_eq!(drain(&mut conn), Next::Continue);
        assert_eq!(conn.status(), ConnStatus::Idle);
    }
}
