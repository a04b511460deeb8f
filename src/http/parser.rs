//! Incremental HTTP request parsing
//!
//! [`RequestParser::parse`] is called every time new bytes land in a
//! connection's input buffer. It consumes whole lines only, so a request
//! split into arbitrarily small fragments parses exactly like one that
//! arrived in a single read. Partial progress lives in the parser state:
//!
//! ```text
//!   NoRequest --request line--> ParsingHeaders --blank line--> complete (GET, HEAD)
//!                                    |
//!                                    +--blank line, POST--> AwaitingBody(n) --n bytes--> complete
//! ```

use super::headers::trim_spaces;
use super::{Error, Headers, Method, Request, Result, Version, MAX_LINE};
use crate::net::GrowBuffer;
use bytes::Bytes;
use tracing::debug;

/// Where the parser is within the current request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseState {
    /// No request in flight; the next line is a request line
    NoRequest,
    /// Request line accepted, reading header lines
    ParsingHeaders,
    /// Headers done, waiting for this many body bytes
    AwaitingBody(usize),
}

#[derive(Debug)]
enum State {
    NoRequest,
    Headers(Request),
    Body(Request, usize),
}

/// HTTP request parser for one connection
#[derive(Debug)]
pub struct RequestParser {
    state: State,
    version: Version,
}

impl RequestParser {
    /// Create a parser accepting requests of the given version only
    pub fn new(version: Version) -> Self {
        RequestParser {
            state: State::NoRequest,
            version,
        }
    }

    pub fn state(&self) -> ParseState {
        match &self.state {
            State::NoRequest => ParseState::NoRequest,
            State::Headers(_) => ParseState::ParsingHeaders,
            State::Body(_, n) => ParseState::AwaitingBody(*n),
        }
    }

    /// The request being parsed, if any
    pub fn in_flight(&self) -> Option<&Request> {
        match &self.state {
            State::NoRequest => None,
            State::Headers(req) | State::Body(req, _) => Some(req),
        }
    }

    /// Drop any partial request
    pub fn reset(&mut self) {
        self.state = State::NoRequest;
    }

    /// Consume what `buf` holds and return a request once one is complete
    ///
    /// Returns `Ok(None)` when more bytes are needed; the partial request is
    /// kept for the next call. Bytes after a complete request stay in
    /// `buf`. After an error the parser is back at [`ParseState::NoRequest`].
    pub fn parse(&mut self, buf: &mut GrowBuffer) -> Result<Option<Request>> {
        loop {
            match std::mem::replace(&mut self.state, State::NoRequest) {
                State::NoRequest => {
                    let Some(line) = take_line(buf)? else {
                        return Ok(None);
                    };
                    // Only a truly empty line is skipped here
                    if line.is_empty() {
                        continue;
                    }

                    debug!("request line: {}", line);
                    let request = self.parse_request_line(&line)?;
                    self.state = State::Headers(request);
                }

                State::Headers(mut request) => {
                    let Some(line) = take_line(buf)? else {
                        self.state = State::Headers(request);
                        return Ok(None);
                    };

                    if !trim_spaces(&line).is_empty() {
                        debug!("header: {}", line);
                        let (name, value) = Headers::parse_header_line(&line)?;
                        request.headers_mut().insert(name, value)?;
                        self.state = State::Headers(request);
                        continue;
                    }

                    match request.method() {
                        Method::Get | Method::Head => return Ok(Some(request)),
                        Method::Post => {
                            let length = content_length(&request)?;
                            if length == 0 {
                                return Ok(Some(request));
                            }
                            self.state = State::Body(request, length);
                        }
                    }
                }

                State::Body(mut request, length) => {
                    if buf.len() < length {
                        self.state = State::Body(request, length);
                        return Ok(None);
                    }

                    request.set_body(Bytes::copy_from_slice(&buf.unread()[..length]));
                    buf.consume(length);
                    return Ok(Some(request));
                }
            }
        }
    }

    /// Parse `METHOD URI VERSION`; tokens beyond the third are ignored
    fn parse_request_line(&self, line: &str) -> Result<Request> {
        let mut parts = line.split_whitespace();

        let (Some(method), Some(uri), Some(version)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(Error::BadRequest(format!("bad request line: {}", line)));
        };

        let method = Method::from_str(method)?;
        match Version::from_str(version) {
            Ok(v) if v == self.version => Ok(Request::new(method, uri, v)),
            _ => Err(Error::VersionNotSupported(version.to_string())),
        }
    }
}

/// Take one LF- or CRLF-terminated line off the front of `buf`
fn take_line(buf: &mut GrowBuffer) -> Result<Option<String>> {
    let unread = buf.unread();

    let Some(end) = unread.iter().position(|&b| b == b'\n') else {
        if unread.len() > MAX_LINE {
            return Err(Error::BadRequest("line too long".to_string()));
        }
        return Ok(None);
    };

    let line = unread[..end].strip_suffix(b"\r").unwrap_or(&unread[..end]);
    if line.len() > MAX_LINE {
        return Err(Error::BadRequest("line too long".to_string()));
    }

    let line = String::from_utf8_lossy(line).into_owned();
    buf.consume(end + 1);
    Ok(Some(line))
}

/// Body size of a POST: `Content-Length` must be present and all digits
fn content_length(request: &Request) -> Result<usize> {
    let value = request
        .headers()
        .get("Content-Length")
        .ok_or(Error::LengthRequired)?;

    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::InvalidLength(value.to_string()));
    }
    value
        .parse()
        .map_err(|_| Error::InvalidLength(value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(parser: &mut RequestParser, buf: &mut GrowBuffer, data: &[u8]) -> Result<Option<Request>> {
        buf.append(data);
        parser.parse(buf)
    }

    fn parse_whole(data: &[u8]) -> Result<Option<Request>> {
        let mut parser = RequestParser::new(Version::Http11);
        let mut buf = GrowBuffer::new();
        feed(&mut parser, &mut buf, data)
    }

    #[test]
    fn test_simple_get() {
        let req = parse_whole(b"GET /index.html HTTP/1.1\r\nHost: localhost\r\n\r\n")
            .unwrap()
            .unwrap();

        assert_eq!(req.method(), Method::Get);
        assert_eq!(req.uri(), "/index.html");
        assert_eq!(req.version(), Version::Http11);
        assert_eq!(req.headers().get("Host"), Some("localhost"));
        assert!(req.body().is_empty());
    }

    #[test]
    fn test_lf_only_line_endings() {
        let req = parse_whole(b"HEAD / HTTP/1.1\nAccept: */*\n\n").unwrap().unwrap();
        assert_eq!(req.method(), Method::Head);
        assert_eq!(req.headers().get("Accept"), Some("*/*"));
    }

    #[test]
    fn test_request_line_whitespace_runs_collapse() {
        let req = parse_whole(b"GET    /a    HTTP/1.1\r\n\r\n").unwrap().unwrap();
        assert_eq!(req.uri(), "/a");
    }

    #[test]
    fn test_request_line_too_few_tokens() {
        assert!(matches!(
            parse_whole(b"GET /x\r\n\r\n"),
            Err(Error::BadRequest(_))
        ));
    }

    #[test]
    fn test_method_not_allowed() {
        assert!(matches!(
            parse_whole(b"PUT /x HTTP/1.1\r\n\r\n"),
            Err(Error::MethodNotAllowed(_))
        ));
    }

    #[test]
    fn test_version_not_supported() {
        assert!(matches!(
            parse_whole(b"GET / HTTP/1.0\r\n\r\n"),
            Err(Error::VersionNotSupported(v)) if v == "HTTP/1.0"
        ));
        assert!(matches!(
            parse_whole(b"GET / HTTP/2\r\n\r\n"),
            Err(Error::VersionNotSupported(_))
        ));
        // Case-insensitive match of the supported version
        assert!(parse_whole(b"get / http/1.1\r\n\r\n").unwrap().is_some());
    }

    #[test]
    fn test_bad_header_rejected() {
        assert!(matches!(
            parse_whole(b"GET / HTTP/1.1\r\n: 10\r\n\r\n"),
            Err(Error::BadRequest(_))
        ));
        assert!(matches!(
            parse_whole(b"GET / HTTP/1.1\r\nX:\r\n\r\n"),
            Err(Error::BadRequest(_))
        ));
        assert!(matches!(
            parse_whole(b"GET / HTTP/1.1\r\nNoColon\r\n\r\n"),
            Err(Error::BadRequest(_))
        ));
    }

    #[test]
    fn test_space_only_line_ends_headers() {
        let mut parser = RequestParser::new(Version::Http11);
        let mut buf = GrowBuffer::new();

        let req = feed(&mut parser, &mut buf, b"GET / HTTP/1.1\r\nA: 1\r\n   \r\nB: 2\r\n")
            .unwrap()
            .unwrap();
        assert_eq!(req.headers().len(), 1);
        assert_eq!(buf.unread(), b"B: 2\r\n");
    }

    #[test]
    fn test_leading_blank_lines_skipped() {
        let req = parse_whole(b"\r\n\r\nGET / HTTP/1.1\r\n\r\n").unwrap().unwrap();
        assert_eq!(req.uri(), "/");
    }

    #[test]
    fn test_space_only_request_line_rejected() {
        assert!(matches!(
            parse_whole(b"   \r\nGET / HTTP/1.1\r\n\r\n"),
            Err(Error::BadRequest(_))
        ));
    }

    #[test]
    fn test_incremental_states() {
        let mut parser = RequestParser::new(Version::Http11);
        let mut buf = GrowBuffer::new();
        assert_eq!(parser.state(), ParseState::NoRequest);

        assert!(feed(&mut parser, &mut buf, b"GET / HT").unwrap().is_none());
        assert_eq!(parser.state(), ParseState::NoRequest);

        assert!(feed(&mut parser, &mut buf, b"TP/1.1\r\nHost: a").unwrap().is_none());
        assert_eq!(parser.state(), ParseState::ParsingHeaders);
        assert_eq!(parser.in_flight().map(|r| r.uri()), Some("/"));

        assert!(feed(&mut parser, &mut buf, b"\r\n").unwrap().is_none());
        let req = feed(&mut parser, &mut buf, b"\r\n").unwrap().unwrap();
        assert_eq!(req.headers().get("Host"), Some("a"));
        assert_eq!(parser.state(), ParseState::NoRequest);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_fragmentation_invariance() {
        let wire: &[u8] =
            b"POST /form HTTP/1.1\r\nHost: example.com\r\nContent-Length: 11\r\nX-A:  b \r\n\r\nhello world";
        let whole = parse_whole(wire).unwrap().unwrap();

        for chunk in [1, 2, 3, 7, 16] {
            let mut parser = RequestParser::new(Version::Http11);
            let mut buf = GrowBuffer::with_capacity(8);
            let mut parsed = None;

            for piece in wire.chunks(chunk) {
                if let Some(req) = feed(&mut parser, &mut buf, piece).unwrap() {
                    assert!(parsed.is_none(), "request completed twice");
                    parsed = Some(req);
                }
            }
            assert_eq!(parsed.as_ref(), Some(&whole), "chunk size {}", chunk);
        }
    }

    #[test]
    fn test_post_waits_for_body() {
        let mut parser = RequestParser::new(Version::Http11);
        let mut buf = GrowBuffer::new();

        let head = b"POST /cgi HTTP/1.1\r\nContent-Length: 5\r\n\r\n";
        assert!(feed(&mut parser, &mut buf, head).unwrap().is_none());
        assert_eq!(parser.state(), ParseState::AwaitingBody(5));

        assert!(feed(&mut parser, &mut buf, b"abc").unwrap().is_none());
        assert_eq!(parser.state(), ParseState::AwaitingBody(5));

        let req = feed(&mut parser, &mut buf, b"deGET").unwrap().unwrap();
        assert_eq!(&req.body()[..], b"abcde");
        // Bytes past the body belong to the next request
        assert_eq!(buf.unread(), b"GET");
        assert_eq!(parser.state(), ParseState::NoRequest);
    }

    #[test]
    fn test_post_body_survives_buffer_shrink() {
        let mut parser = RequestParser::new(Version::Http11);
        let mut buf = GrowBuffer::with_capacity(16);

        let wire = b"POST / HTTP/1.1\r\nContent-Length: 4\r\n\r\nbody";
        let req = feed(&mut parser, &mut buf, wire).unwrap().unwrap();
        buf.shrink_if_idle();
        buf.append(b"overwrite the old bytes");
        assert_eq!(&req.body()[..], b"body");
    }

    #[test]
    fn test_post_length_checks() {
        assert!(matches!(
            parse_whole(b"POST / HTTP/1.1\r\n\r\n"),
            Err(Error::LengthRequired)
        ));
        assert!(matches!(
            parse_whole(b"POST / HTTP/1.1\r\nContent-Length: 1x\r\n\r\n"),
            Err(Error::InvalidLength(_))
        ));
        assert!(matches!(
            parse_whole(b"POST / HTTP/1.1\r\nContent-Length: -1\r\n\r\n"),
            Err(Error::InvalidLength(_))
        ));
        assert!(matches!(
            parse_whole(b"POST / HTTP/1.1\r\nContent-Length: 99999999999999999999999\r\n\r\n"),
            Err(Error::InvalidLength(_))
        ));
    }

    #[test]
    fn test_post_length_header_name_is_exact() {
        assert!(matches!(
            parse_whole(b"POST / HTTP/1.1\r\ncontent-length: 5\r\n\r\nhello"),
            Err(Error::LengthRequired)
        ));
    }

    #[test]
    fn test_post_zero_length_completes() {
        let req = parse_whole(b"POST / HTTP/1.1\r\nContent-Length: 0\r\n\r\n")
            .unwrap()
            .unwrap();
        assert_eq!(req.method(), Method::Post);
        assert!(req.body().is_empty());
    }

    #[test]
    fn test_line_too_long() {
        let mut line = b"GET /".to_vec();
        line.extend(std::iter::repeat(b'a').take(MAX_LINE + 1));
        assert!(matches!(parse_whole(&line), Err(Error::BadRequest(_))));
    }

    #[test]
    fn test_back_to_back_requests() {
        let mut parser = RequestParser::new(Version::Http11);
        let mut buf = GrowBuffer::new();

        let first = feed(
            &mut parser,
            &mut buf,
            b"GET /a HTTP/1.1\r\n\r\nGET /b HTTP/1.1\r\n\r\n",
        )
        .unwrap()
        .unwrap();
        assert_eq!(first.uri(), "/a");

        let second = parser.parse(&mut buf).unwrap().unwrap();
        assert_eq!(second.uri(), "/b");
        assert!(parser.parse(&mut buf).unwrap().is_none());
    }
}
