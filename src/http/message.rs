//! HTTP message types
//!
//! This module defines the request produced by the parser and the
//! response head the handlers emit.

use super::{Error, Headers, Result, CRLF};
use bytes::Bytes;
use std::fmt;
use std::io::{self, Write};

/// HTTP methods the server accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Head,
    Post,
}

impl Method {
    /// Parse method from string, ignoring ASCII case
    ///
    /// Anything other than GET, HEAD or POST is not allowed.
    pub fn from_str(s: &str) -> Result<Self> {
        if s.eq_ignore_ascii_case("GET") {
            Ok(Method::Get)
        } else if s.eq_ignore_ascii_case("HEAD") {
            Ok(Method::Head)
        } else if s.eq_ignore_ascii_case("POST") {
            Ok(Method::Post)
        } else {
            Err(Error::MethodNotAllowed(s.to_string()))
        }
    }

    /// Convert method to string
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// HTTP version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Version {
    Http10,
    #[default]
    Http11,
}

impl Version {
    /// Parse version from string, ignoring ASCII case
    pub fn from_str(s: &str) -> Result<Self> {
        if s.eq_ignore_ascii_case("HTTP/1.0") {
            Ok(Version::Http10)
        } else if s.eq_ignore_ascii_case("HTTP/1.1") {
            Ok(Version::Http11)
        } else {
            Err(Error::VersionNotSupported(s.to_string()))
        }
    }

    /// Convert version to string
    pub fn as_str(&self) -> &'static str {
        match self {
            Version::Http10 => "HTTP/1.0",
            Version::Http11 => "HTTP/1.1",
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// HTTP status code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Status {
    code: u16,
}

impl Status {
    pub const OK: Status = Status { code: 200 };
    pub const BAD_REQUEST: Status = Status { code: 400 };
    pub const NOT_FOUND: Status = Status { code: 404 };
    pub const METHOD_NOT_ALLOWED: Status = Status { code: 405 };
    pub const LENGTH_REQUIRED: Status = Status { code: 411 };
    pub const INTERNAL_SERVER_ERROR: Status = Status { code: 500 };
    pub const NOT_IMPLEMENTED: Status = Status { code: 501 };
    pub const HTTP_VERSION_NOT_SUPPORTED: Status = Status { code: 505 };

    /// Get the status code
    pub fn code(&self) -> u16 {
        self.code
    }

    /// Get the canonical reason phrase for this status code
    pub fn reason_phrase(&self) -> &'static str {
        match self.code {
            200 => "OK",
            400 => "Bad Request",
            404 => "Not Found",
            405 => "Method Not Allowed",
            411 => "Length Required",
            500 => "Internal Server Error",
            501 => "Not Implemented",
            505 => "HTTP Version Not Supported",
            _ => "Unknown",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code, self.reason_phrase())
    }
}

/// A parsed HTTP request
///
/// The body is copied out of the connection's input buffer when the
/// request completes, so it stays valid however that buffer changes later.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    method: Method,
    uri: String,
    version: Version,
    headers: Headers,
    body: Bytes,
}

impl Request {
    pub fn new(method: Method, uri: impl Into<String>, version: Version) -> Self {
        Request {
            method,
            uri: uri.into(),
            version,
            headers: Headers::new(),
            body: Bytes::new(),
        }
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn set_body(&mut self, body: Bytes) {
        self.body = body;
    }

    /// True if the client asked for `Connection: close`
    ///
    /// The one header matched without regard to case, name and value both.
    pub fn wants_close(&self) -> bool {
        self.headers.iter().any(|(name, value)| {
            name.eq_ignore_ascii_case("Connection") && value.eq_ignore_ascii_case("close")
        })
    }
}

/// Status line and headers of a response
#[derive(Debug, Clone)]
pub struct ResponseHead {
    version: Version,
    status: Status,
    headers: Vec<(String, String)>,
}

impl ResponseHead {
    pub fn new(version: Version, status: Status) -> Self {
        ResponseHead {
            version,
            status,
            headers: Vec::new(),
        }
    }

    /// Add a header, in emission order
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Write the status line, headers and the blank line
    pub fn write_to<W: Write + ?Sized>(&self, out: &mut W) -> io::Result<()> {
        write!(out, "{} {}{}", self.version, self.status, CRLF)?;
        for (name, value) in &self.headers {
            write!(out, "{}: {}{}", name, value, CRLF)?;
        }
        out.write_all(CRLF.as_bytes())
    }
}
