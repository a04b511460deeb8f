//! HTTP/1.1 request handling for Liso
//!
//! This module turns bytes buffered by the [`crate::net`] layer into
//! requests and writes responses back through the same buffers.
//!
//! # Architecture
//!
//! - [`RequestParser`] is re-entered on every readiness event and picks up
//!   exactly where it stopped: request line, headers, or body
//! - [`handler`] resolves the target file and emits the response head; a
//!   GET body is streamed by a [`crate::net::FileStreamPipe`]
//! - [`Connection`] ties one socket, its two buffers, the parser and an
//!   optional pipe together, and is what the event loop drives
//!
//! Parse and handler failures become HTTP error responses after which the
//! connection closes; transport failures tear the connection down at once.

pub mod connection;
pub mod handler;
pub mod headers;
pub mod message;
pub mod mime;
pub mod parser;

pub use connection::{ConnStatus, Connection, Next};
pub use headers::Headers;
pub use message::{Method, Request, ResponseHead, Status, Version};
pub use mime::MimeTable;
pub use parser::{ParseState, RequestParser};

/// Result type for HTTP operations
pub type Result<T> = std::result::Result<T, Error>;

/// HTTP operation errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Socket or file failure; no response can be sent
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Method not allowed: {0}")]
    MethodNotAllowed(String),

    #[error("HTTP version not supported: {0}")]
    VersionNotSupported(String),

    #[error("Content-Length required")]
    LengthRequired,

    #[error("Invalid Content-Length: {0}")]
    InvalidLength(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Cannot access resource: {0}")]
    ResourceAccess(String),

    #[error("Not implemented: {0}")]
    NotImplemented(String),
}

impl Error {
    /// Status to answer the client with, or `None` for transport errors
    pub fn status(&self) -> Option<Status> {
        match self {
            Error::Io(_) => None,
            Error::BadRequest(_) | Error::InvalidLength(_) => Some(Status::BAD_REQUEST),
            Error::MethodNotAllowed(_) => Some(Status::METHOD_NOT_ALLOWED),
            Error::VersionNotSupported(_) => Some(Status::HTTP_VERSION_NOT_SUPPORTED),
            Error::LengthRequired => Some(Status::LENGTH_REQUIRED),
            Error::NotFound(_) => Some(Status::NOT_FOUND),
            Error::ResourceAccess(_) => Some(Status::INTERNAL_SERVER_ERROR),
            Error::NotImplemented(_) => Some(Status::NOT_IMPLEMENTED),
        }
    }
}

/// Maximum number of headers per request
pub const MAX_HEADERS: usize = 64;

/// Longest request or header line accepted, terminator excluded
pub const MAX_LINE: usize = 8192;

/// CRLF line ending
pub const CRLF: &str = "\r\n";
