//! Request handlers
//!
//! Handlers write the response head into the connection's output buffer.
//! A GET hands back a [`FileStreamPipe`] over the opened file so the body
//! is streamed; HEAD closes the file straight away. POST is answered with
//! 501 since no CGI runs in this server.

use super::{Error, Method, Request, ResponseHead, Result, Status};
use crate::config::Config;
use crate::net::{FileStreamPipe, GrowBuffer};
use std::fs::{self, File};
use std::time::SystemTime;
use tracing::{info, warn};

/// An opened file ready to be served
#[derive(Debug)]
pub struct Resource {
    pub file: File,
    pub size: u64,
    pub mime: String,
    /// RFC 1123 date of the last modification
    pub last_modified: String,
}

/// Format a time as an RFC 1123 date, e.g. `Sun, 06 Nov 1994 08:49:37 GMT`
pub fn http_date(time: SystemTime) -> String {
    httpdate::fmt_http_date(time)
}

/// Map a request URI onto a file below the document root
///
/// A directory resolves to its `index.html`. The query string is ignored
/// and a `..` segment never resolves.
pub fn resolve(config: &Config, uri: &str) -> Result<Resource> {
    let root = config.www_folder.canonicalize().map_err(|e| {
        Error::ResourceAccess(format!(
            "document root {}: {}",
            config.www_folder.display(),
            e
        ))
    })?;

    let target = uri.split(['?', '#']).next().unwrap_or_default();
    if target.split('/').any(|segment| segment == "..") {
        return Err(Error::NotFound(uri.to_string()));
    }

    let mut path = root.join(target.trim_start_matches('/'));
    let mut meta = fs::metadata(&path).map_err(|_| Error::NotFound(uri.to_string()))?;
    if meta.is_dir() {
        path.push("index.html");
        meta = fs::metadata(&path).map_err(|_| Error::NotFound(uri.to_string()))?;
    }
    if !meta.is_file() {
        return Err(Error::NotFound(uri.to_string()));
    }

    let access = |e: std::io::Error| Error::ResourceAccess(format!("{}: {}", path.display(), e));
    let file = File::open(&path).map_err(access)?;
    let meta = file.metadata().map_err(access)?;
    let modified = meta.modified().map_err(access)?;

    Ok(Resource {
        mime: config.mime_types.lookup(&path).to_string(),
        size: meta.len(),
        last_modified: http_date(modified),
        file,
    })
}

/// Run the handler for the request's method
///
/// Returns the pipe that must stream the body, if any.
pub fn handle(
    request: &Request,
    config: &Config,
    out: &mut GrowBuffer,
) -> Result<Option<FileStreamPipe>> {
    info!(method = %request.method(), uri = request.uri(), "handling request");

    match request.method() {
        Method::Get => handle_get(request, config, out).map(Some),
        Method::Head => handle_head(request, config, out).map(|()| None),
        Method::Post => handle_post(request).map(|()| None),
    }
}

pub fn handle_get(request: &Request, config: &Config, out: &mut GrowBuffer) -> Result<FileStreamPipe> {
    let file = send_head(request, config, out)?;
    Ok(FileStreamPipe::new(file))
}

pub fn handle_head(request: &Request, config: &Config, out: &mut GrowBuffer) -> Result<()> {
    // The file closes as soon as it is dropped
    send_head(request, config, out).map(drop)
}

pub fn handle_post(request: &Request) -> Result<()> {
    warn!(
        uri = request.uri(),
        body = request.body().len(),
        "POST requires CGI, which is not available"
    );
    Err(Error::NotImplemented(format!("POST {}", request.uri())))
}

/// Emit `200 OK` and the resource headers; return the opened file
fn send_head(request: &Request, config: &Config, out: &mut GrowBuffer) -> Result<File> {
    let resource = resolve(config, request.uri())?;
    let connection = if request.wants_close() {
        "close"
    } else {
        "keep-alive"
    };

    ResponseHead::new(config.http_version, Status::OK)
        .header("Content-Type", resource.mime)
        .header("Content-Length", resource.size.to_string())
        .header("Date", http_date(SystemTime::now()))
        .header("Last-Modified", resource.last_modified)
        .header("Server", config.server_name.as_str())
        .header("Connection", connection)
        .write_to(out)?;

    Ok(resource.file)
}

/// Minimal response reporting `status`; the connection closes after it
pub fn error_response(config: &Config, status: Status) -> ResponseHead {
    ResponseHead::new(config.http_version, status)
        .header("Content-Length", "0")
        .header("Date", http_date(SystemTime::now()))
        .header("Server", config.server_name.as_str())
        .header("Connection", "close")
}
