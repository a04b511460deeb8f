//! Server configuration
//!
//! `lisod` takes positional arguments in the order below; only the HTTP
//! port is required. A few settings can be overridden from the
//! environment: `LISO_BIND` (listen address) and `LISO_LOG` (log level).
//!
//! TLS, daemonisation and CGI are not provided by this server. Their
//! arguments are accepted and stored so existing command lines keep working.

use crate::http::{MimeTable, Version};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use tracing::Level;

pub const USAGE: &str = "\
Usage: lisod <HTTP port> [<HTTPS port> <log file> <lock file> <www folder> \
<CGI script path> <private key file> <certificate file>]
    HTTP port        - the port for the HTTP server to listen on
    HTTPS port       - the port for the HTTPS server (not supported, ignored)
    log file         - file to send log messages to (default: stderr)
    lock file        - file to lock on when becoming a daemon (ignored)
    www folder       - folder containing the tree to serve (default: ./www)
    CGI script path  - script for /cgi/* URIs (not supported, ignored)
    private key file - TLS private key (ignored)
    certificate file - TLS certificate (ignored)";

/// Value of the `Server` response header
pub const SERVER_NAME: &str = "Liso/1.0";

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required argument: {0}")]
    MissingArgument(&'static str),

    #[error("invalid port {0:?}")]
    InvalidPort(String),

    #[error("invalid bind address {0:?}")]
    InvalidAddress(String),

    #[error("invalid log level {0:?}")]
    InvalidLogLevel(String),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub https_port: Option<u16>,
    pub log_file: Option<PathBuf>,
    pub lock_file: Option<PathBuf>,
    /// Document root every request URI is resolved against
    pub www_folder: PathBuf,
    pub cgi_path: Option<PathBuf>,
    pub private_key: Option<PathBuf>,
    pub certificate: Option<PathBuf>,
    pub bind_addr: IpAddr,
    /// The one HTTP version requests may use
    pub http_version: Version,
    pub server_name: String,
    pub mime_types: MimeTable,
    pub log_level: Level,
}

impl Config {
    /// Defaults serving `www_folder` on an ephemeral loopback port
    pub fn new(www_folder: impl Into<PathBuf>) -> Self {
        Config {
            http_port: 0,
            https_port: None,
            log_file: None,
            lock_file: None,
            www_folder: www_folder.into(),
            cgi_path: None,
            private_key: None,
            certificate: None,
            bind_addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
            http_version: Version::Http11,
            server_name: SERVER_NAME.to_string(),
            mime_types: MimeTable::default(),
            log_level: Level::INFO,
        }
    }

    /// Load from the process arguments and environment
    pub fn load() -> Result<Self, ConfigError> {
        let mut cfg = Self::from_args(std::env::args().skip(1))?;
        cfg.apply_env(|name| std::env::var(name).ok())?;
        Ok(cfg)
    }

    /// Build from positional arguments, program name excluded
    pub fn from_args<I>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let mut args = args.into_iter().map(Into::into);

        let http_port = parse_port(
            args.next()
                .ok_or(ConfigError::MissingArgument("HTTP port"))?,
        )?;
        let https_port = args.next().map(parse_port).transpose()?;
        let log_file = args.next().map(PathBuf::from);
        let lock_file = args.next().map(PathBuf::from);
        let www_folder = args.next().map_or_else(|| PathBuf::from("./www"), PathBuf::from);
        let cgi_path = args.next().map(PathBuf::from);
        let private_key = args.next().map(PathBuf::from);
        let certificate = args.next().map(PathBuf::from);

        Ok(Config {
            http_port,
            https_port,
            log_file,
            lock_file,
            cgi_path,
            private_key,
            certificate,
            bind_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            ..Config::new(www_folder)
        })
    }

    /// Apply `LISO_BIND` and `LISO_LOG` overrides from `var`
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(addr) = var("LISO_BIND") {
            self.bind_addr = addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress(addr))?;
        }
        if let Some(level) = var("LISO_LOG") {
            self.log_level = level
                .parse()
                .map_err(|_| ConfigError::InvalidLogLevel(level))?;
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_addr, self.http_port)
    }
}

fn parse_port(s: String) -> Result<u16, ConfigError> {
    s.parse().map_err(|_| ConfigError::InvalidPort(s))
}
