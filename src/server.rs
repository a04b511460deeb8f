//! Event loop
//!
//! [`Server`] owns the listening socket, the [`Registry`] and every live
//! [`Connection`]. Each [`Server::turn`] waits once for readiness and then
//! hands the ready descriptors to their connections.

use crate::config::Config;
use crate::http::{Connection, Next};
use crate::net::{is_transient, Registry};
use socket2::{Domain, Protocol, Socket, Type};
use std::collections::HashMap;
use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::os::fd::{AsRawFd, RawFd};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

const LISTEN_BACKLOG: i32 = 128;

/// Single-threaded, readiness-driven HTTP server
pub struct Server {
    listener: TcpListener,
    registry: Registry,
    connections: HashMap<RawFd, Connection<TcpStream>>,
    config: Arc<Config>,
}

impl Server {
    /// Bind a non-blocking listener on the configured address
    pub fn bind(config: Config) -> io::Result<Self> {
        let addr = config.listen_addr();
        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
        socket.set_reuse_address(true)?;
        socket.bind(&addr.into())?;
        socket.listen(LISTEN_BACKLOG)?;
        socket.set_nonblocking(true)?;
        let listener: TcpListener = socket.into();

        let mut registry = Registry::new();
        registry.watch_read(listener.as_raw_fd());

        info!(
            addr = %listener.local_addr()?,
            root = %config.www_folder.display(),
            "listening"
        );

        Ok(Server {
            listener,
            registry,
            connections: HashMap::new(),
            config: Arc::new(config),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Number of open client connections
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Serve forever
    pub fn run(&mut self) -> io::Result<()> {
        loop {
            match self.turn(None) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// Wait for readiness once and dispatch every ready descriptor
    ///
    /// With a timeout, returns without doing anything once it expires.
    pub fn turn(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        let ready = match timeout {
            Some(timeout) => self.registry.wait_timeout(timeout)?,
            None => self.registry.wait()?,
        };
        let listener_fd = self.listener.as_raw_fd();

        for &fd in ready.readable() {
            if fd == listener_fd {
                self.on_accept();
                continue;
            }
            if let Some(conn) = self.connections.get_mut(&fd) {
                let next = conn.on_readable();
                self.settle(fd, next);
            }
        }

        for &fd in ready.writable() {
            if let Some(conn) = self.connections.get_mut(&fd) {
                let next = conn.on_writable();
                self.settle(fd, next);
            }
        }

        Ok(())
    }

    /// Accept every pending client
    fn on_accept(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    if let Err(e) = stream.set_nonblocking(true) {
                        warn!(%peer, "cannot make socket non-blocking: {}", e);
                        continue;
                    }
                    let fd = stream.as_raw_fd();
                    self.registry.watch_read(fd);
                    self.connections
                        .insert(fd, Connection::new(stream, Arc::clone(&self.config)));
                    info!(%peer, fd, "accepted connection");
                }
                Err(e) if is_transient(&e) => break,
                Err(e) => {
                    error!("accept failed: {}", e);
                    break;
                }
            }
        }
    }

    /// Close the connection or bring its interest in line with its state
    fn settle(&mut self, fd: RawFd, next: Next) {
        if next == Next::Close {
            self.on_close(fd);
            return;
        }
        let Some(conn) = self.connections.get(&fd) else {
            return;
        };
        let (read, write) = (conn.wants_read(), conn.wants_write());

        if read {
            self.registry.watch_read(fd);
        } else {
            self.registry.unwatch_read(fd);
        }
        if write {
            self.registry.watch_write(fd);
        } else {
            self.registry.unwatch_write(fd);
        }
    }

    fn on_close(&mut self, fd: RawFd) {
        self.registry.forget(fd);
        if let Some(conn) = self.connections.remove(&fd) {
            match conn.stream().peer_addr() {
                Ok(peer) => info!(%peer, fd, "closed connection"),
                Err(_) => info!(fd, "closed connection"),
            }
        }
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        debug!(open = self.connections.len(), "shutting down");
        let fds: Vec<RawFd> = self.connections.keys().copied().collect();
        for fd in fds {
            self.on_close(fd);
        }
    }
}
