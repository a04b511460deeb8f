//! Readiness multiplexing
//!
//! [`Registry`] keeps the descriptors the event loop cares about and waits
//! for any of them to become ready with a single level-triggered `poll(2)`.
//! It is owned by the event loop and holds no protocol state.

use std::collections::{BTreeMap, HashSet};
use std::io;
use std::os::fd::RawFd;
use std::time::Duration;
use tracing::debug;

/// Descriptors found ready by the last [`Registry::wait`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadySet {
    readable: Vec<RawFd>,
    writable: Vec<RawFd>,
}

impl ReadySet {
    /// Descriptors that can be read without blocking, in ascending order
    pub fn readable(&self) -> &[RawFd] {
        &self.readable
    }

    /// Descriptors that can be written without blocking, in ascending order
    pub fn writable(&self) -> &[RawFd] {
        &self.writable
    }

    pub fn is_empty(&self) -> bool {
        self.readable.is_empty() && self.writable.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Interest {
    read: bool,
    write: bool,
}

/// Read and write interest sets plus the results of the last wait
#[derive(Debug, Default)]
pub struct Registry {
    interest: BTreeMap<RawFd, Interest>,
    fd_max: Option<RawFd>,
    ready_read: HashSet<RawFd>,
    ready_write: HashSet<RawFd>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn watch_read(&mut self, fd: RawFd) {
        self.entry(fd).read = true;
    }

    pub fn unwatch_read(&mut self, fd: RawFd) {
        self.update(fd, |i| i.read = false);
    }

    pub fn watch_write(&mut self, fd: RawFd) {
        self.entry(fd).write = true;
    }

    pub fn unwatch_write(&mut self, fd: RawFd) {
        self.update(fd, |i| i.write = false);
    }

    /// Drop every interest in `fd`, typically right before it is closed
    pub fn forget(&mut self, fd: RawFd) {
        self.interest.remove(&fd);
        self.ready_read.remove(&fd);
        self.ready_write.remove(&fd);
    }

    /// True if `fd` was readable at the last wait
    pub fn is_readable(&self, fd: RawFd) -> bool {
        self.ready_read.contains(&fd)
    }

    /// True if `fd` was writable at the last wait
    pub fn is_writable(&self, fd: RawFd) -> bool {
        self.ready_write.contains(&fd)
    }

    pub fn is_watching_read(&self, fd: RawFd) -> bool {
        self.interest.get(&fd).map_or(false, |i| i.read)
    }

    pub fn is_watching_write(&self, fd: RawFd) -> bool {
        self.interest.get(&fd).map_or(false, |i| i.write)
    }

    /// Highest descriptor ever registered
    pub fn fd_max(&self) -> Option<RawFd> {
        self.fd_max
    }

    /// Block until at least one watched descriptor is ready
    pub fn wait(&mut self) -> io::Result<ReadySet> {
        self.poll(None)
    }

    /// Like [`Registry::wait`], but gives up after `timeout`
    ///
    /// An expired timeout yields an empty [`ReadySet`].
    pub fn wait_timeout(&mut self, timeout: Duration) -> io::Result<ReadySet> {
        self.poll(Some(timeout))
    }

    fn poll(&mut self, timeout: Option<Duration>) -> io::Result<ReadySet> {
        use libc::{poll, pollfd, POLLERR, POLLHUP, POLLIN, POLLOUT};

        self.ready_read.clear();
        self.ready_write.clear();

        let mut pfds: Vec<pollfd> = self
            .interest
            .iter()
            .filter(|(_, i)| i.read || i.write)
            .map(|(&fd, i)| pollfd {
                fd,
                events: (if i.read { POLLIN } else { 0 }) | (if i.write { POLLOUT } else { 0 }),
                revents: 0,
            })
            .collect();

        let timeout_ms = timeout
            .map(|d| d.as_millis().min(i32::MAX as u128) as i32)
            .unwrap_or(-1); // -1 = infinite

        let result = unsafe {
            poll(
                pfds.as_mut_ptr(),
                pfds.len() as libc::nfds_t,
                timeout_ms,
            )
        };

        if result < 0 {
            return Err(io::Error::last_os_error());
        }

        let mut ready = ReadySet::default();
        for pfd in pfds.iter().filter(|p| p.revents != 0) {
            let interest = self.interest.get(&pfd.fd).copied().unwrap_or_default();
            // Hangups and errors surface through the next read or write
            let failed = pfd.revents & (POLLHUP | POLLERR) != 0;

            if interest.read && (pfd.revents & POLLIN != 0 || failed) {
                self.ready_read.insert(pfd.fd);
                ready.readable.push(pfd.fd);
            }
            if interest.write && (pfd.revents & POLLOUT != 0 || failed) {
                self.ready_write.insert(pfd.fd);
                ready.writable.push(pfd.fd);
            }
        }
        debug!(
            readable = ready.readable.len(),
            writable = ready.writable.len(),
            "wait returned"
        );

        Ok(ready)
    }

    fn entry(&mut self, fd: RawFd) -> &mut Interest {
        if self.fd_max.map_or(true, |max| fd > max) {
            self.fd_max = Some(fd);
        }
        self.interest.entry(fd).or_default()
    }

    fn update(&mut self, fd: RawFd, f: impl FnOnce(&mut Interest)) {
        if let Some(interest) = self.interest.get_mut(&fd) {
            f(interest);
            if !interest.read && !interest.write {
                self.interest.remove(&fd);
            }
        }
    }
}
