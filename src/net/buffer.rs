//! Growable socket buffer
//!
//! A [`GrowBuffer`] backs one direction of a connection. Receiving is
//! greedy: [`GrowBuffer::recv`] keeps reading until the socket has nothing
//! more to give, growing the buffer as it fills. Sending is greedy as well:
//! [`GrowBuffer::send`] writes until the buffer is drained or the socket
//! would block, then gives idle memory back.
//!
//! The cursors always satisfy `0 <= read_pos <= size <= capacity`.

use super::{is_transient, BUFSIZE};
use std::io::{self, Read, Write};
use tracing::{debug, error};

/// Outcome of a [`GrowBuffer::recv`] call that did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecvStatus {
    /// At least one byte arrived before the socket ran dry
    Received(usize),
    /// The peer closed the connection (a read returned zero bytes)
    Closed,
    /// Nothing was available
    WouldBlock,
}

/// Growable byte buffer with a read cursor and a write cursor
#[derive(Debug)]
pub struct GrowBuffer {
    /// Backing storage; its length is the buffer capacity
    buf: Vec<u8>,
    /// Bytes currently valid
    size: usize,
    /// Bytes already consumed or sent
    read_pos: usize,
    /// Idle space beyond which the buffer shrinks
    shrink_threshold: usize,
}

impl GrowBuffer {
    /// Create a buffer with the default capacity
    pub fn new() -> Self {
        Self::with_capacity(BUFSIZE)
    }

    /// Create a buffer with the given initial capacity
    ///
    /// The initial capacity doubles as the shrink threshold.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        GrowBuffer {
            buf: vec![0; capacity],
            size: 0,
            read_pos: 0,
            shrink_threshold: capacity,
        }
    }

    /// Total bytes the buffer can hold without growing
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Write cursor: bytes currently valid
    pub fn size(&self) -> usize {
        self.size
    }

    /// Read cursor: bytes already consumed
    pub fn read_pos(&self) -> usize {
        self.read_pos
    }

    /// Number of unread bytes
    pub fn len(&self) -> usize {
        self.size - self.read_pos
    }

    /// True if there is nothing left to read or send
    pub fn is_empty(&self) -> bool {
        self.read_pos == self.size
    }

    /// The unread bytes, `[read_pos, size)`
    pub fn unread(&self) -> &[u8] {
        &self.buf[self.read_pos..self.size]
    }

    /// Advance the read cursor past `n` unread bytes
    pub fn consume(&mut self, n: usize) {
        debug_assert!(n <= self.len(), "consume past write cursor");
        self.read_pos += n.min(self.len());
    }

    /// Append bytes at the write cursor, growing as needed
    pub fn append(&mut self, data: &[u8]) {
        while self.capacity() - self.size < data.len() {
            self.grow();
        }
        self.buf[self.size..self.size + data.len()].copy_from_slice(data);
        self.size += data.len();
    }

    /// Drain everything the socket has to offer without blocking
    ///
    /// Reads into the free tail until the socket reports it would block,
    /// the peer closes, or a hard error occurs. A zero-length read is the
    /// only close signal; running out of data after earlier reads is not.
    pub fn recv<R: Read + ?Sized>(&mut self, src: &mut R) -> io::Result<RecvStatus> {
        let mut received = 0;

        loop {
            if self.size == self.capacity() {
                self.grow();
            }

            match src.read(&mut self.buf[self.size..]) {
                Ok(0) => {
                    debug!(received, "peer closed connection");
                    return Ok(RecvStatus::Closed);
                }
                Ok(n) => {
                    debug!(n, "received");
                    self.size += n;
                    received += n;

                    if self.capacity() - self.size < self.capacity() / 2 {
                        self.grow();
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if is_transient(&e) => break,
                Err(e) => {
                    error!("recv error: {}", e);
                    return Err(e);
                }
            }
        }

        if received == 0 {
            Ok(RecvStatus::WouldBlock)
        } else {
            Ok(RecvStatus::Received(received))
        }
    }

    /// Write unread bytes to the socket until drained or it would block
    ///
    /// Returns the number of bytes written by this call. Idle space is
    /// reclaimed afterwards.
    pub fn send<W: Write + ?Sized>(&mut self, dst: &mut W) -> io::Result<usize> {
        let mut sent = 0;

        while self.read_pos < self.size {
            match dst.write(&self.buf[self.read_pos..self.size]) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "socket accepted no bytes",
                    ));
                }
                Ok(n) => {
                    self.read_pos += n;
                    sent += n;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if is_transient(&e) => break,
                Err(e) => {
                    error!("send error: {}", e);
                    return Err(e);
                }
            }
        }
        debug!(sent, pending = self.len(), "send complete");

        if self.is_empty() {
            self.read_pos = 0;
            self.size = 0;
        }
        self.shrink_if_idle();

        Ok(sent)
    }

    /// Shrink the buffer if its idle space exceeds the threshold
    ///
    /// Returns true if a shrink happened.
    pub fn shrink_if_idle(&mut self) -> bool {
        if self.idle_space() > self.shrink_threshold {
            self.shrink();
            true
        } else {
            false
        }
    }

    /// Space not holding unread bytes: the free tail plus the consumed head
    fn idle_space(&self) -> usize {
        self.capacity() - self.size + self.read_pos
    }

    fn grow(&mut self) {
        let capacity = self.capacity();
        let grown = capacity + (capacity + 1) / 2;
        debug!(from = capacity, to = grown, "growing buffer");
        self.buf.resize(grown, 0);
    }

    /// Move unread bytes to the front, then cut the idle space in half
    fn shrink(&mut self) {
        let idle = self.idle_space();
        debug!(
            capacity = self.capacity(),
            size = self.size,
            read_pos = self.read_pos,
            "shrinking buffer"
        );

        self.buf.copy_within(self.read_pos..self.size, 0);
        self.size -= self.read_pos;
        self.read_pos = 0;

        let capacity = (self.capacity() - idle / 2).max(1);
        self.buf.truncate(capacity);
        self.buf.shrink_to_fit();
    }
}

impl Default for GrowBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl Write for GrowBuffer {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.append(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
