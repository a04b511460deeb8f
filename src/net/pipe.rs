//! File-to-socket streaming
//!
//! A [`FileStreamPipe`] relays a file to a socket one bounded chunk at a
//! time, so a response body is never held in memory as a whole.

use super::{is_transient, PIPE_BUFSIZE};
use std::fs::File;
use std::io::{self, Read, Write};
use tracing::{debug, error};

/// Outcome of a [`FileStreamPipe::step`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipeStatus {
    /// The source hit end-of-file and has been closed
    Done,
    /// More to send; call again on the next writability event
    Continue,
}

/// Streams a source (normally a [`File`]) through a fixed-size scratch buffer
///
/// The source is dropped, and so closed, on every exit path: completion,
/// read failure or write failure.
#[derive(Debug)]
pub struct FileStreamPipe<R = File> {
    source: Option<R>,
    scratch: Box<[u8]>,
    /// Bytes of the current chunk already sent
    offset: usize,
    /// Bytes of the current chunk loaded from the source
    datasize: usize,
    refills: usize,
}

impl<R: Read> FileStreamPipe<R> {
    /// Create a pipe with the default scratch capacity
    pub fn new(source: R) -> Self {
        Self::with_capacity(source, PIPE_BUFSIZE)
    }

    /// Create a pipe with a scratch buffer of `capacity` bytes
    pub fn with_capacity(source: R, capacity: usize) -> Self {
        FileStreamPipe {
            source: Some(source),
            scratch: vec![0; capacity.max(1)].into_boxed_slice(),
            offset: 0,
            datasize: 0,
            refills: 0,
        }
    }

    /// Do one bounded unit of work
    ///
    /// Refills the scratch buffer with a single read once the current chunk
    /// is fully sent, then makes one write attempt of what remains. A write
    /// that would block is not an error: zero bytes are sent and the pipe
    /// reports [`PipeStatus::Continue`].
    pub fn step<W: Write + ?Sized>(&mut self, dst: &mut W) -> io::Result<PipeStatus> {
        let Some(source) = self.source.as_mut() else {
            return Ok(PipeStatus::Done);
        };

        if self.offset >= self.datasize {
            match source.read(&mut self.scratch) {
                Ok(0) => {
                    debug!(refills = self.refills, "pipe source exhausted");
                    self.source = None;
                    return Ok(PipeStatus::Done);
                }
                Ok(n) => {
                    self.datasize = n;
                    self.offset = 0;
                    self.refills += 1;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {
                    return Ok(PipeStatus::Continue);
                }
                Err(e) => {
                    error!("pipe read error: {}", e);
                    self.source = None;
                    return Err(e);
                }
            }
        }

        match dst.write(&self.scratch[self.offset..self.datasize]) {
            Ok(n) => self.offset += n,
            Err(e) if is_transient(&e) => {}
            Err(e) => {
                error!("pipe send error: {}", e);
                self.source = None;
                return Err(e);
            }
        }

        Ok(PipeStatus::Continue)
    }

    /// True once the source has been closed
    pub fn is_closed(&self) -> bool {
        self.source.is_none()
    }

    /// Number of reads that loaded data from the source
    pub fn refills(&self) -> usize {
        self.refills
    }

    /// Capacity of the scratch buffer
    pub fn capacity(&self) -> usize {
        self.scratch.len()
    }
}
