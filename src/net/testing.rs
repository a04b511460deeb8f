//! Scripted in-memory stream for exercising non-blocking code paths

use std::collections::VecDeque;
use std::io::{self, Read, Write};

/// One scripted outcome of a `read` call
#[derive(Debug, Clone)]
pub(crate) enum Step {
    /// Bytes handed out over as many reads as it takes
    Data(Vec<u8>),
    /// A single `WouldBlock`
    Block,
    /// Zero-length read, repeated forever
    Eof,
    /// A hard error
    Fail(io::ErrorKind),
}

/// Stream whose reads follow a script and whose writes are captured
///
/// Reading past the end of the script reports `WouldBlock`.
#[derive(Debug, Default)]
pub(crate) struct MockStream {
    input: VecDeque<Step>,
    output: Vec<u8>,
    write_chunk: Option<usize>,
    write_budget: Option<usize>,
    write_error: Option<io::ErrorKind>,
}

impl MockStream {
    pub(crate) fn new(steps: Vec<Step>) -> Self {
        MockStream {
            input: steps.into(),
            ..Default::default()
        }
    }

    /// Accept at most `n` bytes per write call
    pub(crate) fn with_write_chunk(mut self, n: usize) -> Self {
        self.write_chunk = Some(n);
        self
    }

    /// Accept `n` bytes in total, then report `WouldBlock`
    pub(crate) fn with_write_budget(mut self, n: usize) -> Self {
        self.write_budget = Some(n);
        self
    }

    pub(crate) fn with_write_error(mut self, kind: io::ErrorKind) -> Self {
        self.write_error = Some(kind);
        self
    }

    pub(crate) fn add_write_budget(&mut self, n: usize) {
        self.write_budget = Some(self.write_budget.unwrap_or(0) + n);
    }

    pub(crate) fn push(&mut self, step: Step) {
        self.input.push_back(step);
    }

    pub(crate) fn output(&self) -> &[u8] {
        &self.output
    }

    pub(crate) fn take_output(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.output)
    }
}

impl Read for MockStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.input.pop_front() {
            Some(Step::Data(mut data)) => {
                let n = data.len().min(buf.len());
                buf[..n].copy_from_slice(&data[..n]);
                if n < data.len() {
                    self.input.push_front(Step::Data(data.split_off(n)));
                }
                Ok(n)
            }
            Some(Step::Block) | None => Err(io::ErrorKind::WouldBlock.into()),
            Some(Step::Eof) => {
                self.input.push_front(Step::Eof);
                Ok(0)
            }
            Some(Step::Fail(kind)) => Err(kind.into()),
        }
    }
}

impl Write for MockStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if let Some(kind) = self.write_error {
            return Err(kind.into());
        }

        let mut n = buf.len();
        if let Some(chunk) = self.write_chunk {
            n = n.min(chunk);
        }
        if let Some(budget) = self.write_budget.as_mut() {
            if *budget == 0 {
                return Err(io::ErrorKind::WouldBlock.into());
            }
            n = n.min(*budget);
            *budget -= n;
        }

        self.output.extend_from_slice(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
