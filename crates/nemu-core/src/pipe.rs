//! Bounded in-memory byte pipe connecting the encoder to the request body.
//!
//! The pipe holds at most [`PIPE_DEPTH`] chunks, so the writer blocks until
//! the reader drains data and neither side runs ahead of the other. Either
//! end can be closed with a reason; the opposite end observes it on its next
//! operation. Both ends poll the session's [`CancelScope`] while blocked.

use std::io;
use std::io::Read;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::Receiver;
use crossbeam_channel::RecvTimeoutError;
use crossbeam_channel::SendTimeoutError;
use crossbeam_channel::Sender;
use parking_lot::Mutex;

use crate::CancelScope;
use crate::NemuError;

/// Number of chunks that may be in flight between writer and reader.
pub const PIPE_DEPTH: usize = 4;

/// How long a blocked end waits before re-checking close state and scope.
const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Creates a connected reader/writer pair bound to `scope`.
///
/// # Examples
///
/// ```
/// use nemu_core::CancelScope;
/// use nemu_core::pipe::pipe;
/// use std::io::Read;
/// use std::io::Write;
///
/// let (mut reader, mut writer) = pipe(&CancelScope::new());
/// let producer = std::thread::spawn(move || {
///     writer.write_all(b"hello").unwrap();
///     writer.close();
/// });
///
/// let mut out = String::new();
/// reader.read_to_string(&mut out).unwrap();
/// producer.join().unwrap();
/// assert_eq!(out, "hello");
/// ```
pub fn pipe(scope: &CancelScope) -> (PipeReader, PipeWriter) {
    let (tx, rx) = crossbeam_channel::bounded(PIPE_DEPTH);
    let shared = Arc::new(PipeShared::default());
    let reader = PipeReader {
        rx,
        chunk: Vec::new(),
        pos: 0,
        handle: PipeHandle {
            shared: Arc::clone(&shared),
        },
        scope: scope.clone(),
    };
    let writer = PipeWriter {
        tx: Some(tx),
        handle: PipeHandle { shared },
        scope: scope.clone(),
    };
    (reader, writer)
}

#[derive(Debug, Default)]
struct PipeShared {
    read_closed: Mutex<Option<String>>,
    write_closed: Mutex<Option<WriteEnd>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum WriteEnd {
    Eof,
    Error(String),
}

/// Close handle usable after an end has been moved elsewhere.
///
/// The transport client hands the reader to the HTTP library as the request
/// body and keeps a handle so it can still close the read side.
#[derive(Debug, Clone)]
pub struct PipeHandle {
    shared: Arc<PipeShared>,
}

impl PipeHandle {
    /// Closes the read side. Pending and future writes fail with
    /// `BrokenPipe` carrying `reason`. Only the first close is kept.
    pub fn close_read(&self, reason: impl Into<String>) {
        let mut slot = self.shared.read_closed.lock();
        if slot.is_none() {
            *slot = Some(reason.into());
        }
    }

    /// Closes the write side with an error. Future reads return it.
    /// Ignored if the write side was already closed.
    pub fn close_write_with_error(&self, reason: impl Into<String>) {
        let mut slot = self.shared.write_closed.lock();
        if slot.is_none() {
            *slot = Some(WriteEnd::Error(reason.into()));
        }
    }

    /// Returns `true` once the read side has been closed.
    pub fn is_read_closed(&self) -> bool {
        self.shared.read_closed.lock().is_some()
    }

    fn close_write_clean(&self) {
        let mut slot = self.shared.write_closed.lock();
        if slot.is_none() {
            *slot = Some(WriteEnd::Eof);
        }
    }

    fn read_closed_reason(&self) -> Option<String> {
        self.shared.read_closed.lock().clone()
    }

    fn write_end(&self) -> Option<WriteEnd> {
        self.shared.write_closed.lock().clone()
    }
}

fn scope_error(err: &NemuError) -> io::Error {
    match err {
        NemuError::DeadlineExceeded => io::Error::new(io::ErrorKind::TimedOut, err.to_string()),
        _ => io::Error::other(err.to_string()),
    }
}

/// Write end of the pipe.
#[derive(Debug)]
pub struct PipeWriter {
    tx: Option<Sender<Vec<u8>>>,
    handle: PipeHandle,
    scope: CancelScope,
}

impl PipeWriter {
    /// Returns a close handle sharing this pipe's state.
    pub fn handle(&self) -> PipeHandle {
        self.handle.clone()
    }

    /// Closes the write side cleanly; the reader sees end-of-stream after
    /// draining the chunks already queued.
    pub fn close(mut self) {
        self.handle.close_write_clean();
        self.tx = None;
    }

    /// Closes the write side with `reason`; the reader returns it as an error.
    pub fn close_with_error(mut self, reason: impl Into<String>) {
        self.handle.close_write_with_error(reason);
        self.tx = None;
    }

    fn ensure_open(&self) -> io::Result<()> {
        if let Some(reason) = self.handle.read_closed_reason() {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                format!("read side closed: {reason}"),
            ));
        }
        if self.handle.write_end().is_some() {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "write on closed pipe",
            ));
        }
        self.scope.check().map_err(|e| scope_error(&e))
    }
}

impl Write for PipeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.ensure_open()?;
        let Some(tx) = self.tx.as_ref() else {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "write on closed pipe",
            ));
        };

        let mut chunk = buf.to_vec();
        loop {
            match tx.send_timeout(chunk, POLL_INTERVAL) {
                Ok(()) => return Ok(buf.len()),
                Err(SendTimeoutError::Timeout(pending)) => {
                    chunk = pending;
                    self.ensure_open()?;
                }
                Err(SendTimeoutError::Disconnected(_)) => {
                    return Err(io::Error::new(
                        io::ErrorKind::BrokenPipe,
                        "pipe reader dropped",
                    ));
                }
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for PipeWriter {
    fn drop(&mut self) {
        if self.tx.is_some() {
            self.handle
                .close_write_with_error("pipe writer dropped before close");
        }
    }
}

/// Read end of the pipe.
#[derive(Debug)]
pub struct PipeReader {
    rx: Receiver<Vec<u8>>,
    chunk: Vec<u8>,
    pos: usize,
    handle: PipeHandle,
    scope: CancelScope,
}

impl PipeReader {
    /// Returns a close handle sharing this pipe's state.
    pub fn handle(&self) -> PipeHandle {
        self.handle.clone()
    }

    fn copy_out(&mut self, buf: &mut [u8]) -> usize {
        let available = &self.chunk[self.pos..];
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.pos += n;
        n
    }
}

impl Read for PipeReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.pos < self.chunk.len() {
            return Ok(self.copy_out(buf));
        }

        loop {
            if self.handle.is_read_closed() {
                return Err(io::Error::new(
                    io::ErrorKind::BrokenPipe,
                    "read on closed pipe",
                ));
            }
            if let Some(WriteEnd::Error(reason)) = self.handle.write_end() {
                return Err(io::Error::other(reason));
            }
            self.scope.check().map_err(|e| scope_error(&e))?;

            match self.rx.recv_timeout(POLL_INTERVAL) {
                Ok(chunk) => {
                    self.chunk = chunk;
                    self.pos = 0;
                    return Ok(self.copy_out(buf));
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    return match self.handle.write_end() {
                        Some(WriteEnd::Eof) => Ok(0),
                        Some(WriteEnd::Error(reason)) => Err(io::Error::other(reason)),
                        None => Err(io::Error::new(
                            io::ErrorKind::UnexpectedEof,
                            "pipe writer vanished",
                        )),
                    };
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_round_trip_bytes() {
        let (mut reader, mut writer) = pipe(&CancelScope::new());
        let producer = thread::spawn(move || {
            for i in 0..100u8 {
                writer.write_all(&[i; 1000]).unwrap();
            }
            writer.close();
        });

        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        producer.join().unwrap();
        assert_eq!(out.len(), 100_000);
        assert_eq!(out[99_999], 99);
    }

    #[test]
    fn test_close_with_error_reaches_reader() {
        let (mut reader, mut writer) = pipe(&CancelScope::new());
        writer.write_all(b"partial").unwrap();
        writer.close_with_error("walk failed");

        let mut out = Vec::new();
        let err = reader.read_to_end(&mut out).unwrap_err();
        assert!(err.to_string().contains("walk failed"));
    }

    #[test]
    fn test_write_after_read_closed_is_broken_pipe() {
        let (reader, mut writer) = pipe(&CancelScope::new());
        reader.handle().close_read("request failed");

        let err = writer.write_all(b"data").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
        assert!(err.to_string().contains("request failed"));
    }

    #[test]
    fn test_blocked_writer_unblocks_on_read_close() {
        let (reader, mut writer) = pipe(&CancelScope::new());
        let handle = reader.handle();
        let producer = thread::spawn(move || {
            // Fills the channel, then blocks until the read side closes.
            loop {
                if let Err(err) = writer.write_all(&[0u8; 4096]) {
                    return err;
                }
            }
        });

        thread::sleep(Duration::from_millis(100));
        handle.close_read("consumer stopped");
        let err = producer.join().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
        drop(reader);
    }

    #[test]
    fn test_dropped_reader_is_broken_pipe() {
        let (reader, mut writer) = pipe(&CancelScope::new());
        drop(reader);
        let mut err = None;
        for _ in 0..=PIPE_DEPTH {
            if let Err(e) = writer.write_all(b"x") {
                err = Some(e);
                break;
            }
        }
        assert_eq!(err.unwrap().kind(), io::ErrorKind::BrokenPipe);
    }

    #[test]
    fn test_dropped_writer_is_not_eof() {
        let (mut reader, writer) = pipe(&CancelScope::new());
        drop(writer);
        let mut out = Vec::new();
        assert!(reader.read_to_end(&mut out).is_err());
    }

    #[test]
    fn test_reader_honors_deadline() {
        let scope = CancelScope::with_timeout(Duration::from_millis(50));
        let (mut reader, _writer) = pipe(&scope);
        let mut buf = [0u8; 16];
        let err = reader.read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    }

    #[test]
    fn test_writer_honors_cancel() {
        let scope = CancelScope::new();
        let (_reader, mut writer) = pipe(&scope);
        scope.cancel();
        assert!(writer.write_all(b"x").is_err());
    }
}
