//! Transports for tests.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::os::fd::{AsFd, BorrowedFd};
use std::os::unix::net::UnixStream;
use std::process::ExitStatus;

use super::{Result, Transport, TransportError, READ_CHUNK};

/// Replays scripted output and records everything written
#[derive(Default)]
pub struct FakeTransport {
    pub chunks: VecDeque<Vec<u8>>,
    pub written: Vec<u8>,
    pub fail_writes: bool,
}

impl FakeTransport {
    pub fn new<B: AsRef<[u8]>>(chunks: &[B]) -> Self {
        Self {
            chunks: chunks.iter().map(|c| c.as_ref().to_vec()).collect(),
            ..Self::default()
        }
    }
}

impl Transport for FakeTransport {
    fn describe(&self) -> String {
        "fake".to_string()
    }

    fn open(&mut self) -> Result<()> {
        Ok(())
    }

    fn is_open(&self) -> bool {
        true
    }

    fn readiness(&self) -> Option<BorrowedFd<'_>> {
        None
    }

    fn read_chunk(&mut self) -> Result<Vec<u8>> {
        self.chunks.pop_front().ok_or(TransportError::Closed)
    }

    fn write_all(&mut self, data: &[u8]) -> Result<()> {
        if self.fail_writes {
            return Err(TransportError::Write(io::Error::from(
                io::ErrorKind::BrokenPipe,
            )));
        }
        self.written.extend_from_slice(data);
        Ok(())
    }

    fn close(&mut self) -> Result<Option<ExitStatus>> {
        Ok(None)
    }
}

/// Game side of a Unix socket pair, so readiness waits see a real fd
pub struct SocketTransport {
    stream: Option<UnixStream>,
}

impl SocketTransport {
    /// The transport plus the peer end playing the game.
    pub fn pair() -> (Self, UnixStream) {
        let (ours, theirs) = UnixStream::pair().unwrap();
        (Self { stream: Some(ours) }, theirs)
    }
}

impl Transport for SocketTransport {
    fn describe(&self) -> String {
        "socketpair".to_string()
    }

    fn open(&mut self) -> Result<()> {
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    fn readiness(&self) -> Option<BorrowedFd<'_>> {
        self.stream.as_ref().map(|s| s.as_fd())
    }

    fn read_chunk(&mut self) -> Result<Vec<u8>> {
        let stream = self.stream.as_mut().ok_or(TransportError::NotOpen)?;
        let mut buffer = [0u8; READ_CHUNK];
        match stream.read(&mut buffer) {
            Ok(0) => Err(TransportError::Closed),
            Ok(n) => Ok(buffer[..n].to_vec()),
            Err(e) => Err(TransportError::Read(e)),
        }
    }

    fn write_all(&mut self, data: &[u8]) -> Result<()> {
        let stream = self.stream.as_mut().ok_or(TransportError::NotOpen)?;
        stream.write_all(data).map_err(TransportError::Write)
    }

    fn close(&mut self) -> Result<Option<ExitStatus>> {
        self.stream = None;
        Ok(None)
    }
}
