//! Local game process under a pseudo terminal.
//!
//! The game is spawned as the leader of a new session with the PTY slave as
//! its controlling terminal, so it behaves exactly as if it were started from
//! the user's shell. The bridge keeps the master side.

use std::fs::File;
use std::io::{self, Read, Write};
use std::os::fd::{AsFd, AsRawFd, BorrowedFd};
use std::os::unix::process::CommandExt;
use std::process::{Child, Command, ExitStatus, Stdio};

use nix::fcntl::{fcntl, FcntlArg, OFlag};
use nix::pty::{openpty, Winsize};
use tracing::{debug, info, warn};

use super::{Result, Transport, TransportError, READ_CHUNK};

/// Game process attached to a PTY master
pub struct LocalTransport {
    program: String,
    args: Vec<String>,
    term: String,
    cols: u16,
    rows: u16,
    master: Option<File>,
    child: Option<Child>,
    exit_status: Option<ExitStatus>,
}

impl LocalTransport {
    pub fn new(program: &str, args: Vec<String>, term: &str, cols: u16, rows: u16) -> Self {
        Self {
            program: program.to_string(),
            args,
            term: term.to_string(),
            cols,
            rows,
            master: None,
            child: None,
            exit_status: None,
        }
    }

    fn connection_error(&self, source: io::Error) -> TransportError {
        TransportError::Connection {
            target: self.program.clone(),
            source,
        }
    }

    /// Reap the child after the master reported EOF/EIO.
    fn reap(&mut self) -> TransportError {
        if let Some(status) = self.exit_status {
            return TransportError::ChildExited(status);
        }
        let Some(child) = self.child.as_mut() else {
            return TransportError::NotOpen;
        };
        match child.wait() {
            Ok(status) => {
                info!("Game process {} exited: {}", child.id(), status);
                self.exit_status = Some(status);
                TransportError::ChildExited(status)
            }
            Err(e) => TransportError::Read(e),
        }
    }
}

impl Transport for LocalTransport {
    fn describe(&self) -> String {
        match &self.child {
            Some(child) => format!("{} (pid {})", self.program, child.id()),
            None => self.program.clone(),
        }
    }

    fn open(&mut self) -> Result<()> {
        if self.master.is_some() {
            return Ok(());
        }

        let winsize = Winsize {
            ws_row: if self.rows > 0 { self.rows } else { 24 },
            ws_col: if self.cols > 0 { self.cols } else { 80 },
            ws_xpixel: 0,
            ws_ypixel: 0,
        };
        let pty = openpty(&winsize, None).map_err(|e| self.connection_error(e.into()))?;

        let slave_fd = pty.slave.as_raw_fd();
        let master_fd = pty.master.as_raw_fd();
        let stdio = |fd: &std::os::fd::OwnedFd| fd.try_clone().map(Stdio::from);

        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .env("TERM", &self.term)
            .stdin(stdio(&pty.slave).map_err(|e| self.connection_error(e))?)
            .stdout(stdio(&pty.slave).map_err(|e| self.connection_error(e))?)
            .stderr(stdio(&pty.slave).map_err(|e| self.connection_error(e))?);

        // SAFETY: runs in the child between fork and exec; only async-signal-safe
        // calls are made and the fds are plain integers captured by value.
        unsafe {
            command.pre_exec(move || {
                if libc::setsid() == -1 {
                    return Err(io::Error::last_os_error());
                }
                if libc::ioctl(0, libc::TIOCSCTTY as libc::c_ulong, 0) == -1 {
                    return Err(io::Error::last_os_error());
                }
                if slave_fd > 2 {
                    libc::close(slave_fd);
                }
                libc::close(master_fd);
                Ok(())
            });
        }

        let child = command.spawn().map_err(|e| self.connection_error(e))?;
        drop(command);
        drop(pty.slave);

        info!(
            "Spawned {} {:?} (pid {}) at {}x{}",
            self.program,
            self.args,
            child.id(),
            winsize.ws_col,
            winsize.ws_row
        );

        self.master = Some(File::from(pty.master));
        self.child = Some(child);
        self.exit_status = None;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.master.is_some()
    }

    fn readiness(&self) -> Option<BorrowedFd<'_>> {
        self.master.as_ref().map(|m| m.as_fd())
    }

    fn read_chunk(&mut self) -> Result<Vec<u8>> {
        let master = self.master.as_mut().ok_or(TransportError::NotOpen)?;
        let mut buffer = [0u8; READ_CHUNK];

        let result = loop {
            match master.read(&mut buffer) {
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                other => break other,
            }
        };

        match result {
            Ok(0) => Err(self.reap()),
            Ok(n) => Ok(buffer[..n].to_vec()),
            // Linux reports EIO on the master once the slave side is gone
            Err(e) if e.raw_os_error() == Some(libc::EIO) => Err(self.reap()),
            Err(e) => Err(TransportError::Read(e)),
        }
    }

    fn write_all(&mut self, data: &[u8]) -> Result<()> {
        let master = self.master.as_mut().ok_or(TransportError::NotOpen)?;
        match master.write_all(data).and_then(|()| master.flush()) {
            Ok(()) => Ok(()),
            Err(e) if e.raw_os_error() == Some(libc::EIO) => Err(self.reap()),
            Err(e) => Err(TransportError::Write(e)),
        }
    }

    fn drain(&mut self) -> Vec<u8> {
        let Some(master) = self.master.as_mut() else {
            return Vec::new();
        };

        let nonblocking = fcntl(master.as_fd(), FcntlArg::F_GETFL)
            .map(OFlag::from_bits_truncate)
            .and_then(|flags| fcntl(master.as_fd(), FcntlArg::F_SETFL(flags | OFlag::O_NONBLOCK)));
        if let Err(e) = nonblocking {
            warn!("Could not drain game output: {}", e);
            return Vec::new();
        }

        let mut drained = Vec::new();
        let mut buffer = [0u8; READ_CHUNK];
        loop {
            match master.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => drained.extend_from_slice(&buffer[..n]),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(_) => break,
            }
        }
        debug!("Drained {} bytes after game exit", drained.len());
        drained
    }

    fn close(&mut self) -> Result<Option<ExitStatus>> {
        // Dropping the master hangs up the child's controlling terminal
        self.master = None;

        let Some(mut child) = self.child.take() else {
            return Ok(self.exit_status);
        };
        if let Some(status) = self.exit_status {
            return Ok(Some(status));
        }

        let status = match child.try_wait().map_err(TransportError::Read)? {
            Some(status) => status,
            None => {
                debug!("Game process {} still running on close, killing", child.id());
                if let Err(e) = child.kill() {
                    warn!("Failed to kill game process {}: {}", child.id(), e);
                }
                child.wait().map_err(TransportError::Read)?
            }
        };
        self.exit_status = Some(status);
        Ok(Some(status))
    }
}

impl Drop for LocalTransport {
    fn drop(&mut self) {
        if self.child.is_some() {
            let _ = self.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_executable_is_connection_error() {
        let mut transport = LocalTransport::new(
            "/nonexistent/nhbridge-test-game",
            Vec::new(),
            "xterm",
            80,
            24,
        );
        match transport.open() {
            Err(TransportError::Connection { target, .. }) => {
                assert_eq!(target, "/nonexistent/nhbridge-test-game");
            }
            other => panic!("expected connection error, got {:?}", other.map(|_| ())),
        }
        assert!(!transport.is_open());
        assert!(transport.readiness().is_none());
    }

    #[test]
    fn test_read_before_open() {
        let mut transport = LocalTransport::new("true", Vec::new(), "xterm", 80, 24);
        assert!(matches!(transport.read_chunk(), Err(TransportError::NotOpen)));
        assert!(matches!(transport.write_all(b"x"), Err(TransportError::NotOpen)));
    }

    #[test]
    fn test_child_output_then_exit() {
        let mut transport = LocalTransport::new(
            "/bin/sh",
            vec!["-c".to_string(), "printf hello".to_string()],
            "xterm",
            80,
            24,
        );
        transport.open().unwrap();
        assert!(transport.is_open());

        let mut output = Vec::new();
        let status = loop {
            match transport.read_chunk() {
                Ok(chunk) => output.extend(chunk),
                Err(TransportError::ChildExited(status)) => break status,
                Err(e) => panic!("unexpected error: {e}"),
            }
        };
        assert!(status.success());
        assert!(String::from_utf8_lossy(&output).contains("hello"));
        assert_eq!(transport.close().unwrap(), Some(status));
    }
}
