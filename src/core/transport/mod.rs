//! Game endpoints.
//!
//! A [`Transport`] exclusively owns one duplex byte stream to the game. Two
//! variants exist: a game process spawned under a local pseudo terminal, and a
//! remote session reached over telnet. Both expose the same
//! open / readiness / read / write / close contract so the main loop never
//! needs to know which one it is driving.

#[cfg(test)]
pub mod fake;
pub mod local;
pub mod remote;
pub mod telnet;

use std::io;
use std::os::fd::BorrowedFd;
use std::process::ExitStatus;

use clap::ValueEnum;
use thiserror::Error;

pub use local::LocalTransport;
pub use remote::RemoteTransport;

/// Size of a single read from either endpoint.
pub const READ_CHUNK: usize = 4096;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("failed to connect to {target}: {source}")]
    Connection {
        target: String,
        #[source]
        source: io::Error,
    },

    #[error("transport is not open")]
    NotOpen,

    #[error("failed to read from game: {0}")]
    Read(#[source] io::Error),

    #[error("failed to write to game: {0}")]
    Write(#[source] io::Error),

    #[error("connection closed by remote host")]
    Closed,

    #[error("game process exited: {0}")]
    ChildExited(ExitStatus),
}

pub type Result<T> = std::result::Result<T, TransportError>;

/// Duplex byte stream to the game.
pub trait Transport {
    /// Human readable endpoint description, used in logs and the debug overlay.
    fn describe(&self) -> String;

    /// Spawn or connect. Fails with [`TransportError::Connection`].
    fn open(&mut self) -> Result<()>;

    fn is_open(&self) -> bool;

    /// File descriptor that becomes readable when [`Transport::read_chunk`]
    /// will not block. `None` while closed.
    fn readiness(&self) -> Option<BorrowedFd<'_>>;

    /// Read the next available chunk of game output.
    ///
    /// An empty chunk means the read consumed only protocol traffic and there
    /// is nothing to display.
    fn read_chunk(&mut self) -> Result<Vec<u8>>;

    fn write_all(&mut self, data: &[u8]) -> Result<()>;

    /// Output still buffered after the endpoint terminated.
    fn drain(&mut self) -> Vec<u8> {
        Vec::new()
    }

    /// Release the endpoint. Returns the exit status when a child was reaped.
    fn close(&mut self) -> Result<Option<ExitStatus>>;
}

/// Which endpoint variant a session uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TransportKind {
    /// Spawn the game locally under a pseudo terminal
    Local,
    /// Connect to a remote game server over telnet
    Remote,
}

/// Fully resolved endpoint settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportSpec {
    Local {
        program: String,
        args: Vec<String>,
        term: String,
    },
    Remote {
        host: String,
        port: u16,
        term: String,
    },
}

impl TransportSpec {
    pub fn kind(&self) -> TransportKind {
        match self {
            TransportSpec::Local { .. } => TransportKind::Local,
            TransportSpec::Remote { .. } => TransportKind::Remote,
        }
    }
}

/// Build the transport selected by `spec`, sized to the real terminal.
/// The returned transport is not yet open.
pub fn build(spec: &TransportSpec, cols: u16, rows: u16) -> Box<dyn Transport> {
    match spec {
        TransportSpec::Local {
            program,
            args,
            term,
        } => Box::new(LocalTransport::new(program, args.clone(), term, cols, rows)),
        TransportSpec::Remote { host, port, term } => {
            Box::new(RemoteTransport::new(host, *port, term, cols, rows))
        }
    }
}
