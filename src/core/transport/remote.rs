//! Remote game session over telnet.

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::os::fd::{AsFd, BorrowedFd};
use std::process::ExitStatus;

use tracing::{debug, info};

use super::telnet::TelnetCodec;
use super::{Result, Transport, TransportError, READ_CHUNK};

pub struct RemoteTransport {
    host: String,
    port: u16,
    stream: Option<TcpStream>,
    codec: TelnetCodec,
}

impl RemoteTransport {
    pub fn new(host: &str, port: u16, term: &str, cols: u16, rows: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
            stream: None,
            codec: TelnetCodec::new(term, cols, rows),
        }
    }
}

impl Transport for RemoteTransport {
    fn describe(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    fn open(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let mut stream = TcpStream::connect((self.host.as_str(), self.port)).map_err(|source| {
            TransportError::Connection {
                target: self.describe(),
                source,
            }
        })?;
        if let Err(e) = stream.set_nodelay(true) {
            debug!("TCP_NODELAY not set: {}", e);
        }

        let hello = self.codec.handshake();
        stream.write_all(&hello).map_err(|source| TransportError::Connection {
            target: self.describe(),
            source,
        })?;

        info!("Connected to {}", self.describe());
        self.stream = Some(stream);
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

        let n = loop {
            match stream.read(&mut buffer) {
                Ok(n) => break n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(TransportError::Read(e)),
            }
        };
        if n == 0 {
            info!("Remote host {} closed the connection", self.describe());
            return Err(TransportError::Closed);
        }

        let decoded = self.codec.decode(&buffer[..n]);
        if !decoded.reply.is_empty() {
            stream.write_all(&decoded.reply).map_err(TransportError::Write)?;
        }
        Ok(decoded.data)
    }

    fn write_all(&mut self, data: &[u8]) -> Result<()> {
        let stream = self.stream.as_mut().ok_or(TransportError::NotOpen)?;
        stream
            .write_all(&TelnetCodec::encode(data))
            .map_err(TransportError::Write)
    }

    fn close(&mut self) -> Result<Option<ExitStatus>> {
        if let Some(stream) = self.stream.take() {
            match stream.shutdown(Shutdown::Both) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotConnected => {}
                Err(e) => return Err(TransportError::Write(e)),
            }
            debug!("Closed connection to {}", self.describe());
        }
        Ok(None)
    }
}
