//! The bridge's single control loop.
//!
//! One [`Bridge::step`]:
//!
//! ```text
//! 1. map requested?    draw the map, back to game mode
//! 2. base view         repaint from the mirror if an overlay covered it
//! 3. help / debug      draw the overlay on top
//! 4. flush             one write for the whole frame
//! 5. persist           while a game is being played
//! 6. wait              poll(local input, transport), no timeout
//! 7. dispatch          InputProxy and/or OutputProxy, whichever is ready
//! ```
//!
//! The loop ends with an [`ExitReason`] when the session ends normally and
//! with a [`BridgeError`] on anything fatal.

use std::io::{self, Read, Write};
use std::os::fd::AsFd;
use std::process::ExitStatus;

use bitflags::bitflags;
use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use thiserror::Error;
use tracing::{debug, info};

use crate::core::transport::{Transport, TransportError};
use crate::lifecycle::LifecycleHost;
use crate::proxy::{InputOutcome, InputProxy, OutputProxy, ProxyError};
use crate::session::{HotKeys, Mode, Session};
use crate::ui::{DebugInfo, Overlay, Renderer};

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("waiting for input failed: {0}")]
    Wait(#[source] Errno),

    #[error("failed to draw: {0}")]
    Display(#[source] io::Error),

    #[error("failed to read local input: {0}")]
    Input(#[source] io::Error),
}

impl From<ProxyError> for BridgeError {
    fn from(err: ProxyError) -> Self {
        match err {
            ProxyError::Transport(e) => BridgeError::Transport(e),
            ProxyError::Display(e) => BridgeError::Display(e),
            ProxyError::Input(e) => BridgeError::Input(e),
        }
    }
}

/// Why the session ended without an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// The local game process terminated
    ChildExited(ExitStatus),
    /// The remote host hung up
    Disconnected,
    /// Local input reached end of file
    InputClosed,
}

/// Outcome of one loop iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit(ExitReason),
}

bitflags! {
    /// Endpoints with data waiting
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct Ready: u8 {
        const INPUT     = 0b01;
        const TRANSPORT = 0b10;
    }
}

/// Presentation options fixed for the whole session
#[derive(Debug, Clone, Copy)]
pub struct View {
    pub keys: HotKeys,
    pub show_breadcrumbs: bool,
}

/// Everything one session needs, wired together
pub struct Bridge<I, D> {
    session: Session,
    output: OutputProxy<Session>,
    input: InputProxy<Session>,
    transport: Box<dyn Transport>,
    local_input: I,
    display: D,
    renderer: Renderer,
    view: View,
}

impl<I: Read + AsFd, D: Write> Bridge<I, D> {
    /// `transport` must already be open and the proxies populated.
    pub fn new(
        session: Session,
        output: OutputProxy<Session>,
        input: InputProxy<Session>,
        transport: Box<dyn Transport>,
        local_input: I,
        display: D,
        view: View,
    ) -> Self {
        Self {
            session,
            output,
            input,
            transport,
            local_input,
            display,
            renderer: Renderer::new(),
            view,
        }
    }

    #[cfg(test)]
    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn renderer_mut(&mut self) -> &mut Renderer {
        &mut self.renderer
    }

    /// Hand back the transport, e.g. to drain and close it.
    pub fn into_transport(self) -> Box<dyn Transport> {
        self.transport
    }

    /// Run until the session ends.
    pub fn run(&mut self) -> Result<ExitReason, BridgeError> {
        if !self.transport.is_open() {
            return Err(TransportError::NotOpen.into());
        }
        info!("Bridge running on {}", self.transport.describe());
        loop {
            if let Flow::Exit(reason) = self.step()? {
                info!("Bridge stopped: {:?}", reason);
                return Ok(reason);
            }
        }
    }

    pub fn step(&mut self) -> Result<Flow, BridgeError> {
        self.render()?;
        self.session.persist();

        let ready = self.wait()?;

        if ready.contains(Ready::INPUT) {
            let outcome = self.input.proxy(
                &mut self.local_input,
                self.transport.as_mut(),
                &mut self.session,
            );
            match outcome {
                Ok(InputOutcome::Closed) => return Ok(Flow::Exit(ExitReason::InputClosed)),
                Ok(_) => {}
                Err(e) => return session_end(e),
            }
        }
        if ready.contains(Ready::TRANSPORT) {
            let result = self.output.proxy(
                self.transport.as_mut(),
                &mut self.display,
                &mut self.session,
            );
            if let Err(e) = result {
                return session_end(e);
            }
        }
        Ok(Flow::Continue)
    }

    fn render(&mut self) -> Result<(), BridgeError> {
        if self.session.mode() == Mode::Map {
            self.session.set_mode(Mode::Game);
            self.session.open_map();
        }

        let overlay = if self.session.map_open() {
            Some(Overlay::map(self.session.driver().map()))
        } else {
            match self.session.mode() {
                Mode::Help => Some(Overlay::help(
                    self.view.keys,
                    self.session.lifecycle(),
                    self.view
                        .show_breadcrumbs
                        .then(|| self.session.driver().breadcrumbs()),
                )),
                Mode::Debug => Some(Overlay::debug(&self.debug_info())),
                Mode::Game | Mode::Map => None,
            }
        };

        self.renderer
            .render_game(self.session.screen())
            .map_err(BridgeError::Display)?;
        if let Some(overlay) = overlay {
            self.renderer
                .render_overlay(&overlay, self.session.screen())
                .map_err(BridgeError::Display)?;
        }
        self.renderer
            .flush(&mut self.display)
            .map_err(BridgeError::Display)
    }

    fn debug_info(&self) -> DebugInfo<'_> {
        DebugInfo {
            lifecycle: self.session.lifecycle(),
            mode: self.session.mode(),
            transport: self.transport.describe(),
            save_path: self.session.save_path(),
            taps: self.output.taps().names(),
            interceptors: self.input.interceptors().names(),
            bytes_out: self.output.bytes(),
            bytes_in: self.input.bytes(),
        }
    }

    /// Block until local input or the transport is readable.
    fn wait(&self) -> Result<Ready, BridgeError> {
        let transport = self
            .transport
            .readiness()
            .ok_or(BridgeError::Transport(TransportError::NotOpen))?;
        let mut fds = [
            PollFd::new(self.local_input.as_fd(), PollFlags::POLLIN),
            PollFd::new(transport, PollFlags::POLLIN),
        ];

        loop {
            match poll(&mut fds, PollTimeout::NONE) {
                Ok(_) => break,
                Err(Errno::EINTR) => {
                    debug!("Wait interrupted, retrying");
                    continue;
                }
                Err(e) => return Err(BridgeError::Wait(e)),
            }
        }

        // Hang-ups count as readable so the following read reports them
        let readable = |fd: &PollFd| {
            fd.revents().is_some_and(|r| {
                r.intersects(PollFlags::POLLIN | PollFlags::POLLHUP | PollFlags::POLLERR)
            })
        };
        let mut ready = Ready::empty();
        if readable(&fds[0]) {
            ready |= Ready::INPUT;
        }
        if readable(&fds[1]) {
            ready |= Ready::TRANSPORT;
        }
        Ok(ready)
    }
}

/// Turn the errors that end a session normally into an exit reason.
fn session_end(err: ProxyError) -> Result<Flow, BridgeError> {
    match err {
        ProxyError::Transport(TransportError::ChildExited(status)) => {
            Ok(Flow::Exit(ExitReason::ChildExited(status)))
        }
        ProxyError::Transport(TransportError::Closed) => Ok(Flow::Exit(ExitReason::Disconnected)),
        other => Err(other.into()),
    }
}
