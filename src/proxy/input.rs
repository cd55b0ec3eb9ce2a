//! Local keyboard → game.

use std::cell::RefCell;
use std::io::{self, Read};
use std::rc::Rc;

use tracing::{debug, trace};

use super::{Dispatch, ProxyError, Registry, TapId};
use crate::core::transport::{Transport, READ_CHUNK};

/// Whether an input chunk continues on to the game
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    Forward,
    /// Swallow the chunk and skip the remaining interceptors
    Suppress,
}

/// Observer that sees each input chunk before the game does
pub trait InputInterceptor<C> {
    fn on_input(&mut self, chunk: &[u8], dispatch: &mut InputDispatch<'_, C>) -> Verdict;
}

pub type InputDispatch<'a, C> = Dispatch<'a, C, dyn InputInterceptor<C>>;

/// What happened to one chunk of local input
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputOutcome {
    Forwarded(usize),
    Suppressed(usize),
    /// Local input reached end of file
    Closed,
}

/// Owns the local input → transport direction
pub struct InputProxy<C> {
    interceptors: Registry<dyn InputInterceptor<C>>,
    bytes: u64,
}

impl<C> Default for InputProxy<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> InputProxy<C> {
    pub fn new() -> Self {
        Self {
            interceptors: Registry::new(),
            bytes: 0,
        }
    }

    pub fn register<T: InputInterceptor<C> + 'static>(
        &mut self,
        name: &'static str,
        interceptor: T,
    ) -> TapId {
        self.interceptors
            .register(name, Rc::new(RefCell::new(interceptor)))
    }

    pub fn unregister(&mut self, id: TapId) -> bool {
        self.interceptors.unregister(id)
    }

    pub fn interceptors(&self) -> &Registry<dyn InputInterceptor<C>> {
        &self.interceptors
    }

    /// Bytes forwarded to the game so far
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    /// Read one chunk of local input and forward it unless an interceptor
    /// suppresses it.
    pub fn proxy(
        &mut self,
        source: &mut dyn Read,
        transport: &mut dyn Transport,
        cx: &mut C,
    ) -> Result<InputOutcome, ProxyError> {
        let mut buffer = [0u8; READ_CHUNK];
        let n = loop {
            match source.read(&mut buffer) {
                Ok(n) => break n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(ProxyError::Input(e)),
            }
        };
        if n == 0 {
            debug!("Local input closed");
            return Ok(InputOutcome::Closed);
        }
        let chunk = &buffer[..n];

        match self.intercept(chunk, cx) {
            Verdict::Suppress => Ok(InputOutcome::Suppressed(n)),
            Verdict::Forward => {
                transport.write_all(chunk)?;
                self.bytes += n as u64;
                trace!("Forwarded {} input bytes", n);
                Ok(InputOutcome::Forwarded(n))
            }
        }
    }

    /// Run the interceptor chain over `chunk`, stopping at the first
    /// [`Verdict::Suppress`].
    pub fn intercept(&mut self, chunk: &[u8], cx: &mut C) -> Verdict {
        for (id, interceptor) in self.interceptors.snapshot() {
            let mut dispatch = Dispatch::new(&mut *cx, &mut self.interceptors, id);
            if interceptor.borrow_mut().on_input(chunk, &mut dispatch) == Verdict::Suppress {
                trace!("Input suppressed by interceptor {}", id);
                return Verdict::Suppress;
            }
        }
        Verdict::Forward
    }
}
