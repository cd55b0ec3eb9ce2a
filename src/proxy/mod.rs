//! Stream proxies with runtime-registrable observers.
//!
//! - **output**: game → display, fans each chunk out to [`OutputTap`]s
//! - **input**: keyboard → game, lets [`InputInterceptor`]s veto forwarding
//!
//! Both directions keep their observers in a [`Registry`]. Dispatch of a chunk
//! iterates over a snapshot of the registry taken before the first observer
//! runs, so an observer may register or unregister entries (itself included)
//! while the chunk is in flight:
//!
//! ```text
//! chunk n ──► snapshot [a, b, c] ──► a(n) ──► b(n) ──► c(n)
//!                                     │
//!                                     └─ unregisters c: live registry [a, b],
//!                                        c still sees chunk n, not chunk n+1
//! ```

pub mod input;
pub mod output;

use std::cell::RefCell;
use std::fmt;
use std::io;
use std::rc::Rc;

use thiserror::Error;
use tracing::debug;

use crate::core::transport::TransportError;

pub use input::{InputDispatch, InputInterceptor, InputOutcome, InputProxy, Verdict};
pub use output::{OutputDispatch, OutputProxy, OutputTap};

#[derive(Error, Debug)]
pub enum ProxyError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("failed to write to display: {0}")]
    Display(#[source] io::Error),

    #[error("failed to read local input: {0}")]
    Input(#[source] io::Error),
}

/// Identity of a registered tap or interceptor
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TapId(u64);

impl fmt::Display for TapId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Shared handle to a registered observer
pub type Handler<H> = Rc<RefCell<H>>;

struct Entry<H: ?Sized> {
    id: TapId,
    name: &'static str,
    handler: Handler<H>,
}

/// Ordered collection of observers; invocation order is registration order.
pub struct Registry<H: ?Sized> {
    entries: Vec<Entry<H>>,
    next_id: u64,
}

impl<H: ?Sized> Default for Registry<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: ?Sized> Registry<H> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            next_id: 1,
        }
    }

    pub fn register(&mut self, name: &'static str, handler: Handler<H>) -> TapId {
        let id = TapId(self.next_id);
        self.next_id += 1;
        debug!("Registered {} {}", name, id);
        self.entries.push(Entry { id, name, handler });
        id
    }

    /// Remove an entry. Returns false when it was not registered.
    pub fn unregister(&mut self, id: TapId) -> bool {
        match self.entries.iter().position(|e| e.id == id) {
            Some(index) => {
                let entry = self.entries.remove(index);
                debug!("Unregistered {} {}", entry.name, id);
                true
            }
            None => false,
        }
    }

    #[cfg(test)]
    pub fn contains(&self, id: TapId) -> bool {
        self.entries.iter().any(|e| e.id == id)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Names in invocation order
    pub fn names(&self) -> Vec<&'static str> {
        self.entries.iter().map(|e| e.name).collect()
    }

    fn snapshot(&self) -> Vec<(TapId, Handler<H>)> {
        self.entries
            .iter()
            .map(|e| (e.id, Rc::clone(&e.handler)))
            .collect()
    }
}

/// What an observer gets besides the chunk: the session context and access
/// to the live registry it is registered in.
pub struct Dispatch<'a, C, H: ?Sized> {
    pub cx: &'a mut C,
    registry: &'a mut Registry<H>,
    current: TapId,
}

impl<'a, C, H: ?Sized> Dispatch<'a, C, H> {
    fn new(cx: &'a mut C, registry: &'a mut Registry<H>, current: TapId) -> Self {
        Self {
            cx,
            registry,
            current,
        }
    }

    /// Remove the observer being invoked; it still finishes this chunk.
    pub fn unregister_self(&mut self) -> bool {
        self.registry.unregister(self.current)
    }

    pub fn unregister(&mut self, id: TapId) -> bool {
        self.registry.unregister(id)
    }

    /// Add an observer; it first runs on the next chunk.
    pub fn register(&mut self, name: &'static str, handler: Handler<H>) -> TapId {
        self.registry.register(name, handler)
    }
}
