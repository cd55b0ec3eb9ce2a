//! Game output → real terminal.

use std::cell::RefCell;
use std::io::Write;
use std::rc::Rc;

use tracing::trace;

use super::{Dispatch, ProxyError, Registry, TapId};
use crate::core::transport::Transport;

/// Observer receiving a read-only copy of every output chunk
pub trait OutputTap<C> {
    fn on_output(&mut self, chunk: &[u8], dispatch: &mut OutputDispatch<'_, C>);
}

pub type OutputDispatch<'a, C> = Dispatch<'a, C, dyn OutputTap<C>>;

/// Owns the transport → display direction
pub struct OutputProxy<C> {
    taps: Registry<dyn OutputTap<C>>,
    bytes: u64,
}

impl<C> Default for OutputProxy<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> OutputProxy<C> {
    pub fn new() -> Self {
        Self {
            taps: Registry::new(),
            bytes: 0,
        }
    }

    pub fn register<T: OutputTap<C> + 'static>(&mut self, name: &'static str, tap: T) -> TapId {
        self.taps.register(name, Rc::new(RefCell::new(tap)))
    }

    pub fn unregister(&mut self, id: TapId) -> bool {
        self.taps.unregister(id)
    }

    pub fn taps(&self) -> &Registry<dyn OutputTap<C>> {
        &self.taps
    }

    /// Bytes forwarded to the display so far
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    /// Read one chunk from the transport, show it, then hand it to the taps.
    ///
    /// Call only after the transport signalled readiness.
    pub fn proxy(
        &mut self,
        transport: &mut dyn Transport,
        display: &mut dyn Write,
        cx: &mut C,
    ) -> Result<usize, ProxyError> {
        let chunk = transport.read_chunk()?;
        if chunk.is_empty() {
            return Ok(0);
        }

        display.write_all(&chunk).map_err(ProxyError::Display)?;
        display.flush().map_err(ProxyError::Display)?;
        self.bytes += chunk.len() as u64;
        trace!("Forwarded {} output bytes", chunk.len());

        self.dispatch(&chunk, cx);
        Ok(chunk.len())
    }

    /// Invoke every tap that is live now, in registration order.
    pub fn dispatch(&mut self, chunk: &[u8], cx: &mut C) {
        for (id, tap) in self.taps.snapshot() {
            let mut dispatch = Dispatch::new(&mut *cx, &mut self.taps, id);
            tap.borrow_mut().on_output(chunk, &mut dispatch);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::transport::fake::FakeTransport;
    use crate::core::transport::TransportError;

    /// Context recording (tap name, chunk) per invocation
    #[derive(Default)]
    struct Log {
        calls: Vec<(&'static str, Vec<u8>)>,
    }

    struct Recorder(&'static str);

    impl OutputTap<Log> for Recorder {
        fn on_output(&mut self, chunk: &[u8], dispatch: &mut OutputDispatch<'_, Log>) {
            dispatch.cx.calls.push((self.0, chunk.to_vec()));
        }
    }

    /// Unregisters `victim` (or itself) on its first invocation
    struct Remover {
        victim: Option<TapId>,
    }

    impl OutputTap<Log> for Remover {
        fn on_output(&mut self, chunk: &[u8], dispatch: &mut OutputDispatch<'_, Log>) {
            dispatch.cx.calls.push(("remover", chunk.to_vec()));
            match self.victim {
                Some(id) => dispatch.unregister(id),
                None => dispatch.unregister_self(),
            };
        }
    }

    /// Registers a recorder on its first invocation, then removes itself
    struct Spawner;

    impl OutputTap<Log> for Spawner {
        fn on_output(&mut self, _chunk: &[u8], dispatch: &mut OutputDispatch<'_, Log>) {
            dispatch.register("late", Rc::new(RefCell::new(Recorder("late"))));
            dispatch.unregister_self();
        }
    }

    fn names(log: &Log) -> Vec<&'static str> {
        log.calls.iter().map(|(n, _)| *n).collect()
    }

    #[test]
    fn test_display_receives_chunks_verbatim_in_order() {
        let chunks: Vec<Vec<u8>> = vec![
            b"\x1b[2J\x1b[H".to_vec(),
            vec![0x00, 0xff, 0x1b, b'[', b'0', b'm'],
            "h\u{e9}llo".as_bytes().to_vec(),
        ];
        let mut transport = FakeTransport {
            chunks: chunks.iter().cloned().collect(),
            ..FakeTransport::default()
        };
        let mut proxy: OutputProxy<Log> = OutputProxy::new();
        let mut display = Vec::new();
        let mut log = Log::default();

        for _ in 0..chunks.len() {
            proxy.proxy(&mut transport, &mut display, &mut log).unwrap();
        }
        assert_eq!(display, chunks.concat());
        assert_eq!(proxy.bytes(), chunks.concat().len() as u64);

        let err = proxy.proxy(&mut transport, &mut display, &mut log);
        assert!(matches!(
            err,
            Err(ProxyError::Transport(TransportError::Closed))
        ));
    }

    #[test]
    fn test_taps_invoked_in_registration_order() {
        let mut transport = FakeTransport::new(&[b"one"]);
        let mut proxy: OutputProxy<Log> = OutputProxy::new();
        proxy.register("first", Recorder("first"));
        proxy.register("second", Recorder("second"));
        let mut log = Log::default();

        proxy.proxy(&mut transport, &mut Vec::new(), &mut log).unwrap();
        assert_eq!(names(&log), vec!["first", "second"]);
        assert!(log.calls.iter().all(|(_, c)| c == b"one"));
    }

    #[test]
    fn test_tap_removed_mid_dispatch_still_sees_current_chunk() {
        let mut proxy: OutputProxy<Log> = OutputProxy::new();
        let victim = proxy.register("victim", Recorder("victim"));
        proxy.register(
            "remover",
            Remover {
                victim: Some(victim),
            },
        );
        proxy.register("tail", Recorder("tail"));

        let mut log = Log::default();
        proxy.dispatch(b"n", &mut log);
        assert_eq!(names(&log), vec!["victim", "remover", "tail"]);

        log.calls.clear();
        proxy.dispatch(b"n+1", &mut log);
        assert_eq!(names(&log), vec!["remover", "tail"]);
    }

    #[test]
    fn test_earlier_tap_removing_later_one_does_not_skip_it() {
        let mut proxy: OutputProxy<Log> = OutputProxy::new();
        // Ids are sequential, so the recorder registered next gets id 2
        proxy.register(
            "remover",
            Remover {
                victim: Some(TapId(2)),
            },
        );
        let later = proxy.register("later", Recorder("later"));
        assert_eq!(later, TapId(2));

        let mut log = Log::default();
        proxy.dispatch(b"n", &mut log);
        assert_eq!(names(&log), vec!["remover", "later"]);
        assert!(!proxy.taps().contains(later));

        log.calls.clear();
        proxy.dispatch(b"n+1", &mut log);
        assert_eq!(names(&log), vec!["remover"]);
    }

    #[test]
    fn test_self_unregistering_tap_runs_once() {
        let mut proxy: OutputProxy<Log> = OutputProxy::new();
        proxy.register("once", Remover { victim: None });
        proxy.register("always", Recorder("always"));

        let mut log = Log::default();
        proxy.dispatch(b"a", &mut log);
        proxy.dispatch(b"b", &mut log);
        assert_eq!(names(&log), vec!["remover", "always", "always"]);
        assert_eq!(proxy.taps().names(), vec!["always"]);
    }

    #[test]
    fn test_tap_registered_mid_dispatch_starts_on_next_chunk() {
        let mut proxy: OutputProxy<Log> = OutputProxy::new();
        proxy.register("spawner", Spawner);

        let mut log = Log::default();
        proxy.dispatch(b"a", &mut log);
        assert!(log.calls.is_empty());

        proxy.dispatch(b"b", &mut log);
        assert_eq!(log.calls, vec![("late", b"b".to_vec())]);
    }

    #[test]
    fn test_empty_chunk_is_not_dispatched() {
        let mut transport = FakeTransport::new(&[b""]);
        let mut proxy: OutputProxy<Log> = OutputProxy::new();
        proxy.register("first", Recorder("first"));
        let mut display = Vec::new();
        let mut log = Log::default();

        assert_eq!(proxy.proxy(&mut transport, &mut display, &mut log).unwrap(), 0);
        assert!(display.is_empty());
        assert!(log.calls.is_empty());
    }
}
