//! Game lifecycle inferred from output text.
//!
//! The game has no structured event channel, so the bridge watches its output
//! for three banners. Each one is matched by a one-shot [`OutputTap`] that
//! unregisters itself once it fired:
//!
//! ```text
//! NotStarted ──"Restoring save file..."──► Restoring
//!     │                                        │
//!     └──────────"welcome to NetHack!"─────────┴──► Starting ──► Playing
//!                                                                  │
//!                 "Do you want your possessions identified?"       ▼
//!                                                                Ended
//! ```
//!
//! The end-of-game tap only exists once the welcome tap fired.

use std::cell::RefCell;
use std::rc::Rc;

use regex::bytes::Regex;
use tracing::{debug, info};

use crate::proxy::{OutputDispatch, OutputProxy, OutputTap, TapId};

/// Coarse phase of a game session
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum LifecycleState {
    #[default]
    NotStarted,
    Restoring,
    Starting,
    Playing,
    Ended,
}

impl LifecycleState {
    pub fn is_playing(self) -> bool {
        self == LifecycleState::Playing
    }

    /// Transitions only move forward within a session.
    pub fn can_advance_to(self, next: LifecycleState) -> bool {
        next > self
    }

    pub fn label(self) -> &'static str {
        match self {
            LifecycleState::NotStarted => "not started",
            LifecycleState::Restoring => "restoring",
            LifecycleState::Starting => "starting",
            LifecycleState::Playing => "playing",
            LifecycleState::Ended => "ended",
        }
    }
}

/// Session side of the lifecycle taps
pub trait LifecycleHost {
    fn lifecycle(&self) -> LifecycleState;

    /// A save file is being restored.
    fn mark_restoring(&mut self);

    /// The game greeted the player. `returning` is informational only.
    fn begin_play(&mut self, returning: bool);

    /// The game is over; discard the saved session.
    fn end_game(&mut self);
}

/// Banner that moves the lifecycle forward
#[derive(Debug, Clone, Copy)]
pub struct Trigger {
    pub name: &'static str,
    pub pattern: &'static str,
    /// Length of the longest text the pattern can match
    pub max_len: usize,
}

pub const RESTORE: Trigger = Trigger {
    name: "restore",
    pattern: r"Restoring save file\.\.\.",
    max_len: 22,
};

pub const WELCOME: Trigger = Trigger {
    name: "welcome",
    pattern: r"welcome( back)? to NetHack!",
    max_len: 24,
};

pub const GAME_OVER: Trigger = Trigger {
    name: "game-over",
    pattern: r"Do you want your possessions identified\?",
    max_len: 40,
};

/// Matches a trigger against arriving chunks.
///
/// With `span_chunks` set, the tail of the previous chunk is kept so that a
/// banner split across two reads is still found.
pub struct TriggerScanner {
    regex: Regex,
    window: Vec<u8>,
    keep: usize,
}

impl TriggerScanner {
    pub fn new(trigger: &Trigger, span_chunks: bool) -> Result<Self, regex::Error> {
        Ok(Self {
            regex: Regex::new(trigger.pattern)?,
            window: Vec::new(),
            keep: if span_chunks {
                trigger.max_len.saturating_sub(1)
            } else {
                0
            },
        })
    }

    /// Text matched in `chunk` (or across the previous tail and `chunk`).
    pub fn scan(&mut self, chunk: &[u8]) -> Option<Vec<u8>> {
        if self.keep == 0 {
            return self.regex.find(chunk).map(|m| m.as_bytes().to_vec());
        }

        let mut haystack = std::mem::take(&mut self.window);
        haystack.extend_from_slice(chunk);
        let found = self.regex.find(&haystack).map(|m| m.as_bytes().to_vec());

        let start = haystack.len().saturating_sub(self.keep);
        self.window = haystack.split_off(start);
        found
    }
}

struct RestoreTap {
    scanner: TriggerScanner,
}

impl<C: LifecycleHost> OutputTap<C> for RestoreTap {
    fn on_output(&mut self, chunk: &[u8], dispatch: &mut OutputDispatch<'_, C>) {
        if dispatch.cx.lifecycle() != LifecycleState::NotStarted {
            dispatch.unregister_self();
            return;
        }
        if self.scanner.scan(chunk).is_some() {
            info!("Save file restore detected");
            dispatch.cx.mark_restoring();
            dispatch.unregister_self();
        }
    }
}

struct WelcomeTap {
    scanner: TriggerScanner,
    restore: TapId,
    game_over: Option<GameOverTap>,
}

impl<C: LifecycleHost + 'static> OutputTap<C> for WelcomeTap {
    fn on_output(&mut self, chunk: &[u8], dispatch: &mut OutputDispatch<'_, C>) {
        let Some(text) = self.scanner.scan(chunk) else {
            return;
        };
        let returning = text.windows(4).any(|w| w == b"back");
        info!(
            "Game started ({})",
            if returning { "returning player" } else { "new player" }
        );

        dispatch.unregister(self.restore);
        dispatch.cx.begin_play(returning);
        if let Some(tap) = self.game_over.take() {
            dispatch.register(GAME_OVER.name, Rc::new(RefCell::new(tap)));
        }
        dispatch.unregister_self();
    }
}

struct GameOverTap {
    scanner: TriggerScanner,
}

impl<C: LifecycleHost> OutputTap<C> for GameOverTap {
    fn on_output(&mut self, chunk: &[u8], dispatch: &mut OutputDispatch<'_, C>) {
        if !dispatch.cx.lifecycle().is_playing() {
            return;
        }
        if self.scanner.scan(chunk).is_some() {
            info!("Game over detected");
            dispatch.cx.end_game();
            dispatch.unregister_self();
        }
    }
}

/// Handles of the taps installed at session start
#[derive(Debug, Clone, Copy)]
pub struct LifecycleDetector {
    #[allow(dead_code)]
    pub restore: TapId,
    #[allow(dead_code)]
    pub welcome: TapId,
}

impl LifecycleDetector {
    /// Register the restore and welcome taps on `proxy`. The game-over tap is
    /// added by the welcome tap when it fires.
    pub fn install<C: LifecycleHost + 'static>(
        proxy: &mut OutputProxy<C>,
        span_chunks: bool,
    ) -> Result<Self, regex::Error> {
        let restore = proxy.register(
            RESTORE.name,
            RestoreTap {
                scanner: TriggerScanner::new(&RESTORE, span_chunks)?,
            },
        );
        let welcome = proxy.register(
            WELCOME.name,
            WelcomeTap {
                scanner: TriggerScanner::new(&WELCOME, span_chunks)?,
                restore,
                game_over: Some(GameOverTap {
                    scanner: TriggerScanner::new(&GAME_OVER, span_chunks)?,
                }),
            },
        );
        debug!("Lifecycle detector installed (span_chunks={})", span_chunks);
        Ok(Self { restore, welcome })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Host {
        state: LifecycleState,
        events: Vec<String>,
    }

    impl LifecycleHost for Host {
        fn lifecycle(&self) -> LifecycleState {
            self.state
        }
        fn mark_restoring(&mut self) {
            self.state = LifecycleState::Restoring;
            self.events.push("restoring".to_string());
        }
        fn begin_play(&mut self, returning: bool) {
            if self.state == LifecycleState::Restoring {
                self.events.push("load".to_string());
            }
            self.events.push(format!("start returning={}", returning));
            self.state = LifecycleState::Playing;
        }
        fn end_game(&mut self) {
            self.events.push("end".to_string());
            self.state = LifecycleState::Ended;
        }
    }

    fn setup(span_chunks: bool) -> (OutputProxy<Host>, LifecycleDetector, Host) {
        let mut proxy = OutputProxy::new();
        let detector = LifecycleDetector::install(&mut proxy, span_chunks).unwrap();
        (proxy, detector, Host::default())
    }

    #[test]
    fn test_restore_banner() {
        let (mut proxy, detector, mut host) = setup(true);
        proxy.dispatch(b"Restoring save file...\n", &mut host);

        assert_eq!(host.state, LifecycleState::Restoring);
        assert!(!host.state.is_playing());
        assert!(!proxy.taps().contains(detector.restore));
        assert!(proxy.taps().contains(detector.welcome));
    }

    #[test]
    fn test_welcome_after_restore_loads_then_starts() {
        let (mut proxy, _, mut host) = setup(true);
        proxy.dispatch(b"Restoring save file...\n", &mut host);
        proxy.dispatch(b"welcome back to NetHack!\n", &mut host);

        assert_eq!(host.state, LifecycleState::Playing);
        assert_eq!(
            host.events,
            vec!["restoring", "load", "start returning=true"]
        );
        assert_eq!(proxy.taps().names(), vec![GAME_OVER.name]);
    }

    #[test]
    fn test_fresh_game_removes_restore_tap() {
        let (mut proxy, detector, mut host) = setup(true);
        proxy.dispatch(b"Hello Agent, welcome to NetHack!  You are a neutral", &mut host);

        assert_eq!(host.events, vec!["start returning=false"]);
        assert!(!proxy.taps().contains(detector.restore));

        // A late restore banner no longer has a detector
        proxy.dispatch(b"Restoring save file...", &mut host);
        assert_eq!(host.state, LifecycleState::Playing);
    }

    #[test]
    fn test_game_over_deletes_and_ends() {
        let (mut proxy, _, mut host) = setup(true);
        proxy.dispatch(b"Do you want your possessions identified?", &mut host);
        assert!(host.events.is_empty(), "not playing yet");

        proxy.dispatch(b"welcome to NetHack!\n", &mut host);
        proxy.dispatch(b"Do you want your possessions identified?\n", &mut host);

        assert_eq!(host.state, LifecycleState::Ended);
        assert_eq!(host.events.last().map(String::as_str), Some("end"));
        assert!(proxy.taps().is_empty());
    }

    #[test]
    fn test_triggers_fire_once() {
        let (mut proxy, _, mut host) = setup(true);
        proxy.dispatch(b"welcome to NetHack!", &mut host);
        proxy.dispatch(b"welcome to NetHack!", &mut host);
        proxy.dispatch(b"welcome back to NetHack!", &mut host);

        let starts = host.events.iter().filter(|e| e.starts_with("start")).count();
        assert_eq!(starts, 1);
    }

    #[test]
    fn test_split_banner_detected_with_window() {
        let (mut proxy, _, mut host) = setup(true);
        proxy.dispatch(b"\x1b[Hwelcome to Net", &mut host);
        proxy.dispatch(b"Hack!\r\n", &mut host);
        assert_eq!(host.state, LifecycleState::Playing);
    }

    #[test]
    fn test_split_banner_missed_per_chunk() {
        let (mut proxy, _, mut host) = setup(false);
        proxy.dispatch(b"\x1b[Hwelcome to Net", &mut host);
        proxy.dispatch(b"Hack!\r\n", &mut host);
        assert_eq!(host.state, LifecycleState::NotStarted);
    }

    #[test]
    fn test_scanner_window_is_bounded() {
        let mut scanner = TriggerScanner::new(&GAME_OVER, true).unwrap();
        assert!(scanner.scan(&[b'x'; 1000]).is_none());
        assert_eq!(scanner.window.len(), GAME_OVER.max_len - 1);

        // A match inside the previous window cannot fire a second time
        let mut scanner = TriggerScanner::new(&RESTORE, true).unwrap();
        assert!(scanner.scan(b"Restoring save file...").is_some());
        assert!(scanner.scan(b" ").is_none());
    }

    #[test]
    fn test_trigger_lengths() {
        for (trigger, longest) in [
            (RESTORE, "Restoring save file..."),
            (WELCOME, "welcome back to NetHack!"),
            (GAME_OVER, "Do you want your possessions identified?"),
        ] {
            assert_eq!(trigger.max_len, longest.len(), "{}", trigger.name);
            let regex = Regex::new(trigger.pattern).unwrap();
            assert!(regex.is_match(longest.as_bytes()));
        }
    }

    #[test]
    fn test_states_are_monotonic() {
        use LifecycleState::*;
        assert!(NotStarted.can_advance_to(Restoring));
        assert!(Restoring.can_advance_to(Playing));
        assert!(!Playing.can_advance_to(Restoring));
        assert!(!Ended.can_advance_to(Playing));
        assert_eq!(Playing.label(), "playing");
    }
}
