//! Per-session context shared by every tap and interceptor.
//!
//! There is exactly one [`Session`] per bridge. The main loop owns it and
//! hands it to the proxies as their dispatch context, so observers mutate
//! lifecycle and mode through it instead of through globals.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, error, info, warn};

use crate::core::emulator::TerminalEmulator;
use crate::driver::SessionDriver;
use crate::lifecycle::{LifecycleDetector, LifecycleHost, LifecycleState};
use crate::proxy::{
    InputDispatch, InputInterceptor, InputProxy, OutputDispatch, OutputProxy, OutputTap, Verdict,
};

/// Ctrl-]
pub const DEBUG_KEY: u8 = 0x1d;
pub const ESCAPE: u8 = 0x1b;

/// What is drawn on top of the game
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Game,
    Help,
    Map,
    Debug,
}

impl Mode {
    pub fn label(self) -> &'static str {
        match self {
            Mode::Game => "game",
            Mode::Help => "help",
            Mode::Map => "map",
            Mode::Debug => "debug",
        }
    }
}

/// Configurable single-byte hot keys
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HotKeys {
    pub help: u8,
    pub map: u8,
}

pub struct Session {
    lifecycle: LifecycleState,
    mode: Mode,
    /// The map overlay is up and waiting for a key
    map_open: bool,
    save_path: PathBuf,
    screen: Box<dyn TerminalEmulator>,
    driver: Box<dyn SessionDriver>,
}

impl Session {
    pub fn new(
        save_path: PathBuf,
        screen: Box<dyn TerminalEmulator>,
        driver: Box<dyn SessionDriver>,
    ) -> Self {
        Self {
            lifecycle: LifecycleState::NotStarted,
            mode: Mode::Game,
            map_open: false,
            save_path,
            screen,
            driver,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: Mode) {
        if self.mode != mode {
            debug!("Mode {} -> {}", self.mode.label(), mode.label());
            self.mode = mode;
        }
    }

    pub fn map_open(&self) -> bool {
        self.map_open
    }

    /// Show the map until the next key arrives.
    pub fn open_map(&mut self) {
        self.map_open = true;
    }

    pub fn close_map(&mut self) {
        self.map_open = false;
    }

    pub fn save_path(&self) -> &Path {
        &self.save_path
    }

    pub fn screen(&self) -> &dyn TerminalEmulator {
        self.screen.as_ref()
    }

    pub fn driver(&self) -> &dyn SessionDriver {
        self.driver.as_ref()
    }

    /// Feed a chunk of game output into the mirror and let the driver look.
    pub fn mirror(&mut self, chunk: &[u8]) {
        self.screen.feed(chunk);
        self.driver.observe(self.screen.as_ref());
    }

    /// Write the driver state to the save path while a game is running.
    pub fn persist(&self) {
        if !self.lifecycle.is_playing() {
            return;
        }
        if let Err(e) = self.driver.persist(&self.save_path) {
            error!("Failed to save to {}: {}", self.save_path.display(), e);
        }
    }

    fn advance(&mut self, next: LifecycleState) {
        if !self.lifecycle.can_advance_to(next) {
            warn!(
                "Ignoring lifecycle change {} -> {}",
                self.lifecycle.label(),
                next.label()
            );
            return;
        }
        info!("Lifecycle {} -> {}", self.lifecycle.label(), next.label());
        self.lifecycle = next;
    }
}

impl LifecycleHost for Session {
    fn lifecycle(&self) -> LifecycleState {
        self.lifecycle
    }

    fn mark_restoring(&mut self) {
        self.advance(LifecycleState::Restoring);
    }

    fn begin_play(&mut self, _returning: bool) {
        let restoring = self.lifecycle == LifecycleState::Restoring;
        self.advance(LifecycleState::Starting);
        if restoring {
            match self.driver.load(&self.save_path) {
                Ok(()) => info!("Restored session from {}", self.save_path.display()),
                Err(e) => warn!(
                    "Could not restore session from {}: {}",
                    self.save_path.display(),
                    e
                ),
            }
        }
        self.driver.start();
        self.advance(LifecycleState::Playing);
    }

    fn end_game(&mut self) {
        match fs::remove_file(&self.save_path) {
            Ok(()) => info!("Removed save file {}", self.save_path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No save file to remove at {}", self.save_path.display())
            }
            Err(e) => error!(
                "Failed to remove save file {}: {}",
                self.save_path.display(),
                e
            ),
        }
        self.advance(LifecycleState::Ended);
    }
}

/// Keeps the screen mirror in step with the display
struct ScreenMirror;

impl OutputTap<Session> for ScreenMirror {
    fn on_output(&mut self, chunk: &[u8], dispatch: &mut OutputDispatch<'_, Session>) {
        dispatch.cx.mirror(chunk);
    }
}

/// Swallows the key that dismisses an open overlay
struct OverlayCapture;

impl InputInterceptor<Session> for OverlayCapture {
    fn on_input(&mut self, chunk: &[u8], dispatch: &mut InputDispatch<'_, Session>) -> Verdict {
        let session = &mut *dispatch.cx;
        if session.map_open {
            session.close_map();
            return Verdict::Suppress;
        }
        if chunk == [ESCAPE] && matches!(session.mode, Mode::Help | Mode::Debug) {
            session.set_mode(Mode::Game);
            return Verdict::Suppress;
        }
        Verdict::Forward
    }
}

/// Toggles between the game and `target` on a single key
struct ModeKey {
    key: u8,
    target: Mode,
}

impl InputInterceptor<Session> for ModeKey {
    fn on_input(&mut self, chunk: &[u8], dispatch: &mut InputDispatch<'_, Session>) -> Verdict {
        if chunk != [self.key] {
            return Verdict::Forward;
        }
        let session = &mut *dispatch.cx;
        let next = if session.mode == self.target {
            Mode::Game
        } else {
            self.target
        };
        session.set_mode(next);
        Verdict::Suppress
    }
}

/// Register the session's taps and interceptors.
///
/// The screen mirror goes first so every later tap sees an up to date screen.
pub fn install(
    output: &mut OutputProxy<Session>,
    input: &mut InputProxy<Session>,
    keys: HotKeys,
    span_chunks: bool,
) -> Result<(), regex::Error> {
    output.register("screen-mirror", ScreenMirror);
    LifecycleDetector::install(output, span_chunks)?;

    input.register("overlay-capture", OverlayCapture);
    input.register(
        "help-key",
        ModeKey {
            key: keys.help,
            target: Mode::Help,
        },
    );
    input.register(
        "map-key",
        ModeKey {
            key: keys.map,
            target: Mode::Map,
        },
    );
    input.register(
        "debug-key",
        ModeKey {
            key: DEBUG_KEY,
            target: Mode::Debug,
        },
    );
    Ok(())
}
