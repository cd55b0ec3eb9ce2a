//! Frame composition on the real terminal.
//!
//! Game output reaches the display directly through the output proxy; the
//! renderer only adds what the bridge draws itself. A frame is assembled in
//! memory and written with a single flush.

use std::io::{self, Write};

use crossterm::{
    cursor::{MoveTo, Show},
    queue,
    style::{Attribute, ResetColor, SetAttribute},
    terminal,
};
use tracing::debug;

use super::overlay::{Overlay, Palette};
use crate::core::emulator::TerminalEmulator;

/// Composes and flushes frames
pub struct Renderer {
    /// Whether raw mode is on
    initialized: bool,
    /// The last flushed frame left an overlay on screen
    overlay_visible: bool,
    palette: Palette,
    frame: Vec<u8>,
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer {
    pub fn new() -> Self {
        Self {
            initialized: false,
            overlay_visible: false,
            palette: Palette::default(),
            frame: Vec::with_capacity(16 * 1024),
        }
    }

    /// Get terminal size, 80x24 when stdout is not a terminal
    pub fn size() -> (u16, u16) {
        terminal::size().unwrap_or((80, 24))
    }

    /// Put the terminal into raw mode so every key reaches the game.
    pub fn init(&mut self) -> io::Result<()> {
        terminal::enable_raw_mode()?;
        self.initialized = true;
        debug!("Raw mode enabled");
        Ok(())
    }

    /// Restore the terminal
    pub fn cleanup(&mut self) -> io::Result<()> {
        if !self.initialized {
            return Ok(());
        }
        self.initialized = false;

        let mut stdout = io::stdout();
        // Best effort; raw mode must be left even if these fail
        let _ = queue!(stdout, ResetColor, SetAttribute(Attribute::Reset), Show);
        let _ = stdout.flush();

        terminal::disable_raw_mode()?;
        debug!("Raw mode disabled");
        Ok(())
    }

    #[cfg(test)]
    pub fn overlay_visible(&self) -> bool {
        self.overlay_visible
    }

    /// Repaint the game from the mirror if an overlay covered it.
    pub fn render_game(&mut self, screen: &dyn TerminalEmulator) -> io::Result<()> {
        if !self.overlay_visible {
            return Ok(());
        }
        self.frame.extend_from_slice(&screen.formatted());
        let (row, col) = screen.cursor();
        queue!(self.frame, MoveTo(col, row))?;
        self.overlay_visible = false;
        Ok(())
    }

    pub fn render_overlay(
        &mut self,
        overlay: &Overlay,
        screen: &dyn TerminalEmulator,
    ) -> io::Result<()> {
        let (cols, rows) = screen.size();
        overlay.draw(&mut self.frame, cols, rows, &self.palette)?;
        self.overlay_visible = true;
        Ok(())
    }

    /// Write the pending frame, if any.
    pub fn flush(&mut self, out: &mut dyn Write) -> io::Result<()> {
        if self.frame.is_empty() {
            return Ok(());
        }
        out.write_all(&self.frame)?;
        out.flush()?;
        self.frame.clear();
        Ok(())
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        let _ = self.cleanup();
    }
}
