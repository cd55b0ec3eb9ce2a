//! Boxed overlays drawn on top of the game.

use std::io::{self, Write};
use std::path::Path;

use crossterm::{
    cursor::{MoveTo, RestorePosition, SavePosition},
    queue,
    style::{Print, ResetColor, SetBackgroundColor, SetForegroundColor},
};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::config::KeyBinding;
use crate::driver::LevelMap;
use crate::lifecycle::LifecycleState;
use crate::session::{HotKeys, Mode, DEBUG_KEY};

/// Smallest terminal an overlay is drawn on
const MIN_COLS: u16 = 20;
const MIN_ROWS: u16 = 6;

/// Breadcrumbs listed in the help overlay
const HELP_BREADCRUMBS: usize = 8;

/// Color definition (RGB)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Convert to crossterm Color
    pub fn to_crossterm(self) -> crossterm::style::Color {
        crossterm::style::Color::Rgb {
            r: self.r,
            g: self.g,
            b: self.b,
        }
    }
}

/// Overlay colors
#[derive(Debug, Clone, Copy)]
pub struct Palette {
    pub bg: Color,
    pub fg: Color,
    pub border: Color,
}

impl Default for Palette {
    fn default() -> Self {
        Self {
            bg: Color::new(0, 0, 139),
            fg: Color::new(255, 255, 255),
            border: Color::new(100, 100, 255),
        }
    }
}

/// Session figures shown by the debug overlay
pub struct DebugInfo<'a> {
    pub lifecycle: LifecycleState,
    pub mode: Mode,
    pub transport: String,
    pub save_path: &'a Path,
    pub taps: Vec<&'static str>,
    pub interceptors: Vec<&'static str>,
    pub bytes_out: u64,
    pub bytes_in: u64,
}

/// A titled box of text lines
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Overlay {
    title: String,
    lines: Vec<String>,
    footer: String,
}

impl Overlay {
    pub fn help(
        keys: HotKeys,
        lifecycle: LifecycleState,
        breadcrumbs: Option<&[String]>,
    ) -> Self {
        let binding = |key: u8, action: &str| format!("{:<8} {}", KeyBinding::label(key), action);
        let mut lines = vec![
            binding(keys.help, "toggle this help"),
            binding(keys.map, "show the dungeon map"),
            binding(DEBUG_KEY, "session diagnostics"),
            String::new(),
            format!("Game: {}", lifecycle.label()),
        ];

        if let Some(breadcrumbs) = breadcrumbs {
            lines.push(String::new());
            lines.push("Recent messages:".to_string());
            if breadcrumbs.is_empty() {
                lines.push("  (none yet)".to_string());
            }
            let skip = breadcrumbs.len().saturating_sub(HELP_BREADCRUMBS);
            lines.extend(breadcrumbs[skip..].iter().map(|b| format!("  {}", b)));
        }

        Self {
            title: "Help".to_string(),
            lines,
            footer: format!("{}/Esc:Close", KeyBinding::label(keys.help)),
        }
    }

    pub fn map(map: &LevelMap) -> Self {
        Self {
            title: "Dungeon map".to_string(),
            lines: map.lines(),
            footer: "Any key:Close".to_string(),
        }
    }

    pub fn debug(info: &DebugInfo<'_>) -> Self {
        let list = |names: &[&str]| {
            if names.is_empty() {
                "-".to_string()
            } else {
                names.join(", ")
            }
        };
        Self {
            title: "Debug".to_string(),
            lines: vec![
                format!("lifecycle     {}", info.lifecycle.label()),
                format!("mode          {}", info.mode.label()),
                format!("transport     {}", info.transport),
                format!("save file     {}", info.save_path.display()),
                format!("taps          {}", list(&info.taps)),
                format!("interceptors  {}", list(&info.interceptors)),
                format!("bytes out     {}", info.bytes_out),
                format!("bytes in      {}", info.bytes_in),
            ],
            footer: format!("{}/Esc:Close", KeyBinding::label(DEBUG_KEY)),
        }
    }

    #[cfg(test)]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[cfg(test)]
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Queue the box, centered on a `cols` x `rows` terminal. The cursor is
    /// left where the game put it.
    pub fn draw<W: Write>(
        &self,
        out: &mut W,
        cols: u16,
        rows: u16,
        palette: &Palette,
    ) -> io::Result<()> {
        if cols < MIN_COLS || rows < MIN_ROWS {
            return Ok(());
        }

        let content_width = self
            .lines
            .iter()
            .map(|l| l.width())
            .chain([self.title.width() + 4, self.footer.width()])
            .max()
            .unwrap_or(0);
        let box_width = (content_width + 4).min(cols as usize);
        let inner = box_width - 4;
        let visible = self.lines.len().min(rows as usize - 4);
        let box_height = visible + 4;
        let x = ((cols as usize - box_width) / 2) as u16;
        let y = ((rows as usize - box_height) / 2) as u16;
        let border = palette.border.to_crossterm();
        let text = palette.fg.to_crossterm();

        queue!(
            out,
            SavePosition,
            SetBackgroundColor(palette.bg.to_crossterm())
        )?;

        // Top border: "┌─ Title ─────┐"
        let title = fit(&self.title, box_width - 5).trim_end().to_string();
        let fill = box_width - 5 - title.width();
        queue!(
            out,
            MoveTo(x, y),
            SetForegroundColor(border),
            Print(format!("┌─ {} {}┐", title, "─".repeat(fill)))
        )?;

        let row = |out: &mut W, dy: usize, line: &str| -> io::Result<()> {
            queue!(
                out,
                MoveTo(x, y + dy as u16),
                SetForegroundColor(border),
                Print("│ "),
                SetForegroundColor(text),
                Print(fit(line, inner)),
                SetForegroundColor(border),
                Print(" │")
            )
        };

        for (i, line) in self.lines.iter().take(visible).enumerate() {
            row(out, i + 1, line)?;
        }

        let rule = "─".repeat(box_width - 2);
        queue!(
            out,
            MoveTo(x, y + visible as u16 + 1),
            Print(format!("├{}┤", rule))
        )?;
        row(out, visible + 2, &self.footer)?;
        queue!(
            out,
            MoveTo(x, y + visible as u16 + 3),
            SetForegroundColor(border),
            Print(format!("└{}┘", rule)),
            ResetColor,
            RestorePosition
        )?;
        Ok(())
    }
}

/// Truncate or pad `text` to exactly `width` terminal columns.
fn fit(text: &str, width: usize) -> String {
    let mut out = String::new();
    let mut used = 0;
    for c in text.chars() {
        let w = c.width().unwrap_or(0);
        if used + w > width {
            break;
        }
        out.push(c);
        used += w;
    }
    out.extend(std::iter::repeat(' ').take(width - used));
    out
}
