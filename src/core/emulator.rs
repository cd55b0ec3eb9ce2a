//! Screen-buffer mirror of the game's terminal.
//!
//! The bridge never interprets escape sequences itself; it feeds every output
//! chunk into a [`TerminalEmulator`] and lets the session driver and renderer
//! query the resulting screen.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use vt100::Parser;

/// Scrollback kept by the mirror; the game redraws in place so little is needed
const SCROLLBACK_LINES: usize = 100;

/// Byte encoding of the game's output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
pub enum Encoding {
    #[default]
    #[serde(rename = "utf-8", alias = "utf8")]
    #[value(name = "utf-8", alias = "utf8")]
    Utf8,
    #[serde(rename = "latin-1", alias = "latin1", alias = "iso-8859-1")]
    #[value(name = "latin-1", alias = "latin1")]
    Latin1,
}

impl Encoding {
    pub fn name(self) -> &'static str {
        match self {
            Encoding::Utf8 => "UTF-8",
            Encoding::Latin1 => "Latin-1",
        }
    }
}

/// Consumes terminal output and maintains a queryable screen
pub trait TerminalEmulator {
    fn feed(&mut self, bytes: &[u8]);

    /// (cols, rows)
    fn size(&self) -> (u16, u16);

    /// Plain text of every visible row, trailing blanks trimmed.
    fn rows(&self) -> Vec<String>;

    /// Escape sequences that repaint the real terminal to match the mirror.
    fn formatted(&self) -> Vec<u8>;

    /// (row, col) of the cursor
    fn cursor(&self) -> (u16, u16);
}

/// [`TerminalEmulator`] backed by the `vt100` parser
pub struct Vt100Emulator {
    parser: Parser,
    encoding: Encoding,
    cols: u16,
    rows: u16,
}

impl Vt100Emulator {
    pub fn new(cols: u16, rows: u16, encoding: Encoding) -> Self {
        Self {
            parser: Parser::new(rows, cols, SCROLLBACK_LINES),
            encoding,
            cols,
            rows,
        }
    }
}

impl TerminalEmulator for Vt100Emulator {
    fn feed(&mut self, bytes: &[u8]) {
        match self.encoding {
            Encoding::Utf8 => self.parser.process(bytes),
            Encoding::Latin1 => {
                // Every Latin-1 byte maps to the code point of the same value
                let text: String = bytes.iter().map(|&b| b as char).collect();
                self.parser.process(text.as_bytes());
            }
        }
    }

    fn size(&self) -> (u16, u16) {
        (self.cols, self.rows)
    }

    fn rows(&self) -> Vec<String> {
        self.parser
            .screen()
            .rows(0, self.cols)
            .map(|row| row.trim_end().to_string())
            .collect()
    }

    fn formatted(&self) -> Vec<u8> {
        self.parser.screen().contents_formatted()
    }

    fn cursor(&self) -> (u16, u16) {
        self.parser.screen().cursor_position()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feed_updates_rows() {
        let mut emulator = Vt100Emulator::new(40, 5, Encoding::Utf8);
        emulator.feed(b"Hello\r\n\x1b[3;5Hthere");
        let rows = emulator.rows();
        assert_eq!(rows.len(), 5);
        assert_eq!(rows[0], "Hello");
        assert_eq!(rows[2], "    there");
        assert_eq!(emulator.size(), (40, 5));
        assert_eq!(emulator.cursor(), (2, 9));
    }

    #[test]
    fn test_chunk_split_escape_sequence() {
        let mut emulator = Vt100Emulator::new(40, 5, Encoding::Utf8);
        emulator.feed(b"\x1b[2");
        emulator.feed(b";3Hx");
        assert_eq!(emulator.rows()[1], "  x");
    }

    #[test]
    fn test_latin1_is_transcoded() {
        let mut emulator = Vt100Emulator::new(20, 2, Encoding::Latin1);
        emulator.feed(&[b'c', 0xe9, b'!']);
        assert_eq!(emulator.rows()[0], "c\u{e9}!");
    }

    #[test]
    fn test_formatted_contains_text() {
        let mut emulator = Vt100Emulator::new(20, 2, Encoding::Utf8);
        emulator.feed(b"@ Dlvl:1");
        let formatted = String::from_utf8_lossy(&emulator.formatted()).to_string();
        assert!(formatted.contains("@ Dlvl:1"));
    }
}
