//! Configuration and on-disk layout for nhbridge.
//!
//! This module provides:
//! - TOML configuration file loading from `<data dir>/config.toml`
//! - Hot key parsing (`"ctrl-q"`, `"^_"`, `"?"`)
//! - Data directory and save file resolution
//!
//! # Configuration File
//!
//! ```toml
//! # Game started in local mode
//! command = "nethack"
//! args = ["-u", "Agent"]
//! term = "xterm-256color"
//!
//! # Remote server; setting a host selects remote mode
//! host = "nethack.alt.org"
//! port = 23
//!
//! # Encoding of the game's output: utf-8, latin-1
//! encoding = "utf-8"
//!
//! # Show recent messages in the help overlay
//! breadcrumbs = false
//!
//! [keys]
//! help = "ctrl-q"
//! map = "ctrl-_"
//!
//! [lifecycle]
//! span_chunks = true
//! ```
//!
//! The debug overlay is always on Ctrl-].

use std::fs::{self, DirBuilder};
use std::io;
use std::os::unix::fs::DirBuilderExt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::core::emulator::Encoding;
use crate::session::{HotKeys, DEBUG_KEY};

pub const CONFIG_FILE: &str = "config.toml";
pub const LOG_FILE: &str = "nhbridge.log";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid key binding {binding:?}: {reason}")]
    Key { binding: String, reason: &'static str },

    #[error("remote mode needs a host (--host or `host` in config.toml)")]
    MissingHost,
}

/// Main configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Game executable for local mode
    pub command: String,
    /// Extra arguments for the game
    pub args: Vec<String>,
    /// TERM announced to the game
    pub term: String,
    pub host: Option<String>,
    pub port: u16,
    pub encoding: Encoding,
    pub breadcrumbs: bool,
    pub keys: KeysConfig,
    pub lifecycle: LifecycleConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            command: "nethack".to_string(),
            args: Vec::new(),
            term: "xterm-256color".to_string(),
            host: None,
            port: 23,
            encoding: Encoding::Utf8,
            breadcrumbs: false,
            keys: KeysConfig::default(),
            lifecycle: LifecycleConfig::default(),
        }
    }
}

/// Hot key configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeysConfig {
    pub help: String,
    pub map: String,
}

impl Default for KeysConfig {
    fn default() -> Self {
        Self {
            help: "ctrl-q".to_string(),
            map: "ctrl-_".to_string(),
        }
    }
}

/// Lifecycle detection settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Detect banners split across two reads
    pub span_chunks: bool,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self { span_chunks: true }
    }
}

impl Config {
    /// Load `config.toml` from `dir`, falling back to defaults.
    pub fn load(dir: &Path) -> Self {
        let path = dir.join(CONFIG_FILE);
        let Ok(content) = fs::read_to_string(&path) else {
            return Self::default();
        };
        match toml::from_str(&content) {
            Ok(config) => config,
            Err(e) => {
                warn!("Ignoring malformed {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Resolve the configured hot keys.
    pub fn hot_keys(&self) -> Result<HotKeys, ConfigError> {
        let help = KeyBinding::parse(&self.keys.help)?;
        let map = KeyBinding::parse(&self.keys.map)?;

        for (binding, key) in [(&self.keys.help, help), (&self.keys.map, map)] {
            if key == DEBUG_KEY {
                return Err(ConfigError::Key {
                    binding: binding.clone(),
                    reason: "reserved for the debug overlay",
                });
            }
        }
        if help == map {
            return Err(ConfigError::Key {
                binding: self.keys.map.clone(),
                reason: "same as the help key",
            });
        }
        Ok(HotKeys { help, map })
    }
}

/// Single-byte key binding
pub struct KeyBinding;

impl KeyBinding {
    /// Parse `ctrl-x`, `c-x`, `^x` or a single printable character.
    pub fn parse(binding: &str) -> Result<u8, ConfigError> {
        let error = |reason| ConfigError::Key {
            binding: binding.to_string(),
            reason,
        };
        let lower = binding.trim().to_lowercase();

        let ctrl = ["ctrl-", "ctrl+", "c-", "^"]
            .iter()
            .find_map(|prefix| lower.strip_prefix(prefix));
        if let Some(rest) = ctrl {
            let &[c] = rest.as_bytes() else {
                return Err(error("expected a single character after ctrl"));
            };
            return match c {
                b'a'..=b'z' => Ok(c - b'a' + 1),
                b'@' | b'[' | b'\\' | b']' | b'^' | b'_' => Ok(c & 0x1f),
                b'?' => Ok(0x7f),
                _ => Err(error("no control code for this character")),
            };
        }

        match binding.as_bytes() {
            &[c] if c.is_ascii_graphic() => Ok(c),
            _ => Err(error("expected ctrl-<char> or a single character")),
        }
    }

    /// Human readable name of a key byte.
    pub fn label(key: u8) -> String {
        match key {
            0x1b => "Esc".to_string(),
            0x7f => "Ctrl-?".to_string(),
            0x01..=0x1a => format!("Ctrl-{}", (b'A' + key - 1) as char),
            0x00 | 0x1c..=0x1f => format!("Ctrl-{}", (key | 0x40) as char),
            c if c.is_ascii_graphic() => (c as char).to_string(),
            c => format!("0x{:02x}", c),
        }
    }
}

/// Per-user data directory (`$XDG_DATA_HOME/nhbridge`, `~/.nhbridge` as a
/// fallback).
pub fn data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join("nhbridge"))
        .or_else(|| dirs::home_dir().map(|home| home.join(".nhbridge")))
        .unwrap_or_else(|| PathBuf::from(".nhbridge"))
}

/// Create `dir` readable and writable by the owner only.
pub fn ensure_data_dir(dir: &Path) -> io::Result<()> {
    DirBuilder::new().recursive(true).mode(0o700).create(dir)
}

/// `save.json`, or `save-<label>.json` for a named save.
pub fn save_path(dir: &Path, label: Option<&str>) -> PathBuf {
    match label {
        Some(label) => {
            let label: String = label
                .chars()
                .map(|c| {
                    if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                        c
                    } else {
                        '_'
                    }
                })
                .collect();
            dir.join(format!("save-{}.json", label))
        }
        None => dir.join("save.json"),
    }
}
