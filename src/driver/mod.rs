//! Structured game state built on top of the screen mirror.
//!
//! The bridge only ever talks to a [`SessionDriver`] through its lifecycle
//! hooks; everything it learns from the screen stays behind that trait.

pub mod map;

use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::core::emulator::TerminalEmulator;
pub use map::LevelMap;

/// Maximum number of breadcrumbs kept
const BREADCRUMB_LIMIT: usize = 200;

/// Version tag written into save files
const SAVE_VERSION: u32 = 1;

#[derive(Error, Debug)]
pub enum DriverError {
    #[error("save file I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error("save file is malformed: {0}")]
    Format(#[from] serde_json::Error),
}

/// Game/session manager fed by the screen mirror
pub trait SessionDriver {
    /// The game is running; begin scraping the screen.
    fn start(&mut self);

    fn persist(&self, path: &Path) -> Result<(), DriverError>;

    fn load(&mut self, path: &Path) -> Result<(), DriverError>;

    /// Called after every output chunk reached the emulator.
    fn observe(&mut self, screen: &dyn TerminalEmulator);

    fn map(&self) -> &LevelMap;

    /// Recent top-line messages, oldest first
    fn breadcrumbs(&self) -> &[String];
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct SaveData {
    version: u32,
    breadcrumbs: Vec<String>,
    map: LevelMap,
}

/// [`SessionDriver`] that tracks message history and visited levels
#[derive(Debug, Default)]
pub struct GameDriver {
    started: bool,
    breadcrumbs: Vec<String>,
    map: LevelMap,
}

impl GameDriver {
    pub fn new() -> Self {
        Self::default()
    }

    fn add_breadcrumb(&mut self, message: &str) {
        let message = message.trim();
        if message.is_empty() {
            return;
        }
        if self.breadcrumbs.last().is_some_and(|last| last == message) {
            return;
        }
        self.breadcrumbs.push(message.to_string());
        while self.breadcrumbs.len() > BREADCRUMB_LIMIT {
            self.breadcrumbs.remove(0);
        }
    }
}

impl SessionDriver for GameDriver {
    fn start(&mut self) {
        self.started = true;
        info!(
            "Driver started ({} breadcrumbs, {} levels known)",
            self.breadcrumbs.len(),
            self.map.len()
        );
    }

    fn persist(&self, path: &Path) -> Result<(), DriverError> {
        let data = SaveData {
            version: SAVE_VERSION,
            breadcrumbs: self.breadcrumbs.clone(),
            map: self.map.clone(),
        };
        let json = serde_json::to_vec_pretty(&data)?;

        // Write then rename so a crash never leaves a half-written save
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    fn load(&mut self, path: &Path) -> Result<(), DriverError> {
        let bytes = fs::read(path)?;
        let data: SaveData = serde_json::from_slice(&bytes)?;
        debug!("Loaded save v{} from {}", data.version, path.display());
        self.breadcrumbs = data.breadcrumbs;
        self.map = data.map;
        Ok(())
    }

    fn observe(&mut self, screen: &dyn TerminalEmulator) {
        if !self.started {
            return;
        }
        let rows = screen.rows();
        if let Some(top) = rows.first() {
            self.add_breadcrumb(top);
        }
        // Status lines sit at the bottom of the screen
        if let Some(level) = rows.iter().rev().find_map(|row| map::parse_dlvl(row)) {
            if self.map.visit(level) {
                debug!("Now on dungeon level {}", level);
            }
        }
    }

    fn map(&self) -> &LevelMap {
        &self.map
    }

    fn breadcrumbs(&self) -> &[String] {
        &self.breadcrumbs
    }
}
