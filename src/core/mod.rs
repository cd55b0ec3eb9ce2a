//! Core session plumbing.
//!
//! This module contains the low-level pieces the bridge is built on:
//!
//! - **transport**: the duplex byte stream to the game (local PTY child or remote login)
//! - **emulator**: the screen-buffer mirror fed by the game's output
//!
//! # Architecture
//!
//! ```text
//! Transport (dyn)
//! ├── LocalTransport  (PTY master + child process)
//! └── RemoteTransport (TCP stream + telnet codec)
//!
//! TerminalEmulator (dyn)
//! └── Vt100Emulator   (vt100 parser + encoding)
//! ```

pub mod emulator;
pub mod transport;
