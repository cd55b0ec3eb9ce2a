//! nhbridge - a session bridge for terminal games
//!
//! nhbridge sits between a game (a local NetHack process or a remote telnet
//! server) and your terminal. Every byte passes through untouched while the
//! bridge watches the stream to add its own features.
//!
//! # Features
//!
//! - **Transparent proxy**: game output and keystrokes are forwarded verbatim
//! - **Lifecycle tracking**: restore, start and end of a game are detected from output
//! - **Save management**: session state is saved while playing and removed on game over
//! - **Overlays**: help, dungeon map and session diagnostics on hot keys
//!
//! # Quick Start
//!
//! ```text
//! nhbridge                          # Play nethack locally
//! nhbridge --host nethack.alt.org   # Play on a telnet server
//! nhbridge --save valkyrie          # Keep a separate save
//! ```
//!
//! # Keys
//!
//! | Key | Action |
//! |-----|--------|
//! | Ctrl-Q | Toggle help |
//! | Ctrl-_ | Show the dungeon map |
//! | Ctrl-] | Toggle diagnostics |
//! | Esc | Close help or diagnostics |

mod cli;
mod config;
mod core;
mod driver;
mod event_loop;
mod lifecycle;
mod proxy;
mod session;
mod ui;

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::os::fd::AsFd;
use std::path::Path;
use std::process;
use std::sync::Mutex;

use anyhow::Context;
use clap::error::ErrorKind;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::cli::Cli;
use crate::config::Config;
use crate::core::emulator::Vt100Emulator;
use crate::core::transport::{self, Transport};
use crate::driver::GameDriver;
use crate::event_loop::{Bridge, ExitReason, View};
use crate::proxy::{InputProxy, OutputProxy};
use crate::session::Session;
use crate::ui::Renderer;

/// Environment variable holding the log filter
const LOG_ENV: &str = "NHBRIDGE_LOG";

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if e.kind() == ErrorKind::DisplayHelp => {
            // Usage is not a successful run
            eprint!("{}", e);
            process::exit(1);
        }
        Err(e) => e.exit(),
    };

    if let Err(e) = run(cli) {
        error!("{:#}", e);
        eprintln!("nhbridge: {:#}", e);
        process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let data_dir = config::data_dir();
    config::ensure_data_dir(&data_dir)
        .with_context(|| format!("cannot create data directory {}", data_dir.display()))?;
    init_logging(&data_dir);
    info!("nhbridge {} starting", env!("CARGO_PKG_VERSION"));

    let config = Config::load(&data_dir);
    let options = cli.into_options(&config, &data_dir)?;
    let (cols, rows) = Renderer::size();
    info!(
        "{:?} game, {} output, terminal {}x{}",
        options.transport.kind(),
        options.encoding.name(),
        cols,
        rows
    );
    info!("Save file: {}", options.save_path.display());

    // Connect before touching the terminal so failures print normally
    let mut transport = transport::build(&options.transport, cols, rows);
    transport.open()?;

    let session = Session::new(
        options.save_path.clone(),
        Box::new(Vt100Emulator::new(cols, rows, options.encoding)),
        Box::new(GameDriver::new()),
    );
    let mut output = OutputProxy::new();
    let mut input = InputProxy::new();
    session::install(&mut output, &mut input, options.keys, options.span_chunks)
        .context("invalid lifecycle trigger")?;

    // Unbuffered handle on stdin; std's Stdin would hold bytes back from poll
    let local_input = File::from(
        io::stdin()
            .as_fd()
            .try_clone_to_owned()
            .context("cannot duplicate stdin")?,
    );

    let mut bridge = Bridge::new(
        session,
        output,
        input,
        transport,
        local_input,
        io::stdout(),
        View {
            keys: options.keys,
            show_breadcrumbs: options.breadcrumbs,
        },
    );
    bridge
        .renderer_mut()
        .init()
        .context("cannot switch the terminal to raw mode")?;

    let result = bridge.run();
    if let Err(e) = bridge.renderer_mut().cleanup() {
        error!("Failed to restore terminal: {}", e);
    }

    let mut transport = bridge.into_transport();
    let reason = match result {
        Ok(reason) => reason,
        Err(e) => {
            close_after_failure(transport.as_mut());
            return Err(e.into());
        }
    };

    let drained = transport.drain();
    let status = transport.close()?;
    let mut stdout = io::stdout();
    stdout.write_all(&drained)?;
    stdout.flush()?;

    match reason {
        ExitReason::ChildExited(status) => eprintln!("\r\nGame exited ({})", status),
        ExitReason::Disconnected => eprintln!("\r\nConnection closed by {}", transport.describe()),
        ExitReason::InputClosed => eprintln!("\r\nInput closed"),
    }
    info!("nhbridge exiting ({:?}, status {:?})", reason, status);
    Ok(())
}

/// Close the transport on the fatal path; the loop error is what gets reported.
fn close_after_failure(transport: &mut dyn Transport) {
    if let Err(e) = transport.close() {
        error!("Failed to close {}: {}", transport.describe(), e);
    }
}

/// Log to `<data dir>/nhbridge.log`; the terminal belongs to the game.
fn init_logging(data_dir: &Path) {
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(data_dir.join(config::LOG_FILE));

    if let Ok(file) = log_file {
        let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(filter)
            .with_writer(Mutex::new(file))
            .with_ansi(false)
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    }
}
