//! Command line surface; flags override `config.toml`.

use std::path::{Path, PathBuf};

use clap::Parser;

use crate::config::{self, Config, ConfigError};
use crate::core::emulator::Encoding;
use crate::core::transport::{TransportKind, TransportSpec};
use crate::session::HotKeys;

/// Game argument that starts the local game in debug (wizard) mode
const DEBUG_ARG: &str = "-D";

#[derive(Parser, Debug)]
#[command(
    name = "nhbridge",
    version,
    about = "Play a terminal game through a bridge that adds help, map and save management",
    after_help = "Keys: Ctrl-Q help, Ctrl-_ map, Ctrl-] debug (help and map are configurable)"
)]
pub struct Cli {
    /// Where the game runs
    #[arg(long, value_enum)]
    pub mode: Option<TransportKind>,

    /// Remote game server; implies --mode remote
    #[arg(long)]
    pub host: Option<String>,

    /// Remote game server port
    #[arg(long)]
    pub port: Option<u16>,

    /// Keep this session's save under its own name
    #[arg(long, value_name = "LABEL")]
    pub save: Option<String>,

    /// Encoding of the game's output
    #[arg(long, value_enum)]
    pub encoding: Option<Encoding>,

    /// List recent game messages in the help overlay
    #[arg(long)]
    pub breadcrumbs: bool,

    /// Start the local game in debug mode
    #[arg(long)]
    pub debug: bool,

    /// Game executable for local mode
    #[arg(long, value_name = "PROGRAM")]
    pub command: Option<String>,
}

/// Fully resolved session settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    pub transport: TransportSpec,
    pub save_path: PathBuf,
    pub encoding: Encoding,
    pub breadcrumbs: bool,
    pub keys: HotKeys,
    pub span_chunks: bool,
}

impl Cli {
    /// Merge with the configuration file.
    pub fn into_options(self, config: &Config, data_dir: &Path) -> Result<Options, ConfigError> {
        let host = self.host.or_else(|| config.host.clone());
        let kind = match (self.mode, &host) {
            (Some(kind), _) => kind,
            (None, Some(_)) => TransportKind::Remote,
            (None, None) => TransportKind::Local,
        };

        let transport = match kind {
            TransportKind::Local => {
                let mut args = config.args.clone();
                if self.debug {
                    args.push(DEBUG_ARG.to_string());
                }
                TransportSpec::Local {
                    program: self.command.unwrap_or_else(|| config.command.clone()),
                    args,
                    term: config.term.clone(),
                }
            }
            TransportKind::Remote => TransportSpec::Remote {
                host: host.ok_or(ConfigError::MissingHost)?,
                port: self.port.unwrap_or(config.port),
                term: config.term.clone(),
            },
        };

        Ok(Options {
            transport,
            save_path: config::save_path(data_dir, self.save.as_deref()),
            encoding: self.encoding.unwrap_or(config.encoding),
            breadcrumbs: self.breadcrumbs || config.breadcrumbs,
            keys: config.hot_keys()?,
            span_chunks: config.lifecycle.span_chunks,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    fn resolve(args: &[&str], config: &Config) -> Result<Options, ConfigError> {
        let cli = Cli::try_parse_from(std::iter::once("nhbridge").chain(args.iter().copied()))
            .unwrap();
        cli.into_options(config, Path::new("/data"))
    }

    #[test]
    fn test_defaults_to_local_game() {
        let options = resolve(&[], &Config::default()).unwrap();
        assert_eq!(
            options.transport,
            TransportSpec::Local {
                program: "nethack".to_string(),
                args: Vec::new(),
                term: "xterm-256color".to_string(),
            }
        );
        assert_eq!(options.save_path, Path::new("/data/save.json"));
        assert_eq!(options.encoding, Encoding::Utf8);
        assert!(!options.breadcrumbs);
        assert!(options.span_chunks);
    }

    #[test]
    fn test_host_implies_remote() {
        let options = resolve(&["--host", "nethack.alt.org"], &Config::default()).unwrap();
        assert_eq!(
            options.transport,
            TransportSpec::Remote {
                host: "nethack.alt.org".to_string(),
                port: 23,
                term: "xterm-256color".to_string(),
            }
        );
    }

    #[test]
    fn test_explicit_mode_wins_over_config_host() {
        let config = Config {
            host: Some("example.org".to_string()),
            ..Config::default()
        };
        let options = resolve(&["--mode", "local"], &config).unwrap();
        assert_eq!(options.transport.kind(), TransportKind::Local);

        let options = resolve(&["--port", "2323"], &config).unwrap();
        assert!(matches!(
            options.transport,
            TransportSpec::Remote { port: 2323, .. }
        ));
    }

    #[test]
    fn test_remote_without_host() {
        assert_eq!(
            resolve(&["--mode", "remote"], &Config::default()),
            Err(ConfigError::MissingHost)
        );
    }

    #[test]
    fn test_local_flags() {
        let options = resolve(
            &[
                "--debug",
                "--command",
                "/usr/games/nethack",
                "--save",
                "wizard",
                "--encoding",
                "latin-1",
                "--breadcrumbs",
            ],
            &Config::default(),
        )
        .unwrap();
        assert_eq!(
            options.transport,
            TransportSpec::Local {
                program: "/usr/games/nethack".to_string(),
                args: vec!["-D".to_string()],
                term: "xterm-256color".to_string(),
            }
        );
        assert_eq!(options.save_path, Path::new("/data/save-wizard.json"));
        assert_eq!(options.encoding, Encoding::Latin1);
        assert!(options.breadcrumbs);
    }

    #[test]
    fn test_help_and_bad_flags() {
        let help = Cli::try_parse_from(["nhbridge", "--help"]).unwrap_err();
        assert_eq!(help.kind(), ErrorKind::DisplayHelp);

        let short = Cli::try_parse_from(["nhbridge", "-h"]).unwrap_err();
        assert_eq!(short.kind(), ErrorKind::DisplayHelp);

        assert!(Cli::try_parse_from(["nhbridge", "--mode", "carrier-pigeon"]).is_err());
        assert!(Cli::try_parse_from(["nhbridge", "--port", "99999"]).is_err());
    }
}
