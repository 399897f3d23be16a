//! Command-line interface for connectflow
//!
//! Provides argument parsing using clap derive macros.

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;
use std::time::Duration;

/// Realtime voice and video sessions with a conversational agent
#[derive(Parser, Debug)]
#[command(
    name = "connectflow",
    version,
    about = "Realtime voice and video sessions with a conversational agent"
)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Only print errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose logging (-v: debug, -vv: trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Open a session with the agent
    Run(RunArgs),

    /// List available audio input devices
    Devices,

    /// View configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

/// Options for `connectflow run`
#[derive(clap::Args, Debug, Default)]
pub struct RunArgs {
    /// Start in video mode
    #[arg(long)]
    pub video: bool,

    /// Replay a WAV file instead of the microphone
    #[arg(long, value_name = "PATH")]
    pub input_wav: Option<PathBuf>,

    /// Audio input device (overrides [audio] device)
    #[arg(long, value_name = "DEVICE")]
    pub device: Option<String>,

    /// Agent address as host:port (overrides [agent] address)
    #[arg(long, value_name = "ADDR")]
    pub address: Option<String>,

    /// Do not play the agent's audio
    #[arg(long)]
    pub mute: bool,

    /// Write the session summary as JSON to this file
    #[arg(long, value_name = "PATH")]
    pub summary: Option<PathBuf>,

    /// Leave automatically after this long. Examples: 90s, 5m, 1h30m
    #[arg(long, value_name = "DURATION", value_parser = parse_duration)]
    pub max_duration: Option<Duration>,
}

/// Configuration actions
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,
    /// Print the configuration file path
    Path,
}

/// Parse a duration string.
///
/// Supports any duration format accepted by `humantime`, plus bare numbers
/// as seconds.
fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if let Ok(secs) = s.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    humantime::parse_duration(s).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_args(cli: Cli) -> RunArgs {
        match cli.command {
            Commands::Run(args) => args,
            other => panic!("Expected run, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_run_defaults() {
        let cli = Cli::try_parse_from(["connectflow", "run"]).unwrap();
        assert!(!cli.quiet);
        assert_eq!(cli.verbose, 0);
        assert!(cli.config.is_none());

        let args = run_args(cli);
        assert!(!args.video);
        assert!(!args.mute);
        assert!(args.input_wav.is_none());
        assert!(args.summary.is_none());
        assert!(args.max_duration.is_none());
    }

    #[test]
    fn test_parse_run_with_options() {
        let cli = Cli::try_parse_from([
            "connectflow",
            "run",
            "--video",
            "--input-wav",
            "hello.wav",
            "--mute",
            "--summary",
            "out.json",
            "--address",
            "10.0.0.5:7878",
            "--max-duration",
            "1m30s",
        ])
        .unwrap();
        let args = run_args(cli);

        assert!(args.video);
        assert!(args.mute);
        assert_eq!(args.input_wav, Some(PathBuf::from("hello.wav")));
        assert_eq!(args.summary, Some(PathBuf::from("out.json")));
        assert_eq!(args.address.as_deref(), Some("10.0.0.5:7878"));
        assert_eq!(args.max_duration, Some(Duration::from_secs(90)));
    }

    #[test]
    fn test_parse_verbose_double() {
        let cli = Cli::try_parse_from(["connectflow", "-vv", "devices"]).unwrap();
        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.command, Commands::Devices));
    }

    #[test]
    fn test_global_options_after_command() {
        let cli =
            Cli::try_parse_from(["connectflow", "run", "--quiet", "--config", "/tmp/c.toml"])
                .unwrap();
        assert!(cli.quiet);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/c.toml")));
    }

    #[test]
    fn test_parse_config_actions() {
        let cli = Cli::try_parse_from(["connectflow", "config", "show"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Config {
                action: ConfigAction::Show
            }
        ));
        let cli = Cli::try_parse_from(["connectflow", "config", "path"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Config {
                action: ConfigAction::Path
            }
        ));
    }

    #[test]
    fn test_config_requires_action() {
        assert!(Cli::try_parse_from(["connectflow", "config"]).is_err());
    }

    #[test]
    fn test_command_is_required() {
        assert!(Cli::try_parse_from(["connectflow"]).is_err());
    }

    #[test]
    fn test_invalid_max_duration() {
        let result = Cli::try_parse_from(["connectflow", "run", "--max-duration", "soon"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_duration_bare_seconds() {
        assert_eq!(parse_duration("45"), Ok(Duration::from_secs(45)));
        assert_eq!(parse_duration(" 2m "), Ok(Duration::from_secs(120)));
    }

    #[test]
    fn test_parse_completions() {
        let cli = Cli::try_parse_from(["connectflow", "completions", "bash"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Completions { shell: Shell::Bash }
        ));
    }
}
