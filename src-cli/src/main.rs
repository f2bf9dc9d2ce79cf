//! subforge Command-Line Interface
//!
//! Turns long recordings such as audiobooks into a single SRT subtitle file,
//! splitting the audio at silences and running whisper.cpp on each piece.

mod colors;
mod commands;
mod exit_codes;
mod logging;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use exit_codes::ExitCode;
use subforge_common::WhisperModel;
use subforge_engine::config::{load_config, load_config_from};

/// subforge - Audio to subtitles with whisper.cpp
#[derive(Parser, Debug)]
#[command(name = "subforge")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output in JSON format for scripting
    #[arg(long, global = true)]
    json: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file to use instead of the platform default
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Transcribe audio files into one subtitle file
    Transcribe(TranscribeArgs),
    /// List whisper models and whether they are downloaded
    Models,
    /// Check that ffmpeg, whisper-cli and a model are available
    Check {
        /// Model to check for
        #[arg(short, long, default_value = "small")]
        model: WhisperModel,
    },
    /// Show version information
    Version,
}

#[derive(Parser, Debug, Clone)]
pub struct TranscribeArgs {
    /// Audio files, treated as one recording in the order given
    #[arg(required = true)]
    inputs: Vec<String>,

    /// Whisper model: tiny, base, small, medium
    #[arg(short, long, default_value = "small")]
    model: WhisperModel,

    /// Output .srt path (overrides configured output directory)
    #[arg(short, long)]
    output: Option<String>,

    /// Spoken language code, or "auto" to detect
    #[arg(short, long)]
    language: Option<String>,

    /// Recognizer threads (default: available cores, up to the configured maximum)
    #[arg(short, long, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
    threads: Option<usize>,
}

fn main() {
    let cli = Cli::parse();
    let log_guard = logging::init(cli.verbose);

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("{}", colors::error(&format!("Failed to create Tokio runtime: {}", e)));
            std::process::exit(ExitCode::GeneralError.as_i32());
        }
    };

    let exit_code = runtime.block_on(run(cli));
    // Flush the log writer before exiting
    drop(log_guard);
    std::process::exit(exit_code.as_i32());
}

async fn run(cli: Cli) -> ExitCode {
    let config = match &cli.config {
        Some(path) => load_config_from(path),
        None => load_config(),
    };

    match cli.command {
        Commands::Transcribe(args) => {
            commands::transcribe(args, config, cli.json, cli.quiet, cli.verbose).await
        }
        Commands::Models => commands::models(&config, cli.json, cli.quiet),
        Commands::Check { model } => commands::check(&config, model, cli.json, cli.quiet),
        Commands::Version => {
            commands::version(cli.json);
            ExitCode::Success
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    /// Verify the CLI definition is valid
    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    /// Test parsing 'transcribe' with defaults
    #[test]
    fn parse_transcribe_defaults() {
        let cli = Cli::try_parse_from(["subforge", "transcribe", "book.mp3"]).unwrap();
        assert!(!cli.json);
        assert!(!cli.quiet);
        assert!(!cli.verbose);
        match cli.command {
            Commands::Transcribe(args) => {
                assert_eq!(args.inputs, vec!["book.mp3"]);
                assert_eq!(args.model, WhisperModel::Small);
                assert!(args.output.is_none());
                assert!(args.language.is_none());
                assert!(args.threads.is_none());
            }
            _ => panic!("Expected Transcribe command"),
        }
    }

    /// Test that input order is preserved
    #[test]
    fn parse_transcribe_multiple_inputs() {
        let cli = Cli::try_parse_from(["subforge", "transcribe", "part2.mp3", "part1.mp3", "part3.m4a"])
            .unwrap();
        match cli.command {
            Commands::Transcribe(args) => {
                assert_eq!(args.inputs, vec!["part2.mp3", "part1.mp3", "part3.m4a"]);
            }
            _ => panic!("Expected Transcribe command"),
        }
    }

    /// Test parsing transcribe with every option
    #[test]
    fn parse_transcribe_with_options() {
        let cli = Cli::try_parse_from([
            "subforge",
            "transcribe",
            "book.mp3",
            "-m",
            "tiny",
            "-o",
            "/tmp/book.srt",
            "-l",
            "de",
            "-t",
            "4",
        ])
        .unwrap();
        match cli.command {
            Commands::Transcribe(args) => {
                assert_eq!(args.model, WhisperModel::Tiny);
                assert_eq!(args.output, Some("/tmp/book.srt".to_string()));
                assert_eq!(args.language, Some("de".to_string()));
                assert_eq!(args.threads, Some(4));
            }
            _ => panic!("Expected Transcribe command"),
        }
    }

    /// Test that zero recognizer threads is rejected
    #[test]
    fn parse_transcribe_zero_threads_rejected() {
        let result = Cli::try_parse_from(["subforge", "transcribe", "book.mp3", "--threads", "0"]);
        assert!(result.is_err());
    }

    /// Test that an unknown model is rejected
    #[test]
    fn parse_transcribe_invalid_model() {
        let result = Cli::try_parse_from(["subforge", "transcribe", "book.mp3", "--model", "huge"]);
        assert!(result.is_err());
    }

    /// Test missing input returns error
    #[test]
    fn parse_transcribe_missing_input() {
        let result = Cli::try_parse_from(["subforge", "transcribe"]);
        assert!(result.is_err());
    }

    /// Test parsing 'models' command
    #[test]
    fn parse_models() {
        let cli = Cli::try_parse_from(["subforge", "models", "--json"]).unwrap();
        assert!(cli.json);
        assert!(matches!(cli.command, Commands::Models));
    }

    /// Test parsing 'check' command
    #[test]
    fn parse_check() {
        let cli = Cli::try_parse_from(["subforge", "check", "-m", "medium"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Check {
                model: WhisperModel::Medium
            }
        ));
    }

    /// Test parsing 'version' command
    #[test]
    fn parse_version() {
        let cli = Cli::try_parse_from(["subforge", "version"]).unwrap();
        assert!(matches!(cli.command, Commands::Version));
    }

    /// Test that global flags work after subcommand
    #[test]
    fn parse_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "subforge",
            "transcribe",
            "book.mp3",
            "--json",
            "-q",
            "--config",
            "/etc/subforge.json",
        ])
        .unwrap();
        assert!(cli.json);
        assert!(cli.quiet);
        assert_eq!(cli.config, Some(PathBuf::from("/etc/subforge.json")));
    }

    /// Test invalid command returns error
    #[test]
    fn parse_invalid_command() {
        let result = Cli::try_parse_from(["subforge", "invalid"]);
        assert!(result.is_err());
    }
}
