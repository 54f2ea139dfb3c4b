// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

use clap::{Args, Parser, Subcommand};
use mediakit_core::MediaRange;
use schemars::schema_for;
use std::io::Write;
use std::path::PathBuf;
use tracing::{error, info, warn};

use crate::config;
use crate::logging::LoggingHandle;
use crate::transform::{self, TransformRequest};

type LogInitFn = fn(&config::LogConfig) -> Result<LoggingHandle, Box<dyn std::error::Error>>;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "mkit.toml")]
    pub config: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Transform an audio file into a 16-bit PCM WAV file
    Transform(TransformArgs),
    /// Manage configuration
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Args, Debug)]
pub struct TransformArgs {
    /// Input audio file (any format the decoder understands)
    pub input: PathBuf,
    /// Output WAV file
    pub output: PathBuf,
    /// Output sample rate in Hz (default: keep the input rate)
    #[arg(long)]
    pub sample_rate: Option<u32>,
    /// Output channel count (default: keep the input layout)
    #[arg(long)]
    pub channels: Option<u32>,
    /// Logarithmic volume from 0.0 (mute) to 2.0; 1.0 keeps the level
    #[arg(long)]
    pub volume: Option<f64>,
    /// Start of the selection in microseconds
    #[arg(long)]
    pub start_us: Option<i64>,
    /// End of the selection in microseconds
    #[arg(long)]
    pub end_us: Option<i64>,
}

impl TransformArgs {
    /// Flags override the `[audio]` section.
    pub fn to_request(&self, audio: &config::AudioConfig) -> TransformRequest {
        let mut request = TransformRequest::new(&self.input, &self.output, audio);
        request.sample_rate = self.sample_rate.or(request.sample_rate);
        request.channels = self.channels.or(request.channels);
        request.volume = self.volume.unwrap_or(request.volume);
        let defaults = MediaRange::default();
        request.range = MediaRange::new(
            self.start_us.unwrap_or(defaults.start_us),
            self.end_us.unwrap_or(defaults.end_us),
        );
        request
    }
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Generate a default config file and print it to stdout
    Default,
    /// Generate a JSON schema for the config and print it to stdout
    Schema,
}

/// Handle the "transform" command.
/// Exits the process on error with status code 1
// Allow eprintln before logging is initialized (CLI output)
#[allow(clippy::disallowed_macros)]
async fn handle_transform_command(config_path: &str, args: &TransformArgs, init_logging: LogInitFn) {
    let config_result = match config::load(config_path) {
        Ok(result) => result,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        },
    };

    let _log_handle = match init_logging(&config_result.config.log) {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            std::process::exit(1);
        },
    };

    if let Some(missing_file) = &config_result.file_missing {
        info!(config_path = %missing_file, "Config file not found, using defaults");
    }

    let request = args.to_request(&config_result.config.audio);
    info!(
        input = %request.input.display(),
        output = %request.output.display(),
        sample_rate = ?request.sample_rate,
        channels = ?request.channels,
        volume = request.volume,
        start_us = request.range.start_us,
        end_us = request.range.end_us,
        "Starting transform"
    );

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };
    let progress = |progress: f32| {
        eprint!("\rprogress: {:>5.1}%", progress * 100.0);
        let _ = std::io::stderr().flush();
    };

    match transform::run(&request, &config_result.config, shutdown, progress).await {
        Ok(stats) => {
            eprintln!();
            for (track, info) in stats.iter().enumerate() {
                println!(
                    "track {track}: {} -> {} samples written in {} ms",
                    info.decoder_codec.as_deref().unwrap_or("?"),
                    info.samples_written,
                    info.duration_ms
                );
            }
            println!("wrote {}", request.output.display());
        },
        Err(e) => {
            eprintln!();
            error!(error = %e, "Transform failed");
            eprintln!("{e:#}");
            std::process::exit(1);
        },
    }
}

/// Handle the "config default" command - print default config to stdout
// Allow println for CLI output to stdout (intentional)
#[allow(clippy::disallowed_macros)]
fn handle_config_default_command() {
    match config::generate_default() {
        Ok(toml_string) => {
            println!("# Default mkit configuration file");
            println!("{toml_string}");
        },
        Err(e) => {
            eprintln!("Failed to generate default config: {e}");
            std::process::exit(1);
        },
    }
}

/// Handle the "config schema" command - print JSON schema to stdout
// Allow println for CLI output to stdout (intentional)
#[allow(clippy::disallowed_macros)]
fn handle_config_schema_command() {
    let schema = schema_for!(config::MkitConfig);
    match serde_json::to_string_pretty(&schema) {
        Ok(json) => {
            println!("{json}");
        },
        Err(e) => {
            eprintln!("Failed to generate config schema: {e}");
            std::process::exit(1);
        },
    }
}

/// Handle CLI commands
pub async fn handle_command(cli: &Cli, init_logging: LogInitFn) {
    match &cli.command {
        Commands::Transform(args) => {
            handle_transform_command(&cli.config, args, init_logging).await;
        },
        Commands::Config(ConfigCommands::Default) => {
            handle_config_default_command();
        },
        Commands::Config(ConfigCommands::Schema) => {
            handle_config_schema_command();
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_the_audio_section() {
        let cli = Cli::parse_from([
            "mkit",
            "transform",
            "in.mp3",
            "out.wav",
            "--channels",
            "1",
            "--volume",
            "0.5",
            "--start-us",
            "1000",
        ]);
        let Commands::Transform(args) = cli.command else {
            panic!("expected the transform command");
        };
        let audio = config::AudioConfig { sample_rate: Some(44_100), channels: Some(2), volume: 1.0 };
        let request = args.to_request(&audio);

        assert_eq!(cli.config, "mkit.toml");
        assert_eq!(request.sample_rate, Some(44_100));
        assert_eq!(request.channels, Some(1));
        assert!((request.volume - 0.5).abs() < f64::EPSILON);
        assert_eq!(request.range, MediaRange::new(1_000, i64::MAX));
    }
}
