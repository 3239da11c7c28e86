pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use toolgate_core::config::{AppConfig, LoadOptions, LogFormat};

#[derive(Debug, Parser)]
#[command(
    name = "toolgate",
    about = "Toolgate operator CLI",
    long_about = "Inspect configuration, check agent definitions and exercise the gated tool path.",
    after_help = "Examples:\n  toolgate config\n  toolgate doctor --json\n  toolgate --config config/toolgate.toml smoke"
)]
pub struct Cli {
    #[arg(
        long,
        global = true,
        help = "Explicit config file (defaults to toolgate.toml or config/toolgate.toml)"
    )]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config,
    #[command(about = "Validate config and check every agent definition for inconsistencies")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Drive one gated call per allowlisted tool and report audit status counts")]
    Smoke,
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let options = load_options(cli.config);

    if let Ok(config) = AppConfig::load(options.clone()) {
        init_logging(&config);
    }

    let result = match cli.command {
        Command::Config => commands::config::run(&options),
        Command::Doctor { json } => commands::doctor::run(&options, json),
        Command::Smoke => commands::smoke::run(&options),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

/// An explicit path must exist; otherwise the default locations are optional.
pub fn load_options(config_path: Option<PathBuf>) -> LoadOptions {
    let require_file = config_path.is_some();
    LoadOptions { config_path, require_file, ..LoadOptions::default() }
}

// Logs go to stderr so command payloads on stdout stay parseable.
fn init_logging(config: &AppConfig) {
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);
    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(log_level)
        .with_writer(std::io::stderr);

    match config.logging.format {
        LogFormat::Compact => builder.compact().init(),
        LogFormat::Pretty => builder.pretty().init(),
        LogFormat::Json => builder.json().init(),
    }
}
