use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::{error, info};

use step_debugger::config::{Config, LogFormat};
use step_debugger::{dap, executor, logging, RunMode};

#[derive(Parser)]
#[command(name = "step-debugger", version, about = "Step through programs one instruction at a time")]
struct Cli {
    /// Serve the debug adapter protocol on stdin/stdout.
    #[arg(long, alias = "debug-adapter")]
    dap: bool,

    /// JSON configuration file.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level override (error, warn, info, debug, trace).
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Log format override (pretty, compact, json).
    #[arg(long, value_name = "FORMAT")]
    log_format: Option<LogFormat>,

    /// Append logs to this file instead of stderr.
    #[arg(long, value_name = "FILE")]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run a program without tracing.
    Run { file: PathBuf },
    /// Run a program, pausing before each statement.
    Debug { file: PathBuf },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut config = match Config::load_or_default(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("❌ {}", err);
            return ExitCode::from(2);
        }
    };
    if let Some(level) = cli.log_level {
        config.log.level = level;
    }
    if let Some(format) = cli.log_format {
        config.log.format = format;
    }
    if let Some(file) = cli.log_file {
        config.log.file = Some(file);
    }
    if let Err(err) = config.validate().and_then(|()| logging::init(&config.log)) {
        eprintln!("❌ {}", err);
        return ExitCode::from(2);
    }

    if cli.dap {
        return match dap::run_dap_mode(config) {
            Ok(()) => ExitCode::SUCCESS,
            Err(err) => {
                error!(target: "step_debugger::dap", error = %err, "DAP server failed");
                ExitCode::FAILURE
            }
        };
    }

    let (file, mode) = match cli.command {
        Some(Command::Run { file }) => (file, RunMode::Normal),
        Some(Command::Debug { file }) => (file, RunMode::Debug),
        None => {
            eprintln!("Nothing to do: pass `run FILE`, `debug FILE` or --dap (see --help)");
            return ExitCode::from(2);
        }
    };

    info!(target: "step_debugger::session", file = %file.display(), ?mode, "starting");
    match executor::run_file(&config, &file, mode) {
        Ok(outcome) => ExitCode::from(u8::try_from(outcome.exit_code()).unwrap_or(1)),
        Err(err) => {
            eprintln!("❌ {}", err);
            ExitCode::from(2)
        }
    }
}
