//! Logging setup on top of `tracing-subscriber`.
//!
//! Logs go to stderr or to a file, never to stdout, which carries the
//! protocol stream in DAP mode.

use std::fs::OpenOptions;
use std::io;
use std::sync::Mutex;

use tracing_subscriber::filter::Targets;
use tracing_subscriber::fmt::{self, writer::BoxMakeWriter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{Layer, Registry};

use crate::config::{LogConfig, LogFormat};
use crate::error::ConfigError;

/// Targets that get their own filter entry.
pub const TARGETS: [&str; 5] = [
    "step_debugger::gate",
    "step_debugger::session",
    "step_debugger::terminal",
    "step_debugger::dap",
    "step_debugger::vm",
];

pub fn targets(config: &LogConfig) -> Result<Targets, ConfigError> {
    let mut targets = Targets::new().with_default(config.global()?);
    for target in TARGETS {
        targets = targets.with_target(target, config.level_for(target)?);
    }
    for target in config.targets.keys() {
        if !TARGETS.contains(&target.as_str()) {
            targets = targets.with_target(target.clone(), config.level_for(target)?);
        }
    }
    Ok(targets)
}

/// Install the global subscriber. A second call is a no-op.
pub fn init(config: &LogConfig) -> Result<(), ConfigError> {
    let filter = targets(config)?;
    let writer = match &config.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|source| ConfigError::Io {
                    path: path.clone(),
                    source,
                })?;
            BoxMakeWriter::new(Mutex::new(file))
        }
        None => BoxMakeWriter::new(io::stderr),
    };
    let ansi = config.file.is_none();

    let layer = format_layer(config.format, writer, ansi).with_filter(filter);
    if tracing_subscriber::registry().with(layer).try_init().is_err() {
        tracing::debug!("logging already initialised");
    }
    Ok(())
}

fn format_layer(
    format: LogFormat,
    writer: BoxMakeWriter,
    ansi: bool,
) -> Box<dyn Layer<Registry> + Send + Sync> {
    match format {
        LogFormat::Pretty => fmt::layer()
            .pretty()
            .with_target(true)
            .with_ansi(ansi)
            .with_writer(writer)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_target(true)
            .with_ansi(ansi)
            .without_time()
            .with_writer(writer)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_target(true)
            .with_timer(fmt::time::time())
            .with_writer(writer)
            .boxed(),
    }
}
