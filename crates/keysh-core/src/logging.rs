//! Tracing integration for structured logging.
//!
//! Provides logging setup for the server with:
//! - Configurable verbosity levels
//! - Optional file output
//! - JSON or text format

use std::fs::OpenOptions;
use std::path::Path;

use tracing_subscriber::fmt::{self, MakeWriter};
use tracing_subscriber::layer::{Layered, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::error::{Error, Result};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// Structured JSON output.
    Json,
}

/// Map a `-v` count to a tracing level name.
fn level_for(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "error",
        1 => "warn",
        2 => "info",
        3 => "debug",
        _ => "trace",
    }
}

/// Writer layer stacked on the filtered registry.
type OutputLayer = Box<dyn Layer<Layered<EnvFilter, Registry>> + Send + Sync>;

/// Initialize the logging system.
///
/// `verbosity` follows the `-v` count (0=error, 1=warn, 2=info, 3=debug,
/// 4+=trace) unless `RUST_LOG` is set. Logs go to stderr, or are appended to
/// `log_file` when one is given. Fails if a global subscriber is already
/// installed.
pub fn init_logging(verbosity: u8, log_file: Option<&Path>, format: LogFormat) -> Result<()> {
    let level = level_for(verbosity);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "keysh_core={},keysh_server={},russh=warn",
            level, level
        ))
    });

    let layer = match log_file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            output_layer(file, format, verbosity, false)
        }
        None => output_layer(std::io::stderr, format, verbosity, true),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(layer)
        .try_init()
        .map_err(|e| Error::Io(std::io::Error::other(e.to_string())))
}

fn output_layer<W>(writer: W, format: LogFormat, verbosity: u8, ansi: bool) -> OutputLayer
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    // Source locations only help at debug and above
    let located = verbosity >= 3;
    match format {
        LogFormat::Text => fmt::layer()
            .with_writer(writer)
            .with_ansi(ansi)
            .with_target(true)
            .with_file(located)
            .with_line_number(located)
            .boxed(),
        LogFormat::Json => fmt::layer().json().with_writer(writer).boxed(),
    }
}
