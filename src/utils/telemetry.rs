use std::path::PathBuf;

use rama::{
    error::{BoxError, ErrorContext as _},
    telemetry::tracing::{
        self,
        metadata::LevelFilter,
        subscriber::{
            EnvFilter,
            fmt::writer::{BoxMakeWriter, MakeWriterExt as _},
        },
    },
};

use crate::Args;

/// Configures structured logging with runtime control via `RUST_LOG` environment variable.
///
/// Every record is written both to stderr (live stream) and to a log file.
/// The file defaults to a timestamped name in the working directory so that
/// consecutive runs never clobber each other; `--output` overrides it.
///
/// Defaults to INFO level to balance visibility with performance.
/// Use `RUST_LOG=debug` or `RUST_LOG=trace` for troubleshooting.
pub fn init_tracing(args: &Args) -> Result<(), BoxError> {
    let directive = if args.verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    }
    .into();

    let log_path = args
        .output
        .clone()
        .unwrap_or_else(default_log_file_path);

    let file = std::fs::OpenOptions::new()
        .append(true)
        .create(true)
        .open(&log_path)
        .with_context(|| format!("open log file at path '{}'", log_path.display()))?;

    let make_writer = BoxMakeWriter::new(file.and(std::io::stderr));

    let subscriber = tracing::subscriber::fmt()
        .with_ansi(false)
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(directive)
                .from_env_lossy(),
        )
        .with_writer(make_writer);

    if args.pretty {
        subscriber.pretty().try_init()?;
    } else {
        subscriber.try_init()?;
    }

    tracing::info!("tracing is set up; log file: {}", log_path.display());
    Ok(())
}

fn default_log_file_path() -> PathBuf {
    PathBuf::from(format!(
        "dynbench_{}.log",
        chrono::Local::now().format("%Y%m%d%H%M%S")
    ))
}
