//! Logging utilities and initialization for oatfw

use anyhow::Result;
use env_logger::{Builder, Target};
use log::LevelFilter;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Map `-v`/`-q` flags to a level filter
pub fn level_for(verbose: u8, quiet: bool) -> LevelFilter {
    match (quiet, verbose) {
        (true, _) => LevelFilter::Error,
        (false, 0) => LevelFilter::Info,
        (false, 1) => LevelFilter::Debug,
        (false, _) => LevelFilter::Trace,
    }
}

/// Per-run log file under the local data directory
pub fn default_log_file() -> PathBuf {
    let date_str = chrono::Local::now().format("%Y-%m-%d-%H-%M-%S");
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(crate::APP_NAME)
        .join("logs")
        .join(format!("{}_{}.log", crate::APP_NAME, date_str))
}

/// Initialize logging for the CLI.
///
/// Records always go to stderr; with `log_file` they are copied to that file
/// as well so a failed build can be attached to a bug report.
pub fn init_cli_logging(verbose: u8, quiet: bool, log_file: Option<&Path>) -> Result<()> {
    let level = level_for(verbose, quiet);

    let target = match log_file {
        Some(path) => Target::Pipe(Box::new(TeeWriter::open(path)?)),
        None => Target::Stderr,
    };

    Builder::from_default_env()
        .target(target)
        .filter_level(level)
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] {}: {}",
                buf.timestamp(),
                record.level(),
                record.module_path().unwrap_or("unknown"),
                record.args()
            )
        })
        .init();

    // Initialize panic logging
    log_panics::init();

    match log_file {
        Some(path) => log::debug!(
            "Logging initialized with level {:?} (logfile={})",
            level,
            path.display()
        ),
        None => log::debug!("Logging initialized with level {:?}", level),
    }
    Ok(())
}

/// Writes every record to stderr and a log file
struct TeeWriter {
    file: File,
}

impl TeeWriter {
    fn open(path: &Path) -> std::io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self { file })
    }
}

impl Write for TeeWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        std::io::stderr().write_all(buf)?;
        self.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        std::io::stderr().flush()?;
        self.file.flush()
    }
}
