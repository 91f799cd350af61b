//! Command line argument parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, long_about = None)]
#[command(name = "oatfw")]
#[command(about = "🔭 OpenAstroTracker firmware wizard - download, build and flash OAT firmware")]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Decrease logging verbosity (only errors)
    #[arg(short = 'q', long = "quiet", global = true)]
    pub quiet: bool,

    /// Configuration file (defaults to <config dir>/oatfw/config.toml)
    #[arg(long, value_name = "PATH", global = true)]
    pub config_file: Option<PathBuf>,

    /// Also write the log to a file; without a value a dated file in the data directory is used
    #[arg(long, value_name = "PATH", num_args = 0..=1, global = true)]
    pub log_file: Option<Option<PathBuf>>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Clone)]
pub enum Commands {
    /// List available firmware releases
    Releases,
    /// Download a release and list its board environments
    Environments {
        /// Release index as printed by `releases` (0 is develop)
        #[arg(short, long, default_value_t = 0)]
        release: usize,
    },
    /// Refresh and list serial ports
    Ports,
    /// Download a release and build it for one board environment
    Build {
        /// Release index as printed by `releases` (0 is develop)
        #[arg(short, long, default_value_t = 0)]
        release: usize,
        /// Board environment identifier (e.g. ramps, esp32)
        #[arg(short, long)]
        env: String,
        /// Local configuration file (Configuration_local.hpp)
        #[arg(short, long, value_name = "PATH")]
        local_config: PathBuf,
    },
    /// Build and flash the firmware to a serial port
    Flash {
        /// Release index as printed by `releases` (0 is develop)
        #[arg(short, long, default_value_t = 0)]
        release: usize,
        /// Board environment identifier (e.g. ramps, esp32)
        #[arg(short, long)]
        env: String,
        /// Local configuration file (Configuration_local.hpp)
        #[arg(short, long, value_name = "PATH")]
        local_config: PathBuf,
        /// Serial port to flash to (e.g., /dev/ttyUSB0, COM3)
        #[arg(short, long)]
        port: String,
        /// Submit an anonymous usage record after a successful upload
        #[arg(long)]
        telemetry: bool,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Log file requested with `--log-file`, if any
    pub fn log_file_path(&self) -> Option<PathBuf> {
        match &self.log_file {
            Some(Some(path)) => Some(path.clone()),
            Some(None) => Some(crate::utils::logging::default_log_file()),
            None => None,
        }
    }
}
