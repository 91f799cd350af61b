//! Custom error types for oatfw

use std::fmt;

/// Main error type for wizard operations
#[derive(Debug)]
pub enum WizardError {
    /// A stage was requested while the process slot or worker was occupied
    AlreadyRunning(String),
    /// Network failure or non-success HTTP status while downloading
    Download(String),
    /// Archive does not follow the single top-level directory convention
    MalformedArchive(String),
    /// Board configuration file missing or malformed
    Parse(String),
    /// External tool reported failure
    ProcessExitNonZero { name: String, code: Option<i32> },
    /// Telemetry could not be delivered
    TelemetrySubmission(String),
    /// Stage gating refused the request
    StageNotPermitted(String),
    /// Selection does not refer to a known entry
    InvalidSelection(String),
    /// The background worker did not become idle in time
    WorkerStalled(String),
    /// Configuration related errors
    Config(String),
    /// General I/O errors
    Io(std::io::Error),
    /// Serialization errors
    Serialization(String),
}

impl fmt::Display for WizardError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WizardError::AlreadyRunning(what) => write!(f, "Already running: {}", what),
            WizardError::Download(msg) => write!(f, "Download error: {}", msg),
            WizardError::MalformedArchive(msg) => write!(f, "Malformed archive: {}", msg),
            WizardError::Parse(msg) => write!(f, "Parse error: {}", msg),
            WizardError::ProcessExitNonZero { name, code } => match code {
                Some(code) => write!(f, "{} exited with status {}", name, code),
                None => write!(f, "{} terminated without an exit status", name),
            },
            WizardError::TelemetrySubmission(msg) => {
                write!(f, "Telemetry submission failed: {}", msg)
            }
            WizardError::StageNotPermitted(msg) => write!(f, "Stage not permitted: {}", msg),
            WizardError::InvalidSelection(msg) => write!(f, "Invalid selection: {}", msg),
            WizardError::WorkerStalled(msg) => write!(f, "Worker stalled: {}", msg),
            WizardError::Config(msg) => write!(f, "Configuration error: {}", msg),
            WizardError::Io(err) => write!(f, "I/O error: {}", err),
            WizardError::Serialization(msg) => write!(f, "Serialization error: {}", msg),
        }
    }
}

impl std::error::Error for WizardError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            WizardError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for WizardError {
    fn from(err: std::io::Error) -> Self {
        WizardError::Io(err)
    }
}

impl From<serde_json::Error> for WizardError {
    fn from(err: serde_json::Error) -> Self {
        WizardError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for WizardError {
    fn from(err: toml::de::Error) -> Self {
        WizardError::Config(err.to_string())
    }
}

impl From<reqwest::Error> for WizardError {
    fn from(err: reqwest::Error) -> Self {
        WizardError::Download(err.to_string())
    }
}

impl From<zip::result::ZipError> for WizardError {
    fn from(err: zip::result::ZipError) -> Self {
        WizardError::MalformedArchive(err.to_string())
    }
}

/// Result type alias for wizard operations
pub type Result<T> = std::result::Result<T, WizardError>;

/// Best-effort results for non-critical lookups (catalog, telemetry collection).
///
/// Failures are logged and replaced by a caller-supplied safe default, so the
/// caller never sees an error.
pub trait BestEffort<T> {
    fn or_safe_default(self, default: T, what: &str) -> T;
}

impl<T> BestEffort<T> for Result<T> {
    fn or_safe_default(self, default: T, what: &str) -> T {
        match self {
            Ok(value) => value,
            Err(e) => {
                log::warn!("{} failed, using fallback: {}", what, e);
                default
            }
        }
    }
}
