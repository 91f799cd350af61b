//! External process models

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Lifecycle state of a supervised process slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessState {
    NotRunning,
    Starting,
    Running,
}

impl std::fmt::Display for ProcessState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessState::NotRunning => write!(f, "Not running"),
            ProcessState::Starting => write!(f, "Starting"),
            ProcessState::Running => write!(f, "Running"),
        }
    }
}

/// Which stream a line of process output came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
    /// Diagnostics redirected by the flashing tool into a log file
    ToolLog,
}

/// Everything needed to launch one run of a process slot
#[derive(Debug, Clone, Default)]
pub struct ProcessInvocation {
    pub extra_args: Vec<String>,
    pub env_overrides: BTreeMap<String, String>,
}

impl ProcessInvocation {
    pub fn with_args<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            extra_args: args.into_iter().map(Into::into).collect(),
            env_overrides: BTreeMap::new(),
        }
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_overrides.insert(key.into(), value.into());
        self
    }
}

/// Terminal result of one supervised run
#[derive(Debug, Clone)]
pub struct ProcessOutcome {
    pub name: String,
    /// `None` when the process could not be launched or was killed by a signal
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}
