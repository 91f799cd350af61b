//! Application events for the presentation layer

use crate::models::process::ProcessState;
use crate::models::stage::Stage;

/// Events pushed to whoever renders the wizard (CLI today)
#[derive(Debug, Clone)]
pub enum AppEvent {
    // Process events
    ProcessOutput(String, log::Level, String), // process_name, level, line
    ProcessStateChanged(String, ProcessState), // process_name, state

    // Workflow events
    StageChanged(Stage),

    // User feedback events
    Error(String),
    Warning(String),
    Info(String),
}
