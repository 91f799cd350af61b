//! Stage transition table
//!
//! Pure functions over [`Stage`] and [`WorkflowState`]. The controller calls
//! [`gate`] when a request comes in and [`transition`] once per completion
//! event, after the event's state writes have been applied.

use std::fmt;
use std::path::PathBuf;

use crate::errors::{Result, WizardError};
use crate::models::{BoardEnvironment, ProcessOutcome, ReleaseDescriptor, Stage, StageRequest};
use crate::state::WorkflowState;

/// Completion notifications sent by worker jobs
#[derive(Debug)]
pub enum StageEvent {
    ReleasesFetched(Vec<ReleaseDescriptor>),
    ReleasesFailed(WizardError),
    ArchiveDownloaded(PathBuf),
    FirmwareExtracted(PathBuf),
    EnvironmentsParsed(Vec<BoardEnvironment>),
    /// Download, extraction or parsing failed; the chain stops here
    FirmwareFailed(WizardError),
    BuildFinished(ProcessOutcome),
    /// Build could not be prepared (config copy, hot patch)
    BuildFailed(WizardError),
    UploadFinished(ProcessOutcome),
    UploadFailed(WizardError),
    PortsRefreshed(Vec<String>),
    PortsRefreshFailed(WizardError),
}

impl StageEvent {
    /// The request this event ends, if it is the last event of its job
    pub fn finishes(&self) -> Option<StageRequest> {
        match self {
            StageEvent::ReleasesFetched(_) | StageEvent::ReleasesFailed(_) => {
                Some(StageRequest::FetchReleases)
            }
            StageEvent::ArchiveDownloaded(_) | StageEvent::FirmwareExtracted(_) => None,
            StageEvent::EnvironmentsParsed(_) | StageEvent::FirmwareFailed(_) => {
                Some(StageRequest::DownloadFirmware)
            }
            StageEvent::BuildFinished(_) | StageEvent::BuildFailed(_) => {
                Some(StageRequest::BuildFirmware)
            }
            StageEvent::UploadFinished(_) | StageEvent::UploadFailed(_) => {
                Some(StageRequest::UploadFirmware)
            }
            StageEvent::PortsRefreshed(_) | StageEvent::PortsRefreshFailed(_) => {
                Some(StageRequest::RefreshPorts)
            }
        }
    }
}

impl fmt::Display for StageEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageEvent::ReleasesFetched(r) => write!(f, "{} releases fetched", r.len()),
            StageEvent::ReleasesFailed(e) => write!(f, "release fetch failed: {}", e),
            StageEvent::ArchiveDownloaded(p) => write!(f, "archive downloaded to {}", p.display()),
            StageEvent::FirmwareExtracted(p) => write!(f, "firmware extracted to {}", p.display()),
            StageEvent::EnvironmentsParsed(e) => write!(f, "{} environments parsed", e.len()),
            StageEvent::FirmwareFailed(e) => write!(f, "firmware download failed: {}", e),
            StageEvent::BuildFinished(o) => write!(f, "build finished ({:?})", o.exit_code),
            StageEvent::BuildFailed(e) => write!(f, "build failed: {}", e),
            StageEvent::UploadFinished(o) => write!(f, "upload finished ({:?})", o.exit_code),
            StageEvent::UploadFailed(e) => write!(f, "upload failed: {}", e),
            StageEvent::PortsRefreshed(p) => write!(f, "ports refreshed: {:?}", p),
            StageEvent::PortsRefreshFailed(e) => write!(f, "port refresh failed: {}", e),
        }
    }
}

/// Stage the wizard rests in when nothing is running
pub fn settled_stage(state: &WorkflowState) -> Stage {
    let firmware_ready =
        state.firmware_directory().is_some() && !state.board_environments().is_empty();
    if state.upload_permitted() {
        Stage::Uploadable
    } else if firmware_ready && state.build_permitted() {
        if state.last_build_succeeded() {
            Stage::BuildComplete { success: true }
        } else {
            Stage::Buildable
        }
    } else if firmware_ready {
        if state.selected_environment().is_some() || state.local_config_path().is_some() {
            Stage::AwaitingConfigSelection
        } else {
            Stage::EnvironmentsReady
        }
    } else if !state.release_list().is_empty() {
        Stage::ReleasesReady
    } else {
        Stage::FetchingReleases
    }
}

/// Check whether `request` may start and return the stage it moves to.
///
/// Port refreshes leave the stage alone.
pub fn gate(request: StageRequest, current: Stage, state: &WorkflowState) -> Result<Stage> {
    match request {
        StageRequest::FetchReleases => Ok(Stage::FetchingReleases),
        StageRequest::RefreshPorts => Ok(current),
        StageRequest::DownloadFirmware => {
            if state.selected_release().is_none() {
                return Err(WizardError::StageNotPermitted(
                    "no release selected".to_string(),
                ));
            }
            Ok(Stage::Downloading)
        }
        StageRequest::BuildFirmware => {
            if state.firmware_directory().is_none() {
                return Err(WizardError::StageNotPermitted(
                    "firmware has not been downloaded".to_string(),
                ));
            }
            if !state.build_permitted() {
                return Err(WizardError::StageNotPermitted(
                    "select a board environment and a local configuration first".to_string(),
                ));
            }
            Ok(Stage::Building)
        }
        StageRequest::UploadFirmware => {
            if state.available_serial_ports().is_empty() {
                return Err(WizardError::StageNotPermitted(
                    "no serial ports found, refresh the port list".to_string(),
                ));
            }
            if !state.upload_permitted() || state.firmware_directory().is_none() {
                return Err(WizardError::StageNotPermitted(
                    "a successful build and a selected upload port are required".to_string(),
                ));
            }
            Ok(Stage::Uploading)
        }
    }
}

/// Next stage after `event`, given the already updated `state`
pub fn transition(current: Stage, event: &StageEvent, state: &WorkflowState) -> Stage {
    match (current, event) {
        (_, StageEvent::ReleasesFetched(_)) => settled_stage(state),
        // Retry is manual
        (_, StageEvent::ReleasesFailed(_)) => Stage::FetchingReleases,

        (Stage::Downloading, StageEvent::ArchiveDownloaded(_)) => Stage::Extracting,
        (Stage::Extracting, StageEvent::FirmwareExtracted(_)) => Stage::Extracting,
        (_, StageEvent::EnvironmentsParsed(_)) => settled_stage(state),
        (_, StageEvent::FirmwareFailed(_)) => settled_stage(state),

        (Stage::Building, StageEvent::BuildFinished(outcome)) => {
            if outcome.success() && state.upload_permitted() {
                Stage::Uploadable
            } else {
                Stage::BuildComplete {
                    success: outcome.success(),
                }
            }
        }
        (_, StageEvent::BuildFailed(_)) => Stage::BuildComplete { success: false },

        (Stage::Uploading, StageEvent::UploadFinished(outcome)) => Stage::UploadComplete {
            success: outcome.success(),
        },
        (_, StageEvent::UploadFailed(_)) => Stage::UploadComplete { success: false },

        (Stage::Uploadable, StageEvent::PortsRefreshed(_)) if !state.upload_permitted() => {
            settled_stage(state)
        }
        (current, StageEvent::PortsRefreshed(_) | StageEvent::PortsRefreshFailed(_)) => current,

        (current, other) => {
            log::warn!("Ignoring '{}' in stage {}", other, current);
            current
        }
    }
}
