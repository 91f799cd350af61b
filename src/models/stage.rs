//! Wizard stages and stage requests

use serde::{Deserialize, Serialize};

/// Where the user currently is in the linear wizard workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    Idle,
    FetchingReleases,
    ReleasesReady,
    Downloading,
    Extracting,
    EnvironmentsReady,
    AwaitingConfigSelection,
    Buildable,
    Building,
    BuildComplete { success: bool },
    Uploadable,
    Uploading,
    UploadComplete { success: bool },
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Idle => write!(f, "Idle"),
            Stage::FetchingReleases => write!(f, "Fetching releases"),
            Stage::ReleasesReady => write!(f, "Releases ready"),
            Stage::Downloading => write!(f, "Downloading"),
            Stage::Extracting => write!(f, "Extracting"),
            Stage::EnvironmentsReady => write!(f, "Environments ready"),
            Stage::AwaitingConfigSelection => write!(f, "Awaiting configuration"),
            Stage::Buildable => write!(f, "Buildable"),
            Stage::Building => write!(f, "Building"),
            Stage::BuildComplete { success: true } => write!(f, "Build succeeded"),
            Stage::BuildComplete { success: false } => write!(f, "Build failed"),
            Stage::Uploadable => write!(f, "Uploadable"),
            Stage::Uploading => write!(f, "Uploading"),
            Stage::UploadComplete { success: true } => write!(f, "Upload succeeded"),
            Stage::UploadComplete { success: false } => write!(f, "Upload failed"),
        }
    }
}

/// User-triggered long-running actions executed by the background worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StageRequest {
    FetchReleases,
    /// Download, extract and parse environments as one chained action
    DownloadFirmware,
    BuildFirmware,
    UploadFirmware,
    RefreshPorts,
}

impl std::fmt::Display for StageRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StageRequest::FetchReleases => write!(f, "fetch releases"),
            StageRequest::DownloadFirmware => write!(f, "download firmware"),
            StageRequest::BuildFirmware => write!(f, "build firmware"),
            StageRequest::UploadFirmware => write!(f, "upload firmware"),
            StageRequest::RefreshPorts => write!(f, "refresh serial ports"),
        }
    }
}
