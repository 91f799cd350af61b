//! Remote collaborators used by the stage controller

use std::sync::Arc;

use crate::catalog::{GithubReleaseCatalog, ReleaseSource};
use crate::config::AppConfig;
use crate::errors::Result;
use crate::fetch::{ArchiveDownloader, HttpDownloader};
use crate::telemetry::{HttpTelemetrySink, TelemetrySink};

/// Release catalog, archive downloader and telemetry sink, swappable in tests
#[derive(Clone)]
pub struct WizardServices {
    pub releases: Arc<dyn ReleaseSource>,
    pub downloader: Arc<dyn ArchiveDownloader>,
    pub telemetry: Arc<dyn TelemetrySink>,
}

impl WizardServices {
    /// HTTP-backed services from the application configuration
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        Ok(Self {
            releases: Arc::new(GithubReleaseCatalog::new(&config.catalog)?),
            downloader: Arc::new(HttpDownloader::new(&config.catalog.user_agent)?),
            telemetry: Arc::new(HttpTelemetrySink::new(
                &config.telemetry,
                &config.catalog.user_agent,
            )?),
        })
    }
}
