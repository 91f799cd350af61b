//! Firmware release catalog

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::CatalogConfig;
use crate::errors::{Result, WizardError};
use crate::models::ReleaseDescriptor;
use crate::security::UrlValidator;

/// Display name of the synthetic unstable-branch entry
pub const DEVELOP_RELEASE_NAME: &str = "develop";

/// Source of the ordered release list
#[async_trait]
pub trait ReleaseSource: Send + Sync {
    /// Fetch releases, synthetic develop entry first
    async fn fetch_releases(&self) -> Result<Vec<ReleaseDescriptor>>;
}

#[derive(Debug, Deserialize)]
struct CatalogEntry {
    name: Option<String>,
    tag_name: Option<String>,
    zipball_url: Option<String>,
}

/// Turn a releases API response into the release list
pub fn parse_release_catalog(body: &str, develop_archive_url: &str) -> Result<Vec<ReleaseDescriptor>> {
    let entries: Vec<CatalogEntry> = serde_json::from_str(body)?;

    let mut releases = vec![ReleaseDescriptor::new(
        DEVELOP_RELEASE_NAME,
        develop_archive_url,
    )];
    for entry in entries {
        let Some(url) = entry.zipball_url else {
            log::warn!("Skipping release without archive: {:?}", entry.name);
            continue;
        };
        if let Err(e) = UrlValidator::validate_archive_url(&url) {
            log::warn!("Skipping release with unusable archive URL: {}", e);
            continue;
        }
        let name = entry
            .name
            .filter(|n| !n.trim().is_empty())
            .or(entry.tag_name)
            .unwrap_or_else(|| url.clone());
        releases.push(ReleaseDescriptor::new(name, url));
    }
    Ok(releases)
}

/// GitHub releases API client
pub struct GithubReleaseCatalog {
    client: reqwest::Client,
    releases_url: String,
    develop_archive_url: String,
}

impl GithubReleaseCatalog {
    pub fn new(config: &CatalogConfig) -> Result<Self> {
        UrlValidator::validate_endpoint_url(&config.releases_url)?;
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self {
            client,
            releases_url: config.releases_url.clone(),
            develop_archive_url: config.develop_archive_url.clone(),
        })
    }
}

#[async_trait]
impl ReleaseSource for GithubReleaseCatalog {
    async fn fetch_releases(&self) -> Result<Vec<ReleaseDescriptor>> {
        log::info!("Grabbing available FW versions from {}", self.releases_url);

        let response = self.client.get(&self.releases_url).send().await?;
        if !response.status().is_success() {
            return Err(WizardError::Download(format!(
                "release catalog returned {}",
                response.status()
            )));
        }
        let body = response.text().await?;
        parse_release_catalog(&body, &self.develop_archive_url)
    }
}
