//! Download module
//!
//! Streams remote archives to local files.

use std::path::Path;

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;

use crate::errors::{Result, WizardError};
use crate::security::UrlValidator;

/// Something that can put the bytes behind a URL into a local file
#[async_trait]
pub trait ArchiveDownloader: Send + Sync {
    async fn download(&self, url: &str, destination: &Path) -> Result<()>;
}

/// reqwest-backed downloader
pub struct HttpDownloader {
    client: reqwest::Client,
}

impl HttpDownloader {
    pub fn new(user_agent: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent.to_string())
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ArchiveDownloader for HttpDownloader {
    async fn download(&self, url: &str, destination: &Path) -> Result<()> {
        UrlValidator::validate_archive_url(url)?;
        log::info!("Downloading OAT FW from: {}", url);

        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(WizardError::Download(format!(
                "{} returned {}",
                url,
                response.status()
            )));
        }

        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::File::create(destination).await?;
        let mut stream = response.bytes_stream();
        let mut downloaded: u64 = 0;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            downloaded += chunk.len() as u64;
        }
        file.flush().await?;

        log::info!(
            "Downloaded {:.1} KB to {}",
            downloaded as f64 / 1024.0,
            destination.display()
        );
        Ok(())
    }
}
