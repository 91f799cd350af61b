//! Archive fetching and extraction
//!
//! Source archives produced by forges contain a single top-level directory
//! named after the project and revision (`proj-v1.0/`). That directory is
//! renamed to a short fixed name after extraction so deep firmware trees stay
//! under path-length limits.

use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use zip::ZipArchive;

use crate::errors::{Result, WizardError};
use crate::fetch::download::ArchiveDownloader;
use crate::utils::file_utils::remove_dir_all_forced;

/// Fixed name the archive is downloaded to inside the work directory
pub const ARCHIVE_FILE_NAME: &str = "OATFW.zip";

/// Fixed name of the extracted firmware tree inside the work directory
pub const FIRMWARE_DIR_NAME: &str = "OATFW";

/// Downloads release archives and unpacks them into the work directory
#[derive(Clone)]
pub struct ArchiveFetcher {
    downloader: Arc<dyn ArchiveDownloader>,
}

impl ArchiveFetcher {
    pub fn new(downloader: Arc<dyn ArchiveDownloader>) -> Self {
        Self { downloader }
    }

    pub fn archive_path(destination_root: &Path) -> PathBuf {
        destination_root.join(ARCHIVE_FILE_NAME)
    }

    pub fn firmware_path(destination_root: &Path) -> PathBuf {
        destination_root.join(FIRMWARE_DIR_NAME)
    }

    /// Download `url` to the fixed archive path under `destination_root`
    pub async fn download(&self, url: &str, destination_root: &Path) -> Result<PathBuf> {
        let archive = Self::archive_path(destination_root);
        self.downloader.download(url, &archive).await?;
        Ok(archive)
    }

    /// Extract on a blocking thread
    pub async fn extract(&self, archive: &Path, destination_root: &Path) -> Result<PathBuf> {
        let archive = archive.to_path_buf();
        let root = destination_root.to_path_buf();
        tokio::task::spawn_blocking(move || extract_archive(&archive, &root))
            .await
            .map_err(|e| WizardError::MalformedArchive(format!("extraction task failed: {}", e)))?
    }

    pub async fn fetch_and_extract(&self, url: &str, destination_root: &Path) -> Result<PathBuf> {
        let archive = self.download(url, destination_root).await?;
        self.extract(&archive, destination_root).await
    }
}

/// Name of the directory the archive's first entry describes
fn top_level_directory<R: std::io::Read + std::io::Seek>(
    archive: &mut ZipArchive<R>,
) -> Result<PathBuf> {
    if archive.is_empty() {
        return Err(WizardError::MalformedArchive("archive is empty".to_string()));
    }
    let first = archive.by_index_raw(0)?;
    if !first.is_dir() {
        return Err(WizardError::MalformedArchive(format!(
            "could not find FW top level directory, first entry is {}",
            first.name()
        )));
    }
    let enclosed = first.enclosed_name().ok_or_else(|| {
        WizardError::MalformedArchive(format!("unsafe entry name {}", first.name()))
    })?;
    match enclosed.components().next() {
        Some(Component::Normal(name)) => Ok(PathBuf::from(name)),
        _ => Err(WizardError::MalformedArchive(format!(
            "unusable top level directory {}",
            first.name()
        ))),
    }
}

/// Extract `archive_path` below `destination_root` and move its top-level
/// directory to `destination_root/OATFW`.
///
/// Any previous extraction at that location is deleted first. The archive
/// itself is left in place.
pub fn extract_archive(archive_path: &Path, destination_root: &Path) -> Result<PathBuf> {
    log::info!("Extracting FW from {}", archive_path.display());

    let file = File::open(archive_path)?;
    let mut archive = ZipArchive::new(BufReader::new(file))?;
    let top_level = top_level_directory(&mut archive)?;

    let firmware_dir = ArchiveFetcher::firmware_path(destination_root);
    let unpacked_dir = destination_root.join(&top_level);
    for stale in [&firmware_dir, &unpacked_dir] {
        if stale.exists() {
            log::warn!("Deleting previous extraction {}", stale.display());
            remove_dir_all_forced(stale)?;
        }
    }
    fs::create_dir_all(destination_root)?;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let entry_path = match entry.enclosed_name() {
            Some(p) => p.to_path_buf(),
            None => {
                log::warn!("Skipping unsafe archive entry {}", entry.name());
                continue;
            }
        };

        let output_path = destination_root.join(&entry_path);

        if entry.is_dir() {
            fs::create_dir_all(&output_path)?;
        } else {
            if let Some(parent) = output_path.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut outfile = File::create(&output_path)?;
            std::io::copy(&mut entry, &mut outfile)?;
        }
    }

    if unpacked_dir != firmware_dir {
        fs::rename(&unpacked_dir, &firmware_dir)?;
    }
    log::info!("Extracted FW to {}", firmware_dir.display());
    Ok(firmware_dir)
}
