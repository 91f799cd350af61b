//! Firmware archive download and extraction

pub mod archive;
pub mod download;

pub use archive::{ARCHIVE_FILE_NAME, ArchiveFetcher, FIRMWARE_DIR_NAME, extract_archive};
pub use download::{ArchiveDownloader, HttpDownloader};
