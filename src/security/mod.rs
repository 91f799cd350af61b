//! Security checks for oatfw
//!
//! Validation of URLs received from remote catalogs or configuration before
//! anything is downloaded or submitted.

pub mod url_validator;

pub use url_validator::UrlValidator;
