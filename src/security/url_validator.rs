//! URL validation for remote archives and service endpoints
//!
//! Archive URLs come from a remote catalog and end up being downloaded and
//! unpacked, so they get the same scrutiny as user input.

use url::Url;

use crate::errors::{Result, WizardError};

/// URL validator for everything oatfw fetches from or posts to
pub struct UrlValidator;

impl UrlValidator {
    /// Validate a release archive URL before downloading it
    pub fn validate_archive_url(archive_url: &str) -> Result<()> {
        let parsed = Self::parse_http_url(archive_url)?;

        if parsed.path().split('/').any(|segment| segment == "..") {
            return Err(WizardError::Download(format!(
                "Archive URL contains path traversal: {}",
                archive_url
            )));
        }

        log::debug!("Archive URL validation passed for: {}", archive_url);
        Ok(())
    }

    /// Validate a configured service endpoint (release catalog, telemetry)
    pub fn validate_endpoint_url(endpoint: &str) -> Result<()> {
        Self::parse_http_url(endpoint)
            .map(|_| ())
            .map_err(|e| WizardError::Config(e.to_string()))
    }

    fn parse_http_url(raw: &str) -> Result<Url> {
        let parsed = Url::parse(raw)
            .map_err(|e| WizardError::Download(format!("Invalid URL format '{}': {}", raw, e)))?;

        // Check scheme
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(WizardError::Download(format!(
                "Invalid URL scheme '{}'. Only http and https are allowed",
                parsed.scheme()
            )));
        }

        // Validate host
        let host = parsed
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| WizardError::Download(format!("URL must have a valid host: {}", raw)))?;
        Self::validate_host(host)?;

        if !parsed.username().is_empty() || parsed.password().is_some() {
            return Err(WizardError::Download(
                "URL must not embed credentials".to_string(),
            ));
        }

        if parsed.fragment().is_some() {
            return Err(WizardError::Download(
                "URL should not contain fragments".to_string(),
            ));
        }

        Ok(parsed)
    }

    fn validate_host(host: &str) -> Result<()> {
        if host.len() > 253 {
            return Err(WizardError::Download("Host name too long".to_string()));
        }
        if host.contains("..") || host.starts_with('.') || host.starts_with('-') {
            return Err(WizardError::Download(format!("Suspicious host name: {}", host)));
        }
        Ok(())
    }
}
