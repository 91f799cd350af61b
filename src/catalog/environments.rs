//! Board environment discovery from `platformio.ini`

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use crate::errors::{Result, WizardError};
use crate::models::BoardEnvironment;

/// Build configuration file at the root of the firmware tree
pub const BUILD_CONFIG_FILE: &str = "platformio.ini";

/// Environments that are not flashable targets
const EXCLUDED_ENVIRONMENTS: &[&str] = &["native"];

const FRIENDLY_NAMES: &[(&str, &str)] = &[
    ("ramps", "RAMPS"),
    ("esp32", "ESP32"),
    ("mksgenlv21", "MKS Gen L v2.1"),
    ("mksgenlv2", "MKS Gen L v2"),
    ("mksgenlv1", "MKS Gen L v1"),
];

/// Substrings identifying environments built for AVR boards
const AVR_ENVIRONMENT_MARKERS: &[&str] = &["ramps", "mksgen"];

static ENV_HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\[env:([^\]]+)\]").expect("valid env header regex"));

/// Parser for the `[env:<identifier>]` sections of a build configuration
pub struct BoardEnvironmentCatalog;

impl BoardEnvironmentCatalog {
    /// Extract buildable environments in order of first appearance
    pub fn parse<I, S>(lines: I) -> Vec<BoardEnvironment>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut environments: Vec<BoardEnvironment> = Vec::new();

        for line in lines {
            let Some(captures) = ENV_HEADER.captures(line.as_ref()) else {
                continue;
            };
            let raw = captures[1].trim();
            if raw.is_empty() || EXCLUDED_ENVIRONMENTS.contains(&raw) {
                continue;
            }
            if environments.iter().any(|e| e.raw_identifier == raw) {
                continue;
            }
            environments.push(BoardEnvironment::new(Self::friendly_name(raw), raw));
        }

        environments
    }

    /// Read and parse `platformio.ini` inside an extracted firmware tree
    pub fn load(firmware_dir: &Path) -> Result<Vec<BoardEnvironment>> {
        let ini_path = firmware_dir.join(BUILD_CONFIG_FILE);
        let content = std::fs::read_to_string(&ini_path).map_err(|e| {
            WizardError::Parse(format!("cannot read {}: {}", ini_path.display(), e))
        })?;

        let environments = Self::parse(content.lines());
        log::info!(
            "Found pio environments: {:?}",
            environments
                .iter()
                .map(|e| e.raw_identifier.as_str())
                .collect::<Vec<_>>()
        );

        if environments.is_empty() {
            return Err(WizardError::Parse(format!(
                "no buildable environments in {}",
                ini_path.display()
            )));
        }
        Ok(environments)
    }

    /// Friendly name for a raw identifier (exact, case-sensitive match)
    pub fn friendly_name(raw_identifier: &str) -> &str {
        FRIENDLY_NAMES
            .iter()
            .find(|(raw, _)| *raw == raw_identifier)
            .map(|(_, nice)| *nice)
            .unwrap_or(raw_identifier)
    }

    pub fn is_avr_family(raw_identifier: &str) -> bool {
        AVR_ENVIRONMENT_MARKERS
            .iter()
            .any(|marker| raw_identifier.contains(marker))
    }
}
