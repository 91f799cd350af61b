//! Firmware release models

use serde::{Deserialize, Serialize};

/// One downloadable firmware source bundle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseDescriptor {
    /// Name shown to the user ("develop", "V1.13.2", ...)
    pub display_name: String,
    /// Archive URL (zip)
    pub source_url: String,
}

impl ReleaseDescriptor {
    pub fn new(display_name: impl Into<String>, source_url: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            source_url: source_url.into(),
        }
    }
}

impl std::fmt::Display for ReleaseDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name)
    }
}
