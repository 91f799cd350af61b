//! Board environment models

use serde::{Deserialize, Serialize};

/// A buildable target from `platformio.ini`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardEnvironment {
    /// Friendly name ("MKS Gen L v2.1")
    pub display_name: String,
    /// Identifier as written in the `[env:...]` header
    pub raw_identifier: String,
}

impl BoardEnvironment {
    pub fn new(display_name: impl Into<String>, raw_identifier: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            raw_identifier: raw_identifier.into(),
        }
    }
}

impl std::fmt::Display for BoardEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.display_name == self.raw_identifier {
            write!(f, "{}", self.raw_identifier)
        } else {
            write!(f, "{} ({})", self.display_name, self.raw_identifier)
        }
    }
}
