//! Anonymized machine identifier

use sha2::{Digest, Sha256};

use crate::errors::{BestEffort, Result};

/// Hashed identifier of this machine, or a readable "unknown-*" marker
pub fn machine_uuid() -> String {
    let raw = raw_machine_id().or_safe_default("unknown".to_string(), "machine id lookup");
    let uuid = hash_machine_id(&raw);
    log::debug!("Got UUID {:?}", uuid);
    uuid
}

/// SHA-256 of the raw identifier; "unknown" markers are kept readable
pub fn hash_machine_id(raw: &str) -> String {
    if raw.to_lowercase().contains("unknown") {
        return raw.to_string();
    }
    format!("{:x}", Sha256::digest(raw.trim().as_bytes()))
}

#[cfg(target_os = "linux")]
fn raw_machine_id() -> Result<String> {
    let id_file = std::path::Path::new("/etc/machine-id");
    if !id_file.exists() {
        return Ok("unknown-linux".to_string());
    }
    Ok(std::fs::read_to_string(id_file)?.trim().to_string())
}

#[cfg(target_os = "windows")]
fn raw_machine_id() -> Result<String> {
    let output = std::process::Command::new("powershell")
        .args([
            "-Command",
            "(Get-CimInstance -Class Win32_ComputerSystemProduct).UUID",
        ])
        .output()?;
    if !output.status.success() {
        return Ok("unknown-windows".to_string());
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

// No reliable lookup yet on macOS
#[cfg(target_os = "macos")]
fn raw_machine_id() -> Result<String> {
    Ok("unknown-macos".to_string())
}

#[cfg(not(any(target_os = "linux", target_os = "windows", target_os = "macos")))]
fn raw_machine_id() -> Result<String> {
    Ok("unknown".to_string())
}
