//! In-place corrections applied to `platformio.ini` right before a build
//!
//! Two known upstream defects are patched:
//! - git dependencies pinned as `<host>/<path>@<tag>`, which PlatformIO only
//!   understands as `<host>/<path>#<tag>`
//! - the unpinned AVR platform line, which pulls a toolchain the firmware does
//!   not build with
//!
//! The file is only rewritten when a scan of the current content finds
//! something to fix, so an already-patched file keeps its timestamp.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use crate::catalog::environments::BoardEnvironmentCatalog;
use crate::errors::{Result, WizardError};

pub const AVR_PLATFORM_LINE: &str = "platform = atmelavr";
pub const AVR_PLATFORM_PINNED: &str = "platform = atmelavr@4.0.1";

static VERSION_PIN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?P<source>[A-Za-z0-9][A-Za-z0-9-]*(?:\.[A-Za-z0-9-]+)+/[^\s@#]+)@(?P<tag>[^\s@#]+)")
        .expect("valid version pin regex")
});

/// What a scan found (or a patch changed)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HotPatchReport {
    pub version_pins: usize,
    pub platform_pins: usize,
}

impl HotPatchReport {
    pub fn changed(&self) -> bool {
        self.version_pins > 0 || self.platform_pins > 0
    }
}

fn split_line_ending(line: &str) -> (&str, &str) {
    if let Some(body) = line.strip_suffix("\r\n") {
        (body, "\r\n")
    } else if let Some(body) = line.strip_suffix('\n') {
        (body, "\n")
    } else {
        (line, "")
    }
}

fn is_broken_platform_line(line: &str) -> bool {
    line.trim() == AVR_PLATFORM_LINE
}

/// Count the lines that need patching for `environment`
pub fn scan(content: &str, environment: &str) -> HotPatchReport {
    let avr = BoardEnvironmentCatalog::is_avr_family(environment);
    let mut report = HotPatchReport::default();
    for line in content.lines() {
        report.version_pins += VERSION_PIN.find_iter(line).count();
        if avr && is_broken_platform_line(line) {
            report.platform_pins += 1;
        }
    }
    report
}

/// Return `content` with all patches for `environment` applied
pub fn patch_content(content: &str, environment: &str) -> String {
    let avr = BoardEnvironmentCatalog::is_avr_family(environment);
    let mut patched = String::with_capacity(content.len());

    for line in content.split_inclusive('\n') {
        let (body, ending) = split_line_ending(line);
        if avr && is_broken_platform_line(body) {
            let indent = &body[..body.len() - body.trim_start().len()];
            patched.push_str(indent);
            patched.push_str(AVR_PLATFORM_PINNED);
        } else {
            patched.push_str(&VERSION_PIN.replace_all(body, "${source}#${tag}"));
        }
        patched.push_str(ending);
    }
    patched
}

/// Patch `ini_path` in place for a build of `environment`
pub fn apply_hot_patches(ini_path: &Path, environment: &str) -> Result<HotPatchReport> {
    let content = std::fs::read_to_string(ini_path).map_err(|e| {
        WizardError::Parse(format!("cannot read {}: {}", ini_path.display(), e))
    })?;

    let report = scan(&content, environment);
    if !report.changed() {
        log::debug!("{} needs no hot patches", ini_path.display());
        return Ok(report);
    }

    log::info!(
        "Hot patching {} ({} version pins, {} platform pins)",
        ini_path.display(),
        report.version_pins,
        report.platform_pins
    );
    std::fs::write(ini_path, patch_content(&content, environment))?;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const INI: &str = "\
[env]
lib_deps =
  https://github.com/OpenAstroTech/AccelStepper@1.61.1
  waspinator/AccelStepper@^1.61
  teemuatlut/TMCStepper @ 0.7.3

[env:ramps]
platform = atmelavr
board = megaatmega2560

[env:esp32]
platform = espressif32@3.2.0
";

    #[test]
    fn test_version_pin_rewritten_for_every_environment() {
        let patched = patch_content(INI, "esp32");
        assert!(patched.contains("https://github.com/OpenAstroTech/AccelStepper#1.61.1"));
        // registry pins are not git URLs
        assert!(patched.contains("waspinator/AccelStepper@^1.61"));
        assert!(patched.contains("platform = espressif32@3.2.0"));
        // not an AVR build
        assert!(patched.contains("\nplatform = atmelavr\n"));
    }

    #[test]
    fn test_avr_platform_pinned() {
        let patched = patch_content(INI, "ramps");
        assert!(patched.contains(&format!("\n{}\n", AVR_PLATFORM_PINNED)));
        assert!(!patched.contains("\nplatform = atmelavr\n"));
        assert_eq!(scan(INI, "ramps"), HotPatchReport { version_pins: 1, platform_pins: 1 });
    }

    #[test]
    fn test_patch_is_idempotent() {
        let once = patch_content(INI, "mksgenlv21");
        let twice = patch_content(&once, "mksgenlv21");
        assert_eq!(once, twice);
        assert!(!scan(&once, "mksgenlv21").changed());
    }

    #[test]
    fn test_crlf_preserved() {
        let ini = "[env:ramps]\r\nplatform = atmelavr\r\n";
        assert_eq!(
            patch_content(ini, "ramps"),
            format!("[env:ramps]\r\n{}\r\n", AVR_PLATFORM_PINNED)
        );
    }

    #[test]
    fn test_apply_twice_leaves_file_identical() {
        let dir = TempDir::new().unwrap();
        let ini_path = dir.path().join("platformio.ini");
        std::fs::write(&ini_path, INI).unwrap();

        let first = apply_hot_patches(&ini_path, "ramps").unwrap();
        assert!(first.changed());
        let after_first = std::fs::read(&ini_path).unwrap();
        let modified = std::fs::metadata(&ini_path).unwrap().modified().unwrap();

        let second = apply_hot_patches(&ini_path, "ramps").unwrap();
        assert!(!second.changed());
        assert_eq!(std::fs::read(&ini_path).unwrap(), after_first);
        assert_eq!(std::fs::metadata(&ini_path).unwrap().modified().unwrap(), modified);
    }

    #[test]
    fn test_missing_ini_is_parse_error() {
        let dir = TempDir::new().unwrap();
        let result = apply_hot_patches(&dir.path().join("platformio.ini"), "esp32");
        assert!(matches!(result, Err(WizardError::Parse(_))));
    }
}
