//! Mutable record of wizard progress
//!
//! Every field has an explicit setter that validates the new value, applies
//! dependent resets, recomputes the derived permissions and logs the change.
//! Derived permissions are recomputed last, so a reset is never observable
//! together with a stale permission.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::errors::{Result, WizardError};
use crate::models::{BoardEnvironment, ReleaseDescriptor};

#[derive(Debug, Clone, Default, Serialize)]
pub struct WorkflowState {
    selected_release_index: Option<usize>,
    release_list: Vec<ReleaseDescriptor>,
    firmware_directory: Option<PathBuf>,
    board_environments: Vec<BoardEnvironment>,
    selected_environment: Option<String>,
    local_config_path: Option<PathBuf>,
    last_build_succeeded: bool,
    available_serial_ports: Vec<String>,
    selected_upload_port: Option<String>,

    build_permitted: bool,
    upload_permitted: bool,
}

macro_rules! log_change {
    ($field:literal, $old:expr, $new:expr) => {
        log::debug!("WorkflowState updated: {} {:?} -> {:?}", $field, $old, $new)
    };
}

impl WorkflowState {
    pub fn new() -> Self {
        Self::default()
    }

    // Getters

    pub fn selected_release_index(&self) -> Option<usize> {
        self.selected_release_index
    }

    pub fn release_list(&self) -> &[ReleaseDescriptor] {
        &self.release_list
    }

    pub fn selected_release(&self) -> Option<&ReleaseDescriptor> {
        self.selected_release_index
            .and_then(|idx| self.release_list.get(idx))
    }

    pub fn firmware_directory(&self) -> Option<&Path> {
        self.firmware_directory.as_deref()
    }

    pub fn board_environments(&self) -> &[BoardEnvironment] {
        &self.board_environments
    }

    pub fn selected_environment(&self) -> Option<&str> {
        self.selected_environment.as_deref()
    }

    pub fn local_config_path(&self) -> Option<&Path> {
        self.local_config_path.as_deref()
    }

    pub fn last_build_succeeded(&self) -> bool {
        self.last_build_succeeded
    }

    pub fn available_serial_ports(&self) -> &[String] {
        &self.available_serial_ports
    }

    pub fn selected_upload_port(&self) -> Option<&str> {
        self.selected_upload_port.as_deref()
    }

    /// Local configuration and board environment are both chosen
    pub fn build_permitted(&self) -> bool {
        self.build_permitted
    }

    /// A build succeeded and an upload port is chosen
    pub fn upload_permitted(&self) -> bool {
        self.upload_permitted
    }

    // Setters

    /// Replace the release list.
    ///
    /// The selection follows its release (matched by archive URL) to its new
    /// index. A selected release missing from the new list is dropped together
    /// with everything derived from it.
    pub fn set_release_list(&mut self, releases: Vec<ReleaseDescriptor>) {
        log_change!(
            "release_list",
            self.release_list.len(),
            releases.len()
        );
        let selected_url = self.selected_release().map(|r| r.source_url.clone());
        self.release_list = releases;
        if let Some(url) = selected_url {
            let moved_to = self
                .release_list
                .iter()
                .position(|r| r.source_url == url);
            if moved_to != self.selected_release_index {
                log_change!("selected_release_index", self.selected_release_index, moved_to);
                self.selected_release_index = moved_to;
            }
            if moved_to.is_none() {
                self.reset_release_dependents();
            }
        } else if self.selected_release_index.take().is_some() {
            self.reset_release_dependents();
        }
        self.recompute();
    }

    /// Select a release by index into the release list.
    ///
    /// Picking a different release drops the environments, the environment
    /// selection and the build result, forcing the downstream stages to be
    /// redone.
    pub fn select_release(&mut self, index: usize) -> Result<()> {
        if index >= self.release_list.len() {
            return Err(WizardError::InvalidSelection(format!(
                "release index {} out of range ({} releases)",
                index,
                self.release_list.len()
            )));
        }
        if self.selected_release_index != Some(index) {
            log_change!(
                "selected_release_index",
                self.selected_release_index,
                Some(index)
            );
            self.selected_release_index = Some(index);
            self.reset_release_dependents();
        }
        self.recompute();
        Ok(())
    }

    /// Point at a freshly extracted tree. It holds neither the copied local
    /// configuration nor build output, so any earlier build result is dropped.
    pub fn set_firmware_directory(&mut self, dir: PathBuf) {
        log_change!("firmware_directory", self.firmware_directory, Some(&dir));
        self.firmware_directory = Some(dir);
        self.clear_build_result();
        self.recompute();
    }

    /// Forget the extracted tree before it is replaced on disk
    pub fn clear_firmware_directory(&mut self) {
        if let Some(old) = self.firmware_directory.take() {
            log_change!("firmware_directory", Some(old), None::<PathBuf>);
        }
        self.clear_build_result();
        self.recompute();
    }

    /// Replace the environment list; a selection missing from it is cleared
    pub fn set_board_environments(&mut self, environments: Vec<BoardEnvironment>) {
        log_change!(
            "board_environments",
            self.board_environments
                .iter()
                .map(|e| e.raw_identifier.as_str())
                .collect::<Vec<_>>(),
            environments
                .iter()
                .map(|e| e.raw_identifier.as_str())
                .collect::<Vec<_>>()
        );
        self.board_environments = environments;
        if let Some(selected) = self.selected_environment.clone() {
            if !self.has_environment(&selected) {
                log_change!("selected_environment", Some(&selected), None::<String>);
                self.selected_environment = None;
                self.last_build_succeeded = false;
            }
        }
        self.recompute();
    }

    /// Select a board environment by raw identifier
    pub fn select_environment(&mut self, raw_identifier: &str) -> Result<()> {
        if !self.has_environment(raw_identifier) {
            return Err(WizardError::InvalidSelection(format!(
                "unknown board environment '{}'",
                raw_identifier
            )));
        }
        if self.selected_environment.as_deref() != Some(raw_identifier) {
            log_change!(
                "selected_environment",
                self.selected_environment,
                Some(raw_identifier)
            );
            self.selected_environment = Some(raw_identifier.to_string());
            // A build for another target cannot be uploaded
            self.clear_build_result();
        }
        self.recompute();
        Ok(())
    }

    pub fn set_local_config_path(&mut self, path: PathBuf) {
        log_change!("local_config_path", self.local_config_path, Some(&path));
        self.local_config_path = Some(path);
        self.recompute();
    }

    pub fn set_last_build_succeeded(&mut self, succeeded: bool) {
        log_change!("last_build_succeeded", self.last_build_succeeded, succeeded);
        self.last_build_succeeded = succeeded;
        self.recompute();
    }

    /// Replace the port list wholesale; a vanished selected port is cleared
    pub fn set_available_serial_ports(&mut self, ports: Vec<String>) {
        log_change!("available_serial_ports", self.available_serial_ports, ports);
        self.available_serial_ports = ports;
        let vanished = self
            .selected_upload_port
            .as_ref()
            .is_some_and(|port| !self.available_serial_ports.contains(port));
        if vanished {
            let old = self.selected_upload_port.take();
            log_change!("selected_upload_port", old, None::<String>);
        }
        self.recompute();
    }

    /// Select an upload port from the last refreshed list
    pub fn select_upload_port(&mut self, port: &str) -> Result<()> {
        if !self.available_serial_ports.iter().any(|p| p == port) {
            return Err(WizardError::InvalidSelection(format!(
                "serial port '{}' is not in the refreshed port list {:?}",
                port, self.available_serial_ports
            )));
        }
        log_change!("selected_upload_port", self.selected_upload_port, Some(port));
        self.selected_upload_port = Some(port.to_string());
        self.recompute();
        Ok(())
    }

    fn has_environment(&self, raw_identifier: &str) -> bool {
        self.board_environments
            .iter()
            .any(|e| e.raw_identifier == raw_identifier)
    }

    fn clear_build_result(&mut self) {
        if self.last_build_succeeded {
            log_change!("last_build_succeeded", true, false);
            self.last_build_succeeded = false;
        }
    }

    fn reset_release_dependents(&mut self) {
        log_change!("board_environments", self.board_environments.len(), 0);
        log_change!("selected_environment", self.selected_environment, None::<String>);
        log_change!("last_build_succeeded", self.last_build_succeeded, false);
        self.board_environments.clear();
        self.selected_environment = None;
        self.last_build_succeeded = false;
    }

    fn recompute(&mut self) {
        let build_permitted =
            self.local_config_path.is_some() && self.selected_environment.is_some();
        let upload_permitted = self.last_build_succeeded && self.selected_upload_port.is_some();

        if build_permitted != self.build_permitted {
            log_change!("build_permitted", self.build_permitted, build_permitted);
        }
        if upload_permitted != self.upload_permitted {
            log_change!("upload_permitted", self.upload_permitted, upload_permitted);
        }
        self.build_permitted = build_permitted;
        self.upload_permitted = upload_permitted;
    }
}
