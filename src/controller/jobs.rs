//! Bodies of the long-running stage actions
//!
//! Every job runs on the background worker and reports back exclusively
//! through [`StageEvent`]s; none of them touches the workflow state.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;
use tokio::sync::mpsc;

use crate::catalog::{BoardEnvironmentCatalog, apply_hot_patches};
use crate::controller::machine::StageEvent;
use crate::controller::services::WizardServices;
use crate::errors::{Result, WizardError};
use crate::fetch::ArchiveFetcher;
use crate::models::{AppEvent, ProcessInvocation, ProcessOutcome};
use crate::process::{ExternalProcessSupervisor, LogTail};
use crate::telemetry::submit_usage;
use crate::utils::file_utils::same_file;

/// Process slot shared by build, upload and port refresh
pub const PLATFORMIO: &str = "platformio";

/// Name the local configuration gets inside the firmware tree
pub const LOCAL_CONFIG_FILE_NAME: &str = "Configuration_local.hpp";

/// Flashing tool log, re-read while AVR uploads run
pub const UPLOAD_TOOL_LOG: &str = "upload_tool.log";

/// Environment variable the build tool appends to the uploader command line
pub const UPLOAD_FLAGS_VAR: &str = "PLATFORMIO_UPLOAD_FLAGS";

/// Shared handles every job needs
#[derive(Clone)]
pub struct JobContext {
    pub supervisor: Arc<ExternalProcessSupervisor>,
    pub services: WizardServices,
    pub work_dir: PathBuf,
    pub platformio_settings: Vec<(String, String)>,
    pub events: mpsc::UnboundedSender<StageEvent>,
    pub sink: Option<mpsc::UnboundedSender<AppEvent>>,
}

impl JobContext {
    fn report(&self, event: StageEvent) {
        log::debug!("Stage event: {}", event);
        if self.events.send(event).is_err() {
            log::warn!("Stage controller is gone, dropping event");
        }
    }
}

/// Inputs of a build, captured when the request was admitted
#[derive(Debug, Clone)]
pub struct BuildPlan {
    pub firmware_dir: PathBuf,
    pub environment: String,
    pub local_config: PathBuf,
}

/// Inputs of an upload, captured when the request was admitted
#[derive(Debug, Clone)]
pub struct UploadPlan {
    pub firmware_dir: PathBuf,
    pub environment: String,
    pub port: String,
    pub avr_family: bool,
    /// Present when a usage record should follow a successful upload
    pub telemetry: Option<TelemetryPlan>,
}

#[derive(Debug, Clone)]
pub struct TelemetryPlan {
    pub release: String,
    pub local_config: Option<PathBuf>,
}

/// One admitted stage action and everything it needs
#[derive(Debug, Clone)]
pub enum StageJob {
    FetchReleases,
    DownloadFirmware { url: String },
    BuildFirmware(BuildPlan),
    UploadFirmware(UploadPlan),
    RefreshPorts,
}

impl StageJob {
    pub async fn run(self, ctx: JobContext) {
        match self {
            StageJob::FetchReleases => fetch_releases(ctx).await,
            StageJob::DownloadFirmware { url } => download_firmware(ctx, url).await,
            StageJob::BuildFirmware(plan) => build_firmware(ctx, plan).await,
            StageJob::UploadFirmware(plan) => upload_firmware(ctx, plan).await,
            StageJob::RefreshPorts => refresh_ports(ctx).await,
        }
    }
}

pub async fn fetch_releases(ctx: JobContext) {
    match ctx.services.releases.fetch_releases().await {
        Ok(releases) => ctx.report(StageEvent::ReleasesFetched(releases)),
        Err(e) => ctx.report(StageEvent::ReleasesFailed(e)),
    }
}

/// Download, extract and list environments, stopping at the first failure
pub async fn download_firmware(ctx: JobContext, url: String) {
    if let Err(e) = tokio::fs::create_dir_all(&ctx.work_dir).await {
        ctx.report(StageEvent::FirmwareFailed(e.into()));
        return;
    }
    let fetcher = ArchiveFetcher::new(ctx.services.downloader.clone());

    let archive = match fetcher.download(&url, &ctx.work_dir).await {
        Ok(path) => path,
        Err(e) => return ctx.report(StageEvent::FirmwareFailed(e)),
    };
    ctx.report(StageEvent::ArchiveDownloaded(archive.clone()));

    let firmware_dir = match fetcher.extract(&archive, &ctx.work_dir).await {
        Ok(dir) => dir,
        Err(e) => return ctx.report(StageEvent::FirmwareFailed(e)),
    };
    ctx.report(StageEvent::FirmwareExtracted(firmware_dir.clone()));

    match BoardEnvironmentCatalog::load(&firmware_dir) {
        Ok(environments) => ctx.report(StageEvent::EnvironmentsParsed(environments)),
        Err(e) => ctx.report(StageEvent::FirmwareFailed(e)),
    }
}

fn copy_local_config(source: &Path, firmware_dir: &Path) -> Result<()> {
    let destination = firmware_dir.join(LOCAL_CONFIG_FILE_NAME);
    if same_file(source, &destination) {
        log::info!("{} is already in place", destination.display());
        return Ok(());
    }
    log::info!(
        "Copying config file from {} -> {}",
        source.display(),
        destination.display()
    );
    std::fs::copy(source, &destination).map_err(|e| {
        WizardError::Config(format!(
            "cannot copy local configuration {}: {}",
            source.display(),
            e
        ))
    })?;
    Ok(())
}

/// Fire-and-forget `settings set` calls
async fn apply_platformio_settings(ctx: &JobContext) {
    for (key, value) in &ctx.platformio_settings {
        let invocation = ProcessInvocation::with_args(["settings", "set", key.as_str(), value.as_str()]);
        match ctx.supervisor.start(PLATFORMIO, invocation, |_| {}).await {
            Ok(outcome) if !outcome.success() => {
                log::debug!("Ignoring failed setting {}={}", key, value)
            }
            Ok(_) => {}
            Err(e) => log::debug!("Ignoring setting {}={}: {}", key, value, e),
        }
    }
}

pub async fn build_firmware(ctx: JobContext, plan: BuildPlan) {
    let prepared = copy_local_config(&plan.local_config, &plan.firmware_dir).and_then(|_| {
        apply_hot_patches(
            &plan.firmware_dir.join(crate::catalog::environments::BUILD_CONFIG_FILE),
            &plan.environment,
        )
    });
    if let Err(e) = prepared {
        ctx.report(StageEvent::BuildFailed(e));
        return;
    }

    apply_platformio_settings(&ctx).await;

    let invocation = ProcessInvocation::with_args([
        "run".to_string(),
        "--environment".to_string(),
        plan.environment.clone(),
        "--project-dir".to_string(),
        plan.firmware_dir.to_string_lossy().into_owned(),
        "--verbose".to_string(),
    ]);
    match ctx.supervisor.start(PLATFORMIO, invocation, |_| {}).await {
        Ok(outcome) => ctx.report(StageEvent::BuildFinished(outcome)),
        Err(e) => ctx.report(StageEvent::BuildFailed(e)),
    }
}

pub async fn upload_firmware(ctx: JobContext, plan: UploadPlan) {
    let mut invocation = ProcessInvocation::with_args([
        "run".to_string(),
        "--environment".to_string(),
        plan.environment.clone(),
        "--project-dir".to_string(),
        plan.firmware_dir.to_string_lossy().into_owned(),
        "--verbose".to_string(),
        "--target".to_string(),
        "upload".to_string(),
        "--upload-port".to_string(),
        plan.port.clone(),
    ]);

    // avrdude reports progress on stderr; read it from its own log instead
    let mut tail = None;
    if plan.avr_family {
        let tool_log = ctx.work_dir.join(UPLOAD_TOOL_LOG);
        if let Err(e) = std::fs::remove_file(&tool_log) {
            if e.kind() != std::io::ErrorKind::NotFound {
                log::warn!("Could not clear {}: {}", tool_log.display(), e);
            }
        }
        invocation = invocation.env(UPLOAD_FLAGS_VAR, format!("-l{}", tool_log.display()));
        tail = Some(LogTail::spawn(tool_log, PLATFORMIO, ctx.sink.clone()));
    }

    let result = ctx.supervisor.start(PLATFORMIO, invocation, |_| {}).await;
    if let Some(tail) = tail {
        tail.finish().await;
    }

    match result {
        Ok(outcome) => {
            if outcome.success() {
                if let Some(telemetry) = &plan.telemetry {
                    report_usage(&ctx, &plan, telemetry).await;
                }
            }
            ctx.report(StageEvent::UploadFinished(outcome));
        }
        Err(e) => ctx.report(StageEvent::UploadFailed(e)),
    }
}

async fn report_usage(ctx: &JobContext, plan: &UploadPlan, telemetry: &TelemetryPlan) {
    let submitted = submit_usage(
        ctx.services.telemetry.as_ref(),
        &plan.environment,
        &telemetry.release,
        telemetry.local_config.as_deref(),
    )
    .await;
    match submitted {
        Ok(()) => log::info!("Usage record submitted"),
        Err(e) => {
            log::warn!("{}", e);
            if let Some(tx) = &ctx.sink {
                let _ = tx.send(AppEvent::Warning(e.to_string()));
            }
        }
    }
}

#[derive(Deserialize)]
struct DeviceEntry {
    port: String,
}

/// Ports from `device list --serial --json-output`
pub fn parse_port_list(stdout: &str) -> Result<Vec<String>> {
    let devices: Vec<DeviceEntry> = serde_json::from_str(stdout.trim())?;
    Ok(devices.into_iter().map(|d| d.port).collect())
}

fn ports_from_outcome(outcome: &ProcessOutcome) -> Result<Vec<String>> {
    if !outcome.success() {
        return Err(WizardError::ProcessExitNonZero {
            name: outcome.name.clone(),
            code: outcome.exit_code,
        });
    }
    parse_port_list(&outcome.stdout)
}

pub async fn refresh_ports(ctx: JobContext) {
    let invocation = ProcessInvocation::with_args(["device", "list", "--serial", "--json-output"]);
    let ports = ctx
        .supervisor
        .start(PLATFORMIO, invocation, |_| {})
        .await
        .and_then(|outcome| ports_from_outcome(&outcome));
    match ports {
        Ok(ports) => ctx.report(StageEvent::PortsRefreshed(ports)),
        Err(e) => ctx.report(StageEvent::PortsRefreshFailed(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_port_list() {
        let stdout = r#"[
            {"port": "/dev/ttyUSB0", "description": "CP2102", "hwid": "USB VID:PID=10C4:EA60"},
            {"port": "COM3", "description": "n/a", "hwid": "n/a"}
        ]"#;
        assert_eq!(
            parse_port_list(stdout).unwrap(),
            vec!["/dev/ttyUSB0".to_string(), "COM3".to_string()]
        );
        assert!(parse_port_list("[]").unwrap().is_empty());
        assert!(parse_port_list("Error: no such command").is_err());
    }

    #[test]
    fn test_failed_device_list_is_process_error() {
        let outcome = ProcessOutcome {
            name: PLATFORMIO.to_string(),
            exit_code: Some(2),
            stdout: "[]".to_string(),
            stderr: String::new(),
        };
        assert!(matches!(
            ports_from_outcome(&outcome),
            Err(WizardError::ProcessExitNonZero { code: Some(2), .. })
        ));
    }

    #[test]
    fn test_copy_local_config() {
        let dir = TempDir::new().unwrap();
        let fw = dir.path().join("OATFW");
        std::fs::create_dir_all(&fw).unwrap();
        let source = dir.path().join("my_config.hpp");
        std::fs::write(&source, "#define BOARD BOARD_ESP32_ESP32DEV\n").unwrap();

        copy_local_config(&source, &fw).unwrap();
        let copied = fw.join(LOCAL_CONFIG_FILE_NAME);
        assert_eq!(
            std::fs::read_to_string(&copied).unwrap(),
            "#define BOARD BOARD_ESP32_ESP32DEV\n"
        );

        // Selecting the copy itself is a no-op
        copy_local_config(&copied, &fw).unwrap();
        assert!(copied.exists());
    }

    #[test]
    fn test_missing_local_config_is_error() {
        let dir = TempDir::new().unwrap();
        let result = copy_local_config(&dir.path().join("missing.hpp"), dir.path());
        assert!(matches!(result, Err(WizardError::Config(_))));
    }
}
