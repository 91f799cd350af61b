//! Stage controller
//!
//! Owns the workflow state, the process supervisor and the background worker.
//! Stage requests are validated against the transition table and handed to the
//! worker; the worker's completion events come back through a channel and are
//! applied one at a time by [`StageController::process_next_event`], which is
//! the only place the workflow state changes while a stage runs.

pub mod jobs;
pub mod machine;
pub mod services;
pub mod worker;

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::catalog::BoardEnvironmentCatalog;
use crate::config::AppConfig;
use crate::errors::{Result, WizardError};
use crate::models::{AppEvent, Stage, StageRequest};
use crate::process::{ExternalProcessSupervisor, ProcessSnapshot};
use crate::state::WorkflowState;

pub use jobs::{PLATFORMIO, StageJob};
pub use machine::StageEvent;
pub use services::WizardServices;
pub use worker::StageWorker;

use jobs::{BuildPlan, JobContext, TelemetryPlan, UploadPlan};

/// Result of handling one completion event
#[derive(Debug)]
pub enum Dispatch {
    /// An intermediate step of a chained stage finished
    Progress(Stage),
    /// The job for `request` is done
    Finished {
        request: StageRequest,
        result: Result<()>,
    },
}

pub struct StageController {
    state: WorkflowState,
    stage: Stage,
    in_flight: Option<StageRequest>,
    telemetry_enabled: bool,
    supervisor: Arc<ExternalProcessSupervisor>,
    worker: StageWorker,
    ctx: JobContext,
    events: mpsc::UnboundedReceiver<StageEvent>,
    sink: Option<mpsc::UnboundedSender<AppEvent>>,
}

impl StageController {
    /// Build the controller and start fetching releases right away
    pub async fn launch(
        config: &AppConfig,
        services: WizardServices,
        sink: Option<mpsc::UnboundedSender<AppEvent>>,
    ) -> Result<Self> {
        let executable = which::which(&config.platformio.executable).map_err(|e| {
            WizardError::Config(format!(
                "build tool '{}' not found: {}",
                config.platformio.executable, e
            ))
        })?;
        log::debug!("Using build tool {}", executable.display());

        let supervisor = Arc::new(ExternalProcessSupervisor::new(
            config.platformio.start_timeout(),
            sink.clone(),
        ));
        supervisor.register(PLATFORMIO, &executable.to_string_lossy(), &[])?;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let ctx = JobContext {
            supervisor: supervisor.clone(),
            services,
            work_dir: config.paths.work_dir.clone(),
            platformio_settings: config.platformio.settings.clone(),
            events: events_tx,
            sink: sink.clone(),
        };

        let mut controller = Self {
            state: WorkflowState::new(),
            stage: Stage::Idle,
            in_flight: None,
            telemetry_enabled: config.telemetry.enabled,
            supervisor,
            worker: StageWorker::new(config.worker.idle_wait()),
            ctx,
            events: events_rx,
            sink,
        };
        controller.request(StageRequest::FetchReleases).await?;
        Ok(controller)
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn state(&self) -> &WorkflowState {
        &self.state
    }

    /// Copy of the workflow state for the presentation layer
    pub fn snapshot(&self) -> WorkflowState {
        self.state.clone()
    }

    pub fn in_flight(&self) -> Option<StageRequest> {
        self.in_flight
    }

    /// Build tool slot, including the output of its last run
    pub fn process_snapshot(&self) -> Option<ProcessSnapshot> {
        self.supervisor.snapshot(PLATFORMIO)
    }

    pub fn telemetry_enabled(&self) -> bool {
        self.telemetry_enabled
    }

    pub fn set_telemetry_enabled(&mut self, enabled: bool) {
        log::debug!("Telemetry {}", if enabled { "enabled" } else { "disabled" });
        self.telemetry_enabled = enabled;
    }

    fn notify(&self, event: AppEvent) {
        if let Some(tx) = &self.sink {
            let _ = tx.send(event);
        }
    }

    fn set_stage(&mut self, next: Stage) {
        if next != self.stage {
            log::info!("Stage: {} -> {}", self.stage, next);
            self.stage = next;
            self.notify(AppEvent::StageChanged(next));
        }
    }

    fn ensure_idle(&self, what: &str) -> Result<()> {
        if let Some(running) = self.in_flight {
            return Err(WizardError::AlreadyRunning(format!(
                "cannot {} while '{}' is in progress",
                what, running
            )));
        }
        if self.supervisor.is_busy(PLATFORMIO) {
            return Err(WizardError::AlreadyRunning(PLATFORMIO.to_string()));
        }
        Ok(())
    }

    /// Admit a stage request and hand it to the worker.
    ///
    /// Refused with `AlreadyRunning` while any stage is in flight; never queued.
    pub async fn request(&mut self, request: StageRequest) -> Result<()> {
        self.ensure_idle(&request.to_string())?;
        let next = machine::gate(request, self.stage, &self.state)?;
        let job = self.plan(request)?;
        let permit = self.worker.admit(&request.to_string()).await?;

        log::info!("Starting stage request: {}", request);
        self.in_flight = Some(request);
        self.set_stage(next);

        let ctx = self.ctx.clone();
        tokio::spawn(async move {
            job.run(ctx).await;
            drop(permit);
        });
        Ok(())
    }

    fn plan(&self, request: StageRequest) -> Result<StageJob> {
        let firmware_dir = || {
            self.state
                .firmware_directory()
                .map(PathBuf::from)
                .ok_or_else(|| WizardError::StageNotPermitted("no firmware directory".to_string()))
        };
        let environment = || {
            self.state
                .selected_environment()
                .map(str::to_string)
                .ok_or_else(|| WizardError::StageNotPermitted("no environment selected".to_string()))
        };

        Ok(match request {
            StageRequest::FetchReleases => StageJob::FetchReleases,
            StageRequest::RefreshPorts => StageJob::RefreshPorts,
            StageRequest::DownloadFirmware => {
                let release = self.state.selected_release().ok_or_else(|| {
                    WizardError::StageNotPermitted("no release selected".to_string())
                })?;
                StageJob::DownloadFirmware {
                    url: release.source_url.clone(),
                }
            }
            StageRequest::BuildFirmware => StageJob::BuildFirmware(BuildPlan {
                firmware_dir: firmware_dir()?,
                environment: environment()?,
                local_config: self.state.local_config_path().map(PathBuf::from).ok_or_else(
                    || WizardError::StageNotPermitted("no local configuration".to_string()),
                )?,
            }),
            StageRequest::UploadFirmware => {
                let environment = environment()?;
                let telemetry = self.telemetry_enabled.then(|| TelemetryPlan {
                    release: self
                        .state
                        .selected_release()
                        .map(|r| r.display_name.clone())
                        .unwrap_or_default(),
                    local_config: self.state.local_config_path().map(PathBuf::from),
                });
                StageJob::UploadFirmware(UploadPlan {
                    firmware_dir: firmware_dir()?,
                    avr_family: BoardEnvironmentCatalog::is_avr_family(&environment),
                    environment,
                    port: self
                        .state
                        .selected_upload_port()
                        .map(str::to_string)
                        .ok_or_else(|| {
                            WizardError::StageNotPermitted("no upload port selected".to_string())
                        })?,
                    telemetry,
                })
            }
        })
    }

    /// Wait for the next completion event and apply it
    pub async fn process_next_event(&mut self) -> Option<Dispatch> {
        let event = self.events.recv().await?;
        Some(self.dispatch(event))
    }

    /// Apply one completion event: state writes first, then the transition
    fn dispatch(&mut self, event: StageEvent) -> Dispatch {
        log::debug!("Handling stage event: {}", event);
        match &event {
            StageEvent::ReleasesFetched(releases) => {
                self.state.set_release_list(releases.clone());
                if self.state.selected_release_index().is_none() && !releases.is_empty() {
                    let _ = self.state.select_release(0);
                }
                self.notify(AppEvent::Info(format!("{} releases available", releases.len())));
            }
            StageEvent::ArchiveDownloaded(path) => {
                // Extraction deletes the previous tree next
                self.state.clear_firmware_directory();
                self.notify(AppEvent::Info(format!("Downloaded {}", path.display())));
            }
            StageEvent::FirmwareExtracted(dir) => {
                self.state.set_firmware_directory(dir.clone());
            }
            StageEvent::EnvironmentsParsed(environments) => {
                self.state.set_board_environments(environments.clone());
            }
            StageEvent::BuildFinished(outcome) => {
                self.state.set_last_build_succeeded(outcome.success());
            }
            StageEvent::BuildFailed(_) => {
                self.state.set_last_build_succeeded(false);
            }
            StageEvent::PortsRefreshed(ports) => {
                self.state.set_available_serial_ports(ports.clone());
            }
            StageEvent::ReleasesFailed(_)
            | StageEvent::FirmwareFailed(_)
            | StageEvent::UploadFinished(_)
            | StageEvent::UploadFailed(_)
            | StageEvent::PortsRefreshFailed(_) => {}
        }

        let next = machine::transition(self.stage, &event, &self.state);
        self.set_stage(next);

        let Some(request) = event.finishes() else {
            return Dispatch::Progress(self.stage);
        };
        if self.in_flight == Some(request) {
            self.in_flight = None;
        }

        let result = match event {
            StageEvent::ReleasesFailed(e)
            | StageEvent::FirmwareFailed(e)
            | StageEvent::BuildFailed(e)
            | StageEvent::UploadFailed(e)
            | StageEvent::PortsRefreshFailed(e) => Err(e),
            StageEvent::BuildFinished(outcome) | StageEvent::UploadFinished(outcome)
                if !outcome.success() =>
            {
                Err(WizardError::ProcessExitNonZero {
                    name: outcome.name,
                    code: outcome.exit_code,
                })
            }
            _ => Ok(()),
        };
        match &result {
            Ok(()) => log::info!("Finished {}", request),
            Err(e) => {
                log::error!("{} failed: {}", request, e);
                self.notify(AppEvent::Error(format!("{} failed: {}", request, e)));
            }
        }
        Dispatch::Finished { request, result }
    }

    /// Handle events until the job for `request` has finished
    pub async fn wait_for(&mut self, request: StageRequest) -> Result<()> {
        loop {
            match self.process_next_event().await {
                Some(Dispatch::Finished { request: done, result }) if done == request => {
                    return result;
                }
                Some(_) => continue,
                None => {
                    return Err(WizardError::WorkerStalled(
                        "stage event channel closed".to_string(),
                    ));
                }
            }
        }
    }

    /// Request a stage and wait for it to finish
    pub async fn run_stage(&mut self, request: StageRequest) -> Result<()> {
        self.request(request).await?;
        self.wait_for(request).await
    }

    fn settle(&mut self) {
        let next = machine::settled_stage(&self.state);
        self.set_stage(next);
    }

    pub fn select_release(&mut self, index: usize) -> Result<()> {
        self.ensure_idle("select a release")?;
        self.state.select_release(index)?;
        self.settle();
        Ok(())
    }

    pub fn select_environment(&mut self, raw_identifier: &str) -> Result<()> {
        self.ensure_idle("select a board environment")?;
        self.state.select_environment(raw_identifier)?;
        self.settle();
        Ok(())
    }

    pub fn select_local_config(&mut self, path: PathBuf) -> Result<()> {
        self.ensure_idle("select a local configuration")?;
        if !path.is_file() {
            return Err(WizardError::InvalidSelection(format!(
                "local configuration {} is not a file",
                path.display()
            )));
        }
        self.state.set_local_config_path(path);
        self.settle();
        Ok(())
    }

    pub fn select_upload_port(&mut self, port: &str) -> Result<()> {
        self.ensure_idle("select an upload port")?;
        self.state.select_upload_port(port)?;
        self.settle();
        Ok(())
    }
}
