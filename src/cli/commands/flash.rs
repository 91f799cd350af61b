//! Flash command implementation

use std::path::Path;

use anyhow::{Context, Result};

use crate::cli::args::Cli;
use crate::cli::commands::download_and_build;
use crate::cli::session::Session;
use crate::models::StageRequest;

pub async fn execute_flash_command(
    cli: &Cli,
    release: usize,
    env: &str,
    local_config: &Path,
    port: &str,
    telemetry: bool,
) -> Result<()> {
    let mut session = Session::open(cli).await?;
    let result = flash(&mut session, release, env, local_config, port, telemetry).await;
    session.close().await;
    result
}

async fn flash(
    session: &mut Session,
    release: usize,
    env: &str,
    local_config: &Path,
    port: &str,
    telemetry: bool,
) -> Result<()> {
    let telemetry_enabled = telemetry || session.config.telemetry.enabled;
    if telemetry_enabled {
        session
            .config
            .telemetry
            .require_endpoint()
            .context("Cannot send usage reports")?;
    }

    download_and_build(session, release, env, local_config).await?;

    let controller = &mut session.controller;
    controller
        .run_stage(StageRequest::RefreshPorts)
        .await
        .context("Failed to list serial ports")?;
    controller.select_upload_port(port).with_context(|| {
        format!(
            "Port {} not found. Available ports: {}",
            port,
            controller.state().available_serial_ports().join(", ")
        )
    })?;
    controller.set_telemetry_enabled(telemetry_enabled);
    if controller.telemetry_enabled() {
        log::info!("📊 A usage record will be sent after a successful upload");
    }

    log::info!("🔥 Flashing {} to {}", env, port);
    controller
        .run_stage(StageRequest::UploadFirmware)
        .await
        .context("Firmware upload failed")?;
    log::info!("✅ Flash successful");
    Ok(())
}
