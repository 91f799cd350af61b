//! CLI command implementations

pub mod build;
pub mod environments;
pub mod flash;
pub mod ports;
pub mod releases;

use std::path::Path;

use anyhow::{Context, Result};

use crate::cli::args::{Cli, Commands};
use crate::cli::session::Session;
use crate::models::StageRequest;

/// Execute a CLI command
pub async fn execute_command(command: Commands, cli: &Cli) -> Result<()> {
    match command {
        Commands::Releases => releases::execute_releases_command(cli).await,
        Commands::Environments { release } => {
            environments::execute_environments_command(cli, release).await
        }
        Commands::Ports => ports::execute_ports_command(cli).await,
        Commands::Build {
            release,
            env,
            local_config,
        } => build::execute_build_command(cli, release, &env, &local_config).await,
        Commands::Flash {
            release,
            env,
            local_config,
            port,
            telemetry,
        } => {
            flash::execute_flash_command(cli, release, &env, &local_config, &port, telemetry)
                .await
        }
    }
}

/// Select and download `release`
async fn download_release(session: &mut Session, release: usize) -> Result<()> {
    let controller = &mut session.controller;
    controller
        .select_release(release)
        .context("Unknown release, run `oatfw releases` for the list")?;
    if let Some(selected) = controller.state().selected_release() {
        log::info!("📦 Release: {}", selected.display_name);
    }
    controller
        .run_stage(StageRequest::DownloadFirmware)
        .await
        .context("Failed to download firmware")?;
    Ok(())
}

/// Download `release`, pick the environment and configuration, then build
async fn download_and_build(
    session: &mut Session,
    release: usize,
    env: &str,
    local_config: &Path,
) -> Result<()> {
    download_release(session, release).await?;

    let controller = &mut session.controller;
    controller.select_environment(env).with_context(|| {
        let known: Vec<_> = controller
            .state()
            .board_environments()
            .iter()
            .map(|e| e.raw_identifier.as_str())
            .collect();
        format!("Available environments: {}", known.join(", "))
    })?;
    controller.select_local_config(local_config.to_path_buf())?;

    log::info!("🔨 Building {} with {}", env, local_config.display());
    controller
        .run_stage(StageRequest::BuildFirmware)
        .await
        .context("Firmware build failed")?;
    log::info!("✅ Build successful");
    Ok(())
}
