//! Build command implementation

use std::path::Path;

use anyhow::Result;

use crate::cli::args::Cli;
use crate::cli::commands::download_and_build;
use crate::cli::session::Session;

pub async fn execute_build_command(
    cli: &Cli,
    release: usize,
    env: &str,
    local_config: &Path,
) -> Result<()> {
    let mut session = Session::open(cli).await?;
    let result = download_and_build(&mut session, release, env, local_config).await;
    if let Some(dir) = session.controller.state().firmware_directory() {
        log::info!("📁 Firmware tree: {}", dir.display());
    }
    session.close().await;
    result
}
