//! Environments command implementation

use anyhow::Result;

use crate::catalog::BoardEnvironmentCatalog;
use crate::cli::args::Cli;
use crate::cli::commands::download_release;
use crate::cli::session::Session;

pub async fn execute_environments_command(cli: &Cli, release: usize) -> Result<()> {
    let mut session = Session::open(cli).await?;
    download_release(&mut session, release).await?;

    let state = session.controller.state();
    if let Some(dir) = state.firmware_directory() {
        println!("📁 Firmware extracted to {}", dir.display());
    }
    println!("🎯 Found {} board environment(s):", state.board_environments().len());
    for env in state.board_environments() {
        let family = if BoardEnvironmentCatalog::is_avr_family(&env.raw_identifier) {
            " [AVR]"
        } else {
            ""
        };
        println!("  - {} ({}){}", env.raw_identifier, env.display_name, family);
    }

    session.close().await;
    Ok(())
}
