//! Ports command implementation

use anyhow::{Context, Result};

use crate::cli::args::Cli;
use crate::cli::session::Session;
use crate::models::StageRequest;

pub async fn execute_ports_command(cli: &Cli) -> Result<()> {
    let mut session = Session::open(cli).await?;
    session
        .controller
        .run_stage(StageRequest::RefreshPorts)
        .await
        .context("Failed to list serial ports")?;

    let ports = session.controller.state().available_serial_ports();
    if ports.is_empty() {
        println!("⚠️  No serial ports found.");
    } else {
        println!("🔌 Found {} serial port(s):", ports.len());
        for port in ports {
            println!("  - {}", port);
        }
    }

    session.close().await;
    Ok(())
}
