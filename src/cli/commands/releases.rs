//! Releases command implementation

use anyhow::Result;

use crate::cli::args::Cli;
use crate::cli::session::Session;

pub async fn execute_releases_command(cli: &Cli) -> Result<()> {
    let session = Session::open(cli).await?;

    let state = session.controller.state();
    println!("🔭 {} firmware release(s):", state.release_list().len());
    for (index, release) in state.release_list().iter().enumerate() {
        println!("  [{}] {}  ({})", index, release.display_name, release.source_url);
    }

    session.close().await;
    Ok(())
}
