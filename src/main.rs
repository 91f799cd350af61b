use anyhow::Result;
use oatfw::cli::{self, Cli};
use oatfw::errors::WizardError;
use oatfw::utils::logging::init_cli_logging;

/// Exit status when the background worker never went idle
const EXIT_WORKER_STALLED: i32 = 2;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();
    let log_file = cli.log_file_path();
    init_cli_logging(cli.verbose, cli.quiet, log_file.as_deref())?;

    match cli::run(cli).await {
        Err(e) if matches!(e.downcast_ref::<WizardError>(), Some(WizardError::WorkerStalled(_))) => {
            log::error!("Fatal: {:#}", e);
            std::process::exit(EXIT_WORKER_STALLED);
        }
        result => result,
    }
}
