//! One wizard run: controller plus event printer

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::cli::args::Cli;
use crate::config::AppConfig;
use crate::controller::{StageController, WizardServices};
use crate::models::{AppEvent, StageRequest};

pub struct Session {
    pub config: AppConfig,
    pub controller: StageController,
    printer: JoinHandle<()>,
}

impl Session {
    /// Load configuration, launch the controller and wait for the release list
    pub async fn open(cli: &Cli) -> Result<Self> {
        let config =
            AppConfig::load(cli.config_file.as_deref()).context("Failed to load configuration")?;
        let services = WizardServices::from_config(&config)?;

        let (tx, rx) = mpsc::unbounded_channel::<AppEvent>();
        let printer = tokio::spawn(print_events(rx));

        let mut controller = StageController::launch(&config, services, Some(tx)).await?;
        controller
            .wait_for(StageRequest::FetchReleases)
            .await
            .context("Failed to fetch the release list")?;

        Ok(Self {
            config,
            controller,
            printer,
        })
    }

    /// Drop the controller and flush remaining events
    pub async fn close(self) {
        let Session {
            controller,
            printer,
            ..
        } = self;
        drop(controller);
        let _ = printer.await;
    }
}

async fn print_events(mut rx: mpsc::UnboundedReceiver<AppEvent>) {
    while let Some(event) = rx.recv().await {
        match event {
            AppEvent::StageChanged(stage) => println!("==> {}", stage),
            AppEvent::Info(message) => println!("ℹ️  {}", message),
            AppEvent::Warning(message) => eprintln!("⚠️  {}", message),
            AppEvent::Error(message) => eprintln!("❌ {}", message),
            AppEvent::ProcessStateChanged(name, state) => {
                log::trace!("{} is now {}", name, state);
            }
            // Already part of the log stream
            AppEvent::ProcessOutput(..) => {}
        }
    }
}
