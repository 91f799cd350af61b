//! oatfw - OpenAstroTracker firmware wizard
//!
//! Downloads a firmware release, lets the user pick a board environment and a
//! local configuration, then drives PlatformIO to build the firmware and flash
//! it over a serial port. The [`controller::StageController`] enforces the
//! order of those stages and supervises the single external build process.

pub mod catalog;
pub mod cli;
pub mod config;
pub mod controller;
pub mod errors;
pub mod fetch;
pub mod models;
pub mod process;
pub mod security;
pub mod state;
pub mod telemetry;
pub mod utils;

// Re-export commonly used types
pub use controller::{StageController, WizardServices};
pub use errors::*;
pub use models::*;
pub use state::WorkflowState;

/// oatfw version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// oatfw application name
pub const APP_NAME: &str = "oatfw";
