//! External process supervision and output handling

pub mod classify;
pub mod log_tail;
pub mod supervisor;

pub use log_tail::LogTail;
pub use supervisor::{ExternalProcessSupervisor, ProcessSnapshot};
