//! Data models and types used throughout oatfw

pub mod environment;
pub mod events;
pub mod process;
pub mod release;
pub mod stage;

// Re-export commonly used types
pub use environment::*;
pub use events::*;
pub use process::*;
pub use release::*;
pub use stage::*;
