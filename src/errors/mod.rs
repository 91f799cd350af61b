//! Error types for oatfw

pub mod types;

pub use types::*;
