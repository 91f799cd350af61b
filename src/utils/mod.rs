//! Utility functions and helpers used throughout oatfw

pub mod file_utils;
pub mod logging;
