//! Configuration management for oatfw

pub mod app_config;

pub use app_config::*;
