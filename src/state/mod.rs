//! Wizard progress state

pub mod workflow;

pub use workflow::WorkflowState;
