//! Shared test utilities for driftscan
//!
//! This crate provides common test helpers that can be used across
//! multiple test modules without circular dependencies.
//!
//! ## Modules
//!
//! - [`aws`]: AWS region detection and test run ID generation
//! - [`backend`]: Simulated paged listing endpoints with injectable throttling

pub mod aws;
pub mod backend;

// Re-export commonly used items
pub use aws::{get_test_region, test_run_id};
pub use backend::{PagedBackend, SimulatedError, SimulatedPage, TokenStyle};
