//! Common test utilities for paste-store
//!
//! Shared fixtures, assertions and the backend-agnostic contract scenarios
//! used by the contract, handler and live-server suites.

#![allow(dead_code)]

mod assertions;
mod fixtures;
pub mod scenarios;

// Re-export all utilities
pub use assertions::*;
pub use fixtures::*;
