//! Shared test utilities for gypsum integration tests.

pub mod harness;

pub use harness::{wait_for_terminal, TestHarness, WELL_FORMED_OUTPUT};
