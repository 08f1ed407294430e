//! Assertion helpers for executions.

mod execution;

pub use execution::{assert_history, assert_status, assert_variable, ExecutionAssertionError};
