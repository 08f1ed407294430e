use thiserror::Error;

use convoflow_core::{ExecutionStatus, FlowExecution, VariableValue};

/// Why an execution did not look as expected
#[derive(Debug, Error, PartialEq)]
pub enum ExecutionAssertionError {
    #[error("Invalid execution status: expected {expected}, got {actual}")]
    Status {
        expected: ExecutionStatus,
        actual: ExecutionStatus,
    },

    #[error("History mismatch: expected {expected:?}, got {actual:?}")]
    History {
        expected: Vec<String>,
        actual: Vec<String>,
    },

    #[error("Missing variable: {0}")]
    MissingVariable(String),

    #[error("Variable {name}: expected {expected:?}, got {actual:?}")]
    Variable {
        name: String,
        expected: VariableValue,
        actual: VariableValue,
    },
}

/// The execution has `expected` status
pub fn assert_status(
    execution: &FlowExecution,
    expected: ExecutionStatus,
) -> Result<(), ExecutionAssertionError> {
    if execution.status != expected {
        return Err(ExecutionAssertionError::Status {
            expected,
            actual: execution.status,
        });
    }
    Ok(())
}

/// The execution visited exactly `expected`, in order
pub fn assert_history(
    execution: &FlowExecution,
    expected: &[&str],
) -> Result<(), ExecutionAssertionError> {
    let actual: Vec<String> = execution.history.iter().map(|id| id.to_string()).collect();
    if actual != expected {
        return Err(ExecutionAssertionError::History {
            expected: expected.iter().map(|id| id.to_string()).collect(),
            actual,
        });
    }
    Ok(())
}

/// The execution holds `name = expected`
pub fn assert_variable(
    execution: &FlowExecution,
    name: &str,
    expected: impl Into<VariableValue>,
) -> Result<(), ExecutionAssertionError> {
    let expected = expected.into();
    match execution.variables.get(name) {
        None => Err(ExecutionAssertionError::MissingVariable(name.to_string())),
        Some(actual) if *actual != expected => Err(ExecutionAssertionError::Variable {
            name: name.to_string(),
            expected,
            actual: actual.clone(),
        }),
        Some(_) => Ok(()),
    }
}
