use thiserror::Error;

/// Core error type for the convoflow engine
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// An active execution already exists for the tenant/contact pair
    #[error("Active execution already exists for contact {contact} (tenant {tenant_id})")]
    AlreadyActive {
        /// Tenant that owns the execution
        tenant_id: String,
        /// Contact the execution belongs to
        contact: String,
    },

    /// No active execution exists for the tenant/contact pair
    #[error("No active execution for contact {contact} (tenant {tenant_id})")]
    NoActiveExecution {
        /// Tenant that was queried
        tenant_id: String,
        /// Contact that was queried
        contact: String,
    },

    /// Another invocation currently holds the claim on this execution
    #[error("Execution busy: {0}")]
    Busy(String),

    /// The claim expired or was taken over before the write happened
    #[error("Claim lost: {0}")]
    ClaimLost(String),

    /// Flow definition not found (or not active)
    #[error("Flow not found: {0}")]
    FlowNotFound(String),

    /// Flow execution not found
    #[error("Execution not found: {0}")]
    ExecutionNotFound(String),

    /// Flow execution exists but is no longer active
    #[error("Execution not active: {0}")]
    ExecutionNotActive(String),

    /// Malformed flow definition
    #[error("Definition error: {0}")]
    DefinitionError(String),

    /// State store error
    #[error("State store error: {0}")]
    StateStoreError(String),

    /// Outbound message delivery failed
    #[error("Delivery error: {0}")]
    DeliveryError(String),

    /// External dependency error
    #[error("External dependency error: {0}")]
    ExternalDependencyError(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// Validation error
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl CoreError {
    /// Whether the caller may safely retry (or discard) the operation later
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CoreError::Busy(_) | CoreError::ClaimLost(_) | CoreError::StateStoreError(_)
        )
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::SerializationError(err.to_string())
    }
}

impl From<String> for CoreError {
    fn from(err: String) -> Self {
        CoreError::Other(err)
    }
}

impl From<&str> for CoreError {
    fn from(err: &str) -> Self {
        CoreError::Other(err.to_string())
    }
}
