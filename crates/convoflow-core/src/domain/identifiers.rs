//! Value objects identifying tenants, contacts, flows, blocks and executions.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Create a new identifier
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Borrow the raw identifier
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(
    /// Value object: Tenant ID
    TenantId
);

string_id!(
    /// Value object: Contact identifier (phone number or provider id)
    ContactId
);

string_id!(
    /// Value object: Flow ID
    FlowId
);

string_id!(
    /// Value object: Block ID, unique within a flow definition
    BlockId
);

string_id!(
    /// Value object: Flow execution ID
    ExecutionId
);

impl ExecutionId {
    /// Generate a fresh random execution id
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

/// Key used to serialize access to executions: one active execution per key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContactKey {
    /// Tenant owning the conversation
    pub tenant_id: TenantId,
    /// Contact on the other end of the conversation
    pub contact: ContactId,
}

impl ContactKey {
    /// Build a key from its parts
    pub fn new(tenant_id: &TenantId, contact: &ContactId) -> Self {
        Self {
            tenant_id: tenant_id.clone(),
            contact: contact.clone(),
        }
    }
}

impl fmt::Display for ContactKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.tenant_id, self.contact)
    }
}
