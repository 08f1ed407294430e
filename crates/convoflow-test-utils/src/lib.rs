//! Testing utilities for convoflow.
//!
//! Mocks of the collaborator traits, recording fakes, a fluent flow builder,
//! canned flows, execution assertions and a [`TestEngine`] wired over the
//! in-memory stores.

pub mod assertions;
pub mod builders;
pub mod data_generators;
pub mod implementations;
pub mod mocks;

/// Re-export so tests set expectations without a direct dependency
pub use mockall;

pub use builders::{FlowBuilder, TestEngine};
pub use implementations::{RecordedCall, RecordingCollaborators};
