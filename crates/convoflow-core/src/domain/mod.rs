//! Domain model of the convoflow engine

pub mod block;
pub mod collaborators;
pub mod events;
pub mod flow_definition;
pub mod flow_execution;
pub mod identifiers;
pub mod repository;
pub mod variables;
