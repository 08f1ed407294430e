//! Builders for flows and for an engine wired to test doubles.

mod flow_builder;
mod test_engine;

pub use flow_builder::{rule, FlowBuilder};
pub use test_engine::TestEngine;
