/// Outcome of an engine invocation
pub mod disposition;

/// Inbound entry point chaining trigger resolution and execution
pub mod engine;

/// Persisted drive loop
pub mod flow_executor;

/// Side-effect free preview driver
pub mod simulator;

/// Resume / start / decline decision per inbound event
pub mod trigger_resolver;

#[cfg(test)]
pub(crate) mod test_support;
