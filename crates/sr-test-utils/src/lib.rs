// sr-test-utils: Shared test utilities for the pipeline suite.
//
// Provides a pausable mock LLM upstream and canned raw-signal fixtures for
// integration testing of the gateways and workers.

pub mod fixtures;
pub mod mock_llm;

pub use fixtures::{raw_signal, raw_signal_with_confidence};
pub use mock_llm::MockLlmUpstream;
