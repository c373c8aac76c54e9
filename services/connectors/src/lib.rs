// connectors: Library entry point.
// Exposes modules for integration testing.

pub mod host;
pub mod json_feed;

pub use host::ConnectorHost;
pub use json_feed::{JsonFeedFactory, JsonFeedProvider};
