// ingestion: Library entry point.
// Exposes modules for integration testing.

pub mod config;
pub mod http;
pub mod service;
pub mod source;
pub mod worker;

pub use service::{IngestSummary, IngestionService};
pub use source::{SignalSource, SourceError, StaticSource};
pub use worker::RawSignalHandler;
