// Library root: exposes every stage of the injury panel build so the CLI
// and integration tests share one public API.

pub mod config;
pub mod error;
pub mod export;
pub mod ingest;
pub mod pipeline;
pub mod relocation;
pub mod report;
pub mod taxonomy;
