//! nmdcharvest: CLI harvester for the NMDC GCPathogen species table,
//! outputting TSV, CSV, and JSON.

pub mod cli;
pub mod config;
pub mod export;
pub mod harvest;
pub mod model;

// Re-exports for CLI and consumers.
pub use export::{export, ExportError, ExportReport};
pub use harvest::{
    run_job, ApiClient, ApiClientBuilder, HarvestJob, HarvestOutcome, HarvestStatus, PageOutcome,
    PageSource, RetryPolicy, TransportError,
};
pub use model::{HarvestSummary, Record};
