//! # Tidewatch Extract
//!
//! Runs mod descriptor scripts inside a disposable sandbox container,
//! captures the configuration schema they declare and caches it in SQLite.

pub mod cache;
pub mod error;
pub mod pipeline;
pub mod schema;
pub mod script;

pub use cache::{ModCache, ModInfo};
pub use error::ExtractError;
pub use pipeline::{ExtractionPipeline, ExtractionReport, PartialExtractionFailure, empty_result};
pub use script::ProbeScript;
