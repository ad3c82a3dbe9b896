#![forbid(unsafe_code)]

pub mod batch;
pub mod report;

pub use batch::{BatchError, BatchState, IngestBatch, PreconditionError, ReferenceCatalog};
pub use report::assemble_report;
