#![forbid(unsafe_code)]

pub mod dataset;

pub use dataset::{
    fingerprint_bytes, DatasetStore, IngestOutcome, IngestPayload, IngestSet, StorageError,
};
