#![forbid(unsafe_code)]

pub mod common;
pub mod margin;
pub mod records;
pub mod upload;

pub use common::{ContractViolation, SchemaVersion, Validate};
