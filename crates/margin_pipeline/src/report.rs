#![forbid(unsafe_code)]

use margin_contracts::upload::{UploadResult, ValidationReport};
use margin_contracts::ContractViolation;

/// Shape the ordered per-file results into the `ValidationReport` contract.
/// Totals are recomputed here; caller-supplied numbers are never trusted.
pub fn assemble_report(uploads: Vec<UploadResult>) -> Result<ValidationReport, ContractViolation> {
    let total_files = uploads.len() as u32;
    let mut total_valid_rows = 0u32;
    let mut total_invalid_rows = 0u32;
    for upload in &uploads {
        total_valid_rows = total_valid_rows.saturating_add(upload.valid_rows);
        total_invalid_rows = total_invalid_rows.saturating_add(upload.invalid_rows);
    }
    let has_errors = total_invalid_rows > 0;
    ValidationReport::v1(
        uploads,
        total_files,
        total_valid_rows,
        total_invalid_rows,
        has_errors,
    )
}
