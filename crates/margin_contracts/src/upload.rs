#![forbid(unsafe_code)]

use crate::common::{validate_opt_text, validate_text, ContractViolation, SchemaVersion, Validate};

pub const UPLOAD_CONTRACT_VERSION: SchemaVersion = SchemaVersion(1);

pub const MAX_FILENAME_LEN: usize = 255;
pub const MAX_COLUMN_NAME_LEN: usize = 64;
pub const MAX_CELL_VALUE_LEN: usize = 512;
pub const MAX_ISSUE_TEXT_LEN: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FileType {
    Timecard,
    Employee,
    Project,
}

impl FileType {
    pub fn as_str(self) -> &'static str {
        match self {
            FileType::Timecard => "timecard",
            FileType::Employee => "employee",
            FileType::Project => "project",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "timecard" => Some(FileType::Timecard),
            "employee" => Some(FileType::Employee),
            "project" => Some(FileType::Project),
            _ => None,
        }
    }
}

/// One attached file, immutable once validation starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSubmission {
    pub file_type: FileType,
    pub filename: String,
    pub raw_bytes: Vec<u8>,
}

impl FileSubmission {
    pub fn v1(
        file_type: FileType,
        filename: String,
        raw_bytes: Vec<u8>,
    ) -> Result<Self, ContractViolation> {
        validate_text("filename", &filename, MAX_FILENAME_LEN)?;
        Ok(Self {
            file_type,
            filename,
            raw_bytes,
        })
    }
}

impl Validate for FileSubmission {
    fn validate(&self) -> Result<(), ContractViolation> {
        validate_text("filename", &self.filename, MAX_FILENAME_LEN)
    }
}

/// A single rule violation. `row` is the 1-based data-row index within the
/// file; row 0 is reserved for file-level (synthetic) failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    pub row: u32,
    pub column: Option<String>,
    pub value: Option<String>,
    pub error: String,
}

impl ValidationIssue {
    pub fn v1(
        row: u32,
        column: Option<String>,
        value: Option<String>,
        error: String,
    ) -> Result<Self, ContractViolation> {
        validate_text("issue.error", &error, MAX_ISSUE_TEXT_LEN)?;
        validate_opt_text("issue.column", &column, MAX_COLUMN_NAME_LEN)?;
        if let Some(v) = &value {
            if v.len() > MAX_CELL_VALUE_LEN {
                return Err(ContractViolation::InvalidValue {
                    field: "issue.value",
                    reason: "exceeds max length",
                });
            }
        }
        Ok(Self {
            row,
            column,
            value,
            error,
        })
    }

    /// File-level failure (parse error); carries no column or value.
    pub fn file_failure(error: String) -> Result<Self, ContractViolation> {
        Self::v1(0, None, None, error)
    }
}

impl Validate for ValidationIssue {
    fn validate(&self) -> Result<(), ContractViolation> {
        validate_text("issue.error", &self.error, MAX_ISSUE_TEXT_LEN)?;
        validate_opt_text("issue.column", &self.column, MAX_COLUMN_NAME_LEN)
    }
}

/// Per-file validation outcome. Issues are ordered by row, then by rule
/// order within the row; a row violating several rules repeats its index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadResult {
    pub filename: String,
    pub file_type: FileType,
    pub total_rows: u32,
    pub valid_rows: u32,
    pub invalid_rows: u32,
    pub issues: Vec<ValidationIssue>,
}

impl UploadResult {
    pub fn v1(
        filename: String,
        file_type: FileType,
        total_rows: u32,
        valid_rows: u32,
        invalid_rows: u32,
        issues: Vec<ValidationIssue>,
    ) -> Result<Self, ContractViolation> {
        validate_text("filename", &filename, MAX_FILENAME_LEN)?;
        let result = Self {
            filename,
            file_type,
            total_rows,
            valid_rows,
            invalid_rows,
            issues,
        };
        result.validate()?;
        Ok(result)
    }
}

impl Validate for UploadResult {
    fn validate(&self) -> Result<(), ContractViolation> {
        validate_text("filename", &self.filename, MAX_FILENAME_LEN)?;
        if self.valid_rows.checked_add(self.invalid_rows) != Some(self.total_rows) {
            return Err(ContractViolation::CountMismatch {
                field: "upload.valid_rows+invalid_rows",
                expected: u64::from(self.total_rows),
                got: u64::from(self.valid_rows) + u64::from(self.invalid_rows),
            });
        }
        let mut last_row = 0u32;
        for issue in &self.issues {
            issue.validate()?;
            if issue.row < last_row {
                return Err(ContractViolation::InvalidValue {
                    field: "upload.issues",
                    reason: "must be ordered by row",
                });
            }
            last_row = issue.row;
        }
        Ok(())
    }
}

/// Aggregate over one batch. Totals are always recomputed from `uploads`
/// by the report aggregator, never trusted from a caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationReport {
    pub uploads: Vec<UploadResult>,
    pub total_files: u32,
    pub total_valid_rows: u32,
    pub total_invalid_rows: u32,
    pub has_errors: bool,
}

impl ValidationReport {
    pub fn v1(
        uploads: Vec<UploadResult>,
        total_files: u32,
        total_valid_rows: u32,
        total_invalid_rows: u32,
        has_errors: bool,
    ) -> Result<Self, ContractViolation> {
        let report = Self {
            uploads,
            total_files,
            total_valid_rows,
            total_invalid_rows,
            has_errors,
        };
        report.validate()?;
        Ok(report)
    }
}

impl Validate for ValidationReport {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.total_files as usize != self.uploads.len() {
            return Err(ContractViolation::CountMismatch {
                field: "report.total_files",
                expected: self.uploads.len() as u64,
                got: u64::from(self.total_files),
            });
        }
        let mut valid: u64 = 0;
        let mut invalid: u64 = 0;
        for upload in &self.uploads {
            upload.validate()?;
            valid += u64::from(upload.valid_rows);
            invalid += u64::from(upload.invalid_rows);
        }
        if valid != u64::from(self.total_valid_rows) {
            return Err(ContractViolation::CountMismatch {
                field: "report.total_valid_rows",
                expected: valid,
                got: u64::from(self.total_valid_rows),
            });
        }
        if invalid != u64::from(self.total_invalid_rows) {
            return Err(ContractViolation::CountMismatch {
                field: "report.total_invalid_rows",
                expected: invalid,
                got: u64::from(self.total_invalid_rows),
            });
        }
        if self.has_errors != (self.total_invalid_rows > 0) {
            return Err(ContractViolation::InvalidValue {
                field: "report.has_errors",
                reason: "must equal (total_invalid_rows > 0)",
            });
        }
        Ok(())
    }
}
