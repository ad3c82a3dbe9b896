#![forbid(unsafe_code)]

use std::collections::BTreeSet;

use margin_contracts::records::{
    EmployeeId, EmployeeRecord, ProjectName, ProjectRecord, TimeCardRecord,
};
use margin_contracts::upload::{FileSubmission, FileType, ValidationIssue, ValidationReport};
use margin_contracts::ContractViolation;
use margin_engines::ctc_vault::{CtcVault, VaultError};
use margin_engines::validator::{
    EmployeeDraft, ExtractedRows, ExtractedTimecard, SchemaValidatorRuntime, ValidatedFile,
};
use margin_storage::{
    fingerprint_bytes, DatasetStore, IngestOutcome, IngestPayload, IngestSet, StorageError,
};

use crate::report::assemble_report;

/// Explicit batch lifecycle. The ingest gate lives here and nowhere else:
/// no batch containing any invalid row can ever reach storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    Empty,
    FilesAttached,
    Validating,
    Validated { clean: bool },
    Ingesting,
    Ingested,
    Failed,
}

impl BatchState {
    pub fn as_str(self) -> &'static str {
        match self {
            BatchState::Empty => "EMPTY",
            BatchState::FilesAttached => "FILES_ATTACHED",
            BatchState::Validating => "VALIDATING",
            BatchState::Validated { clean: true } => "VALIDATED_CLEAN",
            BatchState::Validated { clean: false } => "VALIDATED_WITH_ERRORS",
            BatchState::Ingesting => "INGESTING",
            BatchState::Ingested => "INGESTED",
            BatchState::Failed => "FAILED",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreconditionError {
    pub operation: &'static str,
    pub required: &'static str,
    pub current: &'static str,
}

impl std::fmt::Display for PreconditionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} requires state {}, current state is {}",
            self.operation, self.required, self.current
        )
    }
}

impl std::error::Error for PreconditionError {}

#[derive(Debug)]
pub enum BatchError {
    Precondition(PreconditionError),
    Contract(ContractViolation),
    Vault(VaultError),
    Storage(StorageError),
    WorkerPanicked { filename: String },
}

impl std::fmt::Display for BatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Precondition(err) => write!(f, "{err}"),
            Self::Contract(err) => write!(f, "contract violation: {err}"),
            Self::Vault(err) => write!(f, "vault error: {err}"),
            Self::Storage(err) => write!(f, "storage error: {err}"),
            Self::WorkerPanicked { filename } => {
                write!(f, "validation worker for {filename} panicked")
            }
        }
    }
}

impl std::error::Error for BatchError {}

impl From<PreconditionError> for BatchError {
    fn from(value: PreconditionError) -> Self {
        Self::Precondition(value)
    }
}

impl From<ContractViolation> for BatchError {
    fn from(value: ContractViolation) -> Self {
        Self::Contract(value)
    }
}

impl From<StorageError> for BatchError {
    fn from(value: StorageError) -> Self {
        Self::Storage(value)
    }
}

/// Snapshot of the persisted natural keys, taken before validation so the
/// referential pass can resolve timecards against already-ingested sets.
#[derive(Debug, Clone, Default)]
pub struct ReferenceCatalog {
    pub employee_ids: BTreeSet<EmployeeId>,
    pub project_names: BTreeSet<ProjectName>,
}

impl ReferenceCatalog {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_store(store: &DatasetStore) -> Self {
        Self {
            employee_ids: store.employee_ids(),
            project_names: store.project_names(),
        }
    }
}

#[derive(Debug, Clone, Default)]
struct StagedRows {
    timecards: Option<(Vec<TimeCardRecord>, String)>,
    employees: Option<(Vec<EmployeeDraft>, String)>,
    projects: Option<(Vec<ProjectRecord>, String)>,
}

/// One upload cycle from attach through ingest-or-abandon. Dropping the
/// batch before `Ingested` has no side effects.
#[derive(Debug)]
pub struct IngestBatch {
    state: BatchState,
    files: Vec<FileSubmission>,
    report: Option<ValidationReport>,
    staged: StagedRows,
}

impl Default for IngestBatch {
    fn default() -> Self {
        Self::new()
    }
}

impl IngestBatch {
    pub fn new() -> Self {
        Self {
            state: BatchState::Empty,
            files: Vec::new(),
            report: None,
            staged: StagedRows::default(),
        }
    }

    pub fn state(&self) -> BatchState {
        self.state
    }

    pub fn report(&self) -> Option<&ValidationReport> {
        self.report.as_ref()
    }

    /// Attach or swap one file. Swapping keeps the original attachment
    /// slot so report ordering stays stable across re-validation.
    pub fn attach(
        &mut self,
        file_type: FileType,
        filename: String,
        raw_bytes: Vec<u8>,
    ) -> Result<(), BatchError> {
        match self.state {
            BatchState::Empty | BatchState::FilesAttached | BatchState::Validated { .. } => {}
            other => {
                return Err(PreconditionError {
                    operation: "attach",
                    required: "EMPTY or FILES_ATTACHED",
                    current: other.as_str(),
                }
                .into());
            }
        }
        let submission = FileSubmission::v1(file_type, filename, raw_bytes)?;
        match self
            .files
            .iter_mut()
            .find(|file| file.file_type == file_type)
        {
            Some(existing) => *existing = submission,
            None => self.files.push(submission),
        }
        // A swap invalidates any earlier validation pass.
        self.report = None;
        self.staged = StagedRows::default();
        self.state = BatchState::FilesAttached;
        Ok(())
    }

    /// Validate every attached file, one worker per file, reassembled in
    /// attachment order regardless of completion order.
    pub fn validate(
        &mut self,
        validator: &SchemaValidatorRuntime,
        reference: &ReferenceCatalog,
    ) -> Result<ValidationReport, BatchError> {
        match self.state {
            BatchState::FilesAttached | BatchState::Validated { .. } => {}
            other => {
                return Err(PreconditionError {
                    operation: "validate",
                    required: "FILES_ATTACHED",
                    current: other.as_str(),
                }
                .into());
            }
        }
        self.state = BatchState::Validating;
        self.report = None;
        self.staged = StagedRows::default();

        let mut joined: Vec<Result<ValidatedFile, String>> = Vec::with_capacity(self.files.len());
        std::thread::scope(|scope| {
            let handles: Vec<_> = self
                .files
                .iter()
                .map(|file| {
                    scope.spawn(move || {
                        validator.validate_and_extract(
                            file.file_type,
                            &file.filename,
                            &file.raw_bytes,
                        )
                    })
                })
                .collect();
            for (handle, file) in handles.into_iter().zip(&self.files) {
                joined.push(handle.join().map_err(|_| file.filename.clone()));
            }
        });
        let mut validated = Vec::with_capacity(joined.len());
        for outcome in joined {
            match outcome {
                Ok(file) => validated.push(file),
                Err(filename) => {
                    self.state = BatchState::Failed;
                    return Err(BatchError::WorkerPanicked { filename });
                }
            }
        }

        apply_reference_pass(&mut validated, reference);

        let mut uploads = Vec::with_capacity(validated.len());
        let mut staged = StagedRows::default();
        for (file, submission) in validated.into_iter().zip(&self.files) {
            let fingerprint = fingerprint_bytes(&submission.raw_bytes);
            match file.rows {
                ExtractedRows::Timecards(rows) => {
                    staged.timecards = Some((
                        rows.into_iter().map(|extracted| extracted.record).collect(),
                        fingerprint,
                    ));
                }
                ExtractedRows::Employees(rows) => {
                    staged.employees = Some((rows, fingerprint));
                }
                ExtractedRows::Projects(rows) => {
                    staged.projects = Some((rows, fingerprint));
                }
            }
            uploads.push(file.result);
        }

        let report = match assemble_report(uploads) {
            Ok(report) => report,
            Err(violation) => {
                self.state = BatchState::Failed;
                return Err(violation.into());
            }
        };
        self.state = BatchState::Validated {
            clean: !report.has_errors,
        };
        self.staged = staged;
        self.report = Some(report.clone());
        Ok(report)
    }

    /// The gate. Only a fully clean validation pass reaches storage, and
    /// the storage write itself is stage-then-swap atomic. A storage
    /// failure returns the batch to VALIDATED_CLEAN so the caller can
    /// retry; a vault failure is unrecoverable for this batch.
    pub fn ingest(
        &mut self,
        vault: &CtcVault,
        store: &mut DatasetStore,
    ) -> Result<IngestOutcome, BatchError> {
        if self.state != (BatchState::Validated { clean: true }) {
            return Err(PreconditionError {
                operation: "ingest",
                required: "VALIDATED_CLEAN",
                current: self.state.as_str(),
            }
            .into());
        }
        self.state = BatchState::Ingesting;
        let staged = self.staged.clone();

        let employees = match &staged.employees {
            Some((drafts, fingerprint)) => {
                let mut rows = Vec::with_capacity(drafts.len());
                for draft in drafts {
                    let encrypted = match vault.encrypt_ctc(draft.ctc) {
                        Ok(encrypted) => encrypted,
                        Err(err) => {
                            self.state = BatchState::Failed;
                            return Err(BatchError::Vault(err));
                        }
                    };
                    let record = match EmployeeRecord::v1(
                        draft.employee_id.clone(),
                        draft.employee_name.clone(),
                        encrypted,
                        draft.ctc_per_hour,
                    ) {
                        Ok(record) => record,
                        Err(violation) => {
                            self.state = BatchState::Failed;
                            return Err(violation.into());
                        }
                    };
                    rows.push(record);
                }
                Some(IngestSet {
                    rows,
                    fingerprint: fingerprint.clone(),
                })
            }
            None => None,
        };
        let projects = staged.projects.map(|(rows, fingerprint)| IngestSet {
            rows,
            fingerprint,
        });
        let timecards = staged.timecards.map(|(rows, fingerprint)| IngestSet {
            rows,
            fingerprint,
        });

        match store.ingest(IngestPayload {
            employees,
            projects,
            timecards,
        }) {
            Ok(outcome) => {
                self.state = BatchState::Ingested;
                Ok(outcome)
            }
            Err(err) => {
                // Storage staged-then-swaps, so nothing was written; the
                // batch stays ingestible for a retry.
                self.state = BatchState::Validated { clean: true };
                Err(err.into())
            }
        }
    }
}

/// Cross-file pass: every accepted timecard must resolve its employee and
/// project against the batch's own files when attached (ingest replaces
/// those sets) or against the persisted catalog otherwise.
fn apply_reference_pass(files: &mut [ValidatedFile], reference: &ReferenceCatalog) {
    let mut employee_ids: Option<BTreeSet<EmployeeId>> = None;
    let mut project_names: Option<BTreeSet<ProjectName>> = None;
    for file in files.iter() {
        match &file.rows {
            ExtractedRows::Employees(rows) => {
                employee_ids = Some(rows.iter().map(|d| d.employee_id.clone()).collect());
            }
            ExtractedRows::Projects(rows) => {
                project_names = Some(rows.iter().map(|p| p.project_name.clone()).collect());
            }
            ExtractedRows::Timecards(_) => {}
        }
    }
    let employee_ids = employee_ids.unwrap_or_else(|| reference.employee_ids.clone());
    let project_names = project_names.unwrap_or_else(|| reference.project_names.clone());

    for file in files.iter_mut() {
        let ExtractedRows::Timecards(rows) = &mut file.rows else {
            continue;
        };
        let mut kept: Vec<ExtractedTimecard> = Vec::with_capacity(rows.len());
        let mut flagged_rows = 0u32;
        let mut new_issues: Vec<ValidationIssue> = Vec::new();
        for extracted in rows.drain(..) {
            let mut row_issues: Vec<ValidationIssue> = Vec::new();
            if !employee_ids.contains(&extracted.record.employee_id) {
                row_issues.push(ValidationIssue {
                    row: extracted.row,
                    column: Some("EMPLOYEE_ID".to_string()),
                    value: Some(extracted.record.employee_id.as_str().to_string()),
                    error: "references an employee absent from the batch and the ingested set"
                        .to_string(),
                });
            }
            if !project_names.contains(&extracted.record.project_name) {
                row_issues.push(ValidationIssue {
                    row: extracted.row,
                    column: Some("PROJECT_NAME".to_string()),
                    value: Some(extracted.record.project_name.as_str().to_string()),
                    error: "references a project absent from the batch and the ingested set"
                        .to_string(),
                });
            }
            if row_issues.is_empty() {
                kept.push(extracted);
            } else {
                flagged_rows += 1;
                new_issues.extend(row_issues);
            }
        }
        *rows = kept;
        if flagged_rows > 0 {
            file.result.valid_rows -= flagged_rows;
            file.result.invalid_rows += flagged_rows;
            file.result.issues.extend(new_issues);
            file.result.issues.sort_by_key(|issue| issue.row);
        }
    }
}
