#![forbid(unsafe_code)]

use std::env;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use margin_contracts::margin::{MarginComputation, MarginRow, MarginSummary};
use margin_contracts::upload::{FileType, UploadResult, ValidationIssue, ValidationReport};
use margin_engines::ctc_vault::CtcVault;
use margin_engines::margin::{
    MarginComputeError, MarginEngineConfig, MarginEngineRuntime, VaultCompensationResolver,
};
use margin_engines::validator::{SchemaValidatorConfig, SchemaValidatorRuntime};
use margin_pipeline::{BatchError, IngestBatch, ReferenceCatalog};
use margin_storage::{DatasetStore, IngestOutcome};

/// Multipart field names accepted by `POST /upload`.
pub fn file_type_for_field(field_name: &str) -> Option<FileType> {
    match field_name {
        "timecard_file" => Some(FileType::Timecard),
        "employee_file" => Some(FileType::Employee),
        "project_file" => Some(FileType::Project),
        _ => None,
    }
}

#[derive(Debug)]
pub enum GatewayError {
    NoFilesProvided,
    UnknownField(String),
    MultipartUnreadable(String),
    Batch(BatchError),
    Margin(MarginComputeError),
    LockPoisoned,
    AskNotConfigured,
    AskTransport(String),
    AskBadResponse(String),
}

impl std::fmt::Display for GatewayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoFilesProvided => {
                write!(f, "at least one of timecard_file, employee_file, project_file is required")
            }
            Self::UnknownField(name) => write!(f, "unknown multipart field: {name}"),
            Self::MultipartUnreadable(reason) => {
                write!(f, "multipart body could not be read: {reason}")
            }
            Self::Batch(err) => write!(f, "{err}"),
            Self::Margin(err) => write!(f, "{err}"),
            Self::LockPoisoned => write!(f, "gateway state lock poisoned"),
            Self::AskNotConfigured => {
                write!(f, "question forwarding is not configured (MARGIN_ASK_ENDPOINT unset)")
            }
            Self::AskTransport(reason) => write!(f, "question forwarding failed: {reason}"),
            Self::AskBadResponse(reason) => {
                write!(f, "question collaborator returned an unreadable response: {reason}")
            }
        }
    }
}

impl std::error::Error for GatewayError {}

impl From<BatchError> for GatewayError {
    fn from(value: BatchError) -> Self {
        Self::Batch(value)
    }
}

impl From<MarginComputeError> for GatewayError {
    fn from(value: MarginComputeError) -> Self {
        Self::Margin(value)
    }
}

impl GatewayError {
    /// Stable machine-readable code for the error envelope.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NoFilesProvided => "NO_FILES_PROVIDED",
            Self::UnknownField(_) => "UNKNOWN_FIELD",
            Self::MultipartUnreadable(_) => "BAD_MULTIPART",
            Self::Batch(BatchError::Precondition(_)) => "PRECONDITION_FAILED",
            Self::Batch(BatchError::Storage(_)) => "STORAGE_ERROR",
            Self::Batch(BatchError::Contract(_)) => "INVALID_SUBMISSION",
            Self::Batch(_) => "BATCH_ERROR",
            Self::Margin(_) => "MARGIN_ERROR",
            Self::LockPoisoned => "INTERNAL_ERROR",
            Self::AskNotConfigured => "ASK_NOT_CONFIGURED",
            Self::AskTransport(_) => "ASK_UPSTREAM_ERROR",
            Self::AskBadResponse(_) => "ASK_UPSTREAM_ERROR",
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            Self::NoFilesProvided | Self::UnknownField(_) | Self::MultipartUnreadable(_) => 400,
            Self::Batch(BatchError::Precondition(_)) => 409,
            Self::Batch(BatchError::Contract(_)) => 400,
            Self::Batch(_) => 500,
            Self::Margin(_) => 500,
            Self::LockPoisoned => 500,
            Self::AskNotConfigured => 503,
            Self::AskTransport(_) | Self::AskBadResponse(_) => 502,
        }
    }
}

// ---------------------------------------------------------------------------
// Wire bodies. Contract types stay serde-free; the adapter owns the JSON
// shape, and the plaintext CTC has no path into any of these.
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ValidationIssueBody {
    pub row: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    pub error: String,
}

impl From<ValidationIssue> for ValidationIssueBody {
    fn from(issue: ValidationIssue) -> Self {
        Self {
            row: issue.row,
            column: issue.column,
            value: issue.value,
            error: issue.error,
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct UploadResultBody {
    pub filename: String,
    pub file_type: String,
    pub total_rows: u32,
    pub valid_rows: u32,
    pub invalid_rows: u32,
    pub issues: Vec<ValidationIssueBody>,
}

impl From<UploadResult> for UploadResultBody {
    fn from(upload: UploadResult) -> Self {
        Self {
            filename: upload.filename,
            file_type: upload.file_type.as_str().to_string(),
            total_rows: upload.total_rows,
            valid_rows: upload.valid_rows,
            invalid_rows: upload.invalid_rows,
            issues: upload.issues.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ValidationReportBody {
    pub uploads: Vec<UploadResultBody>,
    pub total_files: u32,
    pub total_valid_rows: u32,
    pub total_invalid_rows: u32,
    pub has_errors: bool,
}

impl From<ValidationReport> for ValidationReportBody {
    fn from(report: ValidationReport) -> Self {
        Self {
            uploads: report.uploads.into_iter().map(Into::into).collect(),
            total_files: report.total_files,
            total_valid_rows: report.total_valid_rows,
            total_invalid_rows: report.total_invalid_rows,
            has_errors: report.has_errors,
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct MarginRowBody {
    pub project_name: String,
    pub total_hours: f64,
    pub budget: f64,
    pub gross_margin_percentage: f64,
    pub margin_defined: bool,
}

impl From<MarginRow> for MarginRowBody {
    fn from(row: MarginRow) -> Self {
        Self {
            project_name: row.project_name.as_str().to_string(),
            total_hours: present(row.total_hours),
            budget: present(row.budget),
            gross_margin_percentage: present(row.gross_margin_percentage),
            margin_defined: row.margin_defined,
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct MarginSummaryBody {
    pub total_projects: u32,
    pub total_hours: f64,
    pub total_budget: f64,
    pub average_margin_percentage: f64,
}

impl From<MarginSummary> for MarginSummaryBody {
    fn from(summary: MarginSummary) -> Self {
        Self {
            total_projects: summary.total_projects,
            total_hours: present(summary.total_hours),
            total_budget: present(summary.total_budget),
            average_margin_percentage: present(summary.average_margin_percentage),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct IngestOutcomeBody {
    pub employees_written: u32,
    pub projects_written: u32,
    pub timecards_written: u32,
    pub unchanged: bool,
}

impl From<IngestOutcome> for IngestOutcomeBody {
    fn from(outcome: IngestOutcome) -> Self {
        Self {
            employees_written: outcome.employees_written,
            projects_written: outcome.projects_written,
            timecards_written: outcome.timecards_written,
            unchanged: outcome.unchanged,
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct AskRequestBody {
    pub question: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

/// Internal decimals are full precision; presentation rounds to two
/// places, here and only here.
fn present(value: Decimal) -> f64 {
    value.round_dp(2).to_f64().unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Runtime
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct AskGatewayConfig {
    pub endpoint: Option<String>,
    pub timeout_ms: u32,
}

impl AskGatewayConfig {
    pub fn from_env() -> Self {
        Self {
            endpoint: env::var("MARGIN_ASK_ENDPOINT").ok().filter(|v| !v.trim().is_empty()),
            timeout_ms: parse_ask_timeout_ms_from_env(),
        }
    }
}

pub fn parse_ask_timeout_ms_from_env() -> u32 {
    env::var("MARGIN_ASK_TIMEOUT_MS")
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .filter(|v| (100..=120_000).contains(v))
        .unwrap_or(15_000)
}

/// Gateway state wiring. The store mutex serializes ingest against margin
/// reads; the batch mutex keeps one upload cycle live at a time. Validation
/// of a fresh batch only holds the store lock long enough to snapshot the
/// reference catalog, so margin reads proceed while a new batch validates.
#[derive(Clone)]
pub struct GatewayRuntime {
    store: Arc<Mutex<DatasetStore>>,
    batch: Arc<Mutex<IngestBatch>>,
    validator: SchemaValidatorRuntime,
    engine: MarginEngineRuntime,
    vault: CtcVault,
    ask: AskGatewayConfig,
}

impl GatewayRuntime {
    pub fn default_from_env() -> Self {
        Self::new(CtcVault::default_local(), AskGatewayConfig::from_env())
    }

    pub fn new(vault: CtcVault, ask: AskGatewayConfig) -> Self {
        Self {
            store: Arc::new(Mutex::new(DatasetStore::new())),
            batch: Arc::new(Mutex::new(IngestBatch::new())),
            validator: SchemaValidatorRuntime::new(SchemaValidatorConfig::mvp_v1()),
            engine: MarginEngineRuntime::new(MarginEngineConfig::mvp_v1()),
            vault,
            ask,
        }
    }

    /// Attach + validate in one call. A new upload abandons the previous
    /// batch, which has no side effects unless it was already ingested.
    pub fn upload(
        &self,
        files: Vec<(FileType, String, Vec<u8>)>,
    ) -> Result<ValidationReportBody, GatewayError> {
        if files.is_empty() {
            return Err(GatewayError::NoFilesProvided);
        }
        let reference = {
            let store = self.store.lock().map_err(|_| GatewayError::LockPoisoned)?;
            ReferenceCatalog::from_store(&store)
        };
        let mut batch = self.batch.lock().map_err(|_| GatewayError::LockPoisoned)?;
        *batch = IngestBatch::new();
        for (file_type, filename, raw_bytes) in files {
            batch.attach(file_type, filename, raw_bytes)?;
        }
        let report = batch.validate(&self.validator, &reference)?;
        tracing::info!(
            total_files = report.total_files,
            total_invalid_rows = report.total_invalid_rows,
            has_errors = report.has_errors,
            "batch validated"
        );
        Ok(report.into())
    }

    pub fn ingest(&self) -> Result<IngestOutcomeBody, GatewayError> {
        let mut batch = self.batch.lock().map_err(|_| GatewayError::LockPoisoned)?;
        let mut store = self.store.lock().map_err(|_| GatewayError::LockPoisoned)?;
        let outcome = batch.ingest(&self.vault, &mut store)?;
        tracing::info!(
            employees = outcome.employees_written,
            projects = outcome.projects_written,
            timecards = outcome.timecards_written,
            unchanged = outcome.unchanged,
            "batch ingested"
        );
        Ok(outcome.into())
    }

    pub fn margins(&self) -> Result<(Vec<MarginRowBody>, MarginSummaryBody), GatewayError> {
        let computation = self.compute_margins()?;
        if computation.orphaned_timecards > 0 {
            tracing::warn!(
                orphaned = computation.orphaned_timecards,
                "timecards excluded from margin aggregation"
            );
        }
        let rows = computation.rows.into_iter().map(Into::into).collect();
        let summary = computation.summary.into();
        Ok((rows, summary))
    }

    fn compute_margins(&self) -> Result<MarginComputation, GatewayError> {
        let store = self.store.lock().map_err(|_| GatewayError::LockPoisoned)?;
        let resolver = VaultCompensationResolver::new(
            self.vault.clone(),
            self.engine.config().standard_annual_hours,
        );
        let computation = self.engine.compute(
            store.projects(),
            store.employees(),
            store.timecards(),
            &resolver,
        )?;
        Ok(computation)
    }

    /// Pass-through to the external NL->SQL collaborator. The question goes
    /// out verbatim and the structured answer comes back unmodified; this
    /// gateway never inspects or rewrites the SQL.
    pub fn ask(&self, request: &AskRequestBody) -> Result<serde_json::Value, GatewayError> {
        let Some(endpoint) = &self.ask.endpoint else {
            return Err(GatewayError::AskNotConfigured);
        };
        let timeout = Duration::from_millis(u64::from(self.ask.timeout_ms).max(100));
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(timeout)
            .timeout_read(timeout)
            .timeout_write(timeout)
            .build();
        let payload = serde_json::json!({
            "question": request.question,
            "context": request.context,
        });
        let response = agent
            .post(endpoint)
            .set("Content-Type", "application/json")
            .set("Accept", "application/json")
            .send_json(payload)
            .map_err(|err| GatewayError::AskTransport(transport_reason(err)))?;
        serde_json::from_reader(response.into_reader())
            .map_err(|err| GatewayError::AskBadResponse(err.to_string()))
    }
}

fn transport_reason(err: ureq::Error) -> String {
    match err {
        ureq::Error::Status(code, _) => format!("upstream returned status {code}"),
        ureq::Error::Transport(transport) => transport.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};

    const TIMECARD_CSV: &[u8] =
        b"EMPLOYEE_ID,EMPLOYEE_NAME,DAILY_DATE,TIME_WORKED,PROJECT_NAME\nE001,Ada,2024-01-15,10,APOLLO\n";
    const EMPLOYEE_CSV: &[u8] = b"EMPLOYEE_ID,EMPLOYEE_NAME,CTC,CTCPHR\nE001,Ada,96000,50\n";
    const PROJECT_CSV: &[u8] = b"PROJECT_NAME,SOW\nAPOLLO,1000\n";

    fn temp_runtime(name: &str) -> (PathBuf, GatewayRuntime) {
        let suffix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(1);
        let base = std::env::temp_dir().join(format!("margin-gateway-test-{name}-{suffix}"));
        let vault = CtcVault::for_key_path(base.join("ctc_master.key"));
        let runtime = GatewayRuntime::new(
            vault,
            AskGatewayConfig {
                endpoint: None,
                timeout_ms: 1_000,
            },
        );
        (base, runtime)
    }

    fn all_files() -> Vec<(FileType, String, Vec<u8>)> {
        vec![
            (
                FileType::Timecard,
                "timecard.csv".to_string(),
                TIMECARD_CSV.to_vec(),
            ),
            (
                FileType::Employee,
                "employee.csv".to_string(),
                EMPLOYEE_CSV.to_vec(),
            ),
            (
                FileType::Project,
                "project.csv".to_string(),
                PROJECT_CSV.to_vec(),
            ),
        ]
    }

    #[test]
    fn at_gateway_01_upload_ingest_margins_round_trip() {
        let (base, runtime) = temp_runtime("round-trip");
        let report = runtime.upload(all_files()).unwrap();
        assert!(!report.has_errors);
        assert_eq!(report.total_files, 3);

        let outcome = runtime.ingest().unwrap();
        assert!(!outcome.unchanged);
        assert_eq!(outcome.timecards_written, 1);

        let (rows, summary) = runtime.margins().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].project_name, "APOLLO");
        assert_eq!(rows[0].total_hours, 10.0);
        assert_eq!(rows[0].gross_margin_percentage, 50.0);
        assert_eq!(summary.total_projects, 1);
        assert_eq!(summary.average_margin_percentage, 50.0);
        std::fs::remove_dir_all(base).unwrap();
    }

    #[test]
    fn at_gateway_02_ingest_without_clean_upload_maps_to_conflict() {
        let (base, runtime) = temp_runtime("no-upload");
        let err = runtime.ingest().expect_err("nothing staged");
        assert_eq!(err.code(), "PRECONDITION_FAILED");
        assert_eq!(err.http_status(), 409);
        assert!(err.to_string().contains("VALIDATED_CLEAN"));
        std::fs::remove_dir_all(base).ok();
    }

    #[test]
    fn at_gateway_03_upload_requires_at_least_one_file() {
        let (base, runtime) = temp_runtime("empty-upload");
        let err = runtime.upload(Vec::new()).expect_err("no files given");
        assert_eq!(err.http_status(), 400);
        std::fs::remove_dir_all(base).ok();
    }

    #[test]
    fn at_gateway_04_ask_without_endpoint_is_a_distinct_failure() {
        let (base, runtime) = temp_runtime("ask");
        let err = runtime
            .ask(&AskRequestBody {
                question: "which project has the best margin?".to_string(),
                context: None,
            })
            .expect_err("no collaborator configured");
        assert_eq!(err.code(), "ASK_NOT_CONFIGURED");
        assert_eq!(err.http_status(), 503);
        std::fs::remove_dir_all(base).ok();
    }

    #[test]
    fn at_gateway_05_no_plaintext_ctc_in_any_response_body() {
        let (base, runtime) = temp_runtime("ctc-leak");
        let report = runtime.upload(all_files()).unwrap();
        let report_json = serde_json::to_string(&report).unwrap();
        assert!(!report_json.contains("96000"));

        runtime.ingest().unwrap();
        let (rows, summary) = runtime.margins().unwrap();
        let margins_json = serde_json::to_string(&rows).unwrap();
        let summary_json = serde_json::to_string(&summary).unwrap();
        assert!(!margins_json.contains("96000"));
        assert!(!summary_json.contains("96000"));
        std::fs::remove_dir_all(base).unwrap();
    }

    #[test]
    fn at_gateway_06_reingest_of_same_batch_is_a_no_op() {
        let (base, runtime) = temp_runtime("idempotent");
        runtime.upload(all_files()).unwrap();
        runtime.ingest().unwrap();

        // Same files, new upload cycle: the store recognizes the batch.
        runtime.upload(all_files()).unwrap();
        let outcome = runtime.ingest().unwrap();
        assert!(outcome.unchanged);
        let (rows, _) = runtime.margins().unwrap();
        assert_eq!(rows.len(), 1);
        std::fs::remove_dir_all(base).unwrap();
    }

    #[test]
    fn at_gateway_07_multipart_field_names_map_to_file_types() {
        assert_eq!(file_type_for_field("timecard_file"), Some(FileType::Timecard));
        assert_eq!(file_type_for_field("employee_file"), Some(FileType::Employee));
        assert_eq!(file_type_for_field("project_file"), Some(FileType::Project));
        assert_eq!(file_type_for_field("resume_file"), None);
    }

    #[test]
    fn at_gateway_08_presentation_rounds_to_two_places() {
        // 1000 budget, cost 333.33...: full precision internally, 2dp out.
        let value: Decimal = "66.666666".parse().unwrap();
        assert_eq!(present(value), 66.67);
    }
}
