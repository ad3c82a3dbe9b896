#![forbid(unsafe_code)]

use std::collections::BTreeSet;

use chrono::NaiveDate;
use rust_decimal::Decimal;

use margin_contracts::records::{
    hours_worked_max, hours_worked_min, EmployeeId, ProjectName, ProjectRecord, TimeCardRecord,
    MAX_EMPLOYEE_NAME_LEN, MAX_PROJECT_NAME_LEN,
};
use margin_contracts::upload::{FileType, UploadResult, ValidationIssue, MAX_CELL_VALUE_LEN};

use crate::tabular::{columns, RawTable, TableParseError};

const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchemaValidatorConfig {
    pub max_data_rows: u32,
}

impl SchemaValidatorConfig {
    pub fn mvp_v1() -> Self {
        Self {
            max_data_rows: 100_000,
        }
    }
}

/// Employee row accepted by validation but not yet encrypted. The plaintext
/// CTC lives only between the validator and the vault at ingest time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmployeeDraft {
    pub employee_id: EmployeeId,
    pub employee_name: String,
    pub ctc: Decimal,
    pub ctc_per_hour: Option<Decimal>,
}

/// Accepted timecard row plus its 1-based source row, kept so the
/// cross-file referential pass can point back at the original line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedTimecard {
    pub row: u32,
    pub record: TimeCardRecord,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExtractedRows {
    Timecards(Vec<ExtractedTimecard>),
    Employees(Vec<EmployeeDraft>),
    Projects(Vec<ProjectRecord>),
}

impl ExtractedRows {
    fn empty_for(file_type: FileType) -> Self {
        match file_type {
            FileType::Timecard => ExtractedRows::Timecards(Vec::new()),
            FileType::Employee => ExtractedRows::Employees(Vec::new()),
            FileType::Project => ExtractedRows::Projects(Vec::new()),
        }
    }
}

/// Per-file validation outcome plus the typed rows that passed every rule.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedFile {
    pub result: UploadResult,
    pub rows: ExtractedRows,
}

/// Pure schema validator: identical input always yields an identical
/// `UploadResult`. Rule violations become issues, never errors; an
/// unparseable file becomes a single synthetic issue so the rest of the
/// batch keeps processing.
#[derive(Debug, Clone)]
pub struct SchemaValidatorRuntime {
    config: SchemaValidatorConfig,
}

impl SchemaValidatorRuntime {
    pub fn new(config: SchemaValidatorConfig) -> Self {
        Self { config }
    }

    pub fn validate(&self, file_type: FileType, filename: &str, raw_bytes: &[u8]) -> UploadResult {
        self.validate_and_extract(file_type, filename, raw_bytes)
            .result
    }

    pub fn validate_and_extract(
        &self,
        file_type: FileType,
        filename: &str,
        raw_bytes: &[u8],
    ) -> ValidatedFile {
        let table = match RawTable::parse_csv(file_type, raw_bytes) {
            Ok(table) => table,
            Err(err) => return file_failure(file_type, filename, &err),
        };
        if table.rows.len() > self.config.max_data_rows as usize {
            return budget_failure(file_type, filename, self.config.max_data_rows);
        }

        let missing = missing_required_columns(file_type, &table);
        if !missing.is_empty() {
            return missing_column_failure(file_type, filename, &table, &missing);
        }

        match file_type {
            FileType::Timecard => validate_timecards(filename, &table),
            FileType::Employee => validate_employees(filename, &table),
            FileType::Project => validate_projects(filename, &table),
        }
    }
}

pub fn required_columns(file_type: FileType) -> &'static [&'static str] {
    match file_type {
        FileType::Timecard => &[
            columns::EMPLOYEE_ID,
            columns::EMPLOYEE_NAME,
            columns::DAILY_DATE,
            columns::TIME_WORKED,
            columns::PROJECT_NAME,
        ],
        FileType::Employee => &[columns::EMPLOYEE_ID, columns::EMPLOYEE_NAME, columns::CTC],
        FileType::Project => &[columns::PROJECT_NAME, columns::SOW],
    }
}

fn missing_required_columns(file_type: FileType, table: &RawTable) -> Vec<&'static str> {
    required_columns(file_type)
        .iter()
        .filter(|col| table.column_index(col).is_none())
        .copied()
        .collect()
}

fn issue(row: u32, column: Option<&str>, value: Option<&str>, error: String) -> ValidationIssue {
    let value = value.map(|v| {
        let mut v = v.to_string();
        if v.len() > MAX_CELL_VALUE_LEN {
            let mut cut = MAX_CELL_VALUE_LEN;
            while !v.is_char_boundary(cut) {
                cut -= 1;
            }
            v.truncate(cut);
        }
        v
    });
    ValidationIssue {
        row,
        column: column.map(str::to_string),
        value,
        error,
    }
}

fn file_failure(file_type: FileType, filename: &str, err: &TableParseError) -> ValidatedFile {
    ValidatedFile {
        result: UploadResult {
            filename: filename.to_string(),
            file_type,
            total_rows: 0,
            valid_rows: 0,
            invalid_rows: 0,
            issues: vec![issue(0, None, None, format!("file could not be parsed: {err}"))],
        },
        rows: ExtractedRows::empty_for(file_type),
    }
}

fn budget_failure(file_type: FileType, filename: &str, max_rows: u32) -> ValidatedFile {
    ValidatedFile {
        result: UploadResult {
            filename: filename.to_string(),
            file_type,
            total_rows: 0,
            valid_rows: 0,
            invalid_rows: 0,
            issues: vec![issue(
                0,
                None,
                None,
                format!("file exceeds the row budget of {max_rows} data rows"),
            )],
        },
        rows: ExtractedRows::empty_for(file_type),
    }
}

fn missing_column_failure(
    file_type: FileType,
    filename: &str,
    table: &RawTable,
    missing: &[&'static str],
) -> ValidatedFile {
    let total = table.rows.len() as u32;
    let mut issues = Vec::with_capacity(missing.len() * table.rows.len());
    for row in 1..=total {
        for col in missing {
            issues.push(issue(
                row,
                Some(col),
                None,
                format!("required column {col} is missing"),
            ));
        }
    }
    ValidatedFile {
        result: UploadResult {
            filename: filename.to_string(),
            file_type,
            total_rows: total,
            valid_rows: 0,
            invalid_rows: total,
            issues,
        },
        rows: ExtractedRows::empty_for(file_type),
    }
}

fn cell<'a>(table: &RawTable, cells: &'a [String], canonical: &str) -> Option<&'a str> {
    let idx = table.column_index(canonical)?;
    cells.get(idx).map(|s| s.trim())
}

fn opt_cell(table: &RawTable, cells: &[String], canonical: &str) -> Option<String> {
    match cell(table, cells, canonical) {
        Some(v) if !v.is_empty() => Some(v.to_string()),
        _ => None,
    }
}

fn ragged_row_issue(row: u32, got: usize, expected: usize) -> ValidationIssue {
    issue(
        row,
        None,
        None,
        format!("row has {got} cells but the header has {expected} columns"),
    )
}

struct RowOutcome<T> {
    record: Option<T>,
    issues: Vec<ValidationIssue>,
}

fn finish<T>(
    filename: &str,
    file_type: FileType,
    total: u32,
    records: Vec<T>,
    issues: Vec<ValidationIssue>,
    invalid: u32,
    wrap: impl FnOnce(Vec<T>) -> ExtractedRows,
) -> ValidatedFile {
    ValidatedFile {
        result: UploadResult {
            filename: filename.to_string(),
            file_type,
            total_rows: total,
            valid_rows: total - invalid,
            invalid_rows: invalid,
            issues,
        },
        rows: wrap(records),
    }
}

fn validate_timecards(filename: &str, table: &RawTable) -> ValidatedFile {
    let mut records = Vec::new();
    let mut issues = Vec::new();
    let mut invalid = 0u32;
    for (i, cells) in table.rows.iter().enumerate() {
        let row = (i + 1) as u32;
        if cells.len() != table.columns.len() {
            issues.push(ragged_row_issue(row, cells.len(), table.columns.len()));
            invalid += 1;
            continue;
        }
        let outcome = check_timecard_row(table, cells, row);
        if outcome.issues.is_empty() {
            if let Some(record) = outcome.record {
                records.push(ExtractedTimecard { row, record });
                continue;
            }
        }
        invalid += 1;
        issues.extend(outcome.issues);
    }
    finish(
        filename,
        FileType::Timecard,
        table.rows.len() as u32,
        records,
        issues,
        invalid,
        ExtractedRows::Timecards,
    )
}

fn check_timecard_row(table: &RawTable, cells: &[String], row: u32) -> RowOutcome<TimeCardRecord> {
    let mut issues = Vec::new();

    let employee_id = check_employee_id(table, cells, row, &mut issues);
    let employee_name = check_name(
        table,
        cells,
        row,
        columns::EMPLOYEE_NAME,
        MAX_EMPLOYEE_NAME_LEN,
        &mut issues,
    );
    let date = check_date(table, cells, row, &mut issues);
    let hours = check_hours(table, cells, row, &mut issues);
    let project_name = check_project_name(table, cells, row, &mut issues);
    let state = opt_cell(table, cells, columns::TIME_CARD_STATE);
    let task_type = opt_cell(table, cells, columns::TASK_TYPE);

    let record = match (employee_id, employee_name, date, hours, project_name) {
        (Some(employee_id), Some(employee_name), Some(date), Some(hours), Some(project_name)) => {
            match TimeCardRecord::v1(
                employee_id,
                employee_name,
                date,
                hours,
                project_name,
                state,
                task_type,
            ) {
                Ok(record) => Some(record),
                Err(violation) => {
                    issues.push(issue(row, None, None, violation.to_string()));
                    None
                }
            }
        }
        _ => None,
    };
    RowOutcome { record, issues }
}

fn validate_employees(filename: &str, table: &RawTable) -> ValidatedFile {
    let mut records = Vec::new();
    let mut issues = Vec::new();
    let mut invalid = 0u32;
    let mut seen_ids: BTreeSet<EmployeeId> = BTreeSet::new();
    for (i, cells) in table.rows.iter().enumerate() {
        let row = (i + 1) as u32;
        if cells.len() != table.columns.len() {
            issues.push(ragged_row_issue(row, cells.len(), table.columns.len()));
            invalid += 1;
            continue;
        }
        let outcome = check_employee_row(table, cells, row, &mut seen_ids);
        if outcome.issues.is_empty() {
            if let Some(record) = outcome.record {
                records.push(record);
                continue;
            }
        }
        invalid += 1;
        issues.extend(outcome.issues);
    }
    finish(
        filename,
        FileType::Employee,
        table.rows.len() as u32,
        records,
        issues,
        invalid,
        ExtractedRows::Employees,
    )
}

fn check_employee_row(
    table: &RawTable,
    cells: &[String],
    row: u32,
    seen_ids: &mut BTreeSet<EmployeeId>,
) -> RowOutcome<EmployeeDraft> {
    let mut issues = Vec::new();

    let employee_id = check_employee_id(table, cells, row, &mut issues);
    if let Some(id) = &employee_id {
        if !seen_ids.insert(id.clone()) {
            issues.push(issue(
                row,
                Some(columns::EMPLOYEE_ID),
                Some(id.as_str()),
                format!("duplicate {} within the file", columns::EMPLOYEE_ID),
            ));
        }
    }
    let employee_name = check_name(
        table,
        cells,
        row,
        columns::EMPLOYEE_NAME,
        MAX_EMPLOYEE_NAME_LEN,
        &mut issues,
    );
    let ctc = check_non_negative_decimal(table, cells, row, columns::CTC, &mut issues);
    let ctc_per_hour = match opt_cell(table, cells, columns::CTCPHR) {
        Some(raw) => match parse_non_negative_decimal(&raw) {
            Ok(rate) => Some(rate),
            Err(reason) => {
                issues.push(issue(row, Some(columns::CTCPHR), Some(&raw), reason));
                None
            }
        },
        None => None,
    };

    let record = match (employee_id, employee_name, ctc) {
        (Some(employee_id), Some(employee_name), Some(ctc)) if issues.is_empty() => {
            Some(EmployeeDraft {
                employee_id,
                employee_name,
                ctc,
                ctc_per_hour,
            })
        }
        _ => None,
    };
    RowOutcome { record, issues }
}

fn validate_projects(filename: &str, table: &RawTable) -> ValidatedFile {
    let mut records = Vec::new();
    let mut issues = Vec::new();
    let mut invalid = 0u32;
    let mut seen_names: BTreeSet<ProjectName> = BTreeSet::new();
    for (i, cells) in table.rows.iter().enumerate() {
        let row = (i + 1) as u32;
        if cells.len() != table.columns.len() {
            issues.push(ragged_row_issue(row, cells.len(), table.columns.len()));
            invalid += 1;
            continue;
        }
        let outcome = check_project_row(table, cells, row, &mut seen_names);
        if outcome.issues.is_empty() {
            if let Some(record) = outcome.record {
                records.push(record);
                continue;
            }
        }
        invalid += 1;
        issues.extend(outcome.issues);
    }
    finish(
        filename,
        FileType::Project,
        table.rows.len() as u32,
        records,
        issues,
        invalid,
        ExtractedRows::Projects,
    )
}

fn check_project_row(
    table: &RawTable,
    cells: &[String],
    row: u32,
    seen_names: &mut BTreeSet<ProjectName>,
) -> RowOutcome<ProjectRecord> {
    let mut issues = Vec::new();

    let project_name = check_project_name(table, cells, row, &mut issues);
    if let Some(name) = &project_name {
        if !seen_names.insert(name.clone()) {
            issues.push(issue(
                row,
                Some(columns::PROJECT_NAME),
                Some(name.as_str()),
                format!("duplicate {} within the file", columns::PROJECT_NAME),
            ));
        }
    }
    let sow = check_non_negative_decimal(table, cells, row, columns::SOW, &mut issues);
    let project_id = match opt_cell(table, cells, columns::PROJECT_ID) {
        Some(raw) => match raw.parse::<u64>() {
            Ok(id) => Some(id),
            Err(_) => {
                issues.push(issue(
                    row,
                    Some(columns::PROJECT_ID),
                    Some(&raw),
                    "must be an unsigned integer".to_string(),
                ));
                None
            }
        },
        None => None,
    };

    let record = match (project_name, sow) {
        (Some(project_name), Some(sow)) if issues.is_empty() => {
            match ProjectRecord::v1(project_id, project_name, sow) {
                Ok(record) => Some(record),
                Err(violation) => {
                    issues.push(issue(row, None, None, violation.to_string()));
                    None
                }
            }
        }
        _ => None,
    };
    RowOutcome { record, issues }
}

fn check_employee_id(
    table: &RawTable,
    cells: &[String],
    row: u32,
    issues: &mut Vec<ValidationIssue>,
) -> Option<EmployeeId> {
    let raw = cell(table, cells, columns::EMPLOYEE_ID).unwrap_or("");
    if raw.is_empty() {
        issues.push(issue(
            row,
            Some(columns::EMPLOYEE_ID),
            None,
            "required value is missing".to_string(),
        ));
        return None;
    }
    match EmployeeId::v1(raw.to_ascii_uppercase()) {
        Ok(id) => Some(id),
        Err(_) => {
            issues.push(issue(
                row,
                Some(columns::EMPLOYEE_ID),
                Some(raw),
                "must be 1..=10 letters or digits".to_string(),
            ));
            None
        }
    }
}

fn check_name(
    table: &RawTable,
    cells: &[String],
    row: u32,
    column: &'static str,
    max_len: usize,
    issues: &mut Vec<ValidationIssue>,
) -> Option<String> {
    let raw = cell(table, cells, column).unwrap_or("");
    if raw.is_empty() {
        issues.push(issue(
            row,
            Some(column),
            None,
            "required value is missing".to_string(),
        ));
        return None;
    }
    if raw.len() > max_len {
        issues.push(issue(
            row,
            Some(column),
            Some(raw),
            format!("exceeds the maximum length of {max_len} characters"),
        ));
        return None;
    }
    Some(raw.to_string())
}

fn check_date(
    table: &RawTable,
    cells: &[String],
    row: u32,
    issues: &mut Vec<ValidationIssue>,
) -> Option<NaiveDate> {
    let raw = cell(table, cells, columns::DAILY_DATE).unwrap_or("");
    if raw.is_empty() {
        issues.push(issue(
            row,
            Some(columns::DAILY_DATE),
            None,
            "required value is missing".to_string(),
        ));
        return None;
    }
    match NaiveDate::parse_from_str(raw, DATE_FORMAT) {
        Ok(date) => Some(date),
        Err(_) => {
            issues.push(issue(
                row,
                Some(columns::DAILY_DATE),
                Some(raw),
                "invalid date, expected YYYY-MM-DD".to_string(),
            ));
            None
        }
    }
}

fn check_hours(
    table: &RawTable,
    cells: &[String],
    row: u32,
    issues: &mut Vec<ValidationIssue>,
) -> Option<Decimal> {
    let raw = cell(table, cells, columns::TIME_WORKED).unwrap_or("");
    if raw.is_empty() {
        issues.push(issue(
            row,
            Some(columns::TIME_WORKED),
            None,
            "required value is missing".to_string(),
        ));
        return None;
    }
    let hours = match raw.parse::<Decimal>() {
        Ok(hours) => hours,
        Err(_) => {
            issues.push(issue(
                row,
                Some(columns::TIME_WORKED),
                Some(raw),
                "is not a number".to_string(),
            ));
            return None;
        }
    };
    if hours < hours_worked_min() || hours > hours_worked_max() {
        issues.push(issue(
            row,
            Some(columns::TIME_WORKED),
            Some(raw),
            format!("value {raw} outside allowed range [0.1, 999.9]"),
        ));
        return None;
    }
    Some(hours)
}

fn check_project_name(
    table: &RawTable,
    cells: &[String],
    row: u32,
    issues: &mut Vec<ValidationIssue>,
) -> Option<ProjectName> {
    let raw = cell(table, cells, columns::PROJECT_NAME).unwrap_or("");
    if raw.is_empty() {
        issues.push(issue(
            row,
            Some(columns::PROJECT_NAME),
            None,
            "required value is missing".to_string(),
        ));
        return None;
    }
    if raw.len() > MAX_PROJECT_NAME_LEN {
        issues.push(issue(
            row,
            Some(columns::PROJECT_NAME),
            Some(raw),
            format!(
                "exceeds the maximum length of {MAX_PROJECT_NAME_LEN} characters"
            ),
        ));
        return None;
    }
    match ProjectName::v1(raw.to_ascii_uppercase()) {
        Ok(name) => Some(name),
        Err(violation) => {
            issues.push(issue(
                row,
                Some(columns::PROJECT_NAME),
                Some(raw),
                violation.to_string(),
            ));
            None
        }
    }
}

fn check_non_negative_decimal(
    table: &RawTable,
    cells: &[String],
    row: u32,
    column: &'static str,
    issues: &mut Vec<ValidationIssue>,
) -> Option<Decimal> {
    let raw = cell(table, cells, column).unwrap_or("");
    if raw.is_empty() {
        issues.push(issue(
            row,
            Some(column),
            None,
            "required value is missing".to_string(),
        ));
        return None;
    }
    match parse_non_negative_decimal(raw) {
        Ok(value) => Some(value),
        Err(reason) => {
            issues.push(issue(row, Some(column), Some(raw), reason));
            None
        }
    }
}

fn parse_non_negative_decimal(raw: &str) -> Result<Decimal, String> {
    let value = raw
        .parse::<Decimal>()
        .map_err(|_| "is not a number".to_string())?;
    if value.is_sign_negative() {
        return Err("must be a non-negative number".to_string());
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use margin_contracts::Validate;

    fn runtime() -> SchemaValidatorRuntime {
        SchemaValidatorRuntime::new(SchemaValidatorConfig::mvp_v1())
    }

    #[test]
    fn at_validator_01_out_of_range_hours_cite_column_value_and_bound() {
        let bytes =
            b"EMPLOYEE_ID,EMPLOYEE_NAME,DAILY_DATE,TIME_WORKED,PROJECT_NAME\nE001,Ada,2024-01-15,1000,Apollo\n";
        let result = runtime().validate(FileType::Timecard, "timecard.csv", bytes);
        assert!(result.validate().is_ok());
        assert_eq!(result.total_rows, 1);
        assert_eq!(result.invalid_rows, 1);
        assert_eq!(result.issues.len(), 1);
        let issue = &result.issues[0];
        assert_eq!(issue.row, 1);
        assert_eq!(issue.column.as_deref(), Some("TIME_WORKED"));
        assert_eq!(issue.value.as_deref(), Some("1000"));
        assert!(issue.error.contains("[0.1, 999.9]"));
    }

    #[test]
    fn at_validator_02_missing_ctc_column_marks_every_row_invalid() {
        let bytes = b"EMPLOYEE_ID,EMPLOYEE_NAME\nE001,Ada\nE002,Grace\nE003,Edsger\n";
        let result = runtime().validate(FileType::Employee, "employee.csv", bytes);
        assert_eq!(result.total_rows, 3);
        assert_eq!(result.valid_rows, 0);
        assert_eq!(result.invalid_rows, 3);
        assert_eq!(result.issues.len(), 3);
        for (i, issue) in result.issues.iter().enumerate() {
            assert_eq!(issue.row, (i + 1) as u32);
            assert_eq!(issue.column.as_deref(), Some("CTC"));
            assert!(issue.error.contains("missing"));
        }
    }

    #[test]
    fn at_validator_03_one_issue_per_violated_rule_same_row() {
        let bytes = b"EMPLOYEE_ID,EMPLOYEE_NAME,DAILY_DATE,TIME_WORKED,PROJECT_NAME\n,Ada,13-2024-01,abc,Apollo\n";
        let result = runtime().validate(FileType::Timecard, "timecard.csv", bytes);
        assert_eq!(result.invalid_rows, 1);
        assert_eq!(result.issues.len(), 3);
        assert!(result.issues.iter().all(|i| i.row == 1));
        let columns: Vec<_> = result
            .issues
            .iter()
            .map(|i| i.column.as_deref().unwrap())
            .collect();
        assert_eq!(columns, vec!["EMPLOYEE_ID", "DAILY_DATE", "TIME_WORKED"]);
    }

    #[test]
    fn at_validator_04_unparseable_file_is_a_single_synthetic_issue() {
        let result = runtime().validate(FileType::Timecard, "timecard.csv", &[0xff, 0xfe]);
        assert_eq!(result.total_rows, 0);
        assert_eq!(result.valid_rows, 0);
        assert_eq!(result.invalid_rows, 0);
        assert_eq!(result.issues.len(), 1);
        assert_eq!(result.issues[0].row, 0);
        assert!(result.issues[0].error.contains("could not be parsed"));
    }

    #[test]
    fn at_validator_05_validation_is_deterministic() {
        let bytes = b"EMPLOYEE_ID,EMPLOYEE_NAME,CTC,CTCPHR\nE001,Ada,96000,50\ne9,Grace,-1,\n";
        let first = runtime().validate(FileType::Employee, "employee.csv", bytes);
        let second = runtime().validate(FileType::Employee, "employee.csv", bytes);
        assert_eq!(first, second);
        assert_eq!(format!("{first:?}"), format!("{second:?}"));
    }

    #[test]
    fn at_validator_06_clean_timecards_extract_normalized_records() {
        let bytes = b"EMP_ID,Name,Date,Hours,Project,Status\ne001,Ada,2024-01-15,8.5,apollo,Approved\n";
        let validated = runtime().validate_and_extract(FileType::Timecard, "timecard.csv", bytes);
        assert_eq!(validated.result.valid_rows, 1);
        let ExtractedRows::Timecards(rows) = validated.rows else {
            panic!("expected timecard rows");
        };
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].row, 1);
        assert_eq!(rows[0].record.employee_id.as_str(), "E001");
        assert_eq!(rows[0].record.project_name.as_str(), "APOLLO");
        assert_eq!(rows[0].record.state.as_deref(), Some("Approved"));
        assert_eq!(rows[0].record.hours_worked, Decimal::new(85, 1));
    }

    #[test]
    fn at_validator_07_duplicate_employee_id_flags_the_later_row() {
        let bytes = b"EMPLOYEE_ID,EMPLOYEE_NAME,CTC\nE001,Ada,96000\nE001,Grace,84000\n";
        let result = runtime().validate(FileType::Employee, "employee.csv", bytes);
        assert_eq!(result.valid_rows, 1);
        assert_eq!(result.invalid_rows, 1);
        assert_eq!(result.issues.len(), 1);
        assert_eq!(result.issues[0].row, 2);
        assert!(result.issues[0].error.contains("duplicate"));
    }

    #[test]
    fn at_validator_08_ragged_row_is_flagged_and_others_continue() {
        let bytes = b"PROJECT_NAME,SOW\nApollo,1000\nGemini\nSaturn,2000\n";
        let validated = runtime().validate_and_extract(FileType::Project, "project.csv", bytes);
        assert_eq!(validated.result.total_rows, 3);
        assert_eq!(validated.result.valid_rows, 2);
        assert_eq!(validated.result.invalid_rows, 1);
        assert_eq!(validated.result.issues[0].row, 2);
        assert!(validated.result.issues[0].error.contains("cells"));
        let ExtractedRows::Projects(rows) = validated.rows else {
            panic!("expected project rows");
        };
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn at_validator_09_zero_sow_is_valid() {
        let bytes = b"PROJECT_NAME,SOW\nApollo,0\n";
        let result = runtime().validate(FileType::Project, "project.csv", bytes);
        assert_eq!(result.valid_rows, 1);
        assert!(result.issues.is_empty());
    }

    #[test]
    fn at_validator_10_optional_ctcphr_is_validated_when_present() {
        let bytes = b"EMPLOYEE_ID,EMPLOYEE_NAME,CTC,CTCPHR\nE001,Ada,96000,-5\n";
        let result = runtime().validate(FileType::Employee, "employee.csv", bytes);
        assert_eq!(result.invalid_rows, 1);
        assert_eq!(result.issues[0].column.as_deref(), Some("CTCPHR"));
        assert!(result.issues[0].error.contains("non-negative"));
    }
}
