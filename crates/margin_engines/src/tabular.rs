#![forbid(unsafe_code)]

use margin_contracts::upload::FileType;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableParseError {
    NotUtf8,
    Empty,
    UnterminatedQuote { line: usize },
}

impl std::fmt::Display for TableParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotUtf8 => write!(f, "file is not valid UTF-8"),
            Self::Empty => write!(f, "file contains no header row"),
            Self::UnterminatedQuote { line } => {
                write!(f, "unterminated quoted field starting near line {line}")
            }
        }
    }
}

impl std::error::Error for TableParseError {}

/// One parsed tabular file: canonicalized header names plus raw data rows.
/// Rows keep their original cell strings; all interpretation happens in the
/// schema validator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    /// Parse CSV bytes (RFC-4180 quoting, LF or CRLF) and canonicalize the
    /// header through the per-file-type synonym table.
    pub fn parse_csv(file_type: FileType, bytes: &[u8]) -> Result<Self, TableParseError> {
        let text = std::str::from_utf8(bytes).map_err(|_| TableParseError::NotUtf8)?;
        let mut records = parse_records(text)?;
        // Drop fully-empty records (blank lines).
        records.retain(|cells| cells.iter().any(|c| !c.trim().is_empty()));
        if records.is_empty() {
            return Err(TableParseError::Empty);
        }
        let header = records.remove(0);
        let columns = header
            .iter()
            .map(|raw| canonical_column(file_type, raw))
            .collect();
        Ok(Self {
            columns,
            rows: records,
        })
    }

    pub fn column_index(&self, canonical: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == canonical)
    }
}

fn parse_records(text: &str) -> Result<Vec<Vec<String>>, TableParseError> {
    let mut records: Vec<Vec<String>> = Vec::new();
    let mut record: Vec<String> = Vec::new();
    let mut cell = String::new();
    let mut in_quotes = false;
    let mut quote_open_line = 0usize;
    let mut line = 1usize;

    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' => {
                    if chars.peek() == Some(&'"') {
                        chars.next();
                        cell.push('"');
                    } else {
                        in_quotes = false;
                    }
                }
                '\n' => {
                    line += 1;
                    cell.push('\n');
                }
                _ => cell.push(c),
            }
            continue;
        }
        match c {
            '"' if cell.is_empty() => {
                in_quotes = true;
                quote_open_line = line;
            }
            ',' => {
                record.push(std::mem::take(&mut cell));
            }
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                line += 1;
                record.push(std::mem::take(&mut cell));
                records.push(std::mem::take(&mut record));
            }
            '\n' => {
                line += 1;
                record.push(std::mem::take(&mut cell));
                records.push(std::mem::take(&mut record));
            }
            _ => cell.push(c),
        }
    }
    if in_quotes {
        return Err(TableParseError::UnterminatedQuote {
            line: quote_open_line,
        });
    }
    if !cell.is_empty() || !record.is_empty() {
        record.push(cell);
        records.push(record);
    }
    Ok(records)
}

/// Canonical upload headers, matching the source system's sheets.
pub mod columns {
    pub const EMPLOYEE_ID: &str = "EMPLOYEE_ID";
    pub const EMPLOYEE_NAME: &str = "EMPLOYEE_NAME";
    pub const DAILY_DATE: &str = "DAILY_DATE";
    pub const TIME_WORKED: &str = "TIME_WORKED";
    pub const PROJECT_NAME: &str = "PROJECT_NAME";
    pub const TIME_CARD_STATE: &str = "TIME_CARD_STATE";
    pub const TASK_TYPE: &str = "TASK_TYPE";
    pub const CTC: &str = "CTC";
    pub const CTCPHR: &str = "CTCPHR";
    pub const SOW: &str = "SOW";
    pub const PROJECT_ID: &str = "PROJECT_ID";
}

/// Map one raw header through the synonym table for its file type. Unknown
/// headers keep their normalized (trimmed, upper-cased) form so the
/// validator can report them verbatim.
pub fn canonical_column(file_type: FileType, raw: &str) -> String {
    let normalized = raw.trim().to_ascii_uppercase();
    for (canonical, synonyms) in synonym_table(file_type) {
        if normalized == *canonical || synonyms.contains(&normalized.as_str()) {
            return (*canonical).to_string();
        }
    }
    normalized
}

fn synonym_table(file_type: FileType) -> &'static [(&'static str, &'static [&'static str])] {
    match file_type {
        FileType::Timecard => &[
            (
                columns::EMPLOYEE_ID,
                &["EMP_ID", "EMPID", "EMPLOYEEID", "EMPLOYEE ID"],
            ),
            (
                columns::EMPLOYEE_NAME,
                &["EMP_NAME", "EMPNAME", "EMPLOYEE NAME", "NAME"],
            ),
            (
                columns::DAILY_DATE,
                &["DATE", "WORKDATE", "WORK_DATE", "DAILY DATE"],
            ),
            (
                columns::TIME_WORKED,
                &["HOURS_WORKED", "HOURSWORKED", "HOURS", "TIME"],
            ),
            (columns::PROJECT_NAME, &["PROJECT", "PROJECTNAME"]),
            (columns::TIME_CARD_STATE, &["STATUS", "STATE", "CARDSTATE"]),
            (columns::TASK_TYPE, &["TASK", "TYPE", "TASKTYPE"]),
        ],
        FileType::Employee => &[
            (
                columns::EMPLOYEE_ID,
                &["EMP_ID", "EMPID", "EMPLOYEEID", "EMPLOYEE ID"],
            ),
            (
                columns::EMPLOYEE_NAME,
                &["EMP_NAME", "EMPNAME", "EMPLOYEE NAME", "NAME"],
            ),
            (
                columns::CTC,
                &["CTC_ANNUAL", "CTCANNUAL", "COST TO COMPANY", "ANNUAL CTC", "SALARY"],
            ),
            (columns::CTCPHR, &["CTC_HOURLY", "HOURLY RATE", "HOURLYRATE"]),
        ],
        FileType::Project => &[
            (columns::PROJECT_NAME, &["PROJECT", "PROJECTNAME", "NAME"]),
            (
                columns::SOW,
                &["BUDGET", "SOW_VALUE", "STATEMENT OF WORK", "PROJECT BUDGET"],
            ),
            (columns::PROJECT_ID, &["ID", "PROJECTID", "PROJECT ID"]),
        ],
    }
}
