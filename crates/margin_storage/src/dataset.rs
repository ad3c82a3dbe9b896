#![forbid(unsafe_code)]

use std::collections::{BTreeMap, BTreeSet};

use sha2::{Digest, Sha256};

use margin_contracts::records::{
    EmployeeId, EmployeeRecord, ProjectName, ProjectRecord, TimeCardRecord,
};
use margin_contracts::{ContractViolation, Validate};

#[derive(Debug, Clone, PartialEq)]
pub enum StorageError {
    DuplicateKey {
        table: &'static str,
        key: String,
    },
    ForeignKeyViolation {
        table: &'static str,
        key: String,
    },
    ContractViolation(ContractViolation),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateKey { table, key } => {
                write!(f, "duplicate key {key} in table {table}")
            }
            Self::ForeignKeyViolation { table, key } => {
                write!(f, "table {table} references missing key {key}")
            }
            Self::ContractViolation(violation) => write!(f, "contract violation: {violation}"),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<ContractViolation> for StorageError {
    fn from(value: ContractViolation) -> Self {
        Self::ContractViolation(value)
    }
}

/// SHA-256 of a source file's bytes; the per-set identity used for
/// re-ingest detection.
pub fn fingerprint_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

/// One entity set to write, paired with the fingerprint of the source file
/// it came from.
#[derive(Debug, Clone)]
pub struct IngestSet<T> {
    pub rows: Vec<T>,
    pub fingerprint: String,
}

/// Everything one clean batch wants persisted. Absent sets are left
/// untouched; present sets fully replace their stored counterpart.
#[derive(Debug, Clone, Default)]
pub struct IngestPayload {
    pub employees: Option<IngestSet<EmployeeRecord>>,
    pub projects: Option<IngestSet<ProjectRecord>>,
    pub timecards: Option<IngestSet<TimeCardRecord>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestOutcome {
    pub employees_written: u32,
    pub projects_written: u32,
    pub timecards_written: u32,
    /// True when every provided set matched its stored fingerprint and
    /// nothing was mutated (idempotent re-ingest).
    pub unchanged: bool,
}

/// Current-state store for the ingested entity sets. All writes go through
/// `ingest`, which stages and checks every candidate set before swapping
/// anything in, so a failure never leaves a partial write behind.
#[derive(Debug, Clone, Default)]
pub struct DatasetStore {
    employees: BTreeMap<EmployeeId, EmployeeRecord>,
    projects: BTreeMap<ProjectName, ProjectRecord>,
    timecards: Vec<TimeCardRecord>,
    employee_fingerprint: Option<String>,
    project_fingerprint: Option<String>,
    timecard_fingerprint: Option<String>,
}

impl DatasetStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn employees(&self) -> &BTreeMap<EmployeeId, EmployeeRecord> {
        &self.employees
    }

    pub fn projects(&self) -> &BTreeMap<ProjectName, ProjectRecord> {
        &self.projects
    }

    pub fn timecards(&self) -> &[TimeCardRecord] {
        &self.timecards
    }

    pub fn employee_ids(&self) -> BTreeSet<EmployeeId> {
        self.employees.keys().cloned().collect()
    }

    pub fn project_names(&self) -> BTreeSet<ProjectName> {
        self.projects.keys().cloned().collect()
    }

    pub fn ingest(&mut self, payload: IngestPayload) -> Result<IngestOutcome, StorageError> {
        // Stage phase: build and check every candidate set before touching
        // stored state.
        let staged_employees = match &payload.employees {
            Some(set) => Some(stage_employees(&set.rows)?),
            None => None,
        };
        let staged_projects = match &payload.projects {
            Some(set) => Some(stage_projects(&set.rows)?),
            None => None,
        };
        let staged_timecards = match &payload.timecards {
            Some(set) => {
                let employees_effective: &BTreeMap<EmployeeId, EmployeeRecord> =
                    staged_employees.as_ref().unwrap_or(&self.employees);
                let projects_effective: &BTreeMap<ProjectName, ProjectRecord> =
                    staged_projects.as_ref().unwrap_or(&self.projects);
                Some(stage_timecards(
                    &set.rows,
                    employees_effective,
                    projects_effective,
                )?)
            }
            None => None,
        };

        let unchanged = payload
            .employees
            .as_ref()
            .map_or(true, |set| {
                self.employee_fingerprint.as_deref() == Some(set.fingerprint.as_str())
            })
            && payload.projects.as_ref().map_or(true, |set| {
                self.project_fingerprint.as_deref() == Some(set.fingerprint.as_str())
            })
            && payload.timecards.as_ref().map_or(true, |set| {
                self.timecard_fingerprint.as_deref() == Some(set.fingerprint.as_str())
            });
        if unchanged {
            return Ok(IngestOutcome {
                employees_written: 0,
                projects_written: 0,
                timecards_written: 0,
                unchanged: true,
            });
        }

        // Commit phase: plain swaps, nothing left to fail.
        let mut outcome = IngestOutcome {
            employees_written: 0,
            projects_written: 0,
            timecards_written: 0,
            unchanged: false,
        };
        if let (Some(staged), Some(set)) = (staged_employees, payload.employees) {
            outcome.employees_written = staged.len() as u32;
            self.employees = staged;
            self.employee_fingerprint = Some(set.fingerprint);
        }
        if let (Some(staged), Some(set)) = (staged_projects, payload.projects) {
            outcome.projects_written = staged.len() as u32;
            self.projects = staged;
            self.project_fingerprint = Some(set.fingerprint);
        }
        if let (Some(staged), Some(set)) = (staged_timecards, payload.timecards) {
            outcome.timecards_written = staged.len() as u32;
            self.timecards = staged;
            self.timecard_fingerprint = Some(set.fingerprint);
        }
        Ok(outcome)
    }
}

fn stage_employees(
    rows: &[EmployeeRecord],
) -> Result<BTreeMap<EmployeeId, EmployeeRecord>, StorageError> {
    let mut staged = BTreeMap::new();
    for record in rows {
        record.validate()?;
        if staged
            .insert(record.employee_id.clone(), record.clone())
            .is_some()
        {
            return Err(StorageError::DuplicateKey {
                table: "employees",
                key: record.employee_id.as_str().to_string(),
            });
        }
    }
    Ok(staged)
}

fn stage_projects(
    rows: &[ProjectRecord],
) -> Result<BTreeMap<ProjectName, ProjectRecord>, StorageError> {
    let mut staged = BTreeMap::new();
    for record in rows {
        record.validate()?;
        if staged
            .insert(record.project_name.clone(), record.clone())
            .is_some()
        {
            return Err(StorageError::DuplicateKey {
                table: "projects",
                key: record.project_name.as_str().to_string(),
            });
        }
    }
    Ok(staged)
}

fn stage_timecards(
    rows: &[TimeCardRecord],
    employees: &BTreeMap<EmployeeId, EmployeeRecord>,
    projects: &BTreeMap<ProjectName, ProjectRecord>,
) -> Result<Vec<TimeCardRecord>, StorageError> {
    let mut staged = Vec::with_capacity(rows.len());
    for record in rows {
        record.validate()?;
        if !employees.contains_key(&record.employee_id) {
            return Err(StorageError::ForeignKeyViolation {
                table: "timecards",
                key: record.employee_id.as_str().to_string(),
            });
        }
        if !projects.contains_key(&record.project_name) {
            return Err(StorageError::ForeignKeyViolation {
                table: "timecards",
                key: record.project_name.as_str().to_string(),
            });
        }
        staged.push(record.clone());
    }
    Ok(staged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use margin_contracts::records::EncryptedCtc;
    use rust_decimal::Decimal;

    fn employee(raw_id: &str) -> EmployeeRecord {
        EmployeeRecord::v1(
            EmployeeId::v1(raw_id.to_string()).unwrap(),
            "Ada".to_string(),
            EncryptedCtc::v1("bm9uY2U=".to_string(), "Y2lwaGVy".to_string()).unwrap(),
            Some(Decimal::new(50, 0)),
        )
        .unwrap()
    }

    fn project(raw_name: &str) -> ProjectRecord {
        ProjectRecord::v1(
            None,
            ProjectName::v1(raw_name.to_string()).unwrap(),
            Decimal::new(1000, 0),
        )
        .unwrap()
    }

    fn timecard(raw_id: &str, raw_project: &str) -> TimeCardRecord {
        TimeCardRecord::v1(
            EmployeeId::v1(raw_id.to_string()).unwrap(),
            "Ada".to_string(),
            NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            Decimal::new(8, 0),
            ProjectName::v1(raw_project.to_string()).unwrap(),
            None,
            None,
        )
        .unwrap()
    }

    fn set<T>(rows: Vec<T>, fingerprint: &str) -> Option<IngestSet<T>> {
        Some(IngestSet {
            rows,
            fingerprint: fingerprint.to_string(),
        })
    }

    #[test]
    fn at_store_01_clean_ingest_populates_all_sets() {
        let mut store = DatasetStore::new();
        let outcome = store
            .ingest(IngestPayload {
                employees: set(vec![employee("E001")], "fp-e1"),
                projects: set(vec![project("APOLLO")], "fp-p1"),
                timecards: set(vec![timecard("E001", "APOLLO")], "fp-t1"),
            })
            .unwrap();
        assert!(!outcome.unchanged);
        assert_eq!(outcome.employees_written, 1);
        assert_eq!(outcome.projects_written, 1);
        assert_eq!(outcome.timecards_written, 1);
        assert_eq!(store.employees().len(), 1);
        assert_eq!(store.timecards().len(), 1);
    }

    #[test]
    fn at_store_02_duplicate_key_rejected_without_mutation() {
        let mut store = DatasetStore::new();
        let err = store
            .ingest(IngestPayload {
                employees: set(vec![employee("E001"), employee("E001")], "fp-e1"),
                projects: None,
                timecards: None,
            })
            .expect_err("duplicate employee ids must be rejected");
        assert!(matches!(err, StorageError::DuplicateKey { .. }));
        assert!(store.employees().is_empty());
    }

    #[test]
    fn at_store_03_fk_failure_rolls_back_the_whole_ingest() {
        let mut store = DatasetStore::new();
        let err = store
            .ingest(IngestPayload {
                employees: set(vec![employee("E001")], "fp-e1"),
                projects: set(vec![project("APOLLO")], "fp-p1"),
                timecards: set(vec![timecard("E002", "APOLLO")], "fp-t1"),
            })
            .expect_err("unknown employee reference must be rejected");
        assert!(matches!(err, StorageError::ForeignKeyViolation { .. }));
        // Nothing from the failed call is visible, employees included.
        assert!(store.employees().is_empty());
        assert!(store.projects().is_empty());
        assert!(store.timecards().is_empty());
    }

    #[test]
    fn at_store_04_matching_fingerprints_make_reingest_a_no_op() {
        let mut store = DatasetStore::new();
        store
            .ingest(IngestPayload {
                employees: set(vec![employee("E001")], "fp-e1"),
                projects: set(vec![project("APOLLO")], "fp-p1"),
                timecards: set(vec![timecard("E001", "APOLLO")], "fp-t1"),
            })
            .unwrap();
        let before = store.clone();

        // Same fingerprints, different candidate rows: the store must treat
        // the call as the same batch and change nothing.
        let outcome = store
            .ingest(IngestPayload {
                employees: set(vec![employee("E001"), employee("E002")], "fp-e1"),
                projects: set(vec![project("APOLLO")], "fp-p1"),
                timecards: set(vec![timecard("E001", "APOLLO")], "fp-t1"),
            })
            .unwrap();
        assert!(outcome.unchanged);
        assert_eq!(store.employees().len(), before.employees().len());
    }

    #[test]
    fn at_store_05_present_sets_replace_absent_sets_survive() {
        let mut store = DatasetStore::new();
        store
            .ingest(IngestPayload {
                employees: set(vec![employee("E001")], "fp-e1"),
                projects: set(vec![project("APOLLO")], "fp-p1"),
                timecards: set(vec![timecard("E001", "APOLLO")], "fp-t1"),
            })
            .unwrap();

        store
            .ingest(IngestPayload {
                employees: None,
                projects: set(vec![project("GEMINI"), project("APOLLO")], "fp-p2"),
                timecards: None,
            })
            .unwrap();
        assert_eq!(store.projects().len(), 2);
        assert_eq!(store.employees().len(), 1);
        assert_eq!(store.timecards().len(), 1);
    }

    #[test]
    fn at_store_06_fingerprint_bytes_is_stable_hex() {
        let a = fingerprint_bytes(b"EMPLOYEE_ID,CTC\nE001,96000\n");
        let b = fingerprint_bytes(b"EMPLOYEE_ID,CTC\nE001,96000\n");
        let c = fingerprint_bytes(b"EMPLOYEE_ID,CTC\nE001,96001\n");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|ch| ch.is_ascii_hexdigit()));
    }
}
