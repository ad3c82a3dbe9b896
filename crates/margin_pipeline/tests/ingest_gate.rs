#![forbid(unsafe_code)]

// The one invariant that matters most: no batch with any invalid row is
// ever persisted, whatever made it dirty.

use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use margin_contracts::upload::FileType;
use margin_engines::ctc_vault::CtcVault;
use margin_engines::validator::{SchemaValidatorConfig, SchemaValidatorRuntime};
use margin_pipeline::{BatchError, BatchState, IngestBatch, ReferenceCatalog};
use margin_storage::DatasetStore;

fn validator() -> SchemaValidatorRuntime {
    SchemaValidatorRuntime::new(SchemaValidatorConfig::mvp_v1())
}

fn temp_vault(name: &str) -> (PathBuf, CtcVault) {
    let suffix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(1);
    let base = std::env::temp_dir().join(format!("margin-gate-test-{name}-{suffix}"));
    let vault = CtcVault::for_key_path(base.join("ctc_master.key"));
    (base, vault)
}

struct DirtyCase {
    name: &'static str,
    file_type: FileType,
    bytes: &'static [u8],
}

const DIRTY_CASES: &[DirtyCase] = &[
    DirtyCase {
        name: "hours out of range",
        file_type: FileType::Timecard,
        bytes: b"EMPLOYEE_ID,EMPLOYEE_NAME,DAILY_DATE,TIME_WORKED,PROJECT_NAME\nE001,Ada,2024-01-15,1000,APOLLO\n",
    },
    DirtyCase {
        name: "missing required column",
        file_type: FileType::Employee,
        bytes: b"EMPLOYEE_ID,EMPLOYEE_NAME\nE001,Ada\n",
    },
    DirtyCase {
        name: "negative budget",
        file_type: FileType::Project,
        bytes: b"PROJECT_NAME,SOW\nAPOLLO,-10\n",
    },
    DirtyCase {
        name: "ragged trailing row",
        file_type: FileType::Employee,
        bytes: b"EMPLOYEE_ID,EMPLOYEE_NAME,CTC\nE001,Ada,96000\nE002,Grace",
    },
    DirtyCase {
        name: "timecard against unknown references",
        file_type: FileType::Timecard,
        bytes: b"EMPLOYEE_ID,EMPLOYEE_NAME,DAILY_DATE,TIME_WORKED,PROJECT_NAME\nE001,Ada,2024-01-15,8,APOLLO\n",
    },
];

#[test]
fn dirty_batches_never_reach_storage() {
    let (base, vault) = temp_vault("dirty");
    for case in DIRTY_CASES {
        let mut store = DatasetStore::new();
        let mut batch = IngestBatch::new();
        batch
            .attach(case.file_type, "upload.csv".to_string(), case.bytes.to_vec())
            .unwrap();
        let report = batch
            .validate(&validator(), &ReferenceCatalog::empty())
            .unwrap();

        assert!(report.has_errors, "case should be dirty: {}", case.name);
        assert!(
            !report.uploads[0].issues.is_empty(),
            "case should carry issues: {}",
            case.name
        );

        let err = batch
            .ingest(&vault, &mut store)
            .expect_err("dirty batch must be refused");
        assert!(
            matches!(err, BatchError::Precondition(_)),
            "case should refuse with a precondition error: {}",
            case.name
        );
        assert_eq!(batch.state(), BatchState::Validated { clean: false });
        assert!(store.employees().is_empty(), "case: {}", case.name);
        assert!(store.projects().is_empty(), "case: {}", case.name);
        assert!(store.timecards().is_empty(), "case: {}", case.name);
    }
    std::fs::remove_dir_all(base).ok();
}

#[test]
fn totals_always_reconcile_across_uploads() {
    let mut batch = IngestBatch::new();
    batch
        .attach(
            FileType::Timecard,
            "timecard.csv".to_string(),
            b"EMPLOYEE_ID,EMPLOYEE_NAME,DAILY_DATE,TIME_WORKED,PROJECT_NAME\nE001,Ada,2024-01-15,8,APOLLO\nE002,Grace,2024-01-15,1000,APOLLO\n"
                .to_vec(),
        )
        .unwrap();
    batch
        .attach(
            FileType::Employee,
            "employee.csv".to_string(),
            b"EMPLOYEE_ID,EMPLOYEE_NAME,CTC\nE001,Ada,96000\nE002,Grace,84000\n".to_vec(),
        )
        .unwrap();
    batch
        .attach(
            FileType::Project,
            "project.csv".to_string(),
            b"PROJECT_NAME,SOW\nAPOLLO,1000\n".to_vec(),
        )
        .unwrap();
    let report = batch
        .validate(&validator(), &ReferenceCatalog::empty())
        .unwrap();

    let summed_rows: u32 = report.uploads.iter().map(|u| u.total_rows).sum();
    assert_eq!(
        report.total_valid_rows + report.total_invalid_rows,
        summed_rows
    );
    assert_eq!(report.has_errors, report.total_invalid_rows > 0);
}
