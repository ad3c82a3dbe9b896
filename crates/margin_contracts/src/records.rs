#![forbid(unsafe_code)]

use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::common::{
    validate_non_negative, validate_opt_text, validate_text, ContractViolation, Validate,
};

pub const MAX_EMPLOYEE_ID_LEN: usize = 10;
pub const MAX_EMPLOYEE_NAME_LEN: usize = 120;
pub const MAX_PROJECT_NAME_LEN: usize = 200;
pub const MAX_STATE_LEN: usize = 64;
pub const MAX_TASK_TYPE_LEN: usize = 64;

/// Inclusive bounds on a single timecard entry.
pub fn hours_worked_min() -> Decimal {
    Decimal::new(1, 1) // 0.1
}

pub fn hours_worked_max() -> Decimal {
    Decimal::new(9999, 1) // 999.9
}

/// Normalized employee key: upper-case A-Z / 0-9, at most 10 chars.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EmployeeId(String);

impl EmployeeId {
    pub fn v1(value: String) -> Result<Self, ContractViolation> {
        if value.is_empty() || value.len() > MAX_EMPLOYEE_ID_LEN {
            return Err(ContractViolation::InvalidValue {
                field: "employee_id",
                reason: "must be 1..=10 characters",
            });
        }
        if !value
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
        {
            return Err(ContractViolation::InvalidValue {
                field: "employee_id",
                reason: "must be upper-case letters and digits",
            });
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Normalized project key: trimmed, upper-cased, at most 200 chars.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProjectName(String);

impl ProjectName {
    pub fn v1(value: String) -> Result<Self, ContractViolation> {
        validate_text("project_name", &value, MAX_PROJECT_NAME_LEN)?;
        if value != value.trim() || value.chars().any(|c| c.is_ascii_lowercase()) {
            return Err(ContractViolation::InvalidValue {
                field: "project_name",
                reason: "must be trimmed and upper-cased",
            });
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Encrypted compensation value as stored at rest: random nonce plus
/// AES-256-GCM ciphertext, both base64. The plaintext never leaves the
/// vault boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedCtc {
    pub nonce_b64: String,
    pub ciphertext_b64: String,
}

impl EncryptedCtc {
    pub fn v1(nonce_b64: String, ciphertext_b64: String) -> Result<Self, ContractViolation> {
        for (field, value) in [
            ("encrypted_ctc.nonce_b64", &nonce_b64),
            ("encrypted_ctc.ciphertext_b64", &ciphertext_b64),
        ] {
            if value.is_empty() || !value.is_ascii() {
                return Err(ContractViolation::InvalidValue {
                    field,
                    reason: "must be non-empty base64 text",
                });
            }
        }
        Ok(Self {
            nonce_b64,
            ciphertext_b64,
        })
    }
}

impl Validate for EncryptedCtc {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.nonce_b64.is_empty() || self.ciphertext_b64.is_empty() {
            return Err(ContractViolation::InvalidValue {
                field: "encrypted_ctc",
                reason: "must be non-empty",
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmployeeRecord {
    pub employee_id: EmployeeId,
    pub employee_name: String,
    pub ctc: EncryptedCtc,
    pub ctc_per_hour: Option<Decimal>,
}

impl EmployeeRecord {
    pub fn v1(
        employee_id: EmployeeId,
        employee_name: String,
        ctc: EncryptedCtc,
        ctc_per_hour: Option<Decimal>,
    ) -> Result<Self, ContractViolation> {
        validate_text("employee_name", &employee_name, MAX_EMPLOYEE_NAME_LEN)?;
        if let Some(rate) = ctc_per_hour {
            validate_non_negative("ctc_per_hour", rate)?;
        }
        ctc.validate()?;
        Ok(Self {
            employee_id,
            employee_name,
            ctc,
            ctc_per_hour,
        })
    }
}

impl Validate for EmployeeRecord {
    fn validate(&self) -> Result<(), ContractViolation> {
        validate_text("employee_name", &self.employee_name, MAX_EMPLOYEE_NAME_LEN)?;
        if let Some(rate) = self.ctc_per_hour {
            validate_non_negative("ctc_per_hour", rate)?;
        }
        self.ctc.validate()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectRecord {
    pub project_id: Option<u64>,
    pub project_name: ProjectName,
    pub sow: Decimal,
}

impl ProjectRecord {
    pub fn v1(
        project_id: Option<u64>,
        project_name: ProjectName,
        sow: Decimal,
    ) -> Result<Self, ContractViolation> {
        validate_non_negative("sow", sow)?;
        Ok(Self {
            project_id,
            project_name,
            sow,
        })
    }
}

impl Validate for ProjectRecord {
    fn validate(&self) -> Result<(), ContractViolation> {
        validate_non_negative("sow", self.sow)
    }
}

/// Weak references by natural key: a timecard names its employee and
/// project but owns neither.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeCardRecord {
    pub employee_id: EmployeeId,
    pub employee_name: String,
    pub date: NaiveDate,
    pub hours_worked: Decimal,
    pub project_name: ProjectName,
    pub state: Option<String>,
    pub task_type: Option<String>,
}

impl TimeCardRecord {
    #[allow(clippy::too_many_arguments)]
    pub fn v1(
        employee_id: EmployeeId,
        employee_name: String,
        date: NaiveDate,
        hours_worked: Decimal,
        project_name: ProjectName,
        state: Option<String>,
        task_type: Option<String>,
    ) -> Result<Self, ContractViolation> {
        validate_text("employee_name", &employee_name, MAX_EMPLOYEE_NAME_LEN)?;
        validate_opt_text("state", &state, MAX_STATE_LEN)?;
        validate_opt_text("task_type", &task_type, MAX_TASK_TYPE_LEN)?;
        if hours_worked < hours_worked_min() || hours_worked > hours_worked_max() {
            return Err(ContractViolation::OutOfRange {
                field: "hours_worked",
                min: hours_worked_min(),
                max: hours_worked_max(),
                got: hours_worked,
            });
        }
        Ok(Self {
            employee_id,
            employee_name,
            date,
            hours_worked,
            project_name,
            state,
            task_type,
        })
    }
}

impl Validate for TimeCardRecord {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.hours_worked < hours_worked_min() || self.hours_worked > hours_worked_max() {
            return Err(ContractViolation::OutOfRange {
                field: "hours_worked",
                min: hours_worked_min(),
                max: hours_worked_max(),
                got: self.hours_worked,
            });
        }
        validate_text("employee_name", &self.employee_name, MAX_EMPLOYEE_NAME_LEN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn at_records_01_employee_id_enforces_shape() {
        assert!(EmployeeId::v1("E001".to_string()).is_ok());
        assert!(EmployeeId::v1("e001".to_string()).is_err());
        assert!(EmployeeId::v1(String::new()).is_err());
        assert!(EmployeeId::v1("E0000000001".to_string()).is_err());
        assert!(EmployeeId::v1("E 01".to_string()).is_err());
    }

    #[test]
    fn at_records_02_project_name_requires_normalized_form() {
        assert!(ProjectName::v1("APOLLO".to_string()).is_ok());
        assert!(ProjectName::v1("Apollo".to_string()).is_err());
        assert!(ProjectName::v1(" APOLLO".to_string()).is_err());
    }

    #[test]
    fn at_records_03_timecard_hours_bounds_are_inclusive() {
        let id = EmployeeId::v1("E1".to_string()).unwrap();
        let project = ProjectName::v1("APOLLO".to_string()).unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        let build = |hours: Decimal| {
            TimeCardRecord::v1(
                id.clone(),
                "Ada".to_string(),
                date,
                hours,
                project.clone(),
                None,
                None,
            )
        };
        assert!(build(hours_worked_min()).is_ok());
        assert!(build(hours_worked_max()).is_ok());
        assert!(build(Decimal::ZERO).is_err());
        assert!(build(Decimal::new(10000, 1)).is_err());
    }

    #[test]
    fn at_records_04_negative_sow_rejected() {
        let name = ProjectName::v1("APOLLO".to_string()).unwrap();
        assert!(ProjectRecord::v1(None, name, Decimal::new(-1, 0)).is_err());
    }
}
