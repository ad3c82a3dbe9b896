#![forbid(unsafe_code)]

use rust_decimal::Decimal;

use crate::common::{validate_non_negative, ContractViolation, Validate};
use crate::records::ProjectName;

/// Derived per-project margin line. Never persisted; always recomputed from
/// the current Employee/Project/TimeCard sets.
///
/// `margin_defined == false` marks the zero-budget sentinel: the percentage
/// is reported as 0 and the row is excluded from the portfolio average.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarginRow {
    pub project_name: ProjectName,
    pub total_hours: Decimal,
    pub budget: Decimal,
    pub gross_margin_percentage: Decimal,
    pub margin_defined: bool,
}

impl MarginRow {
    pub fn v1(
        project_name: ProjectName,
        total_hours: Decimal,
        budget: Decimal,
        gross_margin_percentage: Decimal,
        margin_defined: bool,
    ) -> Result<Self, ContractViolation> {
        let row = Self {
            project_name,
            total_hours,
            budget,
            gross_margin_percentage,
            margin_defined,
        };
        row.validate()?;
        Ok(row)
    }
}

impl Validate for MarginRow {
    fn validate(&self) -> Result<(), ContractViolation> {
        validate_non_negative("margin.total_hours", self.total_hours)?;
        validate_non_negative("margin.budget", self.budget)?;
        if !self.margin_defined && !self.gross_margin_percentage.is_zero() {
            return Err(ContractViolation::InvalidValue {
                field: "margin.gross_margin_percentage",
                reason: "undefined margin must report the 0 sentinel",
            });
        }
        if !self.margin_defined && !self.budget.is_zero() {
            return Err(ContractViolation::InvalidValue {
                field: "margin.margin_defined",
                reason: "margin is undefined only for zero budget",
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarginSummary {
    pub total_projects: u32,
    pub total_hours: Decimal,
    pub total_budget: Decimal,
    pub average_margin_percentage: Decimal,
}

impl MarginSummary {
    pub fn v1(
        total_projects: u32,
        total_hours: Decimal,
        total_budget: Decimal,
        average_margin_percentage: Decimal,
    ) -> Result<Self, ContractViolation> {
        validate_non_negative("summary.total_hours", total_hours)?;
        validate_non_negative("summary.total_budget", total_budget)?;
        Ok(Self {
            total_projects,
            total_hours,
            total_budget,
            average_margin_percentage,
        })
    }
}

/// Full output of one margin computation pass. `orphaned_timecards` counts
/// timecards excluded because their employee or project was missing from
/// the persisted sets (join-integrity flag, never a crash).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarginComputation {
    pub rows: Vec<MarginRow>,
    pub summary: MarginSummary,
    pub orphaned_timecards: u32,
}

impl Validate for MarginComputation {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.summary.total_projects as usize != self.rows.len() {
            return Err(ContractViolation::CountMismatch {
                field: "summary.total_projects",
                expected: self.rows.len() as u64,
                got: u64::from(self.summary.total_projects),
            });
        }
        let mut hours = Decimal::ZERO;
        let mut budget = Decimal::ZERO;
        for row in &self.rows {
            row.validate()?;
            hours += row.total_hours;
            budget += row.budget;
        }
        if hours != self.summary.total_hours {
            return Err(ContractViolation::InvalidValue {
                field: "summary.total_hours",
                reason: "must equal the sum over rows",
            });
        }
        if budget != self.summary.total_budget {
            return Err(ContractViolation::InvalidValue {
                field: "summary.total_budget",
                reason: "must equal the sum over rows",
            });
        }
        Ok(())
    }
}
