#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use rust_decimal::Decimal;

use margin_contracts::margin::{MarginComputation, MarginRow, MarginSummary};
use margin_contracts::records::{
    EmployeeId, EmployeeRecord, ProjectName, ProjectRecord, TimeCardRecord,
};
use margin_contracts::ContractViolation;

use crate::ctc_vault::{CtcVault, VaultError};

#[derive(Debug)]
pub enum MarginComputeError {
    Compensation {
        employee_id: String,
        source: VaultError,
    },
    Contract(ContractViolation),
    Overflow,
}

impl std::fmt::Display for MarginComputeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Compensation {
                employee_id,
                source,
            } => write!(f, "compensation for {employee_id} unavailable: {source}"),
            Self::Contract(violation) => write!(f, "margin contract violation: {violation}"),
            Self::Overflow => write!(f, "margin arithmetic overflowed"),
        }
    }
}

impl std::error::Error for MarginComputeError {}

impl From<ContractViolation> for MarginComputeError {
    fn from(value: ContractViolation) -> Self {
        Self::Contract(value)
    }
}

/// Narrow capability: the margin engine asks for one employee's hourly
/// rate and never sees the encrypted form or the vault itself.
pub trait CompensationResolver {
    fn hourly_rate(&self, employee: &EmployeeRecord) -> Result<Decimal, MarginComputeError>;
}

/// Vault-backed resolver. `CTCPHR` wins when present; otherwise the annual
/// CTC is decrypted and divided by the configured standard annual hours.
#[derive(Debug, Clone)]
pub struct VaultCompensationResolver {
    vault: CtcVault,
    standard_annual_hours: Decimal,
}

impl VaultCompensationResolver {
    pub fn new(vault: CtcVault, standard_annual_hours: Decimal) -> Self {
        Self {
            vault,
            standard_annual_hours,
        }
    }
}

impl CompensationResolver for VaultCompensationResolver {
    fn hourly_rate(&self, employee: &EmployeeRecord) -> Result<Decimal, MarginComputeError> {
        if let Some(rate) = employee.ctc_per_hour {
            return Ok(rate);
        }
        let annual = self.vault.decrypt_ctc(&employee.ctc).map_err(|source| {
            MarginComputeError::Compensation {
                employee_id: employee.employee_id.as_str().to_string(),
                source,
            }
        })?;
        annual
            .checked_div(self.standard_annual_hours)
            .ok_or(MarginComputeError::Overflow)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarginEngineConfig {
    pub standard_annual_hours: Decimal,
}

impl MarginEngineConfig {
    pub fn mvp_v1() -> Self {
        Self {
            // Matches the source system's hourly derivation (CTC / 1920).
            standard_annual_hours: Decimal::new(1920, 0),
        }
    }
}

/// Read-only derivation over the persisted sets. Percentages keep full
/// decimal precision here; rounding to two places happens only at the
/// presentation edge.
#[derive(Debug, Clone)]
pub struct MarginEngineRuntime {
    config: MarginEngineConfig,
}

impl MarginEngineRuntime {
    pub fn new(config: MarginEngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> MarginEngineConfig {
        self.config
    }

    pub fn compute(
        &self,
        projects: &BTreeMap<ProjectName, ProjectRecord>,
        employees: &BTreeMap<EmployeeId, EmployeeRecord>,
        timecards: &[TimeCardRecord],
        resolver: &dyn CompensationResolver,
    ) -> Result<MarginComputation, MarginComputeError> {
        let mut hours_by_project: BTreeMap<&ProjectName, Decimal> = BTreeMap::new();
        let mut cost_by_project: BTreeMap<&ProjectName, Decimal> = BTreeMap::new();
        let mut orphaned_timecards = 0u32;

        for timecard in timecards {
            let employee = employees.get(&timecard.employee_id);
            let project_known = projects.contains_key(&timecard.project_name);
            let Some(employee) = employee else {
                orphaned_timecards += 1;
                continue;
            };
            if !project_known {
                orphaned_timecards += 1;
                continue;
            }
            let rate = resolver.hourly_rate(employee)?;
            let cost = timecard
                .hours_worked
                .checked_mul(rate)
                .ok_or(MarginComputeError::Overflow)?;
            let hours_entry = hours_by_project
                .entry(&timecard.project_name)
                .or_insert(Decimal::ZERO);
            *hours_entry = hours_entry
                .checked_add(timecard.hours_worked)
                .ok_or(MarginComputeError::Overflow)?;
            let cost_entry = cost_by_project
                .entry(&timecard.project_name)
                .or_insert(Decimal::ZERO);
            *cost_entry = cost_entry
                .checked_add(cost)
                .ok_or(MarginComputeError::Overflow)?;
        }

        let mut rows = Vec::with_capacity(projects.len());
        let mut total_hours = Decimal::ZERO;
        let mut total_budget = Decimal::ZERO;
        let mut defined_margin_sum = Decimal::ZERO;
        let mut defined_margin_count = 0u32;

        // Every project appears, including those with no timecards.
        for (name, project) in projects {
            let hours = hours_by_project
                .get(name)
                .copied()
                .unwrap_or(Decimal::ZERO);
            let cost = cost_by_project.get(name).copied().unwrap_or(Decimal::ZERO);
            let budget = project.sow;

            let (percentage, defined) = if budget.is_zero() {
                (Decimal::ZERO, false)
            } else {
                let margin = budget
                    .checked_sub(cost)
                    .ok_or(MarginComputeError::Overflow)?
                    .checked_div(budget)
                    .ok_or(MarginComputeError::Overflow)?
                    .checked_mul(Decimal::ONE_HUNDRED)
                    .ok_or(MarginComputeError::Overflow)?;
                (margin, true)
            };
            if defined {
                defined_margin_sum = defined_margin_sum
                    .checked_add(percentage)
                    .ok_or(MarginComputeError::Overflow)?;
                defined_margin_count += 1;
            }
            total_hours = total_hours
                .checked_add(hours)
                .ok_or(MarginComputeError::Overflow)?;
            total_budget = total_budget
                .checked_add(budget)
                .ok_or(MarginComputeError::Overflow)?;
            rows.push(MarginRow::v1(
                name.clone(),
                hours,
                budget,
                percentage,
                defined,
            )?);
        }

        let average_margin_percentage = if defined_margin_count > 0 {
            defined_margin_sum
                .checked_div(Decimal::from(defined_margin_count))
                .ok_or(MarginComputeError::Overflow)?
        } else {
            Decimal::ZERO
        };

        let summary = MarginSummary::v1(
            rows.len() as u32,
            total_hours,
            total_budget,
            average_margin_percentage,
        )?;
        Ok(MarginComputation {
            rows,
            summary,
            orphaned_timecards,
        })
    }
}
