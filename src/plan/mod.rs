//! Plan loading and validation
//!
//! Validation is a pure pass: [`Plan::resolve`] either produces a fully
//! typed [`ResolvedPlan`] or fails before any remote call is attempted.
//! The input plan is never mutated or enriched in place.

pub mod schema;

pub use schema::{Address, AllocationKind, AllocationSpec, Participants, Plan};

use crate::error::{RolloutError, RolloutResult};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::Path;
use tokio::fs;

/// Role name granted to administrators
pub const ROLE_ADMIN: &str = "admin";
/// Role name granted to issuers
pub const ROLE_ISSUER: &str = "issuer";
/// Role name granted to validators
pub const ROLE_VALIDATOR: &str = "validator";

const SECS_PER_DAY: u64 = 86_400;

/// A validated, fully typed plan
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedPlan {
    pub network: String,
    pub operator: Address,
    pub administrators: Vec<Address>,
    pub issuers: Vec<Address>,
    pub validators: Vec<Address>,
    pub allocations: Vec<Allocation>,
}

/// A validated allocation
#[derive(Debug, Clone, Serialize)]
pub struct Allocation {
    pub beneficiary: Address,
    pub kind: AllocationKind,
    pub amount: u128,
    pub schedule: Option<Schedule>,
}

/// A validated vesting schedule
#[derive(Debug, Clone, Serialize)]
pub struct Schedule {
    pub start: DateTime<Utc>,
    pub cliff_seconds: u64,
    pub duration_seconds: u64,
    pub controller: Address,
}

impl Plan {
    /// Load a plan from a TOML file
    pub async fn load(path: &Path) -> RolloutResult<Self> {
        if !path.exists() {
            return Err(RolloutError::PlanNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)
            .await
            .map_err(|e| RolloutError::io(format!("reading plan from {}", path.display()), e))?;

        toml::from_str(&content).map_err(|e| RolloutError::PlanInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Validate the plan, producing a typed copy. The input is untouched.
    pub fn resolve(&self) -> RolloutResult<ResolvedPlan> {
        let operator = Address::parse(&self.operator)?;
        let administrators = parse_addresses(&self.participants.administrators)?;
        let issuers = parse_addresses(&self.participants.issuers)?;
        let validators = parse_addresses(&self.participants.validators)?;

        let mut seen: HashSet<(AllocationKind, Address)> = HashSet::new();
        let mut allocations = Vec::with_capacity(self.allocations.len());
        for spec in &self.allocations {
            let allocation = resolve_allocation(spec)?;
            if !seen.insert((allocation.kind, allocation.beneficiary.clone())) {
                return Err(RolloutError::AllocationDuplicate {
                    beneficiary: allocation.beneficiary.to_string(),
                    kind: allocation.kind.to_string(),
                });
            }
            allocations.push(allocation);
        }

        Ok(ResolvedPlan {
            network: self.network.clone(),
            operator,
            administrators,
            issuers,
            validators,
            allocations,
        })
    }
}

impl ResolvedPlan {
    /// All (role, member) pairs to grant, in plan order
    pub fn role_grants(&self) -> Vec<(&'static str, &Address)> {
        let mut grants = Vec::new();
        grants.extend(self.administrators.iter().map(|a| (ROLE_ADMIN, a)));
        grants.extend(self.issuers.iter().map(|a| (ROLE_ISSUER, a)));
        grants.extend(self.validators.iter().map(|a| (ROLE_VALIDATOR, a)));
        grants
    }

    /// Hex sha256 digest of the plan contents, pinned into the cache so a
    /// resumed run against an edited plan is rejected.
    pub fn digest(&self) -> RolloutResult<String> {
        let canonical = serde_json::to_vec(self)?;
        Ok(hex::encode(Sha256::digest(&canonical)))
    }
}

fn parse_addresses(raw: &[String]) -> RolloutResult<Vec<Address>> {
    raw.iter().map(|s| Address::parse(s)).collect()
}

fn resolve_allocation(spec: &AllocationSpec) -> RolloutResult<Allocation> {
    let beneficiary = Address::parse(&spec.beneficiary)?;

    let amount: u128 = spec.amount.trim().parse().map_err(|_| {
        invalid_allocation(&beneficiary, format!("amount '{}' is not a decimal integer", spec.amount))
    })?;
    if amount == 0 {
        return Err(invalid_allocation(&beneficiary, "amount must be non-zero"));
    }

    let schedule = match spec.kind {
        AllocationKind::Direct => {
            if spec.start.is_some()
                || spec.cliff_days.is_some()
                || spec.duration_days.is_some()
                || spec.controller.is_some()
            {
                return Err(invalid_allocation(
                    &beneficiary,
                    "direct allocations must not carry schedule fields",
                ));
            }
            None
        }
        AllocationKind::Scheduled => {
            let start = spec
                .start
                .ok_or_else(|| invalid_allocation(&beneficiary, "scheduled allocation missing 'start'"))?;
            let duration_days = spec.duration_days.ok_or_else(|| {
                invalid_allocation(&beneficiary, "scheduled allocation missing 'duration_days'")
            })?;
            if duration_days == 0 {
                return Err(invalid_allocation(&beneficiary, "duration_days must be non-zero"));
            }
            let cliff_days = spec.cliff_days.unwrap_or(0);
            if cliff_days > duration_days {
                return Err(invalid_allocation(
                    &beneficiary,
                    format!("cliff_days ({cliff_days}) exceeds duration_days ({duration_days})"),
                ));
            }
            let controller = spec.controller.as_deref().ok_or_else(|| {
                invalid_allocation(&beneficiary, "scheduled allocation missing 'controller'")
            })?;

            Some(Schedule {
                start,
                cliff_seconds: u64::from(cliff_days) * SECS_PER_DAY,
                duration_seconds: u64::from(duration_days) * SECS_PER_DAY,
                controller: Address::parse(controller)?,
            })
        }
    };

    Ok(Allocation {
        beneficiary,
        kind: spec.kind,
        amount,
        schedule,
    })
}

fn invalid_allocation(beneficiary: &Address, reason: impl Into<String>) -> RolloutError {
    RolloutError::AllocationInvalid {
        beneficiary: beneficiary.to_string(),
        reason: reason.into(),
    }
}
