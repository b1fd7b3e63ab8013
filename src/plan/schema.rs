//! Rollout plan schema
//!
//! A plan is a TOML file naming the target network, the operator, the
//! participants by role, and the token allocations to provision.

use crate::error::{RolloutError, RolloutResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A checksummed-format EVM address, stored normalized to lowercase
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

impl Address {
    /// Parse and normalize an address string
    pub fn parse(s: &str) -> RolloutResult<Self> {
        let hex_part = s
            .strip_prefix("0x")
            .ok_or_else(|| RolloutError::AddressInvalid(s.to_string()))?;

        if hex_part.len() != 40 || !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(RolloutError::AddressInvalid(s.to_string()));
        }

        Ok(Self(format!("0x{}", hex_part.to_ascii_lowercase())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for Address {
    type Error = RolloutError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<Address> for String {
    fn from(a: Address) -> Self {
        a.0
    }
}

/// Allocation kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AllocationKind {
    /// Tokens go straight to the beneficiary
    Direct,
    /// Tokens are held by a vesting wallet and released over time
    Scheduled,
}

impl fmt::Display for AllocationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct => write!(f, "direct"),
            Self::Scheduled => write!(f, "scheduled"),
        }
    }
}

/// Root plan structure as written in the TOML file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Plan {
    /// Network identifier; scopes the deploy cache
    pub network: String,

    /// Operator address submitting every transaction
    pub operator: String,

    /// Participants by role
    pub participants: Participants,

    /// Token allocations to provision
    #[serde(default)]
    pub allocations: Vec<AllocationSpec>,
}

/// Participant addresses, grouped by the role they receive
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Participants {
    pub administrators: Vec<String>,
    pub issuers: Vec<String>,
    pub validators: Vec<String>,
}

/// One allocation as written in the plan file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AllocationSpec {
    pub beneficiary: String,

    pub kind: AllocationKind,

    /// Token amount as a decimal string (u128 range)
    pub amount: String,

    /// Vesting start (scheduled only)
    pub start: Option<DateTime<Utc>>,

    /// Days from start until any tokens release (scheduled only)
    pub cliff_days: Option<u32>,

    /// Total vesting duration in days (scheduled only)
    pub duration_days: Option<u32>,

    /// Address allowed to revoke the schedule (scheduled only)
    pub controller: Option<String>,
}
