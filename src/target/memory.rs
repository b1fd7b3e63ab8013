//! In-memory execution target
//!
//! A deterministic simulation of the remote system: a role-gated token
//! ledger, a vesting-wallet factory, and the wallets it creates. Used by
//! `rollout run --rehearse` and by the test suite. Deployments are
//! counted per artifact so idempotency is observable from tests.

use crate::error::{RolloutError, RolloutResult};
use crate::plan::Address;
use crate::target::{Call, Deployment, ExecutionTarget, Receipt};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

/// Artifact name for the token contract
pub const ARTIFACT_TOKEN: &str = "token";
/// Artifact name for the vesting-wallet factory
pub const ARTIFACT_VESTING_FACTORY: &str = "vesting-factory";
/// Artifact name for the batch relayer
pub const ARTIFACT_RELAYER: &str = "relayer";

#[derive(Debug)]
enum Resource {
    Token {
        balances: HashMap<Address, u128>,
        roles: HashMap<String, HashSet<Address>>,
    },
    VestingFactory {
        token: Address,
        wallets: HashMap<Address, Address>,
    },
    VestingWallet {
        beneficiary: Address,
        start: DateTime<Utc>,
        cliff_seconds: u64,
        duration_seconds: u64,
        controller: Address,
    },
    Relayer,
}

#[derive(Default)]
struct Ledger {
    next_address: u64,
    sequence: u64,
    resources: HashMap<Address, Resource>,
    deploy_counts: HashMap<String, usize>,
}

impl Ledger {
    fn allocate_address(&mut self) -> Address {
        self.next_address += 1;
        Address::parse(&format!("0x{:040x}", self.next_address)).expect("generated address is well-formed")
    }

    fn resource_mut(&mut self, address: &Address) -> RolloutResult<&mut Resource> {
        self.resources
            .get_mut(address)
            .ok_or_else(|| RolloutError::UnknownResource(address.to_string()))
    }

    fn resource(&self, address: &Address) -> RolloutResult<&Resource> {
        self.resources
            .get(address)
            .ok_or_else(|| RolloutError::UnknownResource(address.to_string()))
    }
}

/// Deterministic in-process execution target
#[derive(Default)]
pub struct MemoryTarget {
    ledger: Mutex<Ledger>,
}

impl MemoryTarget {
    pub fn new() -> Self {
        Self::default()
    }

    /// How many times an artifact was deployed (test instrumentation)
    pub fn deploy_count(&self, artifact: &str) -> usize {
        self.ledger
            .lock()
            .unwrap()
            .deploy_counts
            .get(artifact)
            .copied()
            .unwrap_or(0)
    }

    fn apply(ledger: &mut Ledger, call: &Call) -> RolloutResult<()> {
        match call.method.as_str() {
            "grantRole" => {
                let role = arg_str(call, 0)?;
                let account = arg_address(call, 1)?;
                match ledger.resource_mut(&call.target)? {
                    Resource::Token { roles, .. } => {
                        roles.entry(role).or_default().insert(account);
                        Ok(())
                    }
                    _ => Err(rejected(call, "target is not a token")),
                }
            }
            "mint" => {
                let to = arg_address(call, 0)?;
                let amount = arg_amount(call, 1)?;
                match ledger.resource_mut(&call.target)? {
                    Resource::Token { balances, .. } => {
                        let entry = balances.entry(to).or_insert(0);
                        *entry = entry
                            .checked_add(amount)
                            .ok_or_else(|| rejected(call, "balance overflow"))?;
                        Ok(())
                    }
                    _ => Err(rejected(call, "target is not a token")),
                }
            }
            "createWallet" => {
                let beneficiary = arg_address(call, 0)?;
                let start = arg_timestamp(call, 1)?;
                let cliff_seconds = arg_u64(call, 2)?;
                let duration_seconds = arg_u64(call, 3)?;
                let controller = arg_address(call, 4)?;

                let wallet_address = ledger.allocate_address();
                match ledger.resource_mut(&call.target)? {
                    Resource::VestingFactory { wallets, .. } => {
                        if wallets.contains_key(&beneficiary) {
                            return Err(rejected(call, "wallet already exists for beneficiary"));
                        }
                        wallets.insert(beneficiary.clone(), wallet_address.clone());
                    }
                    _ => return Err(rejected(call, "target is not a vesting factory")),
                }
                ledger.resources.insert(
                    wallet_address,
                    Resource::VestingWallet {
                        beneficiary,
                        start,
                        cliff_seconds,
                        duration_seconds,
                        controller,
                    },
                );
                Ok(())
            }
            other => Err(rejected(call, format!("unknown method '{other}'"))),
        }
    }
}

#[async_trait]
impl ExecutionTarget for MemoryTarget {
    async fn deploy(&self, artifact: &str, args: &[Value]) -> RolloutResult<Deployment> {
        let mut ledger = self.ledger.lock().unwrap();

        let resource = match artifact {
            ARTIFACT_TOKEN => Resource::Token {
                balances: HashMap::new(),
                roles: HashMap::new(),
            },
            ARTIFACT_VESTING_FACTORY => {
                let token = args
                    .first()
                    .and_then(Value::as_str)
                    .ok_or_else(|| RolloutError::DeployFailed {
                        artifact: artifact.to_string(),
                        reason: "expected token address argument".to_string(),
                    })
                    .and_then(Address::parse)?;
                Resource::VestingFactory {
                    token,
                    wallets: HashMap::new(),
                }
            }
            ARTIFACT_RELAYER => Resource::Relayer,
            other => {
                return Err(RolloutError::DeployFailed {
                    artifact: other.to_string(),
                    reason: "unknown artifact".to_string(),
                })
            }
        };

        let address = ledger.allocate_address();
        ledger.resources.insert(address.clone(), resource);
        *ledger.deploy_counts.entry(artifact.to_string()).or_insert(0) += 1;

        debug!("Deployed {artifact} at {address}");
        Ok(Deployment { address })
    }

    async fn relay(&self, relayer: &Address, calls: &[Call]) -> RolloutResult<Receipt> {
        let mut ledger = self.ledger.lock().unwrap();

        match ledger.resource(relayer)? {
            Resource::Relayer => {}
            _ => {
                return Err(RolloutError::CallRejected {
                    target: relayer.to_string(),
                    method: "relay".to_string(),
                    reason: "target is not a relayer".to_string(),
                })
            }
        }

        // Calls in a batch take effect in submission order
        for call in calls {
            Self::apply(&mut ledger, call)?;
        }

        ledger.sequence += 1;
        Ok(Receipt {
            id: Uuid::new_v4(),
            sequence: ledger.sequence,
        })
    }

    async fn query(&self, call: &Call) -> RolloutResult<Value> {
        let ledger = self.ledger.lock().unwrap();

        match (ledger.resource(&call.target)?, call.method.as_str()) {
            (Resource::Token { roles, .. }, "hasRole") => {
                let role = arg_str(call, 0)?;
                let account = arg_address(call, 1)?;
                Ok(json!(roles.get(&role).is_some_and(|m| m.contains(&account))))
            }
            (Resource::Token { balances, .. }, "balanceOf") => {
                let account = arg_address(call, 0)?;
                Ok(json!(balances.get(&account).copied().unwrap_or(0).to_string()))
            }
            (Resource::VestingFactory { wallets, .. }, "walletOf") => {
                let beneficiary = arg_address(call, 0)?;
                Ok(wallets
                    .get(&beneficiary)
                    .map(|a| json!(a.as_str()))
                    .unwrap_or(Value::Null))
            }
            (Resource::VestingFactory { token, .. }, "token") => Ok(json!(token.as_str())),
            (
                Resource::VestingWallet {
                    beneficiary,
                    start,
                    cliff_seconds,
                    duration_seconds,
                    controller,
                },
                "schedule",
            ) => Ok(json!({
                "beneficiary": beneficiary.as_str(),
                "start": start.to_rfc3339(),
                "cliff_seconds": cliff_seconds,
                "duration_seconds": duration_seconds,
                "controller": controller.as_str(),
            })),
            (_, method) => Err(rejected(call, format!("unknown query '{method}'"))),
        }
    }

    fn target_name(&self) -> &'static str {
        "in-memory simulator"
    }
}

fn rejected(call: &Call, reason: impl Into<String>) -> RolloutError {
    RolloutError::CallRejected {
        target: call.target.to_string(),
        method: call.method.clone(),
        reason: reason.into(),
    }
}

fn arg(call: &Call, index: usize) -> RolloutResult<&Value> {
    call.args
        .get(index)
        .ok_or_else(|| rejected(call, format!("missing argument {index}")))
}

fn arg_str(call: &Call, index: usize) -> RolloutResult<String> {
    arg(call, index)?
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| rejected(call, format!("argument {index} must be a string")))
}

fn arg_address(call: &Call, index: usize) -> RolloutResult<Address> {
    Address::parse(&arg_str(call, index)?)
}

fn arg_amount(call: &Call, index: usize) -> RolloutResult<u128> {
    arg_str(call, index)?
        .parse()
        .map_err(|_| rejected(call, format!("argument {index} must be a decimal amount")))
}

fn arg_u64(call: &Call, index: usize) -> RolloutResult<u64> {
    arg(call, index)?
        .as_u64()
        .ok_or_else(|| rejected(call, format!("argument {index} must be an integer")))
}

fn arg_timestamp(call: &Call, index: usize) -> RolloutResult<DateTime<Utc>> {
    let raw = arg_str(call, index)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| rejected(call, format!("argument {index} must be an RFC3339 timestamp")))
}
