//! The token rollout workflow
//!
//! Seven stages, each idempotent and individually re-entrant: provision
//! the token, the vesting-wallet factory, and the relayer; grant roles;
//! create vesting schedules; fund allocations; verify the result. Every
//! batched call is submitted through the provisioned relayer. The stage
//! runner persists a checkpoint after each stage, and every batched
//! operation re-checks its own precondition against the target, so a
//! re-run after any failure converges on the same end state.

use crate::cache::DeployCache;
use crate::error::{RolloutError, RolloutResult};
use crate::executor::{run_stages, BatchExecutor, CallProducer, Stage};
use crate::plan::{Address, Allocation, AllocationKind, ResolvedPlan, Schedule};
use crate::provision::provision;
use crate::target::memory::{ARTIFACT_RELAYER, ARTIFACT_TOKEN, ARTIFACT_VESTING_FACTORY};
use crate::target::{Call, ExecutionTarget};
use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, info};

/// Cache key for the token address
pub const KEY_TOKEN: &str = "token";
/// Cache key for the vesting-factory address
pub const KEY_VESTING_FACTORY: &str = "vesting_factory";
/// Cache key for the relayer address
pub const KEY_RELAYER: &str = "relayer";

/// Stage names in execution order, for status display
pub const STAGE_NAMES: [&str; 7] = [
    "provision-token",
    "provision-vesting-factory",
    "provision-relayer",
    "grant-roles",
    "create-schedules",
    "fund-allocations",
    "verify",
];

/// Addresses of the provisioned core resources
#[derive(Debug, Clone)]
pub struct RolloutOutcome {
    pub token: Address,
    pub vesting_factory: Address,
    pub relayer: Address,
}

/// Shared stage context
#[derive(Clone, Copy)]
struct Ctx<'a> {
    cache: &'a DeployCache,
    target: &'a dyn ExecutionTarget,
    plan: &'a ResolvedPlan,
    executor: &'a BatchExecutor,
}

impl Ctx<'_> {
    /// Address of a resource provisioned by an earlier stage
    async fn resource_address(&self, key: &str) -> RolloutResult<Address> {
        let cached = self.cache.get_str(key).await.ok_or_else(|| {
            RolloutError::Internal(format!("resource '{key}' not provisioned yet"))
        })?;
        Address::parse(&cached)
    }

    async fn query_bool(&self, call: Call) -> RolloutResult<bool> {
        Ok(self.target.query(&call).await?.as_bool().unwrap_or(false))
    }

    async fn balance_of(&self, token: &Address, account: &Address) -> RolloutResult<u128> {
        let raw = self
            .target
            .query(&Call::new(token.clone(), "balanceOf", vec![json!(account.as_str())]))
            .await?;
        raw.as_str()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| RolloutError::Internal("balanceOf returned a non-amount".to_string()))
    }

    /// Vesting wallet address for a beneficiary, if one exists
    async fn wallet_of(&self, factory: &Address, beneficiary: &Address) -> RolloutResult<Option<Address>> {
        let raw = self
            .target
            .query(&Call::new(
                factory.clone(),
                "walletOf",
                vec![json!(beneficiary.as_str())],
            ))
            .await?;
        match raw.as_str() {
            Some(s) => Ok(Some(Address::parse(s)?)),
            None => Ok(None),
        }
    }
}

/// Drives a resolved plan to completion against an execution target
pub struct Orchestrator<'a> {
    cache: &'a DeployCache,
    target: &'a dyn ExecutionTarget,
    plan: &'a ResolvedPlan,
    executor: BatchExecutor,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        cache: &'a DeployCache,
        target: &'a dyn ExecutionTarget,
        plan: &'a ResolvedPlan,
        executor: BatchExecutor,
    ) -> Self {
        Self {
            cache,
            target,
            plan,
            executor,
        }
    }

    /// Run the full workflow: pin identity, execute pending stages,
    /// return the provisioned core addresses.
    pub async fn execute(&self) -> RolloutResult<RolloutOutcome> {
        self.pin_identity().await?;

        let ctx = Ctx {
            cache: self.cache,
            target: self.target,
            plan: self.plan,
            executor: &self.executor,
        };

        let stages: Vec<Box<dyn Stage + '_>> = vec![
            Box::new(ProvisionToken { ctx }),
            Box::new(ProvisionVestingFactory { ctx }),
            Box::new(ProvisionRelayer { ctx }),
            Box::new(GrantRoles { ctx }),
            Box::new(CreateSchedules { ctx }),
            Box::new(FundAllocations { ctx }),
            Box::new(Verify { ctx }),
        ];

        run_stages(self.cache, &stages).await?;

        Ok(RolloutOutcome {
            token: ctx.resource_address(KEY_TOKEN).await?,
            vesting_factory: ctx.resource_address(KEY_VESTING_FACTORY).await?,
            relayer: ctx.resource_address(KEY_RELAYER).await?,
        })
    }

    /// Pin network, operator, and plan digest so a resumed run against a
    /// different environment or an edited plan fails before touching the
    /// target.
    async fn pin_identity(&self) -> RolloutResult<()> {
        let fresh = self.cache.expect("network", json!(self.plan.network)).await?;
        self.cache
            .expect("operator", json!(self.plan.operator.as_str()))
            .await?;
        self.cache
            .expect("plan_digest", json!(self.plan.digest()?))
            .await?;

        if fresh {
            info!("Pinned run identity for network '{}'", self.plan.network);
        } else {
            debug!("Run identity matches cached pins");
        }
        Ok(())
    }
}

struct ProvisionToken<'a> {
    ctx: Ctx<'a>,
}

#[async_trait]
impl Stage for ProvisionToken<'_> {
    fn name(&self) -> &'static str {
        STAGE_NAMES[0]
    }

    async fn run(&self) -> RolloutResult<()> {
        let target = self.ctx.target;
        let operator = self.ctx.plan.operator.as_str();
        provision(self.ctx.cache, KEY_TOKEN, || async move {
            target.deploy(ARTIFACT_TOKEN, &[json!(operator)]).await
        })
        .await?;
        Ok(())
    }
}

struct ProvisionVestingFactory<'a> {
    ctx: Ctx<'a>,
}

#[async_trait]
impl Stage for ProvisionVestingFactory<'_> {
    fn name(&self) -> &'static str {
        STAGE_NAMES[1]
    }

    async fn run(&self) -> RolloutResult<()> {
        let token = self.ctx.resource_address(KEY_TOKEN).await?;
        let target = self.ctx.target;
        provision(self.ctx.cache, KEY_VESTING_FACTORY, || async move {
            target
                .deploy(ARTIFACT_VESTING_FACTORY, &[json!(token.as_str())])
                .await
        })
        .await?;
        Ok(())
    }
}

struct ProvisionRelayer<'a> {
    ctx: Ctx<'a>,
}

#[async_trait]
impl Stage for ProvisionRelayer<'_> {
    fn name(&self) -> &'static str {
        STAGE_NAMES[2]
    }

    async fn run(&self) -> RolloutResult<()> {
        let target = self.ctx.target;
        provision(self.ctx.cache, KEY_RELAYER, || async move {
            target.deploy(ARTIFACT_RELAYER, &[]).await
        })
        .await?;
        Ok(())
    }
}

struct GrantRoles<'a> {
    ctx: Ctx<'a>,
}

#[async_trait]
impl Stage for GrantRoles<'_> {
    fn name(&self) -> &'static str {
        STAGE_NAMES[3]
    }

    async fn run(&self) -> RolloutResult<()> {
        let ctx = self.ctx;
        let token = ctx.resource_address(KEY_TOKEN).await?;
        let relayer = ctx.resource_address(KEY_RELAYER).await?;

        let producers: Vec<CallProducer<'_>> = ctx
            .plan
            .role_grants()
            .into_iter()
            .map(|(role, member)| {
                let token = token.clone();
                let member = member.clone();
                Box::pin(async move {
                    let already = ctx
                        .query_bool(Call::new(
                            token.clone(),
                            "hasRole",
                            vec![json!(role), json!(member.as_str())],
                        ))
                        .await?;
                    if already {
                        debug!("{member} already holds role '{role}'");
                        return Ok(None);
                    }
                    Ok(Some(Call::new(
                        token,
                        "grantRole",
                        vec![json!(role), json!(member.as_str())],
                    )))
                }) as CallProducer<'_>
            })
            .collect();

        ctx.executor
            .execute_batches(ctx.target, &relayer, producers)
            .await?;
        Ok(())
    }
}

struct CreateSchedules<'a> {
    ctx: Ctx<'a>,
}

#[async_trait]
impl Stage for CreateSchedules<'_> {
    fn name(&self) -> &'static str {
        STAGE_NAMES[4]
    }

    async fn run(&self) -> RolloutResult<()> {
        let ctx = self.ctx;
        let factory = ctx.resource_address(KEY_VESTING_FACTORY).await?;
        let relayer = ctx.resource_address(KEY_RELAYER).await?;

        let producers: Vec<CallProducer<'_>> = ctx
            .plan
            .allocations
            .iter()
            .filter_map(|allocation| {
                let schedule = allocation.schedule.as_ref()?;
                Some((allocation.beneficiary.clone(), schedule.clone()))
            })
            .map(|(beneficiary, schedule)| {
                let factory = factory.clone();
                Box::pin(async move {
                    if ctx.wallet_of(&factory, &beneficiary).await?.is_some() {
                        debug!("Vesting wallet for {beneficiary} already exists");
                        return Ok(None);
                    }
                    Ok(Some(Call::new(
                        factory,
                        "createWallet",
                        vec![
                            json!(beneficiary.as_str()),
                            json!(schedule.start.to_rfc3339()),
                            json!(schedule.cliff_seconds),
                            json!(schedule.duration_seconds),
                            json!(schedule.controller.as_str()),
                        ],
                    )))
                }) as CallProducer<'_>
            })
            .collect();

        ctx.executor
            .execute_batches(ctx.target, &relayer, producers)
            .await?;
        Ok(())
    }
}

struct FundAllocations<'a> {
    ctx: Ctx<'a>,
}

#[async_trait]
impl Stage for FundAllocations<'_> {
    fn name(&self) -> &'static str {
        STAGE_NAMES[5]
    }

    async fn run(&self) -> RolloutResult<()> {
        let ctx = self.ctx;
        let token = ctx.resource_address(KEY_TOKEN).await?;
        let factory = ctx.resource_address(KEY_VESTING_FACTORY).await?;
        let relayer = ctx.resource_address(KEY_RELAYER).await?;

        let producers: Vec<CallProducer<'_>> = ctx
            .plan
            .allocations
            .iter()
            .map(|allocation| {
                let token = token.clone();
                let factory = factory.clone();
                Box::pin(async move {
                    let recipient = allocation_recipient(&ctx, &factory, allocation).await?;
                    let balance = ctx.balance_of(&token, &recipient).await?;
                    if balance >= allocation.amount {
                        debug!("{recipient} already funded ({balance})");
                        return Ok(None);
                    }
                    // Top up the shortfall so an interrupted run converges
                    let shortfall = allocation.amount - balance;
                    Ok(Some(Call::new(
                        token,
                        "mint",
                        vec![json!(recipient.as_str()), json!(shortfall.to_string())],
                    )))
                }) as CallProducer<'_>
            })
            .collect();

        ctx.executor
            .execute_batches(ctx.target, &relayer, producers)
            .await?;
        Ok(())
    }
}

struct Verify<'a> {
    ctx: Ctx<'a>,
}

#[async_trait]
impl Stage for Verify<'_> {
    fn name(&self) -> &'static str {
        STAGE_NAMES[6]
    }

    async fn run(&self) -> RolloutResult<()> {
        let ctx = self.ctx;
        let token = ctx.resource_address(KEY_TOKEN).await?;
        let factory = ctx.resource_address(KEY_VESTING_FACTORY).await?;

        for (role, member) in ctx.plan.role_grants() {
            let granted = ctx
                .query_bool(Call::new(
                    token.clone(),
                    "hasRole",
                    vec![json!(role), json!(member.as_str())],
                ))
                .await?;
            if !granted {
                return Err(RolloutError::VerificationFailed(format!(
                    "{member} is missing role '{role}'"
                )));
            }
        }

        for allocation in &ctx.plan.allocations {
            let recipient = allocation_recipient(&ctx, &factory, allocation).await?;
            let balance = ctx.balance_of(&token, &recipient).await?;
            if balance != allocation.amount {
                return Err(RolloutError::VerificationFailed(format!(
                    "{} holds {balance}, expected {}",
                    recipient, allocation.amount
                )));
            }

            if let Some(schedule) = &allocation.schedule {
                verify_schedule(&ctx, &factory, &allocation.beneficiary, schedule).await?;
            }
        }

        info!("All post-conditions hold");
        Ok(())
    }
}

/// Where an allocation's tokens belong: the beneficiary for direct
/// allocations, the vesting wallet for scheduled ones.
async fn allocation_recipient(
    ctx: &Ctx<'_>,
    factory: &Address,
    allocation: &Allocation,
) -> RolloutResult<Address> {
    match allocation.kind {
        AllocationKind::Direct => Ok(allocation.beneficiary.clone()),
        AllocationKind::Scheduled => {
            ctx.wallet_of(factory, &allocation.beneficiary)
                .await?
                .ok_or_else(|| {
                    RolloutError::Internal(format!(
                        "no vesting wallet for {}; create-schedules did not complete",
                        allocation.beneficiary
                    ))
                })
        }
    }
}

async fn verify_schedule(
    ctx: &Ctx<'_>,
    factory: &Address,
    beneficiary: &Address,
    expected: &Schedule,
) -> RolloutResult<()> {
    let wallet = ctx
        .wallet_of(factory, beneficiary)
        .await?
        .ok_or_else(|| {
            RolloutError::VerificationFailed(format!("no vesting wallet for {beneficiary}"))
        })?;

    let actual = ctx
        .target
        .query(&Call::new(wallet.clone(), "schedule", vec![]))
        .await?;

    let expected_json = json!({
        "beneficiary": beneficiary.as_str(),
        "start": expected.start.to_rfc3339(),
        "cliff_seconds": expected.cliff_seconds,
        "duration_seconds": expected.duration_seconds,
        "controller": expected.controller.as_str(),
    });

    if actual != expected_json {
        return Err(RolloutError::VerificationFailed(format!(
            "wallet {wallet} schedule mismatch: target reports {actual}, plan expects {expected_json}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{DeployCache, MemoryStore};
    use crate::plan::Plan;
    use crate::target::MemoryTarget;

    const OPERATOR: &str = "0x00000000000000000000000000000000000000aa";
    const ISSUER: &str = "0x00000000000000000000000000000000000000bb";
    const DIRECT: &str = "0x00000000000000000000000000000000000000cc";
    const VESTED: &str = "0x00000000000000000000000000000000000000dd";

    fn plan() -> ResolvedPlan {
        let plan: Plan = toml::from_str(&format!(
            r#"
            network = "localnet"
            operator = "{OPERATOR}"

            [participants]
            administrators = ["{OPERATOR}"]
            issuers = ["{ISSUER}"]

            [[allocations]]
            beneficiary = "{DIRECT}"
            kind = "direct"
            amount = "100"

            [[allocations]]
            beneficiary = "{VESTED}"
            kind = "scheduled"
            amount = "50"
            start = "2026-01-01T00:00:00Z"
            cliff_days = 30
            duration_days = 365
            controller = "{OPERATOR}"
            "#
        ))
        .unwrap();
        plan.resolve().unwrap()
    }

    async fn memory_cache() -> DeployCache {
        DeployCache::open(Box::new(MemoryStore::new())).await.unwrap()
    }

    #[tokio::test]
    async fn full_run_satisfies_the_plan() {
        let cache = memory_cache().await;
        let target = MemoryTarget::new();
        let plan = plan();

        let outcome = Orchestrator::new(&cache, &target, &plan, BatchExecutor::default())
            .execute()
            .await
            .unwrap();

        // Direct beneficiary holds the tokens directly
        let direct = Address::parse(DIRECT).unwrap();
        let balance = target
            .query(&Call::new(
                outcome.token.clone(),
                "balanceOf",
                vec![json!(direct.as_str())],
            ))
            .await
            .unwrap();
        assert_eq!(balance, json!("100"));

        // Scheduled tokens are held by the wallet, not the beneficiary
        let vested = Address::parse(VESTED).unwrap();
        let wallet = target
            .query(&Call::new(
                outcome.vesting_factory.clone(),
                "walletOf",
                vec![json!(vested.as_str())],
            ))
            .await
            .unwrap();
        let wallet = Address::parse(wallet.as_str().unwrap()).unwrap();

        let wallet_balance = target
            .query(&Call::new(
                outcome.token.clone(),
                "balanceOf",
                vec![json!(wallet.as_str())],
            ))
            .await
            .unwrap();
        assert_eq!(wallet_balance, json!("50"));

        let beneficiary_balance = target
            .query(&Call::new(
                outcome.token.clone(),
                "balanceOf",
                vec![json!(vested.as_str())],
            ))
            .await
            .unwrap();
        assert_eq!(beneficiary_balance, json!("0"));

        let schedule = target
            .query(&Call::new(wallet, "schedule", vec![]))
            .await
            .unwrap();
        assert_eq!(schedule["start"], json!("2026-01-01T00:00:00+00:00"));
        assert_eq!(schedule["cliff_seconds"], json!(30 * 86_400));
        assert_eq!(schedule["duration_seconds"], json!(365 * 86_400));
    }

    #[tokio::test]
    async fn rerun_deploys_nothing_new() {
        let cache = memory_cache().await;
        let target = MemoryTarget::new();
        let plan = plan();

        let first = Orchestrator::new(&cache, &target, &plan, BatchExecutor::default())
            .execute()
            .await
            .unwrap();
        let second = Orchestrator::new(&cache, &target, &plan, BatchExecutor::default())
            .execute()
            .await
            .unwrap();

        assert_eq!(target.deploy_count(ARTIFACT_TOKEN), 1);
        assert_eq!(target.deploy_count(ARTIFACT_VESTING_FACTORY), 1);
        assert_eq!(target.deploy_count(ARTIFACT_RELAYER), 1);
        assert_eq!(first.token, second.token);
    }

    #[tokio::test]
    async fn resumed_run_finishes_remaining_stages() {
        let cache = memory_cache().await;
        let target = MemoryTarget::new();
        let plan = plan();

        // First run completes only the provisioning stages
        {
            let orchestrator = Orchestrator::new(&cache, &target, &plan, BatchExecutor::default());
            orchestrator.pin_identity().await.unwrap();
            let ctx = Ctx {
                cache: &cache,
                target: &target,
                plan: &plan,
                executor: &orchestrator.executor,
            };
            let stages: Vec<Box<dyn Stage + '_>> = vec![
                Box::new(ProvisionToken { ctx }),
                Box::new(ProvisionVestingFactory { ctx }),
                Box::new(ProvisionRelayer { ctx }),
            ];
            run_stages(&cache, &stages).await.unwrap();
        }

        // Full run resumes at grant-roles and completes
        Orchestrator::new(&cache, &target, &plan, BatchExecutor::default())
            .execute()
            .await
            .unwrap();

        assert_eq!(target.deploy_count(ARTIFACT_TOKEN), 1);
        let granted = target
            .query(&Call::new(
                Address::parse(&cache.get_str(KEY_TOKEN).await.unwrap()).unwrap(),
                "hasRole",
                vec![json!("issuer"), json!(ISSUER)],
            ))
            .await
            .unwrap();
        assert_eq!(granted, json!(true));
    }

    #[tokio::test]
    async fn batches_route_through_the_cached_relayer() {
        let cache = memory_cache().await;
        let target = MemoryTarget::new();
        let plan = plan();

        // Point the relayer key at what will become the token's address;
        // provision-relayer reuses it, so grant-roles relays through the
        // token and the target rejects the batch.
        cache
            .set(KEY_RELAYER, json!("0x0000000000000000000000000000000000000001"))
            .await
            .unwrap();

        let err = Orchestrator::new(&cache, &target, &plan, BatchExecutor::default())
            .execute()
            .await
            .unwrap_err();
        assert!(matches!(err, RolloutError::CallRejected { .. }));
    }

    #[tokio::test]
    async fn edited_plan_is_rejected_on_resume() {
        let cache = memory_cache().await;
        let target = MemoryTarget::new();
        let plan = plan();

        Orchestrator::new(&cache, &target, &plan, BatchExecutor::default())
            .execute()
            .await
            .unwrap();

        let mut edited = plan.clone();
        edited.allocations[0].amount = 999;

        let err = Orchestrator::new(&cache, &target, &edited, BatchExecutor::default())
            .execute()
            .await
            .unwrap_err();
        assert!(matches!(err, RolloutError::CacheMismatch { .. }));
    }

    #[tokio::test]
    async fn different_network_is_rejected_on_resume() {
        let cache = memory_cache().await;
        let target = MemoryTarget::new();
        let plan = plan();

        Orchestrator::new(&cache, &target, &plan, BatchExecutor::default())
            .execute()
            .await
            .unwrap();

        let mut other = plan.clone();
        other.network = "mainnet".to_string();

        let err = Orchestrator::new(&cache, &target, &other, BatchExecutor::default())
            .execute()
            .await
            .unwrap_err();
        assert!(matches!(err, RolloutError::CacheMismatch { key, .. } if key == "network"));
    }
}
