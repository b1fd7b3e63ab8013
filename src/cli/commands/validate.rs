//! Validate command - check a plan without touching any target

use crate::cli::args::ValidateArgs;
use crate::error::RolloutResult;
use crate::plan::{AllocationKind, Plan};
use console::style;

/// Execute the validate command
pub async fn execute(args: ValidateArgs) -> RolloutResult<()> {
    let plan = Plan::load(&args.plan).await?;
    let resolved = plan.resolve()?;

    let direct = resolved
        .allocations
        .iter()
        .filter(|a| a.kind == AllocationKind::Direct)
        .count();
    let scheduled = resolved.allocations.len() - direct;

    println!(
        "{} Plan {} is valid",
        style("✓").green(),
        style(args.plan.display()).cyan()
    );
    println!("  network      {}", resolved.network);
    println!("  operator     {}", resolved.operator);
    println!(
        "  roles        {} administrators, {} issuers, {} validators",
        resolved.administrators.len(),
        resolved.issuers.len(),
        resolved.validators.len()
    );
    println!("  allocations  {direct} direct, {scheduled} scheduled");
    println!("  digest       {}", resolved.digest()?);

    Ok(())
}
