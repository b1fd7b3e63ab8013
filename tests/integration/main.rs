//! Integration tests for rollout

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::path::Path;
    use tempfile::TempDir;

    const OPERATOR: &str = "0x00000000000000000000000000000000000000aa";
    const ISSUER: &str = "0x00000000000000000000000000000000000000bb";
    const DIRECT: &str = "0x00000000000000000000000000000000000000cc";
    const VESTED: &str = "0x00000000000000000000000000000000000000dd";

    fn rollout() -> Command {
        cargo_bin_cmd!("rollout")
    }

    fn write_plan(dir: &Path) -> std::path::PathBuf {
        let path = dir.join("plan.toml");
        std::fs::write(
            &path,
            format!(
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
            ),
        )
        .unwrap();
        path
    }

    #[test]
    fn help_displays() {
        rollout()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("token rollout orchestrator"));
    }

    #[test]
    fn version_displays() {
        rollout()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("rollout"));
    }

    #[test]
    fn validate_accepts_valid_plan() {
        let temp = TempDir::new().unwrap();
        let plan = write_plan(temp.path());

        rollout()
            .args(["validate", plan.to_str().unwrap()])
            .assert()
            .success()
            .stdout(predicate::str::contains("is valid"))
            .stdout(predicate::str::contains("1 direct, 1 scheduled"));
    }

    #[test]
    fn validate_rejects_duplicate_allocation() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("plan.toml");
        std::fs::write(
            &path,
            format!(
                r#"
                network = "localnet"
                operator = "{OPERATOR}"

                [participants]

                [[allocations]]
                beneficiary = "{DIRECT}"
                kind = "direct"
                amount = "1"

                [[allocations]]
                beneficiary = "{DIRECT}"
                kind = "direct"
                amount = "2"
                "#
            ),
        )
        .unwrap();

        rollout()
            .args(["validate", path.to_str().unwrap()])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Duplicate allocation"));
    }

    #[test]
    fn validate_missing_plan_fails() {
        rollout()
            .args(["validate", "/nonexistent/plan.toml"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Plan file not found"));
    }

    #[test]
    fn run_without_target_fails_with_hint() {
        let temp = TempDir::new().unwrap();
        let plan = write_plan(temp.path());
        let cache = temp.path().join("cache");

        rollout()
            .args([
                "--cache-dir",
                cache.to_str().unwrap(),
                "run",
                plan.to_str().unwrap(),
            ])
            .assert()
            .failure()
            .stderr(predicate::str::contains("No execution target"))
            .stderr(predicate::str::contains("--rehearse"));
    }

    #[test]
    fn rehearsal_run_completes_and_resumes() {
        let temp = TempDir::new().unwrap();
        let plan = write_plan(temp.path());
        let cache = temp.path().join("cache");

        rollout()
            .args([
                "--cache-dir",
                cache.to_str().unwrap(),
                "run",
                plan.to_str().unwrap(),
                "--rehearse",
            ])
            .assert()
            .success()
            .stdout(predicate::str::contains("Rollout for localnet complete"))
            .stdout(predicate::str::contains("token"));

        // A second run resumes from the completed checkpoint
        rollout()
            .args([
                "--cache-dir",
                cache.to_str().unwrap(),
                "run",
                plan.to_str().unwrap(),
                "--rehearse",
            ])
            .assert()
            .success()
            .stdout(predicate::str::contains("Rollout for localnet complete"));

        rollout()
            .args([
                "--cache-dir",
                cache.to_str().unwrap(),
                "status",
                plan.to_str().unwrap(),
            ])
            .assert()
            .success()
            .stdout(predicate::str::contains("All 7 stages complete"));
    }

    #[test]
    fn status_without_cache_reports_fresh_start() {
        let temp = TempDir::new().unwrap();
        let plan = write_plan(temp.path());
        let cache = temp.path().join("cache");

        rollout()
            .args([
                "--cache-dir",
                cache.to_str().unwrap(),
                "status",
                plan.to_str().unwrap(),
            ])
            .assert()
            .success()
            .stdout(predicate::str::contains("No cached progress"));
    }

    #[test]
    fn edited_plan_rejected_against_existing_cache() {
        let temp = TempDir::new().unwrap();
        let plan = write_plan(temp.path());
        let cache = temp.path().join("cache");

        rollout()
            .args([
                "--cache-dir",
                cache.to_str().unwrap(),
                "run",
                plan.to_str().unwrap(),
                "--rehearse",
            ])
            .assert()
            .success();

        // Change an amount and re-run against the same cache
        let edited = std::fs::read_to_string(&plan)
            .unwrap()
            .replace("amount = \"100\"", "amount = \"999\"");
        std::fs::write(&plan, edited).unwrap();

        rollout()
            .args([
                "--cache-dir",
                cache.to_str().unwrap(),
                "run",
                plan.to_str().unwrap(),
                "--rehearse",
            ])
            .assert()
            .failure()
            .stderr(predicate::str::contains("does not match this run"));
    }
}
