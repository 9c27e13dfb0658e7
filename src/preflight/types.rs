//! Preflight check results and report.

/// Outcome of looking up one host tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckStatus {
    /// Found at this path.
    Found(String),
    /// Not on PATH; the build cannot succeed.
    Missing,
}

#[derive(Debug, Clone)]
pub struct CheckResult {
    pub tool: String,
    /// Distribution package that usually provides the tool.
    pub package: String,
    pub purpose: String,
    pub status: CheckStatus,
}

impl CheckResult {
    pub fn passed(&self) -> bool {
        matches!(self.status, CheckStatus::Found(_))
    }
}

/// Results of all preflight checks.
pub struct PreflightReport {
    pub checks: Vec<CheckResult>,
}

impl PreflightReport {
    /// Returns true if every tool was found.
    pub fn all_passed(&self) -> bool {
        self.checks.iter().all(CheckResult::passed)
    }

    pub fn fail_count(&self) -> usize {
        self.checks.iter().filter(|c| !c.passed()).count()
    }

    /// Print the report to stdout.
    pub fn print(&self) {
        println!("=== Preflight Check Results ===\n");

        for check in &self.checks {
            match &check.status {
                CheckStatus::Found(path) => {
                    println!("  ✓ [PASS] {}: {}", check.tool, path);
                }
                CheckStatus::Missing => {
                    println!(
                        "  ✗ [FAIL] {}: Not found. Install '{}' package. {}",
                        check.tool, check.package, check.purpose
                    );
                }
            }
        }

        println!();
        let total = self.checks.len();
        let failed = self.fail_count();
        println!("Summary: {}/{} passed", total - failed, total);
        if failed > 0 {
            println!("         {} FAILED - build will not succeed", failed);
        }
    }
}
