//! Preflight checks for hepack.
//!
//! Every external tool the pipeline drives must be on PATH before a build
//! starts. Run with `hepack preflight` to check everything is ready.

mod types;

use anyhow::{bail, Result};

use crate::config::ToolNames;

pub use types::{CheckResult, CheckStatus, PreflightReport};

/// Look up every configured tool.
pub fn run_preflight(tools: &ToolNames) -> PreflightReport {
    let checks = tools
        .requirements()
        .into_iter()
        .map(|(tool, package, purpose)| CheckResult {
            tool: tool.to_string(),
            package: package.to_string(),
            purpose: purpose.to_string(),
            status: match which::which(tool) {
                Ok(path) => CheckStatus::Found(path.display().to_string()),
                Err(_) => CheckStatus::Missing,
            },
        })
        .collect();

    PreflightReport { checks }
}

/// Run preflight and bail if any tool is missing.
pub fn run_preflight_or_fail(tools: &ToolNames) -> Result<()> {
    let report = run_preflight(tools);
    report.print();

    if !report.all_passed() {
        bail!(
            "Preflight failed: {} tool(s) missing. Install them before building.",
            report.fail_count()
        );
    }

    println!("All preflight checks passed!\n");
    Ok(())
}
