//! Build command - composes the firmware image.

use anyhow::Result;
use std::path::PathBuf;

use crate::compose::{compose, ComposeOptions};
use crate::config::Config;
use crate::preflight::run_preflight_or_fail;
use crate::subsystem::SubsystemPlan;
use crate::tools::ExternalTools;
use crate::workspace::Building;

/// `--<name>-*` options of one subsystem, as given on the command line.
#[derive(Debug, Clone, Default)]
pub struct SubsystemArgs {
    pub tar: Option<PathBuf>,
    pub dtb: Option<String>,
    pub system: Option<String>,
    pub storage: Option<String>,
}

impl SubsystemArgs {
    fn plan(self, name: &str) -> Result<Option<SubsystemPlan>> {
        SubsystemPlan::from_args(
            name,
            self.tar,
            self.dtb,
            self.system.as_deref(),
            self.storage.as_deref(),
        )
    }
}

/// Arguments of the build command.
#[derive(Debug, Clone)]
pub struct BuildArgs {
    pub android: PathBuf,
    pub output: PathBuf,
    pub building: Option<PathBuf>,
    pub keep: Option<Vec<String>>,
    pub ce: SubsystemArgs,
    pub ee: SubsystemArgs,
}

/// Validate every option up front, then run the pipeline.
pub fn cmd_build(args: BuildArgs, config: &Config) -> Result<()> {
    let plans: Vec<SubsystemPlan> = [args.ce.plan("ce")?, args.ee.plan("ee")?]
        .into_iter()
        .flatten()
        .collect();

    let options = ComposeOptions {
        android: args.android,
        output: args.output,
        keep: args.keep,
        plans,
    };
    run_preflight_or_fail(&config.tools)?;

    let building = Building::new(args.building.unwrap_or_else(|| config.building.clone()));
    let tools = ExternalTools::new(config.tools.clone());

    if let Err(e) = compose(&tools, &building, &options, config) {
        // Keep the building directory for debugging
        eprintln!("\n[!] Build failed. Building directory preserved for inspection:");
        eprintln!("    {}", building.root().display());
        return Err(e);
    }
    Ok(())
}
