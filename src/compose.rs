//! The composition pipeline.
//!
//! Build process (each step runs to completion before the next):
//! 1. Wipe the building directory and unpack the base Android image
//! 2. Refuse encrypted-DTB layouts before touching anything
//! 3. Optionally drop Android partitions not in the keep list
//! 4. Per subsystem: verify the upgrade tar, build system and storage
//! 5. Renumber the recovery root device
//! 6. Snapshot the partition table, insert the subsystem partitions, clone
//! 7. Repack the burning image

use anyhow::{bail, Context, Result};
use std::path::PathBuf;

use crate::config::Config;
use crate::recovery::patch_recovery;
use crate::subsystem::SubsystemPlan;
use crate::table::{PartitionTable, SubsystemSizes};
use crate::timing::Phase;
use crate::tools::HostTools;
use crate::workspace::Building;

#[derive(Debug, Clone)]
pub struct ComposeOptions {
    /// Base Android burning image; must not already embed CE or EE.
    pub android: PathBuf,
    pub output: PathBuf,
    /// Partition files to keep from the base image; `None` keeps all.
    pub keep: Option<Vec<String>>,
    /// Enabled subsystems, in build order.
    pub plans: Vec<SubsystemPlan>,
}

/// Run the whole pipeline. Returns the partition table written to the image.
pub fn compose(
    tools: &dyn HostTools,
    building: &Building,
    options: &ComposeOptions,
    config: &Config,
) -> Result<PartitionTable> {
    if options.plans.is_empty() {
        bail!("Neither CoreELEC nor EmuELEC to be embedded, check your options");
    }

    let phase = Phase::begin(format!("Unpacking {}", options.android.display()));
    building.prepare(tools, &options.android)?;
    building.check_encrypt()?;
    if let Some(keep) = &options.keep {
        building.keep(keep)?;
    }
    phase.finish();

    let mut built: Vec<SubsystemSizes> = Vec::with_capacity(options.plans.len());
    for plan in &options.plans {
        let phase = Phase::begin(format!("Embedding {}", plan.name.to_uppercase()));
        let sizes = plan
            .build(tools, building, &config.sizing)
            .with_context(|| format!("Failed to embed {}", plan.name))?;
        built.push(sizes);
        phase.finish();
    }

    let phase = Phase::begin("Updating partition table");
    patch_recovery(&building.recovery())?;
    let table = update_partition_table(tools, building, &built, config)?;
    phase.finish();

    let phase = Phase::begin(format!("Packing {}", options.output.display()));
    let out_align = building.out_align()?;
    tools
        .pack(&building.everything(), &options.output, out_align)
        .with_context(|| format!("Failed to pack {}", options.output.display()))?;
    phase.finish();

    println!("\n=== Image Built ===");
    println!("  Output: {}", options.output.display());
    Ok(table)
}

/// Snapshot the DTB table, insert every built subsystem and clone it back.
pub fn update_partition_table(
    tools: &dyn HostTools,
    building: &Building,
    built: &[SubsystemSizes],
    config: &Config,
) -> Result<PartitionTable> {
    let dtb = building.dtb();
    let snapshot = tools
        .snapshot(&dtb)
        .with_context(|| format!("Failed to snapshot {}", dtb.display()))?;
    let current = PartitionTable::from_snapshot(&snapshot)?;
    let table = current.with_subsystems(built, &config.table)?;

    for entry in &table.partitions {
        println!("  {}", entry.to_parg());
    }
    tools
        .clone_table(&dtb, &table.pargs())
        .with_context(|| format!("Failed to clone partition table into {}", dtb.display()))?;
    building.write_table(&table)?;
    building.sync_dtb_duplicate()?;
    Ok(table)
}
