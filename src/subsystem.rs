//! Per-subsystem plans and their build.

use anyhow::{bail, Context, Result};
use std::path::PathBuf;

use crate::archive::UpgradeArchive;
use crate::config::SizingPolicy;
use crate::partition::{build_storage_partition, build_system_partition};
use crate::size::{parse_size, SystemSize, MIB};
use crate::table::SubsystemSizes;
use crate::tools::HostTools;
use crate::workspace::Building;

/// What to embed for one alternate OS, as requested on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubsystemPlan {
    /// Name tag, `ce` (CoreELEC) or `ee` (EmuELEC).
    pub name: String,
    pub tar: PathBuf,
    pub dtb: String,
    pub system: SystemSize,
    /// Requested storage size in bytes, before rounding.
    pub storage: u64,
}

impl SubsystemPlan {
    /// Validate the `--<name>-*` options. Returns `None` when the subsystem
    /// is not enabled (no tar given).
    pub fn from_args(
        name: &str,
        tar: Option<PathBuf>,
        dtb: Option<String>,
        system: Option<&str>,
        storage: Option<&str>,
    ) -> Result<Option<Self>> {
        let Some(tar) = tar else {
            return Ok(None);
        };
        let Some(dtb) = dtb else {
            bail!("--{}-dtb must be set when --{}-tar is set", name, name);
        };
        let Some(storage) = storage else {
            bail!("--{}-storage must be set when --{}-tar is set", name, name);
        };

        Ok(Some(Self {
            name: name.to_string(),
            tar,
            dtb,
            system: SystemSize::parse(system)
                .with_context(|| format!("--{}-system", name))?,
            storage: parse_size(storage).with_context(|| format!("--{}-storage", name))?,
        }))
    }

    /// Extract, rewrite, stage and format both partitions of this subsystem.
    pub fn build(
        &self,
        tools: &dyn HostTools,
        building: &Building,
        sizing: &SizingPolicy,
    ) -> Result<SubsystemSizes> {
        println!("Reading {} upgrade tar {}...", self.name, self.tar.display());
        let archive = UpgradeArchive::open(&self.name, &self.tar, &self.dtb)?;

        println!("Building {}_system...", self.name);
        let system = build_system_partition(
            tools,
            &archive,
            &building.staging(&self.name),
            &building.everything(),
            self.system,
            sizing,
        )?;
        println!("  {}_system: {}M", self.name, system / MIB);

        println!("Building {}_storage...", self.name);
        let storage =
            build_storage_partition(tools, &self.name, &building.everything(), self.storage)?;
        println!("  {}_storage: {}M", self.name, storage / MIB);

        Ok(SubsystemSizes {
            name: self.name.clone(),
            system,
            storage,
        })
    }
}
