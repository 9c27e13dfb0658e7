//! FAT32 system partition: staging and empirical sizing.
//!
//! FAT32 overhead (FATs, directory clusters, cluster rounding) is not
//! modelled. The partition is formatted and populated at increasing
//! candidate sizes until `mcopy` fits everything.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use super::allocate_file;
use crate::archive::UpgradeArchive;
use crate::config::SizingPolicy;
use crate::error::ComposeError;
use crate::rewrite::{rewrite_cfgload, rewrite_config, SCRIPT_HEADER_LEN};
use crate::size::{SystemSize, MIB};
use crate::tools::HostTools;

/// Boot artifacts laid out in a staging directory, ready to be copied into
/// the system partition.
#[derive(Debug, Clone)]
pub struct StagedSystem {
    pub dir: PathBuf,
    /// Top-level entries to copy into the image root, in copy order.
    pub entries: Vec<PathBuf>,
    /// Bytes of content; the compiled script counts as its text plus header.
    pub content_len: u64,
}

/// FAT volume label, at most 11 characters: `HYBRID_CSYS`, `HYBRID_ESYS`.
pub fn system_label(name: &str) -> String {
    let initial = name
        .chars()
        .next()
        .map(|c| c.to_ascii_uppercase())
        .unwrap_or('X');
    format!("HYBRID_{}SYS", initial)
}

/// Write the rewritten and raw artifacts of `archive` into a fresh `dir`.
pub fn stage_system(
    tools: &dyn HostTools,
    archive: &UpgradeArchive,
    dir: &Path,
) -> Result<StagedSystem> {
    if dir.exists() {
        fs::remove_dir_all(dir)
            .with_context(|| format!("Failed to clear staging {}", dir.display()))?;
    }
    fs::create_dir_all(dir)?;

    let cfgload = rewrite_cfgload(&archive.cfgload, &archive.name)
        .with_context(|| format!("{}: Generic_cfgload", archive.path.display()))?;
    let cfgload_raw = dir.join("cfgload.raw");
    let cfgload_script = dir.join("cfgload");
    fs::write(&cfgload_raw, &cfgload)?;
    tools
        .compile_script(&cfgload_raw, &cfgload_script)
        .context("Failed to compile cfgload")?;
    fs::remove_file(&cfgload_raw)?;

    let config = rewrite_config(&archive.config, &archive.dtb_name)
        .with_context(|| format!("{}: config.ini", archive.path.display()))?;
    let config_ini = dir.join("config.ini");
    fs::write(&config_ini, &config)?;

    let kernel_img = dir.join("kernel.img");
    fs::write(&kernel_img, &archive.kernel)?;

    let system_img = dir.join("SYSTEM");
    fs::write(&system_img, &archive.system)?;

    let device_trees = dir.join("device_trees");
    fs::create_dir_all(&device_trees)?;
    fs::write(
        device_trees.join(format!("{}.dtb", archive.dtb_name)),
        &archive.dtb,
    )?;

    let content_len = [
        cfgload.len() + SCRIPT_HEADER_LEN,
        config.len(),
        archive.kernel.len(),
        archive.system.len(),
        archive.dtb.len(),
    ]
    .iter()
    .map(|len| *len as u64)
    .sum();

    Ok(StagedSystem {
        dir: dir.to_path_buf(),
        entries: vec![cfgload_script, config_ini, kernel_img, system_img, device_trees],
        content_len,
    })
}

/// Try `policy.attempts` sizes starting at `minimum`, growing by
/// `policy.step`. Returns the first size whose image took every staged file.
pub fn populate_system_partition(
    tools: &dyn HostTools,
    name: &str,
    staged: &StagedSystem,
    partition: &Path,
    minimum: u64,
    policy: &SizingPolicy,
) -> Result<u64> {
    let label = system_label(name);

    for attempt in 0..policy.attempts {
        let size = candidate_size(minimum, attempt, policy.step)?;
        println!("  Trying system partition size: {}M", size / MIB);
        allocate_file(partition, size)?;

        if !tools.format_fat32(partition, &label)? {
            tracing::debug!("{}: mkfs.vfat rejected {} bytes", name, size);
            continue;
        }
        if tools.copy_into_fat(partition, &staged.entries)? {
            return Ok(size);
        }
        tracing::debug!("{}: content did not fit in {} bytes", name, size);
    }

    let last = candidate_size(minimum, policy.attempts.saturating_sub(1), policy.step)?;
    Err(ComposeError::CapacityExhausted {
        name: name.to_string(),
        attempts: policy.attempts,
        first_mib: minimum / MIB,
        last_mib: last / MIB,
    }
    .into())
}

/// Size of the `attempt`-th candidate, zero-based.
fn candidate_size(minimum: u64, attempt: u32, step: u64) -> Result<u64> {
    u64::from(attempt)
        .checked_mul(step)
        .and_then(|growth| minimum.checked_add(growth))
        .ok_or_else(|| {
            ComposeError::InvalidSize(format!(
                "{}B + {} x {}B system partition candidate",
                minimum, attempt, step
            ))
            .into()
        })
}

/// Stage, size and populate `<everything>/<name>_system.PARTITION`.
///
/// Returns the partition size to declare in the partition table.
pub fn build_system_partition(
    tools: &dyn HostTools,
    archive: &UpgradeArchive,
    staging: &Path,
    everything: &Path,
    mode: SystemSize,
    policy: &SizingPolicy,
) -> Result<u64> {
    let staged = stage_system(tools, archive, staging)?;
    let minimum = mode.minimum(staged.content_len, policy.slack)?;
    tracing::debug!(
        "{}: content {} bytes, {:?}, first candidate {} bytes",
        archive.name,
        staged.content_len,
        mode,
        minimum
    );

    let partition = everything.join(format!("{}_system.PARTITION", archive.name));
    populate_system_partition(tools, &archive.name, &staged, &partition, minimum, policy)
}
