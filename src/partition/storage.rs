//! ext4 storage partition.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

use super::allocate_file;
use crate::size::upper_megabyte;
use crate::tools::HostTools;

/// ext4 volume label: `Hybrid_CEstorage`, `Hybrid_EEstorage`.
pub fn storage_label(name: &str) -> String {
    format!("Hybrid_{}storage", name.to_uppercase())
}

/// Create `<everything>/<name>_storage.PARTITION` as a sparse ext4 image.
///
/// Returns the size actually allocated, `requested` rounded up to a whole
/// megabyte, which is what the partition table must declare.
pub fn build_storage_partition(
    tools: &dyn HostTools,
    name: &str,
    everything: &Path,
    requested: u64,
) -> Result<u64> {
    let size = upper_megabyte(requested)?;
    let stem = format!("{}_storage", name);
    let raw = everything.join(format!("{}.RAW", stem));
    let partition = everything.join(format!("{}.PARTITION", stem));

    allocate_file(&raw, size)?;
    tools
        .format_ext4(&raw, &storage_label(name))
        .with_context(|| format!("Failed to format {}", raw.display()))?;
    tools
        .sparse_convert(&raw, &partition)
        .with_context(|| format!("Failed to convert {} to sparse", raw.display()))?;
    fs::remove_file(&raw)?;

    Ok(size)
}
