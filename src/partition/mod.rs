//! Partition images for embedded subsystems.
//!
//! Each subsystem gets two partitions in the burning image:
//! - `<name>_system` - FAT32, holds cfgload, config.ini, kernel, SYSTEM and DTBs
//! - `<name>_storage` - ext4 in Android sparse format, the writable /storage

mod storage;
mod system;

pub use storage::{build_storage_partition, storage_label};
pub use system::{
    build_system_partition, populate_system_partition, stage_system, system_label, StagedSystem,
};

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// Create (or replace) `path` as a zero-filled sparse file of `size` bytes.
pub fn allocate_file(path: &Path, size: u64) -> Result<()> {
    if path.exists() {
        fs::remove_file(path)
            .with_context(|| format!("Failed to remove stale {}", path.display()))?;
    }
    let file = fs::File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    file.set_len(size)
        .with_context(|| format!("Failed to size {} to {} bytes", path.display(), size))?;
    Ok(())
}
