//! The building directory.
//!
//! ```text
//! <building>/
//!   everything/          unpacked partition files of the burning image
//!   <name>_system/       staged system partition content per subsystem
//!   partitions.json      final partition table, for inspection
//! ```
//!
//! The directory is wiped at the start of a build and left in place on
//! failure so sizing and format problems can be inspected.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ComposeError;
use crate::table::PartitionTable;
use crate::tools::HostTools;

/// Partition file holding the encrypted DTB on newer SoCs.
pub const ENCRYPTED_DTB: &str = "meson1_ENC.dtb";
/// Plain DTB carrying the partition table.
pub const DTB: &str = "meson1.dtb";
/// Duplicate of the DTB some images carry as a partition.
pub const DTB_DUPLICATE: &str = "_aml_dtb.PARTITION";
pub const RECOVERY: &str = "recovery.PARTITION";
pub const SUPER: &str = "super.PARTITION";

#[derive(Debug, Clone)]
pub struct Building {
    root: PathBuf,
}

impl Building {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn everything(&self) -> PathBuf {
        self.root.join("everything")
    }

    pub fn staging(&self, name: &str) -> PathBuf {
        self.root.join(format!("{}_system", name))
    }

    pub fn dtb(&self) -> PathBuf {
        self.everything().join(DTB)
    }

    pub fn recovery(&self) -> PathBuf {
        self.everything().join(RECOVERY)
    }

    /// Remove any previous building directory and unpack `android` into it.
    pub fn prepare(&self, tools: &dyn HostTools, android: &Path) -> Result<()> {
        if self.root.exists() {
            println!("Removing {}...", self.root.display());
            fs::remove_dir_all(&self.root)
                .with_context(|| format!("Failed to remove {}", self.root.display()))?;
        }
        fs::create_dir_all(&self.root)
            .with_context(|| format!("Failed to create {}", self.root.display()))?;
        tools
            .unpack(android, &self.everything())
            .with_context(|| format!("Failed to unpack {}", android.display()))?;
        Ok(())
    }

    /// Refuse images whose partition table lives in an encrypted DTB.
    pub fn check_encrypt(&self) -> Result<()> {
        let encrypted = self.everything().join(ENCRYPTED_DTB);
        if encrypted.exists() {
            return Err(ComposeError::EncryptedLayoutBlocker { path: encrypted }.into());
        }
        Ok(())
    }

    /// Delete every unpacked partition file not named in `parts`.
    pub fn keep(&self, parts: &[String]) -> Result<()> {
        println!("Keeping only the following parts in base Android image: {:?}", parts);
        let mut entries: Vec<PathBuf> = fs::read_dir(self.everything())?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<std::io::Result<_>>()?;
        entries.sort();

        for path in entries {
            let name = path.file_name().unwrap_or_default().to_string_lossy();
            if parts.iter().any(|p| *p == name) {
                println!("  + {}", path.display());
                continue;
            }
            println!("  - {}", path.display());
            fs::remove_file(&path)
                .with_context(|| format!("Failed to remove {}", path.display()))?;
        }
        Ok(())
    }

    /// Copy the rewritten DTB over its duplicate partition, if there is one.
    pub fn sync_dtb_duplicate(&self) -> Result<()> {
        let duplicate = self.everything().join(DTB_DUPLICATE);
        if duplicate.exists() {
            fs::copy(self.dtb(), &duplicate)
                .with_context(|| format!("Failed to refresh {}", duplicate.display()))?;
        }
        Ok(())
    }

    /// Images with a dynamic `super` partition and A/B slots need 8-byte
    /// output alignment.
    pub fn out_align(&self) -> Result<Option<u32>> {
        let everything = self.everything();
        if !everything.join(SUPER).exists() {
            return Ok(None);
        }
        for entry in fs::read_dir(&everything)? {
            let name = entry?.file_name();
            if name.to_string_lossy().ends_with("_a.PARTITION") {
                return Ok(Some(8));
            }
        }
        Ok(None)
    }

    /// Record the final table next to the partition files.
    pub fn write_table(&self, table: &PartitionTable) -> Result<()> {
        let path = self.root.join("partitions.json");
        let json = serde_json::to_string_pretty(table)?;
        fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }
}
