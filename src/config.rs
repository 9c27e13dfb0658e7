//! Configuration management for hepack.
//!
//! Reads configuration from a .env file and environment variables.
//! Environment variables take precedence over the .env file.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::size::{parse_size, MIB};

/// Hardware partition limit of the Amlogic partition table.
pub const DEFAULT_MAX_PARTITIONS: usize = 28;

/// Names of the external executables the pipeline drives.
#[derive(Debug, Clone)]
pub struct ToolNames {
    pub ampack: String,
    pub ampart: String,
    pub mkimage: String,
    pub mkfs_vfat: String,
    pub mcopy: String,
    pub mkfs_ext4: String,
    pub img2simg: String,
}

impl Default for ToolNames {
    fn default() -> Self {
        Self {
            ampack: "ampack".to_string(),
            ampart: "ampart".to_string(),
            mkimage: "mkimage".to_string(),
            mkfs_vfat: "mkfs.vfat".to_string(),
            mcopy: "mcopy".to_string(),
            mkfs_ext4: "mkfs.ext4".to_string(),
            img2simg: "img2simg".to_string(),
        }
    }
}

impl ToolNames {
    /// `(tool, package, purpose)` triples for the preflight report.
    pub fn requirements(&self) -> [(&str, &'static str, &'static str); 7] {
        [
            (self.ampack.as_str(), "ampack", "Unpacks and packs Amlogic burning images"),
            (self.ampart.as_str(), "ampart", "Snapshots and clones the partition table"),
            (self.mkimage.as_str(), "u-boot-tools", "Compiles the cfgload boot script"),
            (self.mkfs_vfat.as_str(), "dosfstools", "Formats the FAT32 system partitions"),
            (self.mcopy.as_str(), "mtools", "Copies boot artifacts into FAT32 images"),
            (self.mkfs_ext4.as_str(), "e2fsprogs", "Formats the ext4 storage partitions"),
            (self.img2simg.as_str(), "android-sdk-libsparse-utils", "Converts storage images to sparse format"),
        ]
    }
}

/// Empirical sizing constants for the FAT32 system partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizingPolicy {
    /// Number of candidate sizes tried before giving up.
    pub attempts: u32,
    /// Growth between consecutive candidates, in bytes.
    pub step: u64,
    /// FAT32 overhead allowance added on top of rounded content, in bytes.
    pub slack: u64,
}

impl Default for SizingPolicy {
    fn default() -> Self {
        Self {
            attempts: 10,
            step: MIB,
            slack: 2 * MIB,
        }
    }
}

/// How an over-full partition table is brought back under the hardware limit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TablePolicy {
    pub max_partitions: usize,
    /// Entries whose name ends with this suffix are secondary A/B slots and
    /// get dropped first.
    pub secondary_suffix: String,
}

impl Default for TablePolicy {
    fn default() -> Self {
        Self {
            max_partitions: DEFAULT_MAX_PARTITIONS,
            secondary_suffix: "_b".to_string(),
        }
    }
}

/// hepack configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Default building (workspace) directory.
    pub building: PathBuf,
    pub tools: ToolNames,
    pub sizing: SizingPolicy,
    pub table: TablePolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            building: PathBuf::from("building"),
            tools: ToolNames::default(),
            sizing: SizingPolicy::default(),
            table: TablePolicy::default(),
        }
    }
}

impl Config {
    /// Load configuration from `<base_dir>/.env` and the environment.
    pub fn load(base_dir: &Path) -> Result<Self> {
        let mut env_vars = HashMap::new();

        let env_path = base_dir.join(".env");
        if env_path.exists() {
            let entries = dotenvy::from_path_iter(&env_path)
                .with_context(|| format!("Failed to read {}", env_path.display()))?;
            for entry in entries {
                let (key, value) =
                    entry.with_context(|| format!("Malformed line in {}", env_path.display()))?;
                env_vars.insert(key, value);
            }
        }

        // Environment variables override .env file
        for (key, value) in std::env::vars() {
            env_vars.insert(key, value);
        }

        Self::from_vars(&env_vars)
    }

    /// Build a configuration from an already merged key/value map.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self> {
        let mut config = Config::default();

        if let Some(building) = vars.get("HEPACK_BUILDING") {
            config.building = PathBuf::from(building);
        }

        let tools = &mut config.tools;
        for (key, slot) in [
            ("HEPACK_AMPACK", &mut tools.ampack),
            ("HEPACK_AMPART", &mut tools.ampart),
            ("HEPACK_MKIMAGE", &mut tools.mkimage),
            ("HEPACK_MKFS_VFAT", &mut tools.mkfs_vfat),
            ("HEPACK_MCOPY", &mut tools.mcopy),
            ("HEPACK_MKFS_EXT4", &mut tools.mkfs_ext4),
            ("HEPACK_IMG2SIMG", &mut tools.img2simg),
        ] {
            if let Some(value) = vars.get(key) {
                *slot = value.clone();
            }
        }

        if let Some(attempts) = vars.get("HEPACK_FAT_ATTEMPTS") {
            config.sizing.attempts = attempts
                .parse()
                .with_context(|| format!("HEPACK_FAT_ATTEMPTS: '{}' is not a count", attempts))?;
        }
        if let Some(step) = vars.get("HEPACK_FAT_STEP") {
            config.sizing.step = parse_size(step).context("HEPACK_FAT_STEP")?;
        }
        if let Some(slack) = vars.get("HEPACK_FS_SLACK") {
            config.sizing.slack = parse_size(slack).context("HEPACK_FS_SLACK")?;
        }
        if let Some(max) = vars.get("HEPACK_MAX_PARTITIONS") {
            config.table.max_partitions = max
                .parse()
                .with_context(|| format!("HEPACK_MAX_PARTITIONS: '{}' is not a count", max))?;
        }
        if let Some(suffix) = vars.get("HEPACK_SECONDARY_SUFFIX") {
            config.table.secondary_suffix = suffix.clone();
        }

        Ok(config)
    }

    /// Print configuration for debugging.
    pub fn print(&self) {
        println!("Configuration:");
        println!("  HEPACK_BUILDING: {}", self.building.display());
        println!("  HEPACK_AMPACK: {}", self.tools.ampack);
        println!("  HEPACK_AMPART: {}", self.tools.ampart);
        println!("  HEPACK_MKIMAGE: {}", self.tools.mkimage);
        println!("  HEPACK_MKFS_VFAT: {}", self.tools.mkfs_vfat);
        println!("  HEPACK_MCOPY: {}", self.tools.mcopy);
        println!("  HEPACK_MKFS_EXT4: {}", self.tools.mkfs_ext4);
        println!("  HEPACK_IMG2SIMG: {}", self.tools.img2simg);
        println!("  HEPACK_FAT_ATTEMPTS: {}", self.sizing.attempts);
        println!("  HEPACK_FAT_STEP: {}K", self.sizing.step / 1024);
        println!("  HEPACK_FS_SLACK: {}K", self.sizing.slack / 1024);
        println!("  HEPACK_MAX_PARTITIONS: {}", self.table.max_partitions);
        println!("  HEPACK_SECONDARY_SUFFIX: {}", self.table.secondary_suffix);
    }
}
