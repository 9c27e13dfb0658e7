//! Amlogic partition table recomputation.
//!
//! `ampart --mode dsnapshot` describes the DTB partition table as one line
//! of space-separated `name:offset:size:mask` tokens; `ampart --mode dclone`
//! takes the new table as `name::size:mask` arguments with the offset left
//! for ampart to place. Order is the on-device partition index.
//!
//! A size of `-1` is ampart's "take the rest of the device", used by the
//! trailing `data` partition.

use anyhow::Result;
use serde::Serialize;

use crate::config::TablePolicy;
use crate::error::ComposeError;

/// Placement mask for system-like partitions.
pub const MASK_SYSTEM: u32 = 2;
/// Placement mask for data-like partitions.
pub const MASK_DATA: u32 = 4;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartitionEntry {
    pub name: String,
    pub size: i64,
    pub mask: u32,
}

impl PartitionEntry {
    pub fn new(name: impl Into<String>, size: i64, mask: u32) -> Self {
        Self {
            name: name.into(),
            size,
            mask,
        }
    }

    /// Parse one snapshot token, `name:offset:size:mask`.
    pub fn from_parg(parg: &str) -> Result<Self> {
        let parts: Vec<&str> = parg.split(':').collect();
        if parts.len() != 4 {
            return Err(ComposeError::InvalidSnapshot(format!(
                "'{}' has {} fields, expected 4",
                parg,
                parts.len()
            ))
            .into());
        }
        let size = parts[2].parse().map_err(|_| {
            ComposeError::InvalidSnapshot(format!("'{}': bad size '{}'", parg, parts[2]))
        })?;
        let mask = parts[3].parse().map_err(|_| {
            ComposeError::InvalidSnapshot(format!("'{}': bad mask '{}'", parg, parts[3]))
        })?;
        Ok(Self::new(parts[0], size, mask))
    }

    /// dclone argument with the offset left empty.
    pub fn to_parg(&self) -> String {
        format!("{}::{}:{}", self.name, self.size, self.mask)
    }
}

/// Final sizes of one embedded subsystem, as built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubsystemSizes {
    pub name: String,
    pub system: u64,
    pub storage: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartitionTable {
    pub partitions: Vec<PartitionEntry>,
}

impl PartitionTable {
    /// Parse the first line of `ampart --mode dsnapshot` output.
    pub fn from_snapshot(output: &str) -> Result<Self> {
        let line = output.lines().next().unwrap_or_default().trim_end();
        let partitions = line
            .split(' ')
            .map(PartitionEntry::from_parg)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { partitions })
    }

    pub fn len(&self) -> usize {
        self.partitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.partitions.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.partitions.iter().map(|p| p.name.as_str()).collect()
    }

    /// dclone arguments, in table order.
    pub fn pargs(&self) -> Vec<String> {
        self.partitions.iter().map(PartitionEntry::to_parg).collect()
    }

    /// Insert the subsystem partitions into this snapshot.
    ///
    /// System partitions go first, ahead of every existing partition but the
    /// last; storage partitions go right before the last one (`data` by
    /// platform convention). If that exceeds the hardware limit, secondary
    /// A/B slots are dropped; if it still does, that's fatal.
    pub fn with_subsystems(
        &self,
        subsystems: &[SubsystemSizes],
        policy: &TablePolicy,
    ) -> Result<PartitionTable> {
        let (last, rest) = self.partitions.split_last().ok_or_else(|| {
            ComposeError::InvalidSnapshot("snapshot has no partitions".to_string())
        })?;

        let mut systems = Vec::with_capacity(subsystems.len());
        let mut storages = Vec::with_capacity(subsystems.len());
        for s in subsystems {
            systems.push(PartitionEntry::new(
                format!("{}_system", s.name),
                declared_size(s.system)?,
                MASK_SYSTEM,
            ));
            storages.push(PartitionEntry::new(
                format!("{}_storage", s.name),
                declared_size(s.storage)?,
                MASK_DATA,
            ));
        }

        let mut partitions = Vec::with_capacity(self.len() + 2 * subsystems.len());
        partitions.extend(systems);
        partitions.extend(rest.iter().cloned());
        partitions.extend(storages);
        partitions.push(last.clone());

        if partitions.len() > policy.max_partitions {
            let before = partitions.len();
            partitions.retain(|p| !p.name.ends_with(&policy.secondary_suffix));
            eprintln!("{}", slot_drop_warning(before, before - partitions.len(), policy));
            if partitions.len() > policy.max_partitions {
                return Err(ComposeError::TooManyPartitions {
                    count: partitions.len(),
                    limit: policy.max_partitions,
                    suffix: policy.secondary_suffix.clone(),
                }
                .into());
            }
        }

        Ok(PartitionTable { partitions })
    }
}

/// Warning printed to stderr when secondary slots are dropped.
fn slot_drop_warning(count: usize, dropped: usize, policy: &TablePolicy) -> String {
    format!(
        "  [WARN] {} partitions exceed the limit of {}, dropped {} '{}' slot(s)",
        count, policy.max_partitions, dropped, policy.secondary_suffix
    )
}

fn declared_size(size: u64) -> Result<i64> {
    i64::try_from(size)
        .map_err(|_| ComposeError::InvalidSize(format!("{}B", size)).into())
}
