//! Recovery boot image cmdline patching.
//!
//! The recovery partition is an Android boot image. Its kernel cmdline is a
//! fixed 512-byte NUL-padded field at offset 0x40 of the header, and may
//! name the root device by partition number. Inserting the subsystem
//! system/storage partitions ahead of `data` moves that partition by two.

use anyhow::{Context, Result};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::error::ComposeError;

pub const BOOT_MAGIC: [u8; 8] = *b"ANDROID!";
pub const CMDLINE_OFFSET: u64 = 0x40;
pub const CMDLINE_SIZE: usize = 0x200;

const ROOT_PREFIX: &str = "root=/dev/mmcblk0p";

/// Partitions inserted ahead of the root device (one system, one storage).
pub const INSERTED_PARTITIONS: u32 = 2;

/// Renumber `root=/dev/mmcblk0pN` tokens and repad the field to 512 bytes.
pub fn patch_cmdline(field: &[u8]) -> Result<Vec<u8>> {
    let end = field.iter().rposition(|b| *b != 0).map_or(0, |i| i + 1);
    let cmdline = field[..end].trim_ascii();

    let tokens: Vec<Vec<u8>> = cmdline
        .split(|b| *b == b' ')
        .filter(|token| !token.is_empty())
        .map(patch_token)
        .collect();

    let mut patched = tokens.join(&b' ');
    if patched.len() > CMDLINE_SIZE {
        return Err(ComposeError::WriteLengthMismatch {
            written: patched.len(),
            expected: CMDLINE_SIZE,
        }
        .into());
    }
    patched.resize(CMDLINE_SIZE, 0);
    Ok(patched)
}

fn patch_token(token: &[u8]) -> Vec<u8> {
    let renumbered = std::str::from_utf8(token)
        .ok()
        .and_then(|t| t.strip_prefix(ROOT_PREFIX))
        .filter(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
        .and_then(|n| n.parse::<u32>().ok())
        .and_then(|n| n.checked_add(INSERTED_PARTITIONS))
        .map(|n| format!("{}{}", ROOT_PREFIX, n));

    match renumbered {
        Some(t) => t.into_bytes(),
        None => token.to_vec(),
    }
}

/// Patch `recovery.PARTITION` in place. A missing file or one without the
/// Android boot magic is left alone; returns whether anything was written.
pub fn patch_recovery(recovery: &Path) -> Result<bool> {
    if !recovery.exists() {
        tracing::debug!("{} not present, nothing to patch", recovery.display());
        return Ok(false);
    }

    let mut field = vec![0u8; CMDLINE_SIZE];
    {
        let mut f = File::open(recovery)
            .with_context(|| format!("Failed to open {}", recovery.display()))?;
        let mut magic = [0u8; 8];
        if f.read_exact(&mut magic).is_err() || magic != BOOT_MAGIC {
            tracing::debug!("{} is not an Android boot image", recovery.display());
            return Ok(false);
        }
        f.seek(SeekFrom::Start(CMDLINE_OFFSET))?;
        f.read_exact(&mut field)
            .with_context(|| format!("{}: truncated boot header", recovery.display()))?;
    }

    let patched = patch_cmdline(&field)?;

    let mut f = OpenOptions::new()
        .write(true)
        .open(recovery)
        .with_context(|| format!("Failed to open {} for writing", recovery.display()))?;
    f.seek(SeekFrom::Start(CMDLINE_OFFSET))?;
    let written = f.write(&patched)?;
    if written != CMDLINE_SIZE {
        return Err(ComposeError::WriteLengthMismatch {
            written,
            expected: CMDLINE_SIZE,
        }
        .into());
    }
    f.flush()?;

    let len = patched.iter().position(|b| *b == 0).unwrap_or(CMDLINE_SIZE);
    println!(
        "  Patched recovery cmdline: {}",
        String::from_utf8_lossy(&patched[..len])
    );
    Ok(true)
}
