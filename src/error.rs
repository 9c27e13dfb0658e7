//! Typed failure kinds for the composition pipeline.
//!
//! Operations return `anyhow::Result` and raise these through `?`, so the
//! kind survives in the error chain and can be recovered with
//! `err.downcast_ref::<ComposeError>()`.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ComposeError {
    /// The upgrade archive lacks a required member.
    #[error("{archive}: missing required member '{member}'")]
    MissingMember { archive: PathBuf, member: String },

    /// A checksummed member does not match its `.md5` sidecar.
    #[error("{member}: MD5 mismatch, calculated {actual} != expected {expected}")]
    IntegrityMismatch {
        member: String,
        expected: String,
        actual: String,
    },

    /// No candidate size produced a populated FAT32 image.
    #[error(
        "cannot create a FAT32 filesystem large enough for {name}_system \
         (tried {attempts} sizes from {first_mib}M to {last_mib}M)"
    )]
    CapacityExhausted {
        name: String,
        attempts: u32,
        first_mib: u64,
        last_mib: u64,
    },

    /// The recovery command line field was not written as exactly 512 bytes.
    #[error("recovery cmdline write was {written} bytes, expected {expected}")]
    WriteLengthMismatch { written: usize, expected: usize },

    /// The new table exceeds the hardware limit even without secondary slots.
    #[error("too many partitions: {count} > {limit} after dropping '{suffix}' slots")]
    TooManyPartitions {
        count: usize,
        limit: usize,
        suffix: String,
    },

    /// The base image carries an encrypted DTB partition.
    #[error(
        "image contains encrypted DTB partition {}, it's impossible to modify partition layout",
        path.display()
    )]
    EncryptedLayoutBlocker { path: PathBuf },

    /// An external tool exited nonzero.
    #[error("'{tool}' failed (exit code {code}){}", fmt_stderr(stderr))]
    ToolFailed {
        tool: String,
        code: i32,
        stderr: String,
    },

    /// A template no longer has the structure positional patching relies on.
    #[error("{template} template drifted: {reason}")]
    TemplateDrift {
        template: &'static str,
        reason: String,
    },

    #[error("invalid size literal '{0}'")]
    InvalidSize(String),

    #[error("invalid partition snapshot: {0}")]
    InvalidSnapshot(String),
}

fn fmt_stderr(stderr: &str) -> String {
    if stderr.is_empty() {
        String::new()
    } else {
        format!(":\n{}", stderr)
    }
}
