//! Byte-size literals and megabyte rounding.

use crate::error::ComposeError;
use anyhow::Result;

/// One mebibyte, the granularity of every partition this tool creates.
pub const MIB: u64 = 0x100000;

/// Round up to the next whole megabyte. Never rounds down; a size with no
/// whole megabyte above it in `u64` is an [`ComposeError::InvalidSize`].
pub fn upper_megabyte(size: u64) -> Result<u64> {
    size.div_ceil(MIB)
        .checked_mul(MIB)
        .ok_or_else(|| ComposeError::InvalidSize(format!("{}B", size)).into())
}

/// Parse `<integer><suffix>` where the suffix is one of `B`, `K`, `M`, `G`.
pub fn parse_size(literal: &str) -> Result<u64> {
    let invalid = || ComposeError::InvalidSize(literal.to_string());

    let suffix = literal.chars().last().ok_or_else(invalid)?;
    let multiplier: u64 = match suffix {
        'B' => 1,
        'K' => 0x400,
        'M' => MIB,
        'G' => 0x40000000,
        _ => return Err(invalid().into()),
    };
    let number: u64 = literal[..literal.len() - 1]
        .parse()
        .map_err(|_| invalid())?;
    number
        .checked_mul(multiplier)
        .ok_or_else(|| invalid().into())
}

/// How the system partition of a subsystem is sized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemSize {
    /// Use exactly this many bytes as the first candidate.
    Fixed(u64),
    /// Staged content size plus filesystem slack plus this extra margin.
    Dynamic { margin: u64 },
}

impl SystemSize {
    /// Parse a `--*-system` value. A leading `+` selects dynamic sizing with
    /// the remainder as extra margin; no value at all means `+0M`.
    pub fn parse(literal: Option<&str>) -> Result<Self> {
        match literal {
            None => Ok(SystemSize::Dynamic { margin: 0 }),
            Some(s) => match s.strip_prefix('+') {
                Some(margin) => Ok(SystemSize::Dynamic {
                    margin: parse_size(margin)?,
                }),
                None => Ok(SystemSize::Fixed(parse_size(s)?)),
            },
        }
    }

    /// First candidate size for the FAT32 sizing loop.
    pub fn minimum(&self, content_len: u64, slack: u64) -> Result<u64> {
        match *self {
            SystemSize::Fixed(size) => Ok(size),
            SystemSize::Dynamic { margin } => upper_megabyte(content_len)?
                .checked_add(slack)
                .and_then(|size| size.checked_add(margin))
                .ok_or_else(|| {
                    ComposeError::InvalidSize(format!(
                        "{}B content + {}B slack + {}B margin",
                        content_len, slack, margin
                    ))
                    .into()
                }),
        }
    }
}
