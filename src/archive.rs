//! CoreELEC/EmuELEC upgrade tar reader.
//!
//! An upgrade tar has a single top-level directory. The members we need sit
//! at fixed paths below it:
//!
//! ```text
//! <top>/target/KERNEL
//! <top>/target/KERNEL.md5
//! <top>/target/SYSTEM
//! <top>/target/SYSTEM.md5
//! <top>/3rdparty/bootloader/device_trees/<dtb>.dtb
//! <top>/3rdparty/bootloader/Generic_cfgload
//! <top>/3rdparty/bootloader/config.ini
//! ```
//!
//! `KERNEL` and `SYSTEM` are verified against the first 32 hex characters of
//! their `.md5` sidecars before an [`UpgradeArchive`] is handed out.

use anyhow::{Context, Result};
use md5::{Digest, Md5};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use crate::error::ComposeError;

/// Verified contents of one upgrade tar, fully read into memory.
#[derive(Debug, Clone)]
pub struct UpgradeArchive {
    /// Where the tar was read from.
    pub path: PathBuf,
    /// Subsystem name tag, e.g. `ce` or `ee`.
    pub name: String,
    /// Device tree selector, the DTB file name without `.dtb`.
    pub dtb_name: String,
    pub kernel: Vec<u8>,
    pub system: Vec<u8>,
    pub dtb: Vec<u8>,
    /// Boot script template, still carrying its 72-byte image header.
    pub cfgload: Vec<u8>,
    pub config: Vec<u8>,
}

/// Relative member paths below the archive's top-level directory.
struct MemberPaths {
    kernel: String,
    kernel_md5: String,
    system: String,
    system_md5: String,
    dtb: String,
    cfgload: String,
    config: String,
}

impl MemberPaths {
    fn new(top: &str, dtb_name: &str) -> Self {
        let target = format!("{}/target", top);
        let bootloader = format!("{}/3rdparty/bootloader", top);
        Self {
            kernel: format!("{}/KERNEL", target),
            kernel_md5: format!("{}/KERNEL.md5", target),
            system: format!("{}/SYSTEM", target),
            system_md5: format!("{}/SYSTEM.md5", target),
            dtb: format!("{}/device_trees/{}.dtb", bootloader, dtb_name),
            cfgload: format!("{}/Generic_cfgload", bootloader),
            config: format!("{}/config.ini", bootloader),
        }
    }

    fn all(&self) -> [&str; 7] {
        [
            &self.kernel,
            &self.kernel_md5,
            &self.system,
            &self.system_md5,
            &self.dtb,
            &self.cfgload,
            &self.config,
        ]
    }
}

impl UpgradeArchive {
    /// Open and verify an upgrade tar.
    ///
    /// Fails with [`ComposeError::MissingMember`] if any required member is
    /// absent and [`ComposeError::IntegrityMismatch`] if `KERNEL` or `SYSTEM`
    /// does not match its sidecar. Nothing partially read is returned.
    pub fn open(name: &str, path: &Path, dtb_name: &str) -> Result<Self> {
        let file =
            File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
        let mut tar = tar::Archive::new(BufReader::new(file));

        let mut top: Option<String> = None;
        let mut wanted: Option<MemberPaths> = None;
        let mut members: HashMap<String, Vec<u8>> = HashMap::new();

        for entry in tar
            .entries()
            .with_context(|| format!("Failed to read tar {}", path.display()))?
        {
            let mut entry =
                entry.with_context(|| format!("Corrupt tar entry in {}", path.display()))?;
            let member = entry.path()?.to_string_lossy().trim_end_matches('/').to_string();

            // The first member names the top-level directory.
            let paths = wanted.get_or_insert_with(|| {
                let prefix = member.split('/').next().unwrap_or_default().to_string();
                let paths = MemberPaths::new(&prefix, dtb_name);
                top = Some(prefix);
                paths
            });

            if paths.all().contains(&member.as_str()) {
                let mut data = Vec::with_capacity(entry.size() as usize);
                entry
                    .read_to_end(&mut data)
                    .with_context(|| format!("Failed to read {} from {}", member, path.display()))?;
                members.insert(member, data);
            }
        }

        let paths = wanted.unwrap_or_else(|| MemberPaths::new("", dtb_name));
        tracing::debug!(
            "{}: top-level directory '{}'",
            path.display(),
            top.as_deref().unwrap_or_default()
        );

        let mut take = |member: &str| -> Result<Vec<u8>> {
            members.remove(member).ok_or_else(|| {
                ComposeError::MissingMember {
                    archive: path.to_path_buf(),
                    member: member.to_string(),
                }
                .into()
            })
        };

        let kernel = take(&paths.kernel)?;
        let kernel_md5 = take(&paths.kernel_md5)?;
        let system = take(&paths.system)?;
        let system_md5 = take(&paths.system_md5)?;
        let dtb = take(&paths.dtb)?;
        let cfgload = take(&paths.cfgload)?;
        let config = take(&paths.config)?;

        verify_md5(&paths.kernel, &kernel, &kernel_md5)?;
        verify_md5(&paths.system, &system, &system_md5)?;

        Ok(Self {
            path: path.to_path_buf(),
            name: name.to_string(),
            dtb_name: dtb_name.to_string(),
            kernel,
            system,
            dtb,
            cfgload,
            config,
        })
    }
}

/// Lowercase hex MD5 of `data`.
pub fn md5_hex(data: &[u8]) -> String {
    hex::encode(Md5::digest(data))
}

/// Check `data` against the digest in an `.md5` sidecar. Only the first 32
/// characters of the sidecar are significant; md5sum output carries the file
/// name after them.
pub fn verify_md5(member: &str, data: &[u8], sidecar: &[u8]) -> Result<()> {
    let expected = String::from_utf8_lossy(&sidecar[..sidecar.len().min(32)]).to_lowercase();
    let actual = md5_hex(data);
    if expected != actual {
        return Err(ComposeError::IntegrityMismatch {
            member: member.to_string(),
            expected,
            actual,
        }
        .into());
    }
    Ok(())
}
