//! External tools the pipeline delegates to.
//!
//! Filesystem creation, sparse encoding, script compilation, partition table
//! encoding and the burning image container are all done by host
//! executables. [`HostTools`] is the seam between the pipeline and those
//! executables; [`ExternalTools`] is the real implementation.

use anyhow::Result;
use std::path::{Path, PathBuf};

use crate::config::ToolNames;
use crate::process::Cmd;

pub trait HostTools {
    /// `ampack unpack <image> <dir>`
    fn unpack(&self, image: &Path, dir: &Path) -> Result<()>;

    /// `ampack pack [--out-align N] <dir> <output>`
    fn pack(&self, dir: &Path, output: &Path, out_align: Option<u32>) -> Result<()>;

    /// `ampart --mode dsnapshot <dtb>`, returning stdout.
    fn snapshot(&self, dtb: &Path) -> Result<String>;

    /// `ampart --mode dclone <dtb> <parg>...`
    fn clone_table(&self, dtb: &Path, pargs: &[String]) -> Result<()>;

    /// Compile raw script text into a U-Boot script image.
    fn compile_script(&self, raw: &Path, output: &Path) -> Result<()>;

    /// Format `image` as FAT32. `Ok(false)` when the formatter exits nonzero.
    fn format_fat32(&self, image: &Path, label: &str) -> Result<bool>;

    /// Copy `sources` (files or directories) into the root of a FAT image.
    /// `Ok(false)` when the copy does not complete, usually for lack of space.
    fn copy_into_fat(&self, image: &Path, sources: &[PathBuf]) -> Result<bool>;

    /// Format `image` as ext4 with no reserved blocks.
    fn format_ext4(&self, image: &Path, label: &str) -> Result<()>;

    /// Convert a raw filesystem image into an Android sparse image.
    fn sparse_convert(&self, raw: &Path, output: &Path) -> Result<()>;
}

/// Runs the real host executables named in [`ToolNames`].
#[derive(Debug, Clone, Default)]
pub struct ExternalTools {
    names: ToolNames,
}

impl ExternalTools {
    pub fn new(names: ToolNames) -> Self {
        Self { names }
    }
}

impl HostTools for ExternalTools {
    fn unpack(&self, image: &Path, dir: &Path) -> Result<()> {
        Cmd::new(&self.names.ampack)
            .arg("unpack")
            .arg_path(image)
            .arg_path(dir)
            .run()?;
        Ok(())
    }

    fn pack(&self, dir: &Path, output: &Path, out_align: Option<u32>) -> Result<()> {
        let mut cmd = Cmd::new(&self.names.ampack).arg("pack");
        if let Some(align) = out_align {
            let align = align.to_string();
            cmd = cmd.args(["--out-align", align.as_str()]);
        }
        cmd.arg_path(dir).arg_path(output).run()?;
        Ok(())
    }

    fn snapshot(&self, dtb: &Path) -> Result<String> {
        let result = Cmd::new(&self.names.ampart)
            .args(["--mode", "dsnapshot"])
            .arg_path(dtb)
            .run()?;
        Ok(result.stdout)
    }

    fn clone_table(&self, dtb: &Path, pargs: &[String]) -> Result<()> {
        Cmd::new(&self.names.ampart)
            .args(["--mode", "dclone"])
            .arg_path(dtb)
            .args(pargs)
            .run()?;
        Ok(())
    }

    fn compile_script(&self, raw: &Path, output: &Path) -> Result<()> {
        Cmd::new(&self.names.mkimage)
            .args(["-A", "arm64", "-O", "linux", "-T", "script", "-C", "none", "-d"])
            .arg_path(raw)
            .arg_path(output)
            .run()?;
        Ok(())
    }

    fn format_fat32(&self, image: &Path, label: &str) -> Result<bool> {
        let result = Cmd::new(&self.names.mkfs_vfat)
            .args(["-F", "32", "-n", label])
            .arg_path(image)
            .allow_fail()
            .run()?;
        Ok(result.success())
    }

    fn copy_into_fat(&self, image: &Path, sources: &[PathBuf]) -> Result<bool> {
        // -s recursive, -v verbose, -i image; "::" is the image root
        let mut cmd = Cmd::new(&self.names.mcopy).arg("-svi").arg_path(image);
        for source in sources {
            cmd = cmd.arg_path(source);
        }
        let result = cmd.arg("::").allow_fail().run()?;
        Ok(result.success())
    }

    fn format_ext4(&self, image: &Path, label: &str) -> Result<()> {
        Cmd::new(&self.names.mkfs_ext4)
            .args(["-m", "0", "-L", label])
            .arg_path(image)
            .run()?;
        Ok(())
    }

    fn sparse_convert(&self, raw: &Path, output: &Path) -> Result<()> {
        Cmd::new(&self.names.img2simg)
            .arg_path(raw)
            .arg_path(output)
            .run()?;
        Ok(())
    }
}
