//! Shared test utilities for hepack tests.
//!
//! Upgrade tars and recovery images are synthesized in temp dirs, and the
//! host executables are replaced by [`FakeTools`].

#![allow(dead_code)]

use anyhow::{bail, Result};
use md5::{Digest, Md5};
use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use hepack::tools::HostTools;

pub const MIB: u64 = 0x100000;

/// Snapshot of a small Amlogic table, decimal form first as ampart prints it.
pub const SNAPSHOT: &str = "bootloader::4194304:0 reserved::67108864:0 env::8388608:0 \
    recovery::25165824:1 system::1610612736:1 data::-1:4\n\
    bootloader::0x400000:0 reserved::0x4000000:0 env::0x800000:0\n";

/// Test environment rooted in a temporary directory.
pub struct TestEnv {
    /// Temporary directory (kept alive for lifetime of TestEnv)
    pub _temp_dir: TempDir,
    pub base_dir: PathBuf,
    /// Building directory handed to the pipeline
    pub building: PathBuf,
}

impl TestEnv {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let base_dir = temp_dir.path().to_path_buf();
        Self {
            building: base_dir.join("building"),
            base_dir,
            _temp_dir: temp_dir,
        }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.base_dir.join(name)
    }
}

/// Contents of a synthetic upgrade tar.
#[derive(Debug, Clone)]
pub struct UpgradeTar {
    pub top: String,
    pub dtb_name: String,
    pub kernel: Vec<u8>,
    pub system: Vec<u8>,
    pub dtb: Vec<u8>,
    pub cfgload_script: Vec<u8>,
    pub config: Vec<u8>,
    /// Sidecar overrides; `None` writes the correct digest.
    pub kernel_md5: Option<String>,
    pub system_md5: Option<String>,
    /// Members left out of the tar, by path below the top directory.
    pub omit: Vec<String>,
}

pub const CFGLOAD_SCRIPT: &str = "\
setenv device mmc
echo \"Using device ${device}, number ${devnr}, partition ${partnr}, CoreELEC on eMMC: ${ce_on_emmc}\"
setenv rootopt \"BOOT_IMAGE=kernel.img boot=LABEL=COREELEC disk=LABEL=STORAGE\"
if test \"${ce_on_emmc}\" = \"yes\"; then setenv rootopt \"BOOT_IMAGE=kernel.img boot=LABEL=CE_FLASH disk=FOLDER=/dev/CE_STORAGE\"; fi
fatload ${device} ${devnr}:${partnr} ${dtb_mem_addr} dtb.img
bootm ${loadaddr}";

pub const CONFIG_INI: &str = "\
# CoreELEC config.ini
# do not edit

[HDMI]
hdmimode='1080p60hz'

[VIDEO]
max_freq=''";

impl UpgradeTar {
    pub fn coreelec() -> Self {
        Self {
            top: "CoreELEC-Amlogic-ng.arm-21.0".to_string(),
            dtb_name: "sc2_s905x4_4g_1gbit".to_string(),
            kernel: b"kernel image ".repeat(1000),
            system: b"squashfs system ".repeat(4000),
            dtb: vec![0xd0, 0x0d, 0xfe, 0xed, 0, 0, 0, 0x40],
            cfgload_script: CFGLOAD_SCRIPT.as_bytes().to_vec(),
            config: CONFIG_INI.as_bytes().to_vec(),
            kernel_md5: None,
            system_md5: None,
            omit: Vec::new(),
        }
    }

    pub fn emuelec() -> Self {
        Self {
            top: "EmuELEC-Amlogic-ng.aarch64-4.7".to_string(),
            dtb_name: "g12b_s922x_ugoos_am6".to_string(),
            ..Self::coreelec()
        }
    }

    /// `Generic_cfgload` as shipped: a legacy image header before the text.
    pub fn cfgload(&self) -> Vec<u8> {
        compiled_script(&self.cfgload_script)
    }

    /// Write the tar to `path`.
    pub fn write(&self, path: &Path) {
        let file = fs::File::create(path).expect("Failed to create tar");
        let mut builder = tar::Builder::new(file);

        let kernel_md5 = self
            .kernel_md5
            .clone()
            .unwrap_or_else(|| format!("{}  target/KERNEL\n", md5_hex(&self.kernel)));
        let system_md5 = self
            .system_md5
            .clone()
            .unwrap_or_else(|| format!("{}  target/SYSTEM\n", md5_hex(&self.system)));

        for dir in ["", "target", "3rdparty", "3rdparty/bootloader", "3rdparty/bootloader/device_trees"] {
            let mut header = tar::Header::new_gnu();
            header.set_entry_type(tar::EntryType::Directory);
            header.set_mode(0o755);
            header.set_size(0);
            let path = format!("{}/{}", self.top, dir);
            builder
                .append_data(&mut header, path.trim_end_matches('/'), std::io::empty())
                .expect("Failed to append dir");
        }

        let members: Vec<(String, Vec<u8>)> = vec![
            ("target/KERNEL".into(), self.kernel.clone()),
            ("target/KERNEL.md5".into(), kernel_md5.into_bytes()),
            ("target/SYSTEM".into(), self.system.clone()),
            ("target/SYSTEM.md5".into(), system_md5.into_bytes()),
            (
                format!("3rdparty/bootloader/device_trees/{}.dtb", self.dtb_name),
                self.dtb.clone(),
            ),
            // a sibling DTB that must not be picked up
            (
                "3rdparty/bootloader/device_trees/other_board.dtb".into(),
                b"other".to_vec(),
            ),
            ("3rdparty/bootloader/Generic_cfgload".into(), self.cfgload()),
            ("3rdparty/bootloader/config.ini".into(), self.config.clone()),
        ];

        for (name, data) in members {
            if self.omit.contains(&name) {
                continue;
            }
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder
                .append_data(&mut header, format!("{}/{}", self.top, name), data.as_slice())
                .expect("Failed to append member");
        }
        builder.finish().expect("Failed to finish tar");
    }
}

pub fn md5_hex(data: &[u8]) -> String {
    hex::encode(Md5::digest(data))
}

/// Prefix script text with a minimal legacy U-Boot image header.
pub fn compiled_script(text: &[u8]) -> Vec<u8> {
    let mut out = vec![0u8; 0x48];
    out[..4].copy_from_slice(&[0x27, 0x05, 0x19, 0x56]);
    out[0x1e] = 6; // IH_TYPE_SCRIPT
    out.extend_from_slice(text);
    out
}

/// Android boot image header with `cmdline` at 0x40, padded to `total` bytes.
pub fn recovery_image(cmdline: &str, total: usize) -> Vec<u8> {
    let mut image = vec![0u8; total];
    image[..8].copy_from_slice(b"ANDROID!");
    image[0x40..0x40 + cmdline.len()].copy_from_slice(cmdline.as_bytes());
    for (i, b) in image.iter_mut().enumerate().skip(0x240) {
        *b = (i % 251) as u8;
    }
    image
}

/// Read the NUL-terminated cmdline back out of a boot image.
pub fn read_cmdline(image: &[u8]) -> String {
    let field = &image[0x40..0x240];
    let len = field.iter().position(|b| *b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..len]).into_owned()
}

/// In-process stand-in for the host tools.
///
/// `fat_capacity` is the smallest FAT image (in bytes) that `copy_into_fat`
/// will fill successfully; `None` makes every copy fail.
pub struct FakeTools {
    /// Partition files `unpack` lays out, by name.
    pub image_files: Vec<(String, Vec<u8>)>,
    pub snapshot: String,
    pub fat_capacity: Option<u64>,
    /// Sizes below this are rejected by the FAT formatter.
    pub fat_format_floor: u64,
    pub calls: RefCell<Vec<String>>,
    pub cloned: RefCell<Vec<String>>,
    /// Image sizes seen by `copy_into_fat`, in order.
    pub fat_attempts: RefCell<Vec<u64>>,
}

impl FakeTools {
    pub fn new() -> Self {
        Self {
            image_files: vec![
                ("meson1.dtb".into(), b"dtb with table".to_vec()),
                ("boot.PARTITION".into(), b"boot".to_vec()),
                ("system.PARTITION".into(), b"system".to_vec()),
                (
                    "recovery.PARTITION".into(),
                    recovery_image("console=ttyS0 root=/dev/mmcblk0p3 rootwait", 0x1000),
                ),
                ("UBOOT.USB".into(), b"uboot".to_vec()),
            ],
            snapshot: SNAPSHOT.to_string(),
            fat_capacity: Some(0),
            fat_format_floor: 0,
            calls: RefCell::new(Vec::new()),
            cloned: RefCell::new(Vec::new()),
            fat_attempts: RefCell::new(Vec::new()),
        }
    }

    pub fn with_file(mut self, name: &str, data: &[u8]) -> Self {
        self.image_files.push((name.to_string(), data.to_vec()));
        self
    }

    pub fn called(&self, tool: &str) -> bool {
        self.calls.borrow().iter().any(|c| c.starts_with(tool))
    }

    fn record(&self, call: String) {
        self.calls.borrow_mut().push(call);
    }
}

impl HostTools for FakeTools {
    fn unpack(&self, image: &Path, dir: &Path) -> Result<()> {
        self.record(format!("unpack {}", image.display()));
        if !image.exists() {
            bail!("{} does not exist", image.display());
        }
        fs::create_dir_all(dir)?;
        for (name, data) in &self.image_files {
            fs::write(dir.join(name), data)?;
        }
        Ok(())
    }

    fn pack(&self, dir: &Path, output: &Path, out_align: Option<u32>) -> Result<()> {
        self.record(format!("pack {:?}", out_align));
        let mut names: Vec<String> = fs::read_dir(dir)?
            .map(|e| e.map(|e| e.file_name().to_string_lossy().into_owned()))
            .collect::<std::io::Result<_>>()?;
        names.sort();
        fs::write(output, names.join("\n"))?;
        Ok(())
    }

    fn snapshot(&self, _dtb: &Path) -> Result<String> {
        self.record("snapshot".into());
        Ok(self.snapshot.clone())
    }

    fn clone_table(&self, dtb: &Path, pargs: &[String]) -> Result<()> {
        self.record("clone".into());
        *self.cloned.borrow_mut() = pargs.to_vec();
        fs::write(dtb, pargs.join(" "))?;
        Ok(())
    }

    fn compile_script(&self, raw: &Path, output: &Path) -> Result<()> {
        self.record("mkimage".into());
        let text = fs::read(raw)?;
        fs::write(output, compiled_script(&text))?;
        Ok(())
    }

    fn format_fat32(&self, image: &Path, label: &str) -> Result<bool> {
        self.record(format!("mkfs.vfat {}", label));
        Ok(fs::metadata(image)?.len() >= self.fat_format_floor)
    }

    fn copy_into_fat(&self, image: &Path, sources: &[PathBuf]) -> Result<bool> {
        self.record("mcopy".into());
        let size = fs::metadata(image)?.len();
        self.fat_attempts.borrow_mut().push(size);
        for source in sources {
            if !source.exists() {
                bail!("{} missing", source.display());
            }
        }
        Ok(self.fat_capacity.is_some_and(|capacity| size >= capacity))
    }

    fn format_ext4(&self, image: &Path, label: &str) -> Result<()> {
        self.record(format!("mkfs.ext4 {}", label));
        if !image.exists() {
            bail!("{} missing", image.display());
        }
        Ok(())
    }

    fn sparse_convert(&self, raw: &Path, output: &Path) -> Result<()> {
        self.record("img2simg".into());
        let len = fs::metadata(raw)?.len();
        fs::write(output, format!("sparse {}", len))?;
        Ok(())
    }
}
