//! `Generic_cfgload` boot script rewriting.
//!
//! The template is a compiled U-Boot script: a 64-byte legacy image header
//! plus an 8-byte script length table, followed by `\n`-separated script
//! text. The header is dropped here and regenerated by `mkimage`.

use anyhow::Result;
use std::borrow::Cow;

use crate::error::ComposeError;

/// Bytes preceding the script text in a compiled U-Boot script.
pub const SCRIPT_HEADER_LEN: usize = 0x48;

/// Legacy U-Boot image magic (`IH_MAGIC`), big-endian.
pub const UIMAGE_MAGIC: [u8; 4] = [0x27, 0x05, 0x19, 0x56];

const BANNER_PREFIX: &[u8] =
    b"echo \"Using device ${device}, number ${devnr}, partition ${partnr}, ";
const ROOTOPT_PREFIX: &[u8] = b"setenv rootopt \"BOOT_IMAGE=kernel.img boot=LABEL=";
const CE_FLASH_FALLBACK: &[u8] = b"if test \"${ce_on_emmc}\" = \"yes\"; then setenv rootopt \"BOOT_IMAGE=kernel.img boot=LABEL=CE_FLASH disk=FOLDER=/dev/CE_STORAGE\"; fi";
const DTB_LOAD_PREFIX: &[u8] = b"fatload ${device} ${devnr}:${partnr} ${dtb_mem_addr} dtb.img";
const DTB_LOAD_SELECTED: &[u8] =
    b"fatload ${device} ${devnr}:${partnr} ${dtb_mem_addr} \"device_trees/${device_tree}.dtb\"";

/// Strip the image header from a compiled script template, checking the
/// header is really there first.
pub fn script_body(template: &[u8]) -> Result<&[u8]> {
    if template.len() < SCRIPT_HEADER_LEN {
        return Err(ComposeError::TemplateDrift {
            template: "Generic_cfgload",
            reason: format!(
                "{} bytes is shorter than the {}-byte script header",
                template.len(),
                SCRIPT_HEADER_LEN
            ),
        }
        .into());
    }
    if template[..4] != UIMAGE_MAGIC {
        return Err(ComposeError::TemplateDrift {
            template: "Generic_cfgload",
            reason: format!(
                "header magic {} is not a U-Boot image",
                hex::encode(&template[..4])
            ),
        }
        .into());
    }
    Ok(&template[SCRIPT_HEADER_LEN..])
}

/// Rewrite the compiled script template for subsystem `name` (`ce`, `ee`).
///
/// Returns raw script text, ready for `mkimage -T script`. Each line gets
/// the first matching rule; unmatched lines pass through untouched.
pub fn rewrite_cfgload(template: &[u8], name: &str) -> Result<Vec<u8>> {
    let body = script_body(template)?;
    Ok(rewrite_script_lines(body, name))
}

/// Apply the line rules to header-less script text.
pub fn rewrite_script_lines(script: &[u8], name: &str) -> Vec<u8> {
    let mut lines: Vec<Cow<'_, [u8]>> = Vec::new();

    for line in script.split(|b| *b == b'\n') {
        if line.starts_with(BANNER_PREFIX) {
            let banner = format!(
                "echo \"Using device ${{device}}, number ${{devnr}}, partition ${{partnr}}, HybridELEC ({}) on eMMC\"",
                name.to_uppercase()
            );
            lines.push(Cow::Owned(banner.into_bytes()));
        } else if line.starts_with(ROOTOPT_PREFIX) {
            let rootopt = format!(
                "setenv rootopt \"BOOT_IMAGE=kernel.img boot=/dev/{0}_system disk=/dev/{0}_storage\"",
                name
            );
            lines.push(Cow::Owned(rootopt.into_bytes()));
        } else if line.starts_with(CE_FLASH_FALLBACK) {
            // The eMMC install has its own partitions; the CE_FLASH
            // override would point it back at the SD card layout.
            continue;
        } else if line.starts_with(DTB_LOAD_PREFIX) {
            lines.push(Cow::Borrowed(DTB_LOAD_SELECTED));
        } else {
            lines.push(Cow::Borrowed(line));
        }
    }

    lines.join(&b'\n')
}
