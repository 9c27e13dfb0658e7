//! Inspect command - verifies an upgrade tar without building anything.

use anyhow::Result;
use serde::Serialize;
use std::path::Path;

use crate::archive::{md5_hex, UpgradeArchive};
use crate::rewrite::cfgload::script_body;

#[derive(Debug, Serialize)]
struct MemberInfo {
    member: &'static str,
    size: usize,
    md5: String,
}

/// Open `tar`, verify KERNEL and SYSTEM, and list the members.
pub fn cmd_inspect(tar: &Path, dtb: &str, json: bool) -> Result<()> {
    let archive = UpgradeArchive::open("inspect", tar, dtb)?;
    // Surface template drift here rather than halfway through a build
    script_body(&archive.cfgload)?;

    let members = [
        ("KERNEL", &archive.kernel),
        ("SYSTEM", &archive.system),
        ("device tree", &archive.dtb),
        ("Generic_cfgload", &archive.cfgload),
        ("config.ini", &archive.config),
    ]
    .into_iter()
    .map(|(member, data)| MemberInfo {
        member,
        size: data.len(),
        md5: md5_hex(data),
    })
    .collect::<Vec<_>>();

    if json {
        println!("{}", serde_json::to_string_pretty(&members)?);
        return Ok(());
    }

    println!("{} (checksums OK)", tar.display());
    for m in &members {
        println!("  {:<16} {:>12} bytes  {}", m.member, m.size, m.md5);
    }
    Ok(())
}
