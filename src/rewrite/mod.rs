//! Boot-time configuration rewriting for an embedded subsystem.
//!
//! - `cfgload` - the U-Boot script that boots the subsystem from eMMC
//! - `config_ini` - the boot config that selects the device tree

pub mod cfgload;
pub mod config_ini;

pub use cfgload::{rewrite_cfgload, SCRIPT_HEADER_LEN};
pub use config_ini::rewrite_config;
