//! CLI command handlers.
//!
//! Each submodule handles a specific CLI command:
//! - `build` - Compose the firmware image
//! - `inspect` - Verify an upgrade tar and list its members
//! - `preflight` - Check the external tools are installed
//! - `show` - Display information

pub mod build;
pub mod inspect;
mod preflight;
pub mod show;

pub use build::cmd_build;
pub use inspect::cmd_inspect;
pub use preflight::cmd_preflight;
pub use show::cmd_show;
