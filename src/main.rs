//! hepack - HybridELEC firmware image composer.
//!
//! Embeds CoreELEC and/or EmuELEC into an Amlogic Android burning image:
//! - FAT32 `<name>_system` partition with patched cfgload and config.ini
//! - ext4 `<name>_storage` partition in Android sparse format
//! - partition table and recovery cmdline updated for the new layout

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use hepack::commands;
use hepack::commands::build::{BuildArgs, SubsystemArgs};
use hepack::config::Config;

#[derive(Parser)]
#[command(name = "hepack")]
#[command(about = "HybridELEC firmware image composer")]
#[command(
    after_help = "QUICK START:\n  hepack preflight   Check all host tools\n  hepack build --android android.img --ce-tar CoreELEC.tar --ce-dtb sc2_s905x4_4g_1gbit --ce-storage 1G --output hybrid.img"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compose a burning image embedding CoreELEC and/or EmuELEC
    #[command(
        after_help = "--android is always needed; --ce-tar embeds CoreELEC, --ee-tar embeds EmuELEC; \
                      a box-specific --keep list drops the Android system itself"
    )]
    Build {
        /// Path to base Android image, it must not contain embedded CE nor EE
        #[arg(long)]
        android: PathBuf,

        /// Path to CoreELEC upgrade tar, enables embedding CE
        #[arg(long, requires_all = ["ce_dtb", "ce_storage"])]
        ce_tar: Option<PathBuf>,
        /// Name of CoreELEC DTB without .dtb suffix, e.g. sc2_s905x4_4g_1gbit
        #[arg(long)]
        ce_dtb: Option<String>,
        /// Size of CoreELEC system partition, e.g. 200M, or +100M for free space
        /// on top of the content (default: +0M). Up to 9 more megabytes may be
        /// added while searching for a size FAT32 accepts.
        #[arg(long)]
        ce_system: Option<String>,
        /// Size of CoreELEC storage partition, e.g. 1G
        #[arg(long)]
        ce_storage: Option<String>,

        /// Path to EmuELEC upgrade tar, enables embedding EE
        #[arg(long, requires_all = ["ee_dtb", "ee_storage"])]
        ee_tar: Option<PathBuf>,
        /// Name of EmuELEC DTB without .dtb suffix
        #[arg(long)]
        ee_dtb: Option<String>,
        /// Size of EmuELEC system partition, e.g. 2G or +100M (default: +0M)
        #[arg(long)]
        ee_system: Option<String>,
        /// Size of EmuELEC storage partition, e.g. 1G
        #[arg(long)]
        ee_storage: Option<String>,

        /// Partition files to keep from the Android image, e.g. UBOOT.USB UBOOT.ENC
        #[arg(long, num_args = 1..)]
        keep: Option<Vec<String>>,

        /// Building folder, removed if it already exists (default: HEPACK_BUILDING or ./building)
        #[arg(long)]
        building: Option<PathBuf>,

        /// Path to output image
        #[arg(long)]
        output: PathBuf,
    },

    /// Verify an upgrade tar and list its members
    Inspect {
        /// Path to the upgrade tar
        tar: PathBuf,
        /// Name of the DTB to look for, without .dtb suffix
        #[arg(long)]
        dtb: String,
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run preflight checks (verify all host tools before build)
    Preflight {
        /// Fail if any checks fail (exit code 1)
        #[arg(long)]
        strict: bool,
    },

    /// Show information
    Show {
        #[command(subcommand)]
        what: ShowTarget,
    },
}

#[derive(Subcommand)]
enum ShowTarget {
    /// Show current configuration
    Config,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let base_dir = std::env::current_dir()?;
    let config = Config::load(&base_dir)?;

    match cli.command {
        Commands::Build {
            android,
            ce_tar,
            ce_dtb,
            ce_system,
            ce_storage,
            ee_tar,
            ee_dtb,
            ee_system,
            ee_storage,
            keep,
            building,
            output,
        } => {
            let args = BuildArgs {
                android,
                output,
                building,
                keep,
                ce: SubsystemArgs {
                    tar: ce_tar,
                    dtb: ce_dtb,
                    system: ce_system,
                    storage: ce_storage,
                },
                ee: SubsystemArgs {
                    tar: ee_tar,
                    dtb: ee_dtb,
                    system: ee_system,
                    storage: ee_storage,
                },
            };
            commands::cmd_build(args, &config)?;
        }

        Commands::Inspect { tar, dtb, json } => {
            commands::cmd_inspect(&tar, &dtb, json)?;
        }

        Commands::Preflight { strict } => {
            commands::cmd_preflight(&config, strict)?;
        }

        Commands::Show { what } => {
            let show_target = match what {
                ShowTarget::Config => commands::show::ShowTarget::Config,
            };
            commands::cmd_show(show_target, &config)?;
        }
    }

    Ok(())
}
