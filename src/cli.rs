//! CLI argument parsing with clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "gateway-adblock")]
#[command(author, version, about = "Sync ad-blocking lists into Cloudflare Gateway")]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file path
    #[arg(
        short,
        long,
        default_value = "/etc/gateway-adblock/config.yaml",
        global = true
    )]
    pub config: PathBuf,

    /// Quiet mode (for cron/systemd timer)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose mode (debug output)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Download, aggregate and sync lists to Cloudflare Gateway
    Sync {
        /// Only sync this group (default: all configured groups)
        #[arg(short, long)]
        group: Option<String>,

        /// Compute the lists and show what would change without writing
        #[arg(long)]
        dry_run: bool,
    },

    /// Remove a group's lists and policy from Cloudflare Gateway
    Delete {
        /// Group to remove (need not be in the config any more)
        #[arg(short, long)]
        group: String,
    },

    /// Show remote lists and policies per group
    Status {
        /// Only show this group
        #[arg(short, long)]
        group: Option<String>,
    },

    /// Write a sample configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Show version
    Version,
}
