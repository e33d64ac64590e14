use clap::{Parser, Subcommand};
use std::path::PathBuf;

use layersnap::{CaptureMode, Operation};

/// Snapshots of tracked configuration directories (overlayfs + mirror rollback)
#[derive(Parser, Debug)]
#[command(
    name = "layersnap",
    version,
    about = "Overlay snapshots and rollback for tracked configuration directories",
    arg_required_else_help = true
)]
pub struct Cli {
    /// Storage root (overrides LAYERSNAP_ROOT)
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    /// Tracked directories, colon separated (overrides LAYERSNAP_TRACKED_DIRS)
    #[arg(long, global = true)]
    pub tracked: Option<String>,

    /// Capture backend: overlay | copy (overrides LAYERSNAP_CAPTURE)
    #[arg(long, global = true)]
    pub capture: Option<CaptureMode>,

    /// Fail instead of waiting when another layersnap holds the store lock
    #[arg(long, global = true, default_value_t = false)]
    pub no_wait: bool,

    #[command(subcommand)]
    pub cmd: Cmd,
}

#[derive(Subcommand, Debug)]
pub enum Cmd {
    /// Capture every tracked directory into a new snapshot
    ///
    /// Пример:
    ///   layersnap create pre-upgrade
    ///   layersnap create            (name: snapshot_YYYYmmdd_HHMMSS)
    Create {
        /// Snapshot name; must not exist yet
        name: Option<String>,
    },
    /// List snapshots (oldest first)
    List {
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Print one snapshot's metadata and captured layers
    Show {
        name: String,
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Delete one snapshot (metadata + captured layers)
    Delete { name: String },
    /// Mirror a snapshot back onto the live directories (destructive)
    ///
    /// Примеры:
    ///   layersnap rollback pre-upgrade
    ///   layersnap rollback pre-upgrade --component=etc
    Rollback {
        name: String,
        /// Restrict to one tracked directory (basename or path)
        #[arg(long)]
        component: Option<String>,
    },
    /// Keep the N newest snapshots and delete the rest (default: LAYERSNAP_KEEP)
    Cleanup {
        #[arg(allow_negative_numbers = true)]
        keep: Option<i64>,
    },
    /// Print configuration, snapshot count and leftover mounts
    Status {
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    #[command(external_subcommand)]
    External(Vec<String>),
}

impl Cmd {
    /// Map onto the library's closed operation set; second value is --json.
    pub fn into_operation(self) -> (Operation, bool) {
        match self {
            Cmd::Create { name } => (Operation::Create { name }, false),
            Cmd::List { json } => (Operation::List, json),
            Cmd::Show { name, json } => (Operation::Show { name }, json),
            Cmd::Delete { name } => (Operation::Delete { name }, false),
            Cmd::Rollback { name, component } => (Operation::Rollback { name, component }, false),
            Cmd::Cleanup { keep } => (Operation::Cleanup { keep }, false),
            Cmd::Status { json } => (Operation::Status, json),
            Cmd::External(args) => (
                Operation::Unrecognized {
                    command: args.into_iter().next().unwrap_or_default(),
                },
                false,
            ),
        }
    }
}

impl Cli {
    pub fn parse() -> Self {
        <Cli as Parser>::parse()
    }
}
