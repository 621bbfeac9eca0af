//! CLI argument parsing for miglock.
//!
//! Uses clap derive macros for declarative argument definitions.
//! This module defines the command structure; actual implementations
//! are in the `commands` module.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Miglock: a distributed lock that keeps database migrations from running
/// concurrently across deploy instances.
///
/// All instances sharing a store and namespace compete for the same lock;
/// at most one of them runs migrations at a time.
#[derive(Parser, Debug)]
#[command(name = "miglock")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Flags accepted by every command.
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Path to the config file (default: ./miglock.yaml if present).
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Owner id of this instance.
    ///
    /// Falls back to MIGLOCK_OWNER_ID, then to a generated
    /// `user@host:pid:epoch_ms`.
    #[arg(long, global = true, value_name = "ID")]
    pub owner: Option<String>,
}

/// Available commands for miglock.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show who holds the migration lock.
    ///
    /// Prints `unlocked` when the lock is free or has expired.
    #[command(name = "lock:status")]
    LockStatus(LockStatusArgs),

    /// Release the migration lock.
    ///
    /// Without --force this only releases a lock held by --owner (or
    /// MIGLOCK_OWNER_ID), and one of them is required. With --force any lock
    /// is removed.
    #[command(name = "lock:release")]
    LockRelease(LockReleaseArgs),

    /// Run a migration command while holding the lock.
    ///
    /// Uses `run.command` from the config when no command is given.
    Run(RunArgs),
}

/// Arguments for the `lock:status` command.
#[derive(Parser, Debug)]
pub struct LockStatusArgs {
    /// Print the status as JSON (`null` when unlocked).
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `lock:release` command.
#[derive(Parser, Debug)]
pub struct LockReleaseArgs {
    /// Remove the lock regardless of who holds it.
    #[arg(long)]
    pub force: bool,
}

/// Arguments for the `run` command.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Migration command and its arguments (after `--`).
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, value_name = "COMMAND")]
    pub command: Vec<String>,
}

impl Cli {
    /// Parse command line arguments.
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
