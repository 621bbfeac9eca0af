//! `run`: execute the migration command under the lock.

use super::CommandContext;
use crate::cli::RunArgs;
use crate::error::{MiglockError, Result};
use std::process::Command;
use tracing::info;

pub fn cmd_run(ctx: &CommandContext, args: RunArgs) -> Result<()> {
    let argv = resolve_command(&args.command, &ctx.config.run.command)?;
    let owner_id = ctx.owner_id()?;
    let orchestrator = ctx.orchestrator()?;

    info!(owner_id = %owner_id, command = %shell_words::join(&argv), "starting migration");
    orchestrator.run_exclusive(&owner_id, || run_migration_command(&argv))?;

    println!("Migration completed.");
    Ok(())
}

/// The argv to run: the CLI's trailing args, or `run.command` from config.
///
/// The configured command is split with shell-words; no shell is involved.
pub(super) fn resolve_command(cli_args: &[String], configured: &str) -> Result<Vec<String>> {
    if !cli_args.is_empty() {
        return Ok(cli_args.to_vec());
    }

    let argv = shell_words::split(configured).map_err(|e| {
        MiglockError::UserError(format!(
            "failed to parse run.command '{}': {}\n\n\
             Fix: check for unmatched quotes or invalid escape sequences in run.command.",
            configured, e
        ))
    })?;

    if argv.is_empty() {
        return Err(MiglockError::UserError(
            "no migration command given.\n\n\
             Fix: pass one after `--` (miglock run -- <command>) or set run.command in miglock.yaml."
                .to_string(),
        ));
    }

    Ok(argv)
}

/// Run `argv` with inherited stdio; a non-zero exit fails the migration.
pub(super) fn run_migration_command(argv: &[String]) -> Result<()> {
    let Some((program, args)) = argv.split_first() else {
        return Err(MiglockError::UserError("migration command is empty".to_string()));
    };

    let status = Command::new(program).args(args).status().map_err(|e| {
        MiglockError::MigrationFailed(format!(
            "failed to execute '{}': {}\n\n\
             Fix: ensure the command is installed and in PATH.",
            program, e
        ))
    })?;

    if !status.success() {
        let code = status
            .code()
            .map(|c| c.to_string())
            .unwrap_or_else(|| "signal".to_string());
        return Err(MiglockError::MigrationFailed(format!(
            "'{}' exited with status {}",
            shell_words::join(argv),
            code
        )));
    }

    Ok(())
}
