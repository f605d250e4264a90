//! Shared utilities for CLI commands

use anyhow::{Context, Result};
use cli_lib::{RestartStatus, SyncError, SyncReport, UploadOutcome};
use owo_colors::OwoColorize;
use std::path::{Path, PathBuf};
use upload_client::Endpoint;

/// Resolve the project root: `--project` or the current directory
pub fn project_root(flag: Option<&Path>) -> Result<PathBuf> {
    let root = match flag {
        Some(path) => absolute(path)?,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    if !root.is_dir() {
        anyhow::bail!("Project directory {} does not exist", root.display());
    }
    Ok(root)
}

/// Make `path` absolute against the current directory
pub fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().context("Failed to get current directory")?;
    Ok(cwd.join(path))
}

/// Print the result of one run for the operator
pub fn print_report(report: &SyncReport, endpoint: &Endpoint) {
    match report {
        SyncReport::NoChanges => {
            println!("{}", "No changes to upload".dimmed());
        }
        SyncReport::DryRun { files } => {
            println!("{}", format!("Would upload {}", plural(files.len(), "file")).bold());
            for file in files {
                println!("  {}", file.display().to_string().cyan());
            }
        }
        SyncReport::Uploaded(outcome) => print_outcome(outcome, endpoint),
    }
}

fn print_outcome(outcome: &UploadOutcome, endpoint: &Endpoint) {
    if outcome.is_success() {
        println!(
            "{} Uploaded {} to {}",
            "✓".green(),
            plural(outcome.files, "file"),
            endpoint.to_string().cyan()
        );
    } else {
        let status = outcome
            .status
            .map(|status| format!("status {}", status))
            .unwrap_or_else(|| "no response".to_string());
        println!(
            "{} Upload of {} to {} failed ({})",
            "✗".red(),
            plural(outcome.files, "file"),
            endpoint.to_string().cyan(),
            status
        );
        if let Some(reason) = &outcome.failure {
            println!("  {}", reason.dimmed());
        }
    }

    match outcome.restart {
        RestartStatus::Sent => println!("{} Restart requested", "✓".green()),
        RestartStatus::Suppressed => println!("{}", "Restart skipped".dimmed()),
        RestartStatus::Failed => println!("{}", "Restart request failed".yellow()),
        RestartStatus::NotRequested => {}
    }
}

/// Report an aborted run without ending the process
pub fn print_error(err: &SyncError) {
    eprintln!("{} {} error: {}", "✗".red(), err.kind(), err);
}

fn plural(count: usize, noun: &str) -> String {
    if count == 1 {
        format!("{} {}", count, noun)
    } else {
        format!("{} {}s", count, noun)
    }
}
