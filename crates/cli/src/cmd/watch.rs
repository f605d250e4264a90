//! Continuous upload on trigger-file changes

use super::{GlobalArgs, Session};
use crate::util;
use anyhow::{Context, Result};
use cli_lib::{watch_loop, SyncOrchestrator};
use owo_colors::OwoColorize;
use std::path::{Path, PathBuf};
use watcher::{TriggerWatcher, DEFAULT_DEBOUNCE};

pub async fn run(
    global: &GlobalArgs,
    trigger: &Path,
    incremental: Option<Option<PathBuf>>,
    no_restart: bool,
) -> Result<()> {
    let session = Session::open(global)?;
    let trigger = util::absolute(trigger)?;

    let mut options = session.sync_options(incremental, false, no_restart)?;
    options.excluded.push(trigger.clone());

    let endpoint = session.endpoint.clone();
    let orchestrator = SyncOrchestrator::new(session.client, options);

    let mut watcher = TriggerWatcher::start(&trigger, DEFAULT_DEBOUNCE)
        .with_context(|| format!("Failed to watch {}", trigger.display()))?;

    println!(
        "{} {} {}",
        "Watching".bold(),
        trigger.display().to_string().cyan(),
        "(Ctrl+C to stop)".dimmed()
    );

    let shutdown = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to listen for Ctrl+C: {}", err);
            std::future::pending::<()>().await;
        }
    };

    let runs = watch_loop(&orchestrator, &mut watcher, shutdown, |result| match result {
        Ok(report) => util::print_report(report, &endpoint),
        Err(err) => util::print_error(err),
    })
    .await
    .map_err(|err| {
        let kind = err.kind();
        anyhow::Error::new(err).context(format!("Watch stopped ({} error)", kind))
    })?;

    tracing::info!("Watch ended after {} runs", runs);
    Ok(())
}
