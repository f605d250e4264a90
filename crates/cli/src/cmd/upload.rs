//! One-shot upload

use super::{GlobalArgs, Session};
use crate::util;
use anyhow::Result;
use cli_lib::{SyncOrchestrator, SyncReport};
use upload_core::ErrorPolicy;

pub async fn run(
    global: &GlobalArgs,
    incremental: Option<Option<std::path::PathBuf>>,
    dry_run: bool,
    no_restart: bool,
) -> Result<()> {
    let session = Session::open(global)?;
    let options = session.sync_options(incremental, dry_run, no_restart)?;
    let endpoint = session.endpoint.clone();
    let orchestrator = SyncOrchestrator::new(session.client, options);

    let report = orchestrator.run_once().await.map_err(|err| {
        let kind = err.kind();
        let message = match kind.policy() {
            ErrorPolicy::FatalAtStartup => format!("Invalid configuration ({} error)", kind),
            _ => format!("Upload aborted ({} error)", kind),
        };
        anyhow::Error::new(err).context(message)
    })?;

    util::print_report(&report, &endpoint);

    // One-shot runs exit non-zero on a reported failure
    if let SyncReport::Uploaded(outcome) = &report {
        if let Some(kind) = outcome.error_kind() {
            let reason = outcome.failure.as_deref().unwrap_or("unknown error");
            anyhow::bail!("Upload failed ({} error): {}", kind, reason);
        }
    }

    Ok(())
}
