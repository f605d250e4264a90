//! Watch loop
//!
//! Re-runs the orchestrator on every trigger. Each run is awaited before the
//! next trigger is taken, so triggers that arrive mid-run queue up instead of
//! overlapping. A failed run is reported and the loop goes on, unless its
//! error kind is fatal to the whole session.

use crate::orchestrator::{SyncError, SyncOrchestrator, SyncReport};
use async_trait::async_trait;
use std::future::Future;
use tracing::{debug, info};
use upload_client::Transport;
use watcher::TriggerWatcher;

/// Source of "run again" signals
#[async_trait]
pub trait Triggers: Send {
    /// Next trigger; `None` when no more will come
    async fn next_trigger(&mut self) -> Option<()>;
}

#[async_trait]
impl Triggers for TriggerWatcher {
    async fn next_trigger(&mut self) -> Option<()> {
        self.next().await
    }
}

/// Run until `shutdown` resolves or the trigger source ends
///
/// `on_run` sees the result of every run. Returns the number of runs, or the
/// first error whose policy ends the session.
pub async fn watch_loop<T, S, F>(
    orchestrator: &SyncOrchestrator<T>,
    triggers: &mut S,
    shutdown: F,
    mut on_run: impl FnMut(&Result<SyncReport, SyncError>),
) -> Result<usize, SyncError>
where
    T: Transport,
    S: Triggers,
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    let mut runs = 0;

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Stopping watch");
                break;
            }
            trigger = triggers.next_trigger() => {
                if trigger.is_none() {
                    debug!("Trigger source closed");
                    break;
                }
                let result = orchestrator.run_once().await;
                runs += 1;
                on_run(&result);

                if let Err(err) = result {
                    let kind = err.kind();
                    kind.log(&err);
                    if !kind.policy().continues_session() {
                        return Err(err);
                    }
                }
            }
        }
    }

    Ok(runs)
}
