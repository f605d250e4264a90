//! Watch sessions driven by a trigger file

use crate::app_upload;
use crate::common::{write_file, MockDevice};
use anyhow::Result;
use axum::http::StatusCode;
use std::process::Child;
use std::time::{Duration, Instant};
use tempfile::TempDir;

/// Kills the session when the test ends, pass or fail
struct Session(Child);

impl Drop for Session {
    fn drop(&mut self) {
        let _ = self.0.kill();
        let _ = self.0.wait();
    }
}

async fn wait_until(timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if done() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    done()
}

#[tokio::test(flavor = "multi_thread")]
async fn test_trigger_change_uploads_project() -> Result<()> {
    let device = MockDevice::start(StatusCode::OK).await;
    let dir = TempDir::new()?;
    write_file(dir.path(), "app.js", "module.exports = {};");
    let trigger = dir.path().join("trigger");

    let watch = app_upload!(dir.path(), "watch", "trigger", "--url", &device.url).spawn()?;
    let _session = Session(watch);

    // The session touches the trigger itself; that first event must not upload.
    assert!(wait_until(Duration::from_secs(10), || trigger.exists()).await);
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(device.uploads().is_empty());

    std::fs::write(&trigger, "go")?;

    assert!(wait_until(Duration::from_secs(10), || device.restarts() == 1).await);
    assert_eq!(device.uploads(), vec![vec!["app.js"]]);
    assert_eq!(device.requests(), vec!["/app-upload", "/restart"]);
    Ok(())
}
