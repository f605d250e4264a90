//! Incremental uploads driven by the state file

use crate::app_upload;
use crate::common::{write_file, MockDevice};
use anyhow::Result;
use axum::http::StatusCode;
use filetime::{set_file_mtime, FileTime};
use tempfile::TempDir;

#[tokio::test(flavor = "multi_thread")]
async fn test_second_run_uploads_nothing() -> Result<()> {
    let device = MockDevice::start(StatusCode::OK).await;
    let dir = TempDir::new()?;
    write_file(dir.path(), "a.txt", "a");
    write_file(dir.path(), "b.txt", "b");

    app_upload!(dir.path(), "upload", "--incremental", "--url", &device.url)
        .assert_success()
        .await?;
    let second = app_upload!(dir.path(), "upload", "--incremental", "--url", &device.url)
        .assert_success()
        .await?;

    assert!(dir.path().join(".app-upload-state").exists());
    assert!(second.contains_stdout("No changes"));
    assert_eq!(device.uploads(), vec![vec!["a.txt", "b.txt"]]);
    assert_eq!(device.restarts(), 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_only_modified_file_is_sent() -> Result<()> {
    let device = MockDevice::start(StatusCode::OK).await;
    let dir = TempDir::new()?;
    write_file(dir.path(), "a.txt", "a");
    write_file(dir.path(), "b.txt", "b");

    app_upload!(dir.path(), "upload", "--incremental", "--url", &device.url)
        .assert_success()
        .await?;

    let later = FileTime::from_unix_time(FileTime::now().unix_seconds() + 60, 0);
    set_file_mtime(dir.path().join("b.txt"), later)?;

    app_upload!(dir.path(), "upload", "--incremental", "--url", &device.url)
        .assert_success()
        .await?;

    assert_eq!(device.uploads()[1], vec!["b.txt"]);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_full_upload_leaves_state_file_behind() -> Result<()> {
    let device = MockDevice::start(StatusCode::OK).await;
    let dir = TempDir::new()?;
    write_file(dir.path(), "a.txt", "a");

    app_upload!(dir.path(), "upload", "--incremental", "--url", &device.url)
        .assert_success()
        .await?;
    app_upload!(dir.path(), "upload", "--url", &device.url)
        .assert_success()
        .await?;

    assert!(dir.path().join(".app-upload-state").exists());
    assert_eq!(device.uploads(), vec![vec!["a.txt"], vec!["a.txt"]]);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_explicit_state_file_outside_project() -> Result<()> {
    let device = MockDevice::start(StatusCode::OK).await;
    let dir = TempDir::new()?;
    let state_dir = TempDir::new()?;
    write_file(dir.path(), "a.txt", "a");
    let state = state_dir.path().join("state");
    let flag = format!("--incremental={}", state.display());

    app_upload!(dir.path(), "upload", &flag, "--url", &device.url)
        .assert_success()
        .await?;

    assert!(state.exists());
    assert!(!dir.path().join(".app-upload-state").exists());
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_dry_run_does_not_create_state() -> Result<()> {
    let device = MockDevice::start(StatusCode::OK).await;
    let dir = TempDir::new()?;
    write_file(dir.path(), "a.txt", "a");

    let result = app_upload!(
        dir.path(),
        "upload",
        "--incremental",
        "--dry-run",
        "--url",
        &device.url
    )
    .assert_success()
    .await?;

    assert!(result.contains_stdout("a.txt"));
    assert!(!dir.path().join(".app-upload-state").exists());
    Ok(())
}
