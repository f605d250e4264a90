//! Full uploads and dry runs

use crate::app_upload;
use crate::common::{write_file, MockDevice};
use anyhow::Result;
use axum::http::StatusCode;
use tempfile::TempDir;

fn project() -> TempDir {
    let dir = TempDir::new().unwrap();
    write_file(dir.path(), "app.js", "module.exports = {};");
    write_file(dir.path(), "app.json", "{\"id\":\"com.example\"}");
    write_file(dir.path(), "env.json", "{\"token\":\"secret\"}");
    write_file(dir.path(), ".gitignore", "*.log\n");
    write_file(dir.path(), "debug.log", "noise");
    dir
}

#[tokio::test(flavor = "multi_thread")]
async fn test_upload_sends_project_and_restarts() -> Result<()> {
    let device = MockDevice::start(StatusCode::OK).await;
    let dir = project();

    let result = app_upload!(dir.path(), "upload", "--url", &device.url)
        .assert_success()
        .await?;

    assert!(result.contains_stdout("Uploaded 3 files"));
    assert!(result.contains_stdout("Restart requested"));
    assert_eq!(device.uploads(), vec![vec![".gitignore", "app.js", "app.json"]]);
    assert_eq!(device.requests(), vec!["/app-upload", "/restart"]);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_dry_run_lists_files_without_sending() -> Result<()> {
    let device = MockDevice::start(StatusCode::OK).await;
    let dir = project();

    let result = app_upload!(dir.path(), "upload", "--dry-run", "--url", &device.url)
        .assert_success()
        .await?;

    assert!(result.contains_stdout("Would upload 3 files"));
    assert!(result.contains_stdout("app.json"));
    assert!(!result.contains_stdout("env.json"));
    assert!(device.uploads().is_empty());
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_server_error_fails_command() -> Result<()> {
    let device = MockDevice::start(StatusCode::INTERNAL_SERVER_ERROR).await;
    let dir = project();

    let result = app_upload!(dir.path(), "upload", "--url", &device.url)
        .assert_failure()
        .await?;

    assert_eq!(result.exit_code, 1);
    assert!(result.contains_stdout("failed (status 500)"));
    assert!(result.contains_stderr("Upload failed"));
    assert_eq!(device.restarts(), 0);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_no_restart_flag() -> Result<()> {
    let device = MockDevice::start(StatusCode::OK).await;
    let dir = project();

    app_upload!(dir.path(), "upload", "--no-restart", "--url", &device.url)
        .assert_success()
        .await?;

    assert_eq!(device.uploads().len(), 1);
    assert_eq!(device.restarts(), 0);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_endpoint_from_environment() -> Result<()> {
    let device = MockDevice::start(StatusCode::OK).await;
    let dir = project();

    let mut cmd = app_upload!(dir.path(), "upload");
    cmd.env("APP_UPLOAD_URL", &device.url);
    cmd.assert_success().await?;

    assert_eq!(device.uploads().len(), 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_project_flag_and_uncompressed_config() -> Result<()> {
    let device = MockDevice::start(StatusCode::OK).await;
    let dir = project();
    write_file(
        dir.path(),
        "app-upload.toml",
        "[upload]\ncompression_level = 0\nrestart = false\n",
    );
    let elsewhere = TempDir::new()?;
    let project_dir = dir.path().to_string_lossy().to_string();

    app_upload!(elsewhere.path(), "upload", "--project", &project_dir, "--url", &device.url)
        .assert_success()
        .await?;

    assert_eq!(
        device.uploads(),
        vec![vec![".gitignore", "app-upload.toml", "app.js", "app.json"]]
    );
    assert_eq!(device.restarts(), 0);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_empty_project_has_no_changes() -> Result<()> {
    let device = MockDevice::start(StatusCode::OK).await;
    let dir = TempDir::new()?;

    let result = app_upload!(dir.path(), "upload", "--url", &device.url)
        .assert_success()
        .await?;

    assert!(result.contains_stdout("No changes"));
    assert!(device.uploads().is_empty());
    Ok(())
}
