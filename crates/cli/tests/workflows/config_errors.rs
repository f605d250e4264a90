//! Startup failures

use crate::app_upload;
use crate::common::write_file;
use anyhow::Result;
use tempfile::TempDir;

#[tokio::test(flavor = "multi_thread")]
async fn test_missing_host_is_fatal() -> Result<()> {
    let dir = TempDir::new()?;
    write_file(dir.path(), "a.txt", "a");

    let result = app_upload!(dir.path(), "upload").assert_failure().await?;

    assert_eq!(result.exit_code, 1);
    assert!(result.contains_stderr("no server host"));
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_invalid_url_is_fatal() -> Result<()> {
    let dir = TempDir::new()?;

    let result = app_upload!(dir.path(), "upload", "--url", "https://device")
        .assert_failure()
        .await?;

    assert!(result.contains_stderr("unsupported URL scheme"));
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_invalid_tool_config_is_fatal() -> Result<()> {
    let dir = TempDir::new()?;
    write_file(dir.path(), "app-upload.toml", "[upload]\ntimeout_secs = 0\n");

    let result = app_upload!(dir.path(), "upload", "--host", "127.0.0.1")
        .assert_failure()
        .await?;

    assert!(result.contains_stderr("timeout_secs"));
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_missing_project_directory() -> Result<()> {
    let dir = TempDir::new()?;

    let result = app_upload!(dir.path(), "upload", "--project", "nope", "--host", "127.0.0.1")
        .assert_failure()
        .await?;

    assert!(result.contains_stderr("does not exist"));
    Ok(())
}
