//! Handler execution against real processes

#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::time::Duration;

use sflow_ratewatchd::executor::{CommandExecutor, HandlerInvocation, ProcessExecutor};

fn write_script(dir: &Path, body: &str) -> std::path::PathBuf {
    let path = dir.join("handler.sh");
    fs::write(&path, format!("#!/bin/sh\n{}\n", body)).expect("write script");
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod");
    path
}

#[tokio::test]
async fn test_handler_receives_environment() {
    let dir = tempfile::tempdir().expect("tempdir");
    let out = dir.path().join("env.out");
    let script = write_script(
        dir.path(),
        &format!(
            "echo \"$SEVERITY $PPS $MBPS\" > {}.tmp && mv {}.tmp {}",
            out.display(),
            out.display(),
            out.display()
        ),
    );

    let invocation = HandlerInvocation::new(&script)
        .env("SEVERITY", "CRITICAL")
        .env("PPS", "1500")
        .env("MBPS", "12.00");
    ProcessExecutor.spawn(&invocation).expect("spawn");

    let mut content = None;
    for _ in 0..100 {
        if let Ok(text) = fs::read_to_string(&out) {
            content = Some(text);
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(content.as_deref(), Some("CRITICAL 1500 12.00\n"));
}

#[test]
fn test_failing_handler_is_not_an_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let script = write_script(dir.path(), "exit 3");

    // spawn succeeds; the exit status is only logged
    tokio_test::block_on(async {
        assert!(ProcessExecutor
            .spawn(&HandlerInvocation::new(&script))
            .is_ok());
    });
}

#[test]
fn test_missing_handler_reported() {
    let err = tokio_test::block_on(async {
        ProcessExecutor
            .spawn(&HandlerInvocation::new("/nonexistent/ratewatchd/handler"))
            .unwrap_err()
    });
    assert!(err.is_handler_not_found());
}
