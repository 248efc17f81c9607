//! Integration tests for the container run layer.
//!
//! These tests drive the run primitives through the mock runtime so no
//! Docker engine is required.

use std::sync::Arc;

use parking_lot::Mutex;

use opera_runner::{
    run_attached, run_detached, ContainerConfig, ContainerHandle, ContainerRuntime, LogSink,
    MockRuntime, RemoveOptions, RunnerError,
};

fn capture() -> (Arc<Mutex<Vec<u8>>>, LogSink) {
    let buffer = Arc::new(Mutex::new(Vec::new()));
    let sink: LogSink = buffer.clone();
    (buffer, sink)
}

/// A container exiting with 137 surfaces the status code, not a generic failure.
#[tokio::test]
async fn test_non_zero_exit_carries_status_code() {
    let runtime = MockRuntime::new().exit_codes("sitespeedio/sitespeed.io:3.11.5", vec![137]);
    let config = ContainerConfig::new("sitespeedio/sitespeed.io:3.11.5").attached();
    let (_, sink) = capture();

    let failure = run_attached(&runtime, &config, sink).await.unwrap_err();

    match &failure.error {
        RunnerError::NonZeroExit { image, status_code } => {
            assert_eq!(image, "sitespeedio/sitespeed.io:3.11.5");
            assert_eq!(*status_code, 137);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(
        failure.to_string(),
        "Container from \"sitespeedio/sitespeed.io:3.11.5\" image returned status code 137"
    );
    assert!(failure.handle.is_some());
}

/// Attached output is forwarded line by line with the image prefix.
#[tokio::test]
async fn test_attached_output_lines_are_prefixed() {
    let runtime = MockRuntime::new()
        .output("electrode-app-builder", "step 1\nstep 2\npartial");
    let config = ContainerConfig::new("electrode-app-builder")
        .env("APP_BUILD_CMD", "npm run build")
        .attached();
    let (buffer, sink) = capture();

    run_attached(&runtime, &config, sink).await.unwrap();

    let text = String::from_utf8(buffer.lock().clone()).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(
        lines,
        vec![
            "[electrode-app-builder] step 1",
            "[electrode-app-builder] step 2",
            "[electrode-app-builder] partial",
        ]
    );
}

/// Attach happens before start so early output is not lost.
#[tokio::test]
async fn test_attach_precedes_start() {
    let runtime = MockRuntime::new();
    let (_, sink) = capture();

    run_attached(&runtime, &ContainerConfig::new("builder").attached(), sink)
        .await
        .unwrap();

    let methods = runtime.method_names();
    let attach = methods.iter().position(|m| m == "attach_output").unwrap();
    let start = methods.iter().position(|m| m == "start_container").unwrap();
    assert!(attach < start);
}

/// A detached service exposes its network data to later callers.
#[tokio::test]
async fn test_detached_service_network_data() {
    let runtime = MockRuntime::new().network("otto-mock-server", "172.17.0.42");
    let config = ContainerConfig::new("otto-mock-server")
        .hostname("dev.walmart.com")
        .publish_all_ports();

    let handle = run_detached(&runtime, &config).await.unwrap();

    assert_eq!(handle.ip_address(), Some("172.17.0.42"));
    assert!(handle.binding("3000/tcp").is_some());
    assert!(handle.name().unwrap().starts_with('/'));
}

/// Removing a handle created by a run succeeds; unknown ids fail cleanly.
#[tokio::test]
async fn test_remove_created_and_unknown() {
    let runtime = MockRuntime::new();
    let handle = run_detached(&runtime, &ContainerConfig::new("electrode-app"))
        .await
        .unwrap();

    runtime
        .remove_container(&handle.id, RemoveOptions::purge())
        .await
        .unwrap();

    let reused = ContainerHandle::reused("external-builder");
    let result = runtime
        .remove_container(&reused.id, RemoveOptions::purge())
        .await;
    assert!(result.is_err());
}
