//! Process backend driven through `/bin/sh` scripts, without the Python
//! harness or network namespaces.

#![cfg(unix)]

use std::time::Duration;

use arena_core::sandbox::{
    ExecutionStatus, ProcessSandbox, ProcessSettings, Resource, SandboxExecutor,
};
use serde_json::json;

fn shell() -> ProcessSandbox {
    ProcessSandbox::new(ProcessSettings {
        program: "/bin/sh".to_string(),
        args: Vec::new(),
        harness: false,
        memory_limit_mb: 256,
        cpu_time_limit_secs: 5,
        network_disabled: false,
        max_output_bytes: 4096,
    })
}

const TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::test]
async fn test_json_stdout_is_success() {
    let result = shell()
        .execute("printf '{\"ok\": true, \"n\": 3}'", &json!({}), TIMEOUT)
        .await;
    assert_eq!(result.output(), Some(&json!({"ok": true, "n": 3})));
}

#[tokio::test]
async fn test_input_arrives_on_stdin() {
    let input = json!({"task": "echo", "count": 2});
    let result = shell()
        .execute("read -r line\nprintf '%s' \"$line\"\n", &input, TIMEOUT)
        .await;
    assert_eq!(result.output(), Some(&input));
}

#[tokio::test]
async fn test_environment_is_empty() {
    let result = shell()
        .execute("printf '{\"home\": \"%s\"}' \"$HOME\"", &json!({}), TIMEOUT)
        .await;
    assert_eq!(result.output().unwrap()["home"], "");
}

#[tokio::test]
async fn test_plain_text_output_crashes() {
    let result = shell().execute("echo hello", &json!({}), TIMEOUT).await;
    match result.status {
        ExecutionStatus::Crashed { reason } => assert!(reason.starts_with("invalid output")),
        other => panic!("expected crash, got {other:?}"),
    }
}

#[tokio::test]
async fn test_nonzero_exit_reports_stderr() {
    let result = shell()
        .execute("echo 'bad state' >&2\nexit 3\n", &json!({}), TIMEOUT)
        .await;
    assert_eq!(
        result.status,
        ExecutionStatus::Crashed {
            reason: "exit code 3: bad state".into()
        }
    );
}

#[tokio::test]
async fn test_output_over_limit_is_resource_exceeded() {
    let code = "i=0\nwhile [ $i -lt 2000 ]; do printf 'xxxxxxxxxx'; i=$((i+1)); done\n";
    let result = shell().execute(code, &json!({}), TIMEOUT).await;
    assert!(matches!(
        result.status,
        ExecutionStatus::ResourceExceeded {
            resource: Resource::Output,
            ..
        }
    ));
}

#[tokio::test]
async fn test_endless_script_times_out() {
    let result = shell()
        .execute("while :; do :; done\n", &json!({}), Duration::from_millis(300))
        .await;
    assert_eq!(result.status, ExecutionStatus::Timeout);
    assert_eq!(result.elapsed_ms, 300);
}

#[tokio::test]
async fn test_missing_interpreter_fails_closed() {
    let sandbox = ProcessSandbox::new(ProcessSettings {
        program: "/nonexistent/interpreter".to_string(),
        harness: false,
        network_disabled: false,
        ..Default::default()
    });
    let result = sandbox.execute("", &json!({}), TIMEOUT).await;
    assert!(matches!(result.status, ExecutionStatus::Crashed { .. }));
}
