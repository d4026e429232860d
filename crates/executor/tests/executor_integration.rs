#![cfg(unix)]

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use shellward_confirm::SessionState;
use shellward_executor::{ExecError, OutputEvent, ProcessExecutor};
use shellward_policy::CommandRequest;

fn executor() -> (ProcessExecutor, Arc<SessionState>) {
    let session = Arc::new(SessionState::new());
    let executor = ProcessExecutor::new(Arc::clone(&session), std::env::temp_dir());
    (executor, session)
}

fn group_alive(pgid: i32) -> bool {
    unsafe { libc::killpg(pgid, 0) == 0 }
}

#[tokio::test]
async fn test_echo_happy_path() {
    let (executor, _) = executor();
    let cancel = CancellationToken::new();

    let result = executor
        .run(&CommandRequest::new("echo hello"), &cancel, |_| {})
        .await
        .unwrap();

    assert_eq!(result.exit_code, Some(0));
    assert_eq!(result.stdout, "hello\n");
    assert_eq!(result.stderr, "");
    assert_eq!(result.signal, None);
    assert!(result.background_pids.is_empty());
    assert!(!result.aborted);
    assert!(result.process_group_id.is_some());
}

#[tokio::test]
async fn test_exit_code_is_reraised_past_the_trailer() {
    let (executor, _) = executor();
    let cancel = CancellationToken::new();

    let result = executor
        .run(&CommandRequest::new("exit 2"), &cancel, |_| {})
        .await
        .unwrap();

    assert_eq!(result.exit_code, Some(2));
    assert!(!result.aborted);
}

#[tokio::test]
async fn test_stderr_is_captured_separately() {
    let (executor, _) = executor();
    let cancel = CancellationToken::new();

    let result = executor
        .run(&CommandRequest::new("echo oops >&2"), &cancel, |_| {})
        .await
        .unwrap();

    assert_eq!(result.stdout, "");
    assert_eq!(result.stderr, "oops\n");
}

#[tokio::test]
async fn test_runs_in_requested_directory() {
    let root = tempfile::tempdir().unwrap();
    std::fs::create_dir(root.path().join("sub")).unwrap();
    let session = Arc::new(SessionState::new());
    let executor = ProcessExecutor::new(session, root.path());
    let cancel = CancellationToken::new();

    let request = CommandRequest::new("pwd").in_directory("sub");
    let result = executor.run(&request, &cancel, |_| {}).await.unwrap();

    assert_eq!(result.exit_code, Some(0));
    assert!(result.stdout.trim_end().ends_with("/sub"));
    assert_eq!(result.directory.as_deref(), Some("sub"));
}

#[tokio::test]
async fn test_cancellation_aborts_and_kills_the_group() {
    let (executor, _) = executor();
    let cancel = CancellationToken::new();

    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel_clone.cancel();
    });

    let started = std::time::Instant::now();
    let result = executor
        .run(&CommandRequest::new("sleep 5"), &cancel, |_| {})
        .await
        .unwrap();

    assert!(result.aborted);
    assert_eq!(result.exit_code, None);
    assert_eq!(result.signal, None);
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn test_cancelled_background_command_leaves_no_orphan() {
    let (executor, _) = executor();
    let cancel = CancellationToken::new();

    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel_clone.cancel();
    });

    let result = executor
        .run(&CommandRequest::new("sleep 5 &"), &cancel, |_| {})
        .await
        .unwrap();

    assert!(result.aborted);
    assert_eq!(result.exit_code, None);

    // The forceful signal lands after the grace window; wait it out.
    let pgid = result.process_group_id.unwrap();
    for _ in 0..20 {
        if !group_alive(pgid) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    panic!("process group {pgid} still alive after cancellation");
}

#[tokio::test]
async fn test_background_pid_discovery() {
    let (executor, _) = executor();
    let cancel = CancellationToken::new();

    let result = executor
        .run(&CommandRequest::new("sleep 0.2 &"), &cancel, |_| {})
        .await
        .unwrap();

    assert_eq!(result.exit_code, Some(0));
    assert_eq!(result.background_pids.len(), 1);
    assert!(!result.aborted);
}

#[tokio::test]
async fn test_binary_output_keeps_every_raw_byte() {
    let (executor, _) = executor();
    let cancel = CancellationToken::new();

    let result = executor
        .run(&CommandRequest::new("printf 'a\\0b'"), &cancel, |_| {})
        .await
        .unwrap();

    assert_eq!(result.exit_code, Some(0));
    assert_eq!(result.raw_output, b"a\0b");
}

#[tokio::test]
async fn test_binary_output_switches_live_stream_to_progress() {
    let (executor, _) = executor();
    let cancel = CancellationToken::new();

    let mut events = Vec::new();
    let result = executor
        .run(
            &CommandRequest::new("printf 'x\\0y'; sleep 1.3"),
            &cancel,
            |event| events.push(event),
        )
        .await
        .unwrap();

    assert_eq!(result.exit_code, Some(0));
    assert!(!events.is_empty());
    assert!(events
        .iter()
        .all(|event| matches!(event, OutputEvent::BinaryProgress { .. })));
    assert_eq!(result.raw_output, b"x\0y");
}

#[tokio::test]
async fn test_live_text_updates_are_throttled() {
    let (executor, _) = executor();
    let cancel = CancellationToken::new();

    let mut events = Vec::new();
    let result = executor
        .run(
            &CommandRequest::new("echo hi; sleep 1.3"),
            &cancel,
            |event| events.push(event),
        )
        .await
        .unwrap();

    assert_eq!(result.exit_code, Some(0));
    assert_eq!(events.len(), 1);
    assert!(matches!(&events[0], OutputEvent::Text(text) if text.contains("hi")));
}

#[tokio::test]
async fn test_elevation_failure_phrase_clears_cached_secret() {
    let (executor, session) = executor();
    session.credentials.set("hunter2".into());
    let cancel = CancellationToken::new();

    let result = executor
        .run(
            &CommandRequest::new("echo 'Sorry, try again.'"),
            &cancel,
            |_| {},
        )
        .await
        .unwrap();

    assert_eq!(result.exit_code, Some(0));
    assert_eq!(session.credentials.get(), None);
}

#[tokio::test]
async fn test_elevation_without_secret_fails_before_spawn() {
    let (executor, _) = executor();
    let cancel = CancellationToken::new();

    let result = executor
        .run(&CommandRequest::new("sudo ls"), &cancel, |_| {})
        .await;

    assert!(matches!(result, Err(ExecError::ElevationUnavailable)));
}
