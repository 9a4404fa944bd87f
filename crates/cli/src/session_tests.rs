// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;

use super::{SessionConfig, SessionHandle};
use crate::classify::OutputClassifier;
use crate::event::{SessionEvent, SessionId};
use crate::test_support::{next_event, CapturedInput, ScriptedShell};

const IDLE: Duration = Duration::from_millis(150);
const WAIT: Duration = Duration::from_secs(5);

struct Harness {
    handle: SessionHandle,
    events: mpsc::Receiver<SessionEvent>,
    input: CapturedInput,
}

fn start(shell: ScriptedShell) -> anyhow::Result<Harness> {
    let input = shell.captured_input();
    let (events_tx, events) = mpsc::channel(256);
    let (handle, runner) = SessionHandle::new(SessionConfig {
        id: SessionId(1),
        name: "main".to_owned(),
        cwd: std::env::temp_dir(),
        backend: Box::new(shell),
        classifier: Arc::new(OutputClassifier::new(&[])?),
        idle_timeout: IDLE,
        kill_grace: Duration::from_millis(200),
        events_tx,
    });
    handle.attach(tokio::spawn(runner.run()));
    Ok(Harness { handle, events, input })
}

/// Collect events up to and including the first completion.
async fn until_complete(
    events: &mut mpsc::Receiver<SessionEvent>,
) -> anyhow::Result<(Vec<String>, SessionEvent)> {
    let mut outputs = Vec::new();
    loop {
        match next_event(events, WAIT).await? {
            SessionEvent::Output { text, .. } => outputs.push(text),
            event @ SessionEvent::CommandComplete { .. } => return Ok((outputs, event)),
            other => anyhow::bail!("unexpected event: {other:?}"),
        }
    }
}

#[tokio::test]
async fn echo_produces_output_then_clean_completion() -> anyhow::Result<()> {
    let mut h = start(ScriptedShell::new())?;
    assert!(h.handle.submit("echo hi".into(), true).await);

    let (outputs, complete) = until_complete(&mut h.events).await?;
    assert_eq!(outputs.concat(), "hi\r\n");
    let SessionEvent::CommandComplete { id, name, output, classification } = complete else {
        anyhow::bail!("expected completion");
    };
    assert_eq!(id, SessionId(1));
    assert_eq!(&*name, "main");
    assert_eq!(output, "hi");
    assert!(!classification.has_error);

    h.handle.terminate().await;
    Ok(())
}

#[tokio::test]
async fn unknown_command_is_classified_as_error() -> anyhow::Result<()> {
    let mut h = start(ScriptedShell::new())?;
    assert!(h.handle.submit("frobnicate".into(), true).await);

    let (_, complete) = until_complete(&mut h.events).await?;
    let SessionEvent::CommandComplete { output, classification, .. } = complete else {
        anyhow::bail!("expected completion");
    };
    assert!(output.contains("command not found"), "{output}");
    assert!(classification.has_error);
    assert_eq!(classification.exit_code(), 1);

    h.handle.terminate().await;
    Ok(())
}

#[tokio::test]
async fn multi_chunk_output_completes_once() -> anyhow::Result<()> {
    let mut h = start(ScriptedShell::new())?;
    assert!(h.handle.submit("seq 5".into(), true).await);

    let (outputs, complete) = until_complete(&mut h.events).await?;
    assert_eq!(outputs.concat(), "1\r\n2\r\n3\r\n4\r\n5\r\n");
    let SessionEvent::CommandComplete { output, .. } = complete else {
        anyhow::bail!("expected completion");
    };
    assert_eq!(output, "1\n2\n3\n4\n5");

    let extra = tokio::time::timeout(IDLE * 3, h.events.recv()).await;
    assert!(extra.is_err(), "second completion: {extra:?}");

    h.handle.terminate().await;
    Ok(())
}

#[tokio::test]
async fn enter_appends_carriage_return() -> anyhow::Result<()> {
    let mut h = start(ScriptedShell::new())?;
    assert!(h.handle.submit("echo a".into(), true).await);
    until_complete(&mut h.events).await?;
    assert!(h.handle.submit("echo b".into(), false).await);
    tokio::time::sleep(IDLE).await;

    let writes: Vec<Bytes> = h.input.lock().clone();
    assert_eq!(writes, vec![Bytes::from_static(b"echo a\r"), Bytes::from_static(b"echo b")]);

    h.handle.terminate().await;
    Ok(())
}

#[tokio::test]
async fn silent_command_completes_with_empty_output() -> anyhow::Result<()> {
    let mut h = start(ScriptedShell::new())?;
    assert!(h.handle.submit("true".into(), true).await);

    let (outputs, complete) = until_complete(&mut h.events).await?;
    assert!(outputs.is_empty());
    let SessionEvent::CommandComplete { output, classification, .. } = complete else {
        anyhow::bail!("expected completion");
    };
    assert_eq!(output, "");
    assert!(!classification.has_error);

    h.handle.terminate().await;
    Ok(())
}

#[tokio::test]
async fn banner_before_any_prompt_never_completes() -> anyhow::Result<()> {
    let mut h = start(ScriptedShell::new().banner("welcome\r\n$ "))?;

    let SessionEvent::Output { text, .. } = next_event(&mut h.events, WAIT).await? else {
        anyhow::bail!("expected banner output");
    };
    assert_eq!(text, "welcome\r\n$ ");

    let extra = tokio::time::timeout(IDLE * 3, h.events.recv()).await;
    assert!(extra.is_err(), "unarmed detector fired: {extra:?}");

    h.handle.terminate().await;
    Ok(())
}

#[tokio::test]
async fn exit_reports_status() -> anyhow::Result<()> {
    let mut h = start(ScriptedShell::new())?;
    assert!(h.handle.submit("exit 3".into(), true).await);

    let SessionEvent::Exited { id, status, .. } = next_event(&mut h.events, WAIT).await? else {
        anyhow::bail!("expected exit");
    };
    assert_eq!(id, SessionId(1));
    assert_eq!(status.and_then(|s| s.code), Some(3));
    assert!(!h.handle.is_running());
    Ok(())
}

#[tokio::test]
async fn terminate_stops_events_and_input() -> anyhow::Result<()> {
    let mut h = start(ScriptedShell::new())?;
    assert!(h.handle.is_running());
    assert!(h.handle.submit("echo pending".into(), true).await);

    h.handle.terminate().await;
    assert!(!h.handle.is_running());
    assert!(!h.handle.submit("echo late".into(), true).await);

    // Anything queued before termination may still be buffered; nothing
    // may follow the channel closing.
    while let Ok(Some(event)) = tokio::time::timeout(IDLE * 3, h.events.recv()).await {
        assert!(!matches!(event, SessionEvent::Exited { .. }), "terminated session reported exit");
    }
    Ok(())
}

#[tokio::test]
async fn terminate_twice_is_harmless() -> anyhow::Result<()> {
    let h = start(ScriptedShell::new())?;
    h.handle.terminate().await;
    h.handle.terminate().await;
    assert!(!h.handle.is_running());
    Ok(())
}
