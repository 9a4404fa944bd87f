// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;
use std::time::Duration;

use super::{compute_health, handle_client_message};
use crate::event::{SessionEvent, SessionId};
use crate::hub::Observer;
use crate::test_support::{next_event, AppStateBuilder, ScriptedSpawner, StubCapture, StubOutcome};
use crate::transport::ws_msg::{ClientMessage, ServerMessage};

const WAIT: Duration = Duration::from_secs(5);

async fn next_broadcast(observer: &mut Observer) -> anyhow::Result<ServerMessage> {
    let frame = tokio::time::timeout(WAIT, observer.events.recv()).await??;
    Ok(serde_json::from_str(&frame)?)
}

async fn next_reply(observer: &mut Observer) -> anyhow::Result<ServerMessage> {
    let frame = tokio::time::timeout(WAIT, observer.replies.recv())
        .await?
        .ok_or_else(|| anyhow::anyhow!("reply queue closed"))?;
    Ok(serde_json::from_str(&frame)?)
}

fn prompt(text: &str, session_id: Option<SessionId>) -> ClientMessage {
    ClientMessage::Prompt { text: text.to_owned(), session_id, auto_execute: true }
}

#[tokio::test]
async fn prompt_without_sessions_is_rejected() -> anyhow::Result<()> {
    let (state, _rx) = AppStateBuilder::new().build()?;
    let observer = state.hub.register();

    let reply = handle_client_message(&state, observer.id, prompt("ls", None)).await;
    assert_eq!(
        reply,
        Some(ServerMessage::Error { code: "NO_SESSION".into(), message: "No terminal".into() })
    );
    Ok(())
}

#[tokio::test]
async fn prompt_to_unknown_explicit_session_is_rejected() -> anyhow::Result<()> {
    let (state, _rx) = AppStateBuilder::new().build()?;
    state.registry.create(None, None)?;
    let observer = state.hub.register();

    let reply = handle_client_message(&state, observer.id, prompt("ls", Some(SessionId(99)))).await;
    assert!(matches!(reply, Some(ServerMessage::Error { ref code, .. }) if code == "NO_SESSION"));
    state.registry.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn prompt_to_active_session_is_acked_and_completes() -> anyhow::Result<()> {
    let (state, mut rx) = AppStateBuilder::new().build()?;
    let info = state.registry.create(Some("main".into()), None)?;
    let observer = state.hub.register();

    let reply = handle_client_message(&state, observer.id, prompt("echo hi", None)).await;
    assert_eq!(
        reply,
        Some(ServerMessage::Ack {
            status: "sent".into(),
            session_id: info.id,
            session_name: "main".into()
        })
    );

    loop {
        if let SessionEvent::CommandComplete { output, .. } = next_event(&mut rx, WAIT).await? {
            assert_eq!(output, "hi");
            break;
        }
    }
    state.registry.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn prompt_targets_explicit_session_over_active() -> anyhow::Result<()> {
    let spawner = Arc::new(ScriptedSpawner::new());
    let (state, _rx) = AppStateBuilder::new().spawner(spawner.clone()).build()?;
    state.registry.create(Some("a".into()), None)?;
    let b = state.registry.create(Some("b".into()), None)?;
    let observer = state.hub.register();

    let reply = handle_client_message(&state, observer.id, prompt("true", Some(b.id))).await;
    assert!(matches!(reply, Some(ServerMessage::Ack { ref session_name, .. }) if session_name == "b"));

    tokio::time::sleep(Duration::from_millis(50)).await;
    let a_input = spawner.captured_input(0).ok_or_else(|| anyhow::anyhow!("no shell a"))?;
    let b_input = spawner.captured_input(1).ok_or_else(|| anyhow::anyhow!("no shell b"))?;
    assert!(a_input.lock().is_empty());
    assert_eq!(b_input.lock().len(), 1);
    state.registry.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn create_broadcasts_sessions() -> anyhow::Result<()> {
    let (state, _rx) = AppStateBuilder::new().build()?;
    let mut observer = state.hub.register();

    let msg = ClientMessage::CreateSession { name: Some("build".into()), cwd: None };
    assert_eq!(handle_client_message(&state, observer.id, msg).await, None);

    let ServerMessage::Sessions { list, active_id } = next_broadcast(&mut observer).await? else {
        anyhow::bail!("expected sessions broadcast");
    };
    assert_eq!(list.len(), 1);
    assert_eq!(list[0].name, "build");
    assert_eq!(active_id, Some(list[0].id));
    state.registry.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn refused_spawn_replies_with_error() -> anyhow::Result<()> {
    let (state, _rx) = AppStateBuilder::new().spawner(Arc::new(ScriptedSpawner::refusing())).build()?;
    let observer = state.hub.register();

    let msg = ClientMessage::CreateSession { name: None, cwd: None };
    let reply = handle_client_message(&state, observer.id, msg).await;
    let Some(ServerMessage::Error { code, message }) = reply else {
        anyhow::bail!("expected error reply, got {reply:?}");
    };
    assert_eq!(code, "SPAWN_FAILED");
    assert!(message.contains("spawn refused"), "{message}");
    assert!(state.registry.is_empty());
    Ok(())
}

#[tokio::test]
async fn select_broadcasts_selection_then_sessions() -> anyhow::Result<()> {
    let (state, _rx) = AppStateBuilder::new().build()?;
    state.registry.create(None, None)?;
    let b = state.registry.create(None, None)?;
    let mut observer = state.hub.register();

    let msg = ClientMessage::SelectSession { session_id: b.id };
    assert_eq!(handle_client_message(&state, observer.id, msg).await, None);

    assert_eq!(
        next_broadcast(&mut observer).await?,
        ServerMessage::SessionSelected { active_id: Some(b.id) }
    );
    let ServerMessage::Sessions { active_id, .. } = next_broadcast(&mut observer).await? else {
        anyhow::bail!("expected sessions broadcast");
    };
    assert_eq!(active_id, Some(b.id));
    state.registry.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn remove_known_session_broadcasts() -> anyhow::Result<()> {
    let (state, _rx) = AppStateBuilder::new().build()?;
    let a = state.registry.create(None, None)?;
    let mut observer = state.hub.register();

    let msg = ClientMessage::RemoveSession { session_id: a.id };
    assert_eq!(handle_client_message(&state, observer.id, msg).await, None);
    assert_eq!(
        next_broadcast(&mut observer).await?,
        ServerMessage::Sessions { list: vec![], active_id: None }
    );
    Ok(())
}

#[tokio::test]
async fn remove_unknown_session_is_silent() -> anyhow::Result<()> {
    let (state, _rx) = AppStateBuilder::new().build()?;
    let mut observer = state.hub.register();

    let msg = ClientMessage::RemoveSession { session_id: SessionId(404) };
    assert_eq!(handle_client_message(&state, observer.id, msg).await, None);
    assert!(observer.events.try_recv().is_err());
    Ok(())
}

#[tokio::test]
async fn refresh_replies_with_snapshot() -> anyhow::Result<()> {
    let (state, _rx) = AppStateBuilder::new().build()?;
    let a = state.registry.create(Some("a".into()), None)?;
    let mut observer = state.hub.register();

    let reply = handle_client_message(&state, observer.id, ClientMessage::RefreshSessions {}).await;
    let Some(ServerMessage::Sessions { list, active_id }) = reply else {
        anyhow::bail!("expected sessions reply");
    };
    assert_eq!(list.len(), 1);
    assert_eq!(active_id, Some(a.id));
    assert!(observer.events.try_recv().is_err());
    state.registry.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn capture_ready_has_no_reply() -> anyhow::Result<()> {
    let (state, _rx) = AppStateBuilder::new().build()?;
    let observer = state.hub.register();
    let reply = handle_client_message(&state, observer.id, ClientMessage::CaptureReady {}).await;
    assert_eq!(reply, None);
    Ok(())
}

#[tokio::test]
async fn screenshot_goes_to_requester_only() -> anyhow::Result<()> {
    let capture = Arc::new(StubCapture::image(b"\x89PNG", "stub"));
    let (state, _rx) = AppStateBuilder::new().screenshot(capture.clone()).build()?;
    let mut requester = state.hub.register();
    let mut bystander = state.hub.register();

    let msg = ClientMessage::ScreenshotRequest { trigger: Some("hotkey".into()) };
    assert_eq!(handle_client_message(&state, requester.id, msg).await, None);

    let ServerMessage::Screenshot { data_url, source } = next_reply(&mut requester).await? else {
        anyhow::bail!("expected screenshot reply");
    };
    assert!(data_url.starts_with("data:image/png;base64,"));
    assert_eq!(source, "stub");
    assert_eq!(capture.calls(), 1);
    assert!(bystander.replies.try_recv().is_err());
    assert!(bystander.events.try_recv().is_err());
    Ok(())
}

async fn screenshot_error_message(outcome: StubOutcome) -> anyhow::Result<String> {
    let (state, _rx) = AppStateBuilder::new()
        .screenshot(Arc::new(StubCapture::new(outcome)))
        .screenshot_timeout(Duration::from_millis(100))
        .build()?;
    let mut observer = state.hub.register();

    let msg = ClientMessage::ScreenshotRequest { trigger: None };
    assert_eq!(handle_client_message(&state, observer.id, msg).await, None);

    let ServerMessage::Error { code, message } = next_reply(&mut observer).await? else {
        anyhow::bail!("expected error reply");
    };
    assert_eq!(code, "CAPTURE_FAILED");
    Ok(message)
}

#[tokio::test]
async fn cancelled_screenshot_becomes_error() -> anyhow::Result<()> {
    let message = screenshot_error_message(StubOutcome::Cancelled).await?;
    assert_eq!(message, "Screenshot cancelled or timed out");
    Ok(())
}

#[tokio::test]
async fn hung_screenshot_times_out() -> anyhow::Result<()> {
    let message = screenshot_error_message(StubOutcome::Hang).await?;
    assert_eq!(message, "Screenshot cancelled or timed out");
    Ok(())
}

#[tokio::test]
async fn failed_screenshot_carries_reason() -> anyhow::Result<()> {
    let message = screenshot_error_message(StubOutcome::Failed("boom".into())).await?;
    assert!(message.starts_with("Screenshot failed"), "{message}");
    assert!(message.contains("boom"), "{message}");
    Ok(())
}

#[tokio::test]
async fn health_counts_sessions_and_observers() -> anyhow::Result<()> {
    let (state, _rx) = AppStateBuilder::new().build()?;
    state.registry.create(None, None)?;
    let _observer = state.hub.register();

    let health = compute_health(&state);
    assert_eq!(health.status, "running");
    assert_eq!(health.sessions, 1);
    assert_eq!(health.observers, 1);
    state.registry.shutdown().await;
    Ok(())
}
