// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::json;

use super::{session_event_to_msgs, ws_error, ClientMessage, ServerMessage};
use crate::classify::Classification;
use crate::error::ErrorCode;
use crate::event::{SessionEvent, SessionId};
use crate::registry::SessionInfo;
use crate::screenshot::{CaptureError, Screenshot};

fn to_value(msg: &ServerMessage) -> anyhow::Result<serde_json::Value> {
    Ok(serde_json::to_value(msg)?)
}

#[test]
fn connected_shape() -> anyhow::Result<()> {
    let v = to_value(&ServerMessage::Connected { port: 9876 })?;
    assert_eq!(v, json!({"type": "connected", "port": 9876}));
    Ok(())
}

#[test]
fn sessions_shape_uses_camel_case() -> anyhow::Result<()> {
    let msg = ServerMessage::Sessions {
        list: vec![SessionInfo { id: SessionId(1), name: "main".into(), cwd: "/home/u".into() }],
        active_id: Some(SessionId(1)),
    };
    let v = to_value(&msg)?;
    assert_eq!(
        v,
        json!({
            "type": "sessions",
            "list": [{"id": 1, "name": "main", "cwd": "/home/u"}],
            "activeId": 1,
        })
    );
    Ok(())
}

#[test]
fn empty_sessions_has_null_active_id() -> anyhow::Result<()> {
    let v = to_value(&ServerMessage::Sessions { list: vec![], active_id: None })?;
    assert_eq!(v, json!({"type": "sessions", "list": [], "activeId": null}));
    Ok(())
}

#[test]
fn command_complete_shape() -> anyhow::Result<()> {
    let msg = ServerMessage::CommandComplete {
        session_id: SessionId(2),
        session_name: "build".into(),
        output: "hi".into(),
        exit_code: 0,
        has_error: false,
    };
    let v = to_value(&msg)?;
    assert_eq!(
        v,
        json!({
            "type": "command_complete",
            "sessionId": 2,
            "sessionName": "build",
            "output": "hi",
            "exitCode": 0,
            "hasError": false,
        })
    );
    Ok(())
}

#[test]
fn ack_and_error_shapes() -> anyhow::Result<()> {
    let ack = ServerMessage::Ack {
        status: "sent".into(),
        session_id: SessionId(3),
        session_name: "a".into(),
    };
    assert_eq!(
        to_value(&ack)?,
        json!({"type": "ack", "status": "sent", "sessionId": 3, "sessionName": "a"})
    );

    let err = ws_error(ErrorCode::NoSession, "No terminal");
    assert_eq!(
        to_value(&err)?,
        json!({"type": "error", "code": "NO_SESSION", "message": "No terminal"})
    );
    Ok(())
}

#[test]
fn prompt_defaults_to_auto_execute() -> anyhow::Result<()> {
    let msg: ClientMessage = serde_json::from_value(json!({"type": "prompt", "text": "ls"}))?;
    assert_eq!(msg, ClientMessage::Prompt { text: "ls".into(), session_id: None, auto_execute: true });
    Ok(())
}

#[test]
fn prompt_fields_are_camel_case() -> anyhow::Result<()> {
    let msg: ClientMessage = serde_json::from_value(json!({
        "type": "prompt",
        "text": "make",
        "sessionId": 4,
        "autoExecute": false,
    }))?;
    assert_eq!(
        msg,
        ClientMessage::Prompt { text: "make".into(), session_id: Some(SessionId(4)), auto_execute: false }
    );
    Ok(())
}

#[yare::parameterized(
    create_bare = { json!({"type": "create_session"}), ClientMessage::CreateSession { name: None, cwd: None } },
    create_full = {
        json!({"type": "create_session", "name": "build", "cwd": "/tmp"}),
        ClientMessage::CreateSession { name: Some("build".into()), cwd: Some(PathBuf::from("/tmp")) }
    },
    remove = { json!({"type": "remove_session", "sessionId": 5}), ClientMessage::RemoveSession { session_id: SessionId(5) } },
    select = { json!({"type": "select_session", "sessionId": 6}), ClientMessage::SelectSession { session_id: SessionId(6) } },
    screenshot = {
        json!({"type": "screenshot_request", "trigger": "button"}),
        ClientMessage::ScreenshotRequest { trigger: Some("button".into()) }
    },
    refresh = { json!({"type": "refresh_sessions"}), ClientMessage::RefreshSessions {} },
    capture_ready = { json!({"type": "capture_ready"}), ClientMessage::CaptureReady {} },
)]
fn client_messages_decode(value: serde_json::Value, expected: ClientMessage) {
    let decoded: Result<ClientMessage, _> = serde_json::from_value(value);
    assert_eq!(decoded.ok(), Some(expected));
}

#[yare::parameterized(
    unknown_type = { json!({"type": "launch_missiles"}) },
    missing_type = { json!({"text": "ls"}) },
    missing_text = { json!({"type": "prompt"}) },
    bad_session_id = { json!({"type": "remove_session", "sessionId": "abc"}) },
)]
fn malformed_client_messages_fail(value: serde_json::Value) {
    assert!(serde_json::from_value::<ClientMessage>(value).is_err());
}

#[test]
fn screenshot_converts_to_data_url() -> anyhow::Result<()> {
    let shot = Screenshot { png: b"\x89PNG".to_vec(), source: "scrot".into() };
    let v = to_value(&ServerMessage::from(shot))?;
    assert_eq!(
        v,
        json!({"type": "screenshot", "dataUrl": "data:image/png;base64,iVBORw==", "source": "scrot"})
    );
    Ok(())
}

#[test]
fn capture_errors_convert_to_error_messages() {
    let cancelled = ServerMessage::from(&CaptureError::Cancelled);
    assert_eq!(
        cancelled,
        ServerMessage::Error {
            code: "CAPTURE_FAILED".into(),
            message: "Screenshot cancelled or timed out".into()
        }
    );
    let ServerMessage::Error { message, .. } = ServerMessage::from(&CaptureError::Unsupported) else {
        panic!("expected error message");
    };
    assert!(message.starts_with("Screenshot failed"), "{message}");
}

#[test]
fn clean_completion_emits_one_message() {
    let event = SessionEvent::CommandComplete {
        id: SessionId(1),
        name: Arc::from("main"),
        output: "hi".into(),
        classification: Classification { has_error: false, matched: None },
    };
    let msgs = session_event_to_msgs(&event);
    assert_eq!(msgs.len(), 1);
    assert!(matches!(msgs[0], ServerMessage::CommandComplete { exit_code: 0, has_error: false, .. }));
}

#[test]
fn failed_completion_is_followed_by_error_detected() {
    let event = SessionEvent::CommandComplete {
        id: SessionId(1),
        name: Arc::from("main"),
        output: "sh: 1: x: command not found".into(),
        classification: Classification {
            has_error: true,
            matched: Some("command not found".into()),
        },
    };
    let msgs = session_event_to_msgs(&event);
    assert_eq!(
        msgs,
        vec![
            ServerMessage::CommandComplete {
                session_id: SessionId(1),
                session_name: "main".into(),
                output: "sh: 1: x: command not found".into(),
                exit_code: 1,
                has_error: true,
            },
            ServerMessage::ErrorDetected {
                session_id: SessionId(1),
                output: "sh: 1: x: command not found".into(),
            },
        ]
    );
}

#[test]
fn output_event_keeps_escape_codes() {
    let event = SessionEvent::Output {
        id: SessionId(9),
        name: Arc::from("b"),
        text: "\x1b[32mok\x1b[0m".into(),
    };
    assert_eq!(
        session_event_to_msgs(&event),
        vec![ServerMessage::Output {
            text: "\x1b[32mok\x1b[0m".into(),
            session_id: SessionId(9),
            session_name: "b".into(),
        }]
    );
}

#[test]
fn exit_event_emits_nothing_directly() {
    let event = SessionEvent::Exited { id: SessionId(1), name: Arc::from("a"), status: None };
    assert!(session_event_to_msgs(&event).is_empty());
}
