use std::future::pending;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use layra_model::{ErrorKind, HistoryTurn, StreamEvent};
use layra_test_backend::{
    PresetEnding, PresetHistory, PresetReply, TestBackend,
};
use tokio::time::sleep;

use crate::{OutgoingMessage, ReplyOutcome, SessionBuilder};

fn turn(id: &str, parent: &str, text: &str) -> HistoryTurn {
    HistoryTurn {
        message_id: id.to_owned(),
        parent_message_id: parent.to_owned(),
        user_text: text.to_owned(),
        ai_text: format!("re: {text}"),
        ..Default::default()
    }
}

fn text(id: &str, delta: &str) -> StreamEvent {
    StreamEvent::Text {
        message_id: id.to_owned(),
        delta: delta.to_owned(),
    }
}

fn backend_with_history() -> TestBackend {
    let backend = TestBackend::default();
    backend.set_history(
        "alice_1",
        PresetHistory::with_turns([
            turn("m1", "", "Hi"),
            turn("m2", "m1", "First"),
            turn("m3", "m1", "Second"),
        ])
        .with_failures(2),
    );
    backend
}

#[tokio::test(start_paused = true)]
async fn test_load_with_retries() {
    let path_changes = Arc::new(AtomicUsize::new(0));
    let mut session =
        SessionBuilder::with_backend(backend_with_history(), "alice_1")
            .on_path_changed({
                let path_changes = Arc::clone(&path_changes);
                move |_| {
                    path_changes.fetch_add(1, Ordering::Relaxed);
                }
            })
            .build();

    session.load().await.unwrap();
    assert_eq!(session.path().len(), 2);
    assert_eq!(session.path()[1].reply_id(), Some("m3"));
    assert_eq!(path_changes.load(Ordering::Relaxed), 1);
}

#[tokio::test(start_paused = true)]
async fn test_load_not_found() {
    let mut session =
        SessionBuilder::with_backend(backend_with_history(), "bob_1").build();
    let err = session.load().await.unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::NotFound));
    assert!(session.path().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_streaming_updates_path() {
    let backend = backend_with_history();
    backend.add_reply(PresetReply::with_events([
        StreamEvent::Thinking {
            message_id: "m4".to_owned(),
            delta: "Thinking.".to_owned(),
        },
        text("m4", "Hello, "),
        text("m4", "again!"),
    ]));

    let streamed = Arc::new(Mutex::new(Vec::new()));
    let mut session = SessionBuilder::with_backend(backend.clone(), "alice_1")
        .with_history_retry(Duration::from_secs(1))
        .on_event(|event| {
            assert_eq!(event.message_id(), Some("m4"));
        })
        .on_path_changed({
            let streamed = Arc::clone(&streamed);
            move |path| {
                let reply = path
                    .last()
                    .and_then(|block| block.ai_messages.first())
                    .map(|msg| msg.content.clone())
                    .unwrap_or_default();
                streamed.lock().unwrap().push(reply);
            }
        })
        .build();
    session.load().await.unwrap();

    let outcome = session
        .send_message(OutgoingMessage::new("Third"), pending())
        .await
        .unwrap();
    assert_eq!(outcome, ReplyOutcome::Completed);

    let streamed = streamed.lock().unwrap().clone();
    assert_eq!(
        streamed,
        [
            "re: Second",
            "Parsing in progress, please wait...",
            "",
            "Hello, ",
            "Hello, again!",
            "Hello, again!",
        ]
    );

    let requests = backend.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].parent_id, "m3");
    assert_eq!(requests[0].user_message, "Third");

    let last = session.path().last().unwrap();
    assert_eq!(last.reply_id(), Some("m4"));
    assert_eq!(last.ai_messages[0].thinking.as_deref(), Some("Thinking."));
    assert!(!session.state().is_receiving());
}

#[tokio::test(start_paused = true)]
async fn test_abort() {
    let backend = backend_with_history();
    backend.add_reply(
        PresetReply::with_events([text("m4", "Partial")])
            .with_ending(PresetEnding::Hang),
    );

    let mut session = SessionBuilder::with_backend(backend, "alice_1").build();
    session.load().await.unwrap();
    let outcome = session
        .send_message(
            OutgoingMessage::new("Third"),
            sleep(Duration::from_millis(50)),
        )
        .await
        .unwrap();
    assert_eq!(outcome, ReplyOutcome::Aborted);

    let last = session.path().last().unwrap();
    assert_eq!(last.ai_messages[0].content, "Partial ⚠️ Abort By User");
    assert!(!session.state().is_receiving());
}

#[tokio::test(start_paused = true)]
async fn test_failure_drops_pending_turn() {
    let backend = backend_with_history();
    backend.add_reply(
        PresetReply::with_events([text("m4", "Half")])
            .with_ending(PresetEnding::Fail),
    );

    let mut session = SessionBuilder::with_backend(backend, "alice_1").build();
    session.load().await.unwrap();
    let err = session
        .send_message(OutgoingMessage::new("Third"), pending())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::Other));

    assert!(!session.state().is_receiving());
    assert_eq!(session.state().history().len(), 6);
    assert_eq!(session.path().len(), 2);
    assert_eq!(session.path()[1].reply_id(), Some("m3"));

    // Without a preset reply the request itself fails.
    let err = session
        .send_message(OutgoingMessage::new("Fourth"), pending())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::Other));
    assert!(!session.state().is_receiving());
    assert_eq!(session.state().history().len(), 6);
    let last = session.path().last().unwrap();
    assert_eq!(
        last.user_message.as_ref().map(|msg| msg.content.as_str()),
        Some("Second")
    );
}

#[tokio::test(start_paused = true)]
async fn test_branch_navigation() {
    let backend = backend_with_history();
    backend.add_reply(PresetReply::with_events([text("m4", "Deeper")]));

    let mut session =
        SessionBuilder::with_backend(backend.clone(), "alice_1").build();
    session.load().await.unwrap();

    assert!(session.previous_branch("m1"));
    assert_eq!(session.path()[1].reply_id(), Some("m2"));
    assert!(!session.previous_branch("m1"));

    session
        .send_message(OutgoingMessage::new("Go on"), pending())
        .await
        .unwrap();
    assert_eq!(backend.requests()[0].parent_id, "m2");
    assert_eq!(session.path().len(), 3);

    assert!(session.next_branch("m1"));
    assert_eq!(session.path().len(), 2);
    assert_eq!(session.path()[1].reply_id(), Some("m3"));

    assert!(session.select_branch("m1", 0));
    assert_eq!(session.path().len(), 3);
    assert_eq!(session.path()[2].reply_id(), Some("m4"));
}
