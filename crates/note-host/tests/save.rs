mod common;

use std::time::Duration;

use common::Harness;
use planner_note_core::{Point, Selection};
use planner_note_host::EditorHost;
use serde_json::json;

const WINDOW: Duration = Duration::from_millis(800);

fn typing_host(harness: &Harness) -> EditorHost {
    let mut host = harness.host(json!(""));
    host.set_selection(Some(Selection::collapsed(Point::new(vec![0, 0], 0))));
    host
}

#[tokio::test]
async fn rapid_edits_collapse_into_one_save_of_the_latest_state() {
    let harness = Harness::new();
    let mut host = typing_host(&harness);

    for word in ["a", "b", "c"] {
        host.insert_text(word).unwrap();
        harness.clock.advance(Duration::from_millis(300));
        assert!(host.take_due_save().is_none());
    }

    harness.clock.advance(Duration::from_millis(500));
    let ticket = host.take_due_save().expect("save due");
    assert_eq!(ticket.date_key(), "2024-03-04");
    assert_eq!(ticket.serialized(), host.serialized().to_json_string());

    let result = ticket.persist().await;
    assert!(host.finish_save(result));

    let saves = harness.store.saves();
    assert_eq!(saves.len(), 1);
    assert!(saves[0].1.contains("abc"));
    assert!(host.take_due_save().is_none());
}

#[tokio::test]
async fn newer_edits_wait_for_the_save_in_flight() {
    let harness = Harness::new();
    let mut host = typing_host(&harness);

    host.insert_text("first").unwrap();
    harness.clock.advance(WINDOW);
    let in_flight = host.take_due_save().unwrap();

    host.insert_text(" second").unwrap();
    harness.clock.advance(WINDOW);
    assert!(host.take_due_save().is_none());
    assert!(host.next_save_deadline().is_none());

    assert!(host.finish_save(in_flight.persist().await));
    let next = host.take_due_save().expect("newer state queued");
    assert!(next.serialized().contains("first second"));
    assert!(host.finish_save(next.persist().await));

    let saves = harness.store.saves();
    assert_eq!(saves.len(), 2);
    assert!(!saves[0].1.contains("second"));
}

#[tokio::test]
async fn failed_save_notifies_and_retries_the_same_state() {
    let harness = Harness::new();
    let mut host = typing_host(&harness);
    harness.store.fail_saves(true);

    host.insert_text("keep me").unwrap();
    harness.clock.advance(WINDOW);
    let ticket = host.take_due_save().unwrap();
    let attempted = ticket.serialized().to_string();

    let result = ticket.persist().await;
    assert!(!result.is_ok());
    assert!(!host.finish_save(result));
    assert_eq!(harness.notifier.messages(), vec!["Couldn't save note"]);
    assert!(host.has_pending_save());

    harness.store.fail_saves(false);
    harness.clock.advance(WINDOW);
    let retry = host.take_due_save().expect("retry queued");
    assert_eq!(retry.serialized(), attempted);
    assert!(host.finish_save(retry.persist().await));
    assert_eq!(harness.store.saves().len(), 1);
}

#[tokio::test]
async fn failed_save_is_superseded_by_a_newer_edit() {
    let harness = Harness::new();
    let mut host = typing_host(&harness);

    host.insert_text("old").unwrap();
    harness.clock.advance(WINDOW);
    let ticket = host.take_due_save().unwrap();

    host.insert_text(" new").unwrap();
    harness.store.fail_saves(true);
    assert!(!host.finish_save(ticket.persist().await));
    harness.store.fail_saves(false);

    harness.clock.advance(WINDOW);
    let next = host.take_due_save().unwrap();
    assert!(next.serialized().contains("old new"));
    assert!(host.take_due_save().is_none());
}

#[tokio::test]
async fn structured_insert_is_saved_without_waiting() {
    let harness = Harness::new();
    let mut host = harness.host(json!("notes"));
    harness.structurer.reply(Ok(serde_json::from_value(json!({
        "blocks": [{ "type": "paragraph", "segments": [{ "text": "Summary" }] }]
    }))
    .unwrap()));

    let result = host.begin_structuring("talked about stuff").unwrap().run().await;
    assert!(host.finish_structuring(result).unwrap());

    let ticket = host.take_due_save().expect("due immediately");
    assert!(ticket.serialized().contains("Summary"));
}

#[tokio::test]
async fn old_note_save_does_not_block_the_new_note() {
    let harness = Harness::new();
    let mut host = typing_host(&harness);

    host.insert_text("monday").unwrap();
    harness.clock.advance(WINDOW);
    let monday = host.take_due_save().unwrap();

    assert!(host.load("2024-03-05", &json!("")).unwrap().is_none());
    host.set_selection(Some(Selection::collapsed(Point::new(vec![0, 0], 0))));
    host.insert_text("tuesday").unwrap();
    harness.clock.advance(WINDOW);
    let tuesday = host.take_due_save().expect("new note saves independently");

    assert!(host.finish_save(monday.persist().await));
    assert!(host.finish_save(tuesday.persist().await));

    assert!(
        harness
            .store
            .stored("2024-03-04")
            .unwrap()
            .as_str()
            .unwrap()
            .contains("monday")
    );
    assert!(
        harness
            .store
            .stored("2024-03-05")
            .unwrap()
            .as_str()
            .unwrap()
            .contains("tuesday")
    );
}

#[tokio::test]
async fn late_save_failure_after_teardown_is_silent() {
    let harness = Harness::new();
    let mut host = typing_host(&harness);
    host.insert_text("bye").unwrap();

    let last = host.teardown().unwrap();
    harness.store.fail_saves(true);
    assert!(!host.finish_save(last.persist().await));

    assert!(harness.notifier.messages().is_empty());
    assert!(!host.has_pending_save());
}
