use std::cell::RefCell;
use std::rc::Rc;

use myth_plate_core::{
    Commit, CommitKind, Document, Editor, EditorConfig, Node, PluginRegistry, Point, Selection,
};
use pretty_assertions::assert_eq;
use serde_json::json;

type Log = Rc<RefCell<Vec<(CommitKind, Option<String>)>>>;

fn recording_editor() -> (Editor, Log) {
    let mut editor = Editor::with_myth_plugins();
    let log: Log = Rc::default();
    let sink = log.clone();
    editor.subscribe_fn(move |commit: &Commit<'_>| {
        sink.borrow_mut()
            .push((commit.kind, commit.source.map(str::to_string)));
    });
    (editor, log)
}

#[test]
fn chain_commits_once_with_a_combined_source() {
    let (mut editor, log) = recording_editor();

    assert!(editor.execute_chain(&[
        ("text.insert", Some(json!({ "text": "Title" }))),
        ("block.set_heading", Some(json!({ "level": 1 }))),
    ]));

    assert_eq!(editor.doc().children, vec![Node::heading(1, "Title")]);
    assert_eq!(
        *log.borrow(),
        vec![(
            CommitKind::Transaction,
            Some("chain:text.insert+block.set_heading".to_string())
        )]
    );

    assert!(editor.undo());
    assert_eq!(editor.doc().children, vec![Node::paragraph("")]);
    assert!(!editor.can_undo());
}

#[test]
fn a_failing_step_aborts_the_whole_chain() {
    let (mut editor, log) = recording_editor();
    let revision = editor.revision();

    let err = editor
        .run_chain(&[
            ("text.insert", Some(json!({ "text": "lost" }))),
            ("table.add_row_after", None),
        ])
        .unwrap_err();
    assert_eq!(err.message(), "Not in a table");

    let err = editor.run_chain(&[("nope", None)]).unwrap_err();
    assert_eq!(err.message(), "Unknown command: nope");

    assert_eq!(editor.doc().children, vec![Node::paragraph("")]);
    assert_eq!(editor.revision(), revision);
    assert!(log.borrow().is_empty());
}

#[test]
fn later_steps_see_earlier_results() {
    let (mut editor, _) = recording_editor();

    assert!(editor.execute_chain(&[
        ("text.insert", Some(json!({ "text": "/table" }))),
        (
            "text.delete_range",
            Some(json!({ "path": [0, 0], "start": 0, "end": 6 }))
        ),
        ("table.insert", Some(json!({ "rows": 1, "cols": 1 }))),
    ]));

    assert_eq!(editor.doc().children.len(), 2);
    assert!(editor.run_query::<bool>("table.is_active", None).unwrap());
}

#[test]
fn provisional_then_commit_is_one_undo_step() {
    let (mut editor, log) = recording_editor();

    let removal = editor
        .prepare_command("text.insert", Some(&json!({ "text": "draft" })))
        .unwrap();
    let provisional = editor.apply_provisional(removal).unwrap();
    assert!(!editor.can_undo());
    assert_eq!(editor.doc().children, vec![Node::paragraph("draft")]);

    let insert = editor.prepare_command("horizontal_rule.insert", None).unwrap();
    assert!(editor.commit_provisional(provisional, insert).unwrap());

    assert_eq!(
        log.borrow().iter().map(|(kind, _)| *kind).collect::<Vec<_>>(),
        vec![CommitKind::Provisional, CommitKind::Transaction]
    );
    assert_eq!(editor.doc().children.len(), 3);

    assert!(editor.undo());
    assert_eq!(editor.doc().children, vec![Node::paragraph("")]);
    assert!(!editor.can_undo());
}

#[test]
fn rollback_restores_the_exact_state() {
    let (mut editor, log) = recording_editor();
    let before = editor.doc().clone();
    let selection = editor.selection().clone();

    let tx = editor
        .prepare_command("text.insert", Some(&json!({ "text": "gone" })))
        .unwrap();
    let provisional = editor.apply_provisional(tx).unwrap();
    assert!(editor.rollback_provisional(provisional).unwrap());

    assert_eq!(editor.doc(), &before);
    assert_eq!(editor.selection(), &selection);
    assert!(!editor.can_undo());
    assert_eq!(
        log.borrow().last().map(|(kind, _)| *kind),
        Some(CommitKind::Rollback)
    );
}

#[test]
fn rollback_after_a_later_commit_keeps_the_change() {
    let (mut editor, _) = recording_editor();

    let tx = editor
        .prepare_command("text.insert", Some(&json!({ "text": "x" })))
        .unwrap();
    let provisional = editor.apply_provisional(tx).unwrap();
    assert!(editor.execute("text.insert", Some(json!({ "text": "y" }))));

    assert!(!editor.rollback_provisional(provisional).unwrap());
    assert_eq!(editor.doc().children, vec![Node::paragraph("xy")]);

    assert!(editor.undo());
    assert_eq!(editor.doc().children, vec![Node::paragraph("x")]);
    assert!(editor.undo());
    assert_eq!(editor.doc().children, vec![Node::paragraph("")]);
}

#[test]
fn empty_transactions_are_not_commits() {
    let (mut editor, log) = recording_editor();
    assert!(!editor.run_command("text.insert", Some(json!({ "text": "" }))).unwrap());
    assert!(!editor.can_undo());
    assert!(log.borrow().is_empty());
}

#[test]
fn history_is_frozen_while_a_provisional_is_open() {
    let (mut editor, _) = recording_editor();
    assert!(editor.execute("text.insert", Some(json!({ "text": "a" }))));

    let tx = editor
        .prepare_command("text.insert", Some(&json!({ "text": "b" })))
        .unwrap();
    let provisional = editor.apply_provisional(tx).unwrap();
    let revision = editor.revision();

    assert!(editor.has_provisional());
    assert!(!editor.can_undo());
    assert!(!editor.undo());
    assert!(!editor.redo());
    assert_eq!(editor.revision(), revision);
    assert_eq!(editor.doc().children, vec![Node::paragraph("ab")]);

    assert!(editor.rollback_provisional(provisional).unwrap());
    assert!(!editor.has_provisional());
    assert_eq!(editor.doc().children, vec![Node::paragraph("a")]);
    assert!(editor.undo());
    assert_eq!(editor.doc().children, vec![Node::paragraph("")]);
}

#[test]
fn a_late_provisional_record_stays_below_newer_records_when_history_is_capped() {
    let config = EditorConfig {
        max_undo: 2,
        ..EditorConfig::default()
    };
    let mut editor = Editor::with_config(
        Document::seeded(""),
        Selection::collapsed(Point::new(vec![0, 0], 0)),
        PluginRegistry::myth(),
        config,
    );
    assert!(editor.execute("text.insert", Some(json!({ "text": "a" }))));

    let tx = editor
        .prepare_command("text.insert", Some(&json!({ "text": "p" })))
        .unwrap();
    let provisional = editor.apply_provisional(tx).unwrap();
    assert!(editor.execute("text.insert", Some(json!({ "text": "1" }))));
    assert!(editor.execute("text.insert", Some(json!({ "text": "2" }))));
    assert!(!editor.rollback_provisional(provisional).unwrap());
    assert_eq!(editor.doc().children, vec![Node::paragraph("ap12")]);

    assert!(editor.undo());
    assert_eq!(editor.doc().children, vec![Node::paragraph("ap1")]);
    assert!(editor.undo());
    assert_eq!(editor.doc().children, vec![Node::paragraph("ap")]);
    assert!(!editor.can_undo());
}
