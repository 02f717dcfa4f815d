use myth_plate_core::{
    Document, Editor, EditorConfig, Node, Op, PluginRegistry, Point, Selection, Transaction,
};
use pretty_assertions::assert_eq;
use serde_json::json;

fn editor_with_text(text: &str) -> Editor {
    let doc = Document {
        children: vec![Node::paragraph(text)],
    };
    let selection = Selection::collapsed(Point::new(vec![0, 0], 0));
    Editor::new(doc, selection, PluginRegistry::myth())
}

#[test]
fn undo_redo_handles_multi_op_insert_order() {
    let mut editor = editor_with_text("");

    let tx = Transaction::new(vec![
        Op::InsertText {
            path: vec![0, 0],
            offset: 0,
            text: "a".to_string(),
        },
        Op::InsertText {
            path: vec![0, 0],
            offset: 1,
            text: "b".to_string(),
        },
    ])
    .selection_after(Selection::collapsed(Point::new(vec![0, 0], 2)))
    .source("test:multi_insert");

    editor.apply(tx).unwrap();
    assert_eq!(editor.doc().children, vec![Node::paragraph("ab")]);
    assert_eq!(editor.selection().focus.offset, 2);

    assert!(editor.undo());
    assert_eq!(editor.doc().children, vec![Node::paragraph("")]);
    assert_eq!(editor.selection().focus.offset, 0);

    assert!(editor.redo());
    assert_eq!(editor.doc().children, vec![Node::paragraph("ab")]);
    assert_eq!(editor.selection().focus.offset, 2);
}

#[test]
fn undo_redo_handles_multi_op_paste_newline_shape() {
    let mut editor = editor_with_text("XYZ");
    let selection_before = editor.selection().clone();

    let tx = Transaction::new(vec![
        Op::RemoveText {
            path: vec![0, 0],
            range: 0..3,
        },
        Op::InsertText {
            path: vec![0, 0],
            offset: 0,
            text: "a".to_string(),
        },
        Op::InsertNode {
            path: vec![1],
            node: Node::paragraph("bXYZ"),
        },
    ])
    .selection_after(Selection::collapsed(Point::new(vec![1, 0], 1)))
    .source("test:paste_newline");

    editor.apply(tx).unwrap();
    let doc_after = editor.doc().clone();
    let selection_after = editor.selection().clone();

    assert_eq!(doc_after.children.len(), 2);
    assert_eq!(selection_after.focus.path, vec![1, 0]);
    assert_eq!(selection_after.focus.offset, 1);

    assert!(editor.undo());
    assert_eq!(editor.doc().children, vec![Node::paragraph("XYZ")]);
    assert_eq!(editor.selection(), &selection_before);

    assert!(editor.redo());
    assert_eq!(editor.doc(), &doc_after);
    assert_eq!(editor.selection(), &selection_after);
}

#[test]
fn undoing_every_command_then_redoing_restores_the_final_state() {
    let mut editor = editor_with_text("");
    let doc_before = editor.doc().clone();
    let selection_before = editor.selection().clone();

    let commands = [
        ("text.insert", Some(json!({ "text": "Hello" }))),
        ("block.split", None),
        ("text.insert", Some(json!({ "text": "World" }))),
        ("block.set_heading", Some(json!({ "level": 2 }))),
        ("table.insert", Some(json!({ "rows": 2, "cols": 2 }))),
        ("text.insert", Some(json!({ "text": "cell" }))),
    ];
    for (id, args) in commands.iter().cloned() {
        assert!(editor.execute(id, args), "{id} should commit");
    }
    let doc_after = editor.doc().clone();
    let selection_after = editor.selection().clone();

    for _ in 0..commands.len() {
        assert!(editor.undo());
    }
    assert!(!editor.can_undo());
    assert_eq!(editor.doc(), &doc_before);
    assert_eq!(editor.selection(), &selection_before);

    for _ in 0..commands.len() {
        assert!(editor.redo());
    }
    assert!(!editor.can_redo());
    assert_eq!(editor.doc(), &doc_after);
    assert_eq!(editor.selection(), &selection_after);
}

#[test]
fn history_is_capped_at_max_undo() {
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

    for text in ["a", "b", "c"] {
        assert!(editor.execute("text.insert", Some(json!({ "text": text }))));
    }

    assert!(editor.undo());
    assert!(editor.undo());
    assert!(!editor.undo());
    assert_eq!(editor.doc().children, vec![Node::paragraph("a")]);
}

#[test]
fn a_new_commit_clears_redo() {
    let mut editor = editor_with_text("");
    assert!(editor.execute("text.insert", Some(json!({ "text": "a" }))));
    assert!(editor.undo());
    assert!(editor.can_redo());

    assert!(editor.execute("text.insert", Some(json!({ "text": "b" }))));
    assert!(!editor.can_redo());
    assert!(!editor.redo());
    assert_eq!(editor.doc().children, vec![Node::paragraph("b")]);
}

#[test]
fn failed_command_leaves_document_and_history_untouched() {
    let mut editor = editor_with_text("plain");
    let doc_before = editor.doc().clone();
    let selection_before = editor.selection().clone();
    let revision = editor.revision();

    let err = editor.run_command("table.add_row_after", None).unwrap_err();
    assert_eq!(err.message(), "Not in a table");
    assert!(!editor.execute("table.delete_col", None));
    assert!(!editor.execute("no.such_command", None));

    assert_eq!(editor.doc(), &doc_before);
    assert_eq!(editor.selection(), &selection_before);
    assert_eq!(editor.revision(), revision);
    assert!(!editor.can_undo());
}

#[test]
fn undo_on_empty_history_is_false() {
    let mut editor = editor_with_text("x");
    assert!(!editor.undo());
    assert!(!editor.redo());
}
