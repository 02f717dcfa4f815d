use myth_plate_core::{
    Document, Editor, MarkKind, Marks, Node, PluginRegistry, Point, Selection, selection_has_mark,
};
use pretty_assertions::assert_eq;
use serde_json::json;

fn bold() -> Marks {
    Marks {
        bold: true,
        ..Marks::default()
    }
}

fn editor_selecting(doc: Document, anchor: Point, focus: Point) -> Editor {
    Editor::new(doc, Selection::new(anchor, focus), PluginRegistry::myth())
}

fn block_children(editor: &Editor, ix: usize) -> Vec<Node> {
    let Node::Element(el) = &editor.doc().children[ix] else {
        panic!("expected element at [{ix}]");
    };
    el.children.clone()
}

#[test]
fn toggling_bold_over_a_range_splits_and_restores() {
    let mut editor = editor_selecting(
        Document::seeded("hello world"),
        Point::new(vec![0, 0], 0),
        Point::new(vec![0, 0], 5),
    );

    assert!(editor.execute("marks.toggle_bold", None));
    assert_eq!(
        block_children(&editor, 0),
        vec![Node::styled("hello", bold()), Node::text(" world")]
    );
    assert!(selection_has_mark(
        editor.doc(),
        editor.selection(),
        MarkKind::Bold
    ));

    assert!(editor.execute("marks.toggle_bold", None));
    assert_eq!(block_children(&editor, 0), vec![Node::text("hello world")]);
}

#[test]
fn partially_marked_ranges_are_marked_fully() {
    let doc = Document::new(vec![Node::element(
        myth_plate_core::BlockKind::Paragraph,
        vec![Node::styled("ab", bold()), Node::text("cd")],
    )]);
    let mut editor = editor_selecting(doc, Point::new(vec![0, 0], 0), Point::new(vec![0, 1], 2));
    assert!(!selection_has_mark(
        editor.doc(),
        editor.selection(),
        MarkKind::Bold
    ));

    assert!(editor.execute("marks.toggle_bold", None));
    assert_eq!(
        block_children(&editor, 0),
        vec![Node::styled("abcd", bold())]
    );
}

#[test]
fn range_marks_span_several_blocks() {
    let doc = Document::new(vec![Node::paragraph("ab"), Node::paragraph("cd")]);
    let mut editor = editor_selecting(doc, Point::new(vec![0, 0], 1), Point::new(vec![1, 0], 1));

    assert!(editor.execute("marks.toggle_italic", None));
    let italic = Marks {
        italic: true,
        ..Marks::default()
    };
    assert_eq!(
        block_children(&editor, 0),
        vec![Node::text("a"), Node::styled("b", italic.clone())]
    );
    assert_eq!(
        block_children(&editor, 1),
        vec![Node::styled("c", italic), Node::text("d")]
    );
}

#[test]
fn collapsed_toggle_marks_the_next_typed_text() {
    let mut editor = Editor::new(
        Document::seeded("hello"),
        Selection::collapsed(Point::new(vec![0, 0], 5)),
        PluginRegistry::myth(),
    );

    assert!(editor.execute("marks.toggle_bold", None));
    assert_eq!(editor.selection().focus, Point::new(vec![0, 1], 0));
    assert!(editor.execute("text.insert", Some(json!({ "text": "!" }))));

    assert_eq!(
        block_children(&editor, 0),
        vec![Node::text("hello"), Node::styled("!", bold())]
    );
}

#[test]
fn links_are_set_trimmed_and_removed() {
    let mut editor = editor_selecting(
        Document::seeded("docs here"),
        Point::new(vec![0, 0], 0),
        Point::new(vec![0, 0], 4),
    );

    assert!(editor.execute(
        "marks.set_link",
        Some(json!({ "url": " https://example.com " }))
    ));
    let linked = Marks {
        link: Some("https://example.com".to_string()),
        ..Marks::default()
    };
    assert_eq!(
        block_children(&editor, 0),
        vec![Node::styled("docs", linked), Node::text(" here")]
    );

    assert!(editor.execute("marks.unset_link", None));
    assert_eq!(block_children(&editor, 0), vec![Node::text("docs here")]);

    let err = editor
        .run_command("marks.set_link", Some(json!({ "url": "  " })))
        .unwrap_err();
    assert_eq!(err.message(), "Link URL must not be empty");
}
