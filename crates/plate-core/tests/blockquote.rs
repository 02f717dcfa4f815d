use myth_plate_core::{BlockKind, Document, Editor, Node, PluginRegistry, Point, Selection};
use pretty_assertions::assert_eq;

fn quote(children: Vec<Node>) -> Node {
    Node::element(BlockKind::Blockquote, children)
}

#[test]
fn wrap_creates_blockquote_and_remaps_selection() {
    let doc = Document::new(vec![Node::paragraph("a"), Node::paragraph("wise words")]);
    let mut editor = Editor::new(
        doc,
        Selection::collapsed(Point::new(vec![1, 0], 4)),
        PluginRegistry::myth(),
    );

    assert!(editor.execute("blockquote.wrap", None));

    assert_eq!(
        editor.doc().children,
        vec![
            Node::paragraph("a"),
            quote(vec![Node::paragraph("wise words")])
        ]
    );
    assert_eq!(editor.selection().focus, Point::new(vec![1, 0, 0], 4));
}

#[test]
fn wrapping_inside_a_quote_is_a_noop() {
    let doc = Document::new(vec![quote(vec![Node::paragraph("x")])]);
    let mut editor = Editor::new(
        doc,
        Selection::collapsed(Point::new(vec![0, 0, 0], 0)),
        PluginRegistry::myth(),
    );

    assert!(!editor.run_command("blockquote.wrap", None).unwrap());
}

#[test]
fn unwrap_lifts_every_child() {
    let doc = Document::new(vec![
        quote(vec![Node::paragraph("one"), Node::paragraph("two")]),
        Node::paragraph("after"),
    ]);
    let mut editor = Editor::new(
        doc,
        Selection::collapsed(Point::new(vec![0, 1, 0], 2)),
        PluginRegistry::myth(),
    );

    assert!(editor.execute("blockquote.unwrap", None));

    assert_eq!(
        editor.doc().children,
        vec![
            Node::paragraph("one"),
            Node::paragraph("two"),
            Node::paragraph("after")
        ]
    );
    assert_eq!(editor.selection().focus, Point::new(vec![1, 0], 2));

    assert!(editor.undo());
    assert_eq!(editor.selection().focus, Point::new(vec![0, 1, 0], 2));
}

#[test]
fn empty_quote_receives_a_paragraph() {
    let editor = Editor::new(
        Document::new(vec![quote(Vec::new())]),
        Selection::collapsed(Point::new(vec![0], 0)),
        PluginRegistry::myth(),
    );

    assert_eq!(
        editor.doc().children,
        vec![quote(vec![Node::paragraph("")])]
    );
    assert_eq!(editor.selection().focus, Point::new(vec![0, 0, 0], 0));
}
