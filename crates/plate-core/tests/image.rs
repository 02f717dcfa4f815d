use myth_plate_core::{Document, Editor, Node, PluginRegistry, Point, Selection};
use pretty_assertions::assert_eq;
use serde_json::json;

fn editor_with(text: &str, offset: usize) -> Editor {
    Editor::new(
        Document::seeded(text),
        Selection::collapsed(Point::new(vec![0, 0], offset)),
        PluginRegistry::myth(),
    )
}

#[test]
fn insert_image_inserts_void_block_and_paragraph_after() {
    let mut editor = editor_with("hello", 2);

    editor
        .run_command(
            "image.insert",
            Some(json!({
                "src": "https://example.com/a.png",
                "alt": "A"
            })),
        )
        .unwrap();

    assert_eq!(editor.doc().children.len(), 3);
    assert!(matches!(
        editor.doc().children.get(1),
        Some(Node::Void(v)) if v.kind == "image"
            && v.attrs.get("src").and_then(|v| v.as_str()) == Some("https://example.com/a.png")
            && v.attrs.get("alt").and_then(|v| v.as_str()) == Some("A")
    ));

    assert_eq!(editor.selection().focus.path, vec![2, 0]);
    assert_eq!(editor.selection().focus.offset, 0);
}

#[test]
fn insert_image_fills_schema_defaults() {
    let mut editor = Editor::with_myth_plugins();
    assert!(editor.execute("image.insert", Some(json!({ "src": "myth:///tmp/cat.png" }))));

    assert_eq!(
        editor.doc().children,
        vec![
            Node::image("myth:///tmp/cat.png", None),
            Node::paragraph("")
        ]
    );
    let Some(Node::Void(image)) = editor.doc().children.first() else {
        panic!("expected image");
    };
    assert_eq!(image.attrs.get("alt"), Some(&serde_json::Value::Null));
    assert_eq!(image.attrs.get("title"), Some(&serde_json::Value::Null));
}

#[test]
fn insert_image_requires_src() {
    let mut editor = Editor::with_myth_plugins();
    let err = editor
        .run_command("image.insert", Some(json!({})))
        .unwrap_err();
    assert!(err.message().contains("src"));

    let err = editor
        .run_command("image.insert", Some(json!({ "src": "   " })))
        .unwrap_err();
    assert!(err.message().contains("src"));
    assert_eq!(editor.doc().children, vec![Node::paragraph("")]);
}

#[test]
fn insert_iframe_uses_default_frame_attrs() {
    let mut editor = editor_with("see below", 9);
    assert!(editor.execute("iframe.insert", Some(json!({ "src": " https://example.com " }))));

    let Some(Node::Void(frame)) = editor.doc().children.get(1) else {
        panic!("expected iframe");
    };
    assert_eq!(frame.kind, "iframe");
    assert_eq!(frame.attrs.get("src"), Some(&json!("https://example.com")));
    assert_eq!(frame.attrs.get("width"), Some(&json!("100%")));
    assert_eq!(frame.attrs.get("height"), Some(&json!("400px")));
    assert_eq!(editor.selection().focus.path, vec![2, 0]);
}

#[test]
fn insert_html_keeps_markup_verbatim() {
    let mut editor = Editor::with_myth_plugins();
    let html = "<div class=\"note\">\n  <b>hi</b>\n</div>";
    assert!(editor.execute("html.insert", Some(json!({ "html": html }))));

    let Some(Node::Void(block)) = editor.doc().children.first() else {
        panic!("expected html block");
    };
    assert_eq!(block.kind, "html");
    assert_eq!(block.attrs.get("html"), Some(&json!(html)));

    assert!(!editor.execute("html.insert", Some(json!({ "html": "  \n" }))));
}

#[test]
fn divider_lands_the_caret_after_it() {
    let mut editor = editor_with("above", 5);
    assert!(editor.execute("horizontal_rule.insert", None));

    assert_eq!(
        editor.doc().children,
        vec![
            Node::paragraph("above"),
            Node::horizontal_rule(),
            Node::paragraph("")
        ]
    );
    assert_eq!(editor.selection().focus, Point::new(vec![2, 0], 0));
}

#[test]
fn inserting_before_an_existing_block_reuses_it() {
    let doc = Document::new(vec![Node::paragraph("one"), Node::paragraph("two")]);
    let mut editor = Editor::new(
        doc,
        Selection::collapsed(Point::new(vec![0, 0], 3)),
        PluginRegistry::myth(),
    );

    assert!(editor.execute("horizontal_rule.insert", None));
    assert_eq!(
        editor.doc().children,
        vec![
            Node::paragraph("one"),
            Node::horizontal_rule(),
            Node::paragraph("two")
        ]
    );
    assert_eq!(editor.selection().focus, Point::new(vec![2, 0], 0));
}
