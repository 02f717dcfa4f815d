use myth_plate_core::{BlockKind, Document, Editor, Node, PluginRegistry, Point, Selection};
use pretty_assertions::assert_eq;
use serde_json::json;

fn editor_with(text: &str) -> Editor {
    Editor::new(
        Document::seeded(text),
        Selection::collapsed(Point::new(vec![0, 0], text.len())),
        PluginRegistry::myth(),
    )
}

fn list(kind: BlockKind, items: &[&str]) -> Node {
    let item_kind = kind.list_item_kind().unwrap_or(BlockKind::ListItem);
    Node::element(
        kind,
        items
            .iter()
            .map(|text| Node::element(item_kind, vec![Node::paragraph(*text)]))
            .collect(),
    )
}

#[test]
fn bullet_toggle_wraps_and_unwraps() {
    let mut editor = editor_with("milk");

    assert!(editor.execute("list.toggle_bullet", None));
    assert_eq!(
        editor.doc().children,
        vec![list(BlockKind::BulletList, &["milk"])]
    );
    assert_eq!(editor.selection().focus, Point::new(vec![0, 0, 0, 0], 4));

    assert!(editor.execute("list.toggle_bullet", None));
    assert_eq!(editor.doc().children, vec![Node::paragraph("milk")]);
    assert_eq!(editor.selection().focus, Point::new(vec![0, 0], 4));
}

#[test]
fn toggling_another_kind_converts_the_list() {
    let mut editor = editor_with("milk");
    assert!(editor.execute("list.toggle_bullet", None));
    assert!(editor.execute("list.toggle_ordered", None));

    assert_eq!(
        editor.doc().children,
        vec![list(BlockKind::OrderedList, &["milk"])]
    );

    assert!(editor.execute("list.toggle_task", None));
    assert_eq!(
        editor.doc().children,
        vec![list(BlockKind::TaskList, &["milk"])]
    );
}

#[test]
fn enter_in_a_list_adds_an_item_and_enter_on_an_empty_item_leaves_the_list() {
    let mut editor = editor_with("eggs");
    assert!(editor.execute("list.toggle_bullet", None));

    assert!(editor.execute("block.split", None));
    assert!(editor.execute("text.insert", Some(json!({ "text": "ham" }))));
    assert_eq!(
        editor.doc().children,
        vec![list(BlockKind::BulletList, &["eggs", "ham"])]
    );
    assert_eq!(editor.selection().focus, Point::new(vec![0, 1, 0, 0], 3));

    assert!(editor.execute("block.split", None));
    assert!(editor.execute("block.split", None));
    assert_eq!(
        editor.doc().children,
        vec![
            list(BlockKind::BulletList, &["eggs", "ham"]),
            Node::paragraph("")
        ]
    );
    assert_eq!(editor.selection().focus, Point::new(vec![1, 0], 0));
}

#[test]
fn to_do_items_toggle_checked() {
    let mut editor = editor_with("call mom");
    assert!(editor.execute("list.toggle_task", None));

    assert!(editor.execute("task.toggle_checked", None));
    let checked = |editor: &Editor| {
        editor
            .doc()
            .node(&[0, 0])
            .and_then(|item| item.attrs())
            .and_then(|attrs| attrs.get("checked"))
            .and_then(|v| v.as_bool())
    };
    assert_eq!(checked(&editor), Some(true));

    assert!(editor.execute("task.toggle_checked", Some(json!({ "path": [0, 0] }))));
    assert_eq!(checked(&editor), Some(false));
}

#[test]
fn toggle_checked_outside_a_task_fails() {
    let mut editor = editor_with("plain");
    let err = editor
        .run_command("task.toggle_checked", None)
        .unwrap_err();
    assert_eq!(err.message(), "Cursor is not inside a to-do item");
}

#[test]
fn backspace_at_the_start_of_a_lone_item_lifts_it() {
    let mut editor = Editor::new(
        Document::new(vec![list(BlockKind::BulletList, &["a", "b", "c"])]),
        Selection::collapsed(Point::new(vec![0, 1, 0, 0], 0)),
        PluginRegistry::myth(),
    );

    assert!(editor.execute("text.delete_backward", None));
    assert_eq!(
        editor.doc().children,
        vec![
            list(BlockKind::BulletList, &["a"]),
            Node::paragraph("b"),
            list(BlockKind::BulletList, &["c"]),
        ]
    );
    assert_eq!(editor.selection().focus, Point::new(vec![1, 0], 0));
}

#[test]
fn empty_lists_are_repaired() {
    let editor = Editor::new(
        Document::new(vec![Node::element(BlockKind::BulletList, Vec::new())]),
        Selection::collapsed(Point::new(vec![0], 0)),
        PluginRegistry::myth(),
    );

    assert_eq!(
        editor.doc().children,
        vec![list(BlockKind::BulletList, &[""])]
    );
}
