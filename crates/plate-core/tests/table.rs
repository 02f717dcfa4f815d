use myth_plate_core::{
    BlockKind, Document, Editor, ElementNode, Node, PluginRegistry, Point, Selection,
};
use pretty_assertions::assert_eq;
use serde_json::json;

fn editor_after(text: &str) -> Editor {
    Editor::new(
        Document::seeded(text),
        Selection::collapsed(Point::new(vec![0, 0], text.len())),
        PluginRegistry::myth(),
    )
}

fn table_at<'a>(editor: &'a Editor, ix: usize) -> &'a ElementNode {
    match editor.doc().children.get(ix) {
        Some(Node::Element(el)) if el.kind == "table" => el,
        other => panic!("expected table at {ix}, got {other:?}"),
    }
}

fn shape(table: &ElementNode) -> Vec<usize> {
    table
        .children
        .iter()
        .map(|row| {
            let Node::Element(row) = row else {
                panic!("Expected table_row element");
            };
            assert_eq!(row.kind, "table_row");
            row.children.len()
        })
        .collect()
}

fn header_flags(table: &ElementNode) -> Vec<bool> {
    table
        .children
        .iter()
        .map(|row| {
            let Node::Element(row) = row else {
                panic!("Expected table_row element");
            };
            row.children.iter().all(|cell| {
                cell.attrs()
                    .and_then(|attrs| attrs.get("header"))
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false)
            })
        })
        .collect()
}

#[test]
fn table_insert_creates_rectangular_table_and_moves_selection() {
    let mut editor = editor_after("Intro");

    editor
        .run_command("table.insert", Some(json!({ "rows": 2, "cols": 2 })))
        .unwrap();

    assert_eq!(editor.doc().children.len(), 3);
    let table = table_at(&editor, 1);
    assert_eq!(shape(table), vec![2, 2]);
    for row in &table.children {
        let Node::Element(row) = row else {
            panic!("Expected table_row element");
        };
        for cell in &row.children {
            let Node::Element(cell) = cell else {
                panic!("Expected table_cell element");
            };
            assert_eq!(cell.kind, "table_cell");
            assert_eq!(cell.children, vec![Node::paragraph("")]);
        }
    }
    assert_eq!(editor.doc().children[2], Node::paragraph(""));
    assert_eq!(editor.selection().focus.path, vec![1, 0, 0, 0, 0]);
}

#[test]
fn table_replaces_an_empty_paragraph() {
    let mut editor = Editor::with_myth_plugins();

    assert!(editor.execute("table.insert", Some(json!({ "rows": 1, "cols": 3 }))));

    assert_eq!(editor.doc().children.len(), 2);
    assert_eq!(shape(table_at(&editor, 0)), vec![3]);
    assert_eq!(editor.selection().focus, Point::new(vec![0, 0, 0, 0, 0], 0));
}

#[test]
fn table_defaults_come_from_config() {
    let mut editor = Editor::with_myth_plugins();
    assert!(editor.execute("table.insert", None));

    let table = table_at(&editor, 0);
    assert_eq!(shape(table), vec![3, 3, 3]);
    assert_eq!(header_flags(table), vec![true, false, false]);
}

#[test]
fn table_size_is_clamped() {
    let mut editor = Editor::with_myth_plugins();
    assert!(editor.execute(
        "table.insert",
        Some(json!({ "rows": 0, "cols": 100, "header_row": false }))
    ));

    let table = table_at(&editor, 0);
    assert_eq!(shape(table), vec![32]);
    assert_eq!(header_flags(table), vec![false]);
}

#[test]
fn table_row_and_col_commands_keep_table_rectangular() {
    let mut editor = editor_after("Intro");
    editor
        .run_command("table.insert", Some(json!({ "rows": 2, "cols": 2 })))
        .unwrap();

    editor.run_command("table.add_row_after", None).unwrap();
    assert_eq!(shape(table_at(&editor, 1)), vec![2, 2, 2]);
    assert_eq!(editor.selection().focus.path, vec![1, 1, 0, 0, 0]);

    editor.run_command("table.add_col_after", None).unwrap();
    assert_eq!(shape(table_at(&editor, 1)), vec![3, 3, 3]);
    assert_eq!(editor.selection().focus.path, vec![1, 1, 1, 0, 0]);

    editor.run_command("table.delete_col", None).unwrap();
    assert_eq!(shape(table_at(&editor, 1)), vec![2, 2, 2]);
    assert_eq!(editor.selection().focus.path, vec![1, 1, 1, 0, 0]);

    editor.run_command("table.delete_row", None).unwrap();
    assert_eq!(shape(table_at(&editor, 1)), vec![2, 2]);
    assert_eq!(editor.selection().focus.path, vec![1, 1, 1, 0, 0]);
}

#[test]
fn table_commands_accept_an_explicit_cell_path() {
    let mut editor = Editor::with_myth_plugins();
    editor
        .run_command("table.insert", Some(json!({ "rows": 2, "cols": 2 })))
        .unwrap();

    editor
        .run_command("table.add_col_before", Some(json!({ "path": [0, 1, 1] })))
        .unwrap();
    assert_eq!(shape(table_at(&editor, 0)), vec![3, 3]);
    assert_eq!(editor.selection().focus.path, vec![0, 1, 1, 0, 0]);

    editor
        .run_command("table.add_row_before", Some(json!({ "path": [0, 0, 0] })))
        .unwrap();
    assert_eq!(shape(table_at(&editor, 0)), vec![3, 3, 3]);
    assert_eq!(editor.selection().focus.path, vec![0, 0, 0, 0, 0]);
}

#[test]
fn deleting_the_last_row_or_column_removes_the_table() {
    let mut editor = Editor::with_myth_plugins();
    editor
        .run_command("table.insert", Some(json!({ "rows": 1, "cols": 2 })))
        .unwrap();

    editor.run_command("table.delete_row", None).unwrap();
    assert_eq!(
        editor.doc().children,
        vec![Node::paragraph(""), Node::paragraph("")]
    );
    assert_eq!(editor.selection().focus, Point::new(vec![0, 0], 0));

    editor
        .run_command("table.insert", Some(json!({ "rows": 2, "cols": 1 })))
        .unwrap();
    editor.run_command("table.delete_col", None).unwrap();
    assert!(
        editor
            .doc()
            .children
            .iter()
            .all(|node| node.block_kind() == Some(BlockKind::Paragraph))
    );
}

#[test]
fn delete_table_replaces_it_with_a_paragraph() {
    let mut editor = editor_after("Intro");
    editor.run_command("table.insert", None).unwrap();
    editor.run_command("table.delete_table", None).unwrap();

    assert_eq!(
        editor.doc().children,
        vec![
            Node::paragraph("Intro"),
            Node::paragraph(""),
            Node::paragraph("")
        ]
    );
    assert_eq!(editor.selection().focus, Point::new(vec![1, 0], 0));
}

#[test]
fn table_queries_report_the_active_cell() {
    let mut editor = editor_after("Intro");
    assert!(!editor.run_query::<bool>("table.is_active", None).unwrap());
    assert_eq!(
        editor
            .run_query::<serde_json::Value>("table.active_cell", None)
            .unwrap(),
        serde_json::Value::Null
    );

    editor
        .run_command("table.insert", Some(json!({ "rows": 2, "cols": 2 })))
        .unwrap();
    editor.run_command("table.add_col_after", None).unwrap();

    assert!(editor.run_query::<bool>("table.is_active", None).unwrap());
    assert_eq!(
        editor
            .run_query::<serde_json::Value>("table.active_cell", None)
            .unwrap(),
        json!({ "table": [1], "row": 0, "col": 1 })
    );
}

#[test]
fn table_normalize_fills_missing_structure() {
    let ragged = Node::element(
        BlockKind::Table,
        vec![
            Node::element(
                BlockKind::TableRow,
                vec![
                    Node::element(BlockKind::TableCell, vec![Node::paragraph("a")]),
                    Node::element(BlockKind::TableCell, vec![Node::paragraph("b")]),
                ],
            ),
            Node::element(
                BlockKind::TableRow,
                vec![Node::element(
                    BlockKind::TableCell,
                    vec![Node::paragraph("c")],
                )],
            ),
        ],
    );
    let editor = Editor::new(
        Document::new(vec![ragged]),
        Selection::collapsed(Point::new(vec![0, 0, 0, 0, 0], 0)),
        PluginRegistry::myth(),
    );

    assert_eq!(shape(table_at(&editor, 0)), vec![2, 2]);
}

#[test]
fn undo_removes_an_inserted_table() {
    let mut editor = editor_after("Intro");
    let before = editor.doc().clone();

    editor.run_command("table.insert", None).unwrap();
    assert!(editor.undo());
    assert_eq!(editor.doc(), &before);
    assert_eq!(editor.selection().focus, Point::new(vec![0, 0], 5));
}
