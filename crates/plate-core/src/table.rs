use serde_json::Value;

use crate::core::{Attrs, CommandContext, Document, ElementNode, Node, Point, Selection};
use crate::error::CommandError;
use crate::ops::{Op, Path, Transaction};
use crate::plugin::{
    CommandSpec, Landing, NodeSpec, NormalizePass, PlatePlugin, PluginRegistry, QuerySpec,
    ancestor_element_path, arg, child_path, insert_block, node_at_path, path_arg,
    replace_node_ops, u64_arg,
};
use crate::schema::BlockKind;

pub struct TablePlugin;

impl PlatePlugin for TablePlugin {
    fn id(&self) -> &'static str {
        "table"
    }

    fn node_specs(&self) -> Vec<NodeSpec> {
        vec![
            BlockKind::Table.node_spec(),
            BlockKind::TableRow.node_spec(),
            BlockKind::TableCell.node_spec(),
        ]
    }

    fn normalize_passes(&self) -> Vec<Box<dyn NormalizePass>> {
        vec![Box::new(NormalizeTableStructure)]
    }

    fn commands(&self) -> Vec<CommandSpec> {
        vec![
            CommandSpec::new("table.insert", "Table", |ctx, args| {
                let config = ctx.config();
                let rows = u64_arg(args, "rows")
                    .map_or(config.table_rows, |v| v as usize)
                    .clamp(1, 32);
                let cols = u64_arg(args, "cols")
                    .map_or(config.table_cols, |v| v as usize)
                    .clamp(1, 32);
                let header_row = arg(args, "header_row")
                    .and_then(Value::as_bool)
                    .unwrap_or(config.table_header_row);
                insert_block(ctx, table_node(rows, cols, header_row), Landing::Inside)
            })
            .description("Insert a table below the current block.")
            .keywords(["table", "grid"])
            .args_example(serde_json::json!({ "rows": 3, "cols": 3, "header_row": true })),
            CommandSpec::new("table.add_row_before", "Add row before", |ctx, args| {
                add_row(ctx, args, 0)
            })
            .keywords(["table", "row", "insert"]),
            CommandSpec::new("table.add_row_after", "Add row after", |ctx, args| {
                add_row(ctx, args, 1)
            })
            .keywords(["table", "row", "insert"]),
            CommandSpec::new("table.add_col_before", "Add column before", |ctx, args| {
                add_col(ctx, args, 0)
            })
            .keywords(["table", "column", "insert"]),
            CommandSpec::new("table.add_col_after", "Add column after", |ctx, args| {
                add_col(ctx, args, 1)
            })
            .keywords(["table", "column", "insert"]),
            CommandSpec::new("table.delete_row", "Delete row", |ctx, args| {
                delete_row(ctx, args)
            })
            .description("Delete the current table row.")
            .keywords(["table", "row", "delete", "remove"]),
            CommandSpec::new("table.delete_col", "Delete column", |ctx, args| {
                delete_col(ctx, args)
            })
            .description("Delete the current table column.")
            .keywords(["table", "column", "delete", "remove"]),
            CommandSpec::new("table.delete_table", "Delete table", |ctx, args| {
                let cursor = TableCursor::locate(ctx, args)?;
                Ok(replace_with_paragraph(&cursor.table_path))
            })
            .description("Delete the current table and replace it with a paragraph.")
            .keywords(["table", "delete", "remove"]),
        ]
    }

    fn queries(&self) -> Vec<QuerySpec> {
        vec![
            QuerySpec::new("table.is_active", |ctx, _args| {
                let is_active = ancestor_element_path(
                    ctx.doc(),
                    &ctx.selection().focus.path,
                    BlockKind::Table,
                )
                .is_some();
                Ok(Value::Bool(is_active))
            }),
            QuerySpec::new("table.active_cell", |ctx, args| {
                Ok(match TableCursor::locate(ctx, args) {
                    Ok(cursor) => serde_json::json!({
                        "table": cursor.table_path,
                        "row": cursor.row_ix,
                        "col": cursor.col_ix,
                    }),
                    Err(_) => Value::Null,
                })
            }),
        ]
    }
}

fn cell_attrs(header: bool) -> Attrs {
    Attrs::from([("header".to_string(), Value::Bool(header))])
}

fn table_cell_node(header: bool) -> Node {
    Node::element_with_attrs(
        BlockKind::TableCell,
        cell_attrs(header),
        vec![Node::paragraph("")],
    )
}

fn table_row_node(cols: usize, header: bool) -> Node {
    Node::element(
        BlockKind::TableRow,
        (0..cols.max(1)).map(|_| table_cell_node(header)).collect(),
    )
}

pub(crate) fn table_node(rows: usize, cols: usize, header_row: bool) -> Node {
    Node::element(
        BlockKind::Table,
        (0..rows.max(1))
            .map(|row_ix| table_row_node(cols, header_row && row_ix == 0))
            .collect(),
    )
}

fn is_header_cell(node: &Node) -> bool {
    match node {
        Node::Element(el) => el.attrs.get("header").and_then(Value::as_bool).unwrap_or(false),
        _ => false,
    }
}

fn rows(table: &ElementNode) -> impl Iterator<Item = (usize, &ElementNode)> {
    table
        .children
        .iter()
        .enumerate()
        .filter_map(|(ix, node)| match node {
            Node::Element(el) if el.is(BlockKind::TableRow) => Some((ix, el)),
            _ => None,
        })
}

/// The cell a table command acts on: the `path` argument when given, else the
/// cell holding the cursor.
struct TableCursor<'a> {
    table_path: Path,
    table: &'a ElementNode,
    row_ix: usize,
    col_ix: usize,
}

impl<'a> TableCursor<'a> {
    fn locate(ctx: &CommandContext<'a>, args: Option<&Value>) -> Result<Self, CommandError> {
        let cell_path = match path_arg(args, "path") {
            Some(path) => path,
            None => ancestor_element_path(
                ctx.doc(),
                &ctx.selection().focus.path,
                BlockKind::TableCell,
            )
            .ok_or("Not in a table")?,
        };
        if cell_path.len() < 3 {
            return Err(CommandError::new("Invalid table cell path"));
        }

        let table_path = cell_path[..cell_path.len() - 2].to_vec();
        let row_ix = cell_path[cell_path.len() - 2];
        let col_ix = cell_path[cell_path.len() - 1];

        match node_at_path(ctx.doc(), &cell_path) {
            Some(Node::Element(cell)) if cell.is(BlockKind::TableCell) => {}
            _ => return Err(CommandError::new("Not in a table")),
        }
        let Some(Node::Element(table)) = node_at_path(ctx.doc(), &table_path) else {
            return Err(CommandError::new("Invalid table"));
        };
        if !table.is(BlockKind::Table) {
            return Err(CommandError::new("Invalid table"));
        }

        Ok(Self {
            table_path,
            table,
            row_ix,
            col_ix,
        })
    }

    fn row(&self, row_ix: usize) -> Option<&'a ElementNode> {
        match self.table.children.get(row_ix) {
            Some(Node::Element(el)) if el.is(BlockKind::TableRow) => Some(el),
            _ => None,
        }
    }

    fn caret(&self, row_ix: usize, col_ix: usize) -> Selection {
        let mut path = self.table_path.clone();
        path.extend([row_ix, col_ix, 0, 0]);
        Selection::collapsed(Point::new(path, 0))
    }
}

fn replace_with_paragraph(table_path: &[usize]) -> Transaction {
    Transaction::new(replace_node_ops(table_path, Node::paragraph(""))).selection_after(
        Selection::collapsed(Point::new(child_path(table_path, 0), 0)),
    )
}

fn add_row(
    ctx: &CommandContext<'_>,
    args: Option<&Value>,
    shift: usize,
) -> Result<Transaction, CommandError> {
    let cursor = TableCursor::locate(ctx, args)?;
    let row = cursor.row(cursor.row_ix).ok_or("Invalid table row")?;
    let cols = row.children.len().max(1);
    let insert_ix = cursor.row_ix + shift;

    Ok(Transaction::new(vec![Op::InsertNode {
        path: child_path(&cursor.table_path, insert_ix),
        node: table_row_node(cols, false),
    }])
    .selection_after(cursor.caret(insert_ix, cursor.col_ix.min(cols - 1))))
}

fn add_col(
    ctx: &CommandContext<'_>,
    args: Option<&Value>,
    shift: usize,
) -> Result<Transaction, CommandError> {
    let cursor = TableCursor::locate(ctx, args)?;
    let target = cursor.col_ix + shift;

    let mut ops = Vec::new();
    let mut caret_col = target;
    for (row_ix, row) in rows(cursor.table) {
        let insert_ix = target.min(row.children.len());
        let header = row.children.first().is_some_and(is_header_cell);
        ops.push(Op::InsertNode {
            path: [cursor.table_path.as_slice(), &[row_ix, insert_ix]].concat(),
            node: table_cell_node(header),
        });
        if row_ix == cursor.row_ix {
            caret_col = insert_ix;
        }
    }

    Ok(Transaction::new(ops).selection_after(cursor.caret(cursor.row_ix, caret_col)))
}

fn delete_row(ctx: &CommandContext<'_>, args: Option<&Value>) -> Result<Transaction, CommandError> {
    let cursor = TableCursor::locate(ctx, args)?;
    let row_count = rows(cursor.table).count();
    if row_count <= 1 {
        return Ok(replace_with_paragraph(&cursor.table_path));
    }

    let last = cursor.row_ix + 1 >= row_count;
    let (target_row_ix, target_row_in_old_doc) = if last {
        (cursor.row_ix - 1, cursor.row_ix - 1)
    } else {
        (cursor.row_ix, cursor.row_ix + 1)
    };
    let target_cols = cursor
        .row(target_row_in_old_doc)
        .map_or(1, |row| row.children.len().max(1));

    Ok(Transaction::new(vec![Op::RemoveNode {
        path: child_path(&cursor.table_path, cursor.row_ix),
    }])
    .selection_after(cursor.caret(target_row_ix, cursor.col_ix.min(target_cols - 1))))
}

fn delete_col(ctx: &CommandContext<'_>, args: Option<&Value>) -> Result<Transaction, CommandError> {
    let cursor = TableCursor::locate(ctx, args)?;
    let cols = rows(cursor.table)
        .next()
        .map_or(1, |(_, row)| row.children.len().max(1));
    if cols <= 1 {
        return Ok(replace_with_paragraph(&cursor.table_path));
    }

    let target_col_ix = if cursor.col_ix + 1 < cols {
        cursor.col_ix
    } else {
        cursor.col_ix.saturating_sub(1)
    };

    let ops = rows(cursor.table)
        .filter(|(_, row)| cursor.col_ix < row.children.len())
        .map(|(row_ix, _)| Op::RemoveNode {
            path: [cursor.table_path.as_slice(), &[row_ix, cursor.col_ix]].concat(),
        })
        .collect();

    Ok(Transaction::new(ops).selection_after(cursor.caret(cursor.row_ix, target_col_ix)))
}

/// Tables hold rows, rows hold cells, and every row has as many cells as the
/// widest one.
struct NormalizeTableStructure;

impl NormalizePass for NormalizeTableStructure {
    fn id(&self) -> &'static str {
        "table.normalize_structure"
    }

    fn run(&self, doc: &Document, _registry: &PluginRegistry) -> Vec<Op> {
        let mut ops = Vec::new();

        fn wrap_strays(table: &ElementNode, path: &[usize], ops: &mut Vec<Op>) -> bool {
            let before = ops.len();
            for (row_ix, child) in table.children.iter().enumerate() {
                let row = match child {
                    Node::Element(el) if el.is(BlockKind::TableRow) => el,
                    Node::Element(el) if el.is(BlockKind::TableCell) => {
                        ops.extend(replace_node_ops(
                            &child_path(path, row_ix),
                            Node::element(BlockKind::TableRow, vec![child.clone()]),
                        ));
                        continue;
                    }
                    other => {
                        ops.extend(replace_node_ops(
                            &child_path(path, row_ix),
                            Node::element(BlockKind::TableRow, vec![wrap_in_cell(other)]),
                        ));
                        continue;
                    }
                };
                for (cell_ix, cell) in row.children.iter().enumerate() {
                    if matches!(cell, Node::Element(el) if el.is(BlockKind::TableCell)) {
                        continue;
                    }
                    ops.extend(replace_node_ops(
                        &[path, &[row_ix, cell_ix]].concat(),
                        wrap_in_cell(cell),
                    ));
                }
            }
            ops.len() > before
        }

        fn normalize_table(table: &ElementNode, path: &[usize], ops: &mut Vec<Op>) {
            if table.children.is_empty() {
                ops.push(Op::InsertNode {
                    path: child_path(path, 0),
                    node: table_row_node(1, false),
                });
                return;
            }

            let max_cols = rows(table)
                .map(|(_, row)| row.children.len().max(1))
                .max()
                .unwrap_or(1);

            for (row_ix, row) in rows(table) {
                let header = row.children.first().is_some_and(is_header_cell);
                for col_ix in row.children.len()..max_cols {
                    ops.push(Op::InsertNode {
                        path: [path, &[row_ix, col_ix]].concat(),
                        node: table_cell_node(header),
                    });
                }
            }
        }

        fn walk(children: &[Node], path: &mut Vec<usize>, ops: &mut Vec<Op>) {
            for (ix, node) in children.iter().enumerate() {
                let Node::Element(el) = node else {
                    continue;
                };

                path.push(ix);
                let wrapped = el.is(BlockKind::Table) && wrap_strays(el, path, ops);
                if el.is(BlockKind::Table) && !wrapped {
                    normalize_table(el, path, ops);
                }
                if !wrapped {
                    walk(&el.children, path, ops);
                }
                path.pop();
            }
        }

        walk(&doc.children, &mut Vec::new(), &mut ops);
        ops
    }
}

fn wrap_in_cell(node: &Node) -> Node {
    let content = match node {
        Node::Text(_) => Node::element(BlockKind::Paragraph, vec![node.clone()]),
        other => other.clone(),
    };
    Node::element(BlockKind::TableCell, vec![content])
}
