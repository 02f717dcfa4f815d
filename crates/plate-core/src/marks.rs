use serde::{Deserialize, Serialize};

use crate::core::{
    CommandContext, Document, ElementNode, Marks, Node, Point, Selection, TextNode,
    clamp_to_char_boundary,
};
use crate::error::{CommandError, QueryError};
use crate::ops::{Op, Path, Transaction};
use crate::plugin::{
    CommandSpec, PlatePlugin, QuerySpec, child_path, is_text_block, node_at_path,
    point_for_global_offset, point_global_offset, required_str,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkKind {
    Bold,
    Italic,
    Underline,
    Strike,
    Code,
}

impl MarkKind {
    pub const ALL: [MarkKind; 5] = [
        MarkKind::Bold,
        MarkKind::Italic,
        MarkKind::Underline,
        MarkKind::Strike,
        MarkKind::Code,
    ];

    pub fn command_id(self) -> &'static str {
        match self {
            MarkKind::Bold => "marks.toggle_bold",
            MarkKind::Italic => "marks.toggle_italic",
            MarkKind::Underline => "marks.toggle_underline",
            MarkKind::Strike => "marks.toggle_strike",
            MarkKind::Code => "marks.toggle_code",
        }
    }

    fn label(self) -> &'static str {
        match self {
            MarkKind::Bold => "Bold",
            MarkKind::Italic => "Italic",
            MarkKind::Underline => "Underline",
            MarkKind::Strike => "Strikethrough",
            MarkKind::Code => "Inline code",
        }
    }

    pub fn get(self, marks: &Marks) -> bool {
        match self {
            MarkKind::Bold => marks.bold,
            MarkKind::Italic => marks.italic,
            MarkKind::Underline => marks.underline,
            MarkKind::Strike => marks.strike,
            MarkKind::Code => marks.code,
        }
    }

    pub fn set(self, marks: &mut Marks, on: bool) {
        match self {
            MarkKind::Bold => marks.bold = on,
            MarkKind::Italic => marks.italic = on,
            MarkKind::Underline => marks.underline = on,
            MarkKind::Strike => marks.strike = on,
            MarkKind::Code => marks.code = on,
        }
    }
}

pub struct MarksPlugin;

impl PlatePlugin for MarksPlugin {
    fn id(&self) -> &'static str {
        "marks"
    }

    fn commands(&self) -> Vec<CommandSpec> {
        let mut commands: Vec<CommandSpec> = MarkKind::ALL
            .into_iter()
            .map(|kind| {
                CommandSpec::new(kind.command_id(), kind.label(), move |ctx, _args| {
                    toggle_mark(ctx, kind)
                })
                .keywords(["format", "mark"])
            })
            .collect();

        commands.push(
            CommandSpec::new("marks.set_link", "Link", |ctx, args| {
                let url = required_str(args, "url")?.trim().to_string();
                if url.is_empty() {
                    return Err(CommandError::new("Link URL must not be empty"));
                }
                apply_marks(ctx, &move |mut marks: Marks| {
                    marks.link = Some(url.clone());
                    marks
                })
            })
            .keywords(["link", "url"])
            .args_example(serde_json::json!({ "url": "https://example.com" })),
        );
        commands.push(CommandSpec::new("marks.unset_link", "Remove link", |ctx, _args| {
            apply_marks(ctx, &|mut marks: Marks| {
                marks.link = None;
                marks
            })
        }));

        commands
    }

    fn queries(&self) -> Vec<QuerySpec> {
        vec![QuerySpec::new("marks.active", |ctx, _args| {
            let marks = match node_at_path(ctx.doc(), &ctx.selection().focus.path) {
                Some(Node::Text(text)) => text.marks.clone(),
                _ => Marks::default(),
            };
            serde_json::to_value(marks).map_err(|e| QueryError::new(e.to_string()))
        })]
    }
}

fn toggle_mark(ctx: &CommandContext<'_>, kind: MarkKind) -> Result<Transaction, CommandError> {
    let selection = ctx.selection();
    let on = if selection.is_collapsed() {
        match node_at_path(ctx.doc(), &selection.focus.path) {
            Some(Node::Text(text)) => !kind.get(&text.marks),
            _ => return Err(CommandError::new("Selection is not in a text node")),
        }
    } else {
        !all_selected_text_has(ctx.doc(), selection, kind)?
    };

    apply_marks(ctx, &move |mut marks: Marks| {
        kind.set(&mut marks, on);
        marks
    })
}

fn apply_marks(
    ctx: &CommandContext<'_>,
    apply: &dyn Fn(Marks) -> Marks,
) -> Result<Transaction, CommandError> {
    let selection = ctx.selection();
    if selection.is_collapsed() {
        let (ops, selection_after) = toggle_mark_at_caret(ctx, apply)?;
        return Ok(Transaction::new(ops).selection_after(selection_after));
    }
    let (ops, selection_after) = apply_mark_range(ctx.doc(), selection, apply)?;
    Ok(Transaction::new(ops).selection_after(selection_after))
}

struct TextBlock<'a> {
    path: Path,
    el: &'a ElementNode,
}

fn text_blocks_in_order(doc: &Document) -> Vec<TextBlock<'_>> {
    fn walk<'a>(nodes: &'a [Node], path: &mut Vec<usize>, out: &mut Vec<TextBlock<'a>>) {
        for (ix, node) in nodes.iter().enumerate() {
            let Node::Element(el) = node else {
                continue;
            };

            path.push(ix);
            if is_text_block(el) {
                out.push(TextBlock {
                    path: path.clone(),
                    el,
                });
            } else {
                walk(&el.children, path, out);
            }
            path.pop();
        }
    }

    let mut out = Vec::new();
    walk(&doc.children, &mut Vec::new(), &mut out);
    out
}

fn inline_text_len(children: &[Node]) -> usize {
    children
        .iter()
        .map(|n| match n {
            Node::Text(t) => t.text.len(),
            _ => 0,
        })
        .sum()
}

/// Global byte range selected in each affected block.
struct BlockRange<'a> {
    block: &'a TextBlock<'a>,
    start: usize,
    end: usize,
}

fn selected_block_ranges<'a>(
    blocks: &'a [TextBlock<'a>],
    selection: &Selection,
) -> Result<Vec<BlockRange<'a>>, CommandError> {
    let (start, end) = selection.ordered();
    let block_index = |point: &Point| {
        let block_path = point.path.split_last().map(|(_, p)| p)?;
        blocks.iter().position(|b| b.path == block_path)
    };
    let start_index =
        block_index(&start).ok_or("Selection start is not in a text block")?;
    let end_index = block_index(&end).ok_or("Selection end is not in a text block")?;

    let start_leaf = start.path.last().copied().unwrap_or(0);
    let end_leaf = end.path.last().copied().unwrap_or(0);

    Ok(blocks
        .iter()
        .enumerate()
        .take(end_index + 1)
        .skip(start_index)
        .map(|(ix, block)| {
            let children = block.el.children.as_slice();
            let start = if ix == start_index {
                point_global_offset(children, start_leaf, start.offset)
            } else {
                0
            };
            let end = if ix == end_index {
                point_global_offset(children, end_leaf, end.offset)
            } else {
                inline_text_len(children)
            };
            BlockRange { block, start, end }
        })
        .collect())
}

fn all_selected_text_has(
    doc: &Document,
    selection: &Selection,
    kind: MarkKind,
) -> Result<bool, CommandError> {
    let blocks = text_blocks_in_order(doc);
    let ranges = selected_block_ranges(&blocks, selection)?;

    let mut saw_text = false;
    for range in ranges {
        if range.start >= range.end {
            continue;
        }
        let mut cursor = 0usize;
        for node in &range.block.el.children {
            let Node::Text(t) = node else {
                continue;
            };
            let (node_start, node_end) = (cursor, cursor + t.text.len());
            cursor = node_end;
            if node_end <= range.start || node_start >= range.end {
                continue;
            }
            saw_text = true;
            if !kind.get(&t.marks) {
                return Ok(false);
            }
        }
    }
    Ok(saw_text)
}

/// Splits the inline children so that exactly `[start, end)` is remarked.
fn apply_marks_in_block(
    children: &[Node],
    start_global: usize,
    end_global: usize,
    apply: &dyn Fn(Marks) -> Marks,
) -> Vec<Node> {
    if start_global >= end_global {
        return children.to_vec();
    }

    let mut out: Vec<Node> = Vec::new();
    let mut cursor = 0usize;

    for node in children {
        let Node::Text(t) = node else {
            out.push(node.clone());
            continue;
        };
        let node_start = cursor;
        let node_end = cursor + t.text.len();
        cursor = node_end;

        if end_global <= node_start || start_global >= node_end {
            out.push(node.clone());
            continue;
        }

        let sel_start = clamp_to_char_boundary(&t.text, start_global.saturating_sub(node_start));
        let sel_end = clamp_to_char_boundary(&t.text, end_global.saturating_sub(node_start));

        let pieces = [
            (&t.text[..sel_start], t.marks.clone()),
            (&t.text[sel_start..sel_end], apply(t.marks.clone())),
            (&t.text[sel_end..], t.marks.clone()),
        ];
        for (text, marks) in pieces {
            if !text.is_empty() {
                out.push(Node::Text(TextNode {
                    text: text.to_string(),
                    marks,
                }));
            }
        }
    }

    if out.is_empty() {
        out.push(Node::text(""));
    }
    out
}

fn apply_mark_range(
    doc: &Document,
    selection: &Selection,
    apply: &dyn Fn(Marks) -> Marks,
) -> Result<(Vec<Op>, Selection), CommandError> {
    let blocks = text_blocks_in_order(doc);
    let ranges = selected_block_ranges(&blocks, selection)?;

    let anchor_first = selection.ordered().0 == selection.anchor;
    let mut start_point: Option<Point> = None;
    let mut end_point: Option<Point> = None;
    let mut ops = Vec::new();
    let last = ranges.len().saturating_sub(1);

    for (ix, range) in ranges.iter().enumerate() {
        let children = range.block.el.children.as_slice();
        let next = apply_marks_in_block(children, range.start, range.end, apply);
        if ix == 0 {
            start_point = Some(point_for_global_offset(&range.block.path, &next, range.start));
        }
        if ix == last {
            end_point = Some(point_for_global_offset(&range.block.path, &next, range.end));
        }
        if next.as_slice() == children {
            continue;
        }

        for child_ix in (0..children.len()).rev() {
            ops.push(Op::RemoveNode {
                path: child_path(&range.block.path, child_ix),
            });
        }
        for (child_ix, node) in next.into_iter().enumerate() {
            ops.push(Op::InsertNode {
                path: child_path(&range.block.path, child_ix),
                node,
            });
        }
    }

    let (Some(start), Some(end)) = (start_point, end_point) else {
        return Err(CommandError::new("Selection is not in a text block"));
    };
    let selection_after = if anchor_first {
        Selection::new(start, end)
    } else {
        Selection::new(end, start)
    };
    Ok((ops, selection_after))
}

/// With a collapsed selection the marks apply to an empty leaf at the caret,
/// so the next typed text picks them up.
fn toggle_mark_at_caret(
    ctx: &CommandContext<'_>,
    apply: &dyn Fn(Marks) -> Marks,
) -> Result<(Vec<Op>, Selection), CommandError> {
    let focus = &ctx.selection().focus;
    let Some((&child_ix, block_path)) = focus.path.split_last() else {
        return Err(CommandError::new("Selection is not in a text node"));
    };
    let Some(Node::Element(el)) = node_at_path(ctx.doc(), block_path) else {
        return Err(CommandError::new("Selection is not in a text block"));
    };
    let Some(Node::Text(text)) = el.children.get(child_ix) else {
        return Err(CommandError::new("Selection is not in a text node"));
    };

    let marks_after = apply(text.marks.clone());
    if marks_after == text.marks {
        return Ok((Vec::new(), ctx.selection().clone()));
    }

    if text.text.is_empty() {
        return Ok((
            vec![Op::SetTextMarks {
                path: focus.path.clone(),
                marks: marks_after,
            }],
            Selection::collapsed(Point::new(focus.path.clone(), 0)),
        ));
    }

    let cursor = clamp_to_char_boundary(&text.text, focus.offset);
    let left = &text.text[..cursor];
    let right = &text.text[cursor..];

    let mut replacement: Vec<Node> = Vec::new();
    let mut caret_child_ix = child_ix;
    if !left.is_empty() {
        replacement.push(Node::styled(left, text.marks.clone()));
        caret_child_ix += 1;
    }
    replacement.push(Node::styled("", marks_after));
    if !right.is_empty() {
        replacement.push(Node::styled(right, text.marks.clone()));
    }

    let mut ops = vec![Op::RemoveNode {
        path: focus.path.clone(),
    }];
    for (i, node) in replacement.into_iter().enumerate() {
        ops.push(Op::InsertNode {
            path: child_path(block_path, child_ix + i),
            node,
        });
    }

    Ok((
        ops,
        Selection::collapsed(Point::new(child_path(block_path, caret_child_ix), 0)),
    ))
}

/// Whether every selected character carries `kind`; used for toolbar state.
pub fn selection_has_mark(doc: &Document, selection: &Selection, kind: MarkKind) -> bool {
    if selection.is_collapsed() {
        return matches!(
            node_at_path(doc, &selection.focus.path),
            Some(Node::Text(text)) if kind.get(&text.marks)
        );
    }
    all_selected_text_has(doc, selection, kind).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn marks_split_a_leaf_in_three() {
        let children = vec![Node::text("hello")];
        let out = apply_marks_in_block(&children, 1, 3, &|mut m: Marks| {
            m.bold = true;
            m
        });
        let bold = Marks {
            bold: true,
            ..Marks::default()
        };
        assert_eq!(
            out,
            vec![Node::text("h"), Node::styled("el", bold), Node::text("lo")]
        );
    }

    #[test]
    fn mark_value_serializes_as_snake_case() {
        assert_eq!(
            serde_json::to_value(MarkKind::Strike).ok(),
            Some(serde_json::Value::from("strike"))
        );
    }
}
