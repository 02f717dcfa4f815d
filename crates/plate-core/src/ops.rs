use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::core::{
    AttrPatch, Document, Marks, Node, Point, Selection, clamp_to_char_boundary, insert_node,
    node_mut, node_ref, node_text_mut, patch_apply, remove_node,
};
use crate::error::ApplyError;

pub type Path = Vec<usize>;

/// The primitive document edits. Every op has an exact inverse, returned by
/// [`Op::apply`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Op {
    InsertText {
        #[serde(default)]
        path: Path,
        offset: usize,
        text: String,
    },
    RemoveText {
        #[serde(default)]
        path: Path,
        range: Range<usize>,
    },
    InsertNode {
        #[serde(default)]
        path: Path,
        node: Node,
    },
    RemoveNode {
        #[serde(default)]
        path: Path,
    },
    SetNodeAttrs {
        #[serde(default)]
        path: Path,
        patch: AttrPatch,
    },
    SetTextMarks {
        #[serde(default)]
        path: Path,
        marks: Marks,
    },
}

impl Op {
    pub fn path(&self) -> &[usize] {
        match self {
            Op::InsertText { path, .. }
            | Op::RemoveText { path, .. }
            | Op::InsertNode { path, .. }
            | Op::RemoveNode { path }
            | Op::SetNodeAttrs { path, .. }
            | Op::SetTextMarks { path, .. } => path,
        }
    }

    /// Applies the op to `doc` and moves the points of `selection` so they
    /// keep pointing at the same content. Returns the inverse op.
    pub fn apply(self, doc: &mut Document, selection: &mut Selection) -> Result<Op, ApplyError> {
        match self {
            Op::InsertText { path, offset, text } => {
                let leaf = node_text_mut(doc, &path)?;
                if offset > leaf.text.len() {
                    return Err(ApplyError::OutOfRange(format!(
                        "offset {offset} past the end of a {} byte leaf",
                        leaf.text.len()
                    )));
                }
                let offset = clamp_to_char_boundary(&leaf.text, offset);
                leaf.text.insert_str(offset, &text);
                for_each_point(selection, |point| {
                    if point.path == path && point.offset >= offset {
                        point.offset += text.len();
                    }
                });
                Ok(Op::RemoveText {
                    range: offset..offset + text.len(),
                    path,
                })
            }
            Op::RemoveText { path, range } => {
                let leaf = node_text_mut(doc, &path)?;
                if range.start > range.end || range.end > leaf.text.len() {
                    return Err(ApplyError::OutOfRange(format!(
                        "range {}..{} outside a {} byte leaf",
                        range.start,
                        range.end,
                        leaf.text.len()
                    )));
                }
                let start = clamp_to_char_boundary(&leaf.text, range.start);
                let end = clamp_to_char_boundary(&leaf.text, range.end).max(start);
                let removed: String = leaf.text.drain(start..end).collect();
                for_each_point(selection, |point| {
                    if point.path == path && point.offset > start {
                        point.offset = point.offset.saturating_sub(end - start).max(start);
                    }
                });
                Ok(Op::InsertText {
                    path,
                    offset: start,
                    text: removed,
                })
            }
            Op::InsertNode { path, node } => {
                insert_node(doc, &path, node)?;
                shift_siblings(selection, &path);
                Ok(Op::RemoveNode { path })
            }
            Op::RemoveNode { path } => {
                let removed = remove_node(doc, &path)?;
                relocate_after_remove(selection, &path, &removed, doc);
                Ok(Op::InsertNode {
                    path,
                    node: removed,
                })
            }
            Op::SetNodeAttrs { path, patch } => {
                let previous = match node_mut(doc, &path)? {
                    Node::Element(el) => patch_apply(&mut el.attrs, &patch),
                    Node::Void(v) => patch_apply(&mut v.attrs, &patch),
                    Node::Text(_) => {
                        return Err(ApplyError::InvalidPath("Text has no attrs".into()));
                    }
                };
                Ok(Op::SetNodeAttrs {
                    path,
                    patch: previous,
                })
            }
            Op::SetTextMarks { path, marks } => {
                let leaf = node_text_mut(doc, &path)?;
                let previous = std::mem::replace(&mut leaf.marks, marks);
                Ok(Op::SetTextMarks {
                    path,
                    marks: previous,
                })
            }
        }
    }
}

fn for_each_point(selection: &mut Selection, mut f: impl FnMut(&mut Point)) {
    f(&mut selection.anchor);
    f(&mut selection.focus);
}

/// Index of `point` among the children of `parent`, when the point lies
/// inside one of them.
fn child_index(point: &Point, parent: &[usize]) -> Option<usize> {
    if point.path.len() > parent.len() && point.path.starts_with(parent) {
        Some(point.path[parent.len()])
    } else {
        None
    }
}

/// A node was inserted at `path`: points in later siblings move one down.
fn shift_siblings(selection: &mut Selection, path: &[usize]) {
    let Some((&index, parent)) = path.split_last() else {
        return;
    };
    for_each_point(selection, |point| {
        if child_index(point, parent).is_some_and(|ix| ix >= index) {
            point.path[parent.len()] += 1;
        }
    });
}

/// A node was removed from `path`. Points inside it move to the previous
/// sibling; when the removed node was a text leaf whose content now ends its
/// left neighbour (a merge), they keep their characters.
fn relocate_after_remove(selection: &mut Selection, path: &[usize], removed: &Node, doc: &Document) {
    let Some((&index, parent)) = path.split_last() else {
        return;
    };
    let depth = parent.len();

    let merged_into = match (removed, index.checked_sub(1)) {
        (Node::Text(right), Some(left_ix)) => {
            let mut left_path = parent.to_vec();
            left_path.push(left_ix);
            match node_ref(doc, &left_path) {
                Some(Node::Text(left))
                    if left.marks == right.marks && left.text.ends_with(&right.text) =>
                {
                    Some((left_ix, left.text.len() - right.text.len(), right.text.len()))
                }
                _ => None,
            }
        }
        _ => None,
    };

    for_each_point(selection, |point| {
        let Some(ix) = child_index(point, parent) else {
            return;
        };
        if ix > index {
            point.path[depth] = ix - 1;
            return;
        }
        if ix < index {
            return;
        }

        point.path.truncate(depth + 1);
        match merged_into {
            Some((left_ix, prefix, len)) => {
                point.path[depth] = left_ix;
                point.offset = prefix + point.offset.min(len);
            }
            None => {
                point.path[depth] = index.saturating_sub(1);
                point.offset = 0;
            }
        }
    });
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransactionMeta {
    /// Where the transaction came from, e.g. `command:text.insert`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(default)]
    pub ops: Vec<Op>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selection_after: Option<Selection>,
    #[serde(default)]
    pub meta: TransactionMeta,
}

impl Transaction {
    pub fn new(ops: Vec<Op>) -> Self {
        Self {
            ops,
            ..Self::default()
        }
    }

    /// Moves the selection only. Empty, so it never commits on its own, but
    /// it carries the selection through a command chain.
    pub fn select(selection: Selection) -> Self {
        Self::default().selection_after(selection)
    }

    pub fn selection_after(mut self, selection_after: Selection) -> Self {
        self.selection_after = Some(selection_after);
        self
    }

    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.meta.source = Some(source.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn caret(path: Path, offset: usize) -> Selection {
        Selection::collapsed(Point::new(path, offset))
    }

    #[test]
    fn text_ops_invert_and_move_the_caret() {
        let mut doc = Document::seeded("hello");
        let mut selection = caret(vec![0, 0], 5);

        let inverse = Op::InsertText {
            path: vec![0, 0],
            offset: 0,
            text: ">> ".into(),
        }
        .apply(&mut doc, &mut selection)
        .unwrap();
        assert_eq!(selection.focus.offset, 8);
        assert_eq!(
            inverse,
            Op::RemoveText {
                path: vec![0, 0],
                range: 0..3
            }
        );

        inverse.apply(&mut doc, &mut selection).unwrap();
        assert_eq!(doc, Document::seeded("hello"));
        assert_eq!(selection.focus.offset, 5);
    }

    #[test]
    fn text_ops_outside_the_leaf_are_rejected() {
        let mut doc = Document::seeded("hello ");
        let mut selection = caret(vec![0, 0], 6);

        let err = Op::RemoveText {
            path: vec![0, 0],
            range: 6..12,
        }
        .apply(&mut doc, &mut selection)
        .unwrap_err();
        assert!(matches!(err, ApplyError::OutOfRange(_)));

        let err = Op::InsertText {
            path: vec![0, 0],
            offset: 7,
            text: "x".into(),
        }
        .apply(&mut doc, &mut selection)
        .unwrap_err();
        assert!(matches!(err, ApplyError::OutOfRange(_)));
        assert_eq!(doc, Document::seeded("hello "));
    }

    #[test]
    fn removing_a_merged_leaf_keeps_the_caret_on_its_character() {
        let mut doc = Document::new(vec![Node::element(
            crate::schema::BlockKind::Paragraph,
            vec![Node::text("abcd"), Node::text("cd")],
        )]);
        let mut selection = caret(vec![0, 1], 1);

        Op::RemoveNode { path: vec![0, 1] }
            .apply(&mut doc, &mut selection)
            .unwrap();
        assert_eq!(selection.focus, Point::new(vec![0, 0], 3));
    }

    #[test]
    fn inserting_a_block_shifts_later_points() {
        let mut doc = Document::seeded("x");
        let mut selection = caret(vec![0, 0], 1);

        Op::InsertNode {
            path: vec![0],
            node: Node::paragraph("above"),
        }
        .apply(&mut doc, &mut selection)
        .unwrap();
        assert_eq!(selection.focus, Point::new(vec![1, 0], 1));
        assert_eq!(
            Op::RemoveNode { path: vec![1] }.path(),
            &[1]
        );
    }
}
