use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::{
    AttrPatch, Attrs, CommandContext, Document, ElementNode, Node, Point, Selection, TextNode,
    clamp_to_char_boundary, node_ref,
};
use crate::error::{CommandError, QueryError, RegistryError};
use crate::ops::{Op, Path, Transaction};
use crate::schema::BlockKind;

pub type CommandHandler =
    dyn Fn(&CommandContext<'_>, Option<&Value>) -> Result<Transaction, CommandError> + Send + Sync;

pub type QueryHandler =
    dyn Fn(&CommandContext<'_>, Option<&Value>) -> Result<Value, QueryError> + Send + Sync;

#[derive(Clone)]
pub struct CommandSpec {
    pub id: String,
    pub label: String,
    pub description: Option<String>,
    pub keywords: Vec<String>,
    pub args_example: Option<Value>,
    pub handler: Arc<CommandHandler>,
}

impl CommandSpec {
    pub fn new(
        id: impl Into<String>,
        label: impl Into<String>,
        handler: impl Fn(&CommandContext<'_>, Option<&Value>) -> Result<Transaction, CommandError>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            description: None,
            keywords: Vec::new(),
            args_example: None,
            handler: Arc::new(handler),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    pub fn args_example(mut self, args_example: Value) -> Self {
        self.args_example = Some(args_example);
        self
    }
}

#[derive(Clone)]
pub struct QuerySpec {
    pub id: String,
    pub handler: Arc<QueryHandler>,
}

impl QuerySpec {
    pub fn new(
        id: impl Into<String>,
        handler: impl Fn(&CommandContext<'_>, Option<&Value>) -> Result<Value, QueryError>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        Self {
            id: id.into(),
            handler: Arc::new(handler),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeRole {
    Block,
    Inline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChildConstraint {
    None,
    BlockOnly,
    InlineOnly,
    Any,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSpec {
    pub kind: String,
    pub role: NodeRole,
    pub is_void: bool,
    pub children: ChildConstraint,
}

pub trait NormalizePass: Send + Sync {
    fn id(&self) -> &'static str;
    fn run(&self, doc: &Document, registry: &PluginRegistry) -> Vec<Op>;
}

pub trait PlatePlugin: Send + Sync {
    fn id(&self) -> &'static str;
    fn node_specs(&self) -> Vec<NodeSpec> {
        Vec::new()
    }
    fn normalize_passes(&self) -> Vec<Box<dyn NormalizePass>> {
        Vec::new()
    }
    fn commands(&self) -> Vec<CommandSpec> {
        Vec::new()
    }
    fn queries(&self) -> Vec<QuerySpec> {
        Vec::new()
    }
}

#[derive(Default)]
pub struct PluginRegistry {
    node_specs: HashMap<String, NodeSpec>,
    normalize_passes: Vec<Box<dyn NormalizePass>>,
    commands: HashMap<String, CommandSpec>,
    queries: HashMap<String, QuerySpec>,
}

impl PluginRegistry {
    pub fn new(
        plugins: impl IntoIterator<Item = Box<dyn PlatePlugin>>,
    ) -> Result<Self, RegistryError> {
        let mut registry = Self::default();
        for plugin in plugins {
            registry.register_plugin(plugin)?;
        }
        Ok(registry)
    }

    /// Every node kind, command and normalization pass of the editor.
    pub fn myth() -> Self {
        let plugins: Vec<Box<dyn PlatePlugin>> = vec![
            Box::new(CoreTextPlugin),
            Box::new(CoreNormalizePlugin),
            Box::new(NodeAttrsPlugin),
            Box::new(crate::blocks::HeadingPlugin),
            Box::new(crate::blocks::ListPlugin),
            Box::new(crate::blocks::BlockquotePlugin),
            Box::new(crate::blocks::CodeBlockPlugin),
            Box::new(crate::blocks::AlertPlugin),
            Box::new(crate::blocks::HorizontalRulePlugin),
            Box::new(crate::blocks::ImagePlugin),
            Box::new(crate::blocks::IframePlugin),
            Box::new(crate::blocks::HtmlPlugin),
            Box::new(crate::table::TablePlugin),
            Box::new(crate::tabs::TabsPlugin),
            Box::new(crate::marks::MarksPlugin),
        ];
        Self::new(plugins).expect("built-in registry must be valid")
    }

    fn register_plugin(&mut self, plugin: Box<dyn PlatePlugin>) -> Result<(), RegistryError> {
        for spec in plugin.node_specs() {
            if self.node_specs.contains_key(&spec.kind) {
                return Err(RegistryError::DuplicateKind(spec.kind));
            }
            self.node_specs.insert(spec.kind.clone(), spec);
        }

        self.normalize_passes.extend(plugin.normalize_passes());

        for cmd in plugin.commands() {
            if self.commands.contains_key(&cmd.id) {
                return Err(RegistryError::DuplicateCommand(cmd.id));
            }
            self.commands.insert(cmd.id.clone(), cmd);
        }

        for query in plugin.queries() {
            if self.queries.contains_key(&query.id) {
                return Err(RegistryError::DuplicateQuery(query.id));
            }
            self.queries.insert(query.id.clone(), query);
        }

        Ok(())
    }

    pub fn node_specs(&self) -> &HashMap<String, NodeSpec> {
        &self.node_specs
    }

    pub fn normalize_passes(&self) -> &[Box<dyn NormalizePass>] {
        &self.normalize_passes
    }

    pub fn commands(&self) -> &HashMap<String, CommandSpec> {
        &self.commands
    }

    pub fn command(&self, id: &str) -> Option<CommandSpec> {
        self.commands.get(id).cloned()
    }

    pub fn queries(&self) -> &HashMap<String, QuerySpec> {
        &self.queries
    }

    pub fn query(&self, id: &str) -> Option<QuerySpec> {
        self.queries.get(id).cloned()
    }

    pub fn is_known_kind(&self, kind: &str) -> bool {
        self.node_specs.contains_key(kind)
    }

    /// Ops of the first pass that still finds something to fix. Passes only
    /// ever see a document produced by the previous step.
    pub fn normalize_step(&self, doc: &Document) -> Vec<Op> {
        for pass in &self.normalize_passes {
            let ops = pass.run(doc, self);
            if !ops.is_empty() {
                tracing::trace!(pass = pass.id(), ops = ops.len(), "normalize");
                return ops;
            }
        }
        Vec::new()
    }

    pub fn normalize_selection(&self, doc: &Document, selection: &Selection) -> Selection {
        let fallback = first_text_point(doc).unwrap_or(Point {
            path: vec![0],
            offset: 0,
        });

        let anchor =
            normalize_point_to_existing_text(doc, &selection.anchor).unwrap_or_else(|| {
                normalize_point_to_existing_text(doc, &selection.focus)
                    .unwrap_or_else(|| fallback.clone())
            });
        let focus = normalize_point_to_existing_text(doc, &selection.focus)
            .unwrap_or_else(|| anchor.clone());

        Selection { anchor, focus }
    }
}

pub(crate) fn text_leaf_paths(doc: &Document) -> Vec<Path> {
    fn walk(children: &[Node], path: &mut Vec<usize>, out: &mut Vec<Path>) {
        for (ix, node) in children.iter().enumerate() {
            path.push(ix);
            match node {
                Node::Text(_) => out.push(path.clone()),
                Node::Element(el) => walk(&el.children, path, out),
                Node::Void(_) => {}
            }
            path.pop();
        }
    }

    let mut out = Vec::new();
    walk(&doc.children, &mut Vec::new(), &mut out);
    out
}

pub(crate) fn first_text_point(doc: &Document) -> Option<Point> {
    text_leaf_paths(doc)
        .into_iter()
        .next()
        .map(|path| Point::new(path, 0))
}

/// Resolves `point` to a text leaf: the leaf itself, else the first leaf at or
/// after its path, else the end of the last leaf.
fn normalize_point_to_existing_text(doc: &Document, point: &Point) -> Option<Point> {
    if point.path.is_empty() || doc.children.is_empty() {
        return None;
    }

    if let Some(Node::Text(t)) = node_ref(doc, &point.path) {
        return Some(Point::new(
            point.path.clone(),
            clamp_to_char_boundary(&t.text, point.offset),
        ));
    }

    let leaves = text_leaf_paths(doc);
    if let Some(path) = leaves.iter().find(|path| **path >= point.path) {
        return Some(Point::new(path.clone(), 0));
    }
    let last = leaves.last()?;
    let len = match node_ref(doc, last) {
        Some(Node::Text(t)) => t.text.len(),
        _ => 0,
    };
    Some(Point::new(last.clone(), len))
}

pub(crate) fn node_at_path<'a>(doc: &'a Document, path: &[usize]) -> Option<&'a Node> {
    node_ref(doc, path)
}

pub(crate) fn children_at_path<'a>(doc: &'a Document, parent_path: &[usize]) -> Option<&'a [Node]> {
    if parent_path.is_empty() {
        return Some(&doc.children);
    }
    match node_at_path(doc, parent_path)? {
        Node::Element(el) => Some(&el.children),
        Node::Void(_) | Node::Text(_) => None,
    }
}

pub(crate) fn ancestor_element_path(doc: &Document, path: &[usize], kind: BlockKind) -> Option<Path> {
    ancestor_element_path_of(doc, path, &[kind])
}

pub(crate) fn ancestor_element_path_of(
    doc: &Document,
    path: &[usize],
    kinds: &[BlockKind],
) -> Option<Path> {
    for len in (1..=path.len()).rev() {
        let candidate = &path[..len];
        if let Some(Node::Element(el)) = node_at_path(doc, candidate) {
            if kinds.iter().any(|kind| el.is(*kind)) {
                return Some(candidate.to_vec());
            }
        }
    }
    None
}

pub(crate) fn child_path(parent: &[usize], ix: usize) -> Path {
    let mut path = parent.to_vec();
    path.push(ix);
    path
}

pub(crate) fn is_text_block(el: &ElementNode) -> bool {
    BlockKind::from_tag(&el.kind).is_some_and(|kind| kind.content() == ChildConstraint::InlineOnly)
}

pub(crate) fn block_is_empty(el: &ElementNode) -> bool {
    el.children.iter().all(|child| match child {
        Node::Text(t) => t.text.is_empty(),
        _ => false,
    })
}

/// The inline block holding the text leaf at `leaf_path`.
pub(crate) fn text_block_at<'a>(
    doc: &'a Document,
    leaf_path: &[usize],
) -> Result<(Path, &'a ElementNode), CommandError> {
    let Some((_, block_path)) = leaf_path.split_last() else {
        return Err(CommandError::new("No active block"));
    };
    match node_at_path(doc, block_path) {
        Some(Node::Element(el)) if is_text_block(el) => Ok((block_path.to_vec(), el)),
        Some(_) => Err(CommandError::new("Active block is not a text block")),
        None => Err(CommandError::new("No active block")),
    }
}

pub(crate) fn focus_text_block<'a>(
    ctx: &CommandContext<'a>,
) -> Result<(Path, &'a ElementNode), CommandError> {
    text_block_at(ctx.doc(), &ctx.selection().focus.path)
}

pub(crate) fn replace_node_ops(path: &[usize], node: Node) -> Vec<Op> {
    vec![
        Op::RemoveNode {
            path: path.to_vec(),
        },
        Op::InsertNode {
            path: path.to_vec(),
            node,
        },
    ]
}

/// Converts the focused text block into `kind`, keeping its inline content.
pub(crate) fn set_text_block_kind(
    ctx: &CommandContext<'_>,
    kind: BlockKind,
    attrs: Attrs,
) -> Result<Transaction, CommandError> {
    let (block_path, el) = focus_text_block(ctx)?;
    let next = Node::element_with_attrs(kind, attrs, el.children.clone());
    if let Node::Element(next_el) = &next {
        if next_el == el {
            return Ok(Transaction::default());
        }
    }

    Ok(Transaction::new(replace_node_ops(&block_path, next))
        .selection_after(ctx.selection().clone()))
}

/// Where the caret lands after [`insert_block`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Landing {
    Inside,
    After,
}

/// Inserts `node` below the focused block, replacing the block when it is an
/// empty paragraph, and makes sure a block follows it.
pub(crate) fn insert_block(
    ctx: &CommandContext<'_>,
    node: Node,
    landing: Landing,
) -> Result<Transaction, CommandError> {
    let (block_path, block) = focus_text_block(ctx)?;
    let Some((&block_ix, parent_path)) = block_path.split_last() else {
        return Err(CommandError::new("No active block"));
    };
    let siblings = children_at_path(ctx.doc(), parent_path)
        .ok_or_else(|| CommandError::new("Invalid block parent"))?;

    let replace = block.is(BlockKind::Paragraph) && block_is_empty(block);
    let mut ops = Vec::new();
    let node_ix = if replace {
        ops.push(Op::RemoveNode {
            path: block_path.clone(),
        });
        block_ix
    } else {
        block_ix + 1
    };
    let node_path = child_path(parent_path, node_ix);
    ops.push(Op::InsertNode {
        path: node_path.clone(),
        node,
    });

    let len_after = siblings.len() + usize::from(!replace);
    let next_path = child_path(parent_path, node_ix + 1);
    if node_ix + 1 >= len_after {
        ops.push(Op::InsertNode {
            path: next_path.clone(),
            node: Node::paragraph(""),
        });
    }

    let landing_path = match landing {
        Landing::Inside => node_path,
        Landing::After => next_path,
    };
    Ok(Transaction::new(ops).selection_after(Selection::collapsed(Point::new(landing_path, 0))))
}

pub(crate) fn arg<'a>(args: Option<&'a Value>, key: &str) -> Option<&'a Value> {
    args.and_then(|v| v.get(key))
}

pub(crate) fn str_arg<'a>(args: Option<&'a Value>, key: &str) -> Option<&'a str> {
    arg(args, key).and_then(Value::as_str)
}

pub(crate) fn required_str<'a>(args: Option<&'a Value>, key: &str) -> Result<&'a str, CommandError> {
    str_arg(args, key).ok_or_else(|| CommandError::new(format!("Missing `{key}` argument")))
}

pub(crate) fn u64_arg(args: Option<&Value>, key: &str) -> Option<u64> {
    arg(args, key).and_then(Value::as_u64)
}

pub(crate) fn path_arg(args: Option<&Value>, key: &str) -> Option<Path> {
    let items = arg(args, key)?.as_array()?;
    items
        .iter()
        .map(|v| v.as_u64().map(|ix| ix as usize))
        .collect()
}

/// Ops deleting the selected text inside one text block, and the caret after.
pub(crate) fn delete_selection_ops(ctx: &CommandContext<'_>) -> Result<(Vec<Op>, Point), CommandError> {
    let selection = ctx.selection();
    let (start, end) = selection.ordered();
    if selection.is_collapsed() {
        return Ok((Vec::new(), start));
    }

    let (start_block, block) = text_block_at(ctx.doc(), &start.path)?;
    let (end_block, _) = text_block_at(ctx.doc(), &end.path)?;
    if start_block != end_block {
        return Err(CommandError::new("Selection spans multiple blocks"));
    }

    let start_ix = start.path.last().copied().unwrap_or(0);
    let end_ix = end.path.last().copied().unwrap_or(0);
    let mut ops = Vec::new();

    if start_ix == end_ix {
        ops.push(Op::RemoveText {
            path: start.path.clone(),
            range: start.offset..end.offset,
        });
        return Ok((ops, start));
    }

    ops.push(Op::RemoveText {
        path: end.path.clone(),
        range: 0..end.offset,
    });
    for ix in (start_ix + 1..end_ix).rev() {
        ops.push(Op::RemoveNode {
            path: child_path(&start_block, ix),
        });
    }
    let start_len = match block.children.get(start_ix) {
        Some(Node::Text(t)) => t.text.len(),
        _ => start.offset,
    };
    ops.push(Op::RemoveText {
        path: start.path.clone(),
        range: start.offset..start_len,
    });
    Ok((ops, start))
}

/// Applies `ops` to a copy of the context's document.
pub(crate) fn scratch_apply(
    ctx: &CommandContext<'_>,
    ops: &[Op],
) -> Result<(Document, Selection), CommandError> {
    let mut doc = ctx.doc().clone();
    let mut selection = ctx.selection().clone();
    for op in ops {
        op.clone()
            .apply(&mut doc, &mut selection)
            .map_err(|e| CommandError::new(format!("Failed to apply: {e}")))?;
    }
    Ok((doc, selection))
}

struct CoreTextPlugin;

impl PlatePlugin for CoreTextPlugin {
    fn id(&self) -> &'static str {
        "core.text"
    }

    fn node_specs(&self) -> Vec<NodeSpec> {
        vec![BlockKind::Paragraph.node_spec()]
    }

    fn commands(&self) -> Vec<CommandSpec> {
        vec![
            CommandSpec::new("text.insert", "Insert text", |ctx, args| {
                insert_text(ctx, required_str(args, "text")?)
            })
            .description("Insert text at the caret, replacing the selection.")
            .args_example(serde_json::json!({ "text": "hello" })),
            CommandSpec::new("text.delete_backward", "Delete backward", |ctx, _args| {
                delete_backward(ctx)
            })
            .description("Delete the selection or the character before the caret.")
            .keywords(["backspace", "delete"]),
            CommandSpec::new("text.delete_range", "Delete range", |ctx, args| {
                let path = path_arg(args, "path").ok_or("Missing `path` argument")?;
                let start = u64_arg(args, "start").ok_or("Missing `start` argument")? as usize;
                let end = u64_arg(args, "end").ok_or("Missing `end` argument")? as usize;
                delete_range(ctx, path, start, end)
            })
            .description("Delete a byte range inside one text leaf.")
            .args_example(serde_json::json!({ "path": [0, 0], "start": 0, "end": 1 })),
            CommandSpec::new("block.split", "Split block", |ctx, _args| split_block(ctx))
                .description("Split the block at the caret (Enter).")
                .keywords(["enter", "newline", "split"]),
            CommandSpec::new("block.set_paragraph", "Set paragraph", |ctx, _args| {
                set_text_block_kind(ctx, BlockKind::Paragraph, Attrs::new())
            })
            .description("Convert the active text block into a paragraph.")
            .keywords(["paragraph", "text", "reset"]),
            CommandSpec::new("selection.block_start", "Move to block start", |ctx, _args| {
                let (block_path, _) = focus_text_block(ctx)?;
                Ok(Transaction::select(Selection::collapsed(Point::new(
                    child_path(&block_path, 0),
                    0,
                ))))
            })
            .description("Move the caret to the start of the active block."),
        ]
    }
}

fn insert_text(ctx: &CommandContext<'_>, text: &str) -> Result<Transaction, CommandError> {
    if text.is_empty() {
        return Ok(Transaction::default());
    }

    let (mut ops, caret) = delete_selection_ops(ctx)?;
    let (doc, _) = scratch_apply(ctx, &ops)?;
    let Some(Node::Text(leaf)) = node_at_path(&doc, &caret.path) else {
        return Err(CommandError::new("Selection is not in a text node"));
    };
    let offset = clamp_to_char_boundary(&leaf.text, caret.offset);
    ops.push(Op::InsertText {
        path: caret.path.clone(),
        offset,
        text: text.to_string(),
    });

    Ok(Transaction::new(ops)
        .selection_after(Selection::collapsed(Point::new(caret.path, offset + text.len()))))
}

fn delete_range(
    ctx: &CommandContext<'_>,
    path: Path,
    start: usize,
    end: usize,
) -> Result<Transaction, CommandError> {
    let Some(Node::Text(leaf)) = node_at_path(ctx.doc(), &path) else {
        return Err(CommandError::new("No text node at path"));
    };
    if start > end || end > leaf.text.len() {
        return Err(CommandError::new(format!(
            "Range {start}..{end} is outside the text node"
        )));
    }
    if start == end {
        return Ok(Transaction::default());
    }

    Ok(Transaction::new(vec![Op::RemoveText {
        path: path.clone(),
        range: start..end,
    }])
    .selection_after(Selection::collapsed(Point::new(path, start))))
}

fn delete_backward(ctx: &CommandContext<'_>) -> Result<Transaction, CommandError> {
    if !ctx.selection().is_collapsed() {
        let (ops, caret) = delete_selection_ops(ctx)?;
        return Ok(Transaction::new(ops).selection_after(Selection::collapsed(caret)));
    }

    let focus = &ctx.selection().focus;
    let (block_path, block) = focus_text_block(ctx)?;
    let leaf_ix = focus.path.last().copied().unwrap_or(0);

    if let Some(Node::Text(leaf)) = block.children.get(leaf_ix) {
        let offset = clamp_to_char_boundary(&leaf.text, focus.offset);
        if let Some(ch) = leaf.text[..offset].chars().next_back() {
            let start = offset - ch.len_utf8();
            return Ok(Transaction::new(vec![Op::RemoveText {
                path: focus.path.clone(),
                range: start..offset,
            }])
            .selection_after(Selection::collapsed(Point::new(focus.path.clone(), start))));
        }
    }

    for ix in (0..leaf_ix).rev() {
        let Some(Node::Text(prev)) = block.children.get(ix) else {
            continue;
        };
        let Some(ch) = prev.text.chars().next_back() else {
            continue;
        };
        let path = child_path(&block_path, ix);
        let start = prev.text.len() - ch.len_utf8();
        return Ok(Transaction::new(vec![Op::RemoveText {
            path: path.clone(),
            range: start..prev.text.len(),
        }])
        .selection_after(Selection::collapsed(Point::new(path, start))));
    }

    delete_at_block_start(ctx, &block_path, block)
}

fn delete_at_block_start(
    ctx: &CommandContext<'_>,
    block_path: &[usize],
    block: &ElementNode,
) -> Result<Transaction, CommandError> {
    if !block.is(BlockKind::Paragraph) {
        return set_text_block_kind(ctx, BlockKind::Paragraph, Attrs::new());
    }

    let Some((&block_ix, parent_path)) = block_path.split_last() else {
        return Ok(Transaction::default());
    };

    if block_ix == 0 {
        if let Some(item_path) = ancestor_element_path_of(
            ctx.doc(),
            parent_path,
            &[BlockKind::ListItem, BlockKind::TaskItem],
        ) {
            if item_path == parent_path {
                return crate::blocks::lift_list_item(ctx, &item_path);
            }
        }
        return Ok(Transaction::default());
    }

    let prev_path = child_path(parent_path, block_ix - 1);
    match node_at_path(ctx.doc(), &prev_path) {
        Some(Node::Element(prev)) if is_text_block(prev) => {
            let base = prev.children.len();
            let mut ops: Vec<Op> = block
                .children
                .iter()
                .enumerate()
                .map(|(ix, child)| Op::InsertNode {
                    path: child_path(&prev_path, base + ix),
                    node: child.clone(),
                })
                .collect();
            ops.push(Op::RemoveNode {
                path: block_path.to_vec(),
            });
            Ok(Transaction::new(ops)
                .selection_after(Selection::collapsed(Point::new(child_path(&prev_path, base), 0))))
        }
        Some(Node::Void(_)) => Ok(Transaction::new(vec![Op::RemoveNode { path: prev_path }])),
        _ => Ok(Transaction::default()),
    }
}

fn split_block(ctx: &CommandContext<'_>) -> Result<Transaction, CommandError> {
    let (delete_ops, caret) = delete_selection_ops(ctx)?;
    let (doc, _) = scratch_apply(ctx, &delete_ops)?;
    let (block_path, block) = text_block_at(&doc, &caret.path)?;

    let mut ops = delete_ops;
    if block.is(BlockKind::CodeBlock) {
        ops.push(Op::InsertText {
            path: caret.path.clone(),
            offset: caret.offset,
            text: "\n".to_string(),
        });
        return Ok(Transaction::new(ops)
            .selection_after(Selection::collapsed(Point::new(caret.path, caret.offset + 1))));
    }

    let Some((&block_ix, parent_path)) = block_path.split_last() else {
        return Err(CommandError::new("No active block"));
    };

    if let Some(Node::Element(item)) = node_at_path(&doc, parent_path) {
        let is_item = item.is(BlockKind::ListItem) || item.is(BlockKind::TaskItem);
        if is_item && block_is_empty(block) && block_ix + 1 == item.children.len() {
            let scratch = CommandContext::new(&doc, ctx.selection(), ctx.registry(), ctx.config());
            let lift = crate::blocks::lift_list_item(&scratch, parent_path)?;
            ops.extend(lift.ops);
            let mut tx = Transaction::new(ops);
            tx.selection_after = lift.selection_after;
            return Ok(tx);
        }
    }

    let leaf_ix = caret.path.last().copied().unwrap_or(0);
    let mut tail: Vec<Node> = Vec::new();
    if let Some(Node::Text(leaf)) = block.children.get(leaf_ix) {
        let offset = clamp_to_char_boundary(&leaf.text, caret.offset);
        let rest = &leaf.text[offset..];
        if !rest.is_empty() || leaf_ix + 1 == block.children.len() {
            tail.push(Node::Text(TextNode {
                text: rest.to_string(),
                marks: leaf.marks.clone(),
            }));
        }
        for ix in (leaf_ix + 1..block.children.len()).rev() {
            ops.push(Op::RemoveNode {
                path: child_path(&block_path, ix),
            });
        }
        if !rest.is_empty() {
            ops.push(Op::RemoveText {
                path: caret.path.clone(),
                range: offset..leaf.text.len(),
            });
        }
    }
    tail.extend(block.children.iter().skip(leaf_ix + 1).cloned());
    if tail.is_empty() {
        tail.push(Node::text(""));
    }

    let tail_is_empty = tail.iter().all(|n| n.text_content().is_empty());
    let next_block = match BlockKind::from_tag(&block.kind) {
        Some(BlockKind::Heading) if tail_is_empty => Node::element(BlockKind::Paragraph, tail),
        Some(kind) => Node::element_with_attrs(kind, block.attrs.clone(), tail),
        None => Node::element(BlockKind::Paragraph, tail),
    };

    if let Some(Node::Element(item)) = node_at_path(&doc, parent_path) {
        let item_kind = BlockKind::from_tag(&item.kind).filter(|k| k.is_list_item());
        if let (Some(item_kind), Some((&item_ix, list_path))) = (item_kind, parent_path.split_last()) {
            if block_ix + 1 == item.children.len() {
                let item_path = child_path(list_path, item_ix + 1);
                ops.push(Op::InsertNode {
                    path: item_path.clone(),
                    node: Node::element(item_kind, vec![next_block]),
                });
                let caret = Point::new([item_path, vec![0, 0]].concat(), 0);
                return Ok(Transaction::new(ops).selection_after(Selection::collapsed(caret)));
            }
        }
    }

    let next_path = child_path(parent_path, block_ix + 1);
    ops.push(Op::InsertNode {
        path: next_path.clone(),
        node: next_block,
    });
    Ok(Transaction::new(ops)
        .selection_after(Selection::collapsed(Point::new(child_path(&next_path, 0), 0))))
}

struct NodeAttrsPlugin;

impl PlatePlugin for NodeAttrsPlugin {
    fn id(&self) -> &'static str {
        "core.node_attrs"
    }

    fn commands(&self) -> Vec<CommandSpec> {
        vec![
            CommandSpec::new("node.update_attrs", "Update node attributes", |ctx, args| {
                let path = path_arg(args, "path").ok_or("Missing `path` argument")?;
                let patch = arg(args, "attrs")
                    .and_then(Value::as_object)
                    .ok_or("Missing `attrs` argument")?;
                update_attrs(ctx, path, patch)
            })
            .description("Merge a partial attribute map into a node.")
            .args_example(serde_json::json!({ "path": [0], "attrs": { "active": 1 } })),
        ]
    }
}

fn update_attrs(
    ctx: &CommandContext<'_>,
    path: Path,
    patch: &serde_json::Map<String, Value>,
) -> Result<Transaction, CommandError> {
    let node = ctx.node(&path).ok_or("No node at path")?;
    let current = node
        .attrs()
        .ok_or_else(|| CommandError::new("Text nodes have no attributes"))?;
    let kind = node.block_kind();

    let mut set = Attrs::new();
    for (key, value) in patch {
        let known = kind.is_none_or(|kind| kind.attr_fields().iter().any(|f| f.name == key));
        if !known {
            tracing::debug!(key = key.as_str(), kind = node.kind(), "ignoring unknown attribute");
            continue;
        }
        if current.get(key) != Some(value) {
            set.insert(key.clone(), value.clone());
        }
    }

    if set.is_empty() {
        return Ok(Transaction::default());
    }
    Ok(Transaction::new(vec![Op::SetNodeAttrs {
        path,
        patch: AttrPatch::set(set),
    }]))
}

struct CoreNormalizePlugin;

impl PlatePlugin for CoreNormalizePlugin {
    fn id(&self) -> &'static str {
        "core.normalize"
    }

    fn normalize_passes(&self) -> Vec<Box<dyn NormalizePass>> {
        vec![
            Box::new(EnsureEditableDocument),
            Box::new(ConformAttrsToSchema),
            Box::new(EnsureBlockChildren),
            Box::new(EnsureInlineBlocksHaveTextLeaf),
            Box::new(MergeAdjacentTextLeaves),
        ]
    }
}

struct EnsureEditableDocument;

impl NormalizePass for EnsureEditableDocument {
    fn id(&self) -> &'static str {
        "core.ensure_editable_document"
    }

    fn run(&self, doc: &Document, _registry: &PluginRegistry) -> Vec<Op> {
        match doc.children.last() {
            None | Some(Node::Void(_)) => vec![Op::InsertNode {
                path: vec![doc.children.len()],
                node: Node::paragraph(""),
            }],
            Some(_) => Vec::new(),
        }
    }
}

struct ConformAttrsToSchema;

impl NormalizePass for ConformAttrsToSchema {
    fn id(&self) -> &'static str {
        "schema.attrs"
    }

    fn run(&self, doc: &Document, _registry: &PluginRegistry) -> Vec<Op> {
        let mut ops = Vec::new();

        fn check(kind: &str, attrs: &Attrs, path: &[usize], ops: &mut Vec<Op>) {
            let Some(kind) = BlockKind::from_tag(kind) else {
                return;
            };
            let expected = kind.conform_attrs(attrs);
            if expected == *attrs {
                return;
            }
            let set: Attrs = expected
                .iter()
                .filter(|(k, v)| attrs.get(*k) != Some(*v))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            let remove = attrs
                .keys()
                .filter(|k| !expected.contains_key(*k))
                .cloned()
                .collect();
            ops.push(Op::SetNodeAttrs {
                path: path.to_vec(),
                patch: AttrPatch { set, remove },
            });
        }

        fn walk(children: &[Node], path: &mut Vec<usize>, ops: &mut Vec<Op>) {
            for (ix, node) in children.iter().enumerate() {
                path.push(ix);
                match node {
                    Node::Element(el) => {
                        check(&el.kind, &el.attrs, path, ops);
                        walk(&el.children, path, ops);
                    }
                    Node::Void(v) => check(&v.kind, &v.attrs, path, ops),
                    Node::Text(_) => {}
                }
                path.pop();
            }
        }

        walk(&doc.children, &mut Vec::new(), &mut ops);
        ops
    }
}

/// Block containers hold blocks: loose text is wrapped into paragraphs and
/// empty containers receive one.
struct EnsureBlockChildren;

impl NormalizePass for EnsureBlockChildren {
    fn id(&self) -> &'static str {
        "core.ensure_block_children"
    }

    fn run(&self, doc: &Document, _registry: &PluginRegistry) -> Vec<Op> {
        let mut ops = Vec::new();

        fn wraps_loose_text(children: &[Node], path: &[usize], ops: &mut Vec<Op>) -> bool {
            let before = ops.len();
            let mut ix = children.len();
            while ix > 0 {
                ix -= 1;
                if !matches!(children[ix], Node::Text(_)) {
                    continue;
                }
                let end = ix;
                while ix > 0 && matches!(children[ix - 1], Node::Text(_)) {
                    ix -= 1;
                }
                for remove_ix in (ix..=end).rev() {
                    ops.push(Op::RemoveNode {
                        path: child_path(path, remove_ix),
                    });
                }
                ops.push(Op::InsertNode {
                    path: child_path(path, ix),
                    node: Node::element(BlockKind::Paragraph, children[ix..=end].to_vec()),
                });
            }
            ops.len() > before
        }

        fn walk(children: &[Node], path: &mut Vec<usize>, ops: &mut Vec<Op>) {
            for (ix, node) in children.iter().enumerate() {
                let Node::Element(el) = node else {
                    continue;
                };
                let Some(kind) = BlockKind::from_tag(&el.kind) else {
                    continue;
                };
                if kind.content() != ChildConstraint::BlockOnly {
                    continue;
                }

                path.push(ix);
                let holds_blocks = matches!(
                    kind,
                    BlockKind::ListItem
                        | BlockKind::TaskItem
                        | BlockKind::Blockquote
                        | BlockKind::TableCell
                );
                let changed = if !holds_blocks {
                    false
                } else if el.children.is_empty() {
                    ops.push(Op::InsertNode {
                        path: child_path(path, 0),
                        node: Node::paragraph(""),
                    });
                    true
                } else {
                    wraps_loose_text(&el.children, path, ops)
                };
                if !changed {
                    walk(&el.children, path, ops);
                }
                path.pop();
            }
        }

        if !wraps_loose_text(&doc.children, &[], &mut ops) {
            walk(&doc.children, &mut Vec::new(), &mut ops);
        }
        ops
    }
}

struct EnsureInlineBlocksHaveTextLeaf;

impl NormalizePass for EnsureInlineBlocksHaveTextLeaf {
    fn id(&self) -> &'static str {
        "core.ensure_inline_only_blocks_have_text_leaf"
    }

    fn run(&self, doc: &Document, _registry: &PluginRegistry) -> Vec<Op> {
        let mut ops = Vec::new();

        fn walk(children: &[Node], path: &mut Vec<usize>, ops: &mut Vec<Op>) {
            for (ix, node) in children.iter().enumerate() {
                let Node::Element(el) = node else {
                    continue;
                };

                path.push(ix);

                if is_text_block(el) {
                    // Blocks and voids cannot live inside inline content.
                    for (child_ix, child) in el.children.iter().enumerate().rev() {
                        match child {
                            Node::Text(_) => {}
                            Node::Element(_) => ops.extend(replace_node_ops(
                                &child_path(path, child_ix),
                                Node::text(child.text_content()),
                            )),
                            Node::Void(_) => ops.push(Op::RemoveNode {
                                path: child_path(path, child_ix),
                            }),
                        }
                    }
                    if !el.children.iter().any(|n| matches!(n, Node::Text(_))) {
                        ops.push(Op::InsertNode {
                            path: child_path(path, 0),
                            node: Node::text(""),
                        });
                    }
                } else {
                    walk(&el.children, path, ops);
                }

                path.pop();
            }
        }

        walk(&doc.children, &mut Vec::new(), &mut ops);
        ops
    }
}

struct MergeAdjacentTextLeaves;

impl NormalizePass for MergeAdjacentTextLeaves {
    fn id(&self) -> &'static str {
        "core.merge_adjacent_text_leaves"
    }

    fn run(&self, doc: &Document, _registry: &PluginRegistry) -> Vec<Op> {
        let mut ops = Vec::new();

        fn walk(children: &[Node], path: &mut Vec<usize>, ops: &mut Vec<Op>) {
            for (ix, node) in children.iter().enumerate() {
                let Node::Element(el) = node else {
                    continue;
                };

                path.push(ix);

                if is_text_block(el) {
                    merge_runs(el, path, ops);
                } else {
                    walk(&el.children, path, ops);
                }

                path.pop();
            }
        }

        fn merge_runs(el: &ElementNode, path: &[usize], ops: &mut Vec<Op>) {
            let mut ix = el.children.len();
            while ix > 0 {
                ix -= 1;
                let Node::Text(right) = &el.children[ix] else {
                    continue;
                };

                let mut start = ix;
                while start > 0 {
                    let Some(Node::Text(left)) = el.children.get(start - 1) else {
                        break;
                    };
                    if left.marks != right.marks {
                        break;
                    }
                    start -= 1;
                }

                if start == ix {
                    continue;
                }

                let Some(Node::Text(first)) = el.children.get(start) else {
                    continue;
                };
                let appended: String = el.children[start + 1..=ix]
                    .iter()
                    .filter_map(|node| match node {
                        Node::Text(t) => Some(t.text.as_str()),
                        _ => None,
                    })
                    .collect();

                if !appended.is_empty() {
                    ops.push(Op::InsertText {
                        path: child_path(path, start),
                        offset: first.text.len(),
                        text: appended,
                    });
                }

                for remove_ix in (start + 1..=ix).rev() {
                    ops.push(Op::RemoveNode {
                        path: child_path(path, remove_ix),
                    });
                }

                ix = start;
            }
        }

        walk(&doc.children, &mut Vec::new(), &mut ops);
        ops
    }
}

/// Inline children as one string, and the byte offset of a point inside it.
pub(crate) fn point_global_offset(children: &[Node], child_ix: usize, offset: usize) -> usize {
    let mut global = 0usize;
    for (ix, node) in children.iter().enumerate() {
        let Node::Text(t) = node else {
            continue;
        };
        if ix < child_ix {
            global += t.text.len();
            continue;
        }
        if ix == child_ix {
            global += clamp_to_char_boundary(&t.text, offset);
        }
        break;
    }
    global
}

pub(crate) fn point_for_global_offset(
    block_path: &[usize],
    children: &[Node],
    global_offset: usize,
) -> Point {
    let mut remaining = global_offset;
    let mut last_text: Option<(usize, usize)> = None;
    for (child_ix, node) in children.iter().enumerate() {
        let Node::Text(t) = node else {
            continue;
        };
        if remaining <= t.text.len() {
            return Point::new(
                child_path(block_path, child_ix),
                clamp_to_char_boundary(&t.text, remaining),
            );
        }
        remaining -= t.text.len();
        last_text = Some((child_ix, t.text.len()));
    }

    match last_text {
        Some((ix, len)) => Point::new(child_path(block_path, ix), len),
        None => Point::new(child_path(block_path, 0), 0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_offsets_walk_across_leaves() {
        let children = vec![Node::text("ab"), Node::text("cde")];
        assert_eq!(point_global_offset(&children, 1, 2), 4);
        assert_eq!(point_for_global_offset(&[0], &children, 4), Point::new(vec![0, 1], 2));
        assert_eq!(point_for_global_offset(&[0], &children, 2), Point::new(vec![0, 0], 2));
        assert_eq!(point_for_global_offset(&[0], &children, 99), Point::new(vec![0, 1], 3));
    }

    #[test]
    fn point_on_void_moves_to_next_text_leaf() {
        let doc = Document::new(vec![Node::horizontal_rule(), Node::paragraph("x")]);
        let point = normalize_point_to_existing_text(&doc, &Point::new(vec![0], 0));
        assert_eq!(point, Some(Point::new(vec![1, 0], 0)));
    }

    #[test]
    fn duplicate_commands_are_rejected() {
        struct Twice;
        impl PlatePlugin for Twice {
            fn id(&self) -> &'static str {
                "twice"
            }
            fn commands(&self) -> Vec<CommandSpec> {
                let cmd = CommandSpec::new("x", "X", |_ctx, _args| Ok(Transaction::default()));
                vec![cmd.clone(), cmd]
            }
        }
        let err = PluginRegistry::new([Box::new(Twice) as Box<dyn PlatePlugin>])
            .err()
            .unwrap();
        assert_eq!(err, RegistryError::DuplicateCommand("x".into()));
    }
}
