use serde_json::Value;

use crate::core::{AttrPatch, Attrs, CommandContext, Document, Node, Point, Selection};
use crate::error::CommandError;
use crate::ops::{Op, Transaction};
use crate::plugin::{
    CommandSpec, Landing, NodeSpec, NormalizePass, PlatePlugin, PluginRegistry, QuerySpec,
    ancestor_element_path, ancestor_element_path_of, child_path, focus_text_block, insert_block,
    node_at_path, path_arg, point_global_offset, replace_node_ops,
    required_str, set_text_block_kind, str_arg, u64_arg,
};
use crate::schema::{ALERT_SEVERITIES, BlockKind};

pub struct HeadingPlugin;

impl PlatePlugin for HeadingPlugin {
    fn id(&self) -> &'static str {
        "heading"
    }

    fn node_specs(&self) -> Vec<NodeSpec> {
        vec![BlockKind::Heading.node_spec()]
    }

    fn commands(&self) -> Vec<CommandSpec> {
        vec![
            CommandSpec::new("block.set_heading", "Set heading", |ctx, args| {
                let level = u64_arg(args, "level").unwrap_or(1).clamp(1, 6);
                set_text_block_kind(
                    ctx,
                    BlockKind::Heading,
                    Attrs::from([("level".to_string(), Value::from(level))]),
                )
            })
            .description("Turn the active block into a heading.")
            .keywords(["heading", "title", "h1", "h2", "h3"])
            .args_example(serde_json::json!({ "level": 1 })),
            CommandSpec::new("block.unset_heading", "Unset heading", |ctx, _args| {
                let (_, block) = focus_text_block(ctx)?;
                if !block.is(BlockKind::Heading) {
                    return Ok(Transaction::default());
                }
                set_text_block_kind(ctx, BlockKind::Paragraph, Attrs::new())
            })
            .description("Turn the active heading back into a paragraph."),
        ]
    }

    fn queries(&self) -> Vec<QuerySpec> {
        vec![QuerySpec::new("block.heading_level", |ctx, _args| {
            let level = focus_text_block(ctx)
                .ok()
                .filter(|(_, block)| block.is(BlockKind::Heading))
                .and_then(|(_, block)| block.attrs.get("level").and_then(Value::as_u64));
            Ok(level.map_or(Value::Null, Value::from))
        })]
    }
}

pub struct ListPlugin;

impl PlatePlugin for ListPlugin {
    fn id(&self) -> &'static str {
        "list"
    }

    fn node_specs(&self) -> Vec<NodeSpec> {
        [
            BlockKind::BulletList,
            BlockKind::OrderedList,
            BlockKind::TaskList,
            BlockKind::ListItem,
            BlockKind::TaskItem,
        ]
        .into_iter()
        .map(BlockKind::node_spec)
        .collect()
    }

    fn normalize_passes(&self) -> Vec<Box<dyn NormalizePass>> {
        vec![Box::new(NormalizeListStructure)]
    }

    fn commands(&self) -> Vec<CommandSpec> {
        vec![
            CommandSpec::new("list.toggle_bullet", "Bullet list", |ctx, _args| {
                toggle_list(ctx, BlockKind::BulletList)
            })
            .keywords(["list", "bullet", "ul"]),
            CommandSpec::new("list.toggle_ordered", "Numbered list", |ctx, _args| {
                toggle_list(ctx, BlockKind::OrderedList)
            })
            .keywords(["list", "numbered", "ordered", "ol"]),
            CommandSpec::new("list.toggle_task", "To-do list", |ctx, _args| {
                toggle_list(ctx, BlockKind::TaskList)
            })
            .keywords(["todo", "task", "checkbox"]),
            CommandSpec::new("task.toggle_checked", "Toggle checked", |ctx, args| {
                let item_path = match path_arg(args, "path") {
                    Some(path) => path,
                    None => ancestor_element_path(
                        ctx.doc(),
                        &ctx.selection().focus.path,
                        BlockKind::TaskItem,
                    )
                    .ok_or("Cursor is not inside a to-do item")?,
                };
                let checked = match ctx.node(&item_path) {
                    Some(Node::Element(el)) if el.is(BlockKind::TaskItem) => {
                        el.attrs.get("checked").and_then(Value::as_bool).unwrap_or(false)
                    }
                    _ => return Err(CommandError::new("No to-do item at path")),
                };
                Ok(Transaction::new(vec![Op::SetNodeAttrs {
                    path: item_path,
                    patch: AttrPatch::set(Attrs::from([(
                        "checked".to_string(),
                        Value::Bool(!checked),
                    )])),
                }]))
            })
            .args_example(serde_json::json!({ "path": [0, 0] })),
        ]
    }
}

fn toggle_list(ctx: &CommandContext<'_>, kind: BlockKind) -> Result<Transaction, CommandError> {
    let (block_path, block) = focus_text_block(ctx)?;

    let item_path = ancestor_element_path_of(
        ctx.doc(),
        &block_path,
        &[BlockKind::ListItem, BlockKind::TaskItem],
    );
    if let Some(item_path) = item_path {
        let list_path = &item_path[..item_path.len() - 1];
        if let Some(Node::Element(list)) = node_at_path(ctx.doc(), list_path) {
            if list.is(kind) {
                return lift_list_item(ctx, &item_path);
            }
            let item_kind = kind.list_item_kind().unwrap_or(BlockKind::ListItem);
            let items = list
                .children
                .iter()
                .map(|item| match item {
                    Node::Element(el) => {
                        Node::element_with_attrs(item_kind, el.attrs.clone(), el.children.clone())
                    }
                    other => Node::element(item_kind, vec![other.clone()]),
                })
                .collect();
            let converted = Node::element_with_attrs(kind, list.attrs.clone(), items);
            return Ok(Transaction::new(replace_node_ops(list_path, converted))
                .selection_after(ctx.selection().clone()));
        }
    }

    let item_kind = kind.list_item_kind().unwrap_or(BlockKind::ListItem);
    let wrapped = Node::element(
        kind,
        vec![Node::element(
            item_kind,
            vec![Node::Element(block.clone())],
        )],
    );
    let selection = ctx.selection();
    Ok(Transaction::new(replace_node_ops(&block_path, wrapped)).selection_after(
        Selection::new(
            nest_point(&selection.anchor, &block_path, &[0, 0]),
            nest_point(&selection.focus, &block_path, &[0, 0]),
        ),
    ))
}

/// Moves the item's blocks out of its list, splitting the list around it.
pub(crate) fn lift_list_item(
    ctx: &CommandContext<'_>,
    item_path: &[usize],
) -> Result<Transaction, CommandError> {
    let Some((&item_ix, list_path)) = item_path.split_last() else {
        return Err(CommandError::new("No list item"));
    };
    let Some(Node::Element(list)) = node_at_path(ctx.doc(), list_path) else {
        return Err(CommandError::new("List item is not inside a list"));
    };
    let kind = BlockKind::from_tag(&list.kind)
        .filter(|kind| kind.is_list())
        .ok_or("List item is not inside a list")?;
    let Some(Node::Element(item)) = list.children.get(item_ix) else {
        return Err(CommandError::new("No list item at path"));
    };
    let Some((&list_ix, parent_path)) = list_path.split_last() else {
        return Err(CommandError::new("List has no parent"));
    };

    let before = &list.children[..item_ix];
    let after = &list.children[item_ix + 1..];

    let mut ops = vec![Op::RemoveNode {
        path: list_path.to_vec(),
    }];
    let mut ix = list_ix;
    if !before.is_empty() {
        ops.push(Op::InsertNode {
            path: child_path(parent_path, ix),
            node: Node::element_with_attrs(kind, list.attrs.clone(), before.to_vec()),
        });
        ix += 1;
    }
    let first_ix = ix;
    for child in &item.children {
        ops.push(Op::InsertNode {
            path: child_path(parent_path, ix),
            node: child.clone(),
        });
        ix += 1;
    }
    if !after.is_empty() {
        ops.push(Op::InsertNode {
            path: child_path(parent_path, ix),
            node: Node::element_with_attrs(kind, list.attrs.clone(), after.to_vec()),
        });
    }

    let selection = ctx.selection();
    Ok(Transaction::new(ops).selection_after(Selection::new(
        lift_point(&selection.anchor, item_path, parent_path, first_ix),
        lift_point(&selection.focus, item_path, parent_path, first_ix),
    )))
}

/// Replaces the container at `path` with its children.
fn unwrap_container(
    ctx: &CommandContext<'_>,
    path: &[usize],
) -> Result<Transaction, CommandError> {
    let Some(Node::Element(container)) = node_at_path(ctx.doc(), path) else {
        return Err(CommandError::new("No container at path"));
    };
    let Some((&ix, parent_path)) = path.split_last() else {
        return Err(CommandError::new("Container has no parent"));
    };

    let mut ops = vec![Op::RemoveNode {
        path: path.to_vec(),
    }];
    ops.extend(
        container
            .children
            .iter()
            .enumerate()
            .map(|(offset, child)| Op::InsertNode {
                path: child_path(parent_path, ix + offset),
                node: child.clone(),
            }),
    );

    let selection = ctx.selection();
    Ok(Transaction::new(ops).selection_after(Selection::new(
        lift_point(&selection.anchor, path, parent_path, ix),
        lift_point(&selection.focus, path, parent_path, ix),
    )))
}

fn lift_point(point: &Point, container: &[usize], parent: &[usize], first_ix: usize) -> Point {
    let depth = container.len();
    if point.path.len() > depth && point.path.starts_with(container) {
        let mut path = child_path(parent, first_ix + point.path[depth]);
        path.extend_from_slice(&point.path[depth + 1..]);
        return Point::new(path, point.offset);
    }
    Point::new(child_path(parent, first_ix), 0)
}

fn nest_point(point: &Point, block_path: &[usize], inner: &[usize]) -> Point {
    if !point.path.starts_with(block_path) {
        return point.clone();
    }
    let mut path = block_path.to_vec();
    path.extend_from_slice(inner);
    path.extend_from_slice(&point.path[block_path.len()..]);
    Point::new(path, point.offset)
}

/// List containers hold only their item kind, and never nothing.
struct NormalizeListStructure;

impl NormalizePass for NormalizeListStructure {
    fn id(&self) -> &'static str {
        "list.normalize_structure"
    }

    fn run(&self, doc: &Document, _registry: &PluginRegistry) -> Vec<Op> {
        let mut ops = Vec::new();

        fn normalize_list(
            children: &[Node],
            item_kind: BlockKind,
            path: &[usize],
            ops: &mut Vec<Op>,
        ) -> bool {
            let before = ops.len();
            if children.is_empty() {
                ops.push(Op::InsertNode {
                    path: child_path(path, 0),
                    node: Node::element(item_kind, vec![Node::paragraph("")]),
                });
                return true;
            }

            for (ix, child) in children.iter().enumerate().rev() {
                let fixed = match child {
                    Node::Element(el) if el.is(item_kind) => continue,
                    Node::Element(el) if BlockKind::from_tag(&el.kind).is_some_and(BlockKind::is_list_item) => {
                        Node::element_with_attrs(item_kind, el.attrs.clone(), el.children.clone())
                    }
                    Node::Text(_) => Node::element(
                        item_kind,
                        vec![Node::element(BlockKind::Paragraph, vec![child.clone()])],
                    ),
                    other => Node::element(item_kind, vec![other.clone()]),
                };
                ops.extend(replace_node_ops(&child_path(path, ix), fixed));
            }
            ops.len() > before
        }

        fn walk(children: &[Node], path: &mut Vec<usize>, ops: &mut Vec<Op>) {
            for (ix, node) in children.iter().enumerate() {
                let Node::Element(el) = node else {
                    continue;
                };
                path.push(ix);
                let item_kind = BlockKind::from_tag(&el.kind).and_then(BlockKind::list_item_kind);
                let changed = match item_kind {
                    Some(item_kind) => normalize_list(&el.children, item_kind, path, ops),
                    None => false,
                };
                if !changed {
                    walk(&el.children, path, ops);
                }
                path.pop();
            }
        }

        walk(&doc.children, &mut Vec::new(), &mut ops);
        ops
    }
}

pub struct BlockquotePlugin;

impl PlatePlugin for BlockquotePlugin {
    fn id(&self) -> &'static str {
        "blockquote"
    }

    fn node_specs(&self) -> Vec<NodeSpec> {
        vec![BlockKind::Blockquote.node_spec()]
    }

    fn commands(&self) -> Vec<CommandSpec> {
        vec![
            CommandSpec::new("blockquote.wrap", "Quote", |ctx, _args| {
                let (block_path, block) = focus_text_block(ctx)?;
                if ancestor_element_path(ctx.doc(), &block_path, BlockKind::Blockquote).is_some() {
                    return Ok(Transaction::default());
                }
                let wrapped =
                    Node::element(BlockKind::Blockquote, vec![Node::Element(block.clone())]);
                let selection = ctx.selection();
                Ok(Transaction::new(replace_node_ops(&block_path, wrapped)).selection_after(
                    Selection::new(
                        nest_point(&selection.anchor, &block_path, &[0]),
                        nest_point(&selection.focus, &block_path, &[0]),
                    ),
                ))
            })
            .keywords(["quote", "blockquote", "citation"]),
            CommandSpec::new("blockquote.unwrap", "Remove quote", |ctx, _args| {
                match ancestor_element_path(
                    ctx.doc(),
                    &ctx.selection().focus.path,
                    BlockKind::Blockquote,
                ) {
                    Some(path) => unwrap_container(ctx, &path),
                    None => Ok(Transaction::default()),
                }
            }),
        ]
    }
}

pub struct CodeBlockPlugin;

impl PlatePlugin for CodeBlockPlugin {
    fn id(&self) -> &'static str {
        "code_block"
    }

    fn node_specs(&self) -> Vec<NodeSpec> {
        vec![BlockKind::CodeBlock.node_spec()]
    }

    fn commands(&self) -> Vec<CommandSpec> {
        vec![
            CommandSpec::new("code_block.set", "Code block", |ctx, args| {
                set_code_block(ctx, language_arg(args))
            })
            .description("Turn the active block into a code block.")
            .keywords(["code", "snippet", "pre"])
            .args_example(serde_json::json!({ "language": "rust" })),
            CommandSpec::new("code_block.toggle", "Toggle code block", |ctx, args| {
                let (_, block) = focus_text_block(ctx)?;
                if block.is(BlockKind::CodeBlock) {
                    plain_text_block(ctx, BlockKind::Paragraph, Attrs::new())
                } else {
                    set_code_block(ctx, language_arg(args))
                }
            })
            .keywords(["code"]),
            CommandSpec::new("code_block.set_language", "Set code language", |ctx, args| {
                let path = match path_arg(args, "path") {
                    Some(path) => path,
                    None => ancestor_element_path(
                        ctx.doc(),
                        &ctx.selection().focus.path,
                        BlockKind::CodeBlock,
                    )
                    .ok_or("Cursor is not inside a code block")?,
                };
                let current = match ctx.node(&path) {
                    Some(Node::Element(el)) if el.is(BlockKind::CodeBlock) => {
                        el.attrs.get("language").cloned().unwrap_or(Value::Null)
                    }
                    _ => return Err(CommandError::new("No code block at path")),
                };
                let language = language_arg(args).map_or(Value::Null, Value::String);
                if current == language {
                    return Ok(Transaction::default());
                }
                Ok(Transaction::new(vec![Op::SetNodeAttrs {
                    path,
                    patch: AttrPatch::set(Attrs::from([("language".to_string(), language)])),
                }]))
            })
            .description("Set the highlighting language; null selects auto-detection.")
            .args_example(serde_json::json!({ "path": [0], "language": "rust" })),
        ]
    }
}

fn language_arg(args: Option<&Value>) -> Option<String> {
    str_arg(args, "language")
        .filter(|language| !language.is_empty() && *language != "auto")
        .map(str::to_string)
}

fn set_code_block(
    ctx: &CommandContext<'_>,
    language: Option<String>,
) -> Result<Transaction, CommandError> {
    let (block_path, block) = focus_text_block(ctx)?;
    if block.is(BlockKind::CodeBlock) {
        let Some(language) = language else {
            return Ok(Transaction::default());
        };
        return Ok(Transaction::new(vec![Op::SetNodeAttrs {
            path: block_path,
            patch: AttrPatch::set(Attrs::from([(
                "language".to_string(),
                Value::String(language),
            )])),
        }]));
    }

    let attrs = Attrs::from([(
        "language".to_string(),
        language.map_or(Value::Null, Value::String),
    )]);
    plain_text_block(ctx, BlockKind::CodeBlock, attrs)
}

/// Converts the focused block into `kind` with a single unmarked text leaf.
fn plain_text_block(
    ctx: &CommandContext<'_>,
    kind: BlockKind,
    attrs: Attrs,
) -> Result<Transaction, CommandError> {
    let (block_path, block) = focus_text_block(ctx)?;
    let text: String = block
        .children
        .iter()
        .map(Node::text_content)
        .collect();
    let next = Node::element_with_attrs(kind, attrs, vec![Node::text(text)]);

    let flatten = |point: &Point| -> Point {
        if point.path.len() != block_path.len() + 1 || !point.path.starts_with(&block_path) {
            return point.clone();
        }
        let leaf_ix = point.path[block_path.len()];
        let global = point_global_offset(&block.children, leaf_ix, point.offset);
        Point::new(child_path(&block_path, 0), global)
    };
    let selection = ctx.selection();
    let selection_after = Selection::new(flatten(&selection.anchor), flatten(&selection.focus));

    Ok(Transaction::new(replace_node_ops(&block_path, next)).selection_after(selection_after))
}

pub struct AlertPlugin;

impl PlatePlugin for AlertPlugin {
    fn id(&self) -> &'static str {
        "alert"
    }

    fn node_specs(&self) -> Vec<NodeSpec> {
        vec![BlockKind::Alert.node_spec()]
    }

    fn commands(&self) -> Vec<CommandSpec> {
        vec![
            CommandSpec::new("alert.insert", "Alert box", |ctx, args| {
                let severity = severity_arg(args)?.unwrap_or("info");
                let alert = Node::element_with_attrs(
                    BlockKind::Alert,
                    Attrs::from([("severity".to_string(), Value::from(severity))]),
                    vec![Node::text("")],
                );
                insert_block(ctx, alert, Landing::Inside)
            })
            .keywords(["alert", "callout", "note", "warning"])
            .args_example(serde_json::json!({ "severity": "warning" })),
            CommandSpec::new("alert.set_severity", "Set alert severity", |ctx, args| {
                let severity = severity_arg(args)?.ok_or("Missing `severity` argument")?;
                let path = match path_arg(args, "path") {
                    Some(path) => path,
                    None => ancestor_element_path(
                        ctx.doc(),
                        &ctx.selection().focus.path,
                        BlockKind::Alert,
                    )
                    .ok_or("Cursor is not inside an alert")?,
                };
                match ctx.node(&path) {
                    Some(Node::Element(el)) if el.is(BlockKind::Alert) => {
                        if el.attrs.get("severity").and_then(Value::as_str) == Some(severity) {
                            return Ok(Transaction::default());
                        }
                    }
                    _ => return Err(CommandError::new("No alert at path")),
                }
                Ok(Transaction::new(vec![Op::SetNodeAttrs {
                    path,
                    patch: AttrPatch::set(Attrs::from([(
                        "severity".to_string(),
                        Value::from(severity),
                    )])),
                }]))
            }),
        ]
    }
}

fn severity_arg(args: Option<&Value>) -> Result<Option<&str>, CommandError> {
    match str_arg(args, "severity") {
        None => Ok(None),
        Some(severity) if ALERT_SEVERITIES.contains(&severity) => Ok(Some(severity)),
        Some(severity) => Err(CommandError::new(format!(
            "Unknown alert severity `{severity}`"
        ))),
    }
}

pub struct HorizontalRulePlugin;

impl PlatePlugin for HorizontalRulePlugin {
    fn id(&self) -> &'static str {
        "horizontal_rule"
    }

    fn node_specs(&self) -> Vec<NodeSpec> {
        vec![BlockKind::HorizontalRule.node_spec()]
    }

    fn commands(&self) -> Vec<CommandSpec> {
        vec![
            CommandSpec::new("horizontal_rule.insert", "Divider", |ctx, _args| {
                insert_block(ctx, Node::horizontal_rule(), Landing::After)
            })
            .keywords(["divider", "rule", "hr", "separator"]),
        ]
    }
}

pub struct ImagePlugin;

impl PlatePlugin for ImagePlugin {
    fn id(&self) -> &'static str {
        "image"
    }

    fn node_specs(&self) -> Vec<NodeSpec> {
        vec![BlockKind::Image.node_spec()]
    }

    fn commands(&self) -> Vec<CommandSpec> {
        vec![
            CommandSpec::new("image.insert", "Image", |ctx, args| {
                let src = required_src(args)?;
                let mut attrs = Attrs::from([("src".to_string(), Value::from(src))]);
                for key in ["alt", "title"] {
                    if let Some(value) = str_arg(args, key) {
                        attrs.insert(key.to_string(), Value::from(value));
                    }
                }
                insert_block(ctx, Node::void(BlockKind::Image, attrs), Landing::After)
            })
            .keywords(["image", "picture", "photo"])
            .args_example(serde_json::json!({ "src": "myth://images/cat.png", "alt": "cat" })),
        ]
    }
}

pub struct IframePlugin;

impl PlatePlugin for IframePlugin {
    fn id(&self) -> &'static str {
        "iframe"
    }

    fn node_specs(&self) -> Vec<NodeSpec> {
        vec![BlockKind::Iframe.node_spec()]
    }

    fn commands(&self) -> Vec<CommandSpec> {
        vec![
            CommandSpec::new("iframe.insert", "Embed webpage", |ctx, args| {
                let src = required_src(args)?;
                let mut attrs = Attrs::from([("src".to_string(), Value::from(src))]);
                for key in ["width", "height"] {
                    if let Some(value) = str_arg(args, key) {
                        attrs.insert(key.to_string(), Value::from(value));
                    }
                }
                insert_block(ctx, Node::void(BlockKind::Iframe, attrs), Landing::After)
            })
            .keywords(["embed", "iframe", "webpage", "url"])
            .args_example(serde_json::json!({ "src": "https://example.com" })),
        ]
    }
}

pub struct HtmlPlugin;

impl PlatePlugin for HtmlPlugin {
    fn id(&self) -> &'static str {
        "html"
    }

    fn node_specs(&self) -> Vec<NodeSpec> {
        vec![BlockKind::Html.node_spec()]
    }

    fn commands(&self) -> Vec<CommandSpec> {
        vec![
            CommandSpec::new("html.insert", "Embed HTML", |ctx, args| {
                let html = required_str(args, "html")?;
                if html.trim().is_empty() {
                    return Err(CommandError::new("HTML must not be empty"));
                }
                let node = Node::void(
                    BlockKind::Html,
                    Attrs::from([("html".to_string(), Value::from(html))]),
                );
                insert_block(ctx, node, Landing::After)
            })
            .keywords(["html", "embed", "raw"])
            .args_example(serde_json::json!({ "html": "<b>hi</b>" })),
        ]
    }
}

fn required_src(args: Option<&Value>) -> Result<&str, CommandError> {
    let src = required_str(args, "src")?.trim();
    if src.is_empty() {
        return Err(CommandError::new("`src` must not be empty"));
    }
    Ok(src)
}
