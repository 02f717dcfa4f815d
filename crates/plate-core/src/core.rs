use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::EditorConfig;
use crate::error::{ApplyError, CommandError, PathError, QueryError};
use crate::ops::{Op, Path, Transaction};
use crate::plugin::PluginRegistry;
use crate::schema::BlockKind;

pub type Attrs = BTreeMap<String, serde_json::Value>;
pub type ElementKind = String;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Document {
    #[serde(default)]
    pub children: Vec<Node>,
}

impl Document {
    pub fn new(children: Vec<Node>) -> Self {
        Self { children }
    }

    /// A document holding a single paragraph.
    pub fn seeded(text: impl Into<String>) -> Self {
        Self::new(vec![Node::paragraph(text)])
    }

    pub fn node(&self, path: &[usize]) -> Option<&Node> {
        node_ref(self, path)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum Node {
    Element(ElementNode),
    Text(TextNode),
    Void(VoidNode),
}

impl Node {
    pub fn text(text: impl Into<String>) -> Self {
        Node::Text(TextNode {
            text: text.into(),
            marks: Marks::default(),
        })
    }

    pub fn styled(text: impl Into<String>, marks: Marks) -> Self {
        Node::Text(TextNode {
            text: text.into(),
            marks,
        })
    }

    /// An element of `kind` with the kind's default attributes.
    pub fn element(kind: BlockKind, children: Vec<Node>) -> Self {
        Node::Element(ElementNode {
            kind: kind.tag().to_string(),
            attrs: kind.default_attrs(),
            children,
        })
    }

    pub fn element_with_attrs(kind: BlockKind, attrs: Attrs, children: Vec<Node>) -> Self {
        let mut merged = kind.default_attrs();
        merged.extend(attrs);
        Node::Element(ElementNode {
            kind: kind.tag().to_string(),
            attrs: kind.conform_attrs(&merged),
            children,
        })
    }

    pub fn void(kind: BlockKind, attrs: Attrs) -> Self {
        let mut merged = kind.default_attrs();
        merged.extend(attrs);
        Node::Void(VoidNode {
            kind: kind.tag().to_string(),
            attrs: kind.conform_attrs(&merged),
        })
    }

    pub fn paragraph(text: impl Into<String>) -> Self {
        Node::element(BlockKind::Paragraph, vec![Node::text(text)])
    }

    pub fn heading(level: u8, text: impl Into<String>) -> Self {
        Node::element_with_attrs(
            BlockKind::Heading,
            Attrs::from([("level".to_string(), Value::from(level))]),
            vec![Node::text(text)],
        )
    }

    pub fn horizontal_rule() -> Self {
        Node::void(BlockKind::HorizontalRule, Attrs::new())
    }

    pub fn image(src: impl Into<String>, alt: Option<String>) -> Self {
        let mut attrs = Attrs::new();
        attrs.insert("src".to_string(), Value::String(src.into()));
        if let Some(alt) = alt {
            attrs.insert("alt".to_string(), Value::String(alt));
        }
        Node::void(BlockKind::Image, attrs)
    }

    pub fn kind(&self) -> Option<&str> {
        match self {
            Node::Element(el) => Some(el.kind.as_str()),
            Node::Void(v) => Some(v.kind.as_str()),
            Node::Text(_) => None,
        }
    }

    pub fn block_kind(&self) -> Option<BlockKind> {
        self.kind().and_then(BlockKind::from_tag)
    }

    pub fn attrs(&self) -> Option<&Attrs> {
        match self {
            Node::Element(el) => Some(&el.attrs),
            Node::Void(v) => Some(&v.attrs),
            Node::Text(_) => None,
        }
    }

    pub fn as_element(&self) -> Option<&ElementNode> {
        match self {
            Node::Element(el) => Some(el),
            _ => None,
        }
    }

    /// Concatenated text of every leaf below this node.
    pub fn text_content(&self) -> String {
        match self {
            Node::Text(t) => t.text.clone(),
            Node::Element(el) => el.children.iter().map(Node::text_content).collect(),
            Node::Void(_) => String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementNode {
    pub kind: ElementKind,
    #[serde(default)]
    pub attrs: Attrs,
    #[serde(default)]
    pub children: Vec<Node>,
}

impl ElementNode {
    pub fn is(&self, kind: BlockKind) -> bool {
        self.kind == kind.tag()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoidNode {
    pub kind: ElementKind,
    #[serde(default)]
    pub attrs: Attrs,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextNode {
    pub text: String,
    #[serde(default)]
    pub marks: Marks,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Marks {
    #[serde(default, skip_serializing_if = "is_false")]
    pub bold: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub italic: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub underline: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub strike: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub code: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl Marks {
    pub fn is_plain(&self) -> bool {
        *self == Marks::default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    #[serde(default)]
    pub path: Path,
    pub offset: usize,
}

impl Point {
    pub fn new(path: Path, offset: usize) -> Self {
        Self { path, offset }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub anchor: Point,
    pub focus: Point,
}

impl Selection {
    pub fn new(anchor: Point, focus: Point) -> Self {
        Self { anchor, focus }
    }

    pub fn collapsed(point: Point) -> Self {
        Self {
            anchor: point.clone(),
            focus: point,
        }
    }

    pub fn is_collapsed(&self) -> bool {
        self.anchor == self.focus
    }

    /// `(start, end)` in document order.
    pub fn ordered(&self) -> (Point, Point) {
        let mut start = self.anchor.clone();
        let mut end = self.focus.clone();

        if start.path == end.path {
            if end.offset < start.offset {
                std::mem::swap(&mut start, &mut end);
            }
            return (start, end);
        }
        if end.path < start.path {
            std::mem::swap(&mut start, &mut end);
        }
        (start, end)
    }
}

#[derive(Debug, Clone)]
pub struct UndoRecord {
    pub inverse_ops: Vec<Op>,
    pub selection_before: Selection,
    pub selection_after: Selection,
}

#[derive(Debug, Clone)]
pub struct TransactionPreview {
    pub doc: Document,
    pub selection: Selection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitKind {
    Transaction,
    Provisional,
    Rollback,
    Undo,
    Redo,
}

/// Delivered once to every listener after the document changed.
#[derive(Debug)]
pub struct Commit<'a> {
    pub revision: u64,
    pub kind: CommitKind,
    pub source: Option<&'a str>,
    pub document: &'a Document,
    pub selection: &'a Selection,
}

pub trait CommitListener {
    fn on_commit(&mut self, commit: &Commit<'_>);
}

impl<F> CommitListener for F
where
    F: FnMut(&Commit<'_>),
{
    fn on_commit(&mut self, commit: &Commit<'_>) {
        self(commit)
    }
}

/// A transaction that already changed the document but has no undo record
/// yet. It must end in [`Editor::commit_provisional`] or
/// [`Editor::rollback_provisional`]; undo and redo are refused until then.
#[derive(Debug)]
#[must_use = "a provisional transaction must be committed or rolled back"]
pub struct ProvisionalTransaction {
    record: UndoRecord,
    revision: u64,
    pushes_before: u64,
    source: Option<String>,
}

impl ProvisionalTransaction {
    pub fn revision(&self) -> u64 {
        self.revision
    }
}

/// Read-only view handed to command and query handlers.
#[derive(Clone, Copy)]
pub struct CommandContext<'a> {
    doc: &'a Document,
    selection: &'a Selection,
    registry: &'a PluginRegistry,
    config: &'a EditorConfig,
}

impl<'a> CommandContext<'a> {
    pub fn new(
        doc: &'a Document,
        selection: &'a Selection,
        registry: &'a PluginRegistry,
        config: &'a EditorConfig,
    ) -> Self {
        Self {
            doc,
            selection,
            registry,
            config,
        }
    }

    pub fn doc(&self) -> &'a Document {
        self.doc
    }

    pub fn selection(&self) -> &'a Selection {
        self.selection
    }

    pub fn registry(&self) -> &'a PluginRegistry {
        self.registry
    }

    pub fn config(&self) -> &'a EditorConfig {
        self.config
    }

    pub fn node(&self, path: &[usize]) -> Option<&'a Node> {
        node_ref(self.doc, path)
    }
}

struct Staged {
    doc: Document,
    selection: Selection,
    inverse_ops: Vec<Op>,
}

pub struct Editor {
    doc: Document,
    selection: Selection,
    registry: PluginRegistry,
    config: EditorConfig,
    undo_stack: Vec<UndoRecord>,
    redo_stack: Vec<UndoRecord>,
    revision: u64,
    undo_pushes: u64,
    open_provisionals: usize,
    listeners: Vec<Box<dyn CommitListener>>,
}

impl Editor {
    pub fn new(doc: Document, selection: Selection, registry: PluginRegistry) -> Self {
        Self::with_config(doc, selection, registry, EditorConfig::default())
    }

    pub fn with_config(
        doc: Document,
        selection: Selection,
        registry: PluginRegistry,
        config: EditorConfig,
    ) -> Self {
        let mut editor = Self {
            doc,
            selection,
            registry,
            config: config.with_defaults(),
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            revision: 0,
            undo_pushes: 0,
            open_provisionals: 0,
            listeners: Vec::new(),
        };
        editor.normalize_in_place();
        editor
    }

    pub fn with_myth_plugins() -> Self {
        Self::new(
            Document::seeded(""),
            Selection::collapsed(Point::new(vec![0, 0], 0)),
            PluginRegistry::myth(),
        )
    }

    pub fn doc(&self) -> &Document {
        &self.doc
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn set_selection(&mut self, selection: Selection) {
        self.selection = self.registry.normalize_selection(&self.doc, &selection);
    }

    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    /// Incremented on every commit, undo, redo and rollback.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn context(&self) -> CommandContext<'_> {
        CommandContext::new(&self.doc, &self.selection, &self.registry, &self.config)
    }

    pub fn subscribe(&mut self, listener: impl CommitListener + 'static) {
        self.listeners.push(Box::new(listener));
    }

    pub fn subscribe_fn<F>(&mut self, listener: F)
    where
        F: FnMut(&Commit<'_>) + 'static,
    {
        self.listeners.push(Box::new(listener));
    }

    pub fn can_undo(&self) -> bool {
        self.open_provisionals == 0 && !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        self.open_provisionals == 0 && !self.redo_stack.is_empty()
    }

    /// True while a provisional transaction awaits its commit or rollback.
    pub fn has_provisional(&self) -> bool {
        self.open_provisionals > 0
    }

    pub fn undo(&mut self) -> bool {
        if self.has_provisional() {
            debug!("undo refused while a provisional transaction is open");
            return false;
        }
        let Some(record) = self.undo_stack.pop() else {
            return false;
        };

        match self.replay(&record.inverse_ops, &record.selection_before) {
            Ok(staged) => {
                self.doc = staged.doc;
                self.selection = staged.selection;
                self.redo_stack.push(UndoRecord {
                    inverse_ops: staged.inverse_ops,
                    selection_before: record.selection_before,
                    selection_after: record.selection_after,
                });
                self.notify(CommitKind::Undo, Some("history:undo"));
                true
            }
            Err(err) => {
                warn!(error = %err, "undo record no longer applies, clearing history");
                self.undo_stack.clear();
                self.redo_stack.clear();
                false
            }
        }
    }

    pub fn redo(&mut self) -> bool {
        if self.has_provisional() {
            debug!("redo refused while a provisional transaction is open");
            return false;
        }
        let Some(record) = self.redo_stack.pop() else {
            return false;
        };

        match self.replay(&record.inverse_ops, &record.selection_after) {
            Ok(staged) => {
                self.doc = staged.doc;
                self.selection = staged.selection;
                self.undo_stack.push(UndoRecord {
                    inverse_ops: staged.inverse_ops,
                    selection_before: record.selection_before,
                    selection_after: record.selection_after,
                });
                self.notify(CommitKind::Redo, Some("history:redo"));
                true
            }
            Err(err) => {
                warn!(error = %err, "redo record no longer applies, clearing redo stack");
                self.redo_stack.clear();
                false
            }
        }
    }

    /// Applies `tx` atomically. Returns `Ok(false)` for an empty transaction,
    /// which is not a commit. On error the document and selection are
    /// unchanged.
    pub fn apply(&mut self, tx: Transaction) -> Result<bool, ApplyError> {
        if tx.is_empty() {
            debug!(source = tx.meta.source.as_deref().unwrap_or(""), "empty transaction");
            return Ok(false);
        }

        let staged = self.stage(&tx)?;
        let selection_before = std::mem::replace(&mut self.selection, staged.selection);
        self.doc = staged.doc;

        self.push_undo(UndoRecord {
            inverse_ops: staged.inverse_ops,
            selection_before,
            selection_after: self.selection.clone(),
        });
        self.redo_stack.clear();
        self.notify(CommitKind::Transaction, tx.meta.source.as_deref());
        Ok(true)
    }

    pub fn preview_transaction(&self, tx: &Transaction) -> Result<TransactionPreview, ApplyError> {
        let staged = self.stage(tx)?;
        Ok(TransactionPreview {
            doc: staged.doc,
            selection: staged.selection,
        })
    }

    /// Applies `tx` without recording history. The returned token binds it to
    /// a later insertion so both undo as one step.
    pub fn apply_provisional(&mut self, tx: Transaction) -> Result<ProvisionalTransaction, ApplyError> {
        let source = tx.meta.source.clone();
        if tx.is_empty() {
            return Ok(ProvisionalTransaction {
                record: UndoRecord {
                    inverse_ops: Vec::new(),
                    selection_before: self.selection.clone(),
                    selection_after: self.selection.clone(),
                },
                revision: self.revision,
                pushes_before: self.undo_pushes,
                source,
            });
        }

        let staged = self.stage(&tx)?;
        let selection_before = std::mem::replace(&mut self.selection, staged.selection);
        self.doc = staged.doc;
        self.redo_stack.clear();
        self.open_provisionals += 1;
        self.notify(CommitKind::Provisional, source.as_deref());

        Ok(ProvisionalTransaction {
            record: UndoRecord {
                inverse_ops: staged.inverse_ops,
                selection_before,
                selection_after: self.selection.clone(),
            },
            revision: self.revision,
            pushes_before: self.undo_pushes,
            source,
        })
    }

    /// Finishes a provisional transaction with `tx`. When nothing else was
    /// committed in between, both share one undo record.
    pub fn commit_provisional(
        &mut self,
        provisional: ProvisionalTransaction,
        tx: Transaction,
    ) -> Result<bool, ApplyError> {
        let ProvisionalTransaction {
            record,
            revision,
            pushes_before,
            ..
        } = provisional;
        self.close_provisional(&record);

        if revision != self.revision {
            debug!(
                provisional = revision,
                current = self.revision,
                "document changed while a provisional transaction was pending"
            );
            self.restore_history(record, pushes_before);
            return self.apply(tx);
        }

        if tx.is_empty() {
            if !record.inverse_ops.is_empty() {
                self.push_undo(record);
            }
            return Ok(false);
        }

        let staged = match self.stage(&tx) {
            Ok(staged) => staged,
            Err(err) => {
                if !record.inverse_ops.is_empty() {
                    self.push_undo(record);
                }
                return Err(err);
            }
        };

        self.doc = staged.doc;
        self.selection = staged.selection;
        let mut inverse_ops = staged.inverse_ops;
        inverse_ops.extend(record.inverse_ops);
        self.push_undo(UndoRecord {
            inverse_ops,
            selection_before: record.selection_before,
            selection_after: self.selection.clone(),
        });
        self.redo_stack.clear();
        self.notify(CommitKind::Transaction, tx.meta.source.as_deref());
        Ok(true)
    }

    /// Reverts a provisional transaction. Returns `Ok(false)` when other
    /// commits happened since; the provisional change then stays and becomes
    /// an ordinary history entry.
    pub fn rollback_provisional(
        &mut self,
        provisional: ProvisionalTransaction,
    ) -> Result<bool, ApplyError> {
        let ProvisionalTransaction {
            record,
            revision,
            pushes_before,
            source,
        } = provisional;
        self.close_provisional(&record);

        if record.inverse_ops.is_empty() {
            return Ok(false);
        }

        if revision != self.revision {
            warn!(
                provisional = revision,
                current = self.revision,
                "cannot roll back a provisional transaction after later commits"
            );
            self.restore_history(record, pushes_before);
            return Ok(false);
        }

        let staged = match self.replay(&record.inverse_ops, &record.selection_before) {
            Ok(staged) => staged,
            Err(err) => {
                self.restore_history(record, pushes_before);
                return Err(err);
            }
        };
        self.doc = staged.doc;
        self.selection = staged.selection;
        self.notify(CommitKind::Rollback, source.as_deref());
        Ok(true)
    }

    /// Runs a command. Failures are logged and reported as `false`.
    pub fn execute(&mut self, id: &str, args: Option<Value>) -> bool {
        match self.run_command(id, args) {
            Ok(committed) => committed,
            Err(err) => {
                warn!(command = id, error = %err, "command failed");
                false
            }
        }
    }

    pub fn run_command(&mut self, id: &str, args: Option<Value>) -> Result<bool, CommandError> {
        let tx = self.prepare_command(id, args.as_ref())?;
        self.apply(tx)
            .map_err(|e| CommandError::new(format!("Failed to apply {id}: {e}")))
    }

    /// Builds the transaction a command would apply, without applying it.
    pub fn prepare_command(&self, id: &str, args: Option<&Value>) -> Result<Transaction, CommandError> {
        let Some(command) = self.registry.command(id) else {
            return Err(CommandError::new(format!("Unknown command: {id}")));
        };
        let tx = (command.handler)(&self.context(), args)?;
        Ok(match tx.meta.source {
            Some(_) => tx,
            None => tx.source(format!("command:{id}")),
        })
    }

    pub fn execute_chain(&mut self, steps: &[(&str, Option<Value>)]) -> bool {
        match self.run_chain(steps) {
            Ok(committed) => committed,
            Err(err) => {
                warn!(error = %err, "command chain failed");
                false
            }
        }
    }

    /// Runs every step against the result of the previous one and commits the
    /// combined ops as a single transaction. Any failing step aborts the chain
    /// with the document untouched.
    pub fn run_chain(&mut self, steps: &[(&str, Option<Value>)]) -> Result<bool, CommandError> {
        let mut doc = self.doc.clone();
        let mut selection = self.selection.clone();
        let mut ops: Vec<Op> = Vec::new();

        for (id, args) in steps {
            let Some(command) = self.registry.command(id) else {
                return Err(CommandError::new(format!("Unknown command: {id}")));
            };
            let ctx = CommandContext::new(&doc, &selection, &self.registry, &self.config);
            let tx = (command.handler)(&ctx, args.as_ref())?;

            let mut next_doc = doc.clone();
            let mut next_selection = selection.clone();
            for op in tx.ops {
                op.clone().apply(&mut next_doc, &mut next_selection)
                    .map_err(|e| CommandError::new(format!("Failed to apply {id}: {e}")))?;
                ops.push(op);
            }
            if let Some(sel) = tx.selection_after {
                next_selection = sel;
            }
            let normalized = normalize_to_fixpoint(
                &self.registry,
                self.config.max_normalize_iterations,
                &mut next_doc,
                &mut next_selection,
            )
            .map_err(|e| CommandError::new(format!("Failed to normalize after {id}: {e}")))?;
            ops.extend(normalized.into_iter().map(|(op, _)| op));

            selection = self.registry.normalize_selection(&next_doc, &next_selection);
            doc = next_doc;
        }

        let source = steps
            .iter()
            .map(|(id, _)| *id)
            .collect::<Vec<_>>()
            .join("+");
        self.apply(
            Transaction::new(ops)
                .selection_after(selection)
                .source(format!("chain:{source}")),
        )
        .map_err(|e| CommandError::new(format!("Failed to apply chain {source}: {e}")))
    }

    pub fn run_query_json(&self, id: &str, args: Option<Value>) -> Result<Value, QueryError> {
        let Some(query) = self.registry.query(id) else {
            return Err(QueryError::new(format!("Unknown query: {id}")));
        };
        (query.handler)(&self.context(), args.as_ref())
    }

    pub fn run_query<T>(&self, id: &str, args: Option<Value>) -> Result<T, QueryError>
    where
        T: DeserializeOwned,
    {
        let value = self.run_query_json(id, args)?;
        serde_json::from_value(value)
            .map_err(|err| QueryError::new(format!("Failed to decode query result: {err}")))
    }

    fn stage(&self, tx: &Transaction) -> Result<Staged, ApplyError> {
        let mut doc = self.doc.clone();
        let mut selection = self.selection.clone();

        let mut inverse_ops: Vec<Op> = Vec::with_capacity(tx.ops.len());
        for op in tx.ops.iter().cloned() {
            inverse_ops.push(op.apply(&mut doc, &mut selection)?);
        }

        if let Some(sel) = &tx.selection_after {
            selection = sel.clone();
        }

        let normalized = normalize_to_fixpoint(
            &self.registry,
            self.config.max_normalize_iterations,
            &mut doc,
            &mut selection,
        )?;
        inverse_ops.extend(normalized.into_iter().map(|(_, inverse)| inverse));
        inverse_ops.reverse();

        let selection = self.registry.normalize_selection(&doc, &selection);
        Ok(Staged {
            doc,
            selection,
            inverse_ops,
        })
    }

    fn replay(&self, ops: &[Op], selection: &Selection) -> Result<Staged, ApplyError> {
        let mut doc = self.doc.clone();
        let mut scratch = self.selection.clone();

        let mut inverse_ops: Vec<Op> = Vec::with_capacity(ops.len());
        for op in ops.iter().cloned() {
            inverse_ops.push(op.apply(&mut doc, &mut scratch)?);
        }
        inverse_ops.reverse();

        let selection = self.registry.normalize_selection(&doc, selection);
        Ok(Staged {
            doc,
            selection,
            inverse_ops,
        })
    }

    fn normalize_in_place(&mut self) {
        match self.stage(&Transaction::default()) {
            Ok(staged) => {
                self.doc = staged.doc;
                self.selection = staged.selection;
            }
            Err(err) => {
                warn!(error = %err, "initial normalization failed");
                self.selection = self.registry.normalize_selection(&self.doc, &self.selection);
            }
        }
    }

    fn push_undo(&mut self, record: UndoRecord) {
        self.undo_pushes += 1;
        self.undo_stack.push(record);
        if self.undo_stack.len() > self.config.max_undo {
            self.undo_stack.remove(0);
        }
    }

    fn close_provisional(&mut self, record: &UndoRecord) {
        if !record.inverse_ops.is_empty() {
            self.open_provisionals = self.open_provisionals.saturating_sub(1);
        }
    }

    /// Files a provisional record below every record pushed after it was
    /// opened. Counted from the top so front evictions do not shift it.
    fn restore_history(&mut self, record: UndoRecord, pushes_before: u64) {
        if record.inverse_ops.is_empty() {
            return;
        }
        let pushed_since = usize::try_from(self.undo_pushes - pushes_before).unwrap_or(usize::MAX);
        let at = self.undo_stack.len().saturating_sub(pushed_since);
        self.undo_stack.insert(at, record);
        if self.undo_stack.len() > self.config.max_undo {
            self.undo_stack.remove(0);
        }
    }

    fn notify(&mut self, kind: CommitKind, source: Option<&str>) {
        self.revision += 1;
        debug!(
            revision = self.revision,
            ?kind,
            source = source.unwrap_or(""),
            undo = self.undo_stack.len(),
            "commit"
        );
        let commit = Commit {
            revision: self.revision,
            kind,
            source,
            document: &self.doc,
            selection: &self.selection,
        };
        for listener in self.listeners.iter_mut() {
            listener.on_commit(&commit);
        }
    }
}

/// Runs normalization passes until none of them produces ops. Returns each
/// applied op paired with its inverse.
fn normalize_to_fixpoint(
    registry: &PluginRegistry,
    max_iterations: usize,
    doc: &mut Document,
    selection: &mut Selection,
) -> Result<Vec<(Op, Op)>, ApplyError> {
    let mut applied: Vec<(Op, Op)> = Vec::new();
    for _ in 0..max_iterations {
        let ops = registry.normalize_step(doc);
        if ops.is_empty() {
            return Ok(applied);
        }
        for op in ops {
            let inverse = op.clone().apply(doc, selection)?;
            applied.push((op, inverse));
        }
    }
    Err(ApplyError::NormalizeDidNotConverge)
}

pub(crate) fn clamp_to_char_boundary(s: &str, mut ix: usize) -> usize {
    ix = ix.min(s.len());
    while ix > 0 && !s.is_char_boundary(ix) {
        ix -= 1;
    }
    ix
}

pub(crate) fn node_ref<'a>(doc: &'a Document, path: &[usize]) -> Option<&'a Node> {
    let (first, rest) = path.split_first()?;
    let mut node = doc.children.get(*first)?;
    for &ix in rest {
        node = match node {
            Node::Element(el) => el.children.get(ix)?,
            Node::Void(_) | Node::Text(_) => return None,
        };
    }
    Some(node)
}

pub(crate) fn node_mut<'a>(doc: &'a mut Document, path: &[usize]) -> Result<&'a mut Node, PathError> {
    let Some((first, rest)) = path.split_first() else {
        return Err(PathError("Empty path".into()));
    };

    let len = doc.children.len();
    let mut node = doc
        .children
        .get_mut(*first)
        .ok_or_else(|| PathError(format!("Path out of bounds at depth 0: {first} >= {len}")))?;

    for (depth, &ix) in rest.iter().enumerate() {
        node = match node {
            Node::Element(el) => {
                let len = el.children.len();
                el.children.get_mut(ix).ok_or_else(|| {
                    PathError(format!(
                        "Path out of bounds at depth {}: {ix} >= {len}",
                        depth + 1
                    ))
                })?
            }
            Node::Void(_) | Node::Text(_) => {
                return Err(PathError(format!("Non-container node at depth {depth}")));
            }
        };
    }
    Ok(node)
}

pub(crate) fn node_text_mut<'a>(doc: &'a mut Document, path: &[usize]) -> Result<&'a mut TextNode, PathError> {
    match node_mut(doc, path)? {
        Node::Text(t) => Ok(t),
        _ => Err(PathError("Expected Text node".into())),
    }
}

fn children_mut<'a>(doc: &'a mut Document, parent_path: &[usize]) -> Result<&'a mut Vec<Node>, PathError> {
    if parent_path.is_empty() {
        return Ok(&mut doc.children);
    }
    match node_mut(doc, parent_path)? {
        Node::Element(el) => Ok(&mut el.children),
        Node::Void(_) | Node::Text(_) => Err(PathError("Parent is not a container".into())),
    }
}

pub(crate) fn insert_node(doc: &mut Document, path: &[usize], node: Node) -> Result<(), PathError> {
    let Some((&index, parent_path)) = path.split_last() else {
        return Err(PathError("Empty insert path".into()));
    };

    let children = children_mut(doc, parent_path)?;
    if index > children.len() {
        return Err(PathError(format!(
            "Insert index out of bounds: {index} > {}",
            children.len()
        )));
    }
    children.insert(index, node);
    Ok(())
}

pub(crate) fn remove_node(doc: &mut Document, path: &[usize]) -> Result<Node, PathError> {
    let Some((&index, parent_path)) = path.split_last() else {
        return Err(PathError("Empty remove path".into()));
    };

    let children = children_mut(doc, parent_path)?;
    if index >= children.len() {
        return Err(PathError(format!(
            "Remove index out of bounds: {index} >= {}",
            children.len()
        )));
    }
    Ok(children.remove(index))
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttrPatch {
    #[serde(default)]
    pub set: Attrs,
    #[serde(default)]
    pub remove: Vec<String>,
}

impl AttrPatch {
    pub fn set(set: Attrs) -> Self {
        Self {
            set,
            remove: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.remove.is_empty()
    }
}

pub(crate) fn patch_apply(attrs: &mut Attrs, patch: &AttrPatch) -> AttrPatch {
    let mut old_set: Attrs = Attrs::new();
    let mut old_remove: Vec<String> = Vec::new();

    for (k, v) in &patch.set {
        if let Some(prev) = attrs.insert(k.clone(), v.clone()) {
            old_set.insert(k.clone(), prev);
        } else {
            old_remove.push(k.clone());
        }
    }

    for key in &patch.remove {
        if let Some(prev) = attrs.remove(key) {
            old_set.insert(key.clone(), prev);
        }
    }

    AttrPatch {
        set: old_set,
        remove: old_remove,
    }
}
