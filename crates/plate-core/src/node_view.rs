use std::collections::BTreeMap;

use serde_json::{Value, json};

use crate::core::{Attrs, Document, Editor, Node};
use crate::ops::Path;
use crate::schema::BlockKind;
use crate::tabs::{TabsAttrs, tabs_paths};

/// What a node view may do with the document: read nodes and run commands.
/// Views never mutate the tree themselves.
pub trait NodeViewHost {
    fn node(&self, path: &[usize]) -> Option<&Node>;

    fn run(&mut self, command: &str, args: Value) -> bool;

    /// Merges `partial` into the node's attributes as one undoable command.
    fn on_local_change(&mut self, path: &[usize], partial: Attrs) -> bool {
        self.run("node.update_attrs", json!({ "path": path, "attrs": partial }))
    }
}

impl NodeViewHost for Editor {
    fn node(&self, path: &[usize]) -> Option<&Node> {
        self.doc().node(path)
    }

    fn run(&mut self, command: &str, args: Value) -> bool {
        self.execute(command, Some(args))
    }
}

/// Interaction state of one tabbed container. Hover flags stay local; every
/// edit goes through [`NodeViewHost::on_local_change`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabsView {
    path: Path,
    hovered_index: Option<usize>,
    header_hovered: bool,
}

impl TabsView {
    pub fn new(path: Path) -> Self {
        Self {
            path,
            hovered_index: None,
            header_hovered: false,
        }
    }

    pub fn path(&self) -> &[usize] {
        &self.path
    }

    pub fn model(&self, host: &impl NodeViewHost) -> Option<TabsAttrs> {
        match host.node(&self.path) {
            Some(Node::Void(v)) if v.kind == BlockKind::Tabs.tag() => {
                Some(TabsAttrs::from_attrs(&v.attrs))
            }
            _ => None,
        }
    }

    pub fn hovered_index(&self) -> Option<usize> {
        self.hovered_index
    }

    pub fn hover_tab(&mut self, index: Option<usize>) {
        self.hovered_index = index;
    }

    pub fn hover_header(&mut self, hovered: bool) {
        self.header_hovered = hovered;
    }

    pub fn shows_add_button(&self) -> bool {
        self.header_hovered
    }

    /// The delete button shows on the hovered and the active tab, and never
    /// when only one tab is left.
    pub fn shows_delete_button(&self, host: &impl NodeViewHost, index: usize) -> bool {
        let Some(model) = self.model(host) else {
            return false;
        };
        model.len() > 1 && (self.hovered_index == Some(index) || model.active() == index)
    }

    pub fn select(&mut self, host: &mut impl NodeViewHost, index: usize) -> bool {
        let patch = self.model(&*host).and_then(|m| m.select(index));
        self.write_back(host, patch)
    }

    pub fn rename(&mut self, host: &mut impl NodeViewHost, index: usize, title: &str) -> bool {
        let patch = self.model(&*host).and_then(|m| m.rename(index, title));
        self.write_back(host, patch)
    }

    /// Replaces the content of the active tab.
    pub fn edit_content(&mut self, host: &mut impl NodeViewHost, content: &str) -> bool {
        let patch = self
            .model(&*host)
            .and_then(|m| m.set_content(m.active(), content));
        self.write_back(host, patch)
    }

    pub fn add_tab(&mut self, host: &mut impl NodeViewHost) -> bool {
        let patch = self.model(&*host).map(|m| m.add());
        self.write_back(host, patch)
    }

    pub fn delete_tab(&mut self, host: &mut impl NodeViewHost, index: usize) -> bool {
        let patch = self.model(&*host).and_then(|m| m.delete(index));
        let changed = self.write_back(host, patch);
        if changed {
            self.hovered_index = None;
        }
        changed
    }

    fn write_back(&self, host: &mut impl NodeViewHost, patch: Option<Attrs>) -> bool {
        match patch {
            Some(patch) => host.on_local_change(&self.path, patch),
            None => false,
        }
    }
}

/// Languages offered by the code block selector, after "auto".
pub const CODE_LANGUAGES: &[&str] = &[
    "javascript",
    "typescript",
    "html",
    "css",
    "python",
    "java",
    "go",
    "rust",
    "sql",
    "json",
    "bash",
    "yaml",
    "markdown",
    "c",
    "cpp",
    "csharp",
    "php",
    "ruby",
    "swift",
    "kotlin",
];

pub const AUTO_LANGUAGE: &str = "auto";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeBlockView {
    path: Path,
}

impl CodeBlockView {
    /// A view for the code block at `path`, if there is one.
    pub fn at(host: &impl NodeViewHost, path: Path) -> Option<Self> {
        match host.node(&path) {
            Some(Node::Element(el)) if el.is(BlockKind::CodeBlock) => Some(Self { path }),
            _ => None,
        }
    }

    pub fn path(&self) -> &[usize] {
        &self.path
    }

    pub fn languages(&self) -> impl Iterator<Item = &'static str> {
        std::iter::once(AUTO_LANGUAGE).chain(CODE_LANGUAGES.iter().copied())
    }

    pub fn language(&self, host: &impl NodeViewHost) -> Option<String> {
        host.node(&self.path)?
            .attrs()?
            .get("language")
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    pub fn label(&self, host: &impl NodeViewHost) -> String {
        self.language(host)
            .unwrap_or_else(|| AUTO_LANGUAGE.to_string())
    }

    /// `None` and `"auto"` both select auto-detection.
    pub fn set_language(&self, host: &mut impl NodeViewHost, language: Option<&str>) -> bool {
        host.run(
            "code_block.set_language",
            json!({ "path": self.path, "language": language }),
        )
    }
}

/// Tabs views keyed by path, kept in step with the document.
#[derive(Debug, Default)]
pub struct NodeViews {
    tabs: BTreeMap<Path, TabsView>,
}

impl NodeViews {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds views for new containers and drops views whose node is gone.
    /// Views at unchanged paths keep their hover state.
    pub fn sync(&mut self, doc: &Document) {
        let mut next = BTreeMap::new();
        for path in tabs_paths(doc) {
            let view = self
                .tabs
                .remove(&path)
                .unwrap_or_else(|| TabsView::new(path.clone()));
            next.insert(path, view);
        }
        self.tabs = next;
    }

    pub fn tabs(&self) -> impl Iterator<Item = &TabsView> {
        self.tabs.values()
    }

    pub fn tabs_view(&self, path: &[usize]) -> Option<&TabsView> {
        self.tabs.get(path)
    }

    pub fn tabs_view_mut(&mut self, path: &[usize]) -> Option<&mut TabsView> {
        self.tabs.get_mut(path)
    }
}
