use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::{AttrPatch, Attrs, Document, Node};
use crate::ops::Op;
use crate::plugin::{
    CommandSpec, Landing, NodeSpec, NormalizePass, PlatePlugin, PluginRegistry, arg, child_path,
    insert_block,
};
use crate::schema::BlockKind;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tab {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
}

/// Attribute model of a tabbed container. Every edit returns the partial
/// attribute patch to write back instead of mutating in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabsAttrs {
    tabs: Vec<Tab>,
    active: usize,
}

impl Default for TabsAttrs {
    fn default() -> Self {
        Self {
            tabs: vec![Tab::default()],
            active: 0,
        }
    }
}

impl TabsAttrs {
    pub fn new(tabs: Vec<Tab>, active: usize) -> Self {
        if tabs.is_empty() {
            return Self::default();
        }
        let active = active.min(tabs.len() - 1);
        Self { tabs, active }
    }

    pub fn from_attrs(attrs: &Attrs) -> Self {
        let tabs = attrs
            .get("tabs")
            .cloned()
            .and_then(|v| serde_json::from_value::<Vec<Tab>>(v).ok())
            .unwrap_or_default();
        let active = attrs
            .get("active")
            .and_then(Value::as_u64)
            .unwrap_or(0) as usize;
        Self::new(tabs, active)
    }

    pub fn tabs(&self) -> &[Tab] {
        &self.tabs
    }

    pub fn len(&self) -> usize {
        self.tabs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tabs.is_empty()
    }

    pub fn active(&self) -> usize {
        self.active
    }

    pub fn active_tab(&self) -> &Tab {
        &self.tabs[self.active]
    }

    pub fn to_attrs(&self) -> Attrs {
        Attrs::from([
            ("tabs".to_string(), tabs_value(&self.tabs)),
            ("active".to_string(), Value::from(self.active)),
        ])
    }

    pub fn select(&self, index: usize) -> Option<Attrs> {
        if index >= self.tabs.len() || index == self.active {
            return None;
        }
        Some(Attrs::from([("active".to_string(), Value::from(index))]))
    }

    pub fn rename(&self, index: usize, title: &str) -> Option<Attrs> {
        let tab = self.tabs.get(index)?;
        if tab.title == title {
            return None;
        }
        let mut tabs = self.tabs.clone();
        tabs[index].title = title.to_string();
        Some(Attrs::from([("tabs".to_string(), tabs_value(&tabs))]))
    }

    pub fn set_content(&self, index: usize, content: &str) -> Option<Attrs> {
        let tab = self.tabs.get(index)?;
        if tab.content == content {
            return None;
        }
        let mut tabs = self.tabs.clone();
        tabs[index].content = content.to_string();
        Some(Attrs::from([("tabs".to_string(), tabs_value(&tabs))]))
    }

    /// Appends an empty tab and activates it.
    pub fn add(&self) -> Attrs {
        let mut tabs = self.tabs.clone();
        tabs.push(Tab::default());
        Attrs::from([
            ("active".to_string(), Value::from(tabs.len() - 1)),
            ("tabs".to_string(), tabs_value(&tabs)),
        ])
    }

    /// Removes tab `index`. Deleting at or before the active tab moves the
    /// active index one to the left; deleting the last tab leaves one empty tab.
    pub fn delete(&self, index: usize) -> Option<Attrs> {
        if index >= self.tabs.len() {
            return None;
        }
        let mut tabs = self.tabs.clone();
        tabs.remove(index);
        if tabs.is_empty() {
            return Some(Self::default().to_attrs());
        }
        let active = if index <= self.active {
            self.active.saturating_sub(1)
        } else {
            self.active
        };
        Some(Attrs::from([
            ("active".to_string(), Value::from(active)),
            ("tabs".to_string(), tabs_value(&tabs)),
        ]))
    }
}

fn tabs_value(tabs: &[Tab]) -> Value {
    Value::Array(
        tabs.iter()
            .map(|tab| serde_json::json!({ "title": tab.title, "content": tab.content }))
            .collect(),
    )
}

pub struct TabsPlugin;

impl PlatePlugin for TabsPlugin {
    fn id(&self) -> &'static str {
        "tabs"
    }

    fn node_specs(&self) -> Vec<NodeSpec> {
        vec![BlockKind::Tabs.node_spec()]
    }

    fn normalize_passes(&self) -> Vec<Box<dyn NormalizePass>> {
        vec![Box::new(ClampActiveTab)]
    }

    fn commands(&self) -> Vec<CommandSpec> {
        vec![
            CommandSpec::new("tabs.insert", "Tabs", |ctx, args| {
                let tabs = arg(args, "tabs")
                    .cloned()
                    .and_then(|v| serde_json::from_value::<Vec<Tab>>(v).ok())
                    .unwrap_or_default();
                let attrs = TabsAttrs::new(tabs, 0).to_attrs();
                insert_block(ctx, Node::void(BlockKind::Tabs, attrs), Landing::After)
            })
            .description("Insert a tabbed container.")
            .keywords(["tabs", "tabbed"])
            .args_example(serde_json::json!({ "tabs": [{ "title": "One", "content": "" }] })),
        ]
    }
}

struct ClampActiveTab;

impl NormalizePass for ClampActiveTab {
    fn id(&self) -> &'static str {
        "tabs.clamp_active"
    }

    fn run(&self, doc: &Document, _registry: &PluginRegistry) -> Vec<Op> {
        let mut ops = Vec::new();

        fn walk(children: &[Node], path: &mut Vec<usize>, ops: &mut Vec<Op>) {
            for (ix, node) in children.iter().enumerate() {
                path.push(ix);
                match node {
                    Node::Void(v) if v.kind == BlockKind::Tabs.tag() => {
                        let model = TabsAttrs::from_attrs(&v.attrs);
                        let active = v.attrs.get("active").and_then(Value::as_u64);
                        if active != Some(model.active() as u64) {
                            ops.push(Op::SetNodeAttrs {
                                path: path.clone(),
                                patch: AttrPatch::set(Attrs::from([(
                                    "active".to_string(),
                                    Value::from(model.active()),
                                )])),
                            });
                        }
                    }
                    Node::Element(el) => walk(&el.children, path, ops),
                    _ => {}
                }
                path.pop();
            }
        }

        walk(&doc.children, &mut Vec::new(), &mut ops);
        ops
    }
}

/// Path of every tabbed container, in document order.
pub(crate) fn tabs_paths(doc: &Document) -> Vec<Vec<usize>> {
    fn walk(children: &[Node], parent: &[usize], out: &mut Vec<Vec<usize>>) {
        for (ix, node) in children.iter().enumerate() {
            let path = child_path(parent, ix);
            match node {
                Node::Void(v) if v.kind == BlockKind::Tabs.tag() => out.push(path),
                Node::Element(el) => walk(&el.children, &path, out),
                _ => {}
            }
        }
    }

    let mut out = Vec::new();
    walk(&doc.children, &[], &mut out);
    out
}
