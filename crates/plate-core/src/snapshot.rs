use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::core::{Attrs, Document, ElementNode, Marks, Node, TextNode, VoidNode};
use crate::error::ParseError;
use crate::ops::Path;
use crate::schema::BlockKind;

pub const SNAPSHOT_SCHEMA: &str = "myth-plate";
pub const SNAPSHOT_VERSION: u32 = 1;

const TEXT_TYPE: &str = "text";

fn default_schema() -> String {
    SNAPSHOT_SCHEMA.to_string()
}

fn default_version() -> u32 {
    SNAPSHOT_VERSION
}

/// Portable form of a document, as handed to persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentSnapshot {
    #[serde(default = "default_schema")]
    pub schema: String,
    #[serde(default = "default_version")]
    pub version: u32,
    pub blocks: Vec<PortableNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortableNode {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Attrs::is_empty")]
    pub attrs: Attrs,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Vec<PortableNode>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marks: Option<Marks>,
}

impl DocumentSnapshot {
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DroppedNode {
    /// Position of the node inside the snapshot's `blocks` tree.
    pub path: Path,
    pub kind: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParseOutcome {
    pub document: Document,
    pub dropped: Vec<DroppedNode>,
}

pub fn serialize(doc: &Document) -> DocumentSnapshot {
    DocumentSnapshot {
        schema: default_schema(),
        version: SNAPSHOT_VERSION,
        blocks: doc.children.iter().map(portable).collect(),
    }
}

fn portable(node: &Node) -> PortableNode {
    match node {
        Node::Element(el) => PortableNode {
            kind: el.kind.clone(),
            attrs: el.attrs.clone(),
            content: Some(el.children.iter().map(portable).collect()),
            text: None,
            marks: None,
        },
        Node::Void(v) => PortableNode {
            kind: v.kind.clone(),
            attrs: v.attrs.clone(),
            content: None,
            text: None,
            marks: None,
        },
        Node::Text(t) => PortableNode {
            kind: TEXT_TYPE.to_string(),
            attrs: Attrs::new(),
            content: None,
            text: Some(t.text.clone()),
            marks: (!t.marks.is_plain()).then(|| t.marks.clone()),
        },
    }
}

pub fn parse(json: &str) -> Result<ParseOutcome, ParseError> {
    parse_value(serde_json::from_str(json)?)
}

/// Builds a document from a snapshot value. Nodes of unknown kinds are
/// dropped, at any depth, and reported in [`ParseOutcome::dropped`].
pub fn parse_value(value: Value) -> Result<ParseOutcome, ParseError> {
    let Value::Object(mut root) = value else {
        return Err(ParseError::MissingBlocks);
    };

    if let Some(version) = root.get("version") {
        let found = version
            .as_u64()
            .and_then(|v| u32::try_from(v).ok())
            .ok_or(ParseError::UnsupportedVersion {
                found: u32::MAX,
                supported: SNAPSHOT_VERSION,
            })?;
        if found > SNAPSHOT_VERSION {
            return Err(ParseError::UnsupportedVersion {
                found,
                supported: SNAPSHOT_VERSION,
            });
        }
    }

    let Some(Value::Array(blocks)) = root.remove("blocks") else {
        return Err(ParseError::MissingBlocks);
    };

    let mut dropped = Vec::new();
    let children = convert_children(&blocks, &[], true, &mut dropped)?;
    Ok(ParseOutcome {
        document: Document::new(children),
        dropped,
    })
}

fn convert_children(
    values: &[Value],
    parent: &[usize],
    top_level: bool,
    dropped: &mut Vec<DroppedNode>,
) -> Result<Vec<Node>, ParseError> {
    let mut out = Vec::with_capacity(values.len());
    for (ix, value) in values.iter().enumerate() {
        let mut path = parent.to_vec();
        path.push(ix);
        if let Some(node) = convert(value, path, top_level, dropped)? {
            out.push(node);
        }
    }
    Ok(out)
}

fn convert(
    value: &Value,
    path: Path,
    top_level: bool,
    dropped: &mut Vec<DroppedNode>,
) -> Result<Option<Node>, ParseError> {
    let malformed = |path: &Path, reason: &str| ParseError::MalformedNode {
        path: path.clone(),
        reason: reason.to_string(),
    };

    let Some(kind) = value.get("type").and_then(Value::as_str) else {
        return Err(malformed(&path, "missing `type`"));
    };

    if kind == TEXT_TYPE {
        if top_level {
            return Err(malformed(&path, "text node at the top level"));
        }
        let Some(text) = value.get("text").and_then(Value::as_str) else {
            return Err(malformed(&path, "text node without `text`"));
        };
        let marks = match value.get("marks") {
            None | Some(Value::Null) => Marks::default(),
            Some(marks) => serde_json::from_value(marks.clone())
                .map_err(|e| malformed(&path, &format!("invalid marks: {e}")))?,
        };
        return Ok(Some(Node::Text(TextNode {
            text: text.to_string(),
            marks,
        })));
    }

    let Some(block_kind) = BlockKind::from_tag(kind) else {
        warn!(kind, ?path, "dropping node of unknown kind");
        dropped.push(DroppedNode {
            path,
            kind: kind.to_string(),
        });
        return Ok(None);
    };

    let attrs = match value.get("attrs") {
        None | Some(Value::Null) => Attrs::new(),
        Some(Value::Object(map)) => map.clone().into_iter().collect(),
        Some(_) => return Err(malformed(&path, "`attrs` must be an object")),
    };

    if block_kind.is_void() {
        return Ok(Some(Node::Void(VoidNode {
            kind: kind.to_string(),
            attrs,
        })));
    }

    let children = match value.get("content") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => convert_children(items, &path, false, dropped)?,
        Some(_) => return Err(malformed(&path, "`content` must be an array")),
    };
    Ok(Some(Node::Element(ElementNode {
        kind: kind.to_string(),
        attrs,
        children,
    })))
}
