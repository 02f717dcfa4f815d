use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::Attrs;
use crate::plugin::{ChildConstraint, NodeRole, NodeSpec};

/// Every element and void kind the editor knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    Paragraph,
    Heading,
    BulletList,
    OrderedList,
    TaskList,
    ListItem,
    TaskItem,
    Blockquote,
    CodeBlock,
    Table,
    TableRow,
    TableCell,
    Tabs,
    Iframe,
    Alert,
    HorizontalRule,
    Image,
    Html,
}

impl BlockKind {
    pub const ALL: [BlockKind; 18] = [
        BlockKind::Paragraph,
        BlockKind::Heading,
        BlockKind::BulletList,
        BlockKind::OrderedList,
        BlockKind::TaskList,
        BlockKind::ListItem,
        BlockKind::TaskItem,
        BlockKind::Blockquote,
        BlockKind::CodeBlock,
        BlockKind::Table,
        BlockKind::TableRow,
        BlockKind::TableCell,
        BlockKind::Tabs,
        BlockKind::Iframe,
        BlockKind::Alert,
        BlockKind::HorizontalRule,
        BlockKind::Image,
        BlockKind::Html,
    ];

    pub fn tag(self) -> &'static str {
        match self {
            BlockKind::Paragraph => "paragraph",
            BlockKind::Heading => "heading",
            BlockKind::BulletList => "bullet_list",
            BlockKind::OrderedList => "ordered_list",
            BlockKind::TaskList => "task_list",
            BlockKind::ListItem => "list_item",
            BlockKind::TaskItem => "task_item",
            BlockKind::Blockquote => "blockquote",
            BlockKind::CodeBlock => "code_block",
            BlockKind::Table => "table",
            BlockKind::TableRow => "table_row",
            BlockKind::TableCell => "table_cell",
            BlockKind::Tabs => "tabs",
            BlockKind::Iframe => "iframe",
            BlockKind::Alert => "alert",
            BlockKind::HorizontalRule => "horizontal_rule",
            BlockKind::Image => "image",
            BlockKind::Html => "html",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.tag() == tag)
    }

    pub fn is_void(self) -> bool {
        matches!(
            self,
            BlockKind::Tabs
                | BlockKind::Iframe
                | BlockKind::HorizontalRule
                | BlockKind::Image
                | BlockKind::Html
        )
    }

    pub fn content(self) -> ChildConstraint {
        match self {
            BlockKind::Paragraph | BlockKind::Heading | BlockKind::CodeBlock | BlockKind::Alert => {
                ChildConstraint::InlineOnly
            }
            BlockKind::Tabs
            | BlockKind::Iframe
            | BlockKind::HorizontalRule
            | BlockKind::Image
            | BlockKind::Html => ChildConstraint::None,
            _ => ChildConstraint::BlockOnly,
        }
    }

    pub fn is_list(self) -> bool {
        matches!(
            self,
            BlockKind::BulletList | BlockKind::OrderedList | BlockKind::TaskList
        )
    }

    pub fn is_list_item(self) -> bool {
        matches!(self, BlockKind::ListItem | BlockKind::TaskItem)
    }

    /// The item kind a list container accepts.
    pub fn list_item_kind(self) -> Option<BlockKind> {
        match self {
            BlockKind::BulletList | BlockKind::OrderedList => Some(BlockKind::ListItem),
            BlockKind::TaskList => Some(BlockKind::TaskItem),
            _ => None,
        }
    }

    pub fn node_spec(self) -> NodeSpec {
        NodeSpec {
            kind: self.tag().to_string(),
            role: NodeRole::Block,
            is_void: self.is_void(),
            children: self.content(),
        }
    }

    pub fn attr_fields(self) -> &'static [AttrField] {
        match self {
            BlockKind::Heading => HEADING_ATTRS,
            BlockKind::OrderedList => ORDERED_LIST_ATTRS,
            BlockKind::TaskItem => TASK_ITEM_ATTRS,
            BlockKind::CodeBlock => CODE_BLOCK_ATTRS,
            BlockKind::TableCell => TABLE_CELL_ATTRS,
            BlockKind::Tabs => TABS_ATTRS,
            BlockKind::Iframe => IFRAME_ATTRS,
            BlockKind::Alert => ALERT_ATTRS,
            BlockKind::Image => IMAGE_ATTRS,
            BlockKind::Html => HTML_ATTRS,
            _ => &[],
        }
    }

    pub fn default_attrs(self) -> Attrs {
        self.attr_fields()
            .iter()
            .map(|field| (field.name.to_string(), field.default.to_value()))
            .collect()
    }

    /// Attribute bag conforming to this kind's schema: known keys coerced or
    /// defaulted, unknown keys dropped.
    pub fn conform_attrs(self, attrs: &Attrs) -> Attrs {
        self.attr_fields()
            .iter()
            .map(|field| (field.name.to_string(), field.coerce(attrs.get(field.name))))
            .collect()
    }
}

pub const ALERT_SEVERITIES: &[&str] = &["info", "success", "warning", "error"];

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AttrType {
    Integer { min: i64, max: i64 },
    Bool,
    String,
    OptionalString,
    OneOf(&'static [&'static str]),
    TabList,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AttrDefault {
    Int(i64),
    Bool(bool),
    Str(&'static str),
    Null,
    SingleEmptyTab,
}

impl AttrDefault {
    pub fn to_value(self) -> Value {
        match self {
            AttrDefault::Int(v) => Value::from(v),
            AttrDefault::Bool(v) => Value::Bool(v),
            AttrDefault::Str(v) => Value::String(v.to_string()),
            AttrDefault::Null => Value::Null,
            AttrDefault::SingleEmptyTab => serde_json::json!([{ "title": "", "content": "" }]),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttrField {
    pub name: &'static str,
    pub ty: AttrType,
    pub default: AttrDefault,
}

impl AttrField {
    const fn new(name: &'static str, ty: AttrType, default: AttrDefault) -> Self {
        Self { name, ty, default }
    }

    pub fn coerce(&self, value: Option<&Value>) -> Value {
        let Some(value) = value else {
            return self.default.to_value();
        };

        match self.ty {
            AttrType::Integer { min, max } => match value.as_i64() {
                Some(v) => Value::from(v.clamp(min, max)),
                None => match value.as_u64() {
                    Some(_) => Value::from(max),
                    None => self.default.to_value(),
                },
            },
            AttrType::Bool => match value {
                Value::Bool(_) => value.clone(),
                _ => self.default.to_value(),
            },
            AttrType::String => match value {
                Value::String(_) => value.clone(),
                _ => self.default.to_value(),
            },
            AttrType::OptionalString => match value {
                Value::String(_) | Value::Null => value.clone(),
                _ => self.default.to_value(),
            },
            AttrType::OneOf(allowed) => match value.as_str() {
                Some(v) if allowed.contains(&v) => value.clone(),
                _ => self.default.to_value(),
            },
            AttrType::TabList => coerce_tab_list(value).unwrap_or_else(|| self.default.to_value()),
        }
    }
}

fn coerce_tab_list(value: &Value) -> Option<Value> {
    let items = value.as_array()?;
    if items.is_empty() {
        return None;
    }
    let tabs = items
        .iter()
        .map(|item| {
            let field = |key: &str| {
                item.get(key)
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string()
            };
            serde_json::json!({ "title": field("title"), "content": field("content") })
        })
        .collect();
    Some(Value::Array(tabs))
}

const HEADING_ATTRS: &[AttrField] = &[AttrField::new(
    "level",
    AttrType::Integer { min: 1, max: 6 },
    AttrDefault::Int(1),
)];

const ORDERED_LIST_ATTRS: &[AttrField] = &[AttrField::new(
    "start",
    AttrType::Integer {
        min: 1,
        max: i64::MAX,
    },
    AttrDefault::Int(1),
)];

const TASK_ITEM_ATTRS: &[AttrField] = &[AttrField::new(
    "checked",
    AttrType::Bool,
    AttrDefault::Bool(false),
)];

const CODE_BLOCK_ATTRS: &[AttrField] = &[AttrField::new(
    "language",
    AttrType::OptionalString,
    AttrDefault::Null,
)];

const TABLE_CELL_ATTRS: &[AttrField] = &[
    AttrField::new("header", AttrType::Bool, AttrDefault::Bool(false)),
    AttrField::new(
        "colspan",
        AttrType::Integer { min: 1, max: 64 },
        AttrDefault::Int(1),
    ),
    AttrField::new(
        "rowspan",
        AttrType::Integer { min: 1, max: 64 },
        AttrDefault::Int(1),
    ),
];

const TABS_ATTRS: &[AttrField] = &[
    AttrField::new("tabs", AttrType::TabList, AttrDefault::SingleEmptyTab),
    AttrField::new(
        "active",
        AttrType::Integer {
            min: 0,
            max: i64::MAX,
        },
        AttrDefault::Int(0),
    ),
];

const IFRAME_ATTRS: &[AttrField] = &[
    AttrField::new("src", AttrType::OptionalString, AttrDefault::Null),
    AttrField::new("width", AttrType::String, AttrDefault::Str("100%")),
    AttrField::new("height", AttrType::String, AttrDefault::Str("400px")),
    AttrField::new("frameborder", AttrType::String, AttrDefault::Str("0")),
    AttrField::new("allowfullscreen", AttrType::String, AttrDefault::Str("true")),
];

const ALERT_ATTRS: &[AttrField] = &[AttrField::new(
    "severity",
    AttrType::OneOf(ALERT_SEVERITIES),
    AttrDefault::Str("info"),
)];

const IMAGE_ATTRS: &[AttrField] = &[
    AttrField::new("src", AttrType::String, AttrDefault::Str("")),
    AttrField::new("alt", AttrType::OptionalString, AttrDefault::Null),
    AttrField::new("title", AttrType::OptionalString, AttrDefault::Null),
];

const HTML_ATTRS: &[AttrField] = &[AttrField::new(
    "html",
    AttrType::String,
    AttrDefault::Str(""),
)];

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tags_round_trip() {
        for kind in BlockKind::ALL {
            assert_eq!(BlockKind::from_tag(kind.tag()), Some(kind));
        }
        assert_eq!(BlockKind::from_tag("mention"), None);
    }

    #[test]
    fn conform_attrs_clamps_defaults_and_drops_unknown_keys() {
        let mut attrs = Attrs::new();
        attrs.insert("level".into(), json!(42));
        attrs.insert("align".into(), json!("center"));
        let conformed = BlockKind::Heading.conform_attrs(&attrs);
        assert_eq!(conformed.get("level"), Some(&json!(6)));
        assert!(!conformed.contains_key("align"));

        let conformed = BlockKind::Alert.conform_attrs(&Attrs::from([(
            "severity".to_string(),
            json!("fatal"),
        )]));
        assert_eq!(conformed.get("severity"), Some(&json!("info")));
    }

    #[test]
    fn empty_tab_list_is_seeded() {
        let conformed = BlockKind::Tabs.conform_attrs(&Attrs::from([(
            "tabs".to_string(),
            json!([]),
        )]));
        assert_eq!(
            conformed.get("tabs"),
            Some(&json!([{ "title": "", "content": "" }]))
        );
        assert_eq!(conformed.get("active"), Some(&json!(0)));
    }
}
