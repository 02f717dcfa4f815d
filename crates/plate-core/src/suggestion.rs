use serde_json::{Value, json};
use tracing::debug;

use crate::config::EditorConfig;
use crate::core::{Document, Node, Selection, clamp_to_char_boundary};
use crate::dialog::{DialogBridge, DialogReply, InputSpec};
use crate::error::DialogError;
use crate::notify::NotificationKind;
use crate::ops::Path;

/// One command of a synchronous suggestion effect.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandStep {
    pub command: String,
    pub args: Option<Value>,
}

impl CommandStep {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: None,
        }
    }

    pub fn with_args(command: impl Into<String>, args: Value) -> Self {
        Self {
            command: command.into(),
            args: Some(args),
        }
    }
}

/// An insertion that needs a value from the user first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeferredEffect {
    InsertImage,
    EmbedWebpage,
    EmbedHtml,
}

impl DeferredEffect {
    pub fn request(self, dialogs: &mut DialogBridge) -> Result<DialogReply, DialogError> {
        match self {
            DeferredEffect::InsertImage => dialogs.request_image(),
            DeferredEffect::EmbedWebpage => dialogs.request_input(InputSpec::single_line(
                "Embed webpage",
                "https://example.com",
            )),
            DeferredEffect::EmbedHtml => {
                dialogs.request_input(InputSpec::multi_line("Embed HTML", "<div>...</div>"))
            }
        }
    }

    /// The command that consumes the confirmed value.
    pub fn step(self, value: &str) -> CommandStep {
        match self {
            DeferredEffect::InsertImage => CommandStep::with_args("image.insert", json!({ "src": value })),
            DeferredEffect::EmbedWebpage => {
                CommandStep::with_args("iframe.insert", json!({ "src": value }))
            }
            DeferredEffect::EmbedHtml => CommandStep::with_args("html.insert", json!({ "html": value })),
        }
    }

    pub fn success_message(self) -> &'static str {
        match self {
            DeferredEffect::InsertImage => "Image inserted",
            DeferredEffect::EmbedWebpage => "Webpage embedded",
            DeferredEffect::EmbedHtml => "HTML inserted",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Invocation {
    /// Runs after the trigger text is removed, as part of the same transaction.
    Commands {
        steps: Vec<CommandStep>,
        move_to_block_start: bool,
        success: String,
    },
    Prompt(DeferredEffect),
    Notify {
        kind: NotificationKind,
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SuggestionItem {
    pub id: String,
    pub title: String,
    pub category: String,
    pub invocation: Invocation,
}

impl SuggestionItem {
    fn commands(
        id: &str,
        title: &str,
        category: &str,
        steps: Vec<CommandStep>,
        success: &str,
    ) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            category: category.to_string(),
            invocation: Invocation::Commands {
                steps,
                move_to_block_start: true,
                success: success.to_string(),
            },
        }
    }

    fn prompt(id: &str, title: &str, category: &str, effect: DeferredEffect) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            category: category.to_string(),
            invocation: Invocation::Prompt(effect),
        }
    }

    pub fn matches(&self, query: &str) -> bool {
        self.title.to_lowercase().starts_with(&query.to_lowercase())
    }
}

pub const CATEGORY_AI: &str = "AI";
pub const CATEGORY_BASIC: &str = "Basic Blocks";
pub const CATEGORY_ADVANCED: &str = "Advanced";
pub const CATEGORY_MEDIA: &str = "Media";

/// The slash menu as shipped, in catalog order.
pub fn default_catalog(config: &EditorConfig) -> Vec<SuggestionItem> {
    let heading = |level: u8| {
        SuggestionItem::commands(
            &format!("heading_{level}"),
            &format!("Heading {level}"),
            CATEGORY_BASIC,
            vec![CommandStep::with_args("block.set_heading", json!({ "level": level }))],
            &format!("Inserted heading {level}"),
        )
    };

    vec![
        SuggestionItem {
            id: "ask_ai".into(),
            title: "Ask AI".into(),
            category: CATEGORY_AI.into(),
            invocation: Invocation::Notify {
                kind: NotificationKind::Info,
                message: "AI features are coming soon".into(),
            },
        },
        heading(1),
        heading(2),
        heading(3),
        SuggestionItem::commands(
            "bullet_list",
            "Bullet List",
            CATEGORY_BASIC,
            vec![CommandStep::new("list.toggle_bullet")],
            "Inserted bullet list",
        ),
        SuggestionItem::commands(
            "numbered_list",
            "Numbered List",
            CATEGORY_BASIC,
            vec![CommandStep::new("list.toggle_ordered")],
            "Inserted numbered list",
        ),
        SuggestionItem::commands(
            "todo_list",
            "To-do List",
            CATEGORY_BASIC,
            vec![CommandStep::new("list.toggle_task")],
            "Inserted to-do list",
        ),
        SuggestionItem::commands(
            "quote",
            "Quote",
            CATEGORY_BASIC,
            vec![CommandStep::new("blockquote.wrap")],
            "Inserted quote",
        ),
        SuggestionItem::commands(
            "code_block",
            "Code Block",
            CATEGORY_ADVANCED,
            vec![CommandStep::new("code_block.set")],
            "Inserted code block",
        ),
        SuggestionItem::commands(
            "table",
            "Table",
            CATEGORY_ADVANCED,
            vec![CommandStep::with_args(
                "table.insert",
                json!({
                    "rows": config.table_rows,
                    "cols": config.table_cols,
                    "header_row": config.table_header_row,
                }),
            )],
            "Inserted table",
        ),
        SuggestionItem::prompt("image", "Image", CATEGORY_MEDIA, DeferredEffect::InsertImage),
        SuggestionItem::commands(
            "divider",
            "Divider",
            CATEGORY_BASIC,
            vec![CommandStep::new("horizontal_rule.insert")],
            "Inserted divider",
        ),
        SuggestionItem::prompt(
            "embed_html",
            "Embed HTML",
            CATEGORY_ADVANCED,
            DeferredEffect::EmbedHtml,
        ),
        SuggestionItem::prompt(
            "embed_webpage",
            "Embed Webpage",
            CATEGORY_ADVANCED,
            DeferredEffect::EmbedWebpage,
        ),
        SuggestionItem {
            id: "tabs".into(),
            title: "Tabs".into(),
            category: CATEGORY_ADVANCED.into(),
            invocation: Invocation::Commands {
                steps: vec![CommandStep::with_args(
                    "tabs.insert",
                    json!({ "tabs": [{ "title": "", "content": "" }] }),
                )],
                move_to_block_start: false,
                success: "Tabs created".into(),
            },
        },
    ]
}

/// Items whose title starts with `query`, grouped by category. Categories
/// keep the order of their first appearance in `catalog` and items keep
/// catalog order inside a category.
pub fn filter_items<'a>(catalog: &'a [SuggestionItem], query: &str) -> Vec<&'a SuggestionItem> {
    let matched: Vec<&SuggestionItem> = catalog.iter().filter(|item| item.matches(query)).collect();

    let mut categories: Vec<&str> = Vec::new();
    for item in &matched {
        if !categories.contains(&item.category.as_str()) {
            categories.push(&item.category);
        }
    }

    let mut grouped = Vec::with_capacity(matched.len());
    for category in categories {
        grouped.extend(matched.iter().filter(|item| item.category == category));
    }
    grouped
}

#[derive(Debug, Clone, PartialEq)]
pub struct SuggestionGroup<'a> {
    pub category: &'a str,
    pub items: Vec<&'a SuggestionItem>,
}

/// Where a trigger character sits: the text leaf and its byte offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerAnchor {
    pub text_path: Path,
    pub trigger_offset: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveSuggestion {
    pub anchor: TriggerAnchor,
    pub query: String,
    pub highlighted: usize,
}

/// The `/query` text to remove before an item takes effect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerRange {
    pub path: Path,
    pub start: usize,
    pub end: usize,
}

impl TriggerRange {
    pub fn delete_step(&self) -> CommandStep {
        CommandStep::with_args(
            "text.delete_range",
            json!({ "path": self.path, "start": self.start, "end": self.end }),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SuggestionState {
    Idle,
    Searching(ActiveSuggestion),
    /// Escape was pressed on this trigger. It stays closed until the
    /// trigger moves or disappears.
    Dismissed(TriggerAnchor),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuggestionKey {
    Up,
    Down,
    Enter,
    Escape,
}

#[derive(Debug, Clone, PartialEq)]
pub enum KeyOutcome {
    /// The key belongs to the editing surface.
    Ignored,
    Handled,
    Invoke(SuggestionInvocation),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SuggestionInvocation {
    pub item: SuggestionItem,
    pub range: TriggerRange,
}

pub struct SuggestionEngine {
    state: SuggestionState,
    catalog: Vec<SuggestionItem>,
    trigger: char,
    allow_spaces: bool,
}

impl SuggestionEngine {
    pub fn new(config: &EditorConfig) -> Self {
        Self::with_catalog(config, default_catalog(config))
    }

    pub fn with_catalog(config: &EditorConfig, catalog: Vec<SuggestionItem>) -> Self {
        Self {
            state: SuggestionState::Idle,
            catalog,
            trigger: config.trigger_char,
            allow_spaces: config.allow_spaces,
        }
    }

    pub fn state(&self) -> &SuggestionState {
        &self.state
    }

    pub fn catalog(&self) -> &[SuggestionItem] {
        &self.catalog
    }

    pub fn active(&self) -> Option<&ActiveSuggestion> {
        match &self.state {
            SuggestionState::Searching(active) => Some(active),
            _ => None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.active().is_some()
    }

    /// Matching items in menu order. Empty unless searching.
    pub fn items(&self) -> Vec<&SuggestionItem> {
        match self.active() {
            Some(active) => filter_items(&self.catalog, &active.query),
            None => Vec::new(),
        }
    }

    pub fn groups(&self) -> Vec<SuggestionGroup<'_>> {
        let mut groups: Vec<SuggestionGroup<'_>> = Vec::new();
        for item in self.items() {
            match groups.last_mut() {
                Some(group) if group.category == item.category => group.items.push(item),
                _ => groups.push(SuggestionGroup {
                    category: &item.category,
                    items: vec![item],
                }),
            }
        }
        groups
    }

    pub fn highlighted_item(&self) -> Option<&SuggestionItem> {
        let active = self.active()?;
        self.items().get(active.highlighted).copied()
    }

    /// Re-derives the state from the document and selection. Call after every
    /// commit and selection change.
    pub fn update(&mut self, doc: &Document, selection: &Selection) {
        let candidate = match &self.state {
            SuggestionState::Searching(active) => self
                .continue_search(doc, selection, &active.anchor)
                .or_else(|| self.detect(doc, selection)),
            _ => self.detect(doc, selection),
        };

        let next = match (&self.state, candidate) {
            (SuggestionState::Dismissed(dismissed), Some((anchor, _))) if *dismissed == anchor => {
                return;
            }
            (SuggestionState::Dismissed(dismissed), None) => {
                if self.trigger_at(doc, dismissed) {
                    return;
                }
                SuggestionState::Idle
            }
            (SuggestionState::Searching(active), Some((anchor, query))) if active.anchor == anchor => {
                let highlighted = if active.query == query {
                    active.highlighted
                } else {
                    0
                };
                SuggestionState::Searching(ActiveSuggestion {
                    anchor,
                    query,
                    highlighted,
                })
            }
            (_, Some((anchor, query))) => SuggestionState::Searching(ActiveSuggestion {
                anchor,
                query,
                highlighted: 0,
            }),
            (_, None) => SuggestionState::Idle,
        };

        if next != self.state {
            debug!(state = ?next, "suggestion state changed");
        }
        self.state = next;
    }

    pub fn dismiss(&mut self) {
        if let SuggestionState::Searching(active) = &self.state {
            debug!(anchor = ?active.anchor, "suggestion dismissed");
            self.state = SuggestionState::Dismissed(active.anchor.clone());
        }
    }

    pub fn key_down(&mut self, key: SuggestionKey) -> KeyOutcome {
        let len = self.items().len();
        let SuggestionState::Searching(active) = &mut self.state else {
            return KeyOutcome::Ignored;
        };

        match key {
            SuggestionKey::Up | SuggestionKey::Down if len == 0 => KeyOutcome::Ignored,
            SuggestionKey::Down => {
                active.highlighted = (active.highlighted + 1) % len;
                KeyOutcome::Handled
            }
            SuggestionKey::Up => {
                active.highlighted = (active.highlighted + len - 1) % len;
                KeyOutcome::Handled
            }
            SuggestionKey::Enter => {
                let index = active.highlighted;
                match self.take_invocation(index) {
                    Some(invocation) => KeyOutcome::Invoke(invocation),
                    None => KeyOutcome::Ignored,
                }
            }
            SuggestionKey::Escape => {
                self.dismiss();
                KeyOutcome::Handled
            }
        }
    }

    /// Picks item `index` of the current menu and closes it.
    pub fn take_invocation(&mut self, index: usize) -> Option<SuggestionInvocation> {
        let active = self.active()?;
        let item = self.items().get(index).copied()?.clone();
        let range = TriggerRange {
            path: active.anchor.text_path.clone(),
            start: active.anchor.trigger_offset,
            end: active.anchor.trigger_offset + self.trigger.len_utf8() + active.query.len(),
        };
        debug!(item = item.id.as_str(), ?range, "suggestion invoked");
        self.state = SuggestionState::Idle;
        Some(SuggestionInvocation { item, range })
    }

    fn detect(&self, doc: &Document, selection: &Selection) -> Option<(TriggerAnchor, String)> {
        if !selection.is_collapsed() {
            return None;
        }
        let point = &selection.focus;
        let text = leaf_text(doc, &point.path)?;
        let before = &text[..clamp_to_char_boundary(text, point.offset)];

        let trigger_offset = before.rfind(self.trigger)?;
        let query = &before[trigger_offset + self.trigger.len_utf8()..];
        if query.chars().any(char::is_whitespace) {
            return None;
        }
        let starts_run = before[..trigger_offset]
            .chars()
            .next_back()
            .is_none_or(char::is_whitespace);
        if !starts_run {
            return None;
        }

        Some((
            TriggerAnchor {
                text_path: point.path.clone(),
                trigger_offset,
            },
            query.to_string(),
        ))
    }

    fn continue_search(
        &self,
        doc: &Document,
        selection: &Selection,
        anchor: &TriggerAnchor,
    ) -> Option<(TriggerAnchor, String)> {
        if !selection.is_collapsed() || selection.focus.path != anchor.text_path {
            return None;
        }
        if !self.trigger_at(doc, anchor) {
            return None;
        }
        let text = leaf_text(doc, &anchor.text_path)?;
        let offset = clamp_to_char_boundary(text, selection.focus.offset);
        let query_start = anchor.trigger_offset + self.trigger.len_utf8();
        if offset < query_start {
            return None;
        }
        let query = &text[query_start..offset];
        self.query_is_valid(query)
            .then(|| (anchor.clone(), query.to_string()))
    }

    fn query_is_valid(&self, query: &str) -> bool {
        if query.contains(self.trigger) || query.contains('\n') {
            return false;
        }
        if self.allow_spaces {
            !query.contains("  ")
        } else {
            !query.chars().any(char::is_whitespace)
        }
    }

    fn trigger_at(&self, doc: &Document, anchor: &TriggerAnchor) -> bool {
        leaf_text(doc, &anchor.text_path)
            .and_then(|text| text.get(anchor.trigger_offset..))
            .is_some_and(|rest| rest.starts_with(self.trigger))
    }
}

fn leaf_text<'a>(doc: &'a Document, path: &[usize]) -> Option<&'a str> {
    match doc.node(path) {
        Some(Node::Text(leaf)) => Some(&leaf.text),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Point;

    fn doc_with(text: &str) -> Document {
        Document::seeded(text)
    }

    fn caret(offset: usize) -> Selection {
        Selection::collapsed(Point::new(vec![0, 0], offset))
    }

    #[test]
    fn trigger_inside_a_word_is_ignored() {
        let mut engine = SuggestionEngine::new(&EditorConfig::default());
        let doc = doc_with("and/or");
        engine.update(&doc, &caret(6));
        assert_eq!(engine.state(), &SuggestionState::Idle);
    }

    #[test]
    fn query_keeps_single_spaces_once_open() {
        let mut engine = SuggestionEngine::new(&EditorConfig::default());
        engine.update(&doc_with("/head"), &caret(5));
        engine.update(&doc_with("/heading 2"), &caret(10));
        assert_eq!(engine.active().map(|a| a.query.as_str()), Some("heading 2"));

        engine.update(&doc_with("/heading  2"), &caret(11));
        assert_eq!(engine.state(), &SuggestionState::Idle);
    }

    #[test]
    fn highlight_resets_when_query_changes() {
        let mut engine = SuggestionEngine::new(&EditorConfig::default());
        engine.update(&doc_with("/"), &caret(1));
        engine.key_down(SuggestionKey::Down);
        engine.key_down(SuggestionKey::Down);
        assert_eq!(engine.active().map(|a| a.highlighted), Some(2));

        engine.update(&doc_with("/h"), &caret(2));
        assert_eq!(engine.active().map(|a| a.highlighted), Some(0));
    }

    #[test]
    fn dismissed_trigger_stays_closed_while_typing() {
        let mut engine = SuggestionEngine::new(&EditorConfig::default());
        engine.update(&doc_with("/ta"), &caret(3));
        assert_eq!(engine.key_down(SuggestionKey::Escape), KeyOutcome::Handled);
        engine.update(&doc_with("/tab"), &caret(4));
        assert!(matches!(engine.state(), SuggestionState::Dismissed(_)));

        engine.update(&doc_with("/tab /"), &caret(6));
        assert_eq!(
            engine.active().map(|a| a.anchor.trigger_offset),
            Some(5)
        );
    }
}
