use anyhow::{Context as _, bail, ensure};
use myth_plate_core::{
    Document, EditorKey, EditorSession, MarkKind, Node, NotificationKind, Point, Selection,
    TableMenuAction,
};
use serde_json::json;
use tracing::{info, warn};

use crate::layout::GridLayout;

/// Drives a session the way a user would: typing, the slash menu, dialogs,
/// node views and the table menu.
pub fn run(session: &mut EditorSession, layout: &GridLayout) -> anyhow::Result<()> {
    let end = end_of_document(session.doc()).context("document has no text")?;
    session.set_selection(Selection::collapsed(end));
    ensure!(session.key_down(EditorKey::Enter), "could not start a new block");

    slash(session, "/Heading 2")?;
    type_text(session, "Getting started")?;
    session.key_down(EditorKey::Enter);
    report(session, "heading");

    type_text(session, "Read the docs before anything else")?;
    let block = session.selection().focus.path.clone();
    session.set_selection(Selection::new(
        Point::new(block.clone(), 9),
        Point::new(block.clone(), 13),
    ));
    ensure!(session.toggle_mark(MarkKind::Bold), "bold failed");
    ensure!(
        session.execute("marks.set_link", Some(json!({ "url": "https://example.com/docs" }))),
        "link failed"
    );
    let end = end_of_document(session.doc()).context("document has no text")?;
    session.set_selection(Selection::collapsed(end));
    session.key_down(EditorKey::Enter);
    report(session, "marks");

    slash(session, "/bul")?;
    for item in ["install", "configure"] {
        type_text(session, item)?;
        session.key_down(EditorKey::Enter);
    }
    session.key_down(EditorKey::Enter);
    report(session, "list");

    slash(session, "/table")?;
    session.add_table_row();
    let cell = session.selection().focus.path.clone();
    if session.open_table_menu(&cell, 320.0, 180.0) {
        session.table_menu_action(TableMenuAction::AddColumnAfter);
    }
    report(session, "table");

    let end = end_of_document(session.doc()).context("document has no text")?;
    session.set_selection(Selection::collapsed(end));
    slash(session, "/image")?;
    if let Err(err) = session.choose_image("/tmp/notes.txt") {
        info!(error = %err, "rejected file as expected");
    }
    session.choose_image("/tmp/cat.png")?;
    session.confirm_dialog()?;
    report(session, "image");

    slash(session, "/embed w")?;
    session.set_dialog_value("  https://example.com  ")?;
    session.confirm_dialog()?;
    report(session, "webpage");

    slash(session, "/tabs")?;
    let tabs = session
        .node_views()
        .tabs()
        .last()
        .map(|view| view.path().to_vec())
        .context("tabs view missing")?;
    session.with_tabs_view(&tabs, |view, editor| {
        view.rename(editor, 0, "Overview");
        view.edit_content(editor, "What this project does.");
        view.add_tab(editor);
        view.rename(editor, 1, "Details");
    });
    report(session, "tabs");

    slash(session, "/code")?;
    type_text(session, "fn main() {}")?;
    let code = session.selection().focus.path.first().copied().context("no caret")?;
    session.set_code_language(&[code], Some("rust"));
    report(session, "code");

    ensure!(session.undo(), "nothing to undo");
    ensure!(session.redo(), "nothing to redo");

    session.container_scrolled();
    if session.animation_frame(layout) {
        let overlay = session.overlay();
        info!(
            table = overlay.table.is_some(),
            bubble = overlay.bubble_menu.is_some(),
            recomputes = session.overlay_recomputes(),
            "overlays"
        );
    }

    info!(blocks = session.doc().children.len(), "walkthrough finished");
    Ok(())
}

fn type_text(session: &mut EditorSession, text: &str) -> anyhow::Result<()> {
    ensure!(session.type_text(text), "typing {text:?} failed");
    Ok(())
}

/// Types `query` and picks the highlighted suggestion.
fn slash(session: &mut EditorSession, query: &str) -> anyhow::Result<()> {
    type_text(session, query)?;
    let Some(item) = session.suggestions().highlighted_item() else {
        bail!("no suggestion for {query:?}");
    };
    info!(query, item = item.title.as_str(), "invoking suggestion");
    ensure!(session.key_down(EditorKey::Enter), "{query:?} did nothing");
    Ok(())
}

fn report(session: &mut EditorSession, step: &str) {
    for notification in session.drain_notifications() {
        match notification.kind {
            NotificationKind::Error => warn!(step, message = notification.message.as_str(), "toast"),
            _ => info!(step, message = notification.message.as_str(), "toast"),
        }
    }
}

fn end_of_document(doc: &Document) -> Option<Point> {
    fn last_leaf(nodes: &[Node], path: &mut Vec<usize>) -> Option<Point> {
        for (ix, node) in nodes.iter().enumerate().rev() {
            path.push(ix);
            let found = match node {
                Node::Text(text) => Some(Point::new(path.clone(), text.text.len())),
                Node::Element(el) => last_leaf(&el.children, path),
                Node::Void(_) => None,
            };
            path.pop();
            if found.is_some() {
                return found;
            }
        }
        None
    }
    last_leaf(&doc.children, &mut Vec::new())
}
