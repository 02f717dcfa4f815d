use std::cell::RefCell;
use std::rc::Rc;

use serde_json::{Value, json};
use tracing::{info, warn};

use crate::config::EditorConfig;
use crate::core::{Commit, Document, Editor, Point, ProvisionalTransaction, Selection};
use crate::dialog::{DialogBridge, DialogReply, DialogRequest};
use crate::error::{CommandError, DialogError};
use crate::marks::{MarkKind, selection_has_mark};
use crate::node_view::{CodeBlockView, NodeViews, TabsView};
use crate::notify::{Notification, Notifier};
use crate::overlay::{
    ContextMenu, CoordinateResolver, InvalidationReason, OverlayScheduler, OverlayState,
    TableMenuAction,
};
use crate::plugin::{PluginRegistry, ancestor_element_path};
use crate::schema::BlockKind;
use crate::snapshot::{self, DocumentSnapshot};
use crate::suggestion::{
    CommandStep, DeferredEffect, Invocation, KeyOutcome, SuggestionEngine, SuggestionInvocation,
    SuggestionKey, TriggerRange,
};

const LOAD_FAILED: &str = "Failed to load content";
const SAVE_FAILED: &str = "Failed to save content";
const OPERATION_FAILED: &str = "Operation failed";

/// Where snapshots come from and go to. The core never touches storage
/// itself.
pub trait Persistence {
    fn load(&self) -> anyhow::Result<Option<String>>;

    fn save(&self, snapshot: &str) -> anyhow::Result<()>;
}

/// In-memory store. Clones share the same slot.
#[derive(Debug, Clone, Default)]
pub struct MemoryPersistence {
    slot: Rc<RefCell<Option<String>>>,
    saves: Rc<RefCell<usize>>,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(snapshot: impl Into<String>) -> Self {
        let store = Self::default();
        store.slot.replace(Some(snapshot.into()));
        store
    }

    pub fn stored(&self) -> Option<String> {
        self.slot.borrow().clone()
    }

    pub fn save_count(&self) -> usize {
        *self.saves.borrow()
    }
}

impl Persistence for MemoryPersistence {
    fn load(&self) -> anyhow::Result<Option<String>> {
        Ok(self.slot.borrow().clone())
    }

    fn save(&self, snapshot: &str) -> anyhow::Result<()> {
        self.slot.replace(Some(snapshot.to_string()));
        *self.saves.borrow_mut() += 1;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditorKey {
    Up,
    Down,
    Enter,
    Escape,
    Backspace,
}

impl EditorKey {
    fn suggestion_key(self) -> Option<SuggestionKey> {
        match self {
            EditorKey::Up => Some(SuggestionKey::Up),
            EditorKey::Down => Some(SuggestionKey::Down),
            EditorKey::Enter => Some(SuggestionKey::Enter),
            EditorKey::Escape => Some(SuggestionKey::Escape),
            EditorKey::Backspace => None,
        }
    }
}

/// A suggestion effect waiting on a dialog. The trigger text is already
/// removed by `provisional`.
struct PendingEffect {
    effect: DeferredEffect,
    reply: DialogReply,
    provisional: ProvisionalTransaction,
}

/// One open document with everything around it. The editor is only ever
/// mutated from here.
pub struct EditorSession {
    editor: Editor,
    suggestions: SuggestionEngine,
    dialogs: DialogBridge,
    node_views: NodeViews,
    overlays: OverlayScheduler,
    context_menu: Option<ContextMenu>,
    pending: Option<PendingEffect>,
    notifier: Notifier,
}

impl EditorSession {
    pub fn open(config: EditorConfig, persistence: impl Persistence + 'static) -> Self {
        let persistence: Rc<dyn Persistence> = Rc::new(persistence);
        let notifier = Notifier::new();

        let loaded = match persistence.load() {
            Ok(Some(json)) => match snapshot::parse(&json) {
                Ok(outcome) => {
                    info!(
                        blocks = outcome.document.children.len(),
                        dropped = outcome.dropped.len(),
                        "loaded document"
                    );
                    Some(outcome.document)
                }
                Err(err) => {
                    warn!(error = %err, "stored snapshot is unreadable");
                    notifier.error(LOAD_FAILED);
                    None
                }
            },
            Ok(None) => None,
            Err(err) => {
                warn!(error = %err, "failed to load snapshot");
                notifier.error(LOAD_FAILED);
                None
            }
        };
        let doc = loaded.unwrap_or_else(|| {
            info!("seeding default document");
            Document::seeded(config.seed_text.clone())
        });

        let mut editor = Editor::with_config(
            doc,
            Selection::collapsed(Point::new(vec![0, 0], 0)),
            PluginRegistry::myth(),
            config,
        );

        let overlays = OverlayScheduler::new();
        let invalidation = overlays.handle();
        editor.subscribe_fn(move |_commit| invalidation.invalidate(InvalidationReason::Commit));

        let sink = notifier.clone();
        editor.subscribe_fn(move |commit: &Commit<'_>| {
            let saved = snapshot::serialize(commit.document)
                .to_json_pretty()
                .map_err(anyhow::Error::from)
                .and_then(|json| persistence.save(&json));
            if let Err(err) = saved {
                warn!(revision = commit.revision, error = %err, "failed to save snapshot");
                sink.error(SAVE_FAILED);
            }
        });

        let config = editor.config().clone();
        let mut session = Self {
            editor,
            suggestions: SuggestionEngine::new(&config),
            dialogs: DialogBridge::new(&config, notifier.clone()),
            node_views: NodeViews::new(),
            overlays,
            context_menu: None,
            pending: None,
            notifier,
        };
        session.sync();
        session
    }

    pub fn editor(&self) -> &Editor {
        &self.editor
    }

    pub fn doc(&self) -> &Document {
        self.editor.doc()
    }

    pub fn selection(&self) -> &Selection {
        self.editor.selection()
    }

    pub fn snapshot(&self) -> DocumentSnapshot {
        snapshot::serialize(self.editor.doc())
    }

    pub fn suggestions(&self) -> &SuggestionEngine {
        &self.suggestions
    }

    pub fn node_views(&self) -> &NodeViews {
        &self.node_views
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub fn drain_notifications(&mut self) -> Vec<Notification> {
        self.notifier.drain()
    }

    pub fn set_selection(&mut self, selection: Selection) {
        self.editor.set_selection(selection);
        self.overlays.invalidate(InvalidationReason::SelectionChange);
        self.sync();
    }

    /// Types `text` one character at a time, as keystrokes would.
    pub fn type_text(&mut self, text: &str) -> bool {
        for ch in text.chars() {
            let committed = self
                .editor
                .execute("text.insert", Some(json!({ "text": ch.to_string() })));
            self.sync();
            if !committed {
                return false;
            }
        }
        true
    }

    /// Returns whether the key was consumed. An open suggestion menu gets the
    /// first look at navigation keys.
    pub fn key_down(&mut self, key: EditorKey) -> bool {
        if self.suggestions.is_open() {
            if let Some(suggestion_key) = key.suggestion_key() {
                match self.suggestions.key_down(suggestion_key) {
                    KeyOutcome::Handled => return true,
                    KeyOutcome::Invoke(invocation) => {
                        self.invoke(invocation);
                        return true;
                    }
                    KeyOutcome::Ignored => {}
                }
            }
        }

        let committed = match key {
            EditorKey::Enter => self.editor.execute("block.split", None),
            EditorKey::Backspace => self.editor.execute("text.delete_backward", None),
            EditorKey::Up | EditorKey::Down | EditorKey::Escape => return false,
        };
        self.sync();
        committed
    }

    /// Runs a command, reporting failures as an error notification.
    pub fn execute(&mut self, id: &str, args: Option<Value>) -> bool {
        let result = self.editor.run_command(id, args);
        self.sync();
        match result {
            Ok(committed) => committed,
            Err(err) => {
                warn!(command = id, error = %err, "command failed");
                self.notifier.error(err.message());
                false
            }
        }
    }

    pub fn execute_chain(&mut self, steps: &[(&str, Option<Value>)]) -> bool {
        let committed = self.editor.execute_chain(steps);
        self.sync();
        committed
    }

    pub fn undo(&mut self) -> bool {
        let changed = self.editor.undo();
        self.sync();
        changed
    }

    pub fn redo(&mut self) -> bool {
        let changed = self.editor.redo();
        self.sync();
        changed
    }

    pub fn can_undo(&self) -> bool {
        self.editor.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.editor.can_redo()
    }

    pub fn toggle_mark(&mut self, kind: MarkKind) -> bool {
        self.execute(kind.command_id(), None)
    }

    pub fn is_mark_active(&self, kind: MarkKind) -> bool {
        selection_has_mark(self.editor.doc(), self.editor.selection(), kind)
    }

    /// Invokes item `index` of the open suggestion menu, as a click would.
    pub fn invoke_suggestion(&mut self, index: usize) -> bool {
        match self.suggestions.take_invocation(index) {
            Some(invocation) => self.invoke(invocation),
            None => false,
        }
    }

    fn invoke(&mut self, invocation: SuggestionInvocation) -> bool {
        let SuggestionInvocation { item, range } = invocation;
        let done = match item.invocation {
            Invocation::Notify { kind, message } => {
                let removed = self.run_steps(&[range.delete_step()]).is_ok();
                self.notifier.push(kind, message);
                removed
            }
            Invocation::Commands {
                steps,
                move_to_block_start,
                success,
            } => {
                let mut chain = Vec::with_capacity(steps.len() + 2);
                chain.push(range.delete_step());
                chain.extend(steps);
                if move_to_block_start {
                    chain.push(CommandStep::new("selection.block_start"));
                }
                match self.run_steps(&chain) {
                    Ok(true) => {
                        self.notifier.success(success);
                        true
                    }
                    Ok(false) => {
                        self.notifier.error(OPERATION_FAILED);
                        false
                    }
                    Err(err) => {
                        warn!(item = item.id.as_str(), error = %err, "suggestion failed");
                        self.notifier.error(OPERATION_FAILED);
                        false
                    }
                }
            }
            Invocation::Prompt(effect) => self.start_deferred(effect, &range),
        };
        self.sync();
        done
    }

    fn run_steps(&mut self, steps: &[CommandStep]) -> Result<bool, CommandError> {
        let steps: Vec<(&str, Option<Value>)> = steps
            .iter()
            .map(|step| (step.command.as_str(), step.args.clone()))
            .collect();
        self.editor.run_chain(&steps)
    }

    /// Removes the trigger provisionally and opens the effect's dialog. The
    /// insertion happens when the dialog resolves.
    fn start_deferred(&mut self, effect: DeferredEffect, range: &TriggerRange) -> bool {
        if let Some(request) = self.dialogs.current() {
            warn!(pending = request.id, ?effect, "a dialog is already open");
            self.notifier.error(DialogError::Busy { pending: request.id }.to_string());
            return false;
        }

        let delete = range.delete_step();
        let removal = match self
            .editor
            .prepare_command(&delete.command, delete.args.as_ref())
        {
            Ok(tx) => tx,
            Err(err) => {
                warn!(?effect, error = %err, "could not remove the trigger text");
                self.notifier.error(OPERATION_FAILED);
                return false;
            }
        };
        let provisional = match self.editor.apply_provisional(removal) {
            Ok(provisional) => provisional,
            Err(err) => {
                warn!(?effect, error = %err, "could not remove the trigger text");
                self.notifier.error(OPERATION_FAILED);
                return false;
            }
        };

        match effect.request(&mut self.dialogs) {
            Ok(reply) => {
                self.pending = Some(PendingEffect {
                    effect,
                    reply,
                    provisional,
                });
                true
            }
            Err(err) => {
                warn!(?effect, error = %err, "dialog request rejected");
                if let Err(rollback) = self.editor.rollback_provisional(provisional) {
                    warn!(error = %rollback, "rollback failed");
                }
                self.notifier.error(err.to_string());
                false
            }
        }
    }

    pub fn dialog(&self) -> Option<&DialogRequest> {
        self.dialogs.current()
    }

    pub fn set_dialog_value(&mut self, value: impl Into<String>) -> Result<(), DialogError> {
        self.dialogs.set_value(value)
    }

    /// Confirms the open dialog and finishes the effect waiting on it.
    pub fn confirm_dialog(&mut self) -> Result<Option<String>, DialogError> {
        let value = self.dialogs.confirm()?;
        self.finish_pending();
        Ok(value)
    }

    pub fn cancel_dialog(&mut self) -> Result<(), DialogError> {
        self.dialogs.cancel()?;
        self.finish_pending();
        Ok(())
    }

    pub fn choose_image(&mut self, source: &str) -> Result<(), DialogError> {
        self.dialogs.choose_image(source)
    }

    fn finish_pending(&mut self) {
        let Some(mut pending) = self.pending.take() else {
            return;
        };
        let Some(value) = pending.reply.try_take() else {
            self.pending = Some(pending);
            return;
        };

        match value {
            Some(value) => {
                let step = pending.effect.step(&value);
                match self
                    .editor
                    .prepare_command(&step.command, step.args.as_ref())
                {
                    Ok(tx) => match self.editor.commit_provisional(pending.provisional, tx) {
                        Ok(true) => self.notifier.success(pending.effect.success_message()),
                        Ok(false) => self.notifier.error(OPERATION_FAILED),
                        Err(err) => {
                            warn!(effect = ?pending.effect, error = %err, "deferred insert failed");
                            self.notifier.error(OPERATION_FAILED);
                        }
                    },
                    Err(err) => {
                        warn!(effect = ?pending.effect, error = %err, "deferred insert rejected");
                        if let Err(rollback) = self.editor.rollback_provisional(pending.provisional) {
                            warn!(error = %rollback, "rollback failed");
                        }
                        self.notifier.error(err.message());
                    }
                }
            }
            None => {
                if let Err(err) = self.editor.rollback_provisional(pending.provisional) {
                    warn!(error = %err, "rollback failed");
                }
            }
        }
        self.sync();
    }

    pub fn with_tabs_view<R>(
        &mut self,
        path: &[usize],
        f: impl FnOnce(&mut TabsView, &mut Editor) -> R,
    ) -> Option<R> {
        let view = self.node_views.tabs_view_mut(path)?;
        let out = f(view, &mut self.editor);
        self.sync();
        Some(out)
    }

    pub fn code_block_view(&self, path: &[usize]) -> Option<CodeBlockView> {
        CodeBlockView::at(&self.editor, path.to_vec())
    }

    pub fn set_code_language(&mut self, path: &[usize], language: Option<&str>) -> bool {
        let Some(view) = self.code_block_view(path) else {
            return false;
        };
        let changed = view.set_language(&mut self.editor, language);
        self.sync();
        changed
    }

    pub fn viewport_resized(&mut self) {
        self.overlays.invalidate(InvalidationReason::Resize);
    }

    pub fn container_scrolled(&mut self) {
        self.overlays.invalidate(InvalidationReason::Scroll);
    }

    /// Recomputes overlays if anything changed since the last frame.
    pub fn animation_frame(&mut self, resolver: &dyn CoordinateResolver) -> bool {
        self.overlays
            .on_animation_frame(self.editor.doc(), self.editor.selection(), resolver)
    }

    pub fn overlay(&self) -> &OverlayState {
        self.overlays.state()
    }

    pub fn overlay_recomputes(&self) -> u64 {
        self.overlays.recompute_count()
    }

    pub fn add_table_row(&mut self) -> bool {
        self.table_command("table.add_row_after", None, "Row inserted")
    }

    pub fn add_table_column(&mut self) -> bool {
        self.table_command("table.add_col_after", None, "Column inserted")
    }

    /// Right-click at viewport (x, y) on the node at `path`. Opens the menu
    /// only inside a table cell and moves the cursor into that cell.
    pub fn open_table_menu(&mut self, path: &[usize], x: f64, y: f64) -> bool {
        let Some(cell_path) = ancestor_element_path(self.editor.doc(), path, BlockKind::TableCell)
        else {
            return false;
        };
        self.set_selection(Selection::collapsed(Point::new(cell_path.clone(), 0)));
        self.context_menu = Some(ContextMenu { x, y, cell_path });
        true
    }

    pub fn context_menu(&self) -> Option<&ContextMenu> {
        self.context_menu.as_ref()
    }

    pub fn table_menu_action(&mut self, action: TableMenuAction) -> bool {
        let Some(menu) = self.context_menu.take() else {
            return false;
        };
        self.table_command(
            action.command_id(),
            Some(json!({ "path": menu.cell_path })),
            "Done",
        )
    }

    pub fn close_table_menu(&mut self) {
        self.context_menu = None;
    }

    /// A mouse-down that did not land on the context menu.
    pub fn pointer_down_outside(&mut self) {
        self.close_table_menu();
    }

    fn table_command(&mut self, id: &str, args: Option<Value>, success: &str) -> bool {
        let result = self.editor.run_command(id, args);
        self.sync();
        match result {
            Ok(true) => {
                self.notifier.success(success);
                true
            }
            Ok(false) => {
                self.notifier.error(OPERATION_FAILED);
                false
            }
            Err(err) => {
                warn!(command = id, error = %err, "table command failed");
                self.notifier.error(OPERATION_FAILED);
                false
            }
        }
    }

    fn sync(&mut self) {
        self.suggestions
            .update(self.editor.doc(), self.editor.selection());
        self.node_views.sync(self.editor.doc());
    }
}
