use std::cell::Cell;
use std::rc::Rc;

use tracing::debug;

use crate::core::{Document, Selection};
use crate::marks::{MarkKind, selection_has_mark};
use crate::ops::Path;
use crate::plugin::ancestor_element_path;
use crate::schema::BlockKind;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn left(&self) -> f64 {
        self.x
    }

    pub fn top(&self) -> f64 {
        self.y
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    /// The same rectangle with `origin`'s top-left corner as (0, 0).
    pub fn relative_to(&self, origin: &Rect) -> Rect {
        Rect::new(self.x - origin.x, self.y - origin.y, self.width, self.height)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// Maps document positions to rendered rectangles in viewport coordinates.
/// Implemented by the rendering layer.
pub trait CoordinateResolver {
    fn container_rect(&self) -> Rect;

    fn selection_rect(&self, doc: &Document, selection: &Selection) -> Option<Rect>;

    fn node_rect(&self, doc: &Document, path: &[usize]) -> Option<Rect>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct BubbleMenuAnchor {
    pub rect: Rect,
    pub active_marks: Vec<MarkKind>,
}

/// Bounds of the table around the cursor, relative to the editing container.
#[derive(Debug, Clone, PartialEq)]
pub struct TableGeometry {
    pub table_path: Path,
    pub top: f64,
    pub left: f64,
    pub right: f64,
    pub bottom: f64,
    pub width: f64,
    pub height: f64,
}

impl TableGeometry {
    fn new(table_path: Path, table: Rect, container: Rect) -> Self {
        let rel = table.relative_to(&container);
        Self {
            table_path,
            top: rel.top(),
            left: rel.left(),
            right: rel.right(),
            bottom: rel.bottom(),
            width: rel.width,
            height: rel.height,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TableControls {
    pub add_column: Position,
    pub add_row: Position,
}

impl TableControls {
    pub fn for_table(table: &TableGeometry) -> Self {
        Self {
            add_column: Position {
                x: table.right + 10.0,
                y: table.top + table.height / 2.0 - 20.0,
            },
            add_row: Position {
                x: table.left + table.width / 2.0 - 50.0,
                y: table.bottom + 10.0,
            },
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OverlayState {
    pub bubble_menu: Option<BubbleMenuAnchor>,
    pub table: Option<TableGeometry>,
    pub table_controls: Option<TableControls>,
}

impl OverlayState {
    pub fn is_empty(&self) -> bool {
        self.bubble_menu.is_none() && self.table.is_none()
    }
}

/// Derives overlay positions from the document, the selection and the
/// resolver. Never mutates anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct OverlayEngine;

impl OverlayEngine {
    pub fn recompute(
        &self,
        doc: &Document,
        selection: &Selection,
        resolver: &dyn CoordinateResolver,
    ) -> OverlayState {
        let container = resolver.container_rect();

        let bubble_menu = (!selection.is_collapsed())
            .then(|| resolver.selection_rect(doc, selection))
            .flatten()
            .map(|rect| BubbleMenuAnchor {
                rect: rect.relative_to(&container),
                active_marks: MarkKind::ALL
                    .into_iter()
                    .filter(|kind| selection_has_mark(doc, selection, *kind))
                    .collect(),
            });

        let (start, _) = selection.ordered();
        let table = ancestor_element_path(doc, &start.path, BlockKind::Table).and_then(|path| {
            let rect = resolver.node_rect(doc, &path)?;
            Some(TableGeometry::new(path, rect, container))
        });
        let table_controls = table.as_ref().map(TableControls::for_table);

        OverlayState {
            bubble_menu,
            table,
            table_controls,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidationReason {
    Commit,
    SelectionChange,
    Resize,
    Scroll,
}

impl InvalidationReason {
    fn bit(self) -> u8 {
        match self {
            InvalidationReason::Commit => 1,
            InvalidationReason::SelectionChange => 1 << 1,
            InvalidationReason::Resize => 1 << 2,
            InvalidationReason::Scroll => 1 << 3,
        }
    }
}

/// Cloneable handle that marks the overlays stale. Safe to hold inside a
/// commit listener.
#[derive(Debug, Clone, Default)]
pub struct InvalidationHandle {
    pending: Rc<Cell<u8>>,
}

impl InvalidationHandle {
    pub fn invalidate(&self, reason: InvalidationReason) {
        self.pending.set(self.pending.get() | reason.bit());
    }

    pub fn is_pending(&self) -> bool {
        self.pending.get() != 0
    }
}

/// Coalesces invalidations so the overlays are measured at most once per
/// animation frame.
#[derive(Debug, Default)]
pub struct OverlayScheduler {
    engine: OverlayEngine,
    handle: InvalidationHandle,
    state: OverlayState,
    recomputes: u64,
}

impl OverlayScheduler {
    pub fn new() -> Self {
        let scheduler = Self::default();
        scheduler.handle.invalidate(InvalidationReason::Commit);
        scheduler
    }

    pub fn handle(&self) -> InvalidationHandle {
        self.handle.clone()
    }

    pub fn invalidate(&self, reason: InvalidationReason) {
        self.handle.invalidate(reason);
    }

    pub fn is_dirty(&self) -> bool {
        self.handle.is_pending()
    }

    pub fn state(&self) -> &OverlayState {
        &self.state
    }

    pub fn recompute_count(&self) -> u64 {
        self.recomputes
    }

    /// Recomputes when something was invalidated since the last frame.
    /// Returns whether a recompute happened.
    pub fn on_animation_frame(
        &mut self,
        doc: &Document,
        selection: &Selection,
        resolver: &dyn CoordinateResolver,
    ) -> bool {
        let pending = self.handle.pending.replace(0);
        if pending == 0 {
            return false;
        }
        self.state = self.engine.recompute(doc, selection, resolver);
        self.recomputes += 1;
        debug!(
            reasons = pending,
            table = self.state.table.is_some(),
            bubble = self.state.bubble_menu.is_some(),
            "overlays recomputed"
        );
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableMenuAction {
    AddRowAfter,
    AddColumnAfter,
    DeleteRow,
    DeleteColumn,
}

impl TableMenuAction {
    pub const ALL: [TableMenuAction; 4] = [
        TableMenuAction::AddRowAfter,
        TableMenuAction::AddColumnAfter,
        TableMenuAction::DeleteRow,
        TableMenuAction::DeleteColumn,
    ];

    pub fn command_id(self) -> &'static str {
        match self {
            TableMenuAction::AddRowAfter => "table.add_row_after",
            TableMenuAction::AddColumnAfter => "table.add_col_after",
            TableMenuAction::DeleteRow => "table.delete_row",
            TableMenuAction::DeleteColumn => "table.delete_col",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            TableMenuAction::AddRowAfter => "Insert row below",
            TableMenuAction::AddColumnAfter => "Insert column right",
            TableMenuAction::DeleteRow => "Delete row",
            TableMenuAction::DeleteColumn => "Delete column",
        }
    }
}

/// Right-click menu of a table cell, at viewport position (x, y).
#[derive(Debug, Clone, PartialEq)]
pub struct ContextMenu {
    pub x: f64,
    pub y: f64,
    pub cell_path: Path,
}
