use myth_plate_core::{CoordinateResolver, Document, Node, Rect, Selection};

/// Fixed-pitch layout: every top-level block is one or more rows of
/// `row_height`, characters are `char_width` wide.
pub struct GridLayout {
    container: Rect,
    row_height: f64,
    char_width: f64,
}

impl Default for GridLayout {
    fn default() -> Self {
        Self {
            container: Rect::new(0.0, 0.0, 960.0, 720.0),
            row_height: 24.0,
            char_width: 8.0,
        }
    }
}

impl GridLayout {
    fn rows(node: &Node) -> usize {
        match node {
            Node::Element(el) if el.children.iter().any(|c| matches!(c, Node::Element(_))) => {
                el.children.iter().map(Self::rows).sum::<usize>().max(1)
            }
            Node::Void(_) => 4,
            _ => 1,
        }
    }

    fn block_top(&self, doc: &Document, ix: usize) -> f64 {
        let rows: usize = doc.children.iter().take(ix).map(Self::rows).sum();
        self.container.y + rows as f64 * self.row_height
    }
}

impl CoordinateResolver for GridLayout {
    fn container_rect(&self) -> Rect {
        self.container
    }

    fn selection_rect(&self, doc: &Document, selection: &Selection) -> Option<Rect> {
        let (start, end) = selection.ordered();
        let top = self.block_top(doc, *start.path.first()?);
        let bottom = self.block_top(doc, *end.path.first()?) + self.row_height;
        let x = self.container.x + start.offset as f64 * self.char_width;
        let width = if start.path == end.path {
            (end.offset - start.offset) as f64 * self.char_width
        } else {
            self.container.width - x
        };
        Some(Rect::new(x, top, width, bottom - top))
    }

    fn node_rect(&self, doc: &Document, path: &[usize]) -> Option<Rect> {
        let ix = *path.first()?;
        let node = doc.node(path)?;
        Some(Rect::new(
            self.container.x,
            self.block_top(doc, ix),
            self.container.width,
            Self::rows(node) as f64 * self.row_height,
        ))
    }
}
