//! Table types.

use serde::{Deserialize, Serialize};

/// An axis-aligned rectangle in PDF user space (origin bottom-left).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl Rect {
    /// Create a rectangle, normalizing the corner order.
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self {
            x0: x0.min(x1),
            y0: y0.min(y1),
            x1: x0.max(x1),
            y1: y0.max(y1),
        }
    }

    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f32 {
        self.y1 - self.y0
    }

    /// Check if a point lies inside (inclusive).
    pub fn contains(&self, x: f32, y: f32) -> bool {
        x >= self.x0 && x <= self.x1 && y >= self.y0 && y <= self.y1
    }
}

/// How a table was found on the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionStrategy {
    /// Grid built from painted ruling lines.
    Lattice,
    /// Grid inferred from text alignment.
    Stream,
}

/// A detected table as a grid of optional cell values.
///
/// `None` marks a cell that does not exist in the grid, e.g. the
/// continuation of a merged cell. `Some("")` is a present but empty cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    /// Rows of cells, top to bottom
    pub cells: Vec<Vec<Option<String>>>,

    /// Page region covered by the table
    pub bbox: Option<Rect>,

    /// Detection strategy that produced the table
    pub strategy: DetectionStrategy,
}

impl Table {
    /// Create a table from raw cells.
    pub fn new(cells: Vec<Vec<Option<String>>>, strategy: DetectionStrategy) -> Self {
        Self {
            cells,
            bbox: None,
            strategy,
        }
    }

    /// Set the page region.
    pub fn with_bbox(mut self, bbox: Rect) -> Self {
        self.bbox = Some(bbox);
        self
    }

    /// Get the number of rows.
    pub fn row_count(&self) -> usize {
        self.cells.len()
    }

    /// Get the number of columns (widest row).
    pub fn column_count(&self) -> usize {
        self.cells.iter().map(|r| r.len()).max().unwrap_or(0)
    }

    /// True when no cell carries non-whitespace text.
    pub fn is_empty(&self) -> bool {
        !self
            .cells
            .iter()
            .flatten()
            .any(|c| c.as_deref().is_some_and(|s| !s.trim().is_empty()))
    }

    /// Rectangular rows of normalized cell values.
    ///
    /// Short rows are padded with empty strings up to [`Table::column_count`].
    pub fn normalized_rows(&self) -> Vec<Vec<String>> {
        let width = self.column_count();
        self.cells
            .iter()
            .map(|row| {
                let mut out: Vec<String> =
                    row.iter().map(|c| normalize_cell(c.as_deref())).collect();
                out.resize(width, String::new());
                out
            })
            .collect()
    }
}

/// Normalize one cell value: absent becomes empty, present is trimmed.
pub fn normalize_cell(cell: Option<&str>) -> String {
    cell.map(|s| s.trim().to_string()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cell(s: &str) -> Option<String> {
        Some(s.to_string())
    }

    #[test]
    fn test_normalize_cell() {
        assert_eq!(normalize_cell(None), "");
        assert_eq!(normalize_cell(Some("  42 \n")), "42");
        assert_eq!(normalize_cell(Some("")), "");
    }

    #[test]
    fn test_normalized_rows_are_rectangular() {
        let table = Table::new(
            vec![
                vec![cell(" A "), None, cell("C")],
                vec![cell("1")],
            ],
            DetectionStrategy::Lattice,
        );
        assert_eq!(table.row_count(), 2);
        assert_eq!(table.column_count(), 3);
        assert_eq!(
            table.normalized_rows(),
            vec![
                vec!["A".to_string(), String::new(), "C".to_string()],
                vec!["1".to_string(), String::new(), String::new()],
            ]
        );
    }

    #[test]
    fn test_is_empty() {
        let blank = Table::new(
            vec![vec![cell(" "), None], vec![None, cell("")]],
            DetectionStrategy::Stream,
        );
        assert!(blank.is_empty());

        let filled = Table::new(vec![vec![None, cell("x")]], DetectionStrategy::Stream);
        assert!(!filled.is_empty());
    }

    #[test]
    fn test_rect_normalizes_corners() {
        let r = Rect::new(10.0, 50.0, 0.0, 20.0);
        assert_eq!(r.x0, 0.0);
        assert_eq!(r.y1, 50.0);
        assert_eq!(r.width(), 10.0);
        assert_eq!(r.height(), 30.0);
        assert!(r.contains(5.0, 30.0));
        assert!(!r.contains(11.0, 30.0));
    }
}
